use std::time::Duration;

/// High-level classification of an error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Server asked us to slow down (e.g. 429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, truncated body, ...).
    Connection,
    /// 5xx other than 503.
    Http5xx(u16),
    /// Anything else: 4xx, bad range answers, disk errors.
    Other,
    /// The caller cancelled. Never retried.
    Cancelled,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Fixed-interval retry policy.
///
/// Unlike a backoff policy every retry waits the same `interval`; a chunk is
/// given up after `max_retries` consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before giving up.
    pub max_retries: u32,
    /// Delay before every retry.
    pub interval: Duration,
    /// Per-attempt timeout for receiving response headers, and per-read timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// `failures` is the number of consecutive failures so far, including the
    /// one being decided on (1 = first failure).
    pub fn decide(&self, failures: u32, kind: ErrorKind) -> RetryDecision {
        match kind {
            ErrorKind::Cancelled => RetryDecision::NoRetry,
            _ if failures > self.max_retries => RetryDecision::NoRetry,
            _ => RetryDecision::RetryAfter(self.interval),
        }
    }
}
