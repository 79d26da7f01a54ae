//! Retry loop: run a closure until success or the policy says stop.

use super::classify;
use super::error::ChunkError;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::CancelToken;

/// Runs `f` until it succeeds or the policy gives up. Retry delays are slept
/// on `token`, so cancellation interrupts them. `what` names the operation in
/// retry logs.
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    token: &CancelToken,
    what: &str,
    mut f: F,
) -> Result<T, ChunkError>
where
    F: FnMut() -> Result<T, ChunkError>,
{
    let mut failures = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                failures += 1;
                match policy.decide(failures, classify::classify(&e)) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::warn!(attempt = failures, error = %e, "{} failed, retrying", what);
                        token.sleep(d).map_err(ChunkError::from_cancel)?;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            interval: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let v = run_with_retry(&fast(3), &CancelToken::new(), "op", || {
            calls += 1;
            if calls < 3 {
                Err(ChunkError::Timeout)
            } else {
                Ok(calls)
            }
        })
        .unwrap();
        assert_eq!(v, 3);
    }

    #[test]
    fn attempts_are_bounded() {
        let mut calls = 0;
        let res: Result<(), _> = run_with_retry(&fast(2), &CancelToken::new(), "op", || {
            calls += 1;
            Err(ChunkError::Http(500))
        });
        assert!(matches!(res, Err(ChunkError::Http(500))));
        assert_eq!(calls, 3, "first attempt plus two retries");
    }

    #[test]
    fn cancellation_is_not_retried() {
        let mut calls = 0;
        let res: Result<(), _> = run_with_retry(&fast(5), &CancelToken::new(), "op", || {
            calls += 1;
            Err(ChunkError::Cancelled)
        });
        assert!(matches!(res, Err(ChunkError::Cancelled)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn cancelled_token_interrupts_delay() {
        let token = CancelToken::new();
        token.cancel();
        let policy = RetryPolicy {
            interval: Duration::from_secs(60),
            ..fast(5)
        };
        let res: Result<(), _> = run_with_retry(&policy, &token, "op", || Err(ChunkError::Timeout));
        assert!(matches!(res, Err(ChunkError::Cancelled)));
    }
}
