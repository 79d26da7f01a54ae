use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Longest single wait while sleeping, so parent cancellation and deadlines are noticed.
const WAIT_SLICE: Duration = Duration::from_millis(20);

/// Why a token stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// `cancel()` was called on this token or an ancestor.
    Cancelled,
    /// The deadline of this token or an ancestor passed.
    TimedOut,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "cancelled"),
            CancelReason::TimedOut => write!(f, "timed out"),
        }
    }
}

impl std::error::Error for CancelReason {}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<CancelToken>,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Shared cancellation token. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that stops when `self` stops, and can also be cancelled on its own.
    pub fn child(&self) -> CancelToken {
        CancelToken {
            inner: Arc::new(Inner {
                parent: Some(self.clone()),
                ..Inner::default()
            }),
        }
    }

    /// A child token that additionally times out `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> CancelToken {
        CancelToken {
            inner: Arc::new(Inner {
                parent: Some(self.clone()),
                deadline: Some(Instant::now() + timeout),
                ..Inner::default()
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.wake.notify_all();
    }

    /// `None` while the token is live.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return Some(CancelReason::Cancelled);
        }
        if let Some(reason) = self.inner.parent.as_ref().and_then(|p| p.reason()) {
            return Some(reason);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::TimedOut),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// `Err` with the reason if the token has stopped.
    pub fn check(&self) -> Result<(), CancelReason> {
        match self.reason() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Sleep for `duration` unless the token stops first.
    pub fn sleep(&self, duration: Duration) -> Result<(), CancelReason> {
        let until = Instant::now() + duration;
        let mut guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= until {
                return Ok(());
            }
            let wait = (until - now).min(WAIT_SLICE);
            guard = match self.inner.wake.wait_timeout(guard, wait) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_live() {
        let t = CancelToken::new();
        assert_eq!(t.reason(), None);
        assert!(t.check().is_ok());
    }

    #[test]
    fn cancel_propagates_to_children_not_parents() {
        let parent = CancelToken::new();
        let child = parent.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child();
        parent.cancel();
        assert_eq!(other.reason(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn deadline_reports_timed_out_without_touching_parent() {
        let parent = CancelToken::new();
        let attempt = parent.with_timeout(Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(attempt.reason(), Some(CancelReason::TimedOut));
        assert_eq!(parent.reason(), None);
        // A fresh attempt gets a fresh deadline.
        let next = parent.with_timeout(Duration::from_secs(5));
        assert_eq!(next.reason(), None);
    }

    #[test]
    fn sleep_completes_when_live() {
        let t = CancelToken::new();
        let start = Instant::now();
        t.sleep(Duration::from_millis(50)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn sleep_wakes_on_cancel() {
        let t = CancelToken::new();
        let remote = t.clone();
        let h = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            remote.cancel();
        });
        let start = Instant::now();
        assert_eq!(t.sleep(Duration::from_secs(10)), Err(CancelReason::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(2));
        h.join().unwrap();
    }

    #[test]
    fn child_sleep_notices_parent_cancel() {
        let parent = CancelToken::new();
        let child = parent.child();
        let h = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            parent.cancel();
        });
        assert_eq!(child.sleep(Duration::from_secs(10)), Err(CancelReason::Cancelled));
        h.join().unwrap();
    }
}
