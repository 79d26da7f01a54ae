use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Broadcasts "something changed" to any number of subscribers.
///
/// The notifier only keeps weak references: a subscriber that is dropped
/// (e.g. a pump that finished) is detached automatically and never kept alive.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    subscribers: Mutex<Vec<Weak<AtomicBool>>>,
}

/// Receiving end of a `ChangeNotifier`. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    changed: Arc<AtomicBool>,
}

impl Subscription {
    /// True once per batch of notifications since the previous call.
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let changed = Arc::new(AtomicBool::new(false));
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subs.retain(|w| w.strong_count() > 0);
        subs.push(Arc::downgrade(&changed));
        Subscription { changed }
    }

    pub fn notify(&self) {
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subs.retain(|w| match w.upgrade() {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                true
            }
            None => false,
        });
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }
}
