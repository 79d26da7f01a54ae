//! Cooperative cancellation and change broadcasts.
//!
//! A `CancelToken` is shared by every thread working on one download. The
//! caller cancels it (e.g. on Ctrl-C); workers observe it between reads, while
//! sleeping for throttling or retry delays, and inside the curl progress
//! callback. Child tokens let the orchestrator stop siblings without touching
//! the caller's token, and deadline tokens implement per-attempt timeouts.

mod notify;
mod token;

pub use notify::{ChangeNotifier, Subscription};
pub use token::{CancelReason, CancelToken};
