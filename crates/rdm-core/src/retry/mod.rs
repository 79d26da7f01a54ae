//! Chunk errors and the fixed-interval retry policy.
//!
//! Every failure while opening or pumping a chunk is a `ChunkError`. It is
//! classified into an `ErrorKind`, and the `RetryPolicy` decides whether the
//! chunk is retried (after a fixed delay) or the error is surfaced. Only
//! cancellation and programmer errors are never retried.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::ChunkError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
