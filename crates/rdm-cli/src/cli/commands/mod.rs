//! CLI command handlers. Each command is in its own file.

mod checksum;
mod completions;
mod get;
mod progress;
mod size;
mod status;
mod stream;

pub use checksum::run_checksum;
pub use completions::run_completions;
pub use get::run_get;
pub use size::run_size;
pub use status::run_status;
pub use stream::run_stream;

use anyhow::Result;
use rdm_core::{CancelToken, DownloadError};

/// Run a blocking engine call on the blocking pool. Ctrl-C cancels its token;
/// the call then stops at the next suspension point and keeps its resume metadata.
pub(crate) async fn run_cancellable<T, F>(f: F) -> Result<T>
where
    F: FnOnce(CancelToken) -> Result<T, DownloadError> + Send + 'static,
    T: Send + 'static,
{
    let token = CancelToken::new();
    let mut worker = tokio::task::spawn_blocking({
        let token = token.clone();
        move || f(token)
    });
    tokio::select! {
        res = &mut worker => Ok(res??),
        _ = tokio::signal::ctrl_c() => {
            eprintln!();
            eprintln!("interrupted, stopping (partial progress is kept)");
            tracing::info!("ctrl-c received, cancelling");
            token.cancel();
            Ok(worker.await??)
        }
    }
}
