//! Public error type of the downloader.

use thiserror::Error;

use crate::retry::ChunkError;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// Rejected before any I/O.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// The caller's token was cancelled. Resume metadata is kept.
    #[error("download cancelled")]
    Cancelled,

    /// The remote could not be probed.
    #[error("probing {url} failed: {source}")]
    Probe { url: String, source: ChunkError },

    /// A chunk failed after exhausting its retries.
    #[error("chunk {index} failed: {source}")]
    Chunk { index: usize, source: ChunkError },

    /// All chunks reported success but the destination has the wrong size.
    #[error("destination has {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DownloadError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        DownloadError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Chunk failure, with cancellation reported as `Cancelled`.
    pub(crate) fn chunk(index: usize, source: ChunkError) -> Self {
        if source.is_cancelled() {
            DownloadError::Cancelled
        } else {
            DownloadError::Chunk { index, source }
        }
    }

    /// Probe failure, with cancellation reported as `Cancelled`.
    pub(crate) fn probe(url: &str, source: ChunkError) -> Self {
        if source.is_cancelled() {
            DownloadError::Cancelled
        } else {
            DownloadError::Probe {
                url: url.to_string(),
                source,
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}
