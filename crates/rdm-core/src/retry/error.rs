//! Chunk error type for retry classification.

use std::fmt;

use crate::control::CancelReason;

/// Error from opening or pumping a single chunk.
#[derive(Debug)]
pub enum ChunkError {
    /// Curl reported an error (connect failure, reset, TLS, ...).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// A range request was not answered with a matching 206.
    InvalidRangeResponse { status: u32, requested_start: u64 },
    /// The body ended before the chunk end.
    PartialTransfer { expected: u64, received: u64 },
    /// No headers within the attempt timeout, or no data within the read timeout.
    Timeout,
    /// The transfer thread went away without reporting a result.
    Disconnected,
    /// Writing the destination or persisting metadata failed.
    Storage(std::io::Error),
    /// The caller cancelled the download.
    Cancelled,
}

impl ChunkError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChunkError::Cancelled)
    }

    /// Map a stopped token: caller cancellation vs. an attempt deadline.
    pub fn from_cancel(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Cancelled => ChunkError::Cancelled,
            CancelReason::TimedOut => ChunkError::Timeout,
        }
    }

    /// A failed metadata save, reported as a storage error.
    pub(crate) fn from_save(e: anyhow::Error) -> Self {
        ChunkError::Storage(std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::Curl(e) => write!(f, "{}", e),
            ChunkError::Http(code) => write!(f, "HTTP {}", code),
            ChunkError::InvalidRangeResponse {
                status,
                requested_start,
            } => write!(
                f,
                "server answered range request at offset {} with HTTP {}",
                requested_start, status
            ),
            ChunkError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            ChunkError::Timeout => write!(f, "timed out"),
            ChunkError::Disconnected => write!(f, "transfer thread disconnected"),
            ChunkError::Storage(e) => write!(f, "storage: {}", e),
            ChunkError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for ChunkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChunkError::Curl(e) => Some(e),
            ChunkError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ChunkError {
    fn from(e: std::io::Error) -> Self {
        ChunkError::Storage(e)
    }
}
