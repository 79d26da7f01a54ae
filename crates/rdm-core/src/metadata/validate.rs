//! Decide what an existing destination + sidecar are worth.

use std::fs;
use std::path::Path;

use super::{Metadata, ResumeMetadata, MIN_METADATA_SIZE};
use crate::segmenter::outstanding_bytes;

/// What a new download of `destination` can reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeState {
    /// Nothing trustworthy on disk; start from zero.
    Restart,
    /// The destination is already the full file.
    Complete,
    /// Continue with these outstanding ranges.
    Resume(ResumeMetadata),
}

/// Inspect `destination` and its sidecar against the remote length.
///
/// The sidecar is written before the destination is created or extended, so
/// a destination of exactly `total_length` bytes without a sidecar can only be
/// a finished download.
pub fn inspect(destination: &Path, total_length: u64) -> ResumeState {
    let sidecar_len = fs::metadata(Metadata::sidecar_path(destination))
        .ok()
        .map(|m| m.len());
    let file_len = fs::metadata(destination)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len());

    let (sidecar_len, file_len) = match (sidecar_len, file_len) {
        (None, Some(len)) if len == total_length => return ResumeState::Complete,
        (None, _) | (Some(_), None) => return ResumeState::Restart,
        (Some(s), Some(f)) => (s, f),
    };
    if sidecar_len < MIN_METADATA_SIZE || file_len > total_length {
        return ResumeState::Restart;
    }
    let Some(meta) = Metadata::load(destination) else {
        return ResumeState::Restart;
    };
    if meta.total_length != total_length {
        tracing::info!(
            recorded = meta.total_length,
            remote = total_length,
            "remote size changed, restarting"
        );
        return ResumeState::Restart;
    }
    if meta.ranges.is_empty() {
        return if file_len == total_length {
            ResumeState::Complete
        } else {
            ResumeState::Restart
        };
    }
    if file_len < meta.last_end_offset {
        return ResumeState::Restart;
    }
    ResumeState::Resume(meta)
}

/// Bytes of `destination` a download of a `total_length` resource would keep.
pub fn downloaded_size(destination: &Path, total_length: u64) -> u64 {
    match inspect(destination, total_length) {
        ResumeState::Restart => 0,
        ResumeState::Complete => total_length,
        ResumeState::Resume(meta) => total_length.saturating_sub(outstanding_bytes(&meta.ranges)),
    }
}
