use serde::{Deserialize, Serialize};

use crate::segmenter::ChunkRange;

/// On-disk form of the resume sidecar (`<destination>.rdm.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeMetadata {
    /// URL the ranges were fetched from (informational).
    pub url: String,
    /// Full length of the remote resource.
    pub total_length: u64,
    /// Outstanding chunks, sorted by start; each `[written, end)` is still missing.
    pub ranges: Vec<ChunkRange>,
    /// All chunks finished and the destination has the full length.
    #[serde(default)]
    pub is_completed: bool,
    /// Highest byte offset any chunk has written up to.
    #[serde(default)]
    pub last_end_offset: u64,
}
