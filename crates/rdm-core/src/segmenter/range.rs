//! Chunk range type and fixed-size planning.

use serde::{Deserialize, Serialize};

/// `end` value for a span whose length is unknown (`Range: bytes=N-`).
pub const OPEN_END: u64 = u64::MAX;

/// A chunk of the target file: bytes `[start, end)` (half-open), of which
/// `[start, written)` are already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    /// First byte of the chunk (inclusive).
    pub start: u64,
    /// End of the chunk (exclusive), or `OPEN_END`.
    pub end: u64,
    /// Next byte to write; `start <= written <= end`.
    pub written: u64,
}

impl ChunkRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            written: start,
        }
    }

    /// Total length of the chunk in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes still missing.
    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.written)
    }

    pub fn is_open_ended(&self) -> bool {
        self.end == OPEN_END
    }

    /// Nothing left to fetch.
    pub fn is_consumed(&self) -> bool {
        self.written >= self.end
    }

    /// HTTP Range header value for the outstanding part (inclusive end):
    /// `bytes=written-(end-1)`, or `bytes=written-` when open-ended.
    pub fn range_header_value(&self) -> String {
        if self.is_open_ended() {
            format!("bytes={}-", self.written)
        } else {
            format!("bytes={}-{}", self.written, self.end.saturating_sub(1))
        }
    }
}

/// Splits `[0, total)` into contiguous chunks of `chunk_size` bytes; the last
/// chunk takes the remainder. Empty when `total` is 0. A `chunk_size` of 0 is
/// treated as "one chunk".
pub fn plan_chunks(total: u64, chunk_size: u64) -> Vec<ChunkRange> {
    if total == 0 {
        return Vec::new();
    }
    let chunk_size = if chunk_size == 0 { total } else { chunk_size };
    let count = total.div_ceil(chunk_size);
    let mut out = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    while offset < total {
        let end = offset.saturating_add(chunk_size).min(total);
        out.push(ChunkRange::new(offset, end));
        offset = end;
    }
    out
}

/// True when the outstanding ranges can describe a file of `total` bytes:
/// sorted by start, non-overlapping, inside `[0, total)` and with each cursor
/// inside its own chunk.
pub fn validate_ranges(ranges: &[ChunkRange], total: u64) -> bool {
    let mut prev_end = 0u64;
    for r in ranges {
        if r.start < prev_end || r.start >= r.end || r.end > total {
            return false;
        }
        if r.written < r.start || r.written > r.end {
            return false;
        }
        prev_end = r.end;
    }
    true
}

/// Sum of bytes still missing across `ranges`.
pub fn outstanding_bytes(ranges: &[ChunkRange]) -> u64 {
    ranges.iter().map(ChunkRange::remaining).sum()
}
