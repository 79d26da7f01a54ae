//! Byte range planning.
//!
//! A file of known length is split into fixed-size contiguous chunks. Each
//! chunk carries its own write cursor so a partially downloaded chunk can be
//! resumed from the exact byte where it stopped.

mod range;

pub use range::{outstanding_bytes, plan_chunks, validate_ranges, ChunkRange, OPEN_END};
