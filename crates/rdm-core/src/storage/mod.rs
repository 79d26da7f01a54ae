//! Output side of the pump: destination files and caller-supplied streams.
//!
//! Chunk workers each open their own handle on the destination (no
//! truncation) and write at their chunk's offset. Stream downloads write into
//! whatever the caller hands in, seeking only when the sink supports it.

mod file;
mod sink;

pub use file::{open_chunk_writer, preallocate, prepare_destination};
pub use sink::{ForwardSink, OutputSink, SeekableSink};
