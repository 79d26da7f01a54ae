//! Resume metadata: which byte ranges of a destination are still missing.
//!
//! In memory the ranges of one download live in a fixed table of slots. Each
//! chunk session owns one slot index and is the only writer of that slot's
//! cursor, so progress updates need no lock. Saving takes a snapshot of the
//! table and persists it atomically next to the destination; a finished slot
//! is marked done and left out of the snapshot.

mod types;
mod validate;

pub use types::ResumeMetadata;
pub use validate::{downloaded_size, inspect, ResumeState};

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use crate::control::{ChangeNotifier, Subscription};
use crate::segmenter::{plan_chunks, ChunkRange};

/// Appended to the destination file name to form the sidecar path.
pub const METADATA_SUFFIX: &str = ".rdm.json";
/// A sidecar shorter than this cannot be a complete record.
pub const MIN_METADATA_SIZE: u64 = 64;

#[derive(Debug)]
struct Slot {
    start: u64,
    end: u64,
    written: AtomicU64,
    done: AtomicBool,
}

impl Slot {
    fn from_range(r: &ChunkRange) -> Self {
        Self {
            start: r.start,
            end: r.end,
            written: AtomicU64::new(r.written),
            done: AtomicBool::new(false),
        }
    }

    fn range(&self) -> ChunkRange {
        ChunkRange {
            start: self.start,
            end: self.end,
            written: self.written.load(Ordering::Acquire),
        }
    }
}

/// Shared resume state of one download.
#[derive(Debug)]
pub struct Metadata {
    url: String,
    /// `None` for single-stream downloads, which are never persisted.
    sidecar: Option<PathBuf>,
    total_length: u64,
    slots: Vec<Slot>,
    last_end_offset: AtomicU64,
    completed: AtomicBool,
    /// Serialises saves; holds the time of the last one.
    last_save: Mutex<Instant>,
    range_count: ChangeNotifier,
}

impl Metadata {
    /// `<destination>.rdm.json`.
    pub fn sidecar_path(destination: &Path) -> PathBuf {
        let mut name = OsString::from(destination.as_os_str());
        name.push(METADATA_SUFFIX);
        PathBuf::from(name)
    }

    /// Read the sidecar of `destination`. `None` when it is absent, too short
    /// to be complete, unparsable, or describes impossible ranges.
    pub fn load(destination: &Path) -> Option<ResumeMetadata> {
        let path = Self::sidecar_path(destination);
        let data = fs::read(&path).ok()?;
        if (data.len() as u64) < MIN_METADATA_SIZE {
            tracing::debug!(path = %path.display(), len = data.len(), "sidecar too short, ignoring");
            return None;
        }
        match serde_json::from_slice::<ResumeMetadata>(&data) {
            Ok(m) if crate::segmenter::validate_ranges(&m.ranges, m.total_length) => Some(m),
            Ok(_) => {
                tracing::warn!(path = %path.display(), "sidecar ranges are inconsistent, ignoring");
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "sidecar unreadable, ignoring");
                None
            }
        }
    }

    /// New persistent metadata covering `[0, total_length)` in `chunk_size` chunks.
    pub fn fresh(url: &str, destination: &Path, total_length: u64, chunk_size: u64) -> Self {
        let ranges = plan_chunks(total_length, chunk_size);
        Self::build(url, destination, true, total_length, &ranges, 0)
    }

    /// Persistent metadata continuing from a loaded sidecar.
    pub fn resumed(url: &str, destination: &Path, persisted: &ResumeMetadata) -> Self {
        Self::build(
            url,
            destination,
            true,
            persisted.total_length,
            &persisted.ranges,
            persisted.last_end_offset,
        )
    }

    /// Metadata for a single range that lives only in memory.
    pub fn in_memory(url: &str, range: ChunkRange, total_length: u64) -> Self {
        Self::build(url, Path::new(""), false, total_length, &[range], range.written)
    }

    fn build(
        url: &str,
        destination: &Path,
        persistent: bool,
        total_length: u64,
        ranges: &[ChunkRange],
        last_end_offset: u64,
    ) -> Self {
        Self {
            url: url.to_string(),
            sidecar: persistent.then(|| Self::sidecar_path(destination)),
            total_length,
            slots: ranges.iter().map(Slot::from_range).collect(),
            last_end_offset: AtomicU64::new(last_end_offset),
            completed: AtomicBool::new(false),
            last_save: Mutex::new(Instant::now()),
            range_count: ChangeNotifier::new(),
        }
    }

    pub fn sidecar(&self) -> Option<&Path> {
        self.sidecar.as_deref()
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Number of slots, finished or not.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Current state of slot `index`.
    pub fn range(&self, index: usize) -> Option<ChunkRange> {
        self.slots.get(index).map(Slot::range)
    }

    /// Move slot `index`'s cursor forward by `n` bytes; returns the new cursor.
    /// Only the session owning the slot may call this.
    pub fn advance(&self, index: usize, n: u64) -> u64 {
        match self.slots.get(index) {
            Some(slot) => {
                let next = (slot.written.load(Ordering::Acquire) + n).min(slot.end);
                slot.written.store(next, Ordering::Release);
                next
            }
            None => 0,
        }
    }

    /// Raise the low-water mark to `offset` if it is higher.
    pub fn update_last_end_offset(&self, offset: u64) {
        self.last_end_offset.fetch_max(offset, Ordering::AcqRel);
    }

    pub fn last_end_offset(&self) -> u64 {
        self.last_end_offset.load(Ordering::Acquire)
    }

    /// Mark slot `index` finished and tell subscribers the outstanding count changed.
    pub fn pop_range(&self, index: usize) {
        if let Some(slot) = self.slots.get(index) {
            if !slot.done.swap(true, Ordering::AcqRel) {
                self.range_count.notify();
            }
        }
    }

    /// Slots not yet popped.
    pub fn outstanding_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !s.done.load(Ordering::Acquire))
            .count()
    }

    /// Indices of slots not yet popped, in file order.
    pub fn outstanding_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.done.load(Ordering::Acquire))
            .map(|(i, _)| i)
            .collect()
    }

    /// Bytes still missing across all outstanding slots.
    pub fn outstanding_bytes(&self) -> u64 {
        self.slots
            .iter()
            .filter(|s| !s.done.load(Ordering::Acquire))
            .map(|s| s.range().remaining())
            .sum()
    }

    pub fn subscribe_range_count(&self) -> Subscription {
        self.range_count.subscribe()
    }

    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    pub fn snapshot(&self) -> ResumeMetadata {
        ResumeMetadata {
            url: self.url.clone(),
            total_length: self.total_length,
            ranges: self
                .slots
                .iter()
                .filter(|s| !s.done.load(Ordering::Acquire))
                .map(Slot::range)
                .collect(),
            is_completed: self.completed.load(Ordering::Acquire),
            last_end_offset: self.last_end_offset(),
        }
    }

    /// Persist the current state. No-op for in-memory metadata.
    pub fn save(&self) -> Result<()> {
        self.save_with(|| Ok(()))
    }

    /// Like `save`, running `sync` between taking the snapshot and writing it.
    pub fn save_with<F>(&self, sync: F) -> Result<()>
    where
        F: FnOnce() -> std::io::Result<()>,
    {
        let mut last = self.last_save.lock().unwrap_or_else(PoisonError::into_inner);
        self.persist(&mut last, sync)
    }

    /// Persist if at least `interval` passed since the last save. `sync` runs
    /// after the snapshot is taken and before it is written, so the caller can
    /// flush the data the snapshot refers to. Skips when another save is running.
    pub fn save_if_due<F>(&self, interval: Duration, sync: F) -> Result<bool>
    where
        F: FnOnce() -> std::io::Result<()>,
    {
        if self.sidecar.is_none() {
            return Ok(false);
        }
        let mut last = match self.last_save.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Ok(false),
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };
        if last.elapsed() < interval {
            return Ok(false);
        }
        self.persist(&mut last, sync)?;
        Ok(true)
    }

    fn persist<F>(&self, last: &mut Instant, sync: F) -> Result<()>
    where
        F: FnOnce() -> std::io::Result<()>,
    {
        let Some(path) = self.sidecar.as_deref() else {
            return Ok(());
        };
        let snapshot = self.snapshot();
        sync().context("flush destination before saving metadata")?;
        let data = serde_json::to_vec(&snapshot)?;
        let mut tmp_name = OsString::from(path.as_os_str());
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        {
            let mut f = fs::File::create(&tmp)
                .with_context(|| format!("create {}", tmp.display()))?;
            f.write_all(&data)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)
            .with_context(|| format!("rename {} to {}", tmp.display(), path.display()))?;
        *last = Instant::now();
        Ok(())
    }

    /// Remove the sidecar of `destination`. A missing sidecar is not an error.
    pub fn delete_metadata_file(destination: &Path) -> std::io::Result<()> {
        match fs::remove_file(Self::sidecar_path(destination)) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
