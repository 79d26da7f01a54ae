//! Chunk sessions: one outstanding range of a download plus what is needed to fetch it.
//!
//! `enumerate_multiple_chunks` turns a destination into the list of sessions
//! still to run (fresh partition or resume), and `create_single_session`
//! builds the one in-memory session used by stream downloads.

use std::path::Path;
use std::sync::Arc;

use crate::control::CancelToken;
use crate::error::DownloadError;
use crate::http::{probe_remote, ChunkStream, HttpClient};
use crate::metadata::{self, Metadata, ResumeMetadata, ResumeState};
use crate::progress::DownloadProgress;
use crate::retry::{ChunkError, RetryPolicy};
use crate::segmenter::{ChunkRange, OPEN_END};
use crate::storage;

/// One range of a download, bound to the download's shared metadata.
#[derive(Debug, Clone)]
pub struct ChunkSession {
    index: usize,
    metadata: Arc<Metadata>,
    client: HttpClient,
    url: String,
    policy: RetryPolicy,
}

impl ChunkSession {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The session's range with its current cursor.
    pub fn current_range(&self) -> ChunkRange {
        // Sessions are only created for existing slots; an empty range reads as consumed.
        self.metadata
            .range(self.index)
            .unwrap_or_else(|| ChunkRange::new(0, 0))
    }

    /// Probe `url` and return the sessions still needed to complete
    /// `destination`. `None` when the server cannot serve byte ranges of a
    /// known length; the caller then falls back to a single stream.
    ///
    /// Sets the progress total and accounts bytes already on disk.
    #[allow(clippy::too_many_arguments)]
    pub fn enumerate_multiple_chunks(
        client: &HttpClient,
        url: &str,
        destination: &Path,
        overwrite: bool,
        chunk_size: u64,
        progress: &DownloadProgress,
        policy: &RetryPolicy,
        token: &CancelToken,
    ) -> Result<Option<ChunkSessions>, DownloadError> {
        let info = probe_remote(client, url, policy, token)
            .map_err(|e| DownloadError::probe(url, e))?;
        let total = match (info.supports_ranges, info.content_length) {
            (true, Some(total)) => total,
            _ => {
                tracing::info!(url, ?info, "server cannot serve ranges, using a single stream");
                return Ok(None);
            }
        };
        progress.set_total(total);

        let state = if overwrite {
            ResumeState::Restart
        } else {
            metadata::inspect(destination, total)
        };
        let metadata = match state {
            ResumeState::Complete => {
                tracing::info!(path = %destination.display(), "destination already complete");
                let done = Metadata::resumed(
                    url,
                    destination,
                    &ResumeMetadata {
                        url: url.to_string(),
                        total_length: total,
                        ranges: Vec::new(),
                        is_completed: true,
                        last_end_offset: total,
                    },
                );
                done.mark_completed();
                done
            }
            ResumeState::Resume(persisted) => {
                let resumed = Metadata::resumed(url, destination, &persisted);
                for index in resumed.outstanding_indices() {
                    if resumed.range(index).is_some_and(|r| r.is_consumed()) {
                        resumed.pop_range(index);
                    }
                }
                tracing::info!(
                    path = %destination.display(),
                    chunks = resumed.outstanding_count(),
                    missing = resumed.outstanding_bytes(),
                    "resuming download"
                );
                storage::prepare_destination(destination, total, false)?;
                resumed
            }
            ResumeState::Restart => {
                Metadata::delete_metadata_file(destination)?;
                let fresh = Metadata::fresh(url, destination, total, chunk_size);
                // The sidecar must exist before the destination is created or extended.
                fresh.save()?;
                storage::prepare_destination(destination, total, true)?;
                tracing::info!(
                    path = %destination.display(),
                    total,
                    chunks = fresh.slot_count(),
                    "starting fresh download"
                );
                fresh
            }
        };
        progress.skip(total.saturating_sub(metadata.outstanding_bytes()));

        Ok(Some(ChunkSessions::new(
            Arc::new(metadata),
            client,
            url,
            policy,
        )))
    }

    /// Open `[offset_start, offset_end)` (to EOF when `offset_end` is `None`)
    /// and wrap it in a session whose metadata is never persisted. The stream
    /// is returned open, with its content length, so the pump starts without
    /// a second request. `None` when the span is empty.
    pub fn create_single_session(
        client: &HttpClient,
        url: &str,
        offset_start: u64,
        offset_end: Option<u64>,
        policy: &RetryPolicy,
        token: &CancelToken,
    ) -> Result<Option<(ChunkSession, ChunkStream, Option<u64>)>, ChunkError> {
        let requested_end = offset_end.unwrap_or(OPEN_END);
        if requested_end <= offset_start {
            return Ok(None);
        }
        let stream = ChunkStream::open(client, url, offset_start, requested_end, policy, token)?;
        let body = stream.content_length();
        // The server may answer with less than asked for near the end of the resource.
        let end = match body {
            Some(len) => requested_end.min(offset_start.saturating_add(len)),
            None => requested_end,
        };
        if end <= offset_start {
            return Ok(None);
        }
        let total = stream
            .head()
            .content_range
            .and_then(|cr| cr.total)
            .or_else(|| body.map(|len| offset_start + len))
            .unwrap_or(0);
        let metadata = Arc::new(Metadata::in_memory(
            url,
            ChunkRange::new(offset_start, end),
            total,
        ));
        let session = ChunkSession {
            index: 0,
            metadata,
            client: client.clone(),
            url: url.to_string(),
            policy: *policy,
        };
        Ok(Some((session, stream, body)))
    }
}

/// Finite, single-pass sequence of the sessions a download still needs.
#[derive(Debug)]
pub struct ChunkSessions {
    metadata: Arc<Metadata>,
    pending: std::vec::IntoIter<usize>,
    client: HttpClient,
    url: String,
    policy: RetryPolicy,
}

impl ChunkSessions {
    /// One session per slot of `metadata` that is still outstanding.
    pub(crate) fn new(
        metadata: Arc<Metadata>,
        client: &HttpClient,
        url: &str,
        policy: &RetryPolicy,
    ) -> Self {
        let pending = metadata.outstanding_indices();
        Self {
            metadata,
            pending: pending.into_iter(),
            client: client.clone(),
            url: url.to_string(),
            policy: *policy,
        }
    }

    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }
}

impl Iterator for ChunkSessions {
    type Item = ChunkSession;

    fn next(&mut self) -> Option<ChunkSession> {
        let index = self.pending.next()?;
        Some(ChunkSession {
            index,
            metadata: Arc::clone(&self.metadata),
            client: self.client.clone(),
            url: self.url.clone(),
            policy: self.policy,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pending.size_hint()
    }
}

impl ExactSizeIterator for ChunkSessions {}

#[cfg(test)]
mod tests {
    use super::*;

    fn sessions_for(metadata: Metadata) -> ChunkSessions {
        ChunkSessions::new(
            Arc::new(metadata),
            &HttpClient::default(),
            "http://example.invalid/f",
            &RetryPolicy::default(),
        )
    }

    #[test]
    fn sessions_share_metadata_and_cover_outstanding_slots() {
        let m = Metadata::fresh("http://example.invalid/f", Path::new("/tmp/f"), 10, 4);
        m.pop_range(1);
        let sessions: Vec<_> = sessions_for(m).collect();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].index(), 0);
        assert_eq!(sessions[1].index(), 2);
        assert!(Arc::ptr_eq(sessions[0].metadata(), sessions[1].metadata()));
        assert_eq!(sessions[1].current_range(), ChunkRange::new(8, 10));
    }

    #[test]
    fn session_sees_cursor_updates() {
        let sessions: Vec<_> =
            sessions_for(Metadata::fresh("http://x/", Path::new("/tmp/f"), 10, 10)).collect();
        let s = &sessions[0];
        s.metadata().advance(s.index(), 6);
        assert_eq!(s.current_range().written, 6);
        assert_eq!(s.current_range().range_header_value(), "bytes=6-9");
    }

    #[test]
    fn iterator_is_exact_and_single_pass() {
        let mut it = sessions_for(Metadata::fresh("http://x/", Path::new("/tmp/f"), 12, 4));
        assert_eq!(it.len(), 3);
        it.next();
        assert_eq!(it.len(), 2);
        assert_eq!(it.by_ref().count(), 2);
        assert!(it.next().is_none());
    }

    #[test]
    fn single_session_rejects_empty_span_without_network() {
        let res = ChunkSession::create_single_session(
            &HttpClient::default(),
            "http://127.0.0.1:9/",
            10,
            Some(10),
            &RetryPolicy::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(res.is_none());
    }
}
