//! Download orchestration.
//!
//! `Downloader::download` probes the remote, plans or resumes chunks next to
//! the destination and drains them with a bounded pool of worker threads.
//! `download_to_stream` runs a single session into any sink. Both block the
//! calling thread until done, failed or cancelled; cancellation keeps the
//! resume metadata so the next call continues where this one stopped.

mod run;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RdmConfig;
use crate::control::CancelToken;
use crate::error::DownloadError;
use crate::http::{self, HttpClient};
use crate::limiter::SpeedLimiter;
use crate::metadata::{self, Metadata};
use crate::progress::{DownloadProgress, ProgressCallback};
use crate::pump::{pump_chunk, PumpContext};
use crate::retry::RetryPolicy;
use crate::session::ChunkSession;
use crate::storage::{self, OutputSink};

/// Parallel chunks per download when the caller passes 0.
pub const DEFAULT_MAX_SESSIONS: usize = 4;
/// Chunk size when the caller passes 0.
pub const DEFAULT_CHUNK_SIZE: u64 = 4 << 20;
/// How often running chunks persist their cursors.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Per-call options of `Downloader::download`.
#[derive(Clone)]
pub struct DownloadOptions {
    /// Discard existing resume metadata and start over.
    pub overwrite: bool,
    /// Chunks in flight at once; 0 = `DEFAULT_MAX_SESSIONS`.
    pub max_sessions: usize,
    /// Bytes per chunk; 0 = `DEFAULT_CHUNK_SIZE`.
    pub chunk_size: u64,
    pub speed_limiter: Option<Arc<SpeedLimiter>>,
    pub progress: Option<Arc<ProgressCallback>>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            max_sessions: DEFAULT_MAX_SESSIONS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            speed_limiter: None,
            progress: None,
        }
    }
}

impl DownloadOptions {
    /// Options from the `[max_sessions, chunk_size, max_bytes_per_sec]` config keys.
    pub fn from_config(cfg: &RdmConfig) -> Self {
        Self {
            max_sessions: cfg.max_sessions,
            chunk_size: cfg.chunk_size,
            speed_limiter: cfg
                .max_bytes_per_sec
                .map(|bps| Arc::new(SpeedLimiter::new(Some(bps)))),
            ..Self::default()
        }
    }

    fn sessions(&self) -> usize {
        match self.max_sessions {
            0 => DEFAULT_MAX_SESSIONS,
            n => n,
        }
    }

    fn chunk(&self) -> u64 {
        match self.chunk_size {
            0 => DEFAULT_CHUNK_SIZE,
            n => n,
        }
    }
}

impl std::fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("overwrite", &self.overwrite)
            .field("max_sessions", &self.max_sessions)
            .field("chunk_size", &self.chunk_size)
            .field("speed_limiter", &self.speed_limiter)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Per-call options of `Downloader::download_to_stream`.
#[derive(Clone, Default)]
pub struct StreamOptions {
    /// Start at the sink's current length when it has one and no start is given.
    pub allow_continue: bool,
    pub offset_start: Option<u64>,
    /// Exclusive end; `None` = to the end of the resource.
    pub offset_end: Option<u64>,
    pub speed_limiter: Option<Arc<SpeedLimiter>>,
    pub progress: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("allow_continue", &self.allow_continue)
            .field("offset_start", &self.offset_start)
            .field("offset_end", &self.offset_end)
            .field("speed_limiter", &self.speed_limiter)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Chunked, resumable, rate-limited HTTP downloader.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: HttpClient,
    policy: RetryPolicy,
    flush_interval: Duration,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new(HttpClient::default(), RetryPolicy::default())
    }
}

impl Downloader {
    pub fn new(client: HttpClient, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }

    pub fn from_config(cfg: &RdmConfig) -> Self {
        Self::new(HttpClient::from_config(cfg), cfg.retry_policy())
            .with_flush_interval(cfg.metadata_flush_interval())
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn http_client(&self) -> &HttpClient {
        &self.client
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Download `url` into `destination`, resuming from its sidecar when valid.
    ///
    /// Blocks until every chunk is written. On success the sidecar is removed;
    /// on failure or cancellation it is kept for the next call.
    pub fn download(
        &self,
        url: &str,
        destination: &Path,
        options: &DownloadOptions,
        token: &CancelToken,
    ) -> Result<(), DownloadError> {
        let url = validate_url(url)?;
        if destination.as_os_str().to_string_lossy().trim().is_empty() {
            return Err(DownloadError::invalid("destination", "must not be empty"));
        }

        let progress = DownloadProgress::new();
        let limiter = options.speed_limiter.as_deref();
        progress
            .bandwidth()
            .set_limit(limiter.and_then(SpeedLimiter::effective));
        let ctx = PumpContext {
            progress: &progress,
            callback: options.progress.as_deref(),
            limiter,
            concurrency: options.sessions(),
            flush_interval: self.flush_interval,
        };

        let sessions = ChunkSession::enumerate_multiple_chunks(
            &self.client,
            url,
            destination,
            options.overwrite,
            options.chunk(),
            &progress,
            &self.policy,
            token,
        )?;
        let Some(sessions) = sessions else {
            return self.download_whole(url, destination, &ctx, token);
        };

        let metadata = Arc::clone(sessions.metadata());
        tracing::info!(
            url,
            path = %destination.display(),
            total = metadata.total_length(),
            chunks = sessions.len(),
            "download started"
        );
        run::run_sessions(sessions, destination, options.sessions(), &ctx, token)?;

        let actual = std::fs::metadata(destination)?.len();
        if actual != metadata.total_length() {
            return Err(DownloadError::SizeMismatch {
                expected: metadata.total_length(),
                actual,
            });
        }
        metadata.mark_completed();
        Metadata::delete_metadata_file(destination)?;
        tracing::info!(
            path = %destination.display(),
            bytes = actual,
            avg_speed = progress.bandwidth().average_speed(),
            "download complete"
        );
        Ok(())
    }

    /// Single-stream fallback for servers without range support. Nothing is
    /// persisted, so an interrupted transfer starts over next time.
    fn download_whole(
        &self,
        url: &str,
        destination: &Path,
        ctx: &PumpContext<'_>,
        token: &CancelToken,
    ) -> Result<(), DownloadError> {
        storage::prepare_destination(destination, 0, true)?;
        let opened =
            ChunkSession::create_single_session(&self.client, url, 0, None, &self.policy, token)
                .map_err(|e| DownloadError::chunk(0, e))?;
        let Some((session, stream, length)) = opened else {
            tracing::info!(url, "empty resource");
            return Ok(());
        };
        if let Some(length) = length {
            ctx.progress.set_total(length);
        }
        let mut file = storage::open_chunk_writer(destination)?;
        pump_chunk(&session, Some(stream), &mut file, ctx, token)
            .map_err(|e| DownloadError::chunk(0, e))?;
        file.sync_all()?;

        let actual = file.metadata()?.len();
        if let Some(expected) = length.filter(|&l| l != actual) {
            return Err(DownloadError::SizeMismatch { expected, actual });
        }
        tracing::info!(path = %destination.display(), bytes = actual, "download complete (single stream)");
        Ok(())
    }

    /// Download `url` (or a span of it) into `sink` over one connection.
    ///
    /// Nothing is persisted; a retry within the call resumes at the last
    /// written byte, but a new call starts from the options again.
    pub fn download_to_stream<S>(
        &self,
        url: &str,
        sink: &mut S,
        options: &StreamOptions,
        token: &CancelToken,
    ) -> Result<(), DownloadError>
    where
        S: OutputSink + ?Sized,
    {
        let url = validate_url(url)?;
        let start = match options.offset_start {
            Some(start) => start,
            None if options.allow_continue => sink.current_len()?.unwrap_or(0),
            None => 0,
        };
        if let Some(end) = options.offset_end.filter(|&end| end < start) {
            return Err(DownloadError::invalid(
                "offset_end",
                format!("{} is before offset_start {}", end, start),
            ));
        }

        let progress = DownloadProgress::new();
        let limiter = options.speed_limiter.as_deref();
        progress
            .bandwidth()
            .set_limit(limiter.and_then(SpeedLimiter::effective));
        let opened = ChunkSession::create_single_session(
            &self.client,
            url,
            start,
            options.offset_end,
            &self.policy,
            token,
        )
        .map_err(|e| DownloadError::chunk(0, e))?;
        let Some((session, stream, _)) = opened else {
            tracing::debug!(url, start, "nothing to stream");
            return Ok(());
        };
        let total = session.metadata().total_length();
        if total > 0 {
            progress.set_total(total);
        }
        progress.skip(start);

        let ctx = PumpContext {
            progress: &progress,
            callback: options.progress.as_deref(),
            limiter,
            concurrency: 1,
            flush_interval: self.flush_interval,
        };
        tracing::info!(url, start, end = ?options.offset_end, "stream download started");
        pump_chunk(&session, Some(stream), sink, &ctx, token)
            .map_err(|e| DownloadError::chunk(0, e))?;
        sink.flush()?;
        Ok(())
    }

    /// Status code of a plain GET on `url` and whether it is a success.
    pub fn url_status(&self, url: &str, token: &CancelToken) -> Result<(u32, bool), DownloadError> {
        let url = validate_url(url)?;
        http::url_status(&self.client, url, self.policy.timeout, token)
            .map_err(|e| DownloadError::probe(url, e))
    }

    /// Bytes of `destination` a download of `url` would keep. Uses
    /// `expected_length` when given (and non-zero) instead of probing.
    pub fn downloaded_file_size(
        &self,
        url: &str,
        destination: &Path,
        expected_length: Option<u64>,
        token: &CancelToken,
    ) -> Result<u64, DownloadError> {
        let url = validate_url(url)?;
        let total = match expected_length.filter(|&n| n > 0) {
            Some(n) => n,
            None => {
                let info = http::probe_remote(&self.client, url, &self.policy, token)
                    .map_err(|e| DownloadError::probe(url, e))?;
                match info.content_length {
                    Some(n) => n,
                    None => return Ok(0),
                }
            }
        };
        Ok(metadata::downloaded_size(destination, total))
    }
}

/// Reject empty or non-HTTP(S) URLs before any I/O. Returns the trimmed URL.
fn validate_url(url: &str) -> Result<&str, DownloadError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(DownloadError::invalid("url", "must not be empty"));
    }
    let parsed = url::Url::parse(url).map_err(|e| DownloadError::invalid("url", e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DownloadError::invalid(
            "url",
            format!("unsupported scheme `{}`", other),
        )),
    }
}
