//! I/O pump: move one chunk's bytes from the network into a sink.
//!
//! The pump owns its retry loop. Every attempt re-opens the range at the
//! slot's current cursor, so bytes already written are never fetched twice.
//! While reading it keeps the slot cursor, the low-water mark and the shared
//! progress current, persists metadata on a timer (and at least every
//! `FLUSH_BYTES`) and paces itself against the speed limit.

mod throttle;

use std::time::Duration;

use throttle::Throttle;

use crate::control::{CancelToken, Subscription};
use crate::http::ChunkStream;
use crate::limiter::SpeedLimiter;
use crate::progress::{DownloadProgress, ProgressCallback};
use crate::retry::{classify, ChunkError, RetryDecision};
use crate::session::ChunkSession;
use crate::storage::OutputSink;

/// Bytes read from the network per iteration.
pub const BUFFER_SIZE: usize = 16 << 10;
/// Written bytes after which a chunk saves its cursor even if the flush
/// interval has not passed yet.
pub const FLUSH_BYTES: u64 = 1 << 20;

/// What a pump shares with the rest of its download.
pub struct PumpContext<'a> {
    pub progress: &'a DownloadProgress,
    pub callback: Option<&'a ProgressCallback>,
    pub limiter: Option<&'a SpeedLimiter>,
    /// Chunks of this download that may run at the same time.
    pub concurrency: usize,
    /// Minimum time between metadata saves while reading.
    pub flush_interval: Duration,
}

/// Subscriptions and pacing state that live for the whole pump, across retries.
struct Pacing {
    throttle: Throttle,
    limiter_changes: Option<Subscription>,
    range_changes: Subscription,
}

impl Pacing {
    fn new(session: &ChunkSession, ctx: &PumpContext<'_>) -> Self {
        let mut throttle = Throttle::new(ctx.concurrency);
        throttle.recalculate(
            ctx.limiter.and_then(SpeedLimiter::effective),
            session.metadata().outstanding_count(),
        );
        Self {
            throttle,
            limiter_changes: ctx.limiter.map(SpeedLimiter::subscribe),
            range_changes: session.metadata().subscribe_range_count(),
        }
    }

    /// Pick up limit or range-count changes since the last write.
    fn refresh(&mut self, session: &ChunkSession, ctx: &PumpContext<'_>) {
        let limit_changed = self
            .limiter_changes
            .as_ref()
            .is_some_and(Subscription::take_changed);
        let ranges_changed = self.range_changes.take_changed();
        if !limit_changed && !ranges_changed {
            return;
        }
        let limit = ctx.limiter.and_then(SpeedLimiter::effective);
        if limit_changed {
            ctx.progress.bandwidth().set_limit(limit);
        }
        self.throttle
            .recalculate(limit, session.metadata().outstanding_count());
        tracing::trace!(
            chunk = session.index(),
            share = ?self.throttle.share(),
            "throttle share recalculated"
        );
    }
}

/// Download the rest of `session`'s range into `sink`.
///
/// `preopened` is used for the first attempt only; retries open their own
/// stream. The sink must already be the chunk's destination: seekable sinks
/// are positioned at the cursor, forward-only sinks must be at it.
///
/// On every exit the limiter and range-count subscriptions are released and
/// the metadata is saved after syncing the sink.
pub fn pump_chunk<S>(
    session: &ChunkSession,
    mut preopened: Option<ChunkStream>,
    sink: &mut S,
    ctx: &PumpContext<'_>,
    token: &CancelToken,
) -> Result<(), ChunkError>
where
    S: OutputSink + ?Sized,
{
    if session.current_range().is_consumed() {
        return Ok(());
    }

    let mut pacing = Pacing::new(session, ctx);
    let policy = session.policy();
    let mut failures = 0u32;
    let result = loop {
        let before = session.current_range().written;
        let err = match pump_attempt(session, preopened.take(), sink, ctx, &mut pacing, token) {
            Ok(()) => break Ok(()),
            Err(e) => e,
        };
        if session.current_range().written > before {
            failures = 0;
        }
        failures += 1;
        match policy.decide(failures, classify(&err)) {
            RetryDecision::NoRetry => break Err(err),
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    chunk = session.index(),
                    attempt = failures,
                    offset = session.current_range().written,
                    error = %err,
                    "chunk transfer failed, retrying"
                );
                if let Err(reason) = token.sleep(delay) {
                    break Err(ChunkError::from_cancel(reason));
                }
            }
        }
    };
    drop(pacing);

    let saved = session.metadata().save_with(|| sink.sync_data());
    match (result, saved) {
        (Err(e), saved) => {
            if let Err(save_err) = saved {
                tracing::warn!(chunk = session.index(), error = %save_err, "saving metadata after failure");
            }
            Err(e)
        }
        (Ok(()), Err(save_err)) => Err(ChunkError::from_save(save_err)),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn pump_attempt<S>(
    session: &ChunkSession,
    preopened: Option<ChunkStream>,
    sink: &mut S,
    ctx: &PumpContext<'_>,
    pacing: &mut Pacing,
    token: &CancelToken,
) -> Result<(), ChunkError>
where
    S: OutputSink + ?Sized,
{
    let range = session.current_range();
    if range.is_consumed() {
        return Ok(());
    }
    let policy = session.policy();
    let mut stream = match preopened {
        Some(stream) => stream,
        None => ChunkStream::open_once(
            session.client(),
            session.url(),
            range.written,
            range.end,
            policy.timeout,
            token,
        )?,
    };
    let metadata = session.metadata();
    // Only persisted downloads may grow the sink ahead of the cursor: without a
    // sidecar the sink's length is the only record of how far it got.
    if sink.seek_to(range.written)? && metadata.sidecar().is_some() && !range.is_open_ended() {
        sink.reserve(range.end)?;
    }

    let index = session.index();
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut cursor = range.written;
    let mut unsaved = 0u64;
    loop {
        let want = if range.is_open_ended() {
            BUFFER_SIZE
        } else {
            (range.end - cursor).min(BUFFER_SIZE as u64) as usize
        };
        if want == 0 {
            break;
        }
        let n = stream.read(&mut buf[..want], policy.timeout, token)?;
        if n == 0 {
            break;
        }
        sink.write_all(&buf[..n])?;
        cursor = metadata.advance(index, n as u64);
        metadata.update_last_end_offset(cursor);
        ctx.progress.advance(n as u64);
        if let Some(callback) = ctx.callback {
            callback(n, ctx.progress);
        }
        unsaved += n as u64;
        let saved = if unsaved >= FLUSH_BYTES {
            metadata.save_with(|| sink.sync_data()).map(|()| true)
        } else {
            metadata.save_if_due(ctx.flush_interval, || sink.sync_data())
        };
        if saved.map_err(ChunkError::from_save)? {
            unsaved = 0;
        }

        pacing.refresh(session, ctx);
        pacing.throttle.record(n as u64);
        if let Some(delay) = pacing.throttle.delay() {
            token.sleep(delay).map_err(ChunkError::from_cancel)?;
            pacing.throttle.restart();
        }
        let aggregate = ctx.progress.bandwidth().pop_speed_retrieve_time();
        if !aggregate.is_zero() {
            token.sleep(aggregate).map_err(ChunkError::from_cancel)?;
        }
    }

    if !range.is_open_ended() && cursor < range.end {
        return Err(ChunkError::PartialTransfer {
            expected: range.end - range.start,
            received: cursor - range.start,
        });
    }
    tracing::debug!(chunk = index, end = cursor, "chunk transfer finished");
    Ok(())
}

#[cfg(test)]
mod tests;
