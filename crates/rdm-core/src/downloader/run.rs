//! Bounded worker pool that drains a download's chunk sessions.

use std::path::Path;
use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};

use crate::control::CancelToken;
use crate::error::DownloadError;
use crate::pump::{pump_chunk, PumpContext};
use crate::retry::ChunkError;
use crate::session::{ChunkSession, ChunkSessions};
use crate::storage::open_chunk_writer;

/// Run every session with at most `max_sessions` chunks in flight.
///
/// Workers pull the next session from the shared sequence as soon as their
/// current chunk is done. The first failure cancels the remaining workers
/// through a child token and is returned once all of them have stopped.
pub(super) fn run_sessions(
    sessions: ChunkSessions,
    destination: &Path,
    max_sessions: usize,
    ctx: &PumpContext<'_>,
    token: &CancelToken,
) -> Result<(), DownloadError> {
    let count = sessions.len();
    if count == 0 {
        return Ok(());
    }
    let num_workers = max_sessions.min(count).max(1);
    tracing::debug!(chunks = count, workers = num_workers, "starting chunk workers");

    let metadata = std::sync::Arc::clone(sessions.metadata());
    let work = Mutex::new(sessions);
    let pool_token = token.child();
    let (tx, rx) = mpsc::channel();

    let mut first_error: Option<DownloadError> = None;
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let tx = tx.clone();
            let work = &work;
            let pool_token = &pool_token;
            handles.push(scope.spawn(move || loop {
                if pool_token.is_cancelled() {
                    break;
                }
                let next = work.lock().unwrap_or_else(PoisonError::into_inner).next();
                let Some(session) = next else {
                    break;
                };
                let res = run_chunk(&session, destination, ctx, pool_token);
                if tx.send((session.index(), res)).is_err() {
                    break;
                }
            }));
        }
        drop(tx);

        for (index, res) in rx {
            match res {
                Ok(()) => tracing::debug!(chunk = index, "chunk complete"),
                Err(e) if first_error.is_none() => {
                    if !e.is_cancelled() {
                        tracing::error!(chunk = index, error = %e, "chunk failed, stopping download");
                    }
                    pool_token.cancel();
                    first_error = Some(DownloadError::chunk(index, e));
                }
                Err(e) => tracing::debug!(chunk = index, error = %e, "chunk stopped"),
            }
        }

        for h in handles {
            if h.join().is_err() && first_error.is_none() {
                first_error = Some(DownloadError::Other(anyhow::anyhow!("chunk worker panicked")));
            }
        }
    });

    if let Err(e) = metadata.save() {
        tracing::warn!(error = %e, "saving metadata after chunk workers stopped");
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// One worker iteration: own handle on the destination, pump, then pop the range.
fn run_chunk(
    session: &ChunkSession,
    destination: &Path,
    ctx: &PumpContext<'_>,
    token: &CancelToken,
) -> Result<(), ChunkError> {
    let metadata = session.metadata();
    let mut file = open_chunk_writer(destination)?;
    metadata.save().map_err(ChunkError::from_save)?;
    pump_chunk(session, None, &mut file, ctx, token)?;

    let range = session.current_range();
    if !range.is_consumed() {
        return Err(ChunkError::PartialTransfer {
            expected: range.len(),
            received: range.written - range.start,
        });
    }
    metadata.pop_range(session.index());
    metadata.save().map_err(ChunkError::from_save)?;
    Ok(())
}
