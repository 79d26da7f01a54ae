use super::*;
use crate::http::HttpClient;
use crate::metadata::Metadata;
use crate::retry::RetryPolicy;
use crate::session::{ChunkSession, ChunkSessions};
use crate::storage::ForwardSink;
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A localhost URL nothing listens on.
fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/file.bin", port)
}

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        interval: Duration::from_millis(5),
        timeout: Duration::from_secs(2),
    }
}

fn session_for(dest: &Path, url: &str, total: u64, max_retries: u32) -> ChunkSession {
    let metadata = Metadata::fresh(url, dest, total, total);
    metadata.save().unwrap();
    ChunkSessions::new(
        Arc::new(metadata),
        &HttpClient::default(),
        url,
        &policy(max_retries),
    )
    .next()
    .unwrap()
}

fn ctx(progress: &DownloadProgress) -> PumpContext<'_> {
    PumpContext {
        progress,
        callback: None,
        limiter: None,
        concurrency: 1,
        flush_interval: Duration::from_millis(250),
    }
}

#[test]
fn consumed_range_returns_without_io() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("f.bin");
    let url = closed_url();
    let session = session_for(&dest, &url, 100, 0);
    session.metadata().advance(0, 100);
    let progress = DownloadProgress::new();
    let mut sink = ForwardSink(Vec::new());
    pump_chunk(&session, None, &mut sink, &ctx(&progress), &CancelToken::new()).unwrap();
    assert!(sink.0.is_empty());
    assert_eq!(progress.bytes_downloaded(), 0);
}

#[test]
fn connection_failure_gives_up_after_retries_and_keeps_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("f.bin");
    let url = closed_url();
    let session = session_for(&dest, &url, 100, 1);
    let progress = DownloadProgress::new();
    let mut sink = ForwardSink(Vec::new());
    let err = pump_chunk(&session, None, &mut sink, &ctx(&progress), &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, ChunkError::Curl(_)), "{:?}", err);
    let saved = Metadata::load(&dest).expect("metadata persisted on failure");
    assert_eq!(saved.ranges.len(), 1);
    assert_eq!(saved.ranges[0].written, 0);
}

#[test]
fn cancelled_token_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("f.bin");
    let url = closed_url();
    let session = session_for(&dest, &url, 100, 5);
    let progress = DownloadProgress::new();
    let token = CancelToken::new();
    token.cancel();
    let mut sink = ForwardSink(Vec::new());
    let err = pump_chunk(&session, None, &mut sink, &ctx(&progress), &token).unwrap_err();
    assert!(err.is_cancelled(), "{:?}", err);
}

#[test]
fn subscriptions_are_released_on_exit() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("f.bin");
    let url = closed_url();
    let session = session_for(&dest, &url, 100, 0);
    let progress = DownloadProgress::new();
    let limiter = SpeedLimiter::new(Some(1 << 20));
    let calls = std::sync::Arc::new(AtomicUsize::new(0));
    let calls_cb = std::sync::Arc::clone(&calls);
    let callback = move |_: usize, _: &DownloadProgress| {
        calls_cb.fetch_add(1, Ordering::Relaxed);
    };
    let ctx = PumpContext {
        progress: &progress,
        callback: Some(&callback),
        limiter: Some(&limiter),
        concurrency: 1,
        flush_interval: Duration::from_millis(250),
    };
    let mut sink = ForwardSink(Vec::new());
    let _ = pump_chunk(&session, None, &mut sink, &ctx, &CancelToken::new());
    assert_eq!(limiter.subscriber_count(), 0);
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}
