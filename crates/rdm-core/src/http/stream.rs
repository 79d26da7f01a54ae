//! Range GET as a pull-based byte stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::parse::{parse_headers, ResponseHead};
use super::{curl_range, HttpClient};
use crate::control::CancelToken;
use crate::retry::{run_with_retry, ChunkError, RetryPolicy};
use crate::segmenter::OPEN_END;

/// Body frames buffered between the transfer thread and the reader.
const CHANNEL_DEPTH: usize = 8;
/// Longest wait on the channel before re-checking cancellation.
const POLL: Duration = Duration::from_millis(50);

enum Frame {
    Head(ResponseHead),
    Data(Vec<u8>),
    End(Result<(), curl::Error>),
}

/// An open HTTP response whose body is read in pieces.
///
/// Dropping the stream aborts the transfer and joins its thread.
pub struct ChunkStream {
    head: ResponseHead,
    rx: Receiver<Frame>,
    closed: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    pending: Vec<u8>,
    pending_pos: usize,
    finished: bool,
}

impl ChunkStream {
    /// Open `[start, end)` of `url` (`end == OPEN_END` for "to EOF"), retrying
    /// failed attempts with the policy's fixed interval. Each attempt has its
    /// own `policy.timeout` deadline for the response headers.
    pub fn open(
        client: &HttpClient,
        url: &str,
        start: u64,
        end: u64,
        policy: &RetryPolicy,
        token: &CancelToken,
    ) -> Result<Self, ChunkError> {
        run_with_retry(policy, token, "open range stream", || {
            Self::open_once(client, url, start, end, policy.timeout, token)
        })
    }

    /// One attempt of `open`: connect and validate the range answer.
    pub fn open_once(
        client: &HttpClient,
        url: &str,
        start: u64,
        end: u64,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<Self, ChunkError> {
        let range = (start > 0 || end != OPEN_END).then(|| curl_range(start, end));
        let stream = Self::connect(client, url, range, timeout, token)?;
        stream.validate_range(start, end)?;
        tracing::debug!(url, start, end, status = stream.head.status, "range stream open");
        Ok(stream)
    }

    /// Start the transfer and wait for the final response headers. Does not
    /// look at the status code.
    pub(crate) fn connect(
        client: &HttpClient,
        url: &str,
        range: Option<String>,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<Self, ChunkError> {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let closed = Arc::new(AtomicBool::new(false));
        let worker = {
            let client = client.clone();
            let url = url.to_string();
            let closed = Arc::clone(&closed);
            let token = token.clone();
            std::thread::Builder::new()
                .name("rdm-transfer".into())
                .spawn(move || {
                    let result = perform(&client, &url, range.as_deref(), &tx, &closed, &token);
                    let _ = tx.send(Frame::End(result));
                })
                .map_err(ChunkError::Storage)?
        };
        let mut stream = ChunkStream {
            head: ResponseHead::default(),
            rx,
            closed,
            worker: Some(worker),
            pending: Vec::new(),
            pending_pos: 0,
            finished: false,
        };

        let attempt = token.with_timeout(timeout);
        loop {
            match stream.rx.recv_timeout(POLL) {
                Ok(Frame::Head(head)) => {
                    stream.head = head;
                    return Ok(stream);
                }
                Ok(Frame::Data(_)) => {}
                Ok(Frame::End(result)) => {
                    stream.finished = true;
                    token.check().map_err(ChunkError::from_cancel)?;
                    return Err(match result {
                        Err(e) => ChunkError::Curl(e),
                        Ok(()) => ChunkError::Disconnected,
                    });
                }
                Err(RecvTimeoutError::Timeout) => {
                    attempt.check().map_err(ChunkError::from_cancel)?;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    stream.finished = true;
                    return Err(ChunkError::Disconnected);
                }
            }
        }
    }

    fn validate_range(&self, start: u64, end: u64) -> Result<(), ChunkError> {
        let status = self.head.status;
        if !self.head.is_success() {
            return Err(ChunkError::Http(status));
        }
        let ranged = start > 0 || end != OPEN_END;
        let span_start = self.head.content_range.and_then(|cr| cr.span).map(|(a, _)| a);
        let ok = match status {
            206 => span_start.map_or(true, |a| a == start),
            _ => !ranged,
        };
        if ok {
            Ok(())
        } else {
            Err(ChunkError::InvalidRangeResponse {
                status,
                requested_start: start,
            })
        }
    }

    pub fn head(&self) -> &ResponseHead {
        &self.head
    }

    pub fn status(&self) -> u32 {
        self.head.status
    }

    /// `Content-Length` of this response (the body, not the whole resource).
    pub fn content_length(&self) -> Option<u64> {
        self.head.content_length
    }

    /// Read up to `buf.len()` bytes. Waits at most `timeout` for the next piece
    /// of body; returns 0 at end of body.
    pub fn read(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<usize, ChunkError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending_pos < self.pending.len() {
            return Ok(self.take_pending(buf));
        }
        if self.finished {
            return Ok(0);
        }
        let deadline = Instant::now() + timeout;
        loop {
            token.check().map_err(ChunkError::from_cancel)?;
            let now = Instant::now();
            if now >= deadline {
                return Err(ChunkError::Timeout);
            }
            match self.rx.recv_timeout((deadline - now).min(POLL)) {
                Ok(Frame::Data(data)) => {
                    if data.is_empty() {
                        continue;
                    }
                    self.pending = data;
                    self.pending_pos = 0;
                    return Ok(self.take_pending(buf));
                }
                Ok(Frame::End(Ok(()))) => {
                    self.finished = true;
                    return Ok(0);
                }
                Ok(Frame::End(Err(e))) => {
                    self.finished = true;
                    token.check().map_err(ChunkError::from_cancel)?;
                    return Err(ChunkError::Curl(e));
                }
                Ok(Frame::Head(_)) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.finished = true;
                    return Err(ChunkError::Disconnected);
                }
            }
        }
    }

    fn take_pending(&mut self, buf: &mut [u8]) -> usize {
        let avail = &self.pending[self.pending_pos..];
        let n = avail.len().min(buf.len());
        buf[..n].copy_from_slice(&avail[..n]);
        self.pending_pos += n;
        n
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        // Dropping the receiver fails any send blocked on a full channel.
        let (_, dead) = mpsc::sync_channel(0);
        drop(std::mem::replace(&mut self.rx, dead));
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn perform(
    client: &HttpClient,
    url: &str,
    range: Option<&str>,
    tx: &SyncSender<Frame>,
    closed: &AtomicBool,
    token: &CancelToken,
) -> Result<(), curl::Error> {
    let mut easy = curl::easy::Easy::new();
    client.configure(&mut easy, url)?;
    if let Some(range) = range {
        easy.range(range)?;
    }

    let mut transfer = easy.transfer();
    let mut lines: Vec<String> = Vec::new();
    let mut head_sent = false;
    transfer.header_function(move |data| {
        let line = String::from_utf8_lossy(data);
        if !line.trim().is_empty() {
            lines.push(line.into_owned());
            return true;
        }
        let head = parse_headers(&lines);
        lines.clear();
        if head_sent || head.is_interim() {
            return true;
        }
        head_sent = true;
        tx.send(Frame::Head(head)).is_ok()
    })?;
    transfer.write_function(|data| match tx.send(Frame::Data(data.to_vec())) {
        Ok(()) => Ok(data.len()),
        Err(_) => Ok(0),
    })?;
    transfer.progress_function(|_, _, _, _| {
        !closed.load(Ordering::Acquire) && !token.is_cancelled()
    })?;
    transfer.perform()
}
