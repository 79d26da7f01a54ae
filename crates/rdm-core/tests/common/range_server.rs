//! Minimal HTTP/1.1 server with Range GET support for integration tests.
//!
//! Serves a single static body, one request per connection. Can ignore ranges,
//! fail or cut off chunk requests, and counts what it sends so tests can check
//! how much a resumed download fetched and how many transfers overlapped.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Body bytes written per socket write.
const WRITE_PIECE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, GET ignores Range and always returns 200 with the full body.
    pub support_ranges: bool,
    /// Answer this many chunk requests (anything but the `0-0` probe) with 503.
    pub fail_first: usize,
    /// Cut off this many chunk responses halfway through the body.
    pub truncate_first: usize,
    /// Pause after every body piece, to keep transfers overlapping.
    pub piece_delay: Option<Duration>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            support_ranges: true,
            fail_first: 0,
            truncate_first: 0,
            piece_delay: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ServerStats {
    bytes_served: AtomicU64,
    requests: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fail_remaining: AtomicUsize,
    truncate_remaining: AtomicUsize,
}

impl ServerStats {
    /// Body bytes written to sockets so far.
    pub fn bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Highest number of bodies being sent at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.bytes_served.store(0, Ordering::SeqCst);
        self.requests.store(0, Ordering::SeqCst);
        self.max_active.store(0, Ordering::SeqCst);
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct RangeServer {
    pub url: String,
    pub stats: Arc<ServerStats>,
}

/// Starts a server in a background thread serving `body`. The server runs
/// until the process exits.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let stats = Arc::new(ServerStats {
        fail_remaining: AtomicUsize::new(opts.fail_first),
        truncate_remaining: AtomicUsize::new(opts.truncate_first),
        ..ServerStats::default()
    });
    {
        let stats = Arc::clone(&stats);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let body = Arc::clone(&body);
                let stats = Arc::clone(&stats);
                thread::spawn(move || handle(stream, &body, opts, &stats));
            }
        });
    }
    RangeServer {
        url: format!("http://127.0.0.1:{}/file.bin", port),
        stats,
    }
}

fn handle(mut stream: TcpStream, body: &[u8], opts: RangeServerOptions, stats: &ServerStats) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(30)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
        return;
    }
    stats.requests.fetch_add(1, Ordering::SeqCst);
    let total = body.len() as u64;
    let is_probe = range == Some((0, 0));

    if !is_probe && ServerStats::take(&stats.fail_remaining) {
        let _ = stream.write_all(
            b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    }

    let (status, content_range, slice) = match range.filter(|_| opts.support_ranges) {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start >= total || start > end_incl {
                let _ = stream.write_all(
                    format!(
                        "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        total
                    )
                    .as_bytes(),
                );
                return;
            }
            let end_excl = (end_incl + 1) as usize;
            (
                "206 Partial Content",
                Some(format!("bytes {}-{}/{}", start, end_incl, total)),
                &body[start as usize..end_excl],
            )
        }
        None => ("200 OK", None, body),
    };
    let mut head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        slice.len()
    );
    if let Some(cr) = content_range {
        head.push_str(&format!("Content-Range: {}\r\n", cr));
    }
    if opts.support_ranges {
        head.push_str("Accept-Ranges: bytes\r\n");
    }
    head.push_str("\r\n");
    if stream.write_all(head.as_bytes()).is_err() {
        return;
    }

    let send = if !is_probe && slice.len() > 1 && ServerStats::take(&stats.truncate_remaining) {
        &slice[..slice.len() / 2]
    } else {
        slice
    };
    let active = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
    stats.max_active.fetch_max(active, Ordering::SeqCst);
    let pieces: Vec<&[u8]> = send.chunks(WRITE_PIECE).collect();
    let mut counted = true;
    for (i, piece) in pieces.iter().enumerate() {
        let last = i + 1 == pieces.len();
        // The client cannot finish (and start its next request) before the
        // last piece arrives, so stop counting this transfer before sending it.
        if last {
            stats.active.fetch_sub(1, Ordering::SeqCst);
            counted = false;
        }
        if stream.write_all(piece).is_err() {
            break;
        }
        stats
            .bytes_served
            .fetch_add(piece.len() as u64, Ordering::SeqCst);
        if let Some(delay) = opts.piece_delay.filter(|_| !last) {
            thread::sleep(delay);
        }
    }
    if counted {
        stats.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Returns (method, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(part) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = part.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
