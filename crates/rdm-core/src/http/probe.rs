//! Read-only remote probes: resource length / range support, and status.

use std::time::Duration;

use super::stream::ChunkStream;
use super::{curl_range, HttpClient};
use crate::control::CancelToken;
use crate::retry::{run_with_retry, ChunkError, RetryPolicy};

/// What a one-byte range request revealed about the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Full length of the resource, if the server reported it.
    pub content_length: Option<u64>,
    /// Server answered the range request with 206 (or 416 for an empty resource).
    pub supports_ranges: bool,
}

/// Probe `url` with `GET Range: bytes=0-0`, retrying per `policy`.
///
/// A 206 yields the total from `Content-Range`; a plain 200 means the server
/// ignores ranges and its `Content-Length` is the full length.
pub fn probe_remote(
    client: &HttpClient,
    url: &str,
    policy: &RetryPolicy,
    token: &CancelToken,
) -> Result<RemoteInfo, ChunkError> {
    run_with_retry(policy, token, "probe", || {
        let stream = ChunkStream::connect(client, url, Some(curl_range(0, 1)), policy.timeout, token)?;
        let head = stream.head();
        let total = head.content_range.and_then(|cr| cr.total);
        let info = match head.status {
            206 => RemoteInfo {
                content_length: total,
                supports_ranges: total.is_some(),
            },
            416 if total == Some(0) => RemoteInfo {
                content_length: Some(0),
                supports_ranges: true,
            },
            s if (200..300).contains(&s) => RemoteInfo {
                content_length: head.content_length,
                supports_ranges: false,
            },
            s => return Err(ChunkError::Http(s)),
        };
        tracing::debug!(url, ?info, "probed remote");
        Ok(info)
    })
}

/// Status of a plain GET for `url` (headers only; the body is not read).
/// Returns `(status, is_success)`.
pub fn url_status(
    client: &HttpClient,
    url: &str,
    timeout: Duration,
    token: &CancelToken,
) -> Result<(u32, bool), ChunkError> {
    let stream = ChunkStream::connect(client, url, None, timeout, token)?;
    let status = stream.status();
    Ok((status, stream.head().is_success()))
}
