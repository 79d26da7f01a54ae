//! Classify HTTP status, curl errors and chunk errors into retry kinds.

use super::error::ChunkError;
use super::policy::ErrorKind;

/// Classify an HTTP status code.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

/// Classify a curl error.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

pub fn classify(e: &ChunkError) -> ErrorKind {
    match e {
        ChunkError::Curl(ce) => classify_curl_error(ce),
        ChunkError::Http(code) => classify_http_status(*code),
        ChunkError::InvalidRangeResponse { .. } => ErrorKind::Other,
        ChunkError::PartialTransfer { .. } | ChunkError::Disconnected => ErrorKind::Connection,
        ChunkError::Timeout => ErrorKind::Timeout,
        ChunkError::Storage(_) => ErrorKind::Other,
        ChunkError::Cancelled => ErrorKind::Cancelled,
    }
}
