//! HTTP side of the downloader: curl options, range streams and probes.
//!
//! Each `ChunkStream` runs one curl Easy transfer on its own thread and hands
//! the body to the reader through a bounded channel, so a slow reader (disk,
//! throttling) pauses the transfer instead of buffering the whole chunk.

mod parse;
pub mod probe;
mod stream;

pub use parse::{ContentRange, ResponseHead};
pub use probe::{probe_remote, url_status, RemoteInfo};
pub use stream::ChunkStream;

use std::time::Duration;

use crate::config::RdmConfig;

/// Options applied to every curl handle the downloader creates.
#[derive(Debug, Clone)]
pub struct HttpClient {
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub max_redirections: u32,
    /// Extra request headers (e.g. cookies, authorization).
    pub headers: Vec<(String, String)>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::from_config(&RdmConfig::default())
    }
}

impl HttpClient {
    pub fn from_config(cfg: &RdmConfig) -> Self {
        Self {
            user_agent: cfg.user_agent.clone(),
            connect_timeout: Duration::from_secs(cfg.connect_timeout_secs.max(1)),
            max_redirections: 10,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub(crate) fn configure(&self, easy: &mut curl::easy::Easy, url: &str) -> Result<(), curl::Error> {
        easy.url(url)?;
        easy.follow_location(true)?;
        easy.max_redirections(self.max_redirections)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.useragent(&self.user_agent)?;
        if !self.headers.is_empty() {
            let mut list = curl::easy::List::new();
            for (k, v) in &self.headers {
                list.append(&format!("{}: {}", k.trim(), v.trim()))?;
            }
            easy.http_headers(list)?;
        }
        // Needed for the progress callback, which is how transfers get aborted.
        easy.progress(true)?;
        Ok(())
    }
}

/// curl `CURLOPT_RANGE` value for `[start, end)`; `end == OPEN_END` means to EOF.
pub(crate) fn curl_range(start: u64, end: u64) -> String {
    if end == crate::segmenter::OPEN_END {
        format!("{}-", start)
    } else {
        format!("{}-{}", start, end.saturating_sub(1))
    }
}
