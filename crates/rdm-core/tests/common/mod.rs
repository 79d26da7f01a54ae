#![allow(dead_code)]

pub mod range_server;

use std::time::Duration;

use rdm_core::http::HttpClient;
use rdm_core::retry::RetryPolicy;
use rdm_core::Downloader;

pub const MIB: usize = 1 << 20;

/// Deterministic, non-repeating-per-chunk test body.
pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8 ^ (i / 4096) as u8).collect()
}

/// Downloader with short retry delays so failure tests stay fast.
pub fn fast_downloader(max_retries: u32) -> Downloader {
    Downloader::new(
        HttpClient::default(),
        RetryPolicy {
            max_retries,
            interval: Duration::from_millis(20),
            timeout: Duration::from_secs(5),
        },
    )
    .with_flush_interval(Duration::from_millis(20))
}
