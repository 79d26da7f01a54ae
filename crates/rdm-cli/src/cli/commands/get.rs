//! `rdm get <url>` – chunked, resumable download to a file.

use anyhow::{bail, Result};
use rdm_core::config::RdmConfig;
use rdm_core::{checksum, DownloadOptions, Downloader, SpeedLimiter};
use std::path::PathBuf;
use std::sync::Arc;

use super::{progress, run_cancellable};
use crate::cli::GetArgs;

pub async fn run_get(cfg: &RdmConfig, args: GetArgs) -> Result<()> {
    let downloader = Downloader::from_config(cfg);
    let mut options = DownloadOptions::from_config(cfg);
    options.overwrite = args.overwrite;
    if let Some(n) = args.sessions {
        options.max_sessions = n;
    }
    if let Some(size) = args.chunk_size {
        options.chunk_size = size;
    }
    if let Some(limit) = args.limit {
        options.speed_limiter = Some(Arc::new(SpeedLimiter::new(Some(limit))));
    }
    options.progress = Some(progress::printer());

    let destination = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.url));
    tracing::info!(url = %args.url, path = %destination.display(), "get");

    let url = args.url.clone();
    let target = destination.clone();
    let result =
        run_cancellable(move |token| downloader.download(&url, &target, &options, &token)).await;
    progress::finish();
    result?;
    println!("saved {}", destination.display());

    if let Some(expected) = args.sha256.as_deref() {
        match checksum::verify_sha256(&destination, expected)? {
            Ok(()) => println!("sha256 ok"),
            Err(actual) => bail!("sha256 mismatch: expected {}, got {}", expected, actual),
        }
    }
    Ok(())
}

/// Last path segment of `url`, without query or fragment; `download.bin` when empty.
pub(crate) fn default_output(url: &str) -> PathBuf {
    let path = url.split(['?', '#']).next().unwrap_or("");
    let after_scheme = path.split_once("://").map_or(path, |(_, rest)| rest);
    let name = match after_scheme.split_once('/') {
        Some((_, p)) => p.rsplit('/').next().unwrap_or(""),
        None => "",
    };
    if name.is_empty() || name == "." || name == ".." {
        PathBuf::from("download.bin")
    } else {
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_from_url() {
        assert_eq!(
            default_output("https://example.com/pub/file.iso?x=1#frag"),
            PathBuf::from("file.iso")
        );
        assert_eq!(default_output("http://example.com/"), PathBuf::from("download.bin"));
        assert_eq!(default_output("http://example.com"), PathBuf::from("download.bin"));
        assert_eq!(default_output("http://example.com/a/.."), PathBuf::from("download.bin"));
    }
}
