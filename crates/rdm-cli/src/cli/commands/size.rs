//! `rdm size <url> <path>` – bytes of a partial download that a resume would keep.

use anyhow::Result;
use rdm_core::config::RdmConfig;
use rdm_core::Downloader;
use std::path::PathBuf;

use super::run_cancellable;

pub async fn run_size(
    cfg: &RdmConfig,
    url: String,
    path: PathBuf,
    expected: Option<u64>,
) -> Result<()> {
    let downloader = Downloader::from_config(cfg);
    let shown = path.clone();
    let bytes = run_cancellable(move |token| {
        downloader.downloaded_file_size(&url, &path, expected, &token)
    })
    .await?;
    println!("{}  {}", bytes, shown.display());
    Ok(())
}
