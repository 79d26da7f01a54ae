//! `rdm status <url>` – HTTP status of a URL.

use anyhow::Result;
use rdm_core::config::RdmConfig;
use rdm_core::Downloader;

use super::run_cancellable;

pub async fn run_status(cfg: &RdmConfig, url: String) -> Result<()> {
    let downloader = Downloader::from_config(cfg);
    let (status, ok) = run_cancellable(move |token| downloader.url_status(&url, &token)).await?;
    println!("{} {}", status, if ok { "ok" } else { "error" });
    if !ok {
        anyhow::bail!("server answered HTTP {}", status);
    }
    Ok(())
}
