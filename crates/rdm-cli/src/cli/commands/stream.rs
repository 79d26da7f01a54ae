//! `rdm stream <url>` – single-connection download to a file or stdout.

use anyhow::{Context, Result};
use rdm_core::config::RdmConfig;
use rdm_core::storage::{ForwardSink, OutputSink};
use rdm_core::{Downloader, SpeedLimiter, StreamOptions};
use std::fs::File;
use std::sync::Arc;

use super::{progress, run_cancellable};
use crate::cli::StreamArgs;

pub async fn run_stream(cfg: &RdmConfig, args: StreamArgs) -> Result<()> {
    let downloader = Downloader::from_config(cfg);
    let options = StreamOptions {
        allow_continue: args.continue_,
        offset_start: args.start,
        offset_end: args.end,
        speed_limiter: args
            .limit
            .map(|limit| Arc::new(SpeedLimiter::new(Some(limit)))),
        progress: args.output.is_some().then(progress::printer),
    };

    // With --continue the file is addressed by resource offset and resumed at its length.
    let mut sink: Box<dyn OutputSink + Send> = match &args.output {
        Some(path) if args.continue_ => {
            let file = File::options()
                .create(true)
                .write(true)
                .truncate(false)
                .open(path)
                .with_context(|| format!("open {}", path.display()))?;
            Box::new(file)
        }
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("create {}", path.display()))?;
            Box::new(ForwardSink(file))
        }
        None => Box::new(ForwardSink(std::io::stdout())),
    };
    tracing::info!(url = %args.url, output = ?args.output, "stream");

    let url = args.url.clone();
    let result = run_cancellable(move |token| {
        downloader.download_to_stream(&url, sink.as_mut(), &options, &token)
    })
    .await;
    if args.output.is_some() {
        progress::finish();
    }
    result
}
