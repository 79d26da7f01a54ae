//! CLI for the RDM download manager.

mod commands;
mod units;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use rdm_core::config;
use std::path::PathBuf;

use commands::{run_checksum, run_completions, run_get, run_size, run_status, run_stream};
use units::parse_size;

/// Top-level CLI for the RDM download manager.
#[derive(Debug, Parser)]
#[command(name = "rdm")]
#[command(about = "RDM: chunked, resumable, rate-limited HTTP downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL to a file in parallel chunks, resuming if interrupted.
    Get(GetArgs),

    /// Download a URL (or a byte span of it) over one connection to a file or stdout.
    Stream(StreamArgs),

    /// Show the HTTP status of a URL.
    Status {
        /// Direct HTTP/HTTPS URL.
        url: String,
    },

    /// Show how many bytes of a partial download are already usable.
    Size {
        /// Direct HTTP/HTTPS URL the file is downloaded from.
        url: String,
        /// Destination file of the download.
        path: PathBuf,
        /// Known total length in bytes (skips probing the server).
        #[arg(long, value_name = "BYTES", value_parser = parse_size)]
        expected: Option<u64>,
    },

    /// Compute SHA-256 of a file (e.g. after download).
    Checksum {
        /// Path to the file.
        path: PathBuf,
    },

    /// Print shell completions to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Direct HTTP/HTTPS URL to download.
    pub url: String,

    /// Destination file (default: last path segment of the URL, in the current directory).
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Ignore resume metadata and start over.
    #[arg(long)]
    pub overwrite: bool,

    /// Chunks downloaded at the same time (default from config).
    #[arg(short = 'n', long, value_name = "N")]
    pub sessions: Option<usize>,

    /// Chunk size, e.g. 4M or 512K (default from config).
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub chunk_size: Option<u64>,

    /// Speed limit in bytes per second, e.g. 2M (0 = unlimited).
    #[arg(long, value_name = "RATE", value_parser = parse_size)]
    pub limit: Option<u64>,

    /// Verify the finished file against this SHA-256 (hex).
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,
}

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Direct HTTP/HTTPS URL to download.
    pub url: String,

    /// Output file (default: stdout).
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Append to the output file from its current length.
    #[arg(short = 'c', long = "continue")]
    pub continue_: bool,

    /// First byte to fetch.
    #[arg(long, value_name = "OFFSET", value_parser = parse_size)]
    pub start: Option<u64>,

    /// End of the span to fetch (exclusive).
    #[arg(long, value_name = "OFFSET", value_parser = parse_size)]
    pub end: Option<u64>,

    /// Speed limit in bytes per second, e.g. 2M (0 = unlimited).
    #[arg(long, value_name = "RATE", value_parser = parse_size)]
    pub limit: Option<u64>,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        if let CliCommand::Completions { shell } = cli.command {
            return run_completions(shell);
        }
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get(args) => run_get(&cfg, args).await?,
            CliCommand::Stream(args) => run_stream(&cfg, args).await?,
            CliCommand::Status { url } => run_status(&cfg, url).await?,
            CliCommand::Size {
                url,
                path,
                expected,
            } => run_size(&cfg, url, path, expected).await?,
            CliCommand::Checksum { path } => run_checksum(&path)?,
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
