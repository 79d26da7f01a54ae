pub mod config;
pub mod logging;

pub mod bandwidth;
pub mod checksum;
pub mod control;
pub mod downloader;
pub mod error;
pub mod http;
pub mod limiter;
pub mod metadata;
pub mod progress;
pub mod pump;
pub mod retry;
pub mod segmenter;
pub mod session;
pub mod storage;

pub use control::CancelToken;
pub use downloader::{DownloadOptions, Downloader, StreamOptions};
pub use error::DownloadError;
pub use limiter::SpeedLimiter;
pub use progress::{DownloadProgress, ProgressCallback};
