//! Progress line on stderr, redrawn at most every 500 ms.

use rdm_core::progress::ProgressStats;
use rdm_core::{DownloadProgress, ProgressCallback};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
const MIB: f64 = 1_048_576.0;

/// Callback that redraws the progress line; the final update is always drawn.
pub fn printer() -> Arc<ProgressCallback> {
    let last_print: Mutex<Option<Instant>> = Mutex::new(None);
    Arc::new(move |_n: usize, progress: &DownloadProgress| {
        let stats = progress.stats();
        let finished = stats.total_bytes.is_some_and(|t| stats.bytes_done >= t);
        let now = Instant::now();
        let mut last = last_print.lock().unwrap_or_else(PoisonError::into_inner);
        if !finished && last.is_some_and(|t| now.duration_since(t) < PROGRESS_INTERVAL) {
            return;
        }
        *last = Some(now);
        eprint!("{}", format_line(&stats));
    })
}

/// Ends the progress line.
pub fn finish() {
    eprintln!();
}

pub fn format_line(stats: &ProgressStats) -> String {
    let done_mib = stats.bytes_done as f64 / MIB;
    let rate_mib = stats.bytes_per_sec() / MIB;
    match (stats.total_bytes, stats.fraction()) {
        (Some(total), Some(fraction)) => {
            let eta = stats
                .eta_secs()
                .map(|s| format!("{:.0}s", s))
                .unwrap_or_else(|| "?".to_string());
            format!(
                "\r  {:.1} / {:.1} MiB ({:.1}%)  {:.2} MiB/s  ETA {}  ",
                done_mib,
                total as f64 / MIB,
                fraction * 100.0,
                rate_mib,
                eta
            )
        }
        _ => format!("\r  {:.1} MiB  {:.2} MiB/s  ", done_mib, rate_mib),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(done: u64, total: Option<u64>) -> ProgressStats {
        ProgressStats {
            bytes_done: done,
            total_bytes: total,
            elapsed_secs: 2.0,
            speed: 1_048_576.0,
            average_speed: 1_048_576.0,
        }
    }

    #[test]
    fn line_with_known_total() {
        let line = format_line(&stats(2 << 20, Some(4 << 20)));
        assert_eq!(line, "\r  2.0 / 4.0 MiB (50.0%)  1.00 MiB/s  ETA 2s  ");
    }

    #[test]
    fn line_with_unknown_total() {
        let line = format_line(&stats(3 << 20, None));
        assert_eq!(line, "\r  3.0 MiB  1.00 MiB/s  ");
    }
}
