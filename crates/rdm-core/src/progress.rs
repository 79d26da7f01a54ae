//! Download progress shared by all chunks of one download.
//!
//! Pumps add to `DownloadProgress` with atomic adds and then call the
//! caller's `ProgressCallback` with the bytes of that read. `ProgressStats`
//! is a plain snapshot for display (rate, ETA, fraction).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::bandwidth::Bandwidth;

/// Called after every write with the bytes just written and the running totals.
pub type ProgressCallback = dyn Fn(usize, &DownloadProgress) + Send + Sync;

/// Running totals of one download.
#[derive(Debug)]
pub struct DownloadProgress {
    downloaded: AtomicU64,
    /// 0 until known.
    total: AtomicU64,
    started: Instant,
    bandwidth: Bandwidth,
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadProgress {
    pub fn new() -> Self {
        Self {
            downloaded: AtomicU64::new(0),
            total: AtomicU64::new(0),
            started: Instant::now(),
            bandwidth: Bandwidth::new(),
        }
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Acquire)
    }

    /// Total size, `None` while unknown.
    pub fn bytes_total(&self) -> Option<u64> {
        match self.total.load(Ordering::Acquire) {
            0 => None,
            n => Some(n),
        }
    }

    pub(crate) fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
    }

    /// Account bytes written by a pump; also feeds the bandwidth meter.
    pub(crate) fn advance(&self, n: u64) -> u64 {
        self.bandwidth.calculate_speed(n);
        self.downloaded.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Account bytes already on disk when a download resumes (not a transfer).
    pub(crate) fn skip(&self, n: u64) {
        self.downloaded.fetch_add(n, Ordering::AcqRel);
    }

    /// Meter of this download's transfer speed.
    pub fn bandwidth(&self) -> &Bandwidth {
        &self.bandwidth
    }

    pub fn stats(&self) -> ProgressStats {
        ProgressStats {
            bytes_done: self.bytes_downloaded(),
            total_bytes: self.bytes_total(),
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            speed: self.bandwidth.speed(),
            average_speed: self.bandwidth.average_speed(),
        }
    }
}

/// Snapshot of download progress (CLI-friendly).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    pub bytes_done: u64,
    pub total_bytes: Option<u64>,
    pub elapsed_secs: f64,
    /// Speed of the last one-second window, bytes/s.
    pub speed: f64,
    /// Average of all windows so far, bytes/s.
    pub average_speed: f64,
}

impl ProgressStats {
    /// Current rate: the last window's speed, or the overall average before the first window closes.
    pub fn bytes_per_sec(&self) -> f64 {
        if self.speed > 0.0 {
            return self.speed;
        }
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if total unknown or rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes?.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0]; `None` if the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total_bytes?;
        if total == 0 {
            return Some(1.0);
        }
        Some((self.bytes_done as f64 / total as f64).min(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(done: u64, total: Option<u64>, elapsed: f64, speed: f64) -> ProgressStats {
        ProgressStats {
            bytes_done: done,
            total_bytes: total,
            elapsed_secs: elapsed,
            speed,
            average_speed: speed,
        }
    }

    #[test]
    fn advance_and_skip_are_summed() {
        let p = DownloadProgress::new();
        assert_eq!(p.bytes_total(), None);
        p.set_total(100);
        p.skip(40);
        assert_eq!(p.advance(10), 50);
        assert_eq!(p.bytes_downloaded(), 50);
        assert_eq!(p.stats().fraction(), Some(0.5));
    }

    #[test]
    fn concurrent_advances_do_not_lose_updates() {
        let p = std::sync::Arc::new(DownloadProgress::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = std::sync::Arc::clone(&p);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        p.advance(3);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(p.bytes_downloaded(), 12_000);
    }

    #[test]
    fn eta_uses_window_speed() {
        let s = stats(500, Some(1500), 10.0, 100.0);
        assert_eq!(s.bytes_per_sec(), 100.0);
        assert_eq!(s.eta_secs(), Some(10.0));
    }

    #[test]
    fn eta_falls_back_to_average_rate() {
        let s = stats(500, Some(1000), 5.0, 0.0);
        assert_eq!(s.bytes_per_sec(), 100.0);
        assert_eq!(s.eta_secs(), Some(5.0));
    }

    #[test]
    fn unknown_total() {
        let s = stats(500, None, 5.0, 0.0);
        assert_eq!(s.eta_secs(), None);
        assert_eq!(s.fraction(), None);
    }
}
