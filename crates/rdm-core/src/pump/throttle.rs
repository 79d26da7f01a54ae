//! Per-chunk share of a speed limit.

use std::time::{Duration, Instant};

/// Paces one pump against its share of the effective limit.
///
/// The share is the limit divided among the chunks that can run at once. The
/// measured rate is scaled by a calibration factor that shrinks as more chunks
/// run, compensating for per-connection overhead.
#[derive(Debug)]
pub(crate) struct Throttle {
    concurrency: usize,
    /// Bytes/s this pump may use; `None` when unlimited.
    share: Option<f64>,
    bit_per_unit: f64,
    written: u64,
    since: Instant,
}

impl Throttle {
    pub(crate) fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            share: None,
            bit_per_unit: 1000.0,
            written: 0,
            since: Instant::now(),
        }
    }

    /// Recompute share and calibration from the effective limit and the number
    /// of ranges still outstanding in the download.
    pub(crate) fn recalculate(&mut self, limit: Option<u64>, outstanding: usize) {
        let chunks = self.concurrency.min(outstanding.max(1)) as f64;
        self.share = limit.filter(|&l| l > 0).map(|l| l as f64 / chunks);
        self.bit_per_unit = 940.0 - (chunks - 2.0) / 14.0 * 400.0;
    }

    pub(crate) fn share(&self) -> Option<f64> {
        self.share
    }

    pub(crate) fn record(&mut self, n: u64) {
        self.written += n;
    }

    /// How long to sleep now, if the pump is ahead of its share.
    pub(crate) fn delay(&self) -> Option<Duration> {
        self.delay_at(self.since.elapsed())
    }

    fn delay_at(&self, elapsed: Duration) -> Option<Duration> {
        let share = self.share?;
        let elapsed_ms = elapsed.as_millis() as f64;
        if self.written == 0 || elapsed_ms <= 0.0 {
            return None;
        }
        let scaled = self.written as f64 * self.bit_per_unit;
        if scaled / elapsed_ms <= share {
            return None;
        }
        let to_sleep = scaled / share - elapsed_ms;
        (to_sleep > 1.0).then(|| Duration::from_secs_f64(to_sleep / 1000.0))
    }

    /// Start a new measuring window after a sleep.
    pub(crate) fn restart(&mut self) {
        self.written = 0;
        self.since = Instant::now();
    }
}
