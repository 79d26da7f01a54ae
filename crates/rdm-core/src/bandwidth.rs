//! Per-download bandwidth meter.
//!
//! Every pump of a download reports the bytes it just wrote. The meter keeps a
//! one-second sampling window: the instantaneous speed is recomputed on every
//! report, and each time a window closes its speed is folded into the running
//! average. When an aggregate limit is set and the window runs faster than the
//! limit, the meter accumulates the time the download is "ahead", which pumps
//! pop and sleep off.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    started: Instant,
    bytes: u64,
    samples: u64,
    speed: f64,
    average: f64,
    pending_delay_ms: f64,
}

#[derive(Debug)]
pub struct Bandwidth {
    window: Mutex<Window>,
    /// Aggregate cap in bytes/s; `u64::MAX` = unlimited.
    limit: AtomicU64,
}

impl Default for Bandwidth {
    fn default() -> Self {
        Self::new()
    }
}

impl Bandwidth {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(Window {
                started: Instant::now(),
                bytes: 0,
                samples: 0,
                speed: 0.0,
                average: 0.0,
                pending_delay_ms: 0.0,
            }),
            limit: AtomicU64::new(u64::MAX),
        }
    }

    pub fn set_limit(&self, bytes_per_sec: Option<u64>) {
        let v = match bytes_per_sec {
            Some(0) | None => u64::MAX,
            Some(n) => n,
        };
        self.limit.store(v, Ordering::Release);
    }

    pub fn limit(&self) -> Option<u64> {
        match self.limit.load(Ordering::Acquire) {
            u64::MAX => None,
            n => Some(n),
        }
    }

    /// Record `received` bytes.
    pub fn calculate_speed(&self, received: u64) {
        self.calculate_speed_at(received, Instant::now());
    }

    fn calculate_speed_at(&self, received: u64, now: Instant) {
        let mut w = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        // +1ms keeps the very first sample finite.
        let elapsed_ms = now.saturating_duration_since(w.started).as_secs_f64() * 1000.0 + 1.0;
        w.bytes += received;
        let window_bytes = w.bytes;
        let moment = window_bytes as f64 * 1000.0 / elapsed_ms;

        if elapsed_ms > WINDOW.as_millis() as f64 {
            w.speed = moment;
            w.average = (w.average * w.samples as f64 + moment) / (w.samples + 1) as f64;
            w.samples += 1;
            w.bytes = 0;
            w.started = now;
        }

        if let Some(limit) = self.limit() {
            if moment >= limit as f64 {
                let expected_ms = window_bytes as f64 * 1000.0 / limit as f64;
                w.pending_delay_ms += (expected_ms - elapsed_ms).max(0.0);
            }
        }
    }

    /// Take the accumulated throttle delay, leaving zero behind.
    pub fn pop_speed_retrieve_time(&self) -> Duration {
        let mut w = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let ms = std::mem::take(&mut w.pending_delay_ms);
        Duration::from_secs_f64(ms.max(0.0) / 1000.0)
    }

    /// Speed of the last completed window, bytes/s.
    pub fn speed(&self) -> f64 {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .speed
    }

    /// Mean of all completed windows, bytes/s.
    pub fn average_speed(&self) -> f64 {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .average
    }

    pub fn reset(&self) {
        let mut w = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        w.started = Instant::now();
        w.bytes = 0;
        w.samples = 0;
        w.speed = 0.0;
        w.average = 0.0;
        w.pending_delay_ms = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rolls_over_into_speed_and_average() {
        let b = Bandwidth::new();
        let t0 = b.window.lock().unwrap().started;
        b.calculate_speed_at(500_000, t0 + Duration::from_millis(500));
        assert_eq!(b.speed(), 0.0, "window not closed yet");
        b.calculate_speed_at(500_000, t0 + Duration::from_millis(1000));
        // 1_000_000 bytes over ~1001ms
        let s = b.speed();
        assert!(s > 990_000.0 && s < 1_000_000.0, "speed {}", s);
        assert_eq!(b.average_speed(), s);
    }

    #[test]
    fn average_is_mean_of_windows() {
        let b = Bandwidth::new();
        let t0 = b.window.lock().unwrap().started;
        b.calculate_speed_at(1_000_000, t0 + Duration::from_millis(1999));
        let first = b.speed();
        let t1 = t0 + Duration::from_millis(1999);
        b.calculate_speed_at(3_000_000, t1 + Duration::from_millis(1999));
        let second = b.speed();
        let avg = b.average_speed();
        assert!((avg - (first + second) / 2.0).abs() < 1.0);
    }

    #[test]
    fn no_delay_when_unlimited() {
        let b = Bandwidth::new();
        let t0 = b.window.lock().unwrap().started;
        b.calculate_speed_at(10_000_000, t0 + Duration::from_millis(10));
        assert_eq!(b.pop_speed_retrieve_time(), Duration::ZERO);
    }

    #[test]
    fn delay_accumulates_over_limit_and_pops_once() {
        let b = Bandwidth::new();
        b.set_limit(Some(100_000));
        let t0 = b.window.lock().unwrap().started;
        // 50_000 bytes in ~100ms at 100_000 B/s should have taken 500ms.
        b.calculate_speed_at(50_000, t0 + Duration::from_millis(99));
        let d = b.pop_speed_retrieve_time();
        assert!(d >= Duration::from_millis(390) && d <= Duration::from_millis(410), "{:?}", d);
        assert_eq!(b.pop_speed_retrieve_time(), Duration::ZERO);
    }

    #[test]
    fn zero_limit_is_unlimited() {
        let b = Bandwidth::new();
        b.set_limit(Some(0));
        assert_eq!(b.limit(), None);
    }

    #[test]
    fn reset_clears_speeds() {
        let b = Bandwidth::new();
        let t0 = b.window.lock().unwrap().started;
        b.calculate_speed_at(1_000, t0 + Duration::from_millis(1500));
        assert!(b.speed() > 0.0);
        b.reset();
        assert_eq!(b.speed(), 0.0);
        assert_eq!(b.average_speed(), 0.0);
    }
}
