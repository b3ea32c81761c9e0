//! Per-direction counters and sample-rate measurement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Width of the rate measurement window.
const RATE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct RateWindow {
    started: Instant,
    samples: u64,
    /// Rate measured over the last completed window.
    last_rate: f64,
}

/// Sample-rate meter updated by a worker and read by stats snapshots.
///
/// The rate is computed over consecutive windows of about one second. Until
/// the first window completes, the partial window is extrapolated.
#[derive(Debug)]
pub(crate) struct RateMeter {
    window: Mutex<RateWindow>,
}

impl RateMeter {
    pub(crate) fn new() -> Self {
        RateMeter {
            window: Mutex::new(RateWindow {
                started: Instant::now(),
                samples: 0,
                last_rate: 0.0,
            }),
        }
    }

    /// Account for `samples` moved just now.
    pub(crate) fn record(&self, samples: usize) {
        let mut w = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        w.samples += samples as u64;
        let elapsed = w.started.elapsed();
        if elapsed >= RATE_WINDOW {
            w.last_rate = w.samples as f64 / elapsed.as_secs_f64();
            w.samples = 0;
            w.started = Instant::now();
        }
    }

    /// Current rate estimate in samples per second.
    pub(crate) fn rate(&self) -> f64 {
        let w = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = w.started.elapsed();
        if elapsed >= RATE_WINDOW * 2 {
            // Nothing recorded for a full window: the stream is idle.
            return 0.0;
        }
        if w.last_rate == 0.0 && !elapsed.is_zero() {
            return w.samples as f64 / elapsed.as_secs_f64();
        }
        w.last_rate
    }

    /// Start a fresh measurement.
    pub(crate) fn reset(&self) {
        let mut w = self.window.lock().unwrap_or_else(PoisonError::into_inner);
        w.started = Instant::now();
        w.samples = 0;
        w.last_rate = 0.0;
    }
}

/// Monotonic counters for one direction.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub total_samples: AtomicU64,
    pub timestamp_gaps: AtomicU64,
    pub late_packets: AtomicU64,
    pub dropped_samples: AtomicU64,
    pub malformed_packets: AtomicU64,
}

impl Counters {
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
