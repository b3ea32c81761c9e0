//! A clock source driven by hand.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};

use limestream_core::clock::ClockSource;

/// A [`ClockSource`] whose tick only moves when the test says so.
///
/// Plug it into an engine with `ClockStrategy::Custom` to make synchronized
/// TX scheduling deterministic: blocks stay queued until the test advances
/// the clock past their timestamps.
#[derive(Debug)]
pub struct ManualClock {
    tick: AtomicU64,
    rate_hz: f64,
    observed: Mutex<Vec<u64>>,
}

impl ManualClock {
    /// A clock at tick 0 reporting `rate_hz`.
    pub fn new(rate_hz: f64) -> Self {
        ManualClock {
            tick: AtomicU64::new(0),
            rate_hz,
            observed: Mutex::new(Vec::new()),
        }
    }

    /// Jump to `tick`.
    pub fn set(&self, tick: u64) {
        self.tick.store(tick, Ordering::Release);
    }

    /// Move forward by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.tick.fetch_add(ticks, Ordering::AcqRel);
    }

    /// Ticks passed to [`ClockSource::observe`] so far.
    pub fn observed(&self) -> Vec<u64> {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    fn observe(&self, tick: u64) {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tick);
    }

    fn sample_rate_hz(&self) -> f64 {
        self.rate_hz
    }

    fn anchor(&self, tick: u64) {
        self.set(tick);
    }
}
