//! Device sample-clock estimation.
//!
//! In synchronized mode the TX worker holds each block until the device's
//! sample clock reaches the block's timestamp. The host cannot read that
//! clock directly, so it is estimated by a [`ClockSource`]:
//!
//! - [`ExtrapolatedClock`] free-runs from an anchor at the nominal sample
//!   rate, ignoring feedback.
//! - [`FeedbackClock`] re-anchors on timestamps observed in received
//!   packets and tracks the rate drift between observations.
//!
//! Custom sources (for example a test clock that is advanced by hand) plug in
//! through the same trait.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Convert a tick count to wall time at `rate_hz`.
pub fn ticks_to_duration(ticks: u64, rate_hz: f64) -> Duration {
    if rate_hz <= 0.0 || !rate_hz.is_finite() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(ticks as f64 / rate_hz)
}

/// Convert wall time to a tick count at `rate_hz`.
pub fn duration_to_ticks(elapsed: Duration, rate_hz: f64) -> u64 {
    if rate_hz <= 0.0 || !rate_hz.is_finite() {
        return 0;
    }
    (elapsed.as_secs_f64() * rate_hz).round() as u64
}

/// Estimate of the device sample clock.
pub trait ClockSource: Send + Sync + fmt::Debug {
    /// Current device tick estimate.
    fn now(&self) -> u64;

    /// Feed back a device tick observed at the current instant (the end of
    /// a received packet).
    fn observe(&self, tick: u64);

    /// Rate used to convert between ticks and wall time.
    fn sample_rate_hz(&self) -> f64;

    /// Re-anchor the estimate so that [`now`](Self::now) returns `tick` at
    /// the current instant.
    fn anchor(&self, tick: u64);
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    at: Instant,
    tick: u64,
}

impl Anchor {
    fn extrapolate(&self, rate_hz: f64) -> u64 {
        self.tick
            .saturating_add(duration_to_ticks(self.at.elapsed(), rate_hz))
    }
}

/// Free-running clock extrapolated from an anchor at a fixed rate.
///
/// The first call to [`now`](ClockSource::now) anchors tick 0 at the current
/// instant unless [`anchor`](ClockSource::anchor) was called before.
#[derive(Debug)]
pub struct ExtrapolatedClock {
    rate_hz: f64,
    anchor: Mutex<Option<Anchor>>,
}

impl ExtrapolatedClock {
    /// Create a clock running at `rate_hz`.
    pub fn new(rate_hz: f64) -> Self {
        ExtrapolatedClock {
            rate_hz,
            anchor: Mutex::new(None),
        }
    }
}

impl ClockSource for ExtrapolatedClock {
    fn now(&self) -> u64 {
        let mut guard = self.anchor.lock().unwrap_or_else(PoisonError::into_inner);
        let anchor = guard.get_or_insert_with(|| Anchor {
            at: Instant::now(),
            tick: 0,
        });
        anchor.extrapolate(self.rate_hz)
    }

    fn observe(&self, _tick: u64) {}

    fn sample_rate_hz(&self) -> f64 {
        self.rate_hz
    }

    fn anchor(&self, tick: u64) {
        let mut guard = self.anchor.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(Anchor {
            at: Instant::now(),
            tick,
        });
    }
}

/// Smoothing weight applied to each new drift measurement.
const DRIFT_SMOOTHING: f64 = 0.125;

/// Largest drift accepted from a single measurement, in parts per million.
const MAX_DRIFT_PPM: f64 = 1000.0;

/// Observations closer together than this do not update the drift estimate.
const MIN_DRIFT_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct FeedbackState {
    anchor: Option<Anchor>,
    /// Whether `anchor` came from an observed tick.
    observed: bool,
    drift_ppm: f64,
}

/// Clock that follows timestamps fed back from the RX path.
///
/// Between observations the clock extrapolates at the nominal rate corrected
/// by the measured drift. Without any observation it behaves like an
/// [`ExtrapolatedClock`].
#[derive(Debug)]
pub struct FeedbackClock {
    nominal_rate_hz: f64,
    state: Mutex<FeedbackState>,
}

impl FeedbackClock {
    /// Create a clock with the given nominal rate.
    pub fn new(nominal_rate_hz: f64) -> Self {
        FeedbackClock {
            nominal_rate_hz,
            state: Mutex::new(FeedbackState {
                anchor: None,
                observed: false,
                drift_ppm: 0.0,
            }),
        }
    }

    /// Current drift estimate in parts per million.
    pub fn drift_ppm(&self) -> f64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drift_ppm
    }

    fn corrected_rate(&self, drift_ppm: f64) -> f64 {
        self.nominal_rate_hz * (1.0 + drift_ppm / 1_000_000.0)
    }
}

impl ClockSource for FeedbackClock {
    fn now(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let rate = self.corrected_rate(state.drift_ppm);
        let anchor = state.anchor.get_or_insert_with(|| Anchor {
            at: Instant::now(),
            tick: 0,
        });
        anchor.extrapolate(rate)
    }

    fn observe(&self, tick: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if let (Some(prev), true) = (state.anchor, state.observed) {
            let elapsed = now.saturating_duration_since(prev.at);
            if elapsed >= MIN_DRIFT_INTERVAL && tick > prev.tick {
                let measured = (tick - prev.tick) as f64 / elapsed.as_secs_f64();
                let ppm = ((measured / self.nominal_rate_hz) - 1.0) * 1_000_000.0;
                if ppm.abs() <= MAX_DRIFT_PPM {
                    state.drift_ppm += DRIFT_SMOOTHING * (ppm - state.drift_ppm);
                } else {
                    tracing::trace!(ppm, "discarding implausible clock drift sample");
                }
            } else if elapsed < MIN_DRIFT_INTERVAL {
                // Too close to the last anchor to measure; keep the old one so
                // the next interval is long enough.
                return;
            }
        }
        state.anchor = Some(Anchor { at: now, tick });
        state.observed = true;
    }

    fn sample_rate_hz(&self) -> f64 {
        let drift = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drift_ppm;
        self.corrected_rate(drift)
    }

    fn anchor(&self, tick: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.anchor = Some(Anchor {
            at: Instant::now(),
            tick,
        });
        state.observed = false;
    }
}
