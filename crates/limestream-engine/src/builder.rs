//! EngineBuilder -- fluent builder for constructing [`StreamEngine`] instances.
//!
//! Separates the streaming tunables (retry policy, poll interval, packet
//! size, clock source) from the per-session parameters passed to
//! [`StreamEngine::init`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use limestream_engine::EngineBuilder;
//! use limestream_core::{RetryPolicy, SharedPort};
//!
//! # fn example(port: SharedPort) -> limestream_core::Result<()> {
//! let engine = EngineBuilder::new(port)
//!     .retry_policy(RetryPolicy { max_retries: 5, ..Default::default() })
//!     .poll_interval(Duration::from_millis(5))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use limestream_core::clock::{ClockSource, ExtrapolatedClock, FeedbackClock};
use limestream_core::error::{Error, Result};
use limestream_core::packet::MAX_SAMPLES_PER_PACKET;
use limestream_core::retry::RetryPolicy;
use limestream_core::transport::SharedPort;

use crate::engine::StreamEngine;

/// How the engine estimates the device sample clock in synchronized mode.
#[derive(Debug, Clone, Default)]
pub enum ClockStrategy {
    /// Free-run from wall time at the nominal rate.
    Extrapolated,
    /// Follow timestamps observed on the RX path, compensating drift.
    #[default]
    Feedback,
    /// A caller-supplied clock source, used as is.
    Custom(Arc<dyn ClockSource>),
}

impl ClockStrategy {
    pub(crate) fn create(&self, rate_hz: f64) -> Arc<dyn ClockSource> {
        match self {
            ClockStrategy::Extrapolated => Arc::new(ExtrapolatedClock::new(rate_hz)),
            ClockStrategy::Feedback => Arc::new(FeedbackClock::new(rate_hz)),
            ClockStrategy::Custom(clock) => clock.clone(),
        }
    }
}

/// Tunables shared by the engine and its workers.
#[derive(Debug, Clone)]
pub(crate) struct StreamOptions {
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub packet_samples: usize,
    pub overflow_wait: Duration,
    pub event_capacity: usize,
    pub clock: ClockStrategy,
    pub sample_rate_hz: Option<f64>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            retry: RetryPolicy::default(),
            poll_interval: Duration::from_millis(10),
            packet_samples: MAX_SAMPLES_PER_PACKET,
            overflow_wait: Duration::from_millis(10),
            event_capacity: 256,
            clock: ClockStrategy::default(),
            sample_rate_hz: None,
        }
    }
}

/// Fluent builder for [`StreamEngine`].
///
/// Every setting has a default, so the simplest usage is:
///
/// ```ignore
/// let engine = EngineBuilder::new(port).build()?;
/// ```
pub struct EngineBuilder {
    port: SharedPort,
    options: StreamOptions,
}

impl EngineBuilder {
    /// Create a builder for an engine streaming over `port`.
    pub fn new(port: SharedPort) -> Self {
        EngineBuilder {
            port,
            options: StreamOptions::default(),
        }
    }

    /// Retry policy applied by both workers to transport failures
    /// (default: 3 retries, 20ms backoff doubling up to 200ms).
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.options.retry = policy;
        self
    }

    /// Upper bound on a single bulk receive and on an idle TX wait
    /// (default: 10ms). Also bounds how long a stop request waits for the
    /// RX worker.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.options.poll_interval = interval;
        self
    }

    /// Maximum samples per transmitted packet (default: 1020, the most a
    /// 4096-byte packet holds).
    pub fn packet_samples(mut self, samples: usize) -> Self {
        self.options.packet_samples = samples;
        self
    }

    /// How long the RX worker waits for ring space before dropping received
    /// samples (default: 10ms).
    pub fn overflow_wait(mut self, wait: Duration) -> Self {
        self.options.overflow_wait = wait;
        self
    }

    /// Capacity of the [`StreamEvent`](limestream_core::StreamEvent)
    /// broadcast channel (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.options.event_capacity = capacity;
        self
    }

    /// Device clock estimation strategy (default: [`ClockStrategy::Feedback`]).
    pub fn clock(mut self, strategy: ClockStrategy) -> Self {
        self.options.clock = strategy;
        self
    }

    /// Override the sample rate used by the clock source. By default the
    /// rate is the reference clock passed to `init`.
    pub fn sample_rate_hz(mut self, rate: f64) -> Self {
        self.options.sample_rate_hz = Some(rate);
        self
    }

    /// Validate the settings and create an uninitialized engine.
    pub fn build(self) -> Result<StreamEngine> {
        let o = &self.options;
        if o.poll_interval.is_zero() {
            return Err(Error::InvalidParameter(
                "poll_interval must be non-zero".into(),
            ));
        }
        if o.packet_samples == 0 || o.packet_samples > MAX_SAMPLES_PER_PACKET {
            return Err(Error::InvalidParameter(format!(
                "packet_samples must be in 1..={MAX_SAMPLES_PER_PACKET}, got {}",
                o.packet_samples
            )));
        }
        if o.event_capacity == 0 {
            return Err(Error::InvalidParameter(
                "event_capacity must be non-zero".into(),
            ));
        }
        if let Some(rate) = o.sample_rate_hz {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(Error::InvalidParameter(format!(
                    "sample rate {rate} Hz is not a positive frequency"
                )));
            }
        }
        Ok(StreamEngine::new(self.port, self.options))
    }
}
