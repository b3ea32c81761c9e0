//! Core types used throughout limestream.
//!
//! These types describe the streaming engine's configuration, its per-direction
//! worker state, the memory layouts accepted by `read`/`write`, and the stats
//! snapshot reported to callers.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Streaming direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Device to host.
    Rx,
    /// Host to device.
    Tx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Rx => write!(f, "RX"),
            Direction::Tx => write!(f, "TX"),
        }
    }
}

/// How sample timestamps are treated for the life of an engine instance.
///
/// The raw integer encoding matches the board firmware convention:
/// `0` = packets synchronized, `1` = packets not synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationMode {
    /// Timestamps are meaningful: TX blocks are scheduled against the device
    /// sample clock and RX blocks carry the device tick of their first sample.
    Synchronized,
    /// Timestamps are ignored; samples stream as fast as the link allows.
    Unsynchronized,
}

impl OperationMode {
    /// Decode the raw firmware mode value.
    pub fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(OperationMode::Synchronized),
            1 => Ok(OperationMode::Unsynchronized),
            other => Err(Error::InvalidParameter(format!(
                "unknown operation mode {other}"
            ))),
        }
    }

    /// The raw firmware mode value.
    pub fn as_raw(&self) -> i32 {
        match self {
            OperationMode::Synchronized => 0,
            OperationMode::Unsynchronized => 1,
        }
    }

    /// Whether timestamps are meaningful in this mode.
    pub fn is_synchronized(&self) -> bool {
        matches!(self, OperationMode::Synchronized)
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationMode::Synchronized => write!(f, "synchronized"),
            OperationMode::Unsynchronized => write!(f, "unsynchronized"),
        }
    }
}

/// Error returned when a string cannot be parsed into an [`OperationMode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseModeError(String);

impl fmt::Display for ParseModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown operation mode: {}", self.0)
    }
}

impl std::error::Error for ParseModeError {}

impl FromStr for OperationMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sync" | "synchronized" | "0" => Ok(OperationMode::Synchronized),
            "unsync" | "unsynchronized" | "1" => Ok(OperationMode::Unsynchronized),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

/// Memory layout of a caller buffer passed to `read`/`write`.
///
/// All layouts hold `i16` components with I and Q adjacent:
///
/// ```text
/// Channel(c)    [I0 Q0 I1 Q1 ...]                       one channel
/// Concatenated  [ch0: I0 Q0 I1 Q1 ...][ch1: I0 Q0 ...]  all channels
/// Interleaved   [ch0 I0 Q0][ch1 I0 Q0][ch0 I1 Q1]...     all channels
/// ```
///
/// Multi-channel layouts move the same number of samples on every channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferLayout {
    /// A single channel.
    Channel(usize),
    /// Every channel's samples back to back, channel 0 first.
    Concatenated,
    /// Sample-by-sample across channels.
    Interleaved,
}

impl BufferLayout {
    /// Number of channels the caller buffer spans.
    pub fn channel_span(&self, channels: usize) -> usize {
        match self {
            BufferLayout::Channel(_) => 1,
            BufferLayout::Concatenated | BufferLayout::Interleaved => channels,
        }
    }

    /// Number of samples per channel held by a buffer of `components` `i16`
    /// values. Trailing components that do not form a whole frame are ignored.
    pub fn samples_per_channel(&self, components: usize, channels: usize) -> usize {
        let span = self.channel_span(channels).max(1);
        components / (2 * span)
    }
}

/// Lifecycle state of a streaming worker.
///
/// ```text
/// Stopped -> Starting -> Running -> Stopping -> Stopped
///                           |
///                           +-> Failed (retry budget exhausted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Failed = 4,
}

impl WorkerState {
    /// Decode the value stored in an atomic state cell.
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => WorkerState::Starting,
            2 => WorkerState::Running,
            3 => WorkerState::Stopping,
            4 => WorkerState::Failed,
            _ => WorkerState::Stopped,
        }
    }

    /// Whether a worker task is alive in this state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            WorkerState::Starting | WorkerState::Running | WorkerState::Stopping
        )
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Stopped => "stopped",
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Parameters fixed at engine initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Board reference clock in MHz (e.g. 30.72).
    pub ref_clock_mhz: f32,
    /// Timestamp handling, immutable for the life of the engine.
    pub mode: OperationMode,
    /// Ring buffer capacity in samples, per channel and per direction.
    pub buffer_length: usize,
    /// Number of channels; channel ids are `0..channels`.
    pub channels: u8,
}

impl EngineConfig {
    /// Create a new configuration.
    pub fn new(ref_clock_mhz: f32, mode: OperationMode, buffer_length: usize, channels: u8) -> Self {
        EngineConfig {
            ref_clock_mhz,
            mode,
            buffer_length,
            channels,
        }
    }

    /// Check the configuration without side effects.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(Error::InvalidParameter(
                "channel count must be at least 1".into(),
            ));
        }
        if self.buffer_length == 0 {
            return Err(Error::InvalidParameter(
                "buffer length must be non-zero".into(),
            ));
        }
        if !self.ref_clock_mhz.is_finite() || self.ref_clock_mhz <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "reference clock {} MHz is not a positive frequency",
                self.ref_clock_mhz
            )));
        }
        Ok(())
    }

    /// Nominal device sample rate derived from the reference clock.
    pub fn nominal_sample_rate_hz(&self) -> f64 {
        self.ref_clock_mhz as f64 * 1_000_000.0
    }

    /// Validate a channel id against the configured channel count.
    pub fn check_channel(&self, channel: usize) -> Result<()> {
        if channel >= self.channels as usize {
            return Err(Error::InvalidParameter(format!(
                "channel {channel} out of range (channels: {})",
                self.channels
            )));
        }
        Ok(())
    }
}

/// Point-in-time statistics for one streaming direction.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionStats {
    /// Ring buffer capacity in samples, summed over all channels.
    pub buffer_capacity: usize,
    /// Samples currently buffered, summed over all channels.
    pub occupied: usize,
    /// Approximate sample rate in samples/s, measured from moved data.
    pub sample_rate_hz: f64,
    /// Worker lifecycle state.
    pub state: WorkerState,
    /// Whether the worker stopped after exhausting its retry budget.
    pub failed: bool,
    /// Total samples moved across the transport.
    pub total_samples: u64,
    /// RX timestamp discontinuities observed.
    pub timestamp_gaps: u64,
    /// TX packets transmitted after their scheduled tick.
    pub late_packets: u64,
    /// Samples discarded: RX overflow, unfinished RX bursts at stop, and TX
    /// runs lost when the transport gave up.
    pub dropped_samples: u64,
    /// RX packets discarded because they could not be decoded.
    pub malformed_packets: u64,
}

/// Stats for both directions, recomputed on every request.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub rx: DirectionStats,
    pub tx: DirectionStats,
}

impl StatsSnapshot {
    /// Stats for the given direction.
    pub fn direction(&self, direction: Direction) -> &DirectionStats {
        match direction {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_mode_raw_encoding() {
        assert_eq!(OperationMode::from_raw(0).unwrap(), OperationMode::Synchronized);
        assert_eq!(
            OperationMode::from_raw(1).unwrap(),
            OperationMode::Unsynchronized
        );
        assert!(matches!(
            OperationMode::from_raw(7),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(OperationMode::Synchronized.as_raw(), 0);
        assert_eq!(OperationMode::Unsynchronized.as_raw(), 1);
    }

    #[test]
    fn operation_mode_from_str() {
        assert_eq!("sync".parse::<OperationMode>().unwrap(), OperationMode::Synchronized);
        assert_eq!(
            "Unsynchronized".parse::<OperationMode>().unwrap(),
            OperationMode::Unsynchronized
        );
        assert!("burst".parse::<OperationMode>().is_err());
    }

    #[test]
    fn layout_samples_per_channel() {
        assert_eq!(BufferLayout::Channel(1).samples_per_channel(2048, 2), 1024);
        assert_eq!(BufferLayout::Concatenated.samples_per_channel(2048, 2), 512);
        assert_eq!(BufferLayout::Interleaved.samples_per_channel(2050, 2), 512);
        assert_eq!(BufferLayout::Channel(0).samples_per_channel(3, 1), 1);
    }

    #[test]
    fn worker_state_roundtrip_through_u8() {
        for state in [
            WorkerState::Stopped,
            WorkerState::Starting,
            WorkerState::Running,
            WorkerState::Stopping,
            WorkerState::Failed,
        ] {
            assert_eq!(WorkerState::from_u8(state as u8), state);
        }
        assert!(WorkerState::Running.is_active());
        assert!(!WorkerState::Failed.is_active());
    }

    #[test]
    fn config_validation() {
        let ok = EngineConfig::new(30.72, OperationMode::Synchronized, 4096, 2);
        assert!(ok.validate().is_ok());

        let no_channels = EngineConfig { channels: 0, ..ok.clone() };
        assert!(matches!(no_channels.validate(), Err(Error::InvalidParameter(_))));

        let empty = EngineConfig { buffer_length: 0, ..ok.clone() };
        assert!(matches!(empty.validate(), Err(Error::InvalidParameter(_))));

        let bad_clock = EngineConfig { ref_clock_mhz: 0.0, ..ok };
        assert!(matches!(bad_clock.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn config_channel_check() {
        let config = EngineConfig::new(30.72, OperationMode::Synchronized, 4096, 2);
        assert!(config.check_channel(1).is_ok());
        assert!(matches!(config.check_channel(5), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn nominal_rate_from_ref_clock() {
        let config = EngineConfig::new(30.72, OperationMode::Synchronized, 16, 1);
        assert!((config.nominal_sample_rate_hz() - 30_720_000.0).abs() < 1.0);
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Rx.to_string(), "RX");
        assert_eq!(Direction::Tx.to_string(), "TX");
    }
}
