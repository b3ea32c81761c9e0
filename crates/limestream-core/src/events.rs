//! Streaming diagnostics events.
//!
//! The engine emits events through a [`tokio::sync::broadcast`] channel when
//! something noteworthy happens on the data path. Monitoring tools subscribe
//! to these instead of polling stats. Delivery is best-effort: slow consumers
//! may miss events, and the workers never wait on subscribers.

use crate::types::{Direction, WorkerState};

/// An event emitted by the streaming engine.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A worker changed lifecycle state.
    StateChanged {
        direction: Direction,
        state: WorkerState,
    },

    /// A received packet did not continue the previous packet's timestamps.
    TimestampGap {
        channel: usize,
        /// Tick the worker expected next.
        expected: u64,
        /// Tick carried by the packet.
        actual: u64,
    },

    /// A TX packet went out after its scheduled tick.
    LateTransmit {
        channel: usize,
        /// Scheduled tick of the first sample.
        timestamp: u64,
        /// Estimated device tick at transmission.
        device_tick: u64,
    },

    /// Received samples were discarded because the RX ring stayed full.
    Overflow { channel: usize, dropped: usize },

    /// A worker exhausted its retry budget and stopped.
    WorkerFailed { direction: Direction, reason: String },
}
