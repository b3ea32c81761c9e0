//! limestream-core: Core traits, types, packet codec and error definitions
//! for limestream.
//!
//! This crate defines the device-agnostic abstractions the streaming engine
//! is built on. Port implementations and applications depend on these types
//! without pulling in the engine itself.
//!
//! # Key types
//!
//! - [`ControlPort`] / [`BulkTransport`] -- the two paths of a device port
//! - [`SampleBlock`] -- a timestamped run of IQ samples
//! - [`EngineConfig`] / [`OperationMode`] / [`BufferLayout`] -- engine setup
//! - [`ClockSource`] -- device sample-clock estimation
//! - [`RetryPolicy`] -- bounded retry with backoff for transport failures
//! - [`StreamEvent`] -- diagnostics notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod clock;
pub mod error;
pub mod events;
pub mod packet;
pub mod retry;
pub mod samples;
pub mod transport;
pub mod types;

pub use clock::{ClockSource, ExtrapolatedClock, FeedbackClock, duration_to_ticks, ticks_to_duration};
pub use error::{Error, Result};
pub use events::StreamEvent;
pub use packet::{MAX_SAMPLES_PER_PACKET, PacketHeader, SamplePacket};
pub use retry::{RetryBudget, RetryPolicy};
pub use samples::{IQ_MAX, IQ_MIN, SampleBlock, in_iq_range};
pub use transport::{BulkTransport, ControlPort, DevicePort, SharedPort, share_port};
pub use types::*;
