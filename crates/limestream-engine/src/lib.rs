//! Sample streaming engine for limestream.
//!
//! This crate moves IQ samples between the application and a device port:
//!
//! - **Ring buffers** ([`ring`]) -- fixed-capacity per-channel FIFOs of
//!   timestamped samples with deadline-bounded blocking push and pop.
//! - **Workers** -- one tokio task per direction. The RX task decodes packets
//!   from the bulk transport into the RX rings, detecting timestamp gaps and
//!   assembling bursts; the TX task packetizes queued samples and, in
//!   synchronized mode, holds each run until the device clock reaches its
//!   timestamp.
//! - **Engine** ([`StreamEngine`]) -- the facade: lifecycle, `read`/`write`
//!   with layout descriptors, stats, events and control passthrough.
//! - **Builder** ([`EngineBuilder`]) -- retry policy, polling, packet size
//!   and clock strategy.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use limestream_core::{BufferLayout, EngineConfig, OperationMode, SharedPort};
//! use limestream_engine::EngineBuilder;
//!
//! # async fn example(port: SharedPort) -> limestream_core::Result<()> {
//! let engine = EngineBuilder::new(port).build()?;
//! engine
//!     .init(EngineConfig::new(30.72, OperationMode::Synchronized, 4096, 1))
//!     .await?;
//! engine.tx_start().await?;
//! let tone = vec![100i16; 2 * 1024];
//! let written = engine
//!     .write(BufferLayout::Channel(0), &tone, 1000, Duration::from_millis(100))
//!     .await?;
//! assert_eq!(written, 1024);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod engine;
pub mod ring;

mod rx;
mod shared;
mod stats;
mod tx;
mod worker;

pub use builder::{ClockStrategy, EngineBuilder};
pub use engine::StreamEngine;
pub use ring::SampleRing;
