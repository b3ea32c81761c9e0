//! # limestream -- IQ sample streaming for SDR boards
//!
//! `limestream` moves IQ samples between an application and a
//! software-defined-radio board over USB serial or UDP. It keeps received
//! and transmitted samples aligned to the board's sample clock, buffers
//! against jitter on both sides, and gives callers deadline-bounded
//! `read`/`write` calls.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use limestream::{BufferLayout, EngineBuilder, EngineConfig, OperationMode, share_port};
//! use limestream::transport::{SerialConfig, SerialPort};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let port = SerialPort::open("/dev/ttyACM0", SerialConfig::default()).await?;
//!     let engine = EngineBuilder::new(share_port(port)).build()?;
//!     engine
//!         .init(EngineConfig::new(30.72, OperationMode::Synchronized, 1 << 16, 1))
//!         .await?;
//!     engine.rx_start(false, 0).await?;
//!
//!     let mut iq = vec![0i16; 2 * 4096];
//!     let (samples, timestamp) = engine
//!         .read(BufferLayout::Channel(0), &mut iq, Duration::from_millis(500))
//!         .await?;
//!     println!("{samples} samples starting at tick {timestamp}");
//!
//!     engine.destroy().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                   | Purpose                                          |
//! |-------------------------|--------------------------------------------------|
//! | `limestream-core`       | Port traits, packet codec, clock, types, errors  |
//! | `limestream-engine`     | Ring buffers, RX/TX workers, [`StreamEngine`]    |
//! | `limestream-transport`  | Serial and UDP device ports                      |
//! | **`limestream`**        | This facade crate -- re-exports everything       |
//!
//! ## Feature Flags
//!
//! | Feature  | Enables                                  | Default |
//! |----------|------------------------------------------|---------|
//! | `serial` | [`transport::SerialPort`] (tokio-serial) | yes     |
//! | `udp`    | [`transport::UdpPort`]                   | yes     |

pub use limestream_core::*;

pub use limestream_engine::{ClockStrategy, EngineBuilder, SampleRing, StreamEngine};

/// Device ports.
#[cfg(any(feature = "serial", feature = "udp"))]
pub mod transport {
    #[cfg(feature = "serial")]
    pub use limestream_transport::serial::{
        DataBits, FlowControl, Parity, SerialConfig, SerialPort, StopBits,
    };
    #[cfg(feature = "udp")]
    pub use limestream_transport::udp::{UdpDevice, UdpPort};
}
