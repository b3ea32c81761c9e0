//! Device ports for limestream.
//!
//! Concrete implementations of the [`ControlPort`](limestream_core::ControlPort)
//! and [`BulkTransport`](limestream_core::BulkTransport) traits from
//! `limestream-core`:
//!
//! - [`SerialPort`]: boards exposing a USB virtual COM port; sample packets
//!   are framed out of the byte stream by their header
//! - [`UdpPort`]: network-attached boards with separate data and control
//!   datagram endpoints
//!
//! Each port sits behind a feature of the same name (`serial`, `udp`), both
//! on by default.
//!
//! # Example
//!
//! ```no_run
//! use limestream_core::transport::share_port;
//! use limestream_transport::{SerialConfig, SerialPort};
//!
//! # async fn example() -> limestream_core::Result<()> {
//! let port = SerialPort::open("/dev/ttyACM0", SerialConfig::default()).await?;
//! let shared = share_port(port);
//! # drop(shared);
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "serial")]
pub mod serial;
#[cfg(feature = "udp")]
pub mod udp;

#[cfg(feature = "serial")]
pub use serial::{DataBits, FlowControl, Parity, SerialConfig, SerialPort, StopBits};
#[cfg(feature = "udp")]
pub use udp::{UdpDevice, UdpPort};
