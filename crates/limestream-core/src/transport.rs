//! Port traits for device communication.
//!
//! A connected board exposes two paths:
//!
//! - the **control path** ([`ControlPort`]): byte-oriented request/response
//!   I/O used for configuration, plus device enumeration and connection;
//! - the **bulk data path** ([`BulkTransport`]): whole sample packets used
//!   exclusively by the streaming workers.
//!
//! Both paths usually share one physical handle (a USB device or a serial
//! port) that is not safe for concurrent use. The streaming engine therefore
//! takes the port as a [`SharedPort`] and holds its lock for every packet
//! exchange and every control exchange it performs. Callers keep their own
//! clone of the `Arc`; the engine never connects or closes the port.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;

/// Control path of a device port.
#[async_trait]
pub trait ControlPort: Send + Sync {
    /// Refresh the list of devices reachable through this port.
    ///
    /// Returns the number of devices found.
    async fn update_device_list(&mut self) -> Result<usize>;

    /// Name of the device at `index` in the last refreshed list.
    fn device_name(&self, index: usize) -> Option<String>;

    /// Connect to the device at `index` in the device list.
    async fn connect(&mut self, index: usize) -> Result<()>;

    /// Whether a device is currently connected.
    fn is_open(&self) -> bool;

    /// Close the connection. Closing an already-closed port is not an error.
    async fn close(&mut self) -> Result<()>;

    /// Write raw control bytes. Returns the number of bytes written.
    async fn control_write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read raw control bytes into `buf`.
    ///
    /// Waits up to `timeout` for data; returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if nothing arrives.
    async fn control_read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

/// Bulk sample path of a device port.
///
/// Implementations deliver whole packets: one `send_packet` call carries one
/// encoded packet and one `receive_packet` call yields at most one.
#[async_trait]
pub trait BulkTransport: Send + Sync {
    /// Send one encoded sample packet.
    async fn send_packet(&mut self, packet: &[u8]) -> Result<()>;

    /// Receive one sample packet into `buf`.
    ///
    /// Returns the packet length. Waits up to `timeout`; returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) when no packet
    /// arrived, which the workers treat as an idle poll rather than a
    /// failure.
    async fn receive_packet(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;
}

/// A port carrying both the control and bulk paths.
pub trait DevicePort: ControlPort + BulkTransport {}

impl<T: ControlPort + BulkTransport + ?Sized> DevicePort for T {}

/// A device port shared between the caller and a streaming engine.
pub type SharedPort = Arc<Mutex<dyn DevicePort>>;

/// Wrap a port for sharing with a streaming engine.
///
/// Keep a typed clone if you need the concrete port later:
///
/// ```ignore
/// let port = Arc::new(Mutex::new(LoopbackPort::new()));
/// let shared: SharedPort = port.clone();
/// ```
pub fn share_port<P: DevicePort + 'static>(port: P) -> SharedPort {
    Arc::new(Mutex::new(port))
}
