//! UDP transport for network-attached boards.
//!
//! A board on the network exposes two datagram endpoints: one for sample
//! packets and one for control requests. [`UdpPort`] keeps a socket
//! connected to each, so one datagram is exactly one packet on the bulk
//! path and one request or reply on the control path.
//!
//! Devices are not discovered; the caller lists them as [`UdpDevice`]
//! descriptors.
//!
//! # Example
//!
//! ```no_run
//! use limestream_core::transport::ControlPort;
//! use limestream_transport::{UdpDevice, UdpPort};
//!
//! # async fn example() -> limestream_core::Result<()> {
//! let device = UdpDevice::new(
//!     "bench-board",
//!     "192.168.1.50:5000".parse().unwrap(),
//!     "192.168.1.50:5001".parse().unwrap(),
//! );
//! let mut port = UdpPort::new(vec![device]);
//! port.connect(0).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use limestream_core::error::{Error, Result};
use limestream_core::transport::{BulkTransport, ControlPort};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// A board reachable over UDP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDevice {
    /// Display name reported by [`ControlPort::device_name`].
    pub name: String,
    /// Endpoint exchanging sample packets.
    pub data_addr: SocketAddr,
    /// Endpoint answering control requests.
    pub control_addr: SocketAddr,
}

impl UdpDevice {
    pub fn new(name: impl Into<String>, data_addr: SocketAddr, control_addr: SocketAddr) -> Self {
        Self {
            name: name.into(),
            data_addr,
            control_addr,
        }
    }
}

#[derive(Debug)]
struct Link {
    data: UdpSocket,
    control: UdpSocket,
    device: UdpDevice,
}

/// Datagram port for a board on the network.
#[derive(Debug)]
pub struct UdpPort {
    devices: Vec<UdpDevice>,
    link: Option<Link>,
}

impl UdpPort {
    /// A disconnected port over a fixed device list.
    pub fn new(devices: Vec<UdpDevice>) -> Self {
        Self {
            devices,
            link: None,
        }
    }

    /// Local address of the data socket while connected.
    ///
    /// Useful when the board streams to whatever address last spoke to it.
    pub fn local_data_addr(&self) -> Option<SocketAddr> {
        self.link.as_ref().and_then(|l| l.data.local_addr().ok())
    }

    /// The connected device, if any.
    pub fn device(&self) -> Option<&UdpDevice> {
        self.link.as_ref().map(|l| &l.device)
    }

    fn link(&self) -> Result<&Link> {
        self.link.as_ref().ok_or(Error::NotConnected)
    }
}

/// Bind an ephemeral local socket of the right family and connect it.
async fn connect_socket(remote: SocketAddr) -> Result<UdpSocket> {
    let local = if remote.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(local).await.map_err(|e| {
        tracing::error!(addr = %local, error = %e, "Failed to bind UDP socket");
        Error::Io(e)
    })?;
    socket.connect(remote).await.map_err(|e| {
        tracing::error!(remote = %remote, error = %e, "Failed to connect UDP socket");
        Error::Io(e)
    })?;
    tracing::debug!(
        local = ?socket.local_addr().ok(),
        remote = %remote,
        "UDP socket connected"
    );
    Ok(socket)
}

async fn recv_timeout(socket: &UdpSocket, buf: &mut [u8], timeout: Duration) -> Result<usize> {
    match tokio::time::timeout(timeout, socket.recv(buf)).await {
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            tracing::error!(error = %e, "UDP peer unreachable");
            Err(Error::ConnectionLost)
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Failed to receive datagram");
            Err(Error::Io(e))
        }
        Err(_) => Err(Error::Timeout),
    }
}

async fn send_datagram(socket: &UdpSocket, data: &[u8]) -> Result<()> {
    let sent = socket.send(data).await.map_err(|e| {
        tracing::error!(bytes = data.len(), error = %e, "Failed to send datagram");
        if e.kind() == std::io::ErrorKind::ConnectionRefused {
            Error::ConnectionLost
        } else {
            Error::Io(e)
        }
    })?;
    if sent != data.len() {
        return Err(Error::Transport(format!(
            "datagram truncated: sent {sent} of {} bytes",
            data.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl ControlPort for UdpPort {
    async fn update_device_list(&mut self) -> Result<usize> {
        Ok(self.devices.len())
    }

    fn device_name(&self, index: usize) -> Option<String> {
        self.devices.get(index).map(|d| d.name.clone())
    }

    async fn connect(&mut self, index: usize) -> Result<()> {
        let device = self.devices.get(index).cloned().ok_or_else(|| {
            Error::InvalidParameter(format!(
                "device index {index} out of range ({} devices)",
                self.devices.len()
            ))
        })?;
        self.close().await?;

        let data = connect_socket(device.data_addr).await?;
        let control = connect_socket(device.control_addr).await?;
        tracing::info!(device = %device.name, data = %device.data_addr, "UDP device connected");
        self.link = Some(Link {
            data,
            control,
            device,
        });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.link.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(link) = self.link.take() {
            tracing::info!(device = %link.device.name, "UDP device closed");
        }
        Ok(())
    }

    async fn control_write(&mut self, data: &[u8]) -> Result<usize> {
        let link = self.link()?;
        tracing::trace!(bytes = data.len(), data = ?data, "Control write");
        send_datagram(&link.control, data).await?;
        Ok(data.len())
    }

    async fn control_read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let link = self.link()?;
        let n = recv_timeout(&link.control, buf, timeout).await?;
        tracing::trace!(bytes = n, data = ?&buf[..n], "Control read");
        Ok(n)
    }
}

#[async_trait]
impl BulkTransport for UdpPort {
    async fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        send_datagram(&self.link()?.data, packet).await
    }

    async fn receive_packet(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        recv_timeout(&self.link()?.data, buf, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Both endpoints of a fake board bound on loopback.
    async fn board() -> (UdpSocket, UdpSocket, UdpDevice) {
        let data = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let control = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let device = UdpDevice::new(
            "loopback-board",
            data.local_addr().unwrap(),
            control.local_addr().unwrap(),
        );
        (data, control, device)
    }

    #[tokio::test]
    async fn enumerates_configured_devices() {
        let (_d, _c, device) = board().await;
        let mut port = UdpPort::new(vec![device]);
        assert_eq!(port.update_device_list().await.unwrap(), 1);
        assert_eq!(port.device_name(0).as_deref(), Some("loopback-board"));
        assert!(port.device_name(1).is_none());
        assert!(matches!(port.connect(1).await, Err(Error::InvalidParameter(_))));
        assert!(!port.is_open());
    }

    #[tokio::test]
    async fn packets_and_control_use_separate_endpoints() {
        let (data, control, device) = board().await;
        let mut port = UdpPort::new(vec![device]);
        port.connect(0).await.unwrap();
        assert!(port.is_open());
        let local = port.local_data_addr().unwrap();

        port.send_packet(&[1, 2, 3, 4]).await.unwrap();
        port.control_write(b"GET_RATE").await.unwrap();

        let mut buf = [0u8; 64];
        let (n, src) = data.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[1, 2, 3, 4]);
        assert_eq!(src.port(), local.port());

        let (n, control_src) = control.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"GET_RATE");

        data.send_to(&[9, 8, 7], local).await.unwrap();
        let n = port
            .receive_packet(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(&buf[..n], &[9, 8, 7]);

        control.send_to(b"30.72", control_src).await.unwrap();
        let n = port
            .control_read(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"30.72");
    }

    #[tokio::test]
    async fn receive_times_out() {
        let (_data, _control, device) = board().await;
        let mut port = UdpPort::new(vec![device]);
        port.connect(0).await.unwrap();

        let mut buf = [0u8; 64];
        let result = port
            .receive_packet(&mut buf, Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(Error::Timeout)), "got {result:?}");
    }

    #[tokio::test]
    async fn ignores_datagrams_from_other_sources() {
        let (data, _control, device) = board().await;
        let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut port = UdpPort::new(vec![device]);
        port.connect(0).await.unwrap();
        let local = port.local_data_addr().unwrap();

        stranger.send_to(b"noise", local).await.unwrap();
        data.send_to(b"packet", local).await.unwrap();

        let mut buf = [0u8; 64];
        let n = port
            .receive_packet(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"packet");
    }

    #[tokio::test]
    async fn closed_port_reports_not_connected() {
        let (_data, _control, device) = board().await;
        let mut port = UdpPort::new(vec![device]);
        port.connect(0).await.unwrap();
        port.close().await.unwrap();
        port.close().await.unwrap();

        assert!(port.device().is_none());
        assert!(matches!(port.send_packet(&[0]).await, Err(Error::NotConnected)));
        let mut buf = [0u8; 8];
        assert!(matches!(
            port.control_read(&mut buf, Duration::from_millis(1)).await,
            Err(Error::NotConnected)
        ));
    }
}
