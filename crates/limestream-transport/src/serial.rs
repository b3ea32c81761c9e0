//! Serial port transport for boards exposing a USB virtual COM port.
//!
//! [`SerialPort`] carries both paths of a device over one byte stream:
//! control requests are raw bytes, and the bulk path delimits sample packets
//! by the length declared in each packet header.
//!
//! # Example
//!
//! ```no_run
//! use limestream_core::transport::{BulkTransport, ControlPort};
//! use limestream_transport::SerialPort;
//! use std::time::Duration;
//!
//! # async fn example() -> limestream_core::Result<()> {
//! let mut port = SerialPort::new(Default::default());
//! if port.update_device_list().await? > 0 {
//!     port.connect(0).await?;
//!     let mut buf = [0u8; 4096];
//!     let n = port.receive_packet(&mut buf, Duration::from_millis(100)).await?;
//!     println!("packet of {n} bytes");
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use limestream_core::error::{Error, Result};
use limestream_core::packet::{HEADER_SIZE, MAX_PACKET_SIZE, parse_header};
use limestream_core::transport::{BulkTransport, ControlPort};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{SerialPort as _, SerialPortBuilderExt, SerialStream};

/// Serial port configuration.
///
/// Defaults suit the board's CDC-ACM interface:
/// - 921600 baud
/// - 8 data bits
/// - 1 stop bit
/// - No parity
/// - No flow control
/// - 2 channels
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate. Ignored by most USB CDC devices but required by the OS.
    pub baud_rate: u32,
    /// Number of data bits
    pub data_bits: DataBits,
    /// Number of stop bits
    pub stop_bits: StopBits,
    /// Parity checking
    pub parity: Parity,
    /// Flow control
    pub flow_control: FlowControl,
    /// Channels the board streams. A framed header naming a higher channel
    /// means the byte stream is misaligned.
    pub channels: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 921_600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            channels: 2,
        }
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// Reassembles whole packets from a byte stream.
///
/// A header that fails to parse, sets reserved flags or names a channel the
/// board does not have discards everything buffered; the stream lines up
/// again at the start of the next read.
#[derive(Debug)]
struct PacketFramer {
    pending: Vec<u8>,
    skipped: u64,
    channels: u8,
}

impl PacketFramer {
    fn new(channels: u8) -> Self {
        PacketFramer {
            pending: Vec::new(),
            skipped: 0,
            channels,
        }
    }

    fn extend(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Copy the next complete packet into `buf`, returning its length.
    fn next_packet(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if self.pending.len() < HEADER_SIZE {
            return Ok(None);
        }
        let len = match parse_header(&self.pending) {
            Ok(header) if header.channel < self.channels => header.encoded_len(),
            _ => {
                self.skipped += self.pending.len() as u64;
                self.pending.clear();
                return Ok(None);
            }
        };
        if self.pending.len() < len {
            return Ok(None);
        }
        if buf.len() < len {
            return Err(Error::InvalidParameter(format!(
                "receive buffer of {} bytes cannot hold a {len} byte packet",
                buf.len()
            )));
        }
        buf[..len].copy_from_slice(&self.pending[..len]);
        self.pending.drain(..len);
        Ok(Some(len))
    }

    /// Bytes dropped while resynchronizing since the last call.
    fn take_skipped(&mut self) -> u64 {
        std::mem::take(&mut self.skipped)
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.skipped = 0;
    }
}

/// A board attached over a serial device.
pub struct SerialPort {
    config: SerialConfig,
    devices: Vec<String>,
    stream: Option<SerialStream>,
    port_name: String,
    framer: PacketFramer,
}

impl SerialPort {
    /// A disconnected port that opens devices with `config`.
    pub fn new(config: SerialConfig) -> Self {
        let framer = PacketFramer::new(config.channels);
        Self {
            config,
            devices: Vec::new(),
            stream: None,
            port_name: String::new(),
            framer,
        }
    }

    /// Open the device at `path` directly, bypassing enumeration.
    ///
    /// ```no_run
    /// # use limestream_transport::{SerialConfig, SerialPort};
    /// # async fn example() -> limestream_core::Result<()> {
    /// let port = SerialPort::open("/dev/ttyACM0", SerialConfig::default()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn open(path: &str, config: SerialConfig) -> Result<Self> {
        let mut port = Self::new(config);
        port.devices = vec![path.to_string()];
        port.connect(0).await?;
        Ok(port)
    }

    /// Name of the connected device, or an empty string.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn open_stream(&self, path: &str) -> Result<SerialStream> {
        let config = &self.config;
        tracing::debug!(
            port = %path,
            baud_rate = config.baud_rate,
            data_bits = ?config.data_bits,
            stop_bits = ?config.stop_bits,
            parity = ?config.parity,
            flow_control = ?config.flow_control,
            "Opening serial port"
        );

        let mut stream = tokio_serial::new(path, config.baud_rate)
            .data_bits(config.data_bits.into())
            .stop_bits(config.stop_bits.into())
            .parity(config.parity.into())
            .flow_control(config.flow_control.into())
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %path, error = %e, "Failed to open serial port");
                Error::Transport(format!("Failed to open serial port {}: {}", path, e))
            })?;

        // CDC-ACM firmware starts streaming once DTR is asserted.
        if let Err(e) = stream.write_data_terminal_ready(true) {
            tracing::warn!(port = %path, error = %e, "Failed to assert DTR");
        }

        Ok(stream)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        let port_name = &self.port_name;

        stream.write_all(data).await.map_err(|e| {
            tracing::error!(port = %port_name, error = %e, "Failed to send data");
            map_io_error(e)
        })?;
        stream.flush().await.map_err(|e| {
            tracing::error!(port = %port_name, error = %e, "Failed to flush serial port");
            Error::Io(e)
        })?;
        Ok(())
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::BrokenPipe || e.kind() == std::io::ErrorKind::NotConnected
    {
        Error::ConnectionLost
    } else {
        Error::Io(e)
    }
}

#[async_trait]
impl ControlPort for SerialPort {
    async fn update_device_list(&mut self) -> Result<usize> {
        let ports = tokio_serial::available_ports()
            .map_err(|e| Error::Transport(format!("Failed to enumerate serial ports: {e}")))?;
        self.devices = ports.into_iter().map(|p| p.port_name).collect();
        tracing::debug!(count = self.devices.len(), "Serial device list refreshed");
        Ok(self.devices.len())
    }

    fn device_name(&self, index: usize) -> Option<String> {
        self.devices.get(index).cloned()
    }

    async fn connect(&mut self, index: usize) -> Result<()> {
        let path = self.devices.get(index).cloned().ok_or_else(|| {
            Error::InvalidParameter(format!(
                "device index {index} out of range ({} devices)",
                self.devices.len()
            ))
        })?;
        self.close().await?;

        let stream = self.open_stream(&path)?;
        self.stream = Some(stream);
        self.framer.clear();
        tracing::info!(port = %path, baud_rate = self.config.baud_rate, "Serial port opened successfully");
        self.port_name = path;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!(port = %self.port_name, "Closing serial port");
            if let Err(e) = stream.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }
            self.framer.clear();
            tracing::info!(port = %self.port_name, "Serial port closed");
        }
        Ok(())
    }

    async fn control_write(&mut self, data: &[u8]) -> Result<usize> {
        tracing::trace!(port = %self.port_name, bytes = data.len(), data = ?data, "Control write");
        self.write_all(data).await?;
        Ok(data.len())
    }

    async fn control_read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, bytes = n, data = ?&buf[..n], "Control read");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[async_trait]
impl BulkTransport for SerialPort {
    async fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        tracing::trace!(port = %self.port_name, bytes = packet.len(), "Sending packet");
        self.write_all(packet).await
    }

    async fn receive_packet(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; MAX_PACKET_SIZE];

        loop {
            let framed = self.framer.next_packet(buf);
            let skipped = self.framer.take_skipped();
            if skipped > 0 {
                tracing::debug!(port = %self.port_name, skipped, "Resynchronized packet stream");
            }
            if let Some(len) = framed? {
                return Ok(len);
            }

            let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
            let n = match tokio::time::timeout_at(deadline, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    tracing::error!(port = %self.port_name, "Serial stream closed by device");
                    return Err(Error::ConnectionLost);
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::error!(port = %self.port_name, error = %e, "Failed to receive data");
                    return Err(map_io_error(e));
                }
                Err(_) => return Err(Error::Timeout),
            };
            self.framer.extend(&chunk[..n]);
        }
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(port = %self.port_name, "SerialPort dropped, closing port");
        }
    }
}
