//! Mock control port for deterministic testing of control-path users.
//!
//! [`MockControlPort`] implements the [`ControlPort`] trait with pre-loaded
//! request/response pairs and a fixed device list, so configuration helpers
//! can be tested without a board attached.
//!
//! # Example
//!
//! ```
//! use limestream_test_harness::MockControlPort;
//!
//! let mut mock = MockControlPort::new();
//! // When the caller writes this request, the next read returns this response.
//! mock.expect(&[0x21, 0x00, 0x01], &[0x21, 0x01, 0x00, 0x07]);
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use limestream_core::error::{Error, Result};
use limestream_core::transport::ControlPort;

/// A pre-loaded request/response pair.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

/// A mock [`ControlPort`].
///
/// Expectations are consumed in order. `control_write` records the data and
/// matches it against the next expectation; the paired response is then
/// returned by subsequent `control_read` calls, possibly across several
/// reads if the caller's buffer is small.
#[derive(Debug)]
pub struct MockControlPort {
    devices: Vec<String>,
    /// Index of the connected device.
    connected: Option<usize>,
    expectations: VecDeque<Expectation>,
    pending_response: Option<Vec<u8>>,
    response_cursor: usize,
    sent_log: Vec<Vec<u8>>,
}

impl MockControlPort {
    /// A mock with one device, `"mock-sdr"`, already connected.
    pub fn new() -> Self {
        MockControlPort {
            devices: vec!["mock-sdr".to_string()],
            connected: Some(0),
            expectations: VecDeque::new(),
            pending_response: None,
            response_cursor: 0,
            sent_log: Vec::new(),
        }
    }

    /// A disconnected mock listing `names`.
    pub fn with_devices<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MockControlPort {
            devices: names.into_iter().map(Into::into).collect(),
            connected: None,
            ..Self::new()
        }
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// All data written through the control path, one entry per write.
    pub fn sent_data(&self) -> &[Vec<u8>] {
        &self.sent_log
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Index of the connected device, if any.
    pub fn connected_index(&self) -> Option<usize> {
        self.connected
    }

    /// Force the connected state. `true` connects to device 0.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected.then_some(0);
    }
}

impl Default for MockControlPort {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlPort for MockControlPort {
    async fn update_device_list(&mut self) -> Result<usize> {
        Ok(self.devices.len())
    }

    fn device_name(&self, index: usize) -> Option<String> {
        self.devices.get(index).cloned()
    }

    async fn connect(&mut self, index: usize) -> Result<()> {
        if index >= self.devices.len() {
            return Err(Error::InvalidParameter(format!(
                "device index {index} out of range ({} devices)",
                self.devices.len()
            )));
        }
        self.connected = Some(index);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connected.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = None;
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    async fn control_write(&mut self, data: &[u8]) -> Result<usize> {
        if self.connected.is_none() {
            return Err(Error::NotConnected);
        }
        self.sent_log.push(data.to_vec());

        let Some(expectation) = self.expectations.pop_front() else {
            return Err(Error::Protocol(
                "no more expectations in mock control port".into(),
            ));
        };
        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected control data: expected {:02X?}, got {:02X?}",
                expectation.request, data
            )));
        }
        self.pending_response = Some(expectation.response);
        self.response_cursor = 0;
        Ok(data.len())
    }

    async fn control_read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if self.connected.is_none() {
            return Err(Error::NotConnected);
        }
        let Some(response) = &self.pending_response else {
            return Err(Error::Timeout);
        };
        let remaining = &response[self.response_cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.response_cursor += n;
        if self.response_cursor >= response.len() {
            self.pending_response = None;
            self.response_cursor = 0;
        }
        Ok(n)
    }
}
