//! Loopback device port for streaming tests.
//!
//! [`LoopbackPort`] echoes every bulk packet it is sent back to the receive
//! side, like a board with its TX output wired to its RX input. Faults can
//! be injected on either direction to exercise the workers' retry handling,
//! and the control path is a [`MockControlPort`].
//!
//! # Example
//!
//! ```
//! use limestream_test_harness::LoopbackPort;
//!
//! let (typed, shared) = LoopbackPort::new().shared();
//! // `shared` goes to the engine, `typed` stays with the test for fault
//! // injection and inspection.
//! # drop((typed, shared));
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use limestream_core::error::{Error, Result};
use limestream_core::transport::{BulkTransport, ControlPort, SharedPort};

use crate::mock_control::MockControlPort;

/// How long an empty receive waits before reporting an idle poll.
///
/// Kept short so the caller releases the port lock promptly and queued
/// sends get through.
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// A device port whose bulk path loops sent packets back.
#[derive(Debug)]
pub struct LoopbackPort {
    control: MockControlPort,
    queue: VecDeque<Vec<u8>>,
    echo: bool,
    record: bool,
    sent_log: Vec<Vec<u8>>,
    sent_count: usize,
    received_count: usize,
    fail_sends: u32,
    fail_receives: u32,
}

impl LoopbackPort {
    /// A connected loopback port that echoes and records every packet.
    pub fn new() -> Self {
        LoopbackPort {
            control: MockControlPort::new(),
            queue: VecDeque::new(),
            echo: true,
            record: true,
            sent_log: Vec::new(),
            sent_count: 0,
            received_count: 0,
            fail_sends: 0,
            fail_receives: 0,
        }
    }

    /// Wrap the port for sharing, returning a typed handle for the test and
    /// a [`SharedPort`] for the engine. Both point at the same port.
    pub fn shared(self) -> (Arc<Mutex<LoopbackPort>>, SharedPort) {
        let typed = Arc::new(Mutex::new(self));
        let shared: SharedPort = typed.clone();
        (typed, shared)
    }

    /// Whether sent packets are queued for receive (default: on).
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Whether sent packets are kept for [`sent_packets`](Self::sent_packets)
    /// (default: on). Turn off for long-running streams.
    pub fn set_recording(&mut self, record: bool) {
        self.record = record;
        if !record {
            self.sent_log.clear();
        }
    }

    /// Queue a packet for the receive side as if the device had sent it.
    pub fn inject_packet(&mut self, packet: &[u8]) {
        self.queue.push_back(packet.to_vec());
    }

    /// Fail the next `n` bulk sends with a transport error.
    pub fn fail_next_sends(&mut self, n: u32) {
        self.fail_sends = n;
    }

    /// Fail the next `n` bulk receives with a transport error.
    pub fn fail_next_receives(&mut self, n: u32) {
        self.fail_receives = n;
    }

    /// Fail every bulk send until [`clear_faults`](Self::clear_faults).
    pub fn fail_all_sends(&mut self) {
        self.fail_sends = u32::MAX;
    }

    /// Fail every bulk receive until [`clear_faults`](Self::clear_faults).
    pub fn fail_all_receives(&mut self) {
        self.fail_receives = u32::MAX;
    }

    /// Stop injecting faults.
    pub fn clear_faults(&mut self) {
        self.fail_sends = 0;
        self.fail_receives = 0;
    }

    /// Packets sent so far, when recording.
    pub fn sent_packets(&self) -> &[Vec<u8>] {
        &self.sent_log
    }

    /// Number of packets successfully sent.
    pub fn sent_count(&self) -> usize {
        self.sent_count
    }

    /// Number of packets handed to the receive side.
    pub fn received_count(&self) -> usize {
        self.received_count
    }

    /// Packets waiting on the receive side.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// The control-path mock, for expectations and inspection.
    pub fn control(&mut self) -> &mut MockControlPort {
        &mut self.control
    }
}

impl Default for LoopbackPort {
    fn default() -> Self {
        Self::new()
    }
}

fn take_fault(remaining: &mut u32) -> bool {
    match *remaining {
        0 => false,
        u32::MAX => true,
        _ => {
            *remaining -= 1;
            true
        }
    }
}

#[async_trait]
impl BulkTransport for LoopbackPort {
    async fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        if !self.control.is_open() {
            return Err(Error::NotConnected);
        }
        if take_fault(&mut self.fail_sends) {
            return Err(Error::Transport("injected send failure".into()));
        }
        if self.record {
            self.sent_log.push(packet.to_vec());
        }
        if self.echo {
            self.queue.push_back(packet.to_vec());
        }
        self.sent_count += 1;
        Ok(())
    }

    async fn receive_packet(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if !self.control.is_open() {
            return Err(Error::NotConnected);
        }
        if take_fault(&mut self.fail_receives) {
            return Err(Error::Transport("injected receive failure".into()));
        }
        let Some(packet) = self.queue.pop_front() else {
            tokio::time::sleep(timeout.min(IDLE_WAIT)).await;
            return Err(Error::Timeout);
        };
        if packet.len() > buf.len() {
            return Err(Error::Protocol(format!(
                "packet of {} bytes exceeds receive buffer of {}",
                packet.len(),
                buf.len()
            )));
        }
        buf[..packet.len()].copy_from_slice(&packet);
        self.received_count += 1;
        Ok(packet.len())
    }
}

#[async_trait]
impl ControlPort for LoopbackPort {
    async fn update_device_list(&mut self) -> Result<usize> {
        self.control.update_device_list().await
    }

    fn device_name(&self, index: usize) -> Option<String> {
        self.control.device_name(index)
    }

    async fn connect(&mut self, index: usize) -> Result<()> {
        self.control.connect(index).await
    }

    fn is_open(&self) -> bool {
        self.control.is_open()
    }

    async fn close(&mut self) -> Result<()> {
        self.queue.clear();
        self.control.close().await
    }

    async fn control_write(&mut self, data: &[u8]) -> Result<usize> {
        self.control.control_write(data).await
    }

    async fn control_read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.control.control_read(buf, timeout).await
    }
}
