//! RX worker: drains sample packets from the bulk transport into the
//! per-channel RX rings.
//!
//! The worker holds the port lock only for a single `receive_packet` call,
//! bounded by the poll interval, so control exchanges interleave with
//! streaming. Cancellation is checked between packets; a packet that has
//! been received is always delivered before the loop exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use limestream_core::error::Error;
use limestream_core::events::StreamEvent;
use limestream_core::packet::{MAX_PACKET_SIZE, SamplePacket, parse_packet};
use limestream_core::retry::RetryPolicy;
use limestream_core::transport::SharedPort;
use limestream_core::types::WorkerState;

use crate::shared::{DirectionStream, Streams};
use crate::stats::Counters;

/// Per-channel receive bookkeeping.
#[derive(Debug, Default)]
struct ChannelCursor {
    /// Tick expected on the next packet (synchronized mode).
    expected: Option<u64>,
    /// Running sample counter (unsynchronized mode).
    counter: u64,
    /// Partial burst awaiting completion.
    staged: Vec<i16>,
    /// Timestamp of the first staged sample.
    staged_ts: u64,
}

/// Everything the RX task needs, moved into the task on start.
pub(crate) struct RxWorker {
    pub port: SharedPort,
    pub streams: Arc<Streams>,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub overflow_wait: Duration,
    /// `Some(len)` in burst mode.
    pub burst_length: Option<usize>,
}

impl RxWorker {
    pub(crate) async fn run(self, cancel: CancellationToken) {
        let rx = &self.streams.rx;
        let mut cursors: Vec<ChannelCursor> =
            (0..rx.channels()).map(|_| ChannelCursor::default()).collect();
        let mut budget = self.retry.budget();
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        rx.meter.reset();
        rx.set_state(WorkerState::Running);
        debug!(burst_length = ?self.burst_length, "RX worker running");

        while !cancel.is_cancelled() {
            let received = {
                let mut port = self.port.lock().await;
                port.receive_packet(&mut buf, self.poll_interval).await
            };

            let len = match received {
                Ok(len) => {
                    budget.reset();
                    len
                }
                Err(Error::Timeout) => {
                    // Idle poll. Yield in case the port reported it without
                    // waiting.
                    tokio::task::yield_now().await;
                    continue;
                }
                Err(e) => match budget.record_failure() {
                    Some(delay) => {
                        warn!(
                            attempt = budget.failures(),
                            delay_ms = delay.as_millis() as u64,
                            "RX transport error, retrying: {e}"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(delay) => continue,
                        }
                    }
                    None => {
                        error!(failures = budget.failures(), "RX retry budget exhausted: {e}");
                        rx.fail(e.to_string());
                        break;
                    }
                },
            };

            match parse_packet(&buf[..len]) {
                Ok(packet) => self.handle_packet(&packet, &mut cursors).await,
                Err(e) => {
                    Counters::add(&rx.counters.malformed_packets, 1);
                    warn!(len, "dropping malformed RX packet: {e}");
                }
            }
        }

        let unfinished: usize = cursors.iter().map(|c| c.staged.len() / 2).sum();
        if unfinished > 0 {
            Counters::add(&rx.counters.dropped_samples, unfinished as u64);
            debug!(unfinished, "discarding partial bursts");
        }
        debug!("RX worker exiting");
    }

    async fn handle_packet(&self, packet: &SamplePacket<'_>, cursors: &mut [ChannelCursor]) {
        let rx = &self.streams.rx;
        let channel = packet.header.channel as usize;
        let Some(cursor) = cursors.get_mut(channel) else {
            Counters::add(&rx.counters.malformed_packets, 1);
            warn!(channel, channels = rx.channels(), "RX packet for unknown channel");
            return;
        };
        let samples = packet.header.sample_count as u64;
        if samples == 0 {
            return;
        }
        Counters::add(&rx.counters.total_samples, samples);
        rx.meter.record(samples as usize);

        let mut gap = false;
        let timestamp = if self.streams.config.mode.is_synchronized() {
            let ts = packet.header.timestamp;
            match cursor.expected {
                Some(expected) if expected != ts => {
                    gap = true;
                    Counters::add(&rx.counters.timestamp_gaps, 1);
                    debug!(channel, expected, actual = ts, "RX timestamp gap");
                    rx.emit(StreamEvent::TimestampGap {
                        channel,
                        expected,
                        actual: ts,
                    });
                }
                _ => {}
            }
            let end = ts.wrapping_add(samples);
            cursor.expected = Some(end);
            if packet.header.timestamp_valid {
                self.streams.clock.observe(end);
            }
            ts
        } else {
            let ts = cursor.counter;
            cursor.counter = cursor.counter.wrapping_add(samples);
            ts
        };

        let Some(burst) = self.burst_length else {
            let iq = packet.iq();
            deliver(rx, channel, &iq, timestamp, self.overflow_wait).await;
            return;
        };

        if gap && !cursor.staged.is_empty() {
            let discarded = cursor.staged.len() / 2;
            trace!(channel, discarded, "discarding partial burst across gap");
            Counters::add(&rx.counters.dropped_samples, discarded as u64);
            cursor.staged.clear();
        }
        if cursor.staged.is_empty() {
            cursor.staged_ts = timestamp;
        }
        packet.extend_iq(&mut cursor.staged);

        let burst_components = burst * 2;
        let mut consumed = 0;
        while cursor.staged.len() - consumed >= burst_components {
            let chunk = &cursor.staged[consumed..consumed + burst_components];
            deliver_burst(rx, channel, chunk, cursor.staged_ts, self.overflow_wait).await;
            consumed += burst_components;
            cursor.staged_ts = cursor.staged_ts.wrapping_add(burst as u64);
        }
        cursor.staged.drain(..consumed);
    }
}

/// Push a packet's samples, dropping whatever does not fit within the
/// overflow wait.
async fn deliver(rx: &DirectionStream, channel: usize, iq: &[i16], timestamp: u64, wait: Duration) {
    let samples = iq.len() / 2;
    let stored = rx.rings[channel].try_push(iq, timestamp, wait).await;
    if stored < samples {
        overflow(rx, channel, samples - stored);
    }
}

/// Push a whole burst or nothing.
async fn deliver_burst(
    rx: &DirectionStream,
    channel: usize,
    iq: &[i16],
    timestamp: u64,
    wait: Duration,
) {
    let samples = iq.len() / 2;
    let ring = &rx.rings[channel];
    let free = ring.wait_for_space(samples, Instant::now() + wait).await;
    if free >= samples {
        ring.push_now(iq, timestamp);
    } else {
        overflow(rx, channel, samples);
    }
}

fn overflow(rx: &DirectionStream, channel: usize, dropped: usize) {
    Counters::add(&rx.counters.dropped_samples, dropped as u64);
    debug!(channel, dropped, "RX ring full, dropping samples");
    rx.emit(StreamEvent::Overflow { channel, dropped });
}
