//! TX worker: packetizes queued samples and sends them over the bulk
//! transport.
//!
//! Channels are served round-robin. In synchronized mode a channel's next
//! run is held until the clock source reaches its timestamp; a run that is
//! already past due is sent at once and counted late. In unsynchronized mode
//! runs go out as fast as the transport accepts them.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::futures::Notified;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use limestream_core::clock::{duration_to_ticks, ticks_to_duration};
use limestream_core::error::Error;
use limestream_core::events::StreamEvent;
use limestream_core::packet::{PacketHeader, encode_packet};
use limestream_core::retry::{RetryBudget, RetryPolicy};
use limestream_core::samples::SampleBlock;
use limestream_core::transport::SharedPort;
use limestream_core::types::WorkerState;

use crate::shared::Streams;
use crate::stats::Counters;

/// Everything the TX task needs, moved into the task on start.
pub(crate) struct TxWorker {
    pub port: SharedPort,
    pub streams: Arc<Streams>,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub packet_samples: usize,
}

/// What the scheduler found on this pass.
enum Next {
    /// Channel with a run that is due now.
    Due(usize),
    /// Nothing due; the earliest queued run becomes due after this long.
    Hold(Duration),
    /// Every ring is empty.
    Idle,
}

impl TxWorker {
    pub(crate) async fn run(self, cancel: CancellationToken) {
        let tx = &self.streams.tx;
        let channels = tx.channels();
        let mut counters = vec![0u64; channels];
        let mut next_channel = 0usize;
        let mut sequences = vec![0u32; channels];
        let mut budget = self.retry.budget();

        tx.meter.reset();
        tx.set_state(WorkerState::Running);
        debug!(packet_samples = self.packet_samples, "TX worker running");

        while !cancel.is_cancelled() {
            // Registered before the scan so a push during it still wakes us.
            let data_ready = tx.data_ready.notified();
            tokio::pin!(data_ready);
            data_ready.as_mut().enable();

            let channel = match self.next_due(next_channel) {
                Next::Due(channel) => channel,
                Next::Hold(wait) => {
                    self.idle(&cancel, data_ready, wait.min(self.poll_interval))
                        .await;
                    continue;
                }
                Next::Idle => {
                    self.idle(&cancel, data_ready, self.poll_interval).await;
                    continue;
                }
            };
            next_channel = (channel + 1) % channels;

            let Some(block) = tx.rings[channel].pop_run(self.packet_samples) else {
                continue;
            };
            let samples = block.len();

            let synchronized = self.streams.config.mode.is_synchronized();
            let timestamp = if synchronized {
                block.timestamp
            } else {
                let ts = counters[channel];
                counters[channel] = ts.wrapping_add(samples as u64);
                ts
            };
            let header = PacketHeader {
                timestamp_valid: synchronized,
                channel: channel as u8,
                sample_count: samples as u16,
                sequence: sequences[channel],
                timestamp,
            };
            let packet = match encode_packet(&header, &block.iq) {
                Ok(packet) => packet,
                Err(e) => {
                    error!(channel, samples, "dropping unencodable TX run: {e}");
                    continue;
                }
            };

            if let Err(e) = self.send(&mut budget, &packet).await {
                // The run already left the ring.
                Counters::add(&tx.counters.dropped_samples, samples as u64);
                error!(
                    failures = budget.failures(),
                    channel,
                    lost_samples = samples,
                    "TX retry budget exhausted: {e}"
                );
                tx.fail(format!("{e} ({samples} samples on channel {channel} lost)"));
                return;
            }

            sequences[channel] = sequences[channel].wrapping_add(1);
            Counters::add(&tx.counters.total_samples, samples as u64);
            tx.meter.record(samples);
            if synchronized {
                self.check_late(channel, &block);
            }
            trace!(channel, samples, timestamp, "TX packet sent");
        }

        debug!("TX worker exiting");
    }

    /// Pick the next channel to serve, starting the round-robin at `start`.
    fn next_due(&self, start: usize) -> Next {
        let tx = &self.streams.tx;
        let channels = tx.channels();
        let synchronized = self.streams.config.mode.is_synchronized();
        let clock = &self.streams.clock;
        let mut hold: Option<Duration> = None;

        for k in 0..channels {
            let channel = (start + k) % channels;
            let Some(ts) = tx.rings[channel].front_timestamp() else {
                continue;
            };
            if synchronized {
                let now = clock.now();
                if ts > now {
                    let wait = ticks_to_duration(ts - now, clock.sample_rate_hz());
                    hold = Some(hold.map_or(wait, |h| h.min(wait)));
                    continue;
                }
            }
            return Next::Due(channel);
        }

        match hold {
            Some(wait) => Next::Hold(wait),
            None => Next::Idle,
        }
    }

    /// Sleep until `wait` elapses, `data_ready` fires or the worker is
    /// cancelled.
    async fn idle(
        &self,
        cancel: &CancellationToken,
        data_ready: Pin<&mut Notified<'_>>,
        wait: Duration,
    ) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            _ = data_ready => {}
            _ = tokio::time::sleep(wait) => {}
        }
    }

    /// Send one packet, retrying transport failures per the retry policy.
    ///
    /// A packet in flight is not abandoned on cancellation; the bounded
    /// budget keeps stop latency finite.
    async fn send(&self, budget: &mut RetryBudget, packet: &[u8]) -> Result<(), Error> {
        loop {
            let result = {
                let mut port = self.port.lock().await;
                port.send_packet(packet).await
            };
            match result {
                Ok(()) => {
                    budget.reset();
                    return Ok(());
                }
                Err(e) => match budget.record_failure() {
                    Some(delay) => {
                        warn!(
                            attempt = budget.failures(),
                            delay_ms = delay.as_millis() as u64,
                            "TX transport error, retrying: {e}"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(e),
                },
            }
        }
    }

    /// Count a packet as late when it left more than one poll interval after
    /// its scheduled tick.
    fn check_late(&self, channel: usize, block: &SampleBlock) {
        let clock = &self.streams.clock;
        let device_tick = clock.now();
        let tolerance = duration_to_ticks(self.poll_interval, clock.sample_rate_hz());
        if device_tick.saturating_sub(block.timestamp) > tolerance {
            let tx = &self.streams.tx;
            Counters::add(&tx.counters.late_packets, 1);
            debug!(
                channel,
                timestamp = block.timestamp,
                device_tick,
                "TX packet sent late"
            );
            tx.emit(StreamEvent::LateTransmit {
                channel,
                timestamp: block.timestamp,
                device_tick,
            });
        }
    }
}
