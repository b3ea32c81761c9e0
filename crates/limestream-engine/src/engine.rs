//! StreamEngine -- the streaming facade.
//!
//! An engine owns one ring per channel per direction and one worker task per
//! direction. It borrows the device port: the caller keeps the port alive and
//! decides when to connect or close it.
//!
//! Lifecycle operations (`init`, `destroy`, `*_start`, `*_stop`) serialize on
//! an internal lock. `read` and `write` only touch the rings and may run
//! concurrently with each other, with lifecycle calls and with the workers.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::time::Instant;
use tracing::{debug, info};

use limestream_core::clock::ClockSource;
use limestream_core::error::{Error, Result};
use limestream_core::events::StreamEvent;
use limestream_core::transport::SharedPort;
use limestream_core::types::{
    BufferLayout, Direction, EngineConfig, StatsSnapshot, WorkerState,
};

use crate::builder::{ClockStrategy, StreamOptions};
use crate::rx::RxWorker;
use crate::shared::{DirectionStream, Streams};
use crate::tx::TxWorker;
use crate::worker::Worker;

#[derive(Debug, Default)]
struct Workers {
    rx: Option<Worker>,
    tx: Option<Worker>,
    /// Whether the clock has been anchored since `init`.
    clock_anchored: bool,
}

impl Workers {
    fn slot(&mut self, direction: Direction) -> &mut Option<Worker> {
        match direction {
            Direction::Rx => &mut self.rx,
            Direction::Tx => &mut self.tx,
        }
    }
}

/// A bidirectional IQ streaming engine bound to one device port.
///
/// Build one with [`EngineBuilder`](crate::EngineBuilder), then call
/// [`init`](Self::init) to allocate the rings.
pub struct StreamEngine {
    port: SharedPort,
    options: StreamOptions,
    streams: RwLock<Option<Arc<Streams>>>,
    workers: Mutex<Workers>,
    event_tx: broadcast::Sender<StreamEvent>,
}

impl StreamEngine {
    pub(crate) fn new(port: SharedPort, options: StreamOptions) -> Self {
        let (event_tx, _) = broadcast::channel(options.event_capacity);
        StreamEngine {
            port,
            options,
            streams: RwLock::new(None),
            workers: Mutex::new(Workers::default()),
            event_tx,
        }
    }

    fn current(&self) -> Option<Arc<Streams>> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn streams(&self) -> Result<Arc<Streams>> {
        self.current().ok_or(Error::NotInitialized)
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Allocate the ring buffers.
    ///
    /// Fails with [`Error::AlreadyInitialized`] if the engine is already
    /// initialized, [`Error::InvalidParameter`] if `config` does not validate
    /// and [`Error::Allocation`] if the rings cannot be allocated. On failure
    /// the engine is left uninitialized.
    pub async fn init(&self, config: EngineConfig) -> Result<()> {
        let mut workers = self.workers.lock().await;
        if self.current().is_some() {
            return Err(Error::AlreadyInitialized);
        }
        config.validate()?;

        let rate = self
            .options
            .sample_rate_hz
            .unwrap_or_else(|| config.nominal_sample_rate_hz());
        let clock = self.options.clock.create(rate);
        let streams = Streams::new(config.clone(), clock, self.event_tx.clone())?;

        *workers = Workers::default();
        *self.streams.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(streams));
        info!(
            ref_clock_mhz = config.ref_clock_mhz,
            mode = %config.mode,
            buffer_length = config.buffer_length,
            channels = config.channels,
            "stream engine initialized"
        );
        Ok(())
    }

    /// Whether [`init`](Self::init) has succeeded and
    /// [`destroy`](Self::destroy) has not been called since.
    pub fn is_initialized(&self) -> bool {
        self.current().is_some()
    }

    /// Stop both workers and release the rings.
    ///
    /// Returns [`Error::NotInitialized`] when there is nothing to destroy.
    pub async fn destroy(&self) -> Result<()> {
        let mut workers = self.workers.lock().await;
        let streams = self.streams()?;
        for direction in [Direction::Rx, Direction::Tx] {
            stop_worker(&mut workers, streams.direction(direction)).await;
        }
        *self.streams.write().unwrap_or_else(PoisonError::into_inner) = None;
        *workers = Workers::default();
        info!("stream engine destroyed");
        Ok(())
    }

    /// Start the RX worker.
    ///
    /// In burst mode the worker delivers samples to the RX rings only in
    /// whole, timestamp-contiguous bursts of `burst_length` samples;
    /// `burst_length` must lie in `1..=buffer_length`. Outside burst mode
    /// `burst_length` is ignored.
    ///
    /// Starting a running worker is a no-op. Starting a failed worker clears
    /// the failure and spawns a fresh one. Buffered samples are kept.
    pub async fn rx_start(&self, burst_mode: bool, burst_length: usize) -> Result<()> {
        let mut workers = self.workers.lock().await;
        let streams = self.streams()?;

        let burst = if burst_mode {
            if burst_length == 0 || burst_length > streams.config.buffer_length {
                return Err(Error::InvalidParameter(format!(
                    "burst length {burst_length} must be in 1..={}",
                    streams.config.buffer_length
                )));
            }
            Some(burst_length)
        } else {
            None
        };

        if !self.prepare_start(&mut workers, &streams.rx).await {
            return Ok(());
        }

        let worker = RxWorker {
            port: self.port.clone(),
            streams: streams.clone(),
            retry: self.options.retry.clone(),
            poll_interval: self.options.poll_interval,
            overflow_wait: self.options.overflow_wait,
            burst_length: burst,
        };
        workers.rx = Some(Worker::spawn(Direction::Rx, |cancel| worker.run(cancel)));
        info!(burst_length = ?burst, "RX streaming started");
        Ok(())
    }

    /// Stop the RX worker and wait for it to exit. Buffered samples stay
    /// readable. Stopping a stopped worker is a no-op.
    pub async fn rx_stop(&self) -> Result<()> {
        let mut workers = self.workers.lock().await;
        let streams = self.streams()?;
        if stop_worker(&mut workers, &streams.rx).await {
            info!("RX streaming stopped");
        }
        Ok(())
    }

    /// Start the TX worker. Same semantics as [`rx_start`](Self::rx_start)
    /// without the burst parameters.
    pub async fn tx_start(&self) -> Result<()> {
        let mut workers = self.workers.lock().await;
        let streams = self.streams()?;

        if !self.prepare_start(&mut workers, &streams.tx).await {
            return Ok(());
        }

        let worker = TxWorker {
            port: self.port.clone(),
            streams: streams.clone(),
            retry: self.options.retry.clone(),
            poll_interval: self.options.poll_interval,
            packet_samples: self.options.packet_samples,
        };
        workers.tx = Some(Worker::spawn(Direction::Tx, |cancel| worker.run(cancel)));
        info!("TX streaming started");
        Ok(())
    }

    /// Stop the TX worker and wait for it to exit. Queued samples that were
    /// not yet sent stay queued for the next start.
    pub async fn tx_stop(&self) -> Result<()> {
        let mut workers = self.workers.lock().await;
        let streams = self.streams()?;
        if stop_worker(&mut workers, &streams.tx).await {
            info!("TX streaming stopped");
        }
        Ok(())
    }

    /// Common start bookkeeping. Returns `false` when a live worker already
    /// exists and nothing should be spawned.
    async fn prepare_start(&self, workers: &mut Workers, stream: &DirectionStream) -> bool {
        let slot = workers.slot(stream.direction);
        if slot.as_ref().is_some_and(|w| !w.is_finished()) {
            debug!(direction = %stream.direction, "worker already running");
            return false;
        }
        // Reap a worker that exited on its own after a failure.
        if let Some(old) = slot.take() {
            old.stop().await;
        }
        stream.clear_failure();

        if !workers.clock_anchored {
            if !matches!(self.options.clock, ClockStrategy::Custom(_)) {
                if let Some(streams) = self.current() {
                    streams.clock.anchor(0);
                }
            }
            workers.clock_anchored = true;
        }

        stream.set_state(WorkerState::Starting);
        true
    }

    // -----------------------------------------------------------------
    // Data path
    // -----------------------------------------------------------------

    /// Queue samples for transmission.
    ///
    /// `iq` holds interleaved I/Q components laid out per `layout`.
    /// `timestamp` is the device tick of the first sample of every channel
    /// (ignored on the wire in unsynchronized mode). Waits up to `timeout`
    /// for ring space and returns the number of samples written per channel,
    /// which is short (possibly zero) when the timeout elapses first. A zero
    /// timeout never waits.
    ///
    /// Fails with [`Error::InvalidParameter`] for a bad channel id and with
    /// [`Error::StreamFailed`] after the TX worker exhausted its retries.
    pub async fn write(
        &self,
        layout: BufferLayout,
        iq: &[i16],
        timestamp: u64,
        timeout: Duration,
    ) -> Result<usize> {
        let streams = self.streams()?;
        let targets = targets(&streams.config, layout)?;
        let tx = &streams.tx;
        tx.ensure_healthy()?;

        let channels = streams.config.channels as usize;
        let n = layout.samples_per_channel(iq.len(), channels);
        if let BufferLayout::Channel(_) = layout {
            return Ok(tx.rings[targets[0]].try_push(&iq[..n * 2], timestamp, timeout).await);
        }

        let deadline = Instant::now() + timeout;
        let mut done = 0;
        let mut scratch = Vec::new();

        // Move whatever every channel has room for as soon as each has some,
        // so the TX worker is refilled while it drains.
        while done < n {
            let mut m = n - done;
            for &ch in &targets {
                tx.rings[ch].wait_for_space(1, deadline).await;
                m = m.min(tx.rings[ch].free());
            }
            if m == 0 {
                break;
            }
            for (slot, &ch) in targets.iter().enumerate() {
                let chunk = gather(layout, iq, slot, channels, n, done, m, &mut scratch);
                tx.rings[ch].push_now(chunk, timestamp.wrapping_add(done as u64));
            }
            done += m;
        }

        Ok(done)
    }

    /// Take received samples.
    ///
    /// Fills `out` (laid out per `layout`) with up to as many samples per
    /// channel as it holds, waiting up to `timeout` for them. Returns the
    /// number of samples read per channel and the timestamp of the first
    /// one. A zero timeout never waits. When nothing was read the timestamp
    /// is that of the next buffered sample, or zero.
    ///
    /// Fails with [`Error::InvalidParameter`] for a bad channel id and with
    /// [`Error::StreamFailed`] after the RX worker exhausted its retries.
    pub async fn read(
        &self,
        layout: BufferLayout,
        out: &mut [i16],
        timeout: Duration,
    ) -> Result<(usize, u64)> {
        let streams = self.streams()?;
        let targets = targets(&streams.config, layout)?;
        let rx = &streams.rx;
        rx.ensure_healthy()?;

        let channels = streams.config.channels as usize;
        let n = layout.samples_per_channel(out.len(), channels);
        if let BufferLayout::Channel(_) = layout {
            let block = rx.rings[targets[0]].try_pop(n, timeout).await;
            out[..block.iq.len()].copy_from_slice(&block.iq);
            return Ok((block.len(), block.timestamp));
        }

        let deadline = Instant::now() + timeout;
        let mut done = 0;
        let mut first_ts = None;

        while done < n {
            let mut m = n - done;
            for &ch in &targets {
                rx.rings[ch].wait_for_data(1, deadline).await;
                m = m.min(rx.rings[ch].occupied());
            }
            if m == 0 {
                break;
            }
            for (slot, &ch) in targets.iter().enumerate() {
                let Some(block) = rx.rings[ch].pop_now(m) else {
                    continue;
                };
                if slot == 0 && first_ts.is_none() {
                    first_ts = Some(block.timestamp);
                }
                scatter(layout, out, slot, channels, n, done, &block.iq);
            }
            done += m;
        }

        let timestamp = first_ts
            .or_else(|| rx.rings[targets[0]].front_timestamp())
            .unwrap_or(0);
        Ok((done, timestamp))
    }

    // -----------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------

    /// Buffer and throughput statistics for both directions. Never blocks.
    pub fn stats(&self) -> Result<StatsSnapshot> {
        let streams = self.streams()?;
        Ok(StatsSnapshot {
            rx: streams.rx.snapshot(),
            tx: streams.tx.snapshot(),
        })
    }

    /// Subscribe to streaming events.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.event_tx.subscribe()
    }

    /// Current RX worker state ([`WorkerState::Stopped`] when uninitialized).
    pub fn rx_state(&self) -> WorkerState {
        self.current()
            .map_or(WorkerState::Stopped, |s| s.rx.state())
    }

    /// Current TX worker state ([`WorkerState::Stopped`] when uninitialized).
    pub fn tx_state(&self) -> WorkerState {
        self.current()
            .map_or(WorkerState::Stopped, |s| s.tx.state())
    }

    /// The configuration passed to `init`, if initialized.
    pub fn config(&self) -> Option<EngineConfig> {
        self.current().map(|s| s.config.clone())
    }

    /// The clock source in use, if initialized.
    pub fn clock(&self) -> Option<Arc<dyn ClockSource>> {
        self.current().map(|s| s.clock.clone())
    }

    // -----------------------------------------------------------------
    // Control passthrough
    // -----------------------------------------------------------------

    /// Write control bytes to the device, serialized with bulk traffic.
    pub async fn control_write(&self, data: &[u8]) -> Result<usize> {
        let mut port = self.port.lock().await;
        port.control_write(data).await
    }

    /// Read control bytes from the device, serialized with bulk traffic.
    pub async fn control_read(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut port = self.port.lock().await;
        port.control_read(buf, timeout).await
    }
}

impl std::fmt::Debug for StreamEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEngine")
            .field("config", &self.config())
            .field("rx", &self.rx_state())
            .field("tx", &self.tx_state())
            .finish()
    }
}

/// Stop the worker for `stream` if one exists. Returns whether a worker was
/// stopped. A failed direction keeps its failed state.
async fn stop_worker(workers: &mut Workers, stream: &DirectionStream) -> bool {
    let Some(worker) = workers.slot(stream.direction).take() else {
        return false;
    };
    if stream.state().is_active() {
        stream.set_state(WorkerState::Stopping);
    }
    worker.stop().await;
    if stream.state().is_active() {
        stream.set_state(WorkerState::Stopped);
    }
    true
}

/// Ring indices addressed by `layout`.
fn targets(config: &EngineConfig, layout: BufferLayout) -> Result<Vec<usize>> {
    match layout {
        BufferLayout::Channel(ch) => {
            config.check_channel(ch)?;
            Ok(vec![ch])
        }
        BufferLayout::Concatenated | BufferLayout::Interleaved => {
            Ok((0..config.channels as usize).collect())
        }
    }
}

/// Components of `m` samples starting at sample `offset` for the `slot`-th
/// channel of a caller buffer holding `n` samples per channel.
#[allow(clippy::too_many_arguments)]
fn gather<'a>(
    layout: BufferLayout,
    iq: &'a [i16],
    slot: usize,
    channels: usize,
    n: usize,
    offset: usize,
    m: usize,
    scratch: &'a mut Vec<i16>,
) -> &'a [i16] {
    match layout {
        BufferLayout::Channel(_) => &iq[offset * 2..(offset + m) * 2],
        BufferLayout::Concatenated => {
            let base = slot * n * 2;
            &iq[base + offset * 2..base + (offset + m) * 2]
        }
        BufferLayout::Interleaved => {
            scratch.clear();
            for s in offset..offset + m {
                let at = (s * channels + slot) * 2;
                scratch.extend_from_slice(&iq[at..at + 2]);
            }
            scratch
        }
    }
}

/// Inverse of [`gather`]: place `iq` for the `slot`-th channel at sample
/// `offset` of the caller buffer.
fn scatter(
    layout: BufferLayout,
    out: &mut [i16],
    slot: usize,
    channels: usize,
    n: usize,
    offset: usize,
    iq: &[i16],
) {
    let m = iq.len() / 2;
    match layout {
        BufferLayout::Channel(_) => out[offset * 2..(offset + m) * 2].copy_from_slice(iq),
        BufferLayout::Concatenated => {
            let base = slot * n * 2 + offset * 2;
            out[base..base + m * 2].copy_from_slice(iq);
        }
        BufferLayout::Interleaved => {
            for (k, pair) in iq.chunks_exact(2).enumerate() {
                let at = ((offset + k) * channels + slot) * 2;
                out[at..at + 2].copy_from_slice(pair);
            }
        }
    }
}
