//! State shared between the engine handle and its streaming workers.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Notify, broadcast};
use tracing::debug;

use limestream_core::clock::ClockSource;
use limestream_core::error::{Error, Result};
use limestream_core::events::StreamEvent;
use limestream_core::types::{Direction, DirectionStats, EngineConfig, WorkerState};

use crate::ring::SampleRing;
use crate::stats::{Counters, RateMeter};

/// Rings, counters and lifecycle state for one direction.
#[derive(Debug)]
pub(crate) struct DirectionStream {
    pub direction: Direction,
    /// One ring per channel.
    pub rings: Vec<SampleRing>,
    pub meter: RateMeter,
    pub counters: Counters,
    /// Signalled by every push into any of `rings`, so an idle worker
    /// notices new work without waiting out its poll interval.
    pub data_ready: Arc<Notify>,
    state: AtomicU8,
    failure: Mutex<Option<String>>,
    events: broadcast::Sender<StreamEvent>,
}

impl DirectionStream {
    pub(crate) fn new(
        direction: Direction,
        channels: usize,
        capacity: usize,
        events: broadcast::Sender<StreamEvent>,
    ) -> Result<Self> {
        let data_ready = Arc::new(Notify::new());
        let space_ready = Arc::new(Notify::new());
        let rings = (0..channels)
            .map(|_| SampleRing::with_notifiers(capacity, data_ready.clone(), space_ready.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(DirectionStream {
            direction,
            rings,
            meter: RateMeter::new(),
            counters: Counters::default(),
            data_ready,
            state: AtomicU8::new(WorkerState::Stopped as u8),
            failure: Mutex::new(None),
            events,
        })
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        let prev = WorkerState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        if prev != state {
            debug!(direction = %self.direction, from = %prev, to = %state, "worker state");
            self.emit(StreamEvent::StateChanged {
                direction: self.direction,
                state,
            });
        }
    }

    /// Mark the direction failed after the worker gave up.
    pub(crate) fn fail(&self, reason: String) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.clone());
        self.set_state(WorkerState::Failed);
        self.emit(StreamEvent::WorkerFailed {
            direction: self.direction,
            reason,
        });
    }

    pub(crate) fn clear_failure(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Error out if the worker for this direction has failed.
    pub(crate) fn ensure_healthy(&self) -> Result<()> {
        match &*self.failure.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(reason) => Err(Error::StreamFailed {
                direction: self.direction,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn emit(&self, event: StreamEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn channels(&self) -> usize {
        self.rings.len()
    }

    pub(crate) fn snapshot(&self) -> DirectionStats {
        let state = self.state();
        DirectionStats {
            buffer_capacity: self.rings.iter().map(SampleRing::capacity).sum(),
            occupied: self.rings.iter().map(SampleRing::occupied).sum(),
            sample_rate_hz: self.meter.rate(),
            state,
            failed: state == WorkerState::Failed,
            total_samples: Counters::get(&self.counters.total_samples),
            timestamp_gaps: Counters::get(&self.counters.timestamp_gaps),
            late_packets: Counters::get(&self.counters.late_packets),
            dropped_samples: Counters::get(&self.counters.dropped_samples),
            malformed_packets: Counters::get(&self.counters.malformed_packets),
        }
    }
}

/// Everything allocated by `init` and released by `destroy`.
#[derive(Debug)]
pub(crate) struct Streams {
    pub config: EngineConfig,
    pub rx: DirectionStream,
    pub tx: DirectionStream,
    pub clock: Arc<dyn ClockSource>,
}

impl Streams {
    pub(crate) fn new(
        config: EngineConfig,
        clock: Arc<dyn ClockSource>,
        events: broadcast::Sender<StreamEvent>,
    ) -> Result<Self> {
        let channels = config.channels as usize;
        let rx = DirectionStream::new(Direction::Rx, channels, config.buffer_length, events.clone())?;
        let tx = DirectionStream::new(Direction::Tx, channels, config.buffer_length, events)?;
        Ok(Streams {
            config,
            rx,
            tx,
            clock,
        })
    }

    pub(crate) fn direction(&self, direction: Direction) -> &DirectionStream {
        match direction {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        }
    }
}
