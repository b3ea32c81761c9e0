//! Fixed-capacity ring buffer of timestamped IQ samples.
//!
//! One [`SampleRing`] holds one channel of one direction. Samples are stored
//! as a flat interleaved `i16` array with a head cursor and a fill count;
//! timestamps are kept as sparse *markers* at the points where the timestamp
//! sequence is not contiguous, so a long stream of contiguous pushes costs a
//! single marker.
//!
//! Blocking operations wait on [`tokio::sync::Notify`] wake-ups and are
//! always bounded by a deadline. Rings may share their notifiers so that one
//! waiter can watch several rings; every wait re-checks its own ring. Requests larger than the capacity are served
//! incrementally as the other side frees space or produces data.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use limestream_core::error::{Error, Result};
use limestream_core::samples::SampleBlock;

/// Start of a contiguous timestamp run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marker {
    /// Absolute index of the first sample of the run.
    start: u64,
    /// Timestamp of that sample.
    timestamp: u64,
}

impl Marker {
    fn timestamp_at(&self, index: u64) -> u64 {
        self.timestamp.wrapping_add(index - self.start)
    }
}

#[derive(Debug)]
struct RingState {
    /// Interleaved components, `2 * capacity` long.
    buf: Vec<i16>,
    /// Sample index of the oldest stored sample.
    head: usize,
    /// Samples stored.
    len: usize,
    /// Total samples ever pushed; the absolute index of the next push.
    written: u64,
    /// Run markers, oldest first. While `len > 0` the first marker starts at
    /// or before the read position.
    markers: VecDeque<Marker>,
}

impl RingState {
    fn capacity(&self) -> usize {
        self.buf.len() / 2
    }

    fn read_index(&self) -> u64 {
        self.written - self.len as u64
    }

    fn front_timestamp(&self) -> Option<u64> {
        if self.len == 0 {
            return None;
        }
        self.markers
            .front()
            .map(|m| m.timestamp_at(self.read_index()))
    }

    /// Samples from the read position to the next discontinuity.
    fn run_len(&self) -> usize {
        let read = self.read_index();
        match self.markers.get(1) {
            Some(next) => ((next.start - read) as usize).min(self.len),
            None => self.len,
        }
    }

    fn push(&mut self, iq: &[i16], timestamp: u64) -> usize {
        let cap = self.capacity();
        let n = (iq.len() / 2).min(cap - self.len);
        if n == 0 {
            return 0;
        }
        if self.len == 0 {
            // Stale markers would otherwise describe the new data.
            self.markers.clear();
        }

        let contiguous = self
            .markers
            .back()
            .is_some_and(|m| m.timestamp_at(self.written) == timestamp);
        if !contiguous {
            self.markers.push_back(Marker {
                start: self.written,
                timestamp,
            });
        }

        let tail = (self.head + self.len) % cap;
        let first = n.min(cap - tail);
        self.buf[tail * 2..(tail + first) * 2].copy_from_slice(&iq[..first * 2]);
        if n > first {
            let rest = n - first;
            self.buf[..rest * 2].copy_from_slice(&iq[first * 2..n * 2]);
        }

        self.len += n;
        self.written += n as u64;
        n
    }

    fn pop(&mut self, max: usize) -> Option<SampleBlock> {
        let n = max.min(self.len);
        if n == 0 {
            return None;
        }
        let timestamp = self.front_timestamp().unwrap_or_default();

        let cap = self.capacity();
        let mut iq = Vec::with_capacity(n * 2);
        let first = n.min(cap - self.head);
        iq.extend_from_slice(&self.buf[self.head * 2..(self.head + first) * 2]);
        if n > first {
            iq.extend_from_slice(&self.buf[..(n - first) * 2]);
        }

        self.head = (self.head + n) % cap;
        self.len -= n;

        let read = self.read_index();
        while self.markers.len() >= 2 && self.markers[1].start <= read {
            self.markers.pop_front();
        }

        Some(SampleBlock::new(timestamp, iq))
    }

    fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.markers.clear();
    }
}

/// A fixed-capacity FIFO of timestamped IQ samples for one channel.
///
/// The capacity is set at construction and never changes. All operations
/// take `&self`; one producer and one consumer may run concurrently.
#[derive(Debug)]
pub struct SampleRing {
    capacity: usize,
    state: Mutex<RingState>,
    occupied: AtomicUsize,
    data_ready: Arc<Notify>,
    space_ready: Arc<Notify>,
}

impl SampleRing {
    /// Allocate a ring holding `capacity` samples.
    ///
    /// Returns [`Error::InvalidParameter`] for a zero capacity and
    /// [`Error::Allocation`] if the memory cannot be reserved.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_notifiers(capacity, Arc::default(), Arc::default())
    }

    /// Allocate a ring that signals pushes on `data_ready` and pops on
    /// `space_ready`.
    pub fn with_notifiers(
        capacity: usize,
        data_ready: Arc<Notify>,
        space_ready: Arc<Notify>,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidParameter(
                "ring capacity must be non-zero".into(),
            ));
        }
        let components = capacity
            .checked_mul(2)
            .ok_or_else(|| Error::Allocation(format!("{capacity} samples overflow")))?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(components)
            .map_err(|e| Error::Allocation(format!("{capacity} samples: {e}")))?;
        buf.resize(components, 0);

        Ok(SampleRing {
            capacity,
            state: Mutex::new(RingState {
                buf,
                head: 0,
                len: 0,
                written: 0,
                markers: VecDeque::new(),
            }),
            occupied: AtomicUsize::new(0),
            data_ready,
            space_ready,
        })
    }

    fn lock(&self) -> MutexGuard<'_, RingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Capacity in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples currently stored. Lock-free.
    pub fn occupied(&self) -> usize {
        self.occupied.load(Ordering::Acquire)
    }

    /// Free space in samples. Lock-free.
    pub fn free(&self) -> usize {
        self.capacity - self.occupied()
    }

    /// Whether the ring holds no samples.
    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    /// Timestamp of the oldest stored sample.
    pub fn front_timestamp(&self) -> Option<u64> {
        self.lock().front_timestamp()
    }

    /// Push as many leading samples of `iq` as fit, without waiting.
    ///
    /// `timestamp` is the tick of `iq`'s first sample. Returns the number of
    /// samples stored.
    pub fn push_now(&self, iq: &[i16], timestamp: u64) -> usize {
        let n = {
            let mut state = self.lock();
            let n = state.push(iq, timestamp);
            self.occupied.store(state.len, Ordering::Release);
            n
        };
        if n > 0 {
            self.data_ready.notify_waiters();
        }
        n
    }

    /// Pop up to `max` samples without waiting.
    pub fn pop_now(&self, max: usize) -> Option<SampleBlock> {
        self.pop_with(|state| max.min(state.len))
    }

    /// Pop up to `max` samples without crossing a timestamp discontinuity,
    /// so the returned block's timestamp describes every sample in it.
    pub fn pop_run(&self, max: usize) -> Option<SampleBlock> {
        self.pop_with(|state| max.min(state.run_len()))
    }

    fn pop_with(&self, limit: impl FnOnce(&RingState) -> usize) -> Option<SampleBlock> {
        let block = {
            let mut state = self.lock();
            let n = limit(&state);
            let block = state.pop(n);
            self.occupied.store(state.len, Ordering::Release);
            block
        };
        if block.is_some() {
            self.space_ready.notify_waiters();
        }
        block
    }

    /// Push `iq`, waiting up to `timeout` for space.
    ///
    /// Samples are stored incrementally as space frees up, so a block longer
    /// than the capacity completes as long as a consumer keeps draining.
    /// Returns the number of samples stored, which is less than requested if
    /// the timeout elapsed first. A zero timeout never waits.
    pub async fn try_push(&self, iq: &[i16], timestamp: u64, timeout: Duration) -> usize {
        let total = iq.len() / 2;
        let deadline = Instant::now() + timeout;
        let mut written = 0;

        loop {
            let notified = self.space_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            written += self.push_now(
                &iq[written * 2..total * 2],
                timestamp.wrapping_add(written as u64),
            );
            if written >= total {
                return written;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                written += self.push_now(
                    &iq[written * 2..total * 2],
                    timestamp.wrapping_add(written as u64),
                );
                return written;
            }
        }
    }

    /// Pop up to `count` samples, waiting up to `timeout` for them.
    ///
    /// Data is taken incrementally as it arrives. The returned block holds
    /// whatever was available when `count` was reached or the timeout
    /// elapsed; its timestamp is that of the first returned sample. An empty
    /// block carries the timestamp of the next stored sample, or zero. A
    /// zero timeout never waits.
    pub async fn try_pop(&self, count: usize, timeout: Duration) -> SampleBlock {
        let deadline = Instant::now() + timeout;
        let mut out: Option<SampleBlock> = None;

        loop {
            let notified = self.data_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let have = out.as_ref().map_or(0, SampleBlock::len);
            if let Some(block) = self.pop_now(count - have) {
                match out.as_mut() {
                    Some(acc) => acc.iq.extend_from_slice(&block.iq),
                    None => out = Some(block),
                }
            }
            let have = out.as_ref().map_or(0, SampleBlock::len);
            if have >= count {
                break;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                if let Some(block) = self.pop_now(count - have) {
                    match out.as_mut() {
                        Some(acc) => acc.iq.extend_from_slice(&block.iq),
                        None => out = Some(block),
                    }
                }
                break;
            }
        }

        out.unwrap_or_else(|| SampleBlock::empty(self.front_timestamp().unwrap_or(0)))
    }

    /// Wait until at least `min(n, capacity)` samples are stored or the
    /// deadline passes. Returns the stored count, capped at `n`.
    pub async fn wait_for_data(&self, n: usize, deadline: Instant) -> usize {
        let want = n.min(self.capacity);
        loop {
            let notified = self.data_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let have = self.occupied();
            if have >= want {
                return have.min(n);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.occupied().min(n);
            }
        }
    }

    /// Wait until at least `min(n, capacity)` samples of space are free or
    /// the deadline passes. Returns the free count, capped at `n`.
    pub async fn wait_for_space(&self, n: usize, deadline: Instant) -> usize {
        let want = n.min(self.capacity);
        loop {
            let notified = self.space_ready.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let free = self.free();
            if free >= want {
                return free.min(n);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.free().min(n);
            }
        }
    }

    /// Discard all stored samples.
    pub fn clear(&self) {
        {
            let mut state = self.lock();
            state.clear();
            self.occupied.store(0, Ordering::Release);
        }
        self.space_ready.notify_waiters();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
