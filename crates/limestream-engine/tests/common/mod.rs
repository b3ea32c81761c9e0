#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use limestream_core::packet::{PacketHeader, encode_packet};
use limestream_engine::{EngineBuilder, StreamEngine};
use limestream_test_harness::LoopbackPort;

/// A loopback port and an engine streaming over it.
pub fn loopback_engine(
    configure: impl FnOnce(EngineBuilder) -> EngineBuilder,
) -> (Arc<Mutex<LoopbackPort>>, StreamEngine) {
    let (port, shared) = LoopbackPort::new().shared();
    let builder = EngineBuilder::new(shared).poll_interval(Duration::from_millis(2));
    let engine = configure(builder).build().expect("valid builder");
    (port, engine)
}

/// Deterministic 12-bit IQ pattern.
pub fn pattern(samples: usize, seed: i32) -> Vec<i16> {
    (0..samples * 2)
        .map(|i| ((i as i32 * 7 + seed).rem_euclid(4096) - 2048) as i16)
        .collect()
}

/// An encoded RX packet as the device would send it.
pub fn packet(channel: u8, timestamp: u64, iq: &[i16]) -> Vec<u8> {
    let header = PacketHeader {
        timestamp_valid: true,
        channel,
        sample_count: 0,
        sequence: 0,
        timestamp,
    };
    encode_packet(&header, iq).expect("packet fits")
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
