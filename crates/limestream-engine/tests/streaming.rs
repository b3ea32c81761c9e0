mod common;

use std::sync::Arc;
use std::time::Duration;

use limestream_core::{
    BufferLayout, EngineConfig, Error, OperationMode, RetryPolicy, StreamEvent, WorkerState,
};
use limestream_engine::ClockStrategy;
use limestream_test_harness::ManualClock;

use common::{eventually, loopback_engine, packet, pattern};

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        initial_backoff: Duration::from_millis(1),
        multiplier: 2,
        max_backoff: Duration::from_millis(4),
    }
}

#[tokio::test]
async fn synchronized_loopback_round_trip() {
    let (_port, engine) = loopback_engine(|b| b);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 4096, 2))
        .await
        .unwrap();
    engine.tx_start().await.unwrap();

    let sent = pattern(1024, 3);
    let written = engine
        .write(BufferLayout::Channel(0), &sent, 1000, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(written, 1024);

    engine.rx_start(false, 0).await.unwrap();
    let mut received = vec![0i16; 2 * 1024];
    let (read, timestamp) = engine
        .read(BufferLayout::Channel(0), &mut received, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!((read, timestamp), (1024, 1000));
    assert_eq!(received, sent);

    let stats = engine.stats().unwrap();
    assert_eq!(stats.tx.total_samples, 1024);
    assert_eq!(stats.rx.total_samples, 1024);
    assert_eq!(stats.rx.timestamp_gaps, 0);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn fifo_order_across_many_writes() {
    let (port, engine) = loopback_engine(|b| b.overflow_wait(Duration::from_millis(500)));
    port.lock().await.set_recording(false);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Unsynchronized, 512, 1))
        .await
        .unwrap();
    engine.rx_start(false, 0).await.unwrap();
    engine.tx_start().await.unwrap();

    let sent: Vec<Vec<i16>> = (0..20).map(|k| pattern(300, k * 11)).collect();
    let writer = {
        let sent = sent.clone();
        let engine = &engine;
        async move {
            for block in &sent {
                let n = engine
                    .write(BufferLayout::Channel(0), block, 0, Duration::from_secs(2))
                    .await
                    .unwrap();
                assert_eq!(n, 300);
            }
        }
    };
    let reader = async {
        let mut got = Vec::new();
        let mut buf = vec![0i16; 2 * 256];
        while got.len() < 20 * 300 * 2 {
            let (n, _) = engine
                .read(BufferLayout::Channel(0), &mut buf, Duration::from_millis(200))
                .await
                .unwrap();
            let stats = engine.stats().unwrap();
            assert!(stats.rx.occupied <= stats.rx.buffer_capacity);
            assert!(stats.tx.occupied <= stats.tx.buffer_capacity);
            got.extend_from_slice(&buf[..n * 2]);
        }
        got
    };
    let ((), got) = tokio::join!(writer, reader);
    assert_eq!(got, sent.concat());
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn unsynchronized_timestamps_count_samples() {
    let (_port, engine) = loopback_engine(|b| b);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Unsynchronized, 1024, 1))
        .await
        .unwrap();
    engine.rx_start(false, 0).await.unwrap();
    engine.tx_start().await.unwrap();

    // The caller's timestamp carries no meaning in this mode.
    engine
        .write(BufferLayout::Channel(0), &pattern(100, 0), 99_999, Duration::from_millis(100))
        .await
        .unwrap();
    let mut buf = vec![0i16; 2 * 40];
    let (n, ts) = engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!((n, ts), (40, 0));
    let (n, ts) = engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!((n, ts), (40, 40));
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn zero_timeout_read_on_empty_returns_immediately() {
    let (_port, engine) = loopback_engine(|b| b);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 256, 1))
        .await
        .unwrap();
    engine.rx_start(false, 0).await.unwrap();

    let mut buf = vec![0i16; 2 * 64];
    let started = std::time::Instant::now();
    let (n, _) = engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(n, 0);
    assert!(started.elapsed() < Duration::from_millis(50));
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn write_beyond_free_space_is_partial() {
    let (_port, engine) = loopback_engine(|b| b);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 100, 1))
        .await
        .unwrap();

    // TX is not started, so nothing drains the ring.
    let first = engine
        .write(BufferLayout::Channel(0), &pattern(60, 0), 0, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(first, 60);
    let second = engine
        .write(BufferLayout::Channel(0), &pattern(60, 1), 60, Duration::from_millis(20))
        .await
        .unwrap();
    assert_eq!(second, 40);
    let third = engine
        .write(BufferLayout::Channel(0), &pattern(10, 2), 100, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(third, 0);
    assert_eq!(engine.stats().unwrap().tx.occupied, 100);
}

#[tokio::test]
async fn rx_restart_preserves_buffered_samples() {
    let (port, engine) = loopback_engine(|b| b);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 1024, 1))
        .await
        .unwrap();
    engine.rx_start(false, 0).await.unwrap();

    let first = pattern(200, 5);
    port.lock().await.inject_packet(&packet(0, 5000, &first));
    eventually("samples buffered", || {
        engine.stats().unwrap().rx.occupied == 200
    })
    .await;

    engine.rx_stop().await.unwrap();
    assert_eq!(engine.stats().unwrap().rx.occupied, 200);

    engine.rx_start(false, 0).await.unwrap();
    let second = pattern(100, 9);
    port.lock().await.inject_packet(&packet(0, 5200, &second));

    let mut buf = vec![0i16; 2 * 300];
    let (n, ts) = engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!((n, ts), (300, 5000));
    assert_eq!(&buf[..400], &first[..]);
    assert_eq!(&buf[400..], &second[..]);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn timestamp_gaps_are_reported() {
    let (port, engine) = loopback_engine(|b| b);
    let mut events = engine.subscribe();
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 1024, 1))
        .await
        .unwrap();
    engine.rx_start(false, 0).await.unwrap();

    {
        let mut port = port.lock().await;
        port.inject_packet(&packet(0, 0, &pattern(10, 0)));
        port.inject_packet(&packet(0, 10, &pattern(10, 1)));
        port.inject_packet(&packet(0, 500, &pattern(10, 2)));
    }
    eventually("all packets received", || {
        engine.stats().unwrap().rx.occupied == 30
    })
    .await;
    assert_eq!(engine.stats().unwrap().rx.timestamp_gaps, 1);

    let gap = std::iter::from_fn(|| events.try_recv().ok())
        .find(|e| matches!(e, StreamEvent::TimestampGap { .. }));
    assert_eq!(
        gap,
        Some(StreamEvent::TimestampGap {
            channel: 0,
            expected: 20,
            actual: 500
        })
    );

    // The worker keeps running and the timestamps survive the gap.
    let mut buf = vec![0i16; 2 * 20];
    let (n, ts) = engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!((n, ts), (20, 0));
    let (n, ts) = engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!((n, ts), (10, 500));
    assert_eq!(engine.rx_state(), WorkerState::Running);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn burst_mode_delivers_whole_bursts() {
    let (port, engine) = loopback_engine(|b| b);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 1024, 1))
        .await
        .unwrap();
    engine.rx_start(true, 100).await.unwrap();

    {
        let mut port = port.lock().await;
        port.inject_packet(&packet(0, 0, &pattern(60, 0)));
        port.inject_packet(&packet(0, 60, &pattern(60, 1)));
    }
    eventually("one burst", || engine.stats().unwrap().rx.occupied == 100).await;

    // 20 staged samples, then a gap: the partial burst is discarded.
    {
        let mut port = port.lock().await;
        port.inject_packet(&packet(0, 1000, &pattern(100, 2)));
    }
    eventually("second burst", || engine.stats().unwrap().rx.occupied == 200).await;

    let stats = engine.stats().unwrap();
    assert_eq!(stats.rx.timestamp_gaps, 1);
    assert_eq!(stats.rx.dropped_samples, 20);

    let mut buf = vec![0i16; 2 * 100];
    let (_, ts) = engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(ts, 0);
    let (_, ts) = engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(ts, 1000);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn full_rx_ring_drops_and_counts() {
    let (port, engine) = loopback_engine(|b| b.overflow_wait(Duration::from_millis(1)));
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 64, 1))
        .await
        .unwrap();
    engine.rx_start(false, 0).await.unwrap();

    {
        let mut port = port.lock().await;
        port.inject_packet(&packet(0, 0, &pattern(50, 0)));
        port.inject_packet(&packet(0, 50, &pattern(50, 1)));
    }
    eventually("overflow", || engine.stats().unwrap().rx.dropped_samples == 36).await;
    let stats = engine.stats().unwrap();
    assert_eq!(stats.rx.occupied, 64);
    assert!(stats.rx.occupied <= stats.rx.buffer_capacity);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn malformed_packets_are_skipped() {
    let (port, engine) = loopback_engine(|b| b);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 256, 1))
        .await
        .unwrap();
    engine.rx_start(false, 0).await.unwrap();
    {
        let mut port = port.lock().await;
        port.inject_packet(&[0xFF; 5]);
        // Channel 3 does not exist.
        port.inject_packet(&packet(3, 0, &pattern(4, 0)));
        port.inject_packet(&packet(0, 0, &pattern(4, 0)));
    }
    eventually("good packet", || engine.stats().unwrap().rx.occupied == 4).await;
    assert_eq!(engine.stats().unwrap().rx.malformed_packets, 2);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn transient_receive_errors_are_retried() {
    let (port, engine) = loopback_engine(|b| b.retry_policy(fast_retry(3)));
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 256, 1))
        .await
        .unwrap();
    {
        let mut port = port.lock().await;
        port.fail_next_receives(3);
        port.inject_packet(&packet(0, 7, &pattern(16, 0)));
    }
    engine.rx_start(false, 0).await.unwrap();

    let mut buf = vec![0i16; 2 * 16];
    let (n, ts) = engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!((n, ts), (16, 7));
    assert_eq!(engine.rx_state(), WorkerState::Running);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn exhausted_rx_retries_fail_the_direction() {
    let (port, engine) = loopback_engine(|b| b.retry_policy(fast_retry(2)));
    let mut events = engine.subscribe();
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 256, 1))
        .await
        .unwrap();
    port.lock().await.fail_all_receives();
    engine.rx_start(false, 0).await.unwrap();
    eventually("rx failure", || engine.rx_state() == WorkerState::Failed).await;

    let mut buf = vec![0i16; 8];
    let result = engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::from_millis(10))
        .await;
    assert!(matches!(
        result,
        Err(Error::StreamFailed { direction: limestream_core::Direction::Rx, .. })
    ));
    // Sticky until restarted.
    assert!(engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::ZERO)
        .await
        .is_err());
    assert!(engine.stats().unwrap().rx.failed);
    // TX is unaffected.
    assert!(engine
        .write(BufferLayout::Channel(0), &buf, 0, Duration::ZERO)
        .await
        .is_ok());

    let failed = std::iter::from_fn(|| events.try_recv().ok())
        .any(|e| matches!(e, StreamEvent::WorkerFailed { .. }));
    assert!(failed);

    // Stopping a failed worker keeps it failed; starting clears it.
    engine.rx_stop().await.unwrap();
    assert_eq!(engine.rx_state(), WorkerState::Failed);
    {
        let mut port = port.lock().await;
        port.clear_faults();
        port.inject_packet(&packet(0, 0, &pattern(4, 0)));
    }
    engine.rx_start(false, 0).await.unwrap();
    let (n, _) = engine
        .read(BufferLayout::Channel(0), &mut buf, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(n, 4);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn exhausted_tx_retries_fail_writes() {
    let (port, engine) = loopback_engine(|b| b.retry_policy(fast_retry(1)));
    engine
        .init(EngineConfig::new(30.72, OperationMode::Unsynchronized, 256, 1))
        .await
        .unwrap();
    port.lock().await.fail_all_sends();
    engine.tx_start().await.unwrap();
    engine
        .write(BufferLayout::Channel(0), &pattern(10, 0), 0, Duration::ZERO)
        .await
        .unwrap();
    eventually("tx failure", || engine.tx_state() == WorkerState::Failed).await;

    let result = engine
        .write(BufferLayout::Channel(0), &pattern(10, 0), 0, Duration::ZERO)
        .await;
    match result {
        Err(Error::StreamFailed { reason, .. }) => {
            assert!(reason.contains("10 samples"), "reason: {reason}")
        }
        other => panic!("expected StreamFailed, got {other:?}"),
    }
    // The run that never made it out is accounted for.
    assert_eq!(engine.stats().unwrap().tx.dropped_samples, 10);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn transmit_waits_for_the_device_clock() {
    let clock = Arc::new(ManualClock::new(1_000_000.0));
    let (port, engine) = loopback_engine(|b| b.clock(ClockStrategy::Custom(clock.clone())));
    port.lock().await.set_echo(false);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 1024, 1))
        .await
        .unwrap();
    engine.tx_start().await.unwrap();
    engine
        .write(BufferLayout::Channel(0), &pattern(50, 0), 10_000, Duration::ZERO)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(port.lock().await.sent_count(), 0);
    assert_eq!(engine.stats().unwrap().tx.occupied, 50);

    clock.set(10_000);
    let mut sent = 0;
    for _ in 0..1000 {
        sent = port.lock().await.sent_count();
        if sent > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(sent, 1);
    assert_eq!(engine.stats().unwrap().tx.late_packets, 0);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn late_packets_are_sent_and_counted() {
    let clock = Arc::new(ManualClock::new(1_000_000.0));
    clock.set(1_000_000);
    let (port, engine) = loopback_engine(|b| b.clock(ClockStrategy::Custom(clock.clone())));
    port.lock().await.set_echo(false);
    let mut events = engine.subscribe();
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 1024, 1))
        .await
        .unwrap();
    engine.tx_start().await.unwrap();
    engine
        .write(BufferLayout::Channel(0), &pattern(20, 0), 100, Duration::ZERO)
        .await
        .unwrap();

    eventually("late packet", || engine.stats().unwrap().tx.late_packets == 1).await;
    assert_eq!(engine.stats().unwrap().tx.total_samples, 20);
    let late = std::iter::from_fn(|| events.try_recv().ok())
        .find(|e| matches!(e, StreamEvent::LateTransmit { .. }));
    assert_eq!(
        late,
        Some(StreamEvent::LateTransmit {
            channel: 0,
            timestamp: 100,
            device_tick: 1_000_000
        })
    );
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn packets_respect_size_limit() {
    let (port, engine) = loopback_engine(|b| b.packet_samples(64));
    port.lock().await.set_echo(false);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Unsynchronized, 1024, 1))
        .await
        .unwrap();
    engine.tx_start().await.unwrap();
    engine
        .write(BufferLayout::Channel(0), &pattern(200, 0), 0, Duration::ZERO)
        .await
        .unwrap();
    eventually("all sent", || engine.stats().unwrap().tx.total_samples == 200).await;

    let port = port.lock().await;
    let headers: Vec<_> = port
        .sent_packets()
        .iter()
        .map(|p| limestream_core::packet::parse_packet(p).unwrap().header)
        .collect();
    let sizes: Vec<usize> = headers.iter().map(|h| h.sample_count as usize).collect();
    assert_eq!(sizes, vec![64, 64, 64, 8]);
    let sequences: Vec<u32> = headers.iter().map(|h| h.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
    // Unsynchronized packets carry a running sample count.
    let timestamps: Vec<u64> = headers.iter().map(|h| h.timestamp).collect();
    assert_eq!(timestamps, vec![0, 64, 128, 192]);
    drop(port);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn interleaved_multi_channel_round_trip() {
    let (_port, engine) = loopback_engine(|b| b);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 512, 2))
        .await
        .unwrap();
    engine.rx_start(false, 0).await.unwrap();
    engine.tx_start().await.unwrap();

    // 128 samples per channel, interleaved.
    let sent = pattern(256, 1);
    let written = engine
        .write(BufferLayout::Interleaved, &sent, 2000, Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(written, 128);

    let mut concatenated = vec![0i16; sent.len()];
    let (n, ts) = engine
        .read(BufferLayout::Concatenated, &mut concatenated, Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!((n, ts), (128, 2000));

    for s in 0..128 {
        for ch in 0..2 {
            let from = (s * 2 + ch) * 2;
            let to = (ch * 128 + s) * 2;
            assert_eq!(&sent[from..from + 2], &concatenated[to..to + 2]);
        }
    }
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn stats_report_rate_and_occupancy() {
    let (port, engine) = loopback_engine(|b| b);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 4096, 1))
        .await
        .unwrap();
    engine.rx_start(false, 0).await.unwrap();
    for k in 0..4 {
        port.lock()
            .await
            .inject_packet(&packet(0, k * 100, &pattern(100, 0)));
    }
    eventually("buffered", || engine.stats().unwrap().rx.occupied == 400).await;
    let stats = engine.stats().unwrap();
    assert_eq!(stats.rx.total_samples, 400);
    assert!(stats.rx.sample_rate_hz > 0.0);
    assert_eq!(stats.rx.state, WorkerState::Running);
    assert_eq!(stats.tx.state, WorkerState::Stopped);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn stats_capacity_covers_every_channel() {
    let (_port, engine) = loopback_engine(|b| b);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 16, 2))
        .await
        .unwrap();
    for ch in 0..2 {
        let written = engine
            .write(BufferLayout::Channel(ch), &pattern(16, ch as i32), 0, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(written, 16);
    }

    let stats = engine.stats().unwrap();
    assert_eq!(stats.tx.occupied, 32);
    assert_eq!(stats.tx.buffer_capacity, 32);
    assert!(stats.tx.occupied <= stats.tx.buffer_capacity);
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn oversized_write_keeps_the_tx_ring_topped_up() {
    let clock = Arc::new(ManualClock::new(1_000_000.0));
    let (port, engine) = loopback_engine(|b| {
        b.clock(ClockStrategy::Custom(clock.clone()))
            .packet_samples(16)
    });
    port.lock().await.set_echo(false);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 64, 1))
        .await
        .unwrap();
    engine.tx_start().await.unwrap();

    let sent = pattern(1000, 5);
    let writer = engine.write(BufferLayout::Channel(0), &sent, 0, Duration::from_secs(5));
    let driver = async {
        // Each tick releases one 16-sample packet; the pending write must
        // refill the freed space right away rather than wait for an empty ring.
        for tick in [0u64, 16, 32, 48] {
            clock.set(tick);
            eventually("packet sent", || {
                engine.stats().unwrap().tx.total_samples == tick + 16
            })
            .await;
            eventually("ring refilled", || engine.stats().unwrap().tx.occupied == 64).await;
        }
        clock.set(1000);
    };
    let (written, ()) = tokio::join!(writer, driver);
    assert_eq!(written.unwrap(), 1000);

    eventually("all sent", || engine.stats().unwrap().tx.total_samples == 1000).await;
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn interleaved_write_larger_than_the_ring_completes() {
    let (port, engine) = loopback_engine(|b| b.packet_samples(16));
    port.lock().await.set_echo(false);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Unsynchronized, 32, 2))
        .await
        .unwrap();
    engine.tx_start().await.unwrap();

    let written = engine
        .write(BufferLayout::Interleaved, &pattern(2 * 500, 9), 0, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(written, 500);
    eventually("all sent", || engine.stats().unwrap().tx.total_samples == 1000).await;
    engine.destroy().await.unwrap();
}

#[tokio::test]
async fn stopping_mid_burst_counts_the_partial_burst() {
    let (port, engine) = loopback_engine(|b| b);
    engine
        .init(EngineConfig::new(30.72, OperationMode::Synchronized, 1024, 1))
        .await
        .unwrap();
    engine.rx_start(true, 100).await.unwrap();
    port.lock()
        .await
        .inject_packet(&packet(0, 0, &pattern(30, 0)));
    eventually("packet received", || engine.stats().unwrap().rx.total_samples == 30).await;

    engine.rx_stop().await.unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!(stats.rx.occupied, 0);
    assert_eq!(stats.rx.dropped_samples, 30);
    engine.destroy().await.unwrap();
}
