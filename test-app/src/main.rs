// limestream test application -- CLI tool for exercising the streaming
// engine against an in-process loopback port, and for listing the serial
// devices a board could be attached to.
//
// Usage:
//   limestream-test-app loopback
//   limestream-test-app loopback --channels 2 --samples 1000000 --mode unsync
//   limestream-test-app -vv loopback --burst 4096
//   limestream-test-app ports

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rand::Rng;
use tracing::{debug, info};

use limestream::transport::SerialPort;
use limestream::{
    BufferLayout, ControlPort, Direction, EngineBuilder, EngineConfig, IQ_MAX, IQ_MIN,
    OperationMode, StatsSnapshot, StreamEngine, StreamEvent, in_iq_range,
};
use limestream_test_harness::LoopbackPort;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// limestream test application -- exercises the streaming engine from the
/// command line.
#[derive(Parser)]
#[command(name = "limestream-test-app", version, about)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream random samples through a loopback port and verify they come
    /// back unchanged.
    Loopback {
        /// Total samples per channel to stream.
        #[arg(long, default_value_t = 200_000)]
        samples: usize,

        /// Samples per channel in each write.
        #[arg(long, default_value_t = 4096)]
        chunk: usize,

        /// Number of channels.
        #[arg(long, default_value_t = 1)]
        channels: u8,

        /// Ring buffer length per channel, in samples.
        #[arg(long, default_value_t = 1 << 16)]
        buffer: usize,

        /// Reference clock in MHz.
        #[arg(long, default_value_t = 30.72)]
        ref_clock: f32,

        /// Operation mode: sync or unsync.
        #[arg(long, default_value = "sync")]
        mode: OperationMode,

        /// Receive in whole bursts of this many samples.
        #[arg(long)]
        burst: Option<usize>,

        /// Per-call timeout in milliseconds.
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
    },

    /// List serial devices a board could be attached to.
    Ports,
}

struct LoopbackArgs {
    samples: usize,
    chunk: usize,
    channels: u8,
    buffer: usize,
    ref_clock: f32,
    mode: OperationMode,
    burst: Option<usize>,
    timeout: Duration,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_loopback(args: LoopbackArgs) -> Result<()> {
    if args.chunk == 0 || args.samples == 0 {
        bail!("--samples and --chunk must be greater than zero");
    }
    if args.chunk > args.buffer {
        bail!(
            "--chunk ({}) must not exceed --buffer ({})",
            args.chunk,
            args.buffer
        );
    }

    let mut loopback = LoopbackPort::new();
    loopback.set_recording(false);
    let (_port, shared) = loopback.shared();
    let engine = EngineBuilder::new(shared)
        .build()
        .context("building engine")?;
    engine
        .init(EngineConfig::new(
            args.ref_clock,
            args.mode,
            args.buffer,
            args.channels,
        ))
        .await
        .context("initializing engine")?;

    let mut events = engine.subscribe();
    match args.burst {
        Some(length) => engine.rx_start(true, length).await?,
        None => engine.rx_start(false, 0).await?,
    }
    engine.tx_start().await?;

    println!(
        "Streaming {} samples x {} channel(s), mode {}, chunk {}",
        args.samples, args.channels, args.mode, args.chunk
    );

    let started = Instant::now();
    let result = stream_and_verify(&engine, &args).await;
    let elapsed = started.elapsed();

    let stats = engine.stats()?;
    engine.destroy().await?;

    let mut notable = 0usize;
    while let Ok(event) = events.try_recv() {
        if !matches!(event, StreamEvent::StateChanged { .. }) {
            debug!(?event, "stream event");
            notable += 1;
        }
    }

    let verified = result?;
    println!();
    println!("  Verified:       {verified} samples per channel");
    println!("  Elapsed:        {:.3} s", elapsed.as_secs_f64());
    println!(
        "  Throughput:     {:.1} Msamples/s",
        (verified * args.channels as usize) as f64 / elapsed.as_secs_f64().max(1e-9) / 1e6
    );
    println!("  Events:         {notable}");
    print_stats(&stats);
    Ok(())
}

/// Write random chunks and read each one back. Returns the number of samples
/// per channel that matched.
async fn stream_and_verify(engine: &StreamEngine, args: &LoopbackArgs) -> Result<usize> {
    let channels = args.channels as usize;
    let frame = 2 * channels;
    let mut rng = rand::thread_rng();
    let mut sent = vec![0i16; args.chunk * frame];
    let mut received = vec![0i16; args.chunk * frame];
    let mut timestamp = 0u64;
    let mut verified = 0usize;

    while verified < args.samples {
        let chunk = args.chunk.min(args.samples - verified);
        let sent = &mut sent[..chunk * frame];
        for v in sent.iter_mut() {
            *v = rng.gen_range(IQ_MIN..=IQ_MAX);
        }

        let written = engine
            .write(BufferLayout::Interleaved, sent, timestamp, args.timeout)
            .await?;
        if written != chunk {
            bail!("write timed out after {written} of {chunk} samples at tick {timestamp}");
        }

        let received = &mut received[..chunk * frame];
        let mut filled = 0usize;
        while filled < chunk {
            let (n, ts) = engine
                .read(
                    BufferLayout::Interleaved,
                    &mut received[filled * frame..],
                    args.timeout,
                )
                .await?;
            if n == 0 {
                bail!("read timed out after {filled} of {chunk} samples");
            }
            if args.mode.is_synchronized() && ts != timestamp + filled as u64 {
                bail!(
                    "timestamp mismatch: expected {}, got {ts}",
                    timestamp + filled as u64
                );
            }
            filled += n;
        }

        if !in_iq_range(received) {
            bail!("received components outside the 12-bit range at tick {timestamp}");
        }
        if let Some(pos) = sent.iter().zip(received.iter()).position(|(a, b)| a != b) {
            bail!(
                "sample mismatch at component {} of chunk starting at tick {timestamp}",
                pos
            );
        }

        verified += chunk;
        timestamp += chunk as u64;
        debug!(verified, timestamp, "chunk verified");
    }

    info!(verified, "loopback complete");
    Ok(verified)
}

fn print_stats(snapshot: &StatsSnapshot) {
    for direction in [Direction::Rx, Direction::Tx] {
        let stats = snapshot.direction(direction);
        println!();
        println!("  {direction}");
        println!("    State:        {}", stats.state);
        println!(
            "    Buffer:       {} / {} samples",
            stats.occupied, stats.buffer_capacity
        );
        println!("    Rate:         {:.0} samples/s", stats.sample_rate_hz);
        println!("    Total:        {}", stats.total_samples);
        println!("    Gaps:         {}", stats.timestamp_gaps);
        println!("    Late:         {}", stats.late_packets);
        println!("    Dropped:      {}", stats.dropped_samples);
        println!("    Malformed:    {}", stats.malformed_packets);
        if stats.failed {
            println!("    FAILED");
        }
    }
}

async fn cmd_ports() -> Result<()> {
    let mut port = SerialPort::new(Default::default());
    let count = port
        .update_device_list()
        .await
        .context("enumerating serial ports")?;

    if count == 0 {
        println!("No serial devices found.");
        return Ok(());
    }

    println!("{count} serial device(s):");
    for index in 0..count {
        if let Some(name) = port.device_name(index) {
            println!("  [{index}] {name}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Loopback {
            samples,
            chunk,
            channels,
            buffer,
            ref_clock,
            mode,
            burst,
            timeout_ms,
        } => {
            cmd_loopback(LoopbackArgs {
                samples,
                chunk,
                channels,
                buffer,
                ref_clock,
                mode,
                burst,
                timeout: Duration::from_millis(timeout_ms),
            })
            .await
        }
        Command::Ports => cmd_ports().await,
    }
}
