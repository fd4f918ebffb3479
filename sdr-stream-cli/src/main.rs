// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Loopback streaming demo.
//!
//! Streams a tone through a simulated RF module whose TX output is wired back
//! to its RX input, then prints the final per-channel statistics as JSON.

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use clap::Parser;
use num_complex::Complex;
use sdr_stream::{
    ChannelStats, DataFormat, Direction, HostSample, SampleMeta, StatusCallback, StreamDevice,
    config::{StreamDescriptor, StreamExtras},
    device::sim::SimulatedFrontEnd,
    transport::sim::SimTransport,
};
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "sdr-stream")]
#[command(version, about = "Loopback streaming demo on a simulated SDR", long_about = None)]
struct Args {
    /// Number of channels streamed in each direction
    #[arg(short, long, default_value_t = 1)]
    channels: u8,

    /// Host sample format (i16, i12, f32)
    #[arg(short, long, default_value = "f32")]
    format: DataFormat,

    /// Link sample format (i16, i12, f32)
    #[arg(short, long, default_value = "i16")]
    link_format: DataFormat,

    /// Simulated hardware sample rate in Hz
    #[arg(short, long, default_value_t = 1_000_000.0)]
    sample_rate: f64,

    /// Streaming duration in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    duration_ms: u64,

    /// Samples per transmit call
    #[arg(long, default_value_t = 1020)]
    chunk: usize,

    /// JSON stream descriptor overriding the channel and format options
    #[arg(long, env = "SDR_STREAM_DESCRIPTOR")]
    descriptor: Option<PathBuf>,
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging();
    let args = Args::parse();

    let descriptor = match &args.descriptor {
        Some(path) => StreamDescriptor::from_json(&std::fs::read_to_string(path)?)?,
        None => StreamDescriptor {
            rx_channels: (0..args.channels).collect(),
            tx_channels: (0..args.channels).collect(),
            format: args.format,
            link_format: args.link_format,
            hint_sample_rate: args.sample_rate as f32,
            extras: StreamExtras::default(),
            ..Default::default()
        },
    };
    let channel_count = descriptor
        .rx_channels
        .iter()
        .chain(&descriptor.tx_channels)
        .max()
        .map_or(1, |c| c + 1);

    let transport = SimTransport::realtime(channel_count, args.sample_rate).with_loopback(true);
    let front_end = Arc::new(SimulatedFrontEnd::with_transports(vec![Arc::new(transport)]));
    let device = StreamDevice::new(front_end)?;

    let callback: Arc<dyn StatusCallback> = Arc::new(|stats: &ChannelStats| {
        debug!(
            tx = stats.is_tx,
            packets = stats.packets,
            fifo = stats.fifo_filled,
            "Status"
        );
        true
    });
    device.stream_setup(0, descriptor.clone(), Some(callback))?;
    device.stream_start(0)?;

    let received = match descriptor.format {
        DataFormat::F32 => run(&device, &descriptor, &args, |phase| {
            Complex::from_polar(0.5f32, phase)
        })?,
        integer => {
            let amplitude = integer.full_scale() * 0.5;
            run(&device, &descriptor, &args, move |phase| {
                let tone = Complex::from_polar(amplitude, phase);
                Complex::new(tone.re.round() as i16, tone.im.round() as i16)
            })?
        }
    };
    device.stream_stop(0)?;

    for &channel in &descriptor.tx_channels {
        let stats = device.stream_status(0, channel, Direction::Tx)?;
        println!("{}", serde_json::json!({ "channel": channel, "direction": "tx", "stats": stats }));
    }
    for (&channel, samples) in descriptor.rx_channels.iter().zip(&received) {
        let stats = device.stream_status(0, channel, Direction::Rx)?;
        println!(
            "{}",
            serde_json::json!({
                "channel": channel,
                "direction": "rx",
                "received_samples": samples,
                "stats": stats,
            })
        );
    }
    Ok(())
}

/// Transmits a tone on every TX channel and drains every RX channel until the
/// requested duration has passed. Returns the samples received per RX channel.
fn run<S: HostSample>(
    device: &StreamDevice,
    descriptor: &StreamDescriptor,
    args: &Args,
    tone: impl Fn(f32) -> S,
) -> sdr_stream::Result<Vec<usize>> {
    let chunk = args.chunk.max(1);
    let step = 2.0 * std::f32::consts::PI / 64.0;
    let mut source = Vec::with_capacity(chunk);
    let mut destination = vec![S::default(); chunk];
    let mut received = vec![0usize; descriptor.rx_channels.len()];
    let mut sent = 0usize;
    let pace = Duration::from_secs_f64(chunk as f64 / args.sample_rate);
    let end = Instant::now() + Duration::from_millis(args.duration_ms);

    info!(chunk, ?pace, "Streaming tone");
    while Instant::now() < end {
        source.clear();
        source.extend((0..chunk).map(|n| tone(((sent + n) % 64) as f32 * step)));
        for &channel in &descriptor.tx_channels {
            let accepted = device.stream_tx(0, channel, &source, &SampleMeta::default().flushed())?;
            if accepted < chunk {
                warn!(channel, accepted, "TX buffer full");
            }
        }
        sent += chunk;

        for (index, &channel) in descriptor.rx_channels.iter().enumerate() {
            let mut meta = SampleMeta::default();
            loop {
                let count = device.stream_rx(0, channel, &mut destination, &mut meta)?;
                if count == 0 {
                    break;
                }
                received[index] += count;
            }
        }
        std::thread::sleep(pace);
    }
    Ok(received)
}
