// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use num_complex::Complex;
use sdr_stream::{
    Error, HostSample, SampleMeta, StreamDevice,
    config::StreamDescriptor,
    device::sim::SimulatedFrontEnd,
    transport::{RxPacket, sim::SimTransport},
};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

/// Upper bound for waiting on worker threads.
pub const WORKER_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_logging() {
    // Initialize logging once (respects RUST_LOG environment variable)
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });
}

/// A simulated single-module device with a manual clock.
pub struct TestRig {
    pub front_end: Arc<SimulatedFrontEnd>,
    pub device: StreamDevice,
}

impl TestRig {
    pub fn new(channels: u8) -> Self {
        Self::with_transport(SimTransport::new(channels))
    }

    pub fn with_transport(transport: SimTransport) -> Self {
        init_logging();
        let front_end = Arc::new(SimulatedFrontEnd::with_transports(vec![Arc::new(transport)]));
        let device = StreamDevice::new(front_end.clone()).expect("Failed to open simulated device");
        Self { front_end, device }
    }

    pub fn transport(&self) -> &Arc<SimTransport> {
        self.front_end
            .sim_transport(0)
            .expect("Simulated device has no module 0")
    }

    /// Configures and starts module 0.
    pub fn start(&self, descriptor: StreamDescriptor) {
        self.device
            .stream_setup(0, descriptor, None)
            .expect("Failed to set up stream");
        self.device.stream_start(0).expect("Failed to start stream");
    }

    pub fn inject(&self, channel: u8, timestamp: i64, payload: Vec<u8>) {
        self.transport().inject(RxPacket {
            channel,
            timestamp,
            payload,
        });
    }

    /// Polls `stream_rx` until it returns samples or the worker timeout expires.
    ///
    /// Not-yet-available results of timestamped requests are retried.
    pub fn receive<S: HostSample>(
        &self,
        channel: u8,
        destination: &mut [S],
        meta: &mut SampleMeta,
    ) -> usize {
        let deadline = Instant::now() + WORKER_TIMEOUT;
        let requested = *meta;
        loop {
            match self.device.stream_rx(0, channel, destination, meta) {
                Ok(0) | Err(Error::NotYetAvailable) => {}
                Ok(count) => return count,
                Err(err) => panic!("Receive failed: {err}"),
            }
            if Instant::now() > deadline {
                return 0;
            }
            *meta = requested;
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

/// Polls `condition` until it returns `Some` or the worker timeout expires.
pub fn wait_for<T>(mut condition: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + WORKER_TIMEOUT;
    loop {
        if let Some(value) = condition() {
            return Some(value);
        }
        if Instant::now() > deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Encodes samples as an `I16` link payload.
pub fn i16_payload(samples: &[Complex<i16>]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|s| s.re.to_le_bytes().into_iter().chain(s.im.to_le_bytes()))
        .collect()
}

/// A recognisable ramp of `count` samples starting at `start`.
pub fn ramp(start: i16, count: usize) -> Vec<Complex<i16>> {
    (0..count as i16)
        .map(|n| Complex::new(start + n, -(start + n)))
        .collect()
}
