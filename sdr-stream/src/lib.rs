// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! # sdr-stream
//!
//! Hardware-abstraction streaming layer for software-defined-radio front ends.
//! Moves continuous, timestamped I/Q sample streams between RF hardware and host
//! software, for one or more independent RF modules with several channels each.
//!
//! ## Overview
//!
//! Each RF module has a [`StreamController`]. A stream is configured once with a
//! [`StreamDescriptor`](config::StreamDescriptor), started, fed or drained through
//! per-channel calls, and stopped. Samples cross the host boundary as
//! [`num_complex::Complex`] values and travel over the link in a packed
//! [`DataFormat`].
//!
//! ### Key Concepts
//!
//! - **Module**: An independently streamable RF chip, addressed by index
//! - **Channel**: One RX or TX path of a module, each with its own bounded buffer
//! - **Tick**: One sample period of the hardware clock; all timestamps are in ticks
//! - **Batch**: The group of samples the workers exchange with the transport at once
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ StreamDevice │  (one per board, wraps an RfFrontEnd)
//! └──────┬───────┘
//!        │
//!        └─► StreamController (per module)
//!              ├─► RX worker ──► ChannelBuffer (per RX channel) ──► receive()
//!              ├─► TX worker ◄── ChannelBuffer (per TX channel) ◄── transmit()
//!              ├─► TimestampScheduler
//!              └─► StatsCollector (per channel) ──► StatusCallback
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use num_complex::Complex;
//! use sdr_stream::{
//!     SampleMeta, StreamDevice,
//!     config::StreamDescriptor,
//!     device::sim::SimulatedFrontEnd,
//!     transport::RxPacket,
//! };
//!
//! # fn main() -> Result<(), sdr_stream::Error> {
//! let front_end = Arc::new(SimulatedFrontEnd::new(1, 2));
//! let device = StreamDevice::new(front_end.clone())?;
//!
//! let descriptor = StreamDescriptor {
//!     rx_channels: vec![0],
//!     ..Default::default()
//! };
//! device.stream_setup(0, descriptor, None)?;
//! device.stream_start(0)?;
//!
//! // Pretend the hardware delivered 4 samples at tick 1000.
//! if let Some(transport) = front_end.sim_transport(0) {
//!     transport.inject(RxPacket { channel: 0, timestamp: 1000, payload: vec![0; 16] });
//! }
//!
//! let mut samples = [Complex::<i16>::default(); 4];
//! let mut meta = SampleMeta::default();
//! let mut received = 0;
//! for _ in 0..200 {
//!     received = device.stream_rx(0, 0, &mut samples, &mut meta)?;
//!     if received > 0 {
//!         break;
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(5));
//! }
//! assert_eq!(received, 4);
//! assert_eq!(meta.timestamp, 1000);
//!
//! device.stream_stop(0)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Lifecycle and configuration failures are returned as [`Error`]. Overruns,
//! underruns and sample loss never fail a call; they show up in
//! [`ChannelStats`].
//!
//! ## Thread Safety
//!
//! All controller methods take `&self`. Workers run on their own threads and
//! communicate with callers only through the channel buffers.

pub mod config;
pub mod device;
mod error;
pub mod samples;
pub mod stream;
pub mod transport;

pub use device::{RfFrontEnd, StreamDevice};
pub use error::{Error, Result, StreamEvent};
pub use samples::{
    block::SampleBlock,
    format::{DataFormat, HostSample},
    meta::SampleMeta,
};
pub use stream::{ChannelStats, Direction, StatusCallback, StreamController, StreamState};
pub use transport::Transport;
