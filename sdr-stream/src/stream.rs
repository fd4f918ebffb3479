// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Streaming data path for one RF module.
//!
//! A [`StreamController`] owns the lifecycle. While a stream is configured it
//! holds a session with one [`buffer::ChannelBuffer`] and one stats collector per
//! active channel. Once running, an RX worker moves packets from the transport
//! into the RX buffers and a TX worker moves batches from the TX buffers to the
//! transport. Callers only ever touch the buffers.

pub(crate) mod buffer;
mod controller;
mod rx;
mod scheduler;
mod session;
pub mod stats;
mod tx;

use serde::{Deserialize, Serialize};

pub use controller::StreamController;
pub use stats::{ChannelStats, StatusCallback};

/// Lifecycle state of a stream controller.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No stream configured.
    Idle,
    /// Buffers allocated, transport not armed.
    Configured,
    /// Workers are moving samples.
    Running,
    /// Stopped by the caller, the status callback or a transport failure.
    /// A new `setup` is required before streaming again.
    Stopped,
}

/// Direction of a channel's sample flow.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Hardware to host.
    Rx,
    /// Host to hardware.
    Tx,
}
