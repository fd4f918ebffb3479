// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Byte-oriented link between the streaming engine and the hardware.
//!
//! The engine treats the transport as an opaque, bounded-latency packet channel:
//! it reads timestamped RX packets, writes (optionally timestamped) TX packets and
//! queries the hardware sample clock. One transport instance serves one RF module.
//!
//! [`sim::SimTransport`] is an in-process implementation used by tests and the
//! demo CLI.

pub mod sim;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DataFormat, Result};

/// A packet of link-format samples received from the hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct RxPacket {
    /// Channel the samples belong to.
    pub channel: u8,
    /// Tick of the first sample.
    pub timestamp: i64,
    /// Link-format sample bytes.
    pub payload: Vec<u8>,
}

/// A packet of link-format samples handed to the hardware.
#[derive(Debug, Clone, PartialEq)]
pub struct TxPacket {
    /// Destination channel.
    pub channel: u8,
    /// Tick at which the hardware should emit the first sample, if gated.
    pub timestamp: Option<i64>,
    /// End of burst: the hardware should not expect continuation.
    pub flush: bool,
    /// Link-format sample bytes.
    pub payload: Vec<u8>,
}

/// Link parameters passed to the hardware when streaming starts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Sample encoding on the link.
    pub link_format: DataFormat,
    /// Channels the hardware should produce.
    pub rx_channels: Vec<u8>,
    /// Channels the hardware should consume.
    pub tx_channels: Vec<u8>,
    /// Samples per RX packet.
    pub rx_samples_in_packet: usize,
    /// First tick to produce when phase alignment was requested.
    pub start_timestamp: Option<i64>,
}

/// Packet channel to one RF module.
///
/// Implementations must be callable from several threads at once: the RX worker
/// reads, the TX worker writes and callers query the clock concurrently.
pub trait Transport: Send + Sync {
    /// Number of channels the module exposes.
    fn channel_count(&self) -> u8;

    /// Current hardware time in sample ticks.
    fn hardware_time(&self) -> Result<i64>;

    /// Starts hardware-side streaming.
    fn arm(&self, config: &LinkConfig) -> Result<()>;

    /// Stops hardware-side streaming. Packets already queued may still be read.
    fn disarm(&self) -> Result<()>;

    /// Waits up to `timeout` for the next RX packet.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn read(&self, timeout: Duration) -> Result<Option<RxPacket>>;

    /// Submits packets as one unit; all of them are handed to the hardware
    /// together or not at all.
    fn write(&self, packets: &[TxPacket]) -> Result<()>;
}
