// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Stream and device configuration.
//!
//! All configuration types have explicit `Default` impls and `#[serde(default)]`,
//! so a JSON document only needs to name the fields it changes:
//!
//! ```
//! use sdr_stream::{DataFormat, config::StreamDescriptor};
//!
//! # fn main() -> Result<(), sdr_stream::Error> {
//! let descriptor = StreamDescriptor::from_json(
//!     r#"{ "rx_channels": [0, 1], "format": "F32", "align_phase": true }"#,
//! )?;
//! assert_eq!(descriptor.format, DataFormat::F32);
//! assert_eq!(descriptor.link_format, DataFormat::I16);
//! assert!(descriptor.extras.use_poll);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DataFormat, Error, Result};

/// Maximum number of channels per direction in one stream.
pub const MAX_CHANNEL_COUNT: usize = 16;

/// Maximum number of independent RF modules on one device.
pub const MAX_RFSOC_COUNT: usize = 16;

/// Per-channel buffer size in bytes when the descriptor leaves it at 0.
pub const DEFAULT_BUFFER_SIZE: u32 = 1 << 20;

/// Link samples per packet for 16-bit and float links.
pub const DEFAULT_SAMPLES_IN_PACKET: u16 = 1020;

/// Link samples per packet for packed 12-bit links.
pub const DEFAULT_SAMPLES_IN_PACKET_I12: u16 = 1360;

/// Packets per batch when the hints are left at 0.
pub const DEFAULT_PACKETS_IN_BATCH: u32 = 4;

/// Upper bound for a blocking receive or transmit.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Optional tuning for buffering and batching.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StreamExtras {
    /// Return immediately instead of waiting when no data or no space is available.
    pub use_poll: bool,
    /// Samples per RX packet, 0 = derived from the link format.
    pub rx_samples_in_packet: u16,
    /// RX packets per batch, 0 = default.
    pub rx_packets_in_batch: u32,
    /// Maximum TX packets per batch, 0 = default.
    pub tx_max_packets_in_batch: u32,
    /// Samples per TX packet, 0 = derived from the link format.
    pub tx_samples_in_packet: u16,
    /// Ticks a timestamped transfer may lag hardware time before it is late.
    pub late_tolerance: u32,
    /// Bound for blocking waits in milliseconds, 0 = [`DEFAULT_WAIT_TIMEOUT`].
    pub wait_timeout_ms: u32,
}

impl Default for StreamExtras {
    fn default() -> Self {
        StreamExtras {
            use_poll: true,
            rx_samples_in_packet: 0,
            rx_packets_in_batch: 0,
            tx_max_packets_in_batch: 0,
            tx_samples_in_packet: 0,
            late_tolerance: 0,
            wait_timeout_ms: 0,
        }
    }
}

/// Channel selection, formats and buffering hints for one RF module.
///
/// Validated and frozen by [`crate::StreamController::setup`]; after that it is
/// only read.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StreamDescriptor {
    /// RX channel indices, in the order the caller addresses them.
    pub rx_channels: Vec<u8>,
    /// TX channel indices, in the order the caller addresses them.
    pub tx_channels: Vec<u8>,
    /// Sample format of host buffers passed to receive/transmit.
    pub format: DataFormat,
    /// Sample format on the transport link.
    pub link_format: DataFormat,
    /// Buffer size per channel in bytes, 0 = [`DEFAULT_BUFFER_SIZE`].
    pub buffer_size: u32,
    /// Expected sample rate in Hz, 0 = unspecified.
    pub hint_sample_rate: f32,
    /// Align the first sample of every channel to the same tick at start.
    pub align_phase: bool,
    /// Buffering and batching tuning.
    pub extras: StreamExtras,
}

impl Default for StreamDescriptor {
    fn default() -> Self {
        StreamDescriptor {
            rx_channels: Vec::new(),
            tx_channels: Vec::new(),
            format: DataFormat::I16,
            link_format: DataFormat::I16,
            buffer_size: 0,
            hint_sample_rate: 0.0,
            align_phase: false,
            extras: StreamExtras::default(),
        }
    }
}

impl StreamDescriptor {
    /// Parses a descriptor from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] on malformed JSON or unknown formats.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Checks the descriptor against a module with `channel_count` channels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if no channel is selected, a channel
    /// list is too long, holds duplicates or out-of-range indices, the rate hint
    /// is negative, or a batch does not fit in the channel buffer.
    pub fn validate(&self, channel_count: u8) -> Result<()> {
        if self.rx_channels.is_empty() && self.tx_channels.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one RX or TX channel is required.".to_string(),
            ));
        }
        validate_channels("RX", &self.rx_channels, channel_count)?;
        validate_channels("TX", &self.tx_channels, channel_count)?;
        if !self.hint_sample_rate.is_finite() || self.hint_sample_rate < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "Sample rate hint {} is invalid.",
                self.hint_sample_rate
            )));
        }
        let capacity = self.buffer_capacity();
        for (direction, channels, batch) in [
            ("RX", &self.rx_channels, self.rx_batch_samples()),
            ("TX", &self.tx_channels, self.tx_batch_samples()),
        ] {
            if !channels.is_empty() && batch > capacity {
                return Err(Error::InvalidConfig(format!(
                    "{direction} batch of {batch} samples exceeds buffer capacity of {capacity} samples."
                )));
            }
        }
        Ok(())
    }

    /// Capacity of each channel buffer in samples.
    pub fn buffer_capacity(&self) -> usize {
        let bytes = match self.buffer_size {
            0 => DEFAULT_BUFFER_SIZE,
            size => size,
        };
        (bytes as usize / self.link_format.link_sample_size()).max(1)
    }

    /// Samples per RX packet.
    pub fn rx_samples_in_packet(&self) -> usize {
        self.packet_size(self.extras.rx_samples_in_packet)
    }

    /// Samples per TX packet.
    pub fn tx_samples_in_packet(&self) -> usize {
        self.packet_size(self.extras.tx_samples_in_packet)
    }

    /// Samples the RX path expects per hardware batch.
    pub fn rx_batch_samples(&self) -> usize {
        self.rx_samples_in_packet() * or_default(self.extras.rx_packets_in_batch) as usize
    }

    /// Samples the TX path accumulates before submitting to the transport.
    pub fn tx_batch_samples(&self) -> usize {
        self.tx_samples_in_packet() * or_default(self.extras.tx_max_packets_in_batch) as usize
    }

    /// Bound for blocking waits.
    pub fn wait_timeout(&self) -> Duration {
        match self.extras.wait_timeout_ms {
            0 => DEFAULT_WAIT_TIMEOUT,
            ms => Duration::from_millis(ms as u64),
        }
    }

    fn packet_size(&self, hint: u16) -> usize {
        match (hint, self.link_format) {
            (0, DataFormat::I12) => DEFAULT_SAMPLES_IN_PACKET_I12 as usize,
            (0, _) => DEFAULT_SAMPLES_IN_PACKET as usize,
            (hint, _) => hint as usize,
        }
    }
}

fn or_default(packets: u32) -> u32 {
    match packets {
        0 => DEFAULT_PACKETS_IN_BATCH,
        packets => packets,
    }
}

fn validate_channels(direction: &str, channels: &[u8], channel_count: u8) -> Result<()> {
    if channels.len() > MAX_CHANNEL_COUNT {
        return Err(Error::InvalidConfig(format!(
            "{} {direction} channels requested, at most {MAX_CHANNEL_COUNT} supported.",
            channels.len()
        )));
    }
    for (position, channel) in channels.iter().enumerate() {
        if *channel >= channel_count {
            return Err(Error::InvalidConfig(format!(
                "{direction} channel {channel} out of range, module has {channel_count} channel(s)."
            )));
        }
        if channels[..position].contains(channel) {
            return Err(Error::InvalidConfig(format!(
                "{direction} channel {channel} listed more than once."
            )));
        }
    }
    Ok(())
}

/// Generic FIR filter stage setting.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct GfirFilter {
    /// Filter bandwidth in Hz.
    pub bandwidth: f64,
    /// Whether the stage is enabled.
    pub enabled: bool,
}

/// RF configuration for one channel, applied by the front end.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    /// RX local oscillator frequency in Hz.
    pub rx_center_frequency: f64,
    /// TX local oscillator frequency in Hz.
    pub tx_center_frequency: f64,
    /// RX numerically controlled oscillator offset in Hz.
    pub rx_nco_offset: f64,
    /// TX numerically controlled oscillator offset in Hz.
    pub tx_nco_offset: f64,
    /// RX sample rate in Hz.
    pub rx_sample_rate: f64,
    /// TX sample rate in Hz.
    pub tx_sample_rate: f64,
    /// RX gain in dB.
    pub rx_gain: f64,
    /// TX gain in dB.
    pub tx_gain: f64,
    /// Index into the module's RX path names.
    pub rx_path: u8,
    /// Index into the module's TX path names.
    pub tx_path: u8,
    /// RX analog low-pass bandwidth in Hz.
    pub rx_lpf: f64,
    /// TX analog low-pass bandwidth in Hz.
    pub tx_lpf: f64,
    /// RX decimation factor, 0 = chip default.
    pub rx_oversample: u8,
    /// TX interpolation factor, 0 = chip default.
    pub tx_oversample: u8,
    /// RX generic FIR stage.
    pub rx_gfir: GfirFilter,
    /// TX generic FIR stage.
    pub tx_gfir: GfirFilter,
    /// Powers up the RX chain.
    pub rx_enabled: bool,
    /// Powers up the TX chain.
    pub tx_enabled: bool,
    /// Runs RX calibration while configuring.
    pub rx_calibrate: bool,
    /// Runs TX calibration while configuring.
    pub tx_calibrate: bool,
    /// Replaces RX input with the internal test signal.
    pub rx_test_signal: bool,
    /// Replaces TX output with the internal test signal.
    pub tx_test_signal: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            rx_center_frequency: 0.0,
            tx_center_frequency: 0.0,
            rx_nco_offset: 0.0,
            tx_nco_offset: 0.0,
            rx_sample_rate: 0.0,
            tx_sample_rate: 0.0,
            rx_gain: 0.0,
            tx_gain: 0.0,
            rx_path: 0,
            tx_path: 0,
            rx_lpf: 0.0,
            tx_lpf: 0.0,
            rx_oversample: 0,
            tx_oversample: 0,
            rx_gfir: GfirFilter::default(),
            tx_gfir: GfirFilter::default(),
            rx_enabled: false,
            tx_enabled: false,
            rx_calibrate: false,
            tx_calibrate: false,
            rx_test_signal: false,
            tx_test_signal: false,
        }
    }
}

/// Whole-module RF configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SdrConfig {
    /// Reference clock in Hz, 0 = keep the board default.
    pub reference_clock_freq: f64,
    /// Per-channel settings, indexed by channel.
    pub channel: Vec<ChannelConfig>,
    /// Apply on top of the current configuration instead of resetting first.
    pub skip_defaults: bool,
}

impl Default for SdrConfig {
    fn default() -> Self {
        SdrConfig {
            reference_clock_freq: 0.0,
            channel: vec![ChannelConfig::default(); MAX_CHANNEL_COUNT],
            skip_defaults: false,
        }
    }
}

impl SdrConfig {
    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        if config.channel.len() > MAX_CHANNEL_COUNT {
            return Err(Error::InvalidConfig(format!(
                "{} channel configurations given, at most {MAX_CHANNEL_COUNT} supported.",
                config.channel.len()
            )));
        }
        Ok(config)
    }
}
