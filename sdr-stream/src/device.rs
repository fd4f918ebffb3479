// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Device facade: RF front end collaborators plus one stream controller per
//! RF module.
//!
//! An [`RfFrontEnd`] describes the hardware, applies RF configuration and hands
//! out one [`Transport`] per module. [`StreamDevice`] wraps a front end and routes
//! every streaming call to the controller of the addressed module.

pub mod sim;

use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Error, HostSample, Result, SampleMeta,
    config::{MAX_RFSOC_COUNT, SdrConfig, StreamDescriptor},
    stream::{ChannelStats, Direction, StatusCallback, StreamController},
    transport::Transport,
};

/// Static description of one RF system-on-chip.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct RfSocDescription {
    /// Chip name.
    pub name: String,
    /// Number of RX/TX channel pairs.
    pub channel_count: u8,
    /// Selectable RX antenna paths, by index.
    pub rx_path_names: Vec<String>,
    /// Selectable TX antenna paths, by index.
    pub tx_path_names: Vec<String>,
}

/// General information about the device and its static capabilities.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Descriptor {
    /// Displayable device name.
    pub name: String,
    /// Displayable name of the expansion card carrying the RF chips, if any.
    pub expansion_name: String,
    /// Firmware version string.
    pub firmware_version: String,
    /// Gateware version string.
    pub gateware_version: String,
    /// Gateware revision string.
    pub gateware_revision: String,
    /// Board the gateware was built for.
    pub gateware_target_board: String,
    /// Board revision.
    pub hardware_version: String,
    /// Version of the host protocol the device speaks.
    pub protocol_version: String,
    /// Unique board serial number.
    pub serial_number: u64,
    /// Names and SPI chip-select ids of the on-board chips.
    pub spi_slave_ids: HashMap<String, u32>,
    /// One entry per independently streamable RF module.
    pub rf_soc: Vec<RfSocDescription>,
}

/// Clocks that can be queried per module and channel.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockId {
    Reference,
    /// RX local oscillator.
    Sxr,
    /// TX local oscillator.
    Sxt,
    Cgen,
    /// RX signal processor clock, read-only.
    RxTsp,
    /// TX signal processor clock, read-only.
    TxTsp,
}

impl ClockId {
    /// Returns `true` for clocks derived from others that cannot be set.
    pub fn is_read_only(self) -> bool {
        matches!(self, ClockId::RxTsp | ClockId::TxTsp)
    }
}

/// A named on-board control value, such as a DAC trim or a temperature.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct CustomParameter {
    /// Board-specific parameter id.
    pub id: u8,
    /// Parameter value in `units`.
    pub value: f64,
    /// Unit of `value` (V, A, Ohm, C, ...), empty if dimensionless.
    pub units: String,
}

/// Hardware collaborator behind a [`StreamDevice`].
///
/// Required methods cover what every board supports. GPIO and custom parameter
/// access are optional and default to [`Error::Unsupported`].
pub trait RfFrontEnd: Send + Sync {
    /// Static capabilities of the board.
    fn descriptor(&self) -> &Descriptor;

    /// Brings the board into its power-on configuration.
    fn init(&self) -> Result<()>;

    /// Returns every chip to its reset state without reloading defaults.
    fn reset(&self) -> Result<()>;

    /// Applies RF settings to one module.
    fn configure(&self, module: u8, config: &SdrConfig) -> Result<()>;

    /// Current frequency of `clock` in Hz. `channel` is ignored for clocks
    /// shared by the module.
    fn clock_frequency(&self, module: u8, clock: ClockId, channel: u8) -> Result<f64>;

    /// Retunes `clock` to `frequency` Hz.
    fn set_clock_frequency(
        &self,
        module: u8,
        clock: ClockId,
        frequency: f64,
        channel: u8,
    ) -> Result<()>;

    /// Syncs the register cache with the chips, writing to them if `to_chip`.
    fn synchronize(&self, to_chip: bool) -> Result<()>;

    /// Enables or disables the register cache.
    fn enable_cache(&self, enable: bool);

    /// Packet link used to stream samples for `module`.
    fn transport(&self, module: u8) -> Result<Arc<dyn Transport>>;

    /// Writes GPIO levels, LSB first.
    fn gpio_write(&self, _values: &[u8]) -> Result<()> {
        Err(Error::Unsupported("gpio_write"))
    }

    /// Reads GPIO levels into `buffer`, LSB first.
    fn gpio_read(&self, _buffer: &mut [u8]) -> Result<()> {
        Err(Error::Unsupported("gpio_read"))
    }

    /// Writes GPIO directions (0 input, 1 output), LSB first.
    fn gpio_dir_write(&self, _directions: &[u8]) -> Result<()> {
        Err(Error::Unsupported("gpio_dir_write"))
    }

    /// Reads GPIO directions into `buffer`, LSB first.
    fn gpio_dir_read(&self, _buffer: &mut [u8]) -> Result<()> {
        Err(Error::Unsupported("gpio_dir_read"))
    }

    /// Writes board-specific parameters.
    fn custom_parameter_write(&self, _parameters: &[CustomParameter]) -> Result<()> {
        Err(Error::Unsupported("custom_parameter_write"))
    }

    /// Reads the board-specific parameters listed in `ids`.
    fn custom_parameter_read(&self, _ids: &[u8]) -> Result<Vec<CustomParameter>> {
        Err(Error::Unsupported("custom_parameter_read"))
    }
}

/// A front end together with one [`StreamController`] per RF module.
pub struct StreamDevice {
    front_end: Arc<dyn RfFrontEnd>,
    modules: Vec<StreamController>,
}

impl StreamDevice {
    /// Builds a controller for every RF module the front end describes.
    pub fn new(front_end: Arc<dyn RfFrontEnd>) -> Result<Self> {
        let count = front_end.descriptor().rf_soc.len();
        if count > MAX_RFSOC_COUNT {
            return Err(Error::InvalidConfig(format!(
                "Device reports {count} RF modules, at most {MAX_RFSOC_COUNT} supported."
            )));
        }
        let modules = (0..count as u8)
            .map(|module| -> Result<StreamController> {
                Ok(StreamController::new(module, front_end.transport(module)?))
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            "Opened device \"{}\" with {} RF module(s)",
            front_end.descriptor().name,
            modules.len()
        );
        Ok(Self { front_end, modules })
    }

    /// Static capabilities of the underlying board.
    pub fn descriptor(&self) -> &Descriptor {
        self.front_end.descriptor()
    }

    /// Number of RF modules, each with its own stream controller.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Stream controller of `module`.
    pub fn module(&self, module: u8) -> Result<&StreamController> {
        self.modules
            .get(module as usize)
            .ok_or(Error::InvalidModule(module))
    }

    /// See [`RfFrontEnd::init`].
    pub fn init(&self) -> Result<()> {
        self.front_end.init()
    }

    /// See [`RfFrontEnd::reset`].
    pub fn reset(&self) -> Result<()> {
        self.front_end.reset()
    }

    /// Applies RF settings to `module`.
    pub fn configure(&self, module: u8, config: &SdrConfig) -> Result<()> {
        self.module(module)?;
        debug!(module, "Applying RF configuration");
        self.front_end.configure(module, config)
    }

    /// Current frequency of `clock` on `module` in Hz.
    pub fn clock_frequency(&self, module: u8, clock: ClockId, channel: u8) -> Result<f64> {
        self.module(module)?;
        self.front_end.clock_frequency(module, clock, channel)
    }

    /// Retunes `clock` on `module`. Read-only clocks are rejected with
    /// [`Error::InvalidConfig`].
    pub fn set_clock_frequency(
        &self,
        module: u8,
        clock: ClockId,
        frequency: f64,
        channel: u8,
    ) -> Result<()> {
        self.module(module)?;
        if clock.is_read_only() {
            return Err(Error::InvalidConfig(format!("Clock {clock:?} is read-only.")));
        }
        self.front_end
            .set_clock_frequency(module, clock, frequency, channel)
    }

    /// See [`RfFrontEnd::synchronize`].
    pub fn synchronize(&self, to_chip: bool) -> Result<()> {
        self.front_end.synchronize(to_chip)
    }

    /// See [`RfFrontEnd::enable_cache`].
    pub fn enable_cache(&self, enable: bool) {
        self.front_end.enable_cache(enable)
    }

    /// Writes GPIO levels. [`Error::Unsupported`] if the board has no GPIO.
    pub fn gpio_write(&self, values: &[u8]) -> Result<()> {
        self.front_end.gpio_write(values)
    }

    /// Reads GPIO levels. [`Error::Unsupported`] if the board has no GPIO.
    pub fn gpio_read(&self, buffer: &mut [u8]) -> Result<()> {
        self.front_end.gpio_read(buffer)
    }

    /// Writes GPIO directions.
    pub fn gpio_dir_write(&self, directions: &[u8]) -> Result<()> {
        self.front_end.gpio_dir_write(directions)
    }

    /// Reads GPIO directions.
    pub fn gpio_dir_read(&self, buffer: &mut [u8]) -> Result<()> {
        self.front_end.gpio_dir_read(buffer)
    }

    /// Writes board-specific parameters.
    pub fn custom_parameter_write(&self, parameters: &[CustomParameter]) -> Result<()> {
        self.front_end.custom_parameter_write(parameters)
    }

    /// Reads board-specific parameters by id.
    pub fn custom_parameter_read(&self, ids: &[u8]) -> Result<Vec<CustomParameter>> {
        self.front_end.custom_parameter_read(ids)
    }

    /// Configures streaming on `module`. See [`StreamController::setup`].
    pub fn stream_setup(
        &self,
        module: u8,
        descriptor: StreamDescriptor,
        status_callback: Option<Arc<dyn StatusCallback>>,
    ) -> Result<()> {
        self.module(module)?.setup(descriptor, status_callback)
    }

    /// Starts streaming on `module`. See [`StreamController::start`].
    pub fn stream_start(&self, module: u8) -> Result<()> {
        self.module(module)?.start()
    }

    /// Stops streaming on `module`. See [`StreamController::stop`].
    pub fn stream_stop(&self, module: u8) -> Result<()> {
        self.module(module)?.stop()
    }

    /// Receives samples from `channel` of `module`. See
    /// [`StreamController::receive`].
    pub fn stream_rx<S: HostSample>(
        &self,
        module: u8,
        channel: u8,
        destination: &mut [S],
        meta: &mut SampleMeta,
    ) -> Result<usize> {
        self.module(module)?.receive(channel, destination, meta)
    }

    /// Queues samples for `channel` of `module`. See
    /// [`StreamController::transmit`].
    pub fn stream_tx<S: HostSample>(
        &self,
        module: u8,
        channel: u8,
        source: &[S],
        meta: &SampleMeta,
    ) -> Result<usize> {
        self.module(module)?.transmit(channel, source, meta)
    }

    /// Statistics of one channel of `module` in `direction`.
    pub fn stream_status(
        &self,
        module: u8,
        channel: u8,
        direction: Direction,
    ) -> Result<ChannelStats> {
        self.module(module)?.status(channel, direction)
    }
}
