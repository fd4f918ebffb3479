// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Front end backed by [`SimTransport`]s, for tests and demos.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    Error, Result,
    config::SdrConfig,
    device::{ClockId, CustomParameter, Descriptor, RfFrontEnd, RfSocDescription},
    transport::{Transport, sim::SimTransport},
};

/// Reference clock reported until a configuration sets another one.
pub const DEFAULT_REFERENCE_CLOCK: f64 = 30.72e6;

/// Simulated board with one [`SimTransport`] per RF module.
///
/// RF configuration and clock settings are stored, not applied. Custom
/// parameters live in memory. GPIO is not available.
pub struct SimulatedFrontEnd {
    descriptor: Descriptor,
    transports: Vec<Arc<SimTransport>>,
    configs: Mutex<HashMap<u8, SdrConfig>>,
    clocks: Mutex<HashMap<(u8, ClockId, u8), f64>>,
    parameters: Mutex<HashMap<u8, CustomParameter>>,
    cache_enabled: AtomicBool,
}

impl SimulatedFrontEnd {
    /// Creates a board with `modules` RF modules of `channels` channels each,
    /// all driven by manual clocks.
    pub fn new(modules: usize, channels: u8) -> Self {
        Self::with_transports(
            (0..modules)
                .map(|_| Arc::new(SimTransport::new(channels)))
                .collect(),
        )
    }

    /// Creates a board around existing transports, one module each.
    pub fn with_transports(transports: Vec<Arc<SimTransport>>) -> Self {
        let rf_soc = transports
            .iter()
            .enumerate()
            .map(|(index, transport)| RfSocDescription {
                name: format!("SimSoC{index}"),
                channel_count: transport.channel_count(),
                rx_path_names: vec!["NONE".into(), "LNAH".into(), "LNAL".into(), "LNAW".into()],
                tx_path_names: vec!["NONE".into(), "BAND1".into(), "BAND2".into()],
            })
            .collect();
        let descriptor = Descriptor {
            name: "Simulated SDR".to_string(),
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            gateware_version: "sim".to_string(),
            hardware_version: "sim".to_string(),
            protocol_version: "1".to_string(),
            spi_slave_ids: HashMap::from([("FPGA".to_string(), 0), ("RFIC".to_string(), 1)]),
            rf_soc,
            ..Default::default()
        };
        Self {
            descriptor,
            transports,
            configs: Mutex::new(HashMap::new()),
            clocks: Mutex::new(HashMap::new()),
            parameters: Mutex::new(HashMap::new()),
            cache_enabled: AtomicBool::new(false),
        }
    }

    /// Simulated transport of `module`, for driving the clock and injecting packets.
    pub fn sim_transport(&self, module: u8) -> Option<&Arc<SimTransport>> {
        self.transports.get(module as usize)
    }

    /// Last configuration applied to `module`.
    pub fn applied_config(&self, module: u8) -> Option<SdrConfig> {
        self.configs.lock().get(&module).cloned()
    }

    /// Whether [`RfFrontEnd::enable_cache`] last enabled the cache.
    pub fn is_cache_enabled(&self) -> bool {
        self.cache_enabled.load(Ordering::Relaxed)
    }

    fn check_module(&self, module: u8) -> Result<()> {
        match self.transports.get(module as usize) {
            Some(_) => Ok(()),
            None => Err(Error::InvalidModule(module)),
        }
    }
}

impl RfFrontEnd for SimulatedFrontEnd {
    fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    fn init(&self) -> Result<()> {
        self.reset()
    }

    fn reset(&self) -> Result<()> {
        self.configs.lock().clear();
        self.clocks.lock().clear();
        Ok(())
    }

    fn configure(&self, module: u8, config: &SdrConfig) -> Result<()> {
        self.check_module(module)?;
        let channel_count = self.descriptor.rf_soc[module as usize].channel_count as usize;
        let active: Vec<_> = config
            .channel
            .iter()
            .enumerate()
            .filter(|(_, channel)| channel.rx_enabled || channel.tx_enabled)
            .collect();
        if let Some((index, _)) = active.iter().find(|(index, _)| *index >= channel_count) {
            return Err(Error::InvalidConfig(format!(
                "Channel {index} enabled, module {module} has {channel_count} channel(s)."
            )));
        }

        let mut clocks = self.clocks.lock();
        for (index, channel) in active {
            clocks.insert((module, ClockId::Sxr, index as u8), channel.rx_center_frequency);
            clocks.insert((module, ClockId::Sxt, index as u8), channel.tx_center_frequency);
        }
        if config.reference_clock_freq > 0.0 {
            clocks.insert((module, ClockId::Reference, 0), config.reference_clock_freq);
        }
        drop(clocks);
        debug!(module, "Stored RF configuration");
        self.configs.lock().insert(module, config.clone());
        Ok(())
    }

    fn clock_frequency(&self, module: u8, clock: ClockId, channel: u8) -> Result<f64> {
        self.check_module(module)?;
        let clocks = self.clocks.lock();
        let stored = |clock: ClockId, channel: u8| clocks.get(&(module, clock, channel)).copied();
        Ok(match clock {
            ClockId::Reference => stored(ClockId::Reference, 0).unwrap_or(DEFAULT_REFERENCE_CLOCK),
            ClockId::RxTsp | ClockId::TxTsp => stored(ClockId::Cgen, 0).unwrap_or(0.0) / 4.0,
            ClockId::Cgen => stored(ClockId::Cgen, 0).unwrap_or(0.0),
            other => stored(other, channel).unwrap_or(0.0),
        })
    }

    fn set_clock_frequency(
        &self,
        module: u8,
        clock: ClockId,
        frequency: f64,
        channel: u8,
    ) -> Result<()> {
        self.check_module(module)?;
        if clock.is_read_only() {
            return Err(Error::InvalidConfig(format!("Clock {clock:?} is read-only.")));
        }
        let channel = match clock {
            ClockId::Reference | ClockId::Cgen => 0,
            _ => channel,
        };
        self.clocks.lock().insert((module, clock, channel), frequency);
        Ok(())
    }

    fn synchronize(&self, _to_chip: bool) -> Result<()> {
        Ok(())
    }

    fn enable_cache(&self, enable: bool) {
        self.cache_enabled.store(enable, Ordering::Relaxed);
    }

    fn transport(&self, module: u8) -> Result<Arc<dyn Transport>> {
        match self.transports.get(module as usize) {
            Some(transport) => Ok(transport.clone()),
            None => Err(Error::InvalidModule(module)),
        }
    }

    fn custom_parameter_write(&self, parameters: &[CustomParameter]) -> Result<()> {
        let mut stored = self.parameters.lock();
        for parameter in parameters {
            stored.insert(parameter.id, parameter.clone());
        }
        Ok(())
    }

    fn custom_parameter_read(&self, ids: &[u8]) -> Result<Vec<CustomParameter>> {
        let stored = self.parameters.lock();
        ids.iter()
            .map(|id| {
                stored
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::Failed(format!("Custom parameter {id} was never written.")))
            })
            .collect()
    }
}
