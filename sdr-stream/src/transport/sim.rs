// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! In-process transport with a controllable sample clock.
//!
//! [`SimTransport`] stands in for a USB/PCIe link. RX packets are injected by
//! the test (or echoed from TX in loopback mode), TX submissions are recorded,
//! and the hardware clock is either advanced by hand or follows wall-clock time
//! at a fixed sample rate.

use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::{
    Error, Result,
    transport::{LinkConfig, RxPacket, Transport, TxPacket},
};

/// Source of the simulated hardware time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimClock {
    /// Time only moves through [`SimTransport::set_time`] and [`SimTransport::advance`].
    Manual,
    /// Time advances with the wall clock at `sample_rate` ticks per second.
    Realtime {
        /// Ticks per second.
        sample_rate: f64,
    },
}

struct SimState {
    clock: SimClock,
    base_time: i64,
    epoch: Instant,
    rx_queue: VecDeque<RxPacket>,
    submissions: Vec<Vec<TxPacket>>,
    link: Option<LinkConfig>,
    loopback: bool,
    loopback_cursor: HashMap<u8, i64>,
    failure: Option<String>,
    arm_count: usize,
}

impl SimState {
    fn now(&self) -> i64 {
        match self.clock {
            SimClock::Manual => self.base_time,
            SimClock::Realtime { sample_rate } => {
                self.base_time + (self.epoch.elapsed().as_secs_f64() * sample_rate) as i64
            }
        }
    }

    fn check_failure(&self) -> Result<()> {
        match &self.failure {
            Some(reason) => Err(Error::TransportFailure(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Simulated packet link for one RF module.
pub struct SimTransport {
    channel_count: u8,
    state: Mutex<SimState>,
    rx_ready: Condvar,
}

impl SimTransport {
    /// Creates a transport with `channel_count` channels and a manual clock at tick 0.
    pub fn new(channel_count: u8) -> Self {
        Self::with_clock(channel_count, SimClock::Manual)
    }

    /// Creates a transport whose clock follows wall-clock time.
    pub fn realtime(channel_count: u8, sample_rate: f64) -> Self {
        Self::with_clock(channel_count, SimClock::Realtime { sample_rate })
    }

    fn with_clock(channel_count: u8, clock: SimClock) -> Self {
        Self {
            channel_count,
            state: Mutex::new(SimState {
                clock,
                base_time: 0,
                epoch: Instant::now(),
                rx_queue: VecDeque::new(),
                submissions: Vec::new(),
                link: None,
                loopback: false,
                loopback_cursor: HashMap::new(),
                failure: None,
                arm_count: 0,
            }),
            rx_ready: Condvar::new(),
        }
    }

    /// Echoes every TX packet back as an RX packet on the same channel.
    pub fn with_loopback(self, loopback: bool) -> Self {
        self.state.lock().loopback = loopback;
        self
    }

    /// Sets the hardware time.
    pub fn set_time(&self, ticks: i64) {
        let mut state = self.state.lock();
        state.base_time = ticks;
        state.epoch = Instant::now();
    }

    /// Moves the hardware time forward.
    pub fn advance(&self, ticks: i64) {
        let mut state = self.state.lock();
        let now = state.now();
        state.base_time = now + ticks;
        state.epoch = Instant::now();
    }

    /// Queues a packet for the RX path.
    pub fn inject(&self, packet: RxPacket) {
        self.state.lock().rx_queue.push_back(packet);
        self.rx_ready.notify_all();
    }

    /// Returns a copy of every TX submission so far, one entry per `write` call.
    pub fn submissions(&self) -> Vec<Vec<TxPacket>> {
        self.state.lock().submissions.clone()
    }

    /// Removes and returns the recorded TX submissions.
    pub fn take_submissions(&self) -> Vec<Vec<TxPacket>> {
        std::mem::take(&mut self.state.lock().submissions)
    }

    /// Makes every further transport call fail.
    pub fn fail(&self, reason: &str) {
        self.state.lock().failure = Some(reason.to_string());
        self.rx_ready.notify_all();
    }

    /// Returns `true` between `arm` and `disarm`.
    pub fn is_armed(&self) -> bool {
        self.state.lock().link.is_some()
    }

    /// Number of times the link has been armed.
    pub fn arm_count(&self) -> usize {
        self.state.lock().arm_count
    }

    /// Link parameters of the current arm, if any.
    pub fn link_config(&self) -> Option<LinkConfig> {
        self.state.lock().link.clone()
    }
}

impl Transport for SimTransport {
    fn channel_count(&self) -> u8 {
        self.channel_count
    }

    fn hardware_time(&self) -> Result<i64> {
        let state = self.state.lock();
        state.check_failure()?;
        Ok(state.now())
    }

    fn arm(&self, config: &LinkConfig) -> Result<()> {
        let mut state = self.state.lock();
        state.check_failure()?;
        debug!(
            "Arming simulated link: rx {:?}, tx {:?}, start {:?}",
            config.rx_channels, config.tx_channels, config.start_timestamp
        );
        state.link = Some(config.clone());
        state.loopback_cursor.clear();
        state.arm_count += 1;
        Ok(())
    }

    fn disarm(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.link = None;
        state.check_failure()
    }

    fn read(&self, timeout: Duration) -> Result<Option<RxPacket>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            state.check_failure()?;
            if let Some(packet) = state.rx_queue.pop_front() {
                return Ok(Some(packet));
            }
            if self.rx_ready.wait_until(&mut state, deadline).timed_out() {
                state.check_failure()?;
                return Ok(state.rx_queue.pop_front());
            }
        }
    }

    fn write(&self, packets: &[TxPacket]) -> Result<()> {
        let mut state = self.state.lock();
        state.check_failure()?;
        trace!("Simulated link accepted {} packet(s)", packets.len());
        state.submissions.push(packets.to_vec());
        if state.loopback
            && let Some(sample_size) = state.link.as_ref().map(|l| l.link_format.link_sample_size())
        {
            let now = state.now();
            for packet in packets {
                let cursor = state.loopback_cursor.get(&packet.channel).copied();
                let timestamp = packet
                    .timestamp
                    .unwrap_or_else(|| cursor.map_or(now, |c| c.max(now)));
                let samples = (packet.payload.len() / sample_size) as i64;
                state
                    .loopback_cursor
                    .insert(packet.channel, timestamp.saturating_add(samples));
                state.rx_queue.push_back(RxPacket {
                    channel: packet.channel,
                    timestamp,
                    payload: packet.payload.clone(),
                });
            }
            self.rx_ready.notify_all();
        }
        Ok(())
    }
}
