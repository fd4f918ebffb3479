// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicI64, Ordering},
};

use tracing::{debug, trace};

use crate::{Error, Result, SampleBlock, config::StreamDescriptor, transport::Transport};

/// Tracks hardware time for one module and decides when timestamped samples
/// are due, late or outside the aligned start.
pub(crate) struct TimestampScheduler {
    transport: Arc<dyn Transport>,
    observed: AtomicI64,
    tolerance: i64,
    lead: i64,
    align_phase: bool,
    start_offset: i64,
    aligned_start: OnceLock<i64>,
}

impl TimestampScheduler {
    pub fn new(transport: Arc<dyn Transport>, descriptor: &StreamDescriptor) -> Self {
        Self {
            transport,
            observed: AtomicI64::new(i64::MIN),
            tolerance: descriptor.extras.late_tolerance as i64,
            lead: descriptor.tx_batch_samples() as i64,
            align_phase: descriptor.align_phase,
            start_offset: descriptor.rx_samples_in_packet() as i64,
            aligned_start: OnceLock::new(),
        }
    }

    /// Reads the hardware clock and fixes the common start tick when phase
    /// alignment was requested.
    pub fn arm(&self) -> Result<Option<i64>> {
        let now = self.transport.hardware_time()?;
        self.observe(now);
        if !self.align_phase {
            return Ok(None);
        }
        let start = *self.aligned_start.get_or_init(|| now.saturating_add(self.start_offset));
        debug!("Aligning stream start to tick {start}");
        Ok(Some(start))
    }

    /// Latest known hardware time.
    ///
    /// Falls back to the last observed value if the clock cannot be read; the
    /// workers surface the transport failure on their next I/O.
    pub fn now(&self) -> i64 {
        match self.transport.hardware_time() {
            Ok(now) => self.observe(now),
            Err(err) => {
                trace!("Hardware clock unavailable: {err}");
                self.observed()
            }
        }
    }

    /// Last observed hardware time without touching the transport.
    pub fn observed(&self) -> i64 {
        self.observed.load(Ordering::Acquire).max(0)
    }

    /// Moves the observed time forward to `ticks` and returns the new value.
    pub fn observe(&self, ticks: i64) -> i64 {
        let previous = self.observed.fetch_max(ticks, Ordering::AcqRel);
        previous.max(ticks)
    }

    pub fn tolerance(&self) -> i64 {
        self.tolerance
    }

    pub fn is_late(&self, timestamp: i64, now: i64) -> bool {
        timestamp.saturating_add(self.tolerance) < now
    }

    /// Rejects a transmit timestamp that the hardware clock has already passed.
    pub fn check_late(&self, timestamp: i64) -> Result<()> {
        let now = self.now();
        if self.is_late(timestamp, now) {
            return Err(Error::Late { timestamp, now });
        }
        Ok(())
    }

    /// Returns `true` once `timestamp` is within one TX batch of hardware time.
    pub fn is_due(&self, timestamp: i64, now: i64) -> bool {
        timestamp <= now.saturating_add(self.lead)
    }

    /// Trims samples before the aligned start tick from an RX block.
    ///
    /// Returns the number of samples removed.
    pub fn align(&self, block: &mut SampleBlock) -> usize {
        let Some(&start) = self.aligned_start.get() else {
            return 0;
        };
        if block.timestamp >= start {
            return 0;
        }
        let skip = ((start - block.timestamp) as usize).min(block.len());
        block.advance(skip);
        skip
    }
}
