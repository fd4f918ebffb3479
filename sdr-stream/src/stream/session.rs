// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    Error, Result,
    config::StreamDescriptor,
    stream::{
        Direction,
        buffer::{ChannelBuffer, Wait},
        scheduler::TimestampScheduler,
        stats::{ChannelStats, StatsCollector, StatusCallback},
    },
    transport::Transport,
};

/// Buffer and statistics of one active channel.
pub(crate) struct ChannelPipe {
    pub channel: u8,
    pub buffer: ChannelBuffer,
    pub stats: StatsCollector,
}

impl ChannelPipe {
    fn new(channel: u8, capacity: usize, direction: Direction) -> Self {
        Self {
            channel,
            buffer: ChannelBuffer::new(capacity),
            stats: StatsCollector::new(direction),
        }
    }
}

/// Everything allocated by one `setup`, shared between the controller, the
/// workers and caller threads.
pub(crate) struct Session {
    pub id: Uuid,
    pub module: u8,
    pub descriptor: StreamDescriptor,
    pub transport: Arc<dyn Transport>,
    pub scheduler: TimestampScheduler,
    pub rx: Vec<ChannelPipe>,
    pub tx: Vec<ChannelPipe>,
    callback: Option<Arc<dyn StatusCallback>>,
    halted: AtomicBool,
    fatal: Mutex<Option<Error>>,
    tx_pending: Mutex<bool>,
    tx_wake: Condvar,
}

impl Session {
    pub fn new(
        module: u8,
        descriptor: StreamDescriptor,
        transport: Arc<dyn Transport>,
        callback: Option<Arc<dyn StatusCallback>>,
    ) -> Self {
        let capacity = descriptor.buffer_capacity();
        let rx = descriptor
            .rx_channels
            .iter()
            .map(|&channel| ChannelPipe::new(channel, capacity, Direction::Rx))
            .collect();
        let tx = descriptor
            .tx_channels
            .iter()
            .map(|&channel| ChannelPipe::new(channel, capacity, Direction::Tx))
            .collect();
        Self {
            id: Uuid::new_v4(),
            module,
            scheduler: TimestampScheduler::new(transport.clone(), &descriptor),
            descriptor,
            transport,
            rx,
            tx,
            callback,
            halted: AtomicBool::new(false),
            fatal: Mutex::new(None),
            tx_pending: Mutex::new(false),
            tx_wake: Condvar::new(),
        }
    }

    pub fn pipes(&self, direction: Direction) -> &[ChannelPipe] {
        match direction {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        }
    }

    pub fn pipe(&self, channel: u8, direction: Direction) -> Result<&ChannelPipe> {
        self.pipes(direction)
            .iter()
            .find(|pipe| pipe.channel == channel)
            .ok_or(Error::InvalidChannel(channel))
    }

    pub fn rx_index(&self, channel: u8) -> Option<usize> {
        self.rx.iter().position(|pipe| pipe.channel == channel)
    }

    /// Wait mode for a caller-side buffer operation starting now.
    pub fn wait_mode(&self) -> Wait {
        if self.descriptor.extras.use_poll {
            Wait::Poll
        } else {
            Wait::Until(Instant::now() + self.descriptor.wait_timeout())
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Stops all buffers and signals the workers to wind down.
    ///
    /// A `reason` is kept until [`Session::take_fatal`] hands it to a caller;
    /// only the first one is kept.
    pub fn halt(&self, reason: Option<Error>) {
        if let Some(reason) = reason {
            let mut fatal = self.fatal.lock();
            if fatal.is_none() && !self.is_halted() {
                error!(module = self.module, "Stream failed: {reason}");
                *fatal = Some(reason);
            }
        }
        if self.halted.swap(true, Ordering::AcqRel) {
            return;
        }
        for pipe in self.rx.iter().chain(&self.tx) {
            pipe.buffer.stop();
        }
        self.notify_tx();
    }

    pub fn take_fatal(&self) -> Option<Error> {
        self.fatal.lock().take()
    }

    pub fn notify_tx(&self) {
        *self.tx_pending.lock() = true;
        self.tx_wake.notify_one();
    }

    /// Blocks the TX worker until new data is queued or `timeout` passes.
    pub fn wait_tx(&self, timeout: Duration) {
        let mut pending = self.tx_pending.lock();
        if !*pending {
            self.tx_wake.wait_for(&mut pending, timeout);
        }
        *pending = false;
    }

    pub fn snapshot(&self, pipe: &ChannelPipe) -> ChannelStats {
        pipe.stats
            .snapshot(self.scheduler.observed(), pipe.buffer.fill())
    }

    /// Hands a fresh snapshot to the status callback, halting the stream if
    /// it asks to stop.
    pub fn report(&self, pipe: &ChannelPipe) {
        let Some(callback) = &self.callback else {
            return;
        };
        let stats = self.snapshot(pipe);
        if !callback.on_status(&stats) {
            info!(
                module = self.module,
                channel = pipe.channel,
                "Status callback requested stop"
            );
            self.halt(None);
        }
    }
}
