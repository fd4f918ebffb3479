// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Per-channel streaming statistics.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{StreamEvent, stream::Direction};

/// Span over which throughput is averaged.
pub const THROUGHPUT_WINDOW: Duration = Duration::from_millis(500);

/// Snapshot of one channel's counters and gauges.
///
/// Counters only ever increase for the lifetime of a stream; they are reset by
/// the next `setup`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    /// Hardware time when the snapshot was taken.
    pub timestamp: i64,
    /// Link-format bytes moved between buffer and transport.
    pub bytes_transferred: i64,
    /// Transport packets moved.
    pub packets: i64,
    /// Buffer occupancy in `[0, 1]`.
    pub fifo_filled: f32,
    /// RX throughput in bytes per second.
    pub data_rate_bps: f32,
    /// TX throughput in bytes per second.
    pub tx_data_rate_bps: f32,
    /// Samples dropped because the RX buffer was full.
    pub overrun: u32,
    /// Times the TX hardware ran out of samples.
    pub underrun: u32,
    /// Samples missing from the timestamp sequence.
    pub loss: u32,
    /// Timestamped transfers rejected as late.
    pub late: u32,
    /// Direction of the channel.
    pub is_tx: bool,
}

/// Receiver for status snapshots.
///
/// Called on the worker thread of the reported direction after every batch it
/// moves. Returning `false` stops the stream. Implementations must not call
/// back into the stream controller.
pub trait StatusCallback: Send + Sync {
    /// Receives the latest snapshot; `false` stops the stream.
    fn on_status(&self, stats: &ChannelStats) -> bool;
}

impl<F> StatusCallback for F
where
    F: Fn(&ChannelStats) -> bool + Send + Sync,
{
    fn on_status(&self, stats: &ChannelStats) -> bool {
        self(stats)
    }
}

struct Inner {
    stats: ChannelStats,
    window: VecDeque<(Instant, usize)>,
    window_bytes: usize,
    first_transfer: Option<Instant>,
}

impl Inner {
    fn expire(&mut self, now: Instant) {
        while let Some(&(at, bytes)) = self.window.front() {
            if now.duration_since(at) <= THROUGHPUT_WINDOW {
                break;
            }
            self.window.pop_front();
            self.window_bytes -= bytes;
        }
        let rate = match self.first_transfer {
            Some(first) => {
                let span = now.duration_since(first).min(THROUGHPUT_WINDOW);
                if span.is_zero() {
                    0.0
                } else {
                    self.window_bytes as f32 / span.as_secs_f32()
                }
            }
            None => 0.0,
        };
        if self.stats.is_tx {
            self.stats.tx_data_rate_bps = rate;
        } else {
            self.stats.data_rate_bps = rate;
        }
    }
}

pub(crate) struct StatsCollector {
    inner: Mutex<Inner>,
}

impl StatsCollector {
    pub fn new(direction: Direction) -> Self {
        Self {
            inner: Mutex::new(Inner {
                stats: ChannelStats {
                    is_tx: direction == Direction::Tx,
                    ..Default::default()
                },
                window: VecDeque::new(),
                window_bytes: 0,
                first_transfer: None,
            }),
        }
    }

    pub fn record(&self, event: StreamEvent) {
        let mut inner = self.inner.lock();
        let stats = &mut inner.stats;
        match event {
            StreamEvent::Overrun => stats.overrun = stats.overrun.saturating_add(1),
            StreamEvent::Underrun => stats.underrun = stats.underrun.saturating_add(1),
            StreamEvent::Late => stats.late = stats.late.saturating_add(1),
            StreamEvent::Loss(samples) => {
                let samples = u32::try_from(samples).unwrap_or(u32::MAX);
                stats.loss = stats.loss.saturating_add(samples);
            }
        }
    }

    pub fn record_transfer(&self, bytes: usize, packets: usize) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.stats.bytes_transferred += bytes as i64;
        inner.stats.packets += packets as i64;
        inner.first_transfer.get_or_insert(now);
        inner.window.push_back((now, bytes));
        inner.window_bytes += bytes;
        inner.expire(now);
    }

    pub fn record_fill(&self, fill: f32) {
        self.inner.lock().stats.fifo_filled = fill.clamp(0.0, 1.0);
    }

    pub fn snapshot(&self, hardware_time: i64, fill: f32) -> ChannelStats {
        let mut inner = self.inner.lock();
        inner.expire(Instant::now());
        inner.stats.timestamp = hardware_time;
        inner.stats.fifo_filled = fill.clamp(0.0, 1.0);
        inner.stats
    }
}
