// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Owned, timestamped runs of link-format samples.

/// A contiguous run of link-format samples starting at `timestamp`.
///
/// Blocks are the unit stored in channel queues. RX blocks always carry a
/// timestamp from the hardware; TX blocks carry one only when the caller asked
/// for timestamp-gated transmission (`timed`).
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    /// Tick of the first sample in the block.
    pub timestamp: i64,
    /// Whether `timestamp` gates transmission (TX only).
    pub timed: bool,
    /// Submit without waiting for a full batch (TX only).
    pub flush: bool,
    /// Link-format bytes, a whole number of samples.
    pub payload: Vec<u8>,
    sample_size: usize,
}

impl SampleBlock {
    /// Creates a block received from the hardware.
    ///
    /// Trailing bytes that do not form a complete sample are discarded.
    pub fn received(timestamp: i64, mut payload: Vec<u8>, sample_size: usize) -> Self {
        payload.truncate(payload.len() - payload.len() % sample_size);
        Self {
            timestamp,
            timed: true,
            flush: false,
            payload,
            sample_size,
        }
    }

    /// Creates a block queued by the host for transmission.
    pub fn outgoing(
        timestamp: Option<i64>,
        flush: bool,
        payload: Vec<u8>,
        sample_size: usize,
    ) -> Self {
        Self {
            timestamp: timestamp.unwrap_or_default(),
            timed: timestamp.is_some(),
            flush,
            payload,
            sample_size,
        }
    }

    /// Empty block that further samples can be appended to.
    pub(crate) fn empty_like(other: &SampleBlock) -> Self {
        Self {
            timestamp: other.timestamp,
            timed: other.timed,
            flush: false,
            payload: Vec::new(),
            sample_size: other.sample_size,
        }
    }

    /// Number of complete samples in the block.
    pub fn len(&self) -> usize {
        self.payload.len() / self.sample_size
    }

    /// Returns `true` if the block holds no samples.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes per sample in `payload`.
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Tick just past the last sample, saturating at `i64::MAX`.
    pub fn end_timestamp(&self) -> i64 {
        self.timestamp.saturating_add(self.len() as i64)
    }

    /// Returns `true` if `next` continues this block without a gap.
    ///
    /// Untimed blocks only continue untimed blocks; timed blocks must start at
    /// this block's end tick.
    pub(crate) fn is_continued_by(&self, next: &SampleBlock) -> bool {
        match (self.timed, next.timed) {
            (false, false) => true,
            (true, true) => next.timestamp == self.end_timestamp(),
            _ => false,
        }
    }

    /// Drops the first `count` samples and advances the timestamp accordingly.
    pub(crate) fn advance(&mut self, count: usize) {
        let count = count.min(self.len());
        self.payload.drain(..count * self.sample_size);
        self.timestamp = self.timestamp.saturating_add(count as i64);
    }

    /// Moves up to `count` leading samples of `source` onto the end of `self`.
    ///
    /// Returns the number of samples moved. The flush flag follows the last
    /// sample of `source`.
    pub(crate) fn take_from(&mut self, source: &mut SampleBlock, count: usize) -> usize {
        let count = count.min(source.len());
        if self.is_empty() {
            self.timestamp = source.timestamp;
            self.timed = source.timed;
        }
        self.payload
            .extend_from_slice(&source.payload[..count * self.sample_size]);
        source.advance(count);
        if source.is_empty() && source.flush {
            self.flush = true;
        }
        count
    }
}
