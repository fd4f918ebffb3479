// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Per-transfer metadata.

use serde::{Deserialize, Serialize};

/// Timestamp and submission control for a single receive or transmit call.
///
/// The default value is all-zero: no timestamp, no flush.
///
/// # Receive
///
/// - `use_timestamp` requests samples starting at `timestamp`; older samples are
///   discarded and newer ones make the call fail with [`crate::Error::Late`].
/// - On success `timestamp` is overwritten with the tick of the first returned sample.
///
/// # Transmit
///
/// - `use_timestamp` holds the samples until hardware time reaches `timestamp`.
/// - `flush` submits a partially filled batch immediately.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SampleMeta {
    /// Timestamp in hardware sample ticks.
    pub timestamp: i64,
    /// Whether `timestamp` is authoritative for this transfer.
    pub use_timestamp: bool,
    /// Submit to hardware without waiting for a full batch.
    pub flush: bool,
}

impl SampleMeta {
    /// Metadata for a transfer anchored at `timestamp`.
    pub fn at(timestamp: i64) -> Self {
        Self {
            timestamp,
            use_timestamp: true,
            flush: false,
        }
    }

    /// Returns a copy with the flush flag set.
    pub fn flushed(mut self) -> Self {
        self.flush = true;
        self
    }
}
