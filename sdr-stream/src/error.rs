// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for streaming and device operations.
//!
//! Lifecycle and configuration failures are returned synchronously from the call
//! that caused them. Per-packet conditions (overrun, underrun, loss) never surface
//! as errors; they are recorded as [`StreamEvent`]s in the channel statistics.

use crate::{DataFormat, stream::StreamState};

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when using the streaming API.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The stream descriptor or device configuration was rejected.
    ///
    /// Raised before any resources are allocated, so the controller state is
    /// left untouched.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `setup` was called while the module is `Configured` or `Running`.
    #[error("Stream already configured (state {0:?})")]
    AlreadyConfigured(StreamState),

    /// The operation requires a configured stream but the module is `Idle`.
    #[error("Stream not configured")]
    NotConfigured,

    /// The operation requires a running stream but the module is `Configured`.
    #[error("Stream not running")]
    NotRunning,

    /// The stream has been stopped, either by the caller, by the status
    /// callback or after a transport failure.
    #[error("Stream stopped")]
    Stopped,

    /// A timestamped transfer fell outside the scheduler's tolerance window.
    ///
    /// The samples are dropped and `late` is incremented; the stream keeps
    /// running.
    #[error("Late: timestamp {timestamp} is behind hardware time {now}")]
    Late {
        /// Timestamp requested by the caller.
        timestamp: i64,
        /// Hardware time when the request was evaluated.
        now: i64,
    },

    /// Polling receive: the requested timestamp has not been reached yet.
    #[error("Samples not yet available")]
    NotYetAvailable,

    /// A blocking wait expired before the request could be satisfied.
    #[error("Timeout")]
    Timeout,

    /// The underlying byte channel is unusable. Fatal for the stream.
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The RF module index does not exist on this device.
    #[error("Invalid module index {0}")]
    InvalidModule(u8),

    /// The channel is not part of the active stream for the requested direction.
    #[error("Channel {0} is not streaming in this direction")]
    InvalidChannel(u8),

    /// The caller's sample type does not match the configured host format.
    #[error("Host format is {configured:?}, sample type cannot represent it")]
    FormatMismatch {
        /// Host format from the stream descriptor.
        configured: DataFormat,
    },

    /// The device does not implement this optional operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The device implements the operation but it failed.
    #[error("Operation failed: {0}")]
    Failed(String),
}

impl Error {
    /// Returns `true` for per-transfer failures that leave the stream running.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Error::Late { .. } | Error::NotYetAvailable | Error::Timeout
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::InvalidConfig(value.to_string())
    }
}

/// Soft streaming conditions absorbed into statistics.
///
/// These never interrupt the stream; the stats collector counts them and the
/// worker that detected them logs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// The RX producer wrote into a full queue and dropped the oldest block.
    Overrun,
    /// The hardware clock passed the end of queued TX data.
    Underrun,
    /// A timestamp gap of the given number of samples was observed.
    Loss(u64),
    /// A timestamped submission or request was outside the tolerance window.
    Late,
}
