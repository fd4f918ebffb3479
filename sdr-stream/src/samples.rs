// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! I/Q sample representation on both sides of the link.
//!
//! Host code works with [`num_complex::Complex`] samples, while the transport
//! carries packed little-endian link-format bytes. This module owns the
//! conversion between the two and the block type that sits in channel queues.
//!
//! # Key Types
//!
//! - [`DataFormat`]: Sample encodings shared by host and link
//! - [`HostSample`]: Host sample types and their link codecs
//! - [`SampleMeta`]: Per-transfer timestamp and flush control
//! - [`SampleBlock`]: Timestamped run of link-format samples

pub mod block;
pub mod format;
pub mod meta;
