// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Sample formats and host ↔ link conversion.
//!
//! Every sample is a complex I/Q pair. On the link the pair is encoded as:
//!
//! | Format | Bytes | Layout                                          |
//! |--------|-------|-------------------------------------------------|
//! | `I16`  | 4     | I, Q as little-endian `i16`                     |
//! | `I12`  | 3     | I\[7:0\], Q\[3:0\]:I\[11:8\], Q\[11:4\]         |
//! | `F32`  | 8     | I, Q as little-endian `f32`                     |
//!
//! Integer formats are scaled to their own full scale (`32767` for `I16`,
//! `2047` for `I12`) when crossing into `F32`, and shifted by four bits when
//! crossing between each other. Float to integer conversion saturates.

use std::str::FromStr;

use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const I12_MIN: i16 = -2048;
const I12_MAX: i16 = 2047;

/// Sample encoding used by host buffers or by the transport link.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFormat {
    /// Signed 16-bit integer I/Q.
    #[default]
    I16,
    /// Signed 12-bit integer I/Q. Packed on the link, held in `i16` on the host.
    I12,
    /// 32-bit float I/Q, nominal range `[-1.0, 1.0]`.
    F32,
}

impl DataFormat {
    /// Number of bytes one I/Q pair occupies on the link.
    pub fn link_sample_size(self) -> usize {
        match self {
            DataFormat::I16 => 4,
            DataFormat::I12 => 3,
            DataFormat::F32 => 8,
        }
    }

    /// Value that maps to `1.0` when converting to or from `F32`.
    pub fn full_scale(self) -> f32 {
        match self {
            DataFormat::I16 => 32767.0,
            DataFormat::I12 => 2047.0,
            DataFormat::F32 => 1.0,
        }
    }
}

impl FromStr for DataFormat {
    type Err = Error;

    /// Parses `i16`, `i12` or `f32` (case-insensitive).
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "i16" => Ok(Self::I16),
            "i12" => Ok(Self::I12),
            "f32" => Ok(Self::F32),
            other => Err(Error::InvalidConfig(format!(
                "Unknown sample format \"{other}\", expected i16, i12 or f32."
            ))),
        }
    }
}

/// Host-side I/Q sample type.
///
/// Implemented for `Complex<i16>` (carrying `I16` or `I12`) and `Complex<f32>`
/// (carrying `F32`). The streaming calls are generic over this trait and reject
/// a sample type that cannot carry the configured host format.
pub trait HostSample: Copy + Default + Send + 'static {
    /// Returns `true` if a buffer of this type can hold samples in `format`.
    fn carries(format: DataFormat) -> bool;

    /// Appends `samples`, interpreted as `host` format, to `out` encoded as `link`.
    fn to_link(samples: &[Self], host: DataFormat, link: DataFormat, out: &mut Vec<u8>);

    /// Decodes link bytes into `out` using the `host` format's scale.
    ///
    /// Returns the number of samples written, bounded by both `out.len()` and
    /// the number of complete samples in `bytes`.
    fn from_link(bytes: &[u8], link: DataFormat, host: DataFormat, out: &mut [Self]) -> usize;
}

impl HostSample for Complex<i16> {
    fn carries(format: DataFormat) -> bool {
        matches!(format, DataFormat::I16 | DataFormat::I12)
    }

    fn to_link(samples: &[Self], host: DataFormat, link: DataFormat, out: &mut Vec<u8>) {
        out.reserve(samples.len() * link.link_sample_size());
        match link {
            DataFormat::I16 | DataFormat::I12 => {
                for s in samples {
                    write_int_pair(
                        out,
                        link,
                        rescale_int(s.re, host, link),
                        rescale_int(s.im, host, link),
                    );
                }
            }
            DataFormat::F32 => {
                let scale = host.full_scale();
                for s in samples {
                    write_f32(out, s.re as f32 / scale);
                    write_f32(out, s.im as f32 / scale);
                }
            }
        }
    }

    fn from_link(bytes: &[u8], link: DataFormat, host: DataFormat, out: &mut [Self]) -> usize {
        let chunks = bytes.chunks_exact(link.link_sample_size());
        let mut written = 0;
        for (chunk, dst) in chunks.zip(out.iter_mut()) {
            *dst = match link {
                DataFormat::I16 | DataFormat::I12 => {
                    let (i, q) = read_int_pair(chunk, link);
                    Complex::new(rescale_int(i, link, host), rescale_int(q, link, host))
                }
                DataFormat::F32 => {
                    let scale = host.full_scale();
                    Complex::new(
                        quantize(read_f32(&chunk[0..4]), scale),
                        quantize(read_f32(&chunk[4..8]), scale),
                    )
                }
            };
            written += 1;
        }
        written
    }
}

impl HostSample for Complex<f32> {
    fn carries(format: DataFormat) -> bool {
        format == DataFormat::F32
    }

    fn to_link(samples: &[Self], _host: DataFormat, link: DataFormat, out: &mut Vec<u8>) {
        out.reserve(samples.len() * link.link_sample_size());
        match link {
            DataFormat::I16 | DataFormat::I12 => {
                let scale = link.full_scale();
                for s in samples {
                    write_int_pair(out, link, quantize(s.re, scale), quantize(s.im, scale));
                }
            }
            DataFormat::F32 => {
                for s in samples {
                    write_f32(out, s.re);
                    write_f32(out, s.im);
                }
            }
        }
    }

    fn from_link(bytes: &[u8], link: DataFormat, _host: DataFormat, out: &mut [Self]) -> usize {
        let chunks = bytes.chunks_exact(link.link_sample_size());
        let mut written = 0;
        for (chunk, dst) in chunks.zip(out.iter_mut()) {
            *dst = match link {
                DataFormat::I16 | DataFormat::I12 => {
                    let scale = link.full_scale();
                    let (i, q) = read_int_pair(chunk, link);
                    Complex::new(i as f32 / scale, q as f32 / scale)
                }
                DataFormat::F32 => Complex::new(read_f32(&chunk[0..4]), read_f32(&chunk[4..8])),
            };
            written += 1;
        }
        written
    }
}

/// Moves an integer component between the `I16` and `I12` scales.
///
/// Same-format conversion is the identity, except that `I12` values are clamped
/// into the 12-bit range. `F32` never reaches this function.
fn rescale_int(value: i16, from: DataFormat, to: DataFormat) -> i16 {
    match (from, to) {
        (DataFormat::I16, DataFormat::I12) => value >> 4,
        (DataFormat::I12, DataFormat::I16) => clamp_i12(value) << 4,
        (_, DataFormat::I12) => clamp_i12(value),
        _ => value,
    }
}

fn clamp_i12(value: i16) -> i16 {
    value.clamp(I12_MIN, I12_MAX)
}

/// Scales a float to the integer range `[-scale - 1, scale]`, saturating.
fn quantize(value: f32, scale: f32) -> i16 {
    (value * scale).round().clamp(-scale - 1.0, scale) as i16
}

fn write_int_pair(out: &mut Vec<u8>, link: DataFormat, i: i16, q: i16) {
    if link == DataFormat::I12 {
        let i = (clamp_i12(i) as u16) & 0x0FFF;
        let q = (clamp_i12(q) as u16) & 0x0FFF;
        out.push((i & 0xFF) as u8);
        out.push(((i >> 8) as u8) | (((q & 0x0F) as u8) << 4));
        out.push((q >> 4) as u8);
    } else {
        out.extend_from_slice(&i.to_le_bytes());
        out.extend_from_slice(&q.to_le_bytes());
    }
}

fn read_int_pair(chunk: &[u8], link: DataFormat) -> (i16, i16) {
    if link == DataFormat::I12 {
        let i = (chunk[0] as u16) | (((chunk[1] & 0x0F) as u16) << 8);
        let q = ((chunk[1] >> 4) as u16) | ((chunk[2] as u16) << 4);
        (sign_extend_i12(i), sign_extend_i12(q))
    } else {
        (
            i16::from_le_bytes([chunk[0], chunk[1]]),
            i16::from_le_bytes([chunk[2], chunk[3]]),
        )
    }
}

fn sign_extend_i12(raw: u16) -> i16 {
    ((raw << 4) as i16) >> 4
}

fn write_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
