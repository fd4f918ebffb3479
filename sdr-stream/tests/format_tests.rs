// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Sample conversion and configuration parsing tests.
//!
//! These run without a stream: they exercise the host ↔ link codecs through
//! [`HostSample`] and the validation of [`StreamDescriptor`] and [`SdrConfig`].

use num_complex::Complex;
use sdr_stream::{
    DataFormat, Error, HostSample,
    config::{SdrConfig, StreamDescriptor},
};

fn round_trip<S: HostSample>(samples: &[S], host: DataFormat, link: DataFormat) -> Vec<S> {
    let mut bytes = Vec::new();
    S::to_link(samples, host, link, &mut bytes);
    assert_eq!(bytes.len(), samples.len() * link.link_sample_size());
    let mut decoded = vec![S::default(); samples.len()];
    assert_eq!(S::from_link(&bytes, link, host, &mut decoded), samples.len());
    decoded
}

#[test]
fn same_format_integer_paths_are_exact() {
    let samples = [
        Complex::new(0i16, 0i16),
        Complex::new(i16::MAX, i16::MIN),
        Complex::new(-1234, 4321),
    ];
    assert_eq!(round_trip(&samples, DataFormat::I16, DataFormat::I16), samples);

    let twelve_bit = [Complex::new(2047i16, -2048i16), Complex::new(-1, 1), Complex::new(0x123, -0x456)];
    assert_eq!(round_trip(&twelve_bit, DataFormat::I12, DataFormat::I12), twelve_bit);
}

#[test]
fn float_paths_are_exact() {
    let samples = [
        Complex::new(0.0f32, -0.0f32),
        Complex::new(0.123_456_79, -0.987_654_3),
        Complex::new(1.5, -3.25),
    ];
    assert_eq!(round_trip(&samples, DataFormat::F32, DataFormat::F32), samples);
}

#[test]
fn narrowing_integer_path_stays_within_one_step() {
    let samples: Vec<Complex<i16>> = [-32768i16, -1000, -17, 0, 15, 1000, 32767]
        .iter()
        .map(|&v| Complex::new(v, v / 2))
        .collect();
    let decoded = round_trip(&samples, DataFormat::I16, DataFormat::I12);
    for (original, decoded) in samples.iter().zip(&decoded) {
        assert!((original.re as i32 - decoded.re as i32).abs() < 16, "{original} vs {decoded}");
        assert!((original.im as i32 - decoded.im as i32).abs() < 16, "{original} vs {decoded}");
    }
}

#[test]
fn float_through_integer_link_stays_within_one_step() {
    let samples = [Complex::new(0.5f32, -0.5f32), Complex::new(0.999, -0.001)];
    for link in [DataFormat::I16, DataFormat::I12] {
        let step = 1.0 / link.full_scale();
        let decoded = round_trip(&samples, DataFormat::F32, link);
        for (original, decoded) in samples.iter().zip(&decoded) {
            assert!((original.re - decoded.re).abs() <= step, "{link:?}: {original} vs {decoded}");
            assert!((original.im - decoded.im).abs() <= step, "{link:?}: {original} vs {decoded}");
        }
    }
}

#[test]
fn float_to_integer_saturates() {
    let mut bytes = Vec::new();
    Complex::<f32>::to_link(
        &[Complex::new(2.0, -2.0)],
        DataFormat::F32,
        DataFormat::I16,
        &mut bytes,
    );
    assert_eq!(bytes, [0xFF, 0x7F, 0x00, 0x80]);

    let mut decoded = [Complex::<i16>::default(); 1];
    let mut float_bytes = Vec::new();
    float_bytes.extend_from_slice(&4.0f32.to_le_bytes());
    float_bytes.extend_from_slice(&(-4.0f32).to_le_bytes());
    Complex::<i16>::from_link(&float_bytes, DataFormat::F32, DataFormat::I12, &mut decoded);
    assert_eq!(decoded[0], Complex::new(2047, -2048));
}

#[test]
fn twelve_bit_packing_layout() {
    let mut bytes = Vec::new();
    Complex::<i16>::to_link(
        &[Complex::new(0x123, -1)],
        DataFormat::I12,
        DataFormat::I12,
        &mut bytes,
    );
    assert_eq!(bytes, [0x23, 0xF1, 0xFF]);

    let mut decoded = [Complex::<i16>::default(); 1];
    Complex::<i16>::from_link(&[0x00, 0x08, 0x80], DataFormat::I12, DataFormat::I12, &mut decoded);
    assert_eq!(decoded[0], Complex::new(-2048, -2048));
}

#[test]
fn decode_is_bounded_by_destination_and_whole_samples() {
    let mut decoded = [Complex::<i16>::default(); 2];
    let bytes = [1u8, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0, 7];
    assert_eq!(
        Complex::<i16>::from_link(&bytes, DataFormat::I16, DataFormat::I16, &mut decoded),
        2
    );
    assert_eq!(decoded, [Complex::new(1, 2), Complex::new(3, 4)]);

    let mut wide = [Complex::<i16>::default(); 8];
    assert_eq!(
        Complex::<i16>::from_link(&bytes, DataFormat::I16, DataFormat::I16, &mut wide),
        3
    );
}

#[test]
fn host_types_carry_matching_formats() {
    assert!(Complex::<i16>::carries(DataFormat::I16));
    assert!(Complex::<i16>::carries(DataFormat::I12));
    assert!(!Complex::<i16>::carries(DataFormat::F32));
    assert!(Complex::<f32>::carries(DataFormat::F32));
    assert!(!Complex::<f32>::carries(DataFormat::I16));
}

#[test]
fn data_format_parsing() {
    assert_eq!("i12".parse::<DataFormat>(), Ok(DataFormat::I12));
    assert_eq!("F32".parse::<DataFormat>(), Ok(DataFormat::F32));
    assert!(matches!("i24".parse::<DataFormat>(), Err(Error::InvalidConfig(_))));
}

#[test]
fn descriptor_json_defaults() {
    let descriptor = StreamDescriptor::from_json(r#"{ "tx_channels": [1] }"#).unwrap();
    assert_eq!(descriptor.tx_channels, vec![1]);
    assert!(descriptor.rx_channels.is_empty());
    assert!(descriptor.extras.use_poll);
    assert_eq!(descriptor.rx_samples_in_packet(), 1020);
    assert_eq!(descriptor.buffer_capacity(), (1 << 20) / 4);

    let packed = StreamDescriptor::from_json(r#"{ "rx_channels": [0], "link_format": "I12" }"#)
        .unwrap();
    assert_eq!(packed.rx_samples_in_packet(), 1360);

    assert!(matches!(
        StreamDescriptor::from_json(r#"{ "rx_channels": [0], "format": "I24" }"#),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn descriptor_validation_rejects_bad_channel_sets() {
    let invalid = |descriptor: StreamDescriptor| {
        matches!(descriptor.validate(32), Err(Error::InvalidConfig(_)))
    };

    assert!(invalid(StreamDescriptor::default()));
    assert!(invalid(StreamDescriptor {
        rx_channels: vec![0, 1, 0],
        ..Default::default()
    }));
    assert!(invalid(StreamDescriptor {
        tx_channels: vec![32],
        ..Default::default()
    }));
    assert!(invalid(StreamDescriptor {
        rx_channels: (0..17).collect(),
        ..Default::default()
    }));
    assert!(invalid(StreamDescriptor {
        rx_channels: vec![0],
        hint_sample_rate: -1.0,
        ..Default::default()
    }));
    assert!(invalid(StreamDescriptor {
        rx_channels: vec![0],
        buffer_size: 100,
        ..Default::default()
    }));

    let valid = StreamDescriptor {
        rx_channels: vec![3, 1],
        tx_channels: vec![1],
        ..Default::default()
    };
    assert_eq!(valid.validate(4), Ok(()));
}

#[test]
fn sdr_config_json() {
    let config = SdrConfig::from_json(
        r#"{
            "reference_clock_freq": 30.72e6,
            "channel": [{ "rx_enabled": true, "rx_center_frequency": 1.0e9, "rx_gfir": { "enabled": true, "bandwidth": 5.0e6 } }]
        }"#,
    )
    .unwrap();
    assert_eq!(config.channel.len(), 1);
    assert!(config.channel[0].rx_enabled);
    assert!(config.channel[0].rx_gfir.enabled);
    assert!(!config.skip_defaults);

    assert_eq!(SdrConfig::default().channel.len(), 16);

    let too_many = format!(r#"{{ "channel": [{}] }}"#, vec!["{}"; 17].join(","));
    assert!(matches!(SdrConfig::from_json(&too_many), Err(Error::InvalidConfig(_))));
}
