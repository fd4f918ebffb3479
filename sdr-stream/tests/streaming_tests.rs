// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Data path tests against the simulated transport.
//!
//! The transport clock is manual: tests move hardware time explicitly, inject
//! RX packets and inspect the TX submissions the worker produced.

mod common;

use std::time::{Duration, Instant};

use common::{TestRig, i16_payload, ramp, wait_for};
use num_complex::Complex;
use sdr_stream::{
    DataFormat, Direction, Error, SampleMeta,
    config::{StreamDescriptor, StreamExtras},
    transport::sim::SimTransport,
};

fn rx_descriptor(channels: &[u8]) -> StreamDescriptor {
    StreamDescriptor {
        rx_channels: channels.to_vec(),
        ..Default::default()
    }
}

fn tx_descriptor(channels: &[u8]) -> StreamDescriptor {
    StreamDescriptor {
        tx_channels: channels.to_vec(),
        ..Default::default()
    }
}

#[test]
fn rx_round_trip_same_format() {
    let rig = TestRig::new(1);
    rig.start(rx_descriptor(&[0]));
    let sent = ramp(100, 64);
    rig.inject(0, 5000, i16_payload(&sent));

    let mut received = vec![Complex::<i16>::default(); 64];
    let mut meta = SampleMeta::default();
    assert_eq!(rig.receive(0, &mut received, &mut meta), 64);
    assert_eq!(received, sent);
    assert_eq!(meta.timestamp, 5000);

    let stats = rig.device.stream_status(0, 0, Direction::Rx).unwrap();
    assert_eq!(stats.bytes_transferred, 64 * 4);
    assert_eq!(stats.packets, 1);
    assert!(!stats.is_tx);
    assert!(stats.timestamp >= 5064);
}

#[test]
fn rx_partial_reads_keep_timestamps_contiguous() {
    let rig = TestRig::new(1);
    rig.start(rx_descriptor(&[0]));
    rig.inject(0, 0, i16_payload(&ramp(0, 100)));

    let mut chunk = [Complex::<i16>::default(); 30];
    let mut meta = SampleMeta::default();
    let mut expected = 0;
    let mut total = 0;
    while total < 100 {
        let count = rig.receive(0, &mut chunk, &mut meta);
        assert!(count > 0);
        assert_eq!(meta.timestamp, expected);
        assert_eq!(chunk[0], Complex::new(expected as i16, -(expected as i16)));
        expected += count as i64;
        total += count;
    }
    assert_eq!(total, 100);
}

#[test]
fn rx_gap_counts_loss_and_never_reorders() {
    let rig = TestRig::new(1);
    rig.start(rx_descriptor(&[0]));
    rig.inject(0, 0, i16_payload(&ramp(0, 100)));
    rig.inject(0, 150, i16_payload(&ramp(0, 100)));
    rig.inject(0, 250, i16_payload(&ramp(0, 20)));
    wait_for(|| {
        let stats = rig.device.stream_status(0, 0, Direction::Rx).ok()?;
        (stats.packets == 3).then_some(())
    })
    .expect("Packets never reached the RX buffer");

    let mut samples = [Complex::<i16>::default(); 1000];
    let mut meta = SampleMeta::default();
    let mut timestamps = Vec::new();
    let mut total = 0;
    while total < 220 {
        let count = rig.receive(0, &mut samples, &mut meta);
        assert!(count > 0, "Samples missing after {total}");
        timestamps.push(meta.timestamp);
        total += count;
    }
    assert_eq!(timestamps, vec![0, 150]);
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));

    let stats = rig.device.stream_status(0, 0, Direction::Rx).unwrap();
    assert_eq!(stats.loss, 50);
}

#[test]
fn rx_overlap_is_trimmed() {
    let rig = TestRig::new(1);
    rig.start(rx_descriptor(&[0]));
    rig.inject(0, 0, i16_payload(&ramp(0, 100)));
    rig.inject(0, 80, i16_payload(&ramp(80, 40)));

    let mut samples = [Complex::<i16>::default(); 200];
    let mut meta = SampleMeta::default();
    let mut total = 0;
    while total < 120 {
        let count = rig.receive(0, &mut samples[total..], &mut meta);
        assert!(count > 0);
        total += count;
    }
    assert_eq!(&samples[..120], ramp(0, 120).as_slice());
    assert_eq!(
        rig.device.stream_status(0, 0, Direction::Rx).unwrap().loss,
        0
    );
}

#[test]
fn rx_float_host_from_integer_link() {
    let rig = TestRig::new(1);
    rig.start(StreamDescriptor {
        format: DataFormat::F32,
        ..rx_descriptor(&[0])
    });
    rig.inject(
        0,
        0,
        i16_payload(&[Complex::new(32767, -32767), Complex::new(0, 16384)]),
    );

    let mut samples = [Complex::<f32>::default(); 2];
    assert_eq!(rig.receive(0, &mut samples, &mut SampleMeta::default()), 2);
    assert_eq!(samples[0], Complex::new(1.0, -1.0));
    assert!((samples[1].im - 0.5).abs() < 1.0 / 32767.0);
}

#[test]
fn rx_overrun_only_when_full() {
    let rig = TestRig::new(1);
    rig.start(StreamDescriptor {
        buffer_size: 400,
        extras: StreamExtras {
            rx_samples_in_packet: 25,
            ..Default::default()
        },
        ..rx_descriptor(&[0])
    });
    let status = || rig.device.stream_status(0, 0, Direction::Rx).unwrap();

    rig.inject(0, 0, i16_payload(&ramp(0, 60)));
    let stats = wait_for(|| Some(status()).filter(|s| s.packets == 1)).unwrap();
    assert_eq!(stats.overrun, 0);
    assert!((stats.fifo_filled - 0.6).abs() < 1e-6);

    rig.inject(0, 60, i16_payload(&ramp(60, 40)));
    let stats = wait_for(|| Some(status()).filter(|s| s.packets == 2)).unwrap();
    assert_eq!(stats.overrun, 0);
    assert_eq!(stats.fifo_filled, 1.0);

    rig.inject(0, 100, i16_payload(&ramp(100, 30)));
    let stats = wait_for(|| Some(status()).filter(|s| s.packets == 3)).unwrap();
    assert_eq!(stats.overrun, 1);
    assert!((0.0..=1.0).contains(&stats.fifo_filled));

    let mut samples = [Complex::<i16>::default(); 100];
    let mut meta = SampleMeta::default();
    assert_eq!(rig.receive(0, &mut samples, &mut meta), 100);
    assert_eq!(meta.timestamp, 30);
    assert_eq!(status().fifo_filled, 0.0);
}

#[test]
fn rx_aligned_start_gives_equal_first_timestamps() {
    let rig = TestRig::new(2);
    rig.transport().set_time(1000);
    rig.start(StreamDescriptor {
        format: DataFormat::F32,
        link_format: DataFormat::I16,
        align_phase: true,
        extras: StreamExtras {
            rx_samples_in_packet: 64,
            ..Default::default()
        },
        ..rx_descriptor(&[0, 1])
    });
    assert_eq!(
        rig.transport().link_config().and_then(|c| c.start_timestamp),
        Some(1064)
    );

    rig.inject(0, 1000, i16_payload(&ramp(0, 256)));
    rig.inject(1, 1030, i16_payload(&ramp(0, 256)));

    let mut first = [Complex::<f32>::default(); 32];
    let mut meta0 = SampleMeta::default();
    let mut meta1 = SampleMeta::default();
    assert!(rig.receive(0, &mut first, &mut meta0) > 0);
    assert!(rig.receive(1, &mut first, &mut meta1) > 0);
    assert_eq!(meta0.timestamp, 1064);
    assert_eq!(meta0.timestamp, meta1.timestamp);
}

#[test]
fn rx_timestamped_request() {
    let rig = TestRig::new(1);
    rig.start(StreamDescriptor {
        extras: StreamExtras {
            late_tolerance: 10,
            ..Default::default()
        },
        ..rx_descriptor(&[0])
    });
    rig.inject(0, 0, i16_payload(&ramp(0, 100)));

    let mut samples = [Complex::<i16>::default(); 10];
    let mut meta = SampleMeta::at(40);
    assert_eq!(rig.receive(0, &mut samples, &mut meta), 10);
    assert_eq!(meta.timestamp, 40);
    assert_eq!(samples[0], Complex::new(40, -40));

    assert_eq!(
        rig.device.stream_rx(0, 0, &mut samples, &mut SampleMeta::at(500)),
        Err(Error::NotYetAvailable)
    );

    rig.inject(0, 600, i16_payload(&ramp(0, 10)));
    let late = wait_for(|| {
        match rig.device.stream_rx(0, 0, &mut samples, &mut SampleMeta::at(520)) {
            Err(Error::NotYetAvailable) => None,
            other => Some(other),
        }
    })
    .unwrap();
    assert_eq!(late, Err(Error::Late { timestamp: 520, now: 600 }));
    assert_eq!(
        rig.device.stream_status(0, 0, Direction::Rx).unwrap().late,
        1
    );
}

#[test]
fn rx_blocking_receive_times_out() {
    let rig = TestRig::new(1);
    rig.start(StreamDescriptor {
        extras: StreamExtras {
            use_poll: false,
            wait_timeout_ms: 50,
            ..Default::default()
        },
        ..rx_descriptor(&[0])
    });

    let mut samples = [Complex::<i16>::default(); 10];
    let begin = Instant::now();
    assert_eq!(
        rig.device
            .stream_rx(0, 0, &mut samples, &mut SampleMeta::default()),
        Err(Error::Timeout)
    );
    assert!(begin.elapsed() >= Duration::from_millis(50));
}

#[test]
fn stop_wakes_blocked_receive() {
    let rig = TestRig::new(1);
    rig.start(StreamDescriptor {
        extras: StreamExtras {
            use_poll: false,
            wait_timeout_ms: 10_000,
            ..Default::default()
        },
        ..rx_descriptor(&[0])
    });

    std::thread::scope(|scope| {
        let blocked = scope.spawn(|| {
            let mut samples = [Complex::<i16>::default(); 10];
            let begin = Instant::now();
            let result = rig
                .device
                .stream_rx(0, 0, &mut samples, &mut SampleMeta::default());
            (result, begin.elapsed())
        });
        std::thread::sleep(Duration::from_millis(50));
        rig.device.stream_stop(0).unwrap();

        let (result, elapsed) = blocked.join().unwrap();
        assert_eq!(result, Err(Error::Stopped));
        assert!(elapsed < Duration::from_secs(5));
    });

    let mut samples = [Complex::<i16>::default(); 10];
    assert_eq!(
        rig.device
            .stream_rx(0, 0, &mut samples, &mut SampleMeta::default()),
        Err(Error::Stopped)
    );
}

#[test]
fn tx_late_never_reaches_transport() {
    let rig = TestRig::new(1);
    rig.transport().set_time(10_000);
    rig.start(tx_descriptor(&[0]));

    let samples = ramp(0, 100);
    assert_eq!(
        rig.device
            .stream_tx(0, 0, &samples, &SampleMeta::at(5000).flushed()),
        Err(Error::Late {
            timestamp: 5000,
            now: 10_000
        })
    );
    std::thread::sleep(Duration::from_millis(30));
    rig.device.stream_stop(0).unwrap();

    assert!(rig.transport().submissions().is_empty());
    let stats = rig.device.stream_status(0, 0, Direction::Tx).unwrap();
    assert_eq!(stats.late, 1);
    assert!(stats.is_tx);
}

#[test]
fn tx_flush_submits_partial_batch_immediately() {
    let rig = TestRig::new(1);
    rig.start(tx_descriptor(&[0]));

    let samples = ramp(0, 100);
    assert_eq!(
        rig.device
            .stream_tx(0, 0, &samples, &SampleMeta::default().flushed()),
        Ok(100)
    );
    let submissions = wait_for(|| {
        let submissions = rig.transport().submissions();
        (!submissions.is_empty()).then_some(submissions)
    })
    .expect("Flushed samples never reached the transport");

    let packets = &submissions[0];
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].channel, 0);
    assert_eq!(packets[0].timestamp, None);
    assert!(packets[0].flush);
    assert_eq!(packets[0].payload, i16_payload(&samples));

    let stats = wait_for(|| {
        let stats = rig.device.stream_status(0, 0, Direction::Tx).ok()?;
        (stats.packets == 1).then_some(stats)
    })
    .unwrap();
    assert_eq!(stats.bytes_transferred, 400);
}

#[test]
fn tx_partial_batch_waits_until_stop_drains() {
    let rig = TestRig::new(1);
    rig.start(tx_descriptor(&[0]));

    let samples = ramp(0, 100);
    assert_eq!(
        rig.device
            .stream_tx(0, 0, &samples, &SampleMeta::default()),
        Ok(100)
    );
    std::thread::sleep(Duration::from_millis(50));
    assert!(rig.transport().submissions().is_empty());

    rig.device.stream_stop(0).unwrap();
    let submissions = rig.transport().submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0][0].payload.len(), 400);
}

#[test]
fn tx_short_timed_run_released_when_due() {
    let rig = TestRig::new(1);
    rig.start(tx_descriptor(&[0]));

    let samples = ramp(0, 100);
    assert_eq!(
        rig.device
            .stream_tx(0, 0, &samples, &SampleMeta::at(10_000)),
        Ok(100)
    );
    std::thread::sleep(Duration::from_millis(30));
    assert!(rig.transport().submissions().is_empty());

    rig.transport().set_time(10_000);
    let submissions = wait_for(|| {
        let submissions = rig.transport().submissions();
        (!submissions.is_empty()).then_some(submissions)
    })
    .expect("Timed samples held past their tick");
    let packets = &submissions[0];
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].timestamp, Some(10_000));
    assert!(!packets[0].flush);
    assert_eq!(packets[0].payload, i16_payload(&samples));

    rig.device.stream_stop(0).unwrap();
    assert_eq!(rig.transport().submissions().len(), 1);
    let stats = rig.device.stream_status(0, 0, Direction::Tx).unwrap();
    assert_eq!(stats.late, 0);
    assert_eq!(stats.packets, 1);
}

#[test]
fn tx_far_future_timestamp_is_held_not_late() {
    let rig = TestRig::new(1);
    rig.start(StreamDescriptor {
        extras: StreamExtras {
            late_tolerance: 10,
            ..Default::default()
        },
        ..tx_descriptor(&[0])
    });

    assert_eq!(
        rig.device
            .stream_tx(0, 0, &ramp(0, 10), &SampleMeta::at(i64::MAX)),
        Ok(10)
    );
    std::thread::sleep(Duration::from_millis(30));
    assert!(rig.transport().submissions().is_empty());

    rig.device.stream_stop(0).unwrap();
    let submissions = rig.transport().submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0][0].timestamp, Some(i64::MAX));
    let stats = rig.device.stream_status(0, 0, Direction::Tx).unwrap();
    assert_eq!(stats.late, 0);
    assert_eq!(stats.underrun, 0);
}

#[test]
fn tx_full_batch_is_split_into_packets() {
    let rig = TestRig::new(1);
    rig.start(StreamDescriptor {
        extras: StreamExtras {
            tx_samples_in_packet: 50,
            tx_max_packets_in_batch: 2,
            ..Default::default()
        },
        ..tx_descriptor(&[0])
    });

    rig.device
        .stream_tx(0, 0, &ramp(0, 100), &SampleMeta::at(20))
        .unwrap();
    let submissions = wait_for(|| {
        let submissions = rig.transport().submissions();
        (!submissions.is_empty()).then_some(submissions)
    })
    .unwrap();
    let timestamps: Vec<_> = submissions[0].iter().map(|p| p.timestamp).collect();
    assert_eq!(timestamps, vec![Some(20), Some(70)]);
    assert!(submissions[0].iter().all(|p| p.payload.len() == 200));
}

#[test]
fn tx_timed_batches_release_together() {
    let rig = TestRig::new(2);
    rig.start(tx_descriptor(&[0, 1]));

    let meta = SampleMeta::at(10_000).flushed();
    rig.device.stream_tx(0, 0, &ramp(0, 100), &meta).unwrap();
    rig.device.stream_tx(0, 1, &ramp(500, 100), &meta).unwrap();
    std::thread::sleep(Duration::from_millis(30));
    assert!(rig.transport().submissions().is_empty());

    rig.transport().set_time(9_000);
    let submissions = wait_for(|| {
        let submissions = rig.transport().submissions();
        (!submissions.is_empty()).then_some(submissions)
    })
    .expect("Timed samples never released");

    let mut channels: Vec<_> = submissions[0]
        .iter()
        .map(|p| (p.channel, p.timestamp))
        .collect();
    channels.sort();
    assert_eq!(channels, vec![(0, Some(10_000)), (1, Some(10_000))]);
}

#[test]
fn tx_underrun_when_hardware_passes_queued_data() {
    let rig = TestRig::new(1);
    rig.start(StreamDescriptor {
        extras: StreamExtras {
            tx_samples_in_packet: 10,
            tx_max_packets_in_batch: 1,
            ..Default::default()
        },
        ..tx_descriptor(&[0])
    });

    rig.device
        .stream_tx(0, 0, &ramp(0, 10), &SampleMeta::at(100))
        .unwrap();
    rig.transport().set_time(95);
    wait_for(|| (!rig.transport().submissions().is_empty()).then_some(()))
        .expect("Batch never submitted");
    assert_eq!(
        rig.device.stream_status(0, 0, Direction::Tx).unwrap().underrun,
        0
    );

    rig.transport().set_time(200);
    let stats = wait_for(|| {
        let stats = rig.device.stream_status(0, 0, Direction::Tx).ok()?;
        (stats.underrun > 0).then_some(stats)
    })
    .expect("Underrun not detected");
    assert_eq!(stats.underrun, 1);
}

#[test]
fn tx_poll_mode_reports_full_buffer() {
    let rig = TestRig::new(1);
    rig.start(StreamDescriptor {
        buffer_size: 400,
        extras: StreamExtras {
            tx_samples_in_packet: 50,
            tx_max_packets_in_batch: 2,
            ..Default::default()
        },
        ..tx_descriptor(&[0])
    });

    let late_start = SampleMeta::at(1_000_000);
    assert_eq!(
        rig.device.stream_tx(0, 0, &ramp(0, 60), &late_start),
        Ok(60)
    );
    let accepted = rig
        .device
        .stream_tx(0, 0, &ramp(60, 60), &SampleMeta::at(1_000_060))
        .unwrap();
    assert!(accepted <= 40);
}

#[test]
fn loopback_round_trip() {
    let rig = TestRig::with_transport(SimTransport::new(1).with_loopback(true));
    rig.start(StreamDescriptor {
        rx_channels: vec![0],
        tx_channels: vec![0],
        ..Default::default()
    });

    let sent = ramp(-50, 100);
    rig.device
        .stream_tx(0, 0, &sent, &SampleMeta::default().flushed())
        .unwrap();

    let mut received = vec![Complex::<i16>::default(); 100];
    let mut meta = SampleMeta::default();
    let mut total = 0;
    while total < 100 {
        let count = rig.receive(0, &mut received[total..], &mut meta);
        assert!(count > 0);
        total += count;
    }
    assert_eq!(received, sent);
}
