// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Transmit path: caller → TX buffers → transport.

use std::{sync::Arc, time::Duration};

use tracing::{debug, error, trace};

use crate::{
    Error, HostSample, Result, SampleBlock, SampleMeta, StreamEvent,
    stream::{Direction, session::Session},
    transport::TxPacket,
};

/// Idle wait of the TX worker between scheduling passes.
const TX_IDLE_WAIT: Duration = Duration::from_millis(5);

/// Caller side of [`crate::StreamController::transmit`].
pub(crate) fn transmit<S: HostSample>(
    session: &Session,
    channel: u8,
    source: &[S],
    meta: &SampleMeta,
) -> Result<usize> {
    let descriptor = &session.descriptor;
    if !S::carries(descriptor.format) {
        return Err(Error::FormatMismatch {
            configured: descriptor.format,
        });
    }
    let pipe = session.pipe(channel, Direction::Tx)?;

    if meta.use_timestamp
        && let Err(err) = session.scheduler.check_late(meta.timestamp)
    {
        pipe.stats.record(StreamEvent::Late);
        debug!(
            module = session.module,
            channel,
            timestamp = meta.timestamp,
            "Dropping late transmit"
        );
        return Err(err);
    }

    if source.is_empty() {
        if meta.flush && pipe.buffer.mark_flush() {
            session.notify_tx();
        }
        return Ok(0);
    }

    let mut payload = Vec::new();
    S::to_link(source, descriptor.format, descriptor.link_format, &mut payload);
    let block = SampleBlock::outgoing(
        meta.use_timestamp.then_some(meta.timestamp),
        meta.flush,
        payload,
        descriptor.link_format.link_sample_size(),
    );
    let accepted = pipe.buffer.push_wait(block, session.wait_mode())?;
    pipe.stats.record_fill(pipe.buffer.fill());
    session.notify_tx();
    Ok(accepted)
}

/// TX worker loop.
///
/// Keeps at most one batch per channel in hand. Untimed batches go out as soon
/// as they are ready. A timed run is taken early once its first tick is due,
/// even if it is shorter than a batch. Timed batches wait until due and
/// every channel holding the same start tick is submitted in one transport
/// write. After a halt the remaining queued data is submitted before exiting.
pub(crate) fn run(session: Arc<Session>) {
    let batch_samples = session.descriptor.tx_batch_samples();
    let packet_samples = session.descriptor.tx_samples_in_packet();
    let mut held: Vec<Option<SampleBlock>> = (0..session.tx.len()).map(|_| None).collect();
    let mut tails: Vec<Option<i64>> = vec![None; session.tx.len()];
    debug!("TX worker started");

    loop {
        let halted = session.is_halted();
        let now = session.scheduler.now();
        let due = |timestamp| session.scheduler.is_due(timestamp, now);
        for (slot, pipe) in held.iter_mut().zip(&session.tx) {
            if slot.is_none() {
                *slot = pipe.buffer.take_ready_batch(batch_samples, halted, due);
            }
        }

        let mut release: Vec<usize> = held
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().filter(|b| !b.timed).map(|_| index))
            .collect();
        let next_timed = held
            .iter()
            .flatten()
            .filter(|block| block.timed)
            .map(|block| block.timestamp)
            .min();
        if let Some(timestamp) = next_timed
            && (halted || session.scheduler.is_due(timestamp, now))
        {
            release.extend(held.iter().enumerate().filter_map(|(index, slot)| {
                slot.as_ref()
                    .filter(|b| b.timed && b.timestamp == timestamp)
                    .map(|_| index)
            }));
        }

        let mut packets = Vec::new();
        let mut submitted = Vec::new();
        for index in release {
            let Some(block) = held[index].take() else {
                continue;
            };
            let pipe = &session.tx[index];
            if block.timed && session.scheduler.is_late(block.timestamp, now) {
                debug!(
                    channel = pipe.channel,
                    timestamp = block.timestamp,
                    now,
                    "Dropping late TX batch"
                );
                pipe.stats.record(StreamEvent::Late);
                continue;
            }
            tails[index] = (block.timed && !block.flush).then(|| block.end_timestamp());
            let first = packets.len();
            packetize(pipe.channel, block, packet_samples, &mut packets);
            let bytes = packets[first..].iter().map(|p| p.payload.len()).sum::<usize>();
            submitted.push((index, bytes, packets.len() - first));
        }

        if !packets.is_empty() {
            if let Err(err) = session.transport.write(&packets) {
                error!("Transport write failed: {err}");
                session.halt(Some(err));
                break;
            }
            trace!("Submitted {} packet(s)", packets.len());
            for &(index, bytes, count) in &submitted {
                let pipe = &session.tx[index];
                pipe.stats.record_transfer(bytes, count);
                pipe.stats.record_fill(pipe.buffer.fill());
                session.report(pipe);
            }
        }

        for ((tail, slot), pipe) in tails.iter_mut().zip(&held).zip(&session.tx) {
            if let Some(end) = *tail
                && now > end
                && slot.is_none()
                && pipe.buffer.is_empty()
            {
                debug!(channel = pipe.channel, end, now, "TX underrun");
                pipe.stats.record(StreamEvent::Underrun);
                *tail = None;
            }
        }

        if halted && held.iter().all(Option::is_none) && session.tx.iter().all(|p| p.buffer.is_empty())
        {
            break;
        }
        if submitted.is_empty() {
            session.wait_tx(TX_IDLE_WAIT);
        }
    }
    debug!("TX worker exiting");
}

/// Splits a batch into transport packets of at most `packet_samples` samples.
///
/// Timed packets carry the tick of their own first sample; only the last
/// packet of a flushed batch is flagged.
fn packetize(channel: u8, block: SampleBlock, packet_samples: usize, out: &mut Vec<TxPacket>) {
    let chunk_bytes = packet_samples.max(1) * block.sample_size();
    let chunks = block.payload.chunks(chunk_bytes).count();
    for (position, chunk) in block.payload.chunks(chunk_bytes).enumerate() {
        let offset = (position * packet_samples.max(1)) as i64;
        out.push(TxPacket {
            channel,
            timestamp: block.timed.then_some(block.timestamp.saturating_add(offset)),
            flush: block.flush && position + 1 == chunks,
            payload: chunk.to_vec(),
        });
    }
}
