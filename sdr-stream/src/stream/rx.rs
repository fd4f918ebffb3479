// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Receive path: transport → RX buffers → caller.

use std::{sync::Arc, time::Duration};

use tracing::{debug, error, trace};

use crate::{
    Error, HostSample, Result, SampleBlock, SampleMeta, StreamEvent,
    stream::{
        Direction,
        buffer::QueueError,
        session::Session,
    },
};

/// Bound on a single transport read so the worker notices a halt quickly.
const RX_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// RX worker loop. Runs until the session halts or the transport fails.
pub(crate) fn run(session: Arc<Session>) {
    let sample_size = session.descriptor.link_format.link_sample_size();
    let mut expected: Vec<Option<i64>> = vec![None; session.rx.len()];
    debug!("RX worker started");

    while !session.is_halted() {
        let packet = match session.transport.read(RX_READ_TIMEOUT) {
            Ok(Some(packet)) => packet,
            Ok(None) => continue,
            Err(err) => {
                error!("Transport read failed: {err}");
                session.halt(Some(err));
                break;
            }
        };
        let Some(index) = session.rx_index(packet.channel) else {
            trace!(
                channel = packet.channel,
                "Dropping packet for inactive channel"
            );
            continue;
        };
        let pipe = &session.rx[index];

        let mut block = SampleBlock::received(packet.timestamp, packet.payload, sample_size);
        session.scheduler.observe(block.end_timestamp());
        let skipped = session.scheduler.align(&mut block);
        if skipped > 0 {
            trace!(channel = pipe.channel, skipped, "Trimmed samples before aligned start");
        }

        if let Some(next) = expected[index] {
            if block.timestamp < next {
                let overlap = next.abs_diff(block.timestamp) as usize;
                trace!(channel = pipe.channel, overlap, "Dropping overlapping samples");
                block.advance(overlap);
            } else if block.timestamp > next {
                let gap = block.timestamp.abs_diff(next);
                debug!(channel = pipe.channel, gap, "Timestamp gap");
                pipe.stats.record(StreamEvent::Loss(gap));
            }
        }
        if block.is_empty() {
            continue;
        }
        expected[index] = Some(block.end_timestamp());

        let bytes = block.payload.len();
        let outcome = pipe.buffer.push_overwrite(block);
        if outcome.overrun() {
            debug!(channel = pipe.channel, dropped = outcome.dropped, "RX overrun");
            pipe.stats.record(StreamEvent::Overrun);
        }
        pipe.stats.record_transfer(bytes, 1);
        pipe.stats.record_fill(pipe.buffer.fill());
        session.report(pipe);
    }
    debug!("RX worker exiting");
}

/// Caller side of [`crate::StreamController::receive`].
pub(crate) fn receive<S: HostSample>(
    session: &Session,
    channel: u8,
    destination: &mut [S],
    meta: &mut SampleMeta,
) -> Result<usize> {
    let descriptor = &session.descriptor;
    if !S::carries(descriptor.format) {
        return Err(Error::FormatMismatch {
            configured: descriptor.format,
        });
    }
    let pipe = session.pipe(channel, Direction::Rx)?;
    let wait = session.wait_mode();

    let popped = if meta.use_timestamp {
        pipe.buffer.pop_at(
            meta.timestamp,
            destination.len(),
            wait,
            session.scheduler.tolerance(),
        )
    } else {
        pipe.buffer.pop(destination.len(), wait)
    };
    let block = match popped {
        Ok(block) => block,
        Err(QueueError::Empty) if !meta.use_timestamp => return Ok(0),
        Err(err @ QueueError::Late { .. }) => {
            pipe.stats.record(StreamEvent::Late);
            debug!(module = session.module, channel, "Late receive request");
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    let count = S::from_link(
        &block.payload,
        descriptor.link_format,
        descriptor.format,
        destination,
    );
    meta.timestamp = block.timestamp;
    pipe.stats.record_fill(pipe.buffer.fill());
    Ok(count)
}
