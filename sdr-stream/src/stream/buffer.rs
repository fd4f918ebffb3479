// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

//! Bounded, timestamp-ordered sample queue for one channel.
//!
//! The RX side writes with [`ChannelBuffer::push_overwrite`], which never blocks
//! and drops the oldest samples when full. The TX side writes with
//! [`ChannelBuffer::push_wait`], which accepts what fits and optionally waits for
//! space. Capacity is counted in samples.

use std::{collections::VecDeque, time::Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::{Error, SampleBlock};

/// How long a queue operation may wait for its condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    Poll,
    Until(Instant),
}

/// Reasons a queue operation returned without data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueError {
    /// The queue was stopped.
    Stopped,
    /// The deadline passed.
    Timeout,
    /// Poll mode and nothing to return.
    Empty,
    /// The requested tick is gone: the oldest queued sample is already past it.
    Late { requested: i64, head: i64 },
}

impl From<QueueError> for Error {
    fn from(value: QueueError) -> Self {
        match value {
            QueueError::Stopped => Error::Stopped,
            QueueError::Timeout => Error::Timeout,
            QueueError::Empty => Error::NotYetAvailable,
            QueueError::Late { requested, head } => Error::Late {
                timestamp: requested,
                now: head,
            },
        }
    }
}

/// Result of an overwriting push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PushOutcome {
    /// Samples discarded to make room.
    pub dropped: usize,
}

impl PushOutcome {
    pub fn overrun(&self) -> bool {
        self.dropped > 0
    }
}

struct Inner {
    blocks: VecDeque<SampleBlock>,
    queued: usize,
    stopped: bool,
}

impl Inner {
    fn push(&mut self, block: SampleBlock) {
        if block.is_empty() {
            return;
        }
        self.queued += block.len();
        self.blocks.push_back(block);
    }

    /// Removes up to `max` contiguous samples from the front.
    ///
    /// The run ends early at a timestamp gap or after a flushed block.
    fn take_run(&mut self, max: usize) -> Option<SampleBlock> {
        let mut run = SampleBlock::empty_like(self.blocks.front()?);
        while run.len() < max {
            let Some(front) = self.blocks.front_mut() else {
                break;
            };
            if !run.is_empty() && !run.is_continued_by(front) {
                break;
            }
            let moved = run.take_from(front, max - run.len());
            self.queued -= moved;
            if front.is_empty() {
                self.blocks.pop_front();
            }
            if run.flush {
                break;
            }
        }
        Some(run)
    }

    /// Returns `true` if the run at the front can be submitted as a batch.
    fn run_ready(&self, batch: usize) -> bool {
        let mut len = 0;
        let mut previous: Option<&SampleBlock> = None;
        for block in &self.blocks {
            if let Some(previous) = previous
                && !previous.is_continued_by(block)
            {
                return true;
            }
            len += block.len();
            if len >= batch || block.flush {
                return true;
            }
            previous = Some(block);
        }
        false
    }

    /// Discards samples before `timestamp`.
    fn skip_before(&mut self, timestamp: i64) {
        while let Some(front) = self.blocks.front_mut() {
            if front.end_timestamp() <= timestamp {
                self.queued -= front.len();
                self.blocks.pop_front();
            } else {
                if front.timestamp < timestamp {
                    let skip = (timestamp - front.timestamp) as usize;
                    front.advance(skip);
                    self.queued -= skip;
                }
                break;
            }
        }
    }
}

/// Bounded queue of [`SampleBlock`]s for one channel and direction.
pub(crate) struct ChannelBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
    readable: Condvar,
    writable: Condvar,
}

impl ChannelBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                blocks: VecDeque::new(),
                queued: 0,
                stopped: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// Queue occupancy as a fraction of capacity, in `[0, 1]`.
    pub fn fill(&self) -> f32 {
        let queued = self.inner.lock().queued;
        (queued as f32 / self.capacity as f32).clamp(0.0, 1.0)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().queued == 0
    }

    /// Wakes every waiter; further reads and writes by callers fail with
    /// [`QueueError::Stopped`]. The worker side can still drain.
    pub fn stop(&self) {
        self.inner.lock().stopped = true;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    /// Appends `block`, dropping the oldest samples if the queue is full.
    pub fn push_overwrite(&self, mut block: SampleBlock) -> PushOutcome {
        let mut dropped = 0;
        if block.len() > self.capacity {
            let excess = block.len() - self.capacity;
            block.advance(excess);
            dropped += excess;
        }
        let mut inner = self.inner.lock();
        while inner.queued + block.len() > self.capacity {
            let needed = inner.queued + block.len() - self.capacity;
            let Some(front) = inner.blocks.front_mut() else {
                break;
            };
            let skip = needed.min(front.len());
            front.advance(skip);
            if front.is_empty() {
                inner.blocks.pop_front();
            }
            inner.queued -= skip;
            dropped += skip;
        }
        inner.push(block);
        drop(inner);
        self.readable.notify_all();
        PushOutcome { dropped }
    }

    /// Appends as much of `block` as fits, waiting for space according to `wait`.
    ///
    /// Returns the number of samples accepted. Poll mode returns `Ok(0)` on a
    /// full queue; a blocking wait that accepted nothing fails with
    /// [`QueueError::Timeout`].
    pub fn push_wait(&self, mut block: SampleBlock, wait: Wait) -> Result<usize, QueueError> {
        let mut accepted = 0;
        let mut inner = self.inner.lock();
        loop {
            if inner.stopped {
                return match accepted {
                    0 => Err(QueueError::Stopped),
                    n => Ok(n),
                };
            }
            let space = self.capacity - inner.queued;
            if space > 0 {
                let mut part = SampleBlock::empty_like(&block);
                accepted += part.take_from(&mut block, space);
                inner.push(part);
                self.readable.notify_all();
                if block.is_empty() {
                    return Ok(accepted);
                }
            }
            match wait {
                Wait::Poll => return Ok(accepted),
                Wait::Until(deadline) => {
                    if self.writable.wait_until(&mut inner, deadline).timed_out()
                        && inner.queued == self.capacity
                    {
                        return match accepted {
                            0 => Err(QueueError::Timeout),
                            n => Ok(n),
                        };
                    }
                }
            }
        }
    }

    /// Marks the newest queued block as end of burst.
    ///
    /// Returns `false` if the queue is empty.
    pub fn mark_flush(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.blocks.back_mut() {
            Some(block) => {
                block.flush = true;
                true
            }
            None => false,
        }
    }

    /// Removes up to `max` contiguous samples from the front.
    pub fn pop(&self, max: usize, wait: Wait) -> Result<SampleBlock, QueueError> {
        let mut inner = self.inner.lock();
        loop {
            if inner.stopped {
                return Err(QueueError::Stopped);
            }
            if let Some(run) = inner.take_run(max) {
                return Ok(run);
            }
            self.wait_readable(&mut inner, wait)?;
        }
    }

    /// Removes up to `max` contiguous samples starting exactly at `timestamp`.
    ///
    /// Older samples are discarded. If the oldest remaining sample is more than
    /// `tolerance` ticks past `timestamp` the request is late.
    pub fn pop_at(
        &self,
        timestamp: i64,
        max: usize,
        wait: Wait,
        tolerance: i64,
    ) -> Result<SampleBlock, QueueError> {
        let mut inner = self.inner.lock();
        loop {
            if inner.stopped {
                return Err(QueueError::Stopped);
            }
            inner.skip_before(timestamp);
            if let Some(head) = inner.blocks.front().map(|b| b.timestamp) {
                if head > timestamp.saturating_add(tolerance) {
                    return Err(QueueError::Late {
                        requested: timestamp,
                        head,
                    });
                }
                if let Some(run) = inner.take_run(max) {
                    return Ok(run);
                }
            }
            self.wait_readable(&mut inner, wait)?;
        }
    }

    /// Removes the next TX batch if it is ready for submission.
    ///
    /// A batch is ready when `batch` contiguous samples are queued, when the run
    /// ends in a flush or a timestamp gap, when its first tick passes `due`, or
    /// when `force` is set.
    pub fn take_ready_batch(
        &self,
        batch: usize,
        force: bool,
        due: impl Fn(i64) -> bool,
    ) -> Option<SampleBlock> {
        let mut inner = self.inner.lock();
        let front_due = inner
            .blocks
            .front()
            .is_some_and(|front| front.timed && due(front.timestamp));
        if !force && !front_due && !inner.run_ready(batch) {
            return None;
        }
        let run = inner.take_run(batch)?;
        drop(inner);
        self.writable.notify_all();
        Some(run)
    }

    fn wait_readable(
        &self,
        inner: &mut MutexGuard<'_, Inner>,
        wait: Wait,
    ) -> Result<(), QueueError> {
        match wait {
            Wait::Poll => Err(QueueError::Empty),
            Wait::Until(deadline) => {
                if self.readable.wait_until(inner, deadline).timed_out()
                    && inner.blocks.is_empty()
                    && !inner.stopped
                {
                    Err(QueueError::Timeout)
                } else {
                    Ok(())
                }
            }
        }
    }
}
