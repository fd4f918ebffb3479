// SPDX-FileCopyrightText: 2025 Contributors to the sdr-stream project.
// SPDX-License-Identifier: Apache-2.0

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
    Error, HostSample, Result, SampleMeta,
    config::StreamDescriptor,
    stream::{
        Direction, StreamState, rx,
        session::Session,
        stats::{ChannelStats, StatusCallback},
        tx,
    },
    transport::{LinkConfig, Transport},
};

struct ControllerInner {
    state: StreamState,
    session: Option<Arc<Session>>,
    workers: Vec<JoinHandle<()>>,
}

/// Lifecycle and data-path entry point for one RF module.
///
/// `Idle → Configured → Running → Stopped`, and back to `Configured` through
/// another [`setup`](Self::setup). All methods take `&self` and may be called
/// from any thread; `receive` and `transmit` for different channels run
/// concurrently.
///
/// Lock order is `lifecycle` then `inner`. `inner` is never held while
/// workers are joined, so state, status and data calls answer during a stop.
pub struct StreamController {
    module: u8,
    transport: Arc<dyn Transport>,
    lifecycle: Mutex<()>,
    inner: Mutex<ControllerInner>,
}

impl StreamController {
    /// Creates an idle controller streaming over `transport`.
    pub fn new(module: u8, transport: Arc<dyn Transport>) -> Self {
        Self {
            module,
            transport,
            lifecycle: Mutex::new(()),
            inner: Mutex::new(ControllerInner {
                state: StreamState::Idle,
                session: None,
                workers: Vec::new(),
            }),
        }
    }

    /// Index of the RF module this controller drives.
    pub fn module(&self) -> u8 {
        self.module
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.settle();
        self.inner.lock().state
    }

    /// Id of the current stream session, if one is configured.
    pub fn stream_id(&self) -> Option<Uuid> {
        self.inner.lock().session.as_ref().map(|session| session.id)
    }

    /// Validates `descriptor` and allocates one buffer per declared channel.
    ///
    /// Valid from `Idle` and `Stopped`. Statistics of a previous stream are
    /// discarded. No transport I/O happens until [`start`](Self::start).
    pub fn setup(
        &self,
        descriptor: StreamDescriptor,
        callback: Option<Arc<dyn StatusCallback>>,
    ) -> Result<()> {
        let lifecycle = self.lifecycle.lock();
        self.settle_locked(&lifecycle);
        let mut inner = self.inner.lock();
        if let StreamState::Configured | StreamState::Running = inner.state {
            return Err(Error::AlreadyConfigured(inner.state));
        }
        descriptor.validate(self.transport.channel_count())?;

        if let Some(err) = inner.session.take().and_then(|old| old.take_fatal()) {
            debug!(module = self.module, "Discarding failure of previous stream: {err}");
        }
        let session = Session::new(self.module, descriptor, self.transport.clone(), callback);
        info!(
            module = self.module,
            stream_id = %session.id,
            rx = ?session.descriptor.rx_channels,
            tx = ?session.descriptor.tx_channels,
            format = ?session.descriptor.format,
            link_format = ?session.descriptor.link_format,
            "Stream configured"
        );
        inner.session = Some(Arc::new(session));
        inner.state = StreamState::Configured;
        Ok(())
    }

    /// Arms the scheduler and the transport and starts the workers.
    ///
    /// Calling it while running logs a warning and does nothing.
    pub fn start(&self) -> Result<()> {
        let lifecycle = self.lifecycle.lock();
        self.settle_locked(&lifecycle);
        let mut inner = self.inner.lock();
        Self::surface_fatal(&inner)?;
        match inner.state {
            StreamState::Running => {
                warn!(module = self.module, "Start requested while already running");
                return Ok(());
            }
            StreamState::Idle | StreamState::Stopped => return Err(Error::NotConfigured),
            StreamState::Configured => {}
        }
        let session = inner.session.clone().ok_or(Error::NotConfigured)?;

        let start_timestamp = match session.scheduler.arm() {
            Ok(start) => start,
            Err(err) => {
                session.halt(None);
                inner.state = StreamState::Stopped;
                return Err(err);
            }
        };
        let link = LinkConfig {
            link_format: session.descriptor.link_format,
            rx_channels: session.descriptor.rx_channels.clone(),
            tx_channels: session.descriptor.tx_channels.clone(),
            rx_samples_in_packet: session.descriptor.rx_samples_in_packet(),
            start_timestamp,
        };
        if let Err(err) = self.transport.arm(&link) {
            session.halt(None);
            inner.state = StreamState::Stopped;
            return Err(err);
        }

        let mut workers = Vec::new();
        let mut spawned = Ok(());
        if !session.rx.is_empty() {
            spawned = spawn_worker(&session, "rx", rx::run).map(|handle| workers.push(handle));
        }
        if spawned.is_ok() && !session.tx.is_empty() {
            spawned = spawn_worker(&session, "tx", tx::run).map(|handle| workers.push(handle));
        }
        if let Err(err) = spawned {
            session.halt(None);
            inner.state = StreamState::Stopped;
            drop(inner);
            self.wind_down(workers);
            return Err(err);
        }
        inner.workers = workers;

        inner.state = StreamState::Running;
        info!(module = self.module, stream_id = %session.id, "Stream started");
        Ok(())
    }

    /// Stops the stream, submitting TX data still queued, and disarms the
    /// transport. Idempotent once stopped.
    ///
    /// The state reads `Stopped` as soon as the stream is halted; the call
    /// itself returns once the workers have drained and exited.
    pub fn stop(&self) -> Result<()> {
        let lifecycle = self.lifecycle.lock();
        self.settle_locked(&lifecycle);
        let mut inner = self.inner.lock();
        let fatal = Self::surface_fatal(&inner);
        let previous = inner.state;
        match previous {
            StreamState::Idle => return Err(Error::NotConfigured),
            StreamState::Stopped => return fatal,
            StreamState::Configured | StreamState::Running => {
                if let Some(session) = &inner.session {
                    session.halt(None);
                }
                inner.state = StreamState::Stopped;
            }
        }
        let workers = std::mem::take(&mut inner.workers);
        drop(inner);
        if previous == StreamState::Running {
            self.wind_down(workers);
        }
        info!(module = self.module, "Stream stopped");
        fatal
    }

    /// Copies up to `destination.len()` received samples for `channel`.
    ///
    /// Returns the number of samples written and stamps `meta.timestamp` with
    /// the tick of the first one. With `meta.use_timestamp` set, samples before
    /// `meta.timestamp` are skipped and the call waits (or, when polling, fails
    /// with [`Error::NotYetAvailable`]) until that tick arrives.
    pub fn receive<S: HostSample>(
        &self,
        channel: u8,
        destination: &mut [S],
        meta: &mut SampleMeta,
    ) -> Result<usize> {
        let session = self.running_session()?;
        rx::receive(&session, channel, destination, meta)
    }

    /// Queues `source` for transmission on `channel`.
    ///
    /// Returns the number of samples accepted, which may be less than
    /// `source.len()` when the buffer is full. With `meta.use_timestamp` set the
    /// samples are held until hardware time reaches `meta.timestamp`; a
    /// timestamp already in the past fails with [`Error::Late`].
    pub fn transmit<S: HostSample>(
        &self,
        channel: u8,
        source: &[S],
        meta: &SampleMeta,
    ) -> Result<usize> {
        let session = self.running_session()?;
        tx::transmit(&session, channel, source, meta)
    }

    /// Returns a statistics snapshot without blocking on the data path or on
    /// a stop in progress.
    pub fn status(&self, channel: u8, direction: Direction) -> Result<ChannelStats> {
        let inner = self.inner.lock();
        Self::surface_fatal(&inner)?;
        let session = inner.session.as_ref().ok_or(Error::NotConfigured)?;
        let pipe = session.pipe(channel, direction)?;
        Ok(session.snapshot(pipe))
    }

    fn running_session(&self) -> Result<Arc<Session>> {
        self.settle();
        let inner = self.inner.lock();
        Self::surface_fatal(&inner)?;
        match (inner.state, &inner.session) {
            (StreamState::Running, Some(session)) => Ok(session.clone()),
            (StreamState::Configured, _) => Err(Error::NotRunning),
            (StreamState::Stopped, _) => Err(Error::Stopped),
            _ => Err(Error::NotConfigured),
        }
    }

    /// Moves a running stream whose session halted on its own to `Stopped`.
    fn settle(&self) {
        if Self::halted_while_running(&self.inner.lock()) {
            let lifecycle = self.lifecycle.lock();
            self.settle_locked(&lifecycle);
        }
    }

    fn settle_locked(&self, _lifecycle: &MutexGuard<'_, ()>) {
        let mut inner = self.inner.lock();
        if !Self::halted_while_running(&inner) {
            return;
        }
        info!(module = self.module, "Stream halted by worker");
        inner.state = StreamState::Stopped;
        let workers = std::mem::take(&mut inner.workers);
        drop(inner);
        self.wind_down(workers);
    }

    fn halted_while_running(inner: &ControllerInner) -> bool {
        inner.state == StreamState::Running
            && inner
                .session
                .as_ref()
                .is_some_and(|session| session.is_halted())
    }

    fn surface_fatal(inner: &ControllerInner) -> Result<()> {
        match inner.session.as_ref().and_then(|session| session.take_fatal()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Joins the workers and disarms the transport. Called with the lifecycle
    /// lock held and `inner` released.
    fn wind_down(&self, workers: Vec<JoinHandle<()>>) {
        for worker in workers {
            if worker.join().is_err() {
                error!(module = self.module, "Stream worker panicked");
            }
        }
        if let Err(err) = self.transport.disarm() {
            error!(module = self.module, "Failed to disarm transport: {err}");
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.state == StreamState::Running {
            if let Some(session) = &inner.session {
                session.halt(None);
            }
            let workers = std::mem::take(&mut inner.workers);
            self.wind_down(workers);
        }
    }
}

fn spawn_worker(
    session: &Arc<Session>,
    direction: &str,
    body: fn(Arc<Session>),
) -> Result<JoinHandle<()>> {
    let session = session.clone();
    let span = info_span!("stream", module = session.module, id = %session.id, direction);
    thread::Builder::new()
        .name(format!("sdr-{direction}-{}", session.module))
        .spawn(move || {
            let _entered = span.enter();
            body(session)
        })
        .map_err(|err| Error::Failed(format!("Failed to spawn {direction} worker: {err}")))
}
