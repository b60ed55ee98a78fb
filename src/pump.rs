//! Decode pump
//!
//! Feeds samples from a [`FrameSource`] into a decoder and drains decoded
//! frames, all on one dedicated worker thread. Frames are published on a
//! bounded channel; the host renders or discards each one through its
//! [`FrameHandle`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::config::PumpConfig;
use crate::error::{Error, Result};
use crate::format::{StreamDescriptor, TrackFormat};
use crate::media::{Decoder, Demuxer, MediaBackend, OutputEvent};
use crate::source::FrameSource;
use crate::target::TargetClaim;

/// Lifecycle of a [`DecodePump`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Configured,
    Running,
    /// End of stream seen, waiting for the host to release delivered frames
    Draining,
    Terminated,
    Released,
}

/// What the worker publishes to the host
#[derive(Debug)]
pub enum PumpEvent {
    Frame(DecodedFrame),
    FormatChanged(StreamDescriptor),
    /// End of stream arrived on an empty output buffer, so no frame carries it
    EndOfStream,
    /// The loop failed and the session has been shut down
    Error(Error),
}

impl PumpEvent {
    pub fn is_end_of_stream(&self) -> bool {
        match self {
            PumpEvent::Frame(frame) => frame.end_of_stream,
            PumpEvent::EndOfStream => true,
            _ => false,
        }
    }
}

/// A displayable decoded frame
#[derive(Debug)]
pub struct DecodedFrame {
    pub timestamp_us: i64,
    pub end_of_stream: bool,
    pub handle: FrameHandle,
}

impl DecodedFrame {
    /// Present the frame on the display target and give the buffer back
    pub fn render(self) -> Result<()> {
        self.handle.render()
    }

    pub fn discard(self) -> Result<()> {
        self.handle.discard()
    }
}

trait ReleaseOutput: Send + Sync {
    fn release_output(&self, index: usize, render: bool) -> Result<()>;
}

/// One-shot token for a decoder-owned output buffer.
///
/// The first release hands the buffer back; any further release fails with
/// [`Error::DoubleRelease`] without touching the decoder. Dropping an
/// unreleased handle discards the frame.
pub struct FrameHandle {
    index: usize,
    released: AtomicBool,
    session: Arc<dyn ReleaseOutput>,
}

impl FrameHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn release(&self, render: bool) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            warn!("FrameHandle: Output buffer {} already released", self.index);
            return Err(Error::DoubleRelease { index: self.index });
        }
        self.session.release_output(self.index, render)
    }

    pub fn render(&self) -> Result<()> {
        self.release(true)
    }

    pub fn discard(&self) -> Result<()> {
        self.release(false)
    }
}

impl Drop for FrameHandle {
    fn drop(&mut self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            debug!("FrameHandle: Discarding unreleased output buffer {}", self.index);
            if let Err(e) = self.session.release_output(self.index, false) {
                warn!("FrameHandle: Discard of buffer {} failed: {}", self.index, e);
            }
        }
    }
}

impl fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHandle")
            .field("index", &self.index)
            .field("released", &self.is_released())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// State shared by the pump, its worker and every outstanding frame handle
struct Session<D: Decoder> {
    decoder: D,
    state: Mutex<PumpState>,
    descriptor: Mutex<StreamDescriptor>,
    stopping: AtomicBool,
    shut_down: AtomicBool,
    outstanding: Mutex<usize>,
    frames_released: Condvar,
    claim: Mutex<Option<TargetClaim>>,
    // The decoder renders into this surface until it is stopped
    _target: D::Target,
}

impl<D: Decoder> Session<D> {
    fn new(decoder: D, descriptor: StreamDescriptor, claim: TargetClaim, target: D::Target) -> Self {
        Self {
            decoder,
            state: Mutex::new(PumpState::Configured),
            descriptor: Mutex::new(descriptor),
            stopping: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            outstanding: Mutex::new(0),
            frames_released: Condvar::new(),
            claim: Mutex::new(Some(claim)),
            _target: target,
        }
    }

    fn state(&self) -> PumpState {
        *lock(&self.state)
    }

    /// `Released` is absorbing; later transitions from the worker are ignored
    fn set_state(&self, next: PumpState) {
        let mut state = lock(&self.state);
        if *state != PumpState::Released {
            *state = next;
        }
    }

    fn force_state(&self, next: PumpState) {
        *lock(&self.state) = next;
    }

    fn descriptor(&self) -> StreamDescriptor {
        lock(&self.descriptor).clone()
    }

    fn update_format(&self, format: &TrackFormat) -> StreamDescriptor {
        let mut descriptor = lock(&self.descriptor);
        descriptor.apply_output_format(format);
        descriptor.clone()
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    fn request_stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.frames_released.notify_all();
    }

    /// Stop the decoder and give up the display target. Runs once.
    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.decoder.stop() {
            warn!("DecodePump: Error stopping decoder: {}", e);
        }
        lock(&self.claim).take();
        debug!("DecodePump: Session shut down");
    }

    fn handle_for(self: &Arc<Self>, index: usize) -> FrameHandle {
        *lock(&self.outstanding) += 1;
        let session: Arc<dyn ReleaseOutput> = self.clone();
        FrameHandle {
            index,
            released: AtomicBool::new(false),
            session,
        }
    }

    fn wait_for_frames(&self, poll: Duration) {
        let mut outstanding = lock(&self.outstanding);
        while *outstanding > 0 && !self.is_stopping() {
            debug!("DecodePump: Waiting for {} frames to be released", *outstanding);
            outstanding = match self.frames_released.wait_timeout(outstanding, poll) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Publish with backpressure. Gives up when the pump is being torn down
    /// or nobody is listening any more.
    fn emit(&self, events: &Sender<PumpEvent>, mut event: PumpEvent, timeout: Duration) -> bool {
        loop {
            if self.is_stopping() {
                return false;
            }
            match events.send_timeout(event, timeout) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(returned)) => event = returned,
                Err(SendTimeoutError::Disconnected(_)) => {
                    debug!("DecodePump: Event receiver dropped");
                    return false;
                }
            }
        }
    }
}

impl<D: Decoder> ReleaseOutput for Session<D> {
    fn release_output(&self, index: usize, render: bool) -> Result<()> {
        let result = if self.shut_down.load(Ordering::Acquire) {
            // The stopped decoder already reclaimed every buffer
            debug!("DecodePump: Buffer {} released after shutdown", index);
            Ok(())
        } else {
            self.decoder.release_output(index, render)
        };

        let mut outstanding = lock(&self.outstanding);
        *outstanding = outstanding.saturating_sub(1);
        self.frames_released.notify_all();
        result
    }
}

/// Receiving end of a running pump
pub type FrameEvents = Receiver<PumpEvent>;

/// Drives one decode session from configure to teardown.
pub struct DecodePump<B: MediaBackend> {
    config: PumpConfig,
    source: Option<FrameSource<B::Demuxer>>,
    session: Option<Arc<Session<B::Decoder>>>,
    worker: Option<JoinHandle<()>>,
    released: bool,
}

impl<B: MediaBackend> DecodePump<B> {
    pub fn new(config: PumpConfig) -> Self {
        Self {
            config,
            source: None,
            session: None,
            worker: None,
            released: false,
        }
    }

    pub fn state(&self) -> PumpState {
        if self.released {
            return PumpState::Released;
        }
        self.session.as_ref().map_or(PumpState::Idle, |s| s.state())
    }

    /// Current negotiated format, once configured
    pub fn descriptor(&self) -> Option<StreamDescriptor> {
        self.session.as_ref().map(|s| s.descriptor())
    }

    /// Create a decoder for the source's stream, bind it to `target` and
    /// start it.
    pub fn configure(&mut self, backend: &B, source: FrameSource<B::Demuxer>, target: B::Target) -> Result<()> {
        let state = self.state();
        if state != PumpState::Idle {
            return Err(Error::InvalidState { op: "configure", state });
        }

        let claim = TargetClaim::acquire(&target)?;
        let descriptor = source.descriptor().clone();

        let decoder = backend.create_decoder(&descriptor.mime)?;
        decoder.configure(&descriptor.track_format, &target)?;
        decoder.start()?;
        info!(
            "DecodePump: Decoder started for {} {}x{}",
            descriptor.mime, descriptor.width, descriptor.height
        );

        self.session = Some(Arc::new(Session::new(decoder, descriptor, claim, target)));
        self.source = Some(source);
        Ok(())
    }

    /// Start the pump loop on its own thread and return the event stream.
    pub fn run(&mut self) -> Result<FrameEvents> {
        let state = self.state();
        match state {
            PumpState::Configured => {}
            PumpState::Running | PumpState::Draining => return Err(Error::AlreadyRunning),
            _ => return Err(Error::InvalidState { op: "run", state }),
        }

        let (Some(session), Some(source)) = (self.session.clone(), self.source.take()) else {
            return Err(Error::InvalidState { op: "run", state });
        };

        let (events_tx, events_rx) = crossbeam_channel::bounded(self.config.event_capacity);
        session.set_state(PumpState::Running);

        let worker_session = Arc::clone(&session);
        let config = self.config.clone();
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || pump_loop(worker_session, source, events_tx, config));

        match spawned {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(events_rx)
            }
            Err(e) => {
                error!("DecodePump: Failed to spawn worker: {}", e);
                session.shutdown();
                session.set_state(PumpState::Terminated);
                Err(Error::Io(e))
            }
        }
    }

    /// Hand a delivered frame back to the decoder, presenting it first when
    /// `display` is set.
    pub fn release_frame(&self, handle: &FrameHandle, display: bool) -> Result<()> {
        handle.release(display)
    }

    /// Stop the decoder and close the source. Safe from any state and
    /// idempotent; returns once the worker has exited.
    pub fn teardown(&mut self) {
        if let Some(session) = &self.session {
            session.request_stop();
        }
        // The worker may be filling an input slot; the decoder must outlive it
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("DecodePump: Worker panicked");
            }
        }
        if let Some(session) = &self.session {
            session.shutdown();
        }
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        if let Some(session) = &self.session {
            session.force_state(PumpState::Released);
        }
        if !self.released {
            info!("DecodePump: Released");
            self.released = true;
        }
    }
}

impl<B: MediaBackend> Default for DecodePump<B> {
    fn default() -> Self {
        Self::new(PumpConfig::default())
    }
}

impl<B: MediaBackend> Drop for DecodePump<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

enum LoopExit {
    EndOfStream,
    Cancelled,
}

fn pump_loop<D: Decoder, S: Demuxer>(
    session: Arc<Session<D>>,
    mut source: FrameSource<S>,
    events: Sender<PumpEvent>,
    config: PumpConfig,
) {
    info!("DecodePump: Worker started");
    let result = drive(&session, &mut source, &events, &config);
    let samples = source.samples_read();
    source.close();

    match result {
        Ok(LoopExit::EndOfStream) => {
            session.set_state(PumpState::Draining);
            drop(events);
            session.wait_for_frames(config.dequeue_timeout);
            session.shutdown();
            info!("DecodePump: Finished after {} samples", samples);
        }
        Ok(LoopExit::Cancelled) => {
            session.shutdown();
            debug!("DecodePump: Cancelled after {} samples", samples);
        }
        Err(e) if session.is_stopping() => {
            debug!("DecodePump: Ignoring error during teardown: {}", e);
        }
        Err(e) => {
            error!("DecodePump: Decode loop failed after {} samples: {}", samples, e);
            session.shutdown();
            session.emit(&events, PumpEvent::Error(e), config.dequeue_timeout);
        }
    }
    session.set_state(PumpState::Terminated);
}

fn drive<D: Decoder, S: Demuxer>(
    session: &Arc<Session<D>>,
    source: &mut FrameSource<S>,
    events: &Sender<PumpEvent>,
    config: &PumpConfig,
) -> Result<LoopExit> {
    let decoder = &session.decoder;
    let timeout = config.dequeue_timeout;
    let mut input_done = false;
    let mut frames: u64 = 0;

    loop {
        if session.is_stopping() {
            return Ok(LoopExit::Cancelled);
        }

        // Feed input
        if !input_done {
            if let Some(index) = decoder.dequeue_input(timeout)? {
                match decoder.with_input_buffer(index, |buf| source.next_sample(buf))? {
                    Some(sample) => {
                        decoder.queue_input(index, sample.size, sample.timestamp_us, false)?;
                        source.advance();
                    }
                    None => {
                        debug!("DecodePump: Input EOS reached");
                        input_done = true;
                        decoder.queue_input(index, 0, 0, true)?;
                    }
                }
            }
        }

        // Drain output
        match decoder.dequeue_output(timeout)? {
            OutputEvent::Buffer(buffer) => {
                let end_of_stream = buffer.end_of_stream;
                if end_of_stream {
                    debug!("DecodePump: Output EOS reached");
                }

                let event = if buffer.size > 0 {
                    frames += 1;
                    PumpEvent::Frame(DecodedFrame {
                        timestamp_us: buffer.presentation_time_us,
                        end_of_stream,
                        handle: session.handle_for(buffer.index),
                    })
                } else {
                    decoder.release_output(buffer.index, false)?;
                    if !end_of_stream {
                        continue;
                    }
                    PumpEvent::EndOfStream
                };

                if !session.emit(events, event, timeout) {
                    return Ok(LoopExit::Cancelled);
                }
                if end_of_stream {
                    info!("DecodePump: Delivered {} frames", frames);
                    return Ok(LoopExit::EndOfStream);
                }
            }
            OutputEvent::FormatChanged(format) => {
                let descriptor = session.update_format(&format);
                info!(
                    "DecodePump: Output format changed to {}x{}, color format {}",
                    descriptor.width,
                    descriptor.height,
                    descriptor.color_format_name().unwrap_or("unknown")
                );
                if !session.emit(events, PumpEvent::FormatChanged(descriptor), timeout) {
                    return Ok(LoopExit::Cancelled);
                }
            }
            OutputEvent::TryAgainLater => {}
        }
    }
}
