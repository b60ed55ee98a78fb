//! Host-facing playback lifecycle
//!
//! `Player` wraps one [`DecodePump`] and forwards its events to a
//! [`FrameObserver`] on a dispatch thread.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use log::{debug, error, info};

use crate::config::PumpConfig;
use crate::error::{Error, Result};
use crate::format::StreamDescriptor;
use crate::media::MediaBackend;
use crate::pump::{DecodePump, DecodedFrame, PumpEvent, PumpState};
use crate::source::FrameSource;

/// Receives decode events for one playback.
///
/// Every frame must be rendered or discarded; a frame dropped without either
/// is discarded automatically.
pub trait FrameObserver: Send + 'static {
    fn on_frame_available(&mut self, frame: DecodedFrame);

    fn on_format_changed(&mut self, _descriptor: &StreamDescriptor) {}

    /// Called once, after the frame that carried the end-of-stream flag (or
    /// on its own when the flag arrived without a frame)
    fn on_end_of_stream(&mut self) {}

    fn on_error(&mut self, error: Error) {
        error!("Player: Playback failed: {}", error);
    }
}

impl<F> FrameObserver for F
where
    F: FnMut(DecodedFrame) + Send + 'static,
{
    fn on_frame_available(&mut self, frame: DecodedFrame) {
        self(frame)
    }
}

pub struct Player<B: MediaBackend> {
    path: PathBuf,
    pump: DecodePump<B>,
    observer: Option<Box<dyn FrameObserver>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl<B: MediaBackend> Player<B> {
    /// Open `path` and configure a decoder against `target`. Nothing runs
    /// until [`Player::start`].
    pub fn create(
        backend: &B,
        path: impl AsRef<Path>,
        target: B::Target,
        observer: impl FrameObserver,
        config: PumpConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Player: Creating decoder for {}", path.display());

        let source = FrameSource::open(backend, &path)?;
        let mut pump = DecodePump::new(config);
        pump.configure(backend, source, target)?;

        Ok(Self {
            path,
            pump,
            observer: Some(Box::new(observer)),
            dispatcher: None,
        })
    }

    /// Release whatever player `slot` holds, then create a new one in its
    /// place.
    pub fn replace<'a>(
        slot: &'a mut Option<Self>,
        backend: &B,
        path: impl AsRef<Path>,
        target: B::Target,
        observer: impl FrameObserver,
        config: PumpConfig,
    ) -> Result<&'a mut Self> {
        if let Some(mut previous) = slot.take() {
            info!("Player: Releasing previous player for {}", previous.path.display());
            previous.release();
        }
        let player = Self::create(backend, path, target, observer, config)?;
        Ok(slot.insert(player))
    }

    pub fn start(&mut self) -> Result<()> {
        let events = self.pump.run()?;
        let mut observer = self.observer.take().ok_or(Error::AlreadyRunning)?;

        let dispatcher = thread::Builder::new()
            .name("frame-dispatch".to_string())
            .spawn(move || {
                for event in events.iter() {
                    match event {
                        PumpEvent::Frame(frame) => {
                            let end_of_stream = frame.end_of_stream;
                            observer.on_frame_available(frame);
                            if end_of_stream {
                                observer.on_end_of_stream();
                            }
                        }
                        PumpEvent::FormatChanged(descriptor) => observer.on_format_changed(&descriptor),
                        PumpEvent::EndOfStream => observer.on_end_of_stream(),
                        PumpEvent::Error(e) => observer.on_error(e),
                    }
                }
                debug!("Player: Event stream closed");
            });

        match dispatcher {
            Ok(handle) => {
                self.dispatcher = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.pump.teardown();
                Err(Error::Io(e))
            }
        }
    }

    /// Block until every event of the session has been dispatched.
    pub fn wait(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.join().is_err() {
                error!("Player: Observer panicked");
            }
        }
    }

    /// Tear the session down. Fine before `start`, after the stream ended,
    /// and more than once.
    pub fn release(&mut self) {
        self.pump.teardown();
        self.wait();
        self.observer = None;
    }

    pub fn state(&self) -> PumpState {
        self.pump.state()
    }

    pub fn descriptor(&self) -> Option<StreamDescriptor> {
        self.pump.descriptor()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<B: MediaBackend> Drop for Player<B> {
    fn drop(&mut self) {
        self.release();
    }
}
