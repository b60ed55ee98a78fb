use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use frame_pump::synthetic::{
    SyntheticBackend, SyntheticContainer, SyntheticDecoder, SyntheticDemuxer, SyntheticSurface,
    SyntheticTrack,
};
use frame_pump::target::is_claimed;
use frame_pump::{
    DecodePump, DecodedFrame, Decoder, FrameSource, MediaBackend, OutputEvent, PumpConfig, PumpEvent, PumpState,
    Result, TrackFormat,
};

const CLIP: &str = "/data/frameCount.mp4";

fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}

/// Tracks whether the decoder was stopped while an input slot was being filled
#[derive(Default)]
struct FillWatch {
    fill_started: AtomicBool,
    filling: AtomicBool,
    stopped_mid_fill: AtomicBool,
}

/// Synthetic decoder whose input fills take a while
struct SlowFillDecoder {
    inner: SyntheticDecoder,
    watch: Arc<FillWatch>,
}

impl Decoder for SlowFillDecoder {
    type Target = SyntheticSurface;

    fn configure(&self, format: &TrackFormat, target: &SyntheticSurface) -> Result<()> {
        self.inner.configure(format, target)
    }

    fn start(&self) -> Result<()> {
        self.inner.start()
    }

    fn dequeue_input(&self, timeout: Duration) -> Result<Option<usize>> {
        self.inner.dequeue_input(timeout)
    }

    fn with_input_buffer<R>(&self, index: usize, fill: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        self.watch.filling.store(true, Ordering::SeqCst);
        self.watch.fill_started.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        let result = self.inner.with_input_buffer(index, fill);
        self.watch.filling.store(false, Ordering::SeqCst);
        result
    }

    fn queue_input(&self, index: usize, size: usize, presentation_time_us: i64, end_of_stream: bool) -> Result<()> {
        self.inner.queue_input(index, size, presentation_time_us, end_of_stream)
    }

    fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent> {
        self.inner.dequeue_output(timeout)
    }

    fn release_output(&self, index: usize, render: bool) -> Result<()> {
        self.inner.release_output(index, render)
    }

    fn stop(&self) -> Result<()> {
        if self.watch.filling.load(Ordering::SeqCst) {
            self.watch.stopped_mid_fill.store(true, Ordering::SeqCst);
        }
        self.inner.stop()
    }
}

struct SlowFillBackend {
    inner: SyntheticBackend,
    watch: Arc<FillWatch>,
}

impl MediaBackend for SlowFillBackend {
    type Target = SyntheticSurface;
    type Demuxer = SyntheticDemuxer;
    type Decoder = SlowFillDecoder;

    fn open_demuxer(&self, path: &Path) -> Result<SyntheticDemuxer> {
        self.inner.open_demuxer(path)
    }

    fn create_decoder(&self, mime: &str) -> Result<SlowFillDecoder> {
        Ok(SlowFillDecoder {
            inner: self.inner.create_decoder(mime)?,
            watch: Arc::clone(&self.watch),
        })
    }
}

#[test]
fn teardown_waits_for_the_input_fill() {
    init_logging();
    let inner = SyntheticBackend::new();
    inner.insert(
        CLIP,
        SyntheticContainer::new().with_track(SyntheticTrack::frames("video/avc", 50, 33_000)),
    );
    let watch = Arc::new(FillWatch::default());
    let backend = SlowFillBackend {
        inner,
        watch: Arc::clone(&watch),
    };
    let surface = SyntheticSurface::new();

    let source = FrameSource::open(&backend, Path::new(CLIP)).unwrap();
    let mut pump = DecodePump::new(PumpConfig::default());
    pump.configure(&backend, source, surface.clone()).unwrap();
    let _events = pump.run().unwrap();

    wait_until("the first input fill", || watch.fill_started.load(Ordering::SeqCst));
    pump.teardown();

    assert!(!watch.stopped_mid_fill.load(Ordering::SeqCst));
    assert_eq!(pump.state(), PumpState::Released);
    assert_eq!(backend.inner.decoder_stats(0).unwrap().stop_calls, 1);
    assert!(!is_claimed(&surface));
}

fn held_frames(backend: &SyntheticBackend, surface: &SyntheticSurface) -> (DecodePump<SyntheticBackend>, Vec<DecodedFrame>) {
    let source = FrameSource::open(backend, Path::new(CLIP)).unwrap();
    let mut pump = DecodePump::new(PumpConfig::default());
    pump.configure(backend, source, surface.clone()).unwrap();
    let events = pump.run().unwrap();

    // The channel closes once the last frame is out, with every frame still held
    let frames = events
        .iter()
        .map(|event| match event {
            PumpEvent::Frame(frame) => frame,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    (pump, frames)
}

fn frames_backend(count: usize) -> SyntheticBackend {
    let backend = SyntheticBackend::new();
    backend.insert(
        CLIP,
        SyntheticContainer::new().with_track(SyntheticTrack::frames("video/avc", count, 33_000)),
    );
    backend
}

#[test]
fn draining_lasts_until_every_frame_is_released() {
    init_logging();
    let backend = frames_backend(3);
    let surface = SyntheticSurface::new();
    let (mut pump, mut frames) = held_frames(&backend, &surface);

    assert_eq!(frames.len(), 3);
    assert!(frames[2].end_of_stream);
    assert_eq!(pump.state(), PumpState::Draining);

    let last = frames.pop().unwrap();
    for frame in frames {
        frame.render().unwrap();
    }
    thread::sleep(Duration::from_millis(30));
    assert_eq!(pump.state(), PumpState::Draining);
    assert_eq!(backend.decoder_stats(0).unwrap().stop_calls, 0);
    assert!(is_claimed(&surface));

    last.render().unwrap();
    wait_until("the worker to finish", || pump.state() == PumpState::Terminated);
    let stats = backend.decoder_stats(0).unwrap();
    assert_eq!(stats.stop_calls, 1);
    assert_eq!(stats.rendered, 3);
    assert!(!is_claimed(&surface));

    pump.teardown();
}

#[test]
fn teardown_cuts_draining_short() {
    init_logging();
    let backend = frames_backend(3);
    let surface = SyntheticSurface::new();
    let (mut pump, frames) = held_frames(&backend, &surface);
    assert_eq!(pump.state(), PumpState::Draining);

    let started = Instant::now();
    pump.teardown();
    assert!(started.elapsed() < Duration::from_secs(1), "teardown took {:?}", started.elapsed());

    assert_eq!(pump.state(), PumpState::Released);
    assert_eq!(backend.decoder_stats(0).unwrap().stop_calls, 1);
    assert!(!is_claimed(&surface));

    // Held frames release cleanly against the stopped session
    for frame in frames {
        frame.discard().unwrap();
    }
    assert!(surface.presented().is_empty());
}
