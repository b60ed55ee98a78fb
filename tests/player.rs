use std::sync::{Arc, Mutex};

use frame_pump::synthetic::{DecoderBehavior, SyntheticBackend, SyntheticContainer, SyntheticSurface, SyntheticTrack};
use frame_pump::target::is_claimed;
use frame_pump::{DecodedFrame, Error, FrameObserver, Player, PumpConfig, PumpState, StreamDescriptor, TrackFormat};

const CLIP: &str = "/data/frameCount.mp4";

fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

fn backend(frames: usize, behavior: DecoderBehavior) -> SyntheticBackend {
    let backend = SyntheticBackend::new().with_behavior(behavior);
    backend.insert(
        CLIP,
        SyntheticContainer::new().with_track(SyntheticTrack::frames("video/avc", frames, 33_000)),
    );
    backend
}

#[derive(Debug, Default)]
struct Recorded {
    frames: Vec<(i64, bool)>,
    formats: Vec<StreamDescriptor>,
    end_of_stream: usize,
    errors: Vec<Error>,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Recorded>>);

impl Recorder {
    fn with<R>(&self, f: impl FnOnce(&Recorded) -> R) -> R {
        f(&self.0.lock().unwrap())
    }
}

impl FrameObserver for Recorder {
    fn on_frame_available(&mut self, frame: DecodedFrame) {
        self.0.lock().unwrap().frames.push((frame.timestamp_us, frame.end_of_stream));
        frame.render().unwrap();
    }

    fn on_format_changed(&mut self, descriptor: &StreamDescriptor) {
        self.0.lock().unwrap().formats.push(descriptor.clone());
    }

    fn on_end_of_stream(&mut self) {
        self.0.lock().unwrap().end_of_stream += 1;
    }

    fn on_error(&mut self, error: Error) {
        self.0.lock().unwrap().errors.push(error);
    }
}

#[test]
fn plays_to_the_end() {
    init_logging();
    let backend = backend(10, DecoderBehavior::default());
    let surface = SyntheticSurface::new();
    let recorder = Recorder::default();

    let mut player = Player::create(&backend, CLIP, surface.clone(), recorder.clone(), PumpConfig::default()).unwrap();
    assert_eq!(player.state(), PumpState::Configured);
    assert_eq!(player.path().to_str(), Some(CLIP));
    player.start().unwrap();
    player.wait();

    recorder.with(|r| {
        let expected: Vec<(i64, bool)> = (0..10).map(|i| (i * 33_000, i == 9)).collect();
        assert_eq!(r.frames, expected);
        assert_eq!(r.end_of_stream, 1);
        assert!(r.errors.is_empty());
    });
    assert_eq!(surface.presented().len(), 10);

    player.release();
    assert_eq!(player.state(), PumpState::Released);
    assert!(!is_claimed(&surface));
}

#[test]
fn closures_observe_frames() {
    init_logging();
    let backend = backend(4, DecoderBehavior::default());
    let surface = SyntheticSurface::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&seen);
    let observer = move |frame: DecodedFrame| {
        sink.lock().unwrap().push(frame.timestamp_us);
        frame.discard().unwrap();
    };
    let mut player = Player::create(&backend, CLIP, surface.clone(), observer, PumpConfig::default()).unwrap();
    player.start().unwrap();
    player.wait();
    player.release();

    assert_eq!(*seen.lock().unwrap(), vec![0, 33_000, 66_000, 99_000]);
    assert!(surface.presented().is_empty());
}

#[test]
fn release_before_start_and_twice() {
    init_logging();
    let backend = backend(3, DecoderBehavior::default());
    let surface = SyntheticSurface::new();

    let mut player = Player::create(&backend, CLIP, surface.clone(), Recorder::default(), PumpConfig::default()).unwrap();
    player.release();
    player.release();

    assert_eq!(player.state(), PumpState::Released);
    assert_eq!(backend.decoder_stats(0).unwrap().stop_calls, 1);
    assert!(matches!(player.start(), Err(Error::InvalidState { .. })));
}

#[test]
fn one_player_per_surface_until_replaced() {
    init_logging();
    let backend = backend(3, DecoderBehavior::default());
    let surface = SyntheticSurface::new();

    let mut slot = None;
    Player::replace(&mut slot, &backend, CLIP, surface.clone(), Recorder::default(), PumpConfig::default())
        .unwrap()
        .start()
        .unwrap();

    let second = Player::create(&backend, CLIP, surface.clone(), Recorder::default(), PumpConfig::default());
    assert!(matches!(second, Err(Error::TargetInUse(_))));

    let recorder = Recorder::default();
    let player = Player::replace(&mut slot, &backend, CLIP, surface.clone(), recorder.clone(), PumpConfig::default()).unwrap();
    player.start().unwrap();
    player.wait();

    assert_eq!(backend.decoders_created(), 2);
    assert_eq!(backend.decoder_stats(0).unwrap().stop_calls, 1);
    recorder.with(|r| assert_eq!(r.frames.len(), 3));

    slot.take();
    assert!(!is_claimed(&surface));
}

#[test]
fn format_changes_reach_the_observer() {
    init_logging();
    let behavior = DecoderBehavior {
        format_change: Some((
            0,
            TrackFormat {
                width: Some(1280),
                height: Some(720),
                color_format: Some(0x7f420888),
                ..Default::default()
            },
        )),
        ..Default::default()
    };
    let backend = backend(3, behavior);
    let surface = SyntheticSurface::new();
    let recorder = Recorder::default();

    let mut player = Player::create(&backend, CLIP, surface, recorder.clone(), PumpConfig::default()).unwrap();
    player.start().unwrap();
    player.wait();

    recorder.with(|r| {
        assert_eq!(r.formats.len(), 1);
        assert_eq!((r.formats[0].width, r.formats[0].height), (1280, 720));
        assert_eq!(r.formats[0].color_format_name(), Some("COLOR_FormatYUV420Flexible"));
        assert_eq!(r.frames.len(), 3);
    });
    assert_eq!(player.descriptor().map(|d| d.width), Some(1280));
}

#[test]
fn decode_errors_reach_the_observer() {
    init_logging();
    let behavior = DecoderBehavior {
        fail_after_frames: Some(2),
        ..Default::default()
    };
    let backend = backend(10, behavior);
    let surface = SyntheticSurface::new();
    let recorder = Recorder::default();

    let mut player = Player::create(&backend, CLIP, surface.clone(), recorder.clone(), PumpConfig::default()).unwrap();
    player.start().unwrap();
    player.wait();

    recorder.with(|r| {
        assert_eq!(r.frames.len(), 2);
        assert_eq!(r.end_of_stream, 0);
        assert_eq!(r.errors.len(), 1);
        assert!(matches!(r.errors[0], Error::RuntimeDecode(_)));
    });
    assert_eq!(player.state(), PumpState::Terminated);
    assert!(!is_claimed(&surface));
}

#[test]
fn missing_video_track_creates_no_decoder() {
    init_logging();
    let backend = SyntheticBackend::new();
    backend.insert(
        CLIP,
        SyntheticContainer::new().with_track(SyntheticTrack::new(TrackFormat::with_mime("audio/mp4a-latm"))),
    );

    let result = Player::create(&backend, CLIP, SyntheticSurface::new(), Recorder::default(), PumpConfig::default());
    assert!(matches!(result, Err(Error::NoVideoTrack(_))));
    assert_eq!(backend.decoders_created(), 0);

    let missing = Player::create(&backend, "/data/absent.mp4", SyntheticSurface::new(), Recorder::default(), PumpConfig::default());
    assert!(matches!(missing, Err(Error::SourceOpen { .. })));
}
