//! In-memory media backend
//!
//! A container made of literal samples, a pass-through "decoder" that turns
//! every queued sample into one output buffer, and a surface that records what
//! was presented. Runs anywhere, which makes it the backend the tests use.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;

use crate::error::{Error, Result};
use crate::format::TrackFormat;
use crate::media::{Decoder, Demuxer, DisplayTarget, MediaBackend, OutputBuffer, OutputEvent};

const DEFAULT_INPUT_SIZE: usize = 4096;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One elementary stream: a format plus its samples in decode order
#[derive(Debug, Clone)]
pub struct SyntheticTrack {
    format: TrackFormat,
    samples: Vec<(i64, Vec<u8>)>,
}

impl SyntheticTrack {
    pub fn new(format: TrackFormat) -> Self {
        Self {
            format,
            samples: Vec::new(),
        }
    }

    /// `count` 320x240 frames spaced `interval_us` apart, starting at 0
    pub fn frames(mime: &str, count: usize, interval_us: i64) -> Self {
        let mut track = Self::new(TrackFormat::with_mime(mime).with_size(320, 240));
        for i in 0..count {
            track = track.with_sample(i as i64 * interval_us, vec![(i % 251) as u8 + 1; 16]);
        }
        track
    }

    pub fn with_sample(mut self, timestamp_us: i64, data: Vec<u8>) -> Self {
        self.samples.push((timestamp_us, data));
        self
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyntheticContainer {
    tracks: Vec<SyntheticTrack>,
}

impl SyntheticContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(mut self, track: SyntheticTrack) -> Self {
        self.tracks.push(track);
        self
    }
}

pub struct SyntheticDemuxer {
    tracks: Vec<SyntheticTrack>,
    selected: Option<usize>,
    cursor: usize,
}

impl SyntheticDemuxer {
    fn current(&self) -> Option<&(i64, Vec<u8>)> {
        let track = self.tracks.get(self.selected?)?;
        track.samples.get(self.cursor)
    }
}

fn no_such_track(index: usize) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("no track {}", index),
    ))
}

impl Demuxer for SyntheticDemuxer {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Result<TrackFormat> {
        self.tracks
            .get(index)
            .map(|t| t.format.clone())
            .ok_or_else(|| no_such_track(index))
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        if index >= self.tracks.len() {
            return Err(no_such_track(index));
        }
        self.selected = Some(index);
        self.cursor = 0;
        Ok(())
    }

    fn read_sample(&mut self, buf: &mut [u8]) -> Option<usize> {
        let (_, data) = self.current()?;
        // AMediaExtractor refuses samples that do not fit rather than truncating
        if data.len() > buf.len() {
            return None;
        }
        buf[..data.len()].copy_from_slice(data);
        Some(data.len())
    }

    fn sample_time(&self) -> i64 {
        self.current().map_or(-1, |(timestamp, _)| *timestamp)
    }

    fn advance(&mut self) -> bool {
        let len = self
            .selected
            .and_then(|i| self.tracks.get(i))
            .map_or(0, |t| t.samples.len());
        if self.cursor < len {
            self.cursor += 1;
        }
        self.cursor < len
    }
}

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Display target that records the timestamps of presented frames
#[derive(Debug, Clone)]
pub struct SyntheticSurface {
    id: u64,
    valid: Arc<AtomicBool>,
    presented: Arc<Mutex<Vec<i64>>>,
}

impl SyntheticSurface {
    pub fn new() -> Self {
        Self {
            id: NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed),
            valid: Arc::new(AtomicBool::new(true)),
            presented: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Simulate the surface going away
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }

    pub fn presented(&self) -> Vec<i64> {
        lock(&self.presented).clone()
    }

    fn present(&self, timestamp_us: i64) {
        lock(&self.presented).push(timestamp_us);
    }
}

impl Default for SyntheticSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayTarget for SyntheticSurface {
    fn target_id(&self) -> u64 {
        self.id
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

/// Where the decoder reports end of stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EosMode {
    /// Flag the last frame, the way most hardware decoders do for short clips
    AttachToLastFrame,
    /// Emit an extra empty buffer carrying only the flag
    SeparateEmptyBuffer,
}

/// Knobs for the pass-through decoder
#[derive(Debug, Clone)]
pub struct DecoderBehavior {
    pub input_slots: usize,
    pub output_slots: usize,
    pub eos_mode: EosMode,
    /// Report this output format once this many frames have been produced
    pub format_change: Option<(usize, TrackFormat)>,
    /// Fail `dequeue_output` once this many frames have been handed out
    pub fail_after_frames: Option<usize>,
    pub reject_configure: bool,
}

impl Default for DecoderBehavior {
    fn default() -> Self {
        Self {
            input_slots: 4,
            output_slots: 8,
            eos_mode: EosMode::AttachToLastFrame,
            format_change: None,
            fail_after_frames: None,
            reject_configure: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingFrame {
    timestamp_us: i64,
    size: usize,
    end_of_stream: bool,
}

#[derive(Debug)]
enum Pending {
    Frame(PendingFrame),
    Format(TrackFormat),
}

#[derive(Default)]
struct DecoderState {
    configured: bool,
    started: bool,
    target: Option<SyntheticSurface>,
    input_buffers: Vec<Vec<u8>>,
    free_inputs: VecDeque<usize>,
    free_outputs: VecDeque<usize>,
    // Frame waiting for its successor so end of stream can be attached
    held: Option<PendingFrame>,
    ready: VecDeque<Pending>,
    in_flight: HashMap<usize, i64>,
    frames_produced: usize,
    frames_out: usize,
    queued_timestamps: Vec<i64>,
    end_of_stream_queued: bool,
    released: usize,
    rendered: usize,
    stop_calls: usize,
}

/// Snapshot of what a synthetic decoder has seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderStats {
    pub configured: bool,
    pub started: bool,
    pub queued_timestamps: Vec<i64>,
    pub end_of_stream_queued: bool,
    pub frames_out: usize,
    pub released: usize,
    pub rendered: usize,
    pub in_flight: usize,
    pub stop_calls: usize,
}

struct DecoderInner {
    behavior: DecoderBehavior,
    state: Mutex<DecoderState>,
    changed: Condvar,
}

impl DecoderInner {
    fn stats(&self) -> DecoderStats {
        let state = lock(&self.state);
        DecoderStats {
            configured: state.configured,
            started: state.started,
            queued_timestamps: state.queued_timestamps.clone(),
            end_of_stream_queued: state.end_of_stream_queued,
            frames_out: state.frames_out,
            released: state.released,
            rendered: state.rendered,
            in_flight: state.in_flight.len(),
            stop_calls: state.stop_calls,
        }
    }

    fn push_frame(&self, state: &mut DecoderState, frame: PendingFrame) {
        if let Some((after, format)) = &self.behavior.format_change {
            if state.frames_produced == *after {
                state.ready.push_back(Pending::Format(format.clone()));
            }
        }
        state.frames_produced += 1;
        state.ready.push_back(Pending::Frame(frame));
    }
}

/// Pass-through decoder: one output buffer per queued sample, same
/// timestamp and size.
pub struct SyntheticDecoder {
    inner: Arc<DecoderInner>,
}

fn not_started() -> Error {
    Error::RuntimeDecode("decoder is not started".into())
}

impl Decoder for SyntheticDecoder {
    type Target = SyntheticSurface;

    fn configure(&self, format: &TrackFormat, target: &SyntheticSurface) -> Result<()> {
        if self.inner.behavior.reject_configure {
            return Err(Error::Configuration("format rejected by decoder".into()));
        }
        if !target.is_valid() {
            return Err(Error::TargetUnavailable);
        }
        let (width, height) = (format.width.unwrap_or(0), format.height.unwrap_or(0));
        if width <= 0 || height <= 0 {
            return Err(Error::Configuration(format!("invalid dimensions {}x{}", width, height)));
        }

        let input_size = format
            .max_input_size
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(DEFAULT_INPUT_SIZE);
        let behavior = &self.inner.behavior;
        let mut state = lock(&self.inner.state);
        state.input_buffers = vec![vec![0; input_size]; behavior.input_slots];
        state.free_inputs = (0..behavior.input_slots).collect();
        state.free_outputs = (0..behavior.output_slots).collect();
        state.target = Some(target.clone());
        state.configured = true;
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let mut state = lock(&self.inner.state);
        if !state.configured {
            return Err(Error::Configuration("start before configure".into()));
        }
        state.started = true;
        Ok(())
    }

    fn dequeue_input(&self, timeout: Duration) -> Result<Option<usize>> {
        let deadline = Instant::now() + timeout;
        let mut state = lock(&self.inner.state);
        loop {
            if !state.started {
                return Err(not_started());
            }
            if let Some(index) = state.free_inputs.pop_front() {
                return Ok(Some(index));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = match self.inner.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn with_input_buffer<R>(&self, index: usize, fill: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let mut state = lock(&self.inner.state);
        let buffer = state
            .input_buffers
            .get_mut(index)
            .ok_or_else(|| Error::RuntimeDecode(format!("no input buffer {}", index)))?;
        Ok(fill(buffer.as_mut_slice()))
    }

    fn queue_input(&self, index: usize, size: usize, presentation_time_us: i64, end_of_stream: bool) -> Result<()> {
        let inner = &self.inner;
        let mut state = lock(&inner.state);
        if !state.started {
            return Err(not_started());
        }
        if state.end_of_stream_queued {
            return Err(Error::RuntimeDecode("input queued after end of stream".into()));
        }

        if end_of_stream {
            state.end_of_stream_queued = true;
            let last = match (inner.behavior.eos_mode, state.held.take()) {
                (EosMode::AttachToLastFrame, Some(mut frame)) => {
                    frame.end_of_stream = true;
                    frame
                }
                (_, held) => {
                    if let Some(frame) = held {
                        inner.push_frame(&mut state, frame);
                    }
                    PendingFrame {
                        timestamp_us: presentation_time_us,
                        size: 0,
                        end_of_stream: true,
                    }
                }
            };
            state.ready.push_back(Pending::Frame(last));
        } else {
            state.queued_timestamps.push(presentation_time_us);
            let frame = PendingFrame {
                timestamp_us: presentation_time_us,
                size,
                end_of_stream: false,
            };
            match inner.behavior.eos_mode {
                EosMode::AttachToLastFrame => {
                    if let Some(previous) = state.held.replace(frame) {
                        inner.push_frame(&mut state, previous);
                    }
                }
                EosMode::SeparateEmptyBuffer => inner.push_frame(&mut state, frame),
            }
        }

        state.free_inputs.push_back(index);
        inner.changed.notify_all();
        Ok(())
    }

    fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent> {
        let inner = &self.inner;
        let deadline = Instant::now() + timeout;
        let mut state = lock(&inner.state);
        loop {
            if !state.started {
                return Err(not_started());
            }
            if let Some(limit) = inner.behavior.fail_after_frames {
                if state.frames_out >= limit {
                    return Err(Error::RuntimeDecode("synthetic decoder fault".into()));
                }
            }

            let format_next = matches!(state.ready.front(), Some(Pending::Format(_)));
            let frame_next = matches!(state.ready.front(), Some(Pending::Frame(_)));

            if format_next {
                if let Some(Pending::Format(format)) = state.ready.pop_front() {
                    return Ok(OutputEvent::FormatChanged(format));
                }
            } else if frame_next && !state.free_outputs.is_empty() {
                let index = state.free_outputs.pop_front();
                let frame = state.ready.pop_front();
                if let (Some(index), Some(Pending::Frame(frame))) = (index, frame) {
                    state.in_flight.insert(index, frame.timestamp_us);
                    state.frames_out += 1;
                    return Ok(OutputEvent::Buffer(OutputBuffer {
                        index,
                        size: frame.size,
                        presentation_time_us: frame.timestamp_us,
                        end_of_stream: frame.end_of_stream,
                    }));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(OutputEvent::TryAgainLater);
            }
            state = match inner.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn release_output(&self, index: usize, render: bool) -> Result<()> {
        let mut state = lock(&self.inner.state);
        if !state.started {
            return Err(not_started());
        }
        let timestamp_us = state
            .in_flight
            .remove(&index)
            .ok_or_else(|| Error::RuntimeDecode(format!("output buffer {} is not owned by the client", index)))?;

        state.free_outputs.push_back(index);
        state.released += 1;
        if render {
            state.rendered += 1;
            if let Some(target) = &state.target {
                target.present(timestamp_us);
            }
        }
        self.inner.changed.notify_all();
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = lock(&self.inner.state);
        state.stop_calls += 1;
        if state.started {
            debug!("SyntheticDecoder: Stopped after {} frames", state.frames_out);
        }
        state.started = false;
        state.in_flight.clear();
        self.inner.changed.notify_all();
        Ok(())
    }
}

/// Backend serving [`SyntheticContainer`]s registered under file paths
pub struct SyntheticBackend {
    containers: Mutex<HashMap<PathBuf, SyntheticContainer>>,
    supported_mimes: HashSet<String>,
    behavior: DecoderBehavior,
    decoders: Mutex<Vec<Arc<DecoderInner>>>,
}

impl SyntheticBackend {
    /// Decodes `video/avc` and `video/hevc`
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            supported_mimes: ["video/avc", "video/hevc"].iter().map(|m| m.to_string()).collect(),
            behavior: DecoderBehavior::default(),
            decoders: Mutex::new(Vec::new()),
        }
    }

    pub fn with_behavior(mut self, behavior: DecoderBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, container: SyntheticContainer) {
        lock(&self.containers).insert(path.into(), container);
    }

    /// Stats of the `n`th decoder this backend created
    pub fn decoder_stats(&self, n: usize) -> Option<DecoderStats> {
        lock(&self.decoders).get(n).map(|d| d.stats())
    }

    pub fn decoders_created(&self) -> usize {
        lock(&self.decoders).len()
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaBackend for SyntheticBackend {
    type Target = SyntheticSurface;
    type Demuxer = SyntheticDemuxer;
    type Decoder = SyntheticDecoder;

    fn open_demuxer(&self, path: &Path) -> Result<SyntheticDemuxer> {
        let container = lock(&self.containers)
            .get(path)
            .cloned()
            .ok_or_else(|| Error::SourceOpen {
                path: path.to_path_buf(),
                reason: "no such file".into(),
            })?;
        Ok(SyntheticDemuxer {
            tracks: container.tracks,
            selected: None,
            cursor: 0,
        })
    }

    fn create_decoder(&self, mime: &str) -> Result<SyntheticDecoder> {
        if !self.supported_mimes.contains(&mime.to_ascii_lowercase()) {
            return Err(Error::UnsupportedFormat(mime.to_string()));
        }
        let inner = Arc::new(DecoderInner {
            behavior: self.behavior.clone(),
            state: Mutex::new(DecoderState::default()),
            changed: Condvar::new(),
        });
        lock(&self.decoders).push(Arc::clone(&inner));
        Ok(SyntheticDecoder { inner })
    }
}
