//! Platform media service contracts
//!
//! The pump never touches codec or container internals. It talks to a
//! demuxer and a decoder through these traits, mirroring the synchronous
//! `AMediaExtractor` / `AMediaCodec` APIs.

use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::format::TrackFormat;

/// A renderable surface decoded frames are presented on.
pub trait DisplayTarget: Clone + Send + Sync + 'static {
    /// Stable identity of the underlying surface, used to keep a single pump
    /// per target
    fn target_id(&self) -> u64;

    /// Whether the surface can still accept frames
    fn is_valid(&self) -> bool;
}

/// An opened container.
pub trait Demuxer: Send + 'static {
    fn track_count(&self) -> usize;

    fn track_format(&self, index: usize) -> Result<TrackFormat>;

    fn select_track(&mut self, index: usize) -> Result<()>;

    /// Copy the current sample of the selected track into `buf`. Returns
    /// `None` once the track is exhausted.
    fn read_sample(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Presentation time of the current sample in microseconds
    fn sample_time(&self) -> i64;

    /// Move to the next sample; `false` when there is none
    fn advance(&mut self) -> bool;
}

/// One completed output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBuffer {
    pub index: usize,
    pub size: usize,
    pub presentation_time_us: i64,
    pub end_of_stream: bool,
}

/// Result of polling the decoder's output queue
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Buffer(OutputBuffer),
    FormatChanged(TrackFormat),
    TryAgainLater,
}

/// A started decoder instance.
///
/// All methods take `&self`: output buffers are released from whichever
/// thread the host picks while the worker keeps dequeuing.
pub trait Decoder: Send + Sync + 'static {
    type Target: DisplayTarget;

    fn configure(&self, format: &TrackFormat, target: &Self::Target) -> Result<()>;

    fn start(&self) -> Result<()>;

    /// Wait up to `timeout` for a free input slot
    fn dequeue_input(&self, timeout: Duration) -> Result<Option<usize>>;

    /// Run `fill` against the writable memory of input slot `index`
    fn with_input_buffer<R>(&self, index: usize, fill: impl FnOnce(&mut [u8]) -> R) -> Result<R>;

    fn queue_input(
        &self,
        index: usize,
        size: usize,
        presentation_time_us: i64,
        end_of_stream: bool,
    ) -> Result<()>;

    /// Wait up to `timeout` for a completed output slot or a format change
    fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent>;

    /// Hand output slot `index` back, presenting it on the target first if
    /// `render` is set
    fn release_output(&self, index: usize, render: bool) -> Result<()>;

    /// Stop the codec. Must tolerate being called on a stopped decoder.
    fn stop(&self) -> Result<()>;
}

/// Factory for the platform services a session needs.
pub trait MediaBackend {
    type Target: DisplayTarget;
    type Demuxer: Demuxer;
    type Decoder: Decoder<Target = Self::Target>;

    fn open_demuxer(&self, path: &Path) -> Result<Self::Demuxer>;

    /// Fails with `Error::UnsupportedFormat` when nothing can decode `mime`
    fn create_decoder(&self, mime: &str) -> Result<Self::Decoder>;
}
