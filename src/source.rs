//! Frame source: first video track of a container, read sample by sample.

use std::path::Path;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::format::{StreamDescriptor, TrackFormat};
use crate::media::{Demuxer, MediaBackend};

/// One compressed access unit copied into a caller buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub size: usize,
    pub timestamp_us: i64,
}

/// Pull-based reader over the selected video track
pub struct FrameSource<D: Demuxer> {
    demuxer: Option<D>,
    descriptor: StreamDescriptor,
    exhausted: bool,
    last_timestamp_us: Option<i64>,
    samples_read: u64,
}

/// Index and format of the first track whose MIME type is `video/*`
pub fn find_video_track<D: Demuxer>(demuxer: &D) -> Option<(usize, String, TrackFormat)> {
    for index in 0..demuxer.track_count() {
        let format = match demuxer.track_format(index) {
            Ok(format) => format,
            Err(e) => {
                warn!("Track {}: unreadable format: {}", index, e);
                continue;
            }
        };
        info!("Track {}: {}", index, format.mime.as_deref().unwrap_or("<no mime>"));
        if format.is_video() {
            let mime = format.mime.clone().unwrap_or_default();
            return Some((index, mime, format));
        }
    }
    None
}

impl<D: Demuxer> FrameSource<D> {
    pub fn open<B>(backend: &B, path: &Path) -> Result<Self>
    where
        B: MediaBackend<Demuxer = D>,
    {
        let demuxer = backend.open_demuxer(path)?;
        info!("FrameSource: Found {} tracks in {}", demuxer.track_count(), path.display());

        let (index, mime, format) =
            find_video_track(&demuxer).ok_or_else(|| Error::NoVideoTrack(path.to_path_buf()))?;
        Self::with_track(demuxer, index, mime, format)
    }

    fn with_track(mut demuxer: D, index: usize, mime: String, format: TrackFormat) -> Result<Self> {
        demuxer.select_track(index)?;
        let descriptor = StreamDescriptor::from_track(index, mime, format);
        info!(
            "FrameSource: Selected track {} ({} {}x{})",
            index, descriptor.mime, descriptor.width, descriptor.height
        );

        Ok(Self {
            demuxer: Some(demuxer),
            descriptor,
            exhausted: false,
            last_timestamp_us: None,
            samples_read: 0,
        })
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn samples_read(&self) -> u64 {
        self.samples_read
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Copy the next sample into `buf`. `None` once the track is exhausted
    /// or the source is closed.
    pub fn next_sample(&mut self, buf: &mut [u8]) -> Option<Sample> {
        if self.exhausted {
            return None;
        }
        let demuxer = self.demuxer.as_mut()?;

        let Some(size) = demuxer.read_sample(buf) else {
            debug!("FrameSource: End of track after {} samples", self.samples_read);
            self.exhausted = true;
            return None;
        };
        let timestamp_us = demuxer.sample_time();

        if let Some(last) = self.last_timestamp_us {
            if timestamp_us < last {
                warn!("FrameSource: Timestamp went backwards ({} -> {})", last, timestamp_us);
            }
        }
        self.last_timestamp_us = Some(timestamp_us);
        self.samples_read += 1;

        Some(Sample { size, timestamp_us })
    }

    /// Move past the sample just read. No-op once exhausted.
    pub fn advance(&mut self) {
        if self.exhausted {
            return;
        }
        if let Some(demuxer) = self.demuxer.as_mut() {
            demuxer.advance();
        }
    }

    pub fn close(&mut self) {
        if self.demuxer.take().is_some() {
            debug!("FrameSource: Closed after {} samples", self.samples_read);
        }
    }
}

impl<D: Demuxer> Drop for FrameSource<D> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticBackend, SyntheticContainer, SyntheticTrack};
    use std::path::PathBuf;

    fn backend_with(path: &str, container: SyntheticContainer) -> SyntheticBackend {
        let backend = SyntheticBackend::new();
        backend.insert(path, container);
        backend
    }

    #[test]
    fn selects_first_video_track() {
        let container = SyntheticContainer::new()
            .with_track(SyntheticTrack::new(TrackFormat::with_mime("audio/mp4a-latm")))
            .with_track(SyntheticTrack::frames("Video/AVC", 3, 33_000))
            .with_track(SyntheticTrack::frames("video/hevc", 3, 33_000));
        let backend = backend_with("/clip.mp4", container);

        let source = FrameSource::open(&backend, Path::new("/clip.mp4")).unwrap();
        assert_eq!(source.descriptor().track_index, 1);
        assert_eq!(source.descriptor().mime, "Video/AVC");
    }

    #[test]
    fn no_video_track_is_rejected() {
        let container = SyntheticContainer::new()
            .with_track(SyntheticTrack::new(TrackFormat::with_mime("audio/opus")))
            .with_track(SyntheticTrack::new(TrackFormat::default()));
        let backend = backend_with("/audio.mka", container);

        match FrameSource::open(&backend, Path::new("/audio.mka")) {
            Err(Error::NoVideoTrack(path)) => assert_eq!(path, PathBuf::from("/audio.mka")),
            other => panic!("expected NoVideoTrack, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn missing_container_fails_to_open() {
        let backend = SyntheticBackend::new();
        let result = FrameSource::open(&backend, Path::new("/nowhere.mp4"));
        assert!(matches!(result, Err(Error::SourceOpen { .. })));
    }

    #[test]
    fn reads_every_sample_once_then_stops() {
        let container = SyntheticContainer::new().with_track(SyntheticTrack::frames("video/avc", 4, 40_000));
        let backend = backend_with("/four.mp4", container);
        let mut source = FrameSource::open(&backend, Path::new("/four.mp4")).unwrap();

        let mut buf = vec![0u8; 64];
        let mut timestamps = Vec::new();
        while let Some(sample) = source.next_sample(&mut buf) {
            assert!(sample.size > 0);
            timestamps.push(sample.timestamp_us);
            source.advance();
        }

        assert_eq!(timestamps, vec![0, 40_000, 80_000, 120_000]);
        assert_eq!(source.samples_read(), 4);
        assert!(source.is_exhausted());

        // Advancing or reading past the end stays put
        source.advance();
        assert_eq!(source.next_sample(&mut buf), None);
    }

    #[test]
    fn close_is_idempotent() {
        let container = SyntheticContainer::new().with_track(SyntheticTrack::frames("video/avc", 2, 33_000));
        let backend = backend_with("/two.mp4", container);
        let mut source = FrameSource::open(&backend, Path::new("/two.mp4")).unwrap();

        source.close();
        source.close();
        let mut buf = vec![0u8; 16];
        assert_eq!(source.next_sample(&mut buf), None);
    }
}
