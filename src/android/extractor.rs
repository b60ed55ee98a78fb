//! AMediaExtractor demuxer

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use log::info;
use ndk_sys::*;

use super::media_format::OwnedFormat;
use crate::error::{Error, Result};
use crate::format::TrackFormat;
use crate::media::Demuxer;

pub struct NdkExtractor {
    extractor: *mut AMediaExtractor,
    // Backs the extractor's data source fd
    _file: File,
}

// AMediaExtractor is only ever used from the thread that owns it
unsafe impl Send for NdkExtractor {}

impl NdkExtractor {
    pub fn open(path: &Path) -> Result<Self> {
        let open_error = |reason: String| Error::SourceOpen {
            path: path.to_path_buf(),
            reason,
        };

        info!("MediaExtractor: Opening {}", path.display());
        let file = File::open(path).map_err(|e| open_error(e.to_string()))?;
        let fd = file.as_raw_fd();
        let file_len = file.metadata().map(|m| m.len() as i64).unwrap_or(i64::MAX);

        unsafe {
            let extractor = AMediaExtractor_new();
            if extractor.is_null() {
                return Err(open_error("Failed to create AMediaExtractor".into()));
            }

            let status = AMediaExtractor_setDataSourceFd(extractor, fd, 0, file_len);
            if status.0 != 0 {
                AMediaExtractor_delete(extractor);
                return Err(open_error(format!("Failed to set data source: {:?}", status.0)));
            }

            Ok(Self {
                extractor,
                _file: file,
            })
        }
    }
}

impl Demuxer for NdkExtractor {
    fn track_count(&self) -> usize {
        unsafe { AMediaExtractor_getTrackCount(self.extractor) as usize }
    }

    fn track_format(&self, index: usize) -> Result<TrackFormat> {
        let format = unsafe { OwnedFormat::from_raw(AMediaExtractor_getTrackFormat(self.extractor, index)) }
            .ok_or_else(|| Error::RuntimeDecode(format!("No format for track {}", index)))?;
        Ok(format.to_track())
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        let status = unsafe { AMediaExtractor_selectTrack(self.extractor, index) };
        if status.0 != 0 {
            return Err(Error::RuntimeDecode(format!("Failed to select track: {:?}", status.0)));
        }
        Ok(())
    }

    fn read_sample(&mut self, buf: &mut [u8]) -> Option<usize> {
        let sample_size = unsafe { AMediaExtractor_readSampleData(self.extractor, buf.as_mut_ptr(), buf.len()) };
        usize::try_from(sample_size).ok()
    }

    fn sample_time(&self) -> i64 {
        unsafe { AMediaExtractor_getSampleTime(self.extractor) }
    }

    fn advance(&mut self) -> bool {
        unsafe { AMediaExtractor_advance(self.extractor) }
    }
}

impl Drop for NdkExtractor {
    fn drop(&mut self) {
        unsafe {
            AMediaExtractor_delete(self.extractor);
        }
    }
}
