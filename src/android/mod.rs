//! NDK media backend
//!
//! Pure NDK decoding using AMediaCodec and AMediaExtractor, presenting
//! straight onto the activity's ANativeWindow. No Java, no JNI.

use std::path::Path;

use ndk::native_window::NativeWindow;

use crate::error::Result;
use crate::media::{DisplayTarget, MediaBackend};

pub mod app;
mod codec;
mod extractor;
mod media_format;

pub use codec::NdkDecoder;
pub use extractor::NdkExtractor;

pub struct NdkBackend;

impl MediaBackend for NdkBackend {
    type Target = NativeWindow;
    type Demuxer = NdkExtractor;
    type Decoder = NdkDecoder;

    fn open_demuxer(&self, path: &Path) -> Result<NdkExtractor> {
        NdkExtractor::open(path)
    }

    fn create_decoder(&self, mime: &str) -> Result<NdkDecoder> {
        NdkDecoder::create(mime)
    }
}

impl DisplayTarget for NativeWindow {
    fn target_id(&self) -> u64 {
        self.ptr().as_ptr() as usize as u64
    }

    fn is_valid(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }
}
