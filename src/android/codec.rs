//! AMediaCodec decoder rendering into an ANativeWindow

use std::ffi::CString;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info};
use ndk::native_window::NativeWindow;
use ndk_sys::*;

use super::media_format::OwnedFormat;
use crate::error::{Error, Result};
use crate::format::TrackFormat;
use crate::media::{Decoder, OutputBuffer, OutputEvent};

pub struct NdkDecoder {
    codec: *mut AMediaCodec,
    mime: String,
    started: AtomicBool,
}

// The synchronous AMediaCodec API may be called from any thread
unsafe impl Send for NdkDecoder {}
unsafe impl Sync for NdkDecoder {}

fn timeout_us(timeout: Duration) -> i64 {
    i64::try_from(timeout.as_micros()).unwrap_or(i64::MAX)
}

impl NdkDecoder {
    pub fn create(mime: &str) -> Result<Self> {
        let mime_cstr = CString::new(mime).map_err(|_| Error::UnsupportedFormat(mime.to_string()))?;
        let codec = unsafe { AMediaCodec_createDecoderByType(mime_cstr.as_ptr()) };
        if codec.is_null() {
            return Err(Error::UnsupportedFormat(mime.to_string()));
        }
        info!("MediaCodec: Created decoder for {}", mime);
        Ok(Self {
            codec,
            mime: mime.to_string(),
            started: AtomicBool::new(false),
        })
    }
}

impl Decoder for NdkDecoder {
    type Target = NativeWindow;

    fn configure(&self, format: &TrackFormat, window: &NativeWindow) -> Result<()> {
        let format = OwnedFormat::from_track(format)?;
        let status = unsafe {
            AMediaCodec_configure(self.codec, format.as_ptr(), window.ptr().as_ptr(), ptr::null_mut(), 0)
        };
        if status.0 != 0 {
            return Err(Error::Configuration(format!("Failed to configure {}: {:?}", self.mime, status.0)));
        }
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let status = unsafe { AMediaCodec_start(self.codec) };
        if status.0 != 0 {
            return Err(Error::Configuration(format!("Failed to start decoder: {:?}", status.0)));
        }
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn dequeue_input(&self, timeout: Duration) -> Result<Option<usize>> {
        let index = unsafe { AMediaCodec_dequeueInputBuffer(self.codec, timeout_us(timeout)) };
        if index >= 0 {
            Ok(Some(index as usize))
        } else if index == AMEDIACODEC_INFO_TRY_AGAIN_LATER as isize {
            Ok(None)
        } else {
            Err(Error::RuntimeDecode(format!("dequeueInputBuffer failed: {}", index)))
        }
    }

    fn with_input_buffer<R>(&self, index: usize, fill: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        let mut buf_size: usize = 0;
        let input_buf = unsafe { AMediaCodec_getInputBuffer(self.codec, index, &mut buf_size) };
        if input_buf.is_null() || buf_size == 0 {
            return Err(Error::RuntimeDecode(format!("No input buffer at index {}", index)));
        }
        // The slot belongs to us until it is queued back
        let buf = unsafe { std::slice::from_raw_parts_mut(input_buf, buf_size) };
        Ok(fill(buf))
    }

    fn queue_input(&self, index: usize, size: usize, presentation_time_us: i64, end_of_stream: bool) -> Result<()> {
        let flags = if end_of_stream {
            AMEDIACODEC_BUFFER_FLAG_END_OF_STREAM as u32
        } else {
            0
        };
        let status = unsafe {
            AMediaCodec_queueInputBuffer(self.codec, index, 0, size, presentation_time_us.max(0) as u64, flags)
        };
        if status.0 != 0 {
            return Err(Error::RuntimeDecode(format!("queueInputBuffer failed: {:?}", status.0)));
        }
        Ok(())
    }

    fn dequeue_output(&self, timeout: Duration) -> Result<OutputEvent> {
        let mut buffer_info = AMediaCodecBufferInfo {
            offset: 0,
            size: 0,
            presentationTimeUs: 0,
            flags: 0,
        };
        let index = unsafe { AMediaCodec_dequeueOutputBuffer(self.codec, &mut buffer_info, timeout_us(timeout)) };

        if index >= 0 {
            return Ok(OutputEvent::Buffer(OutputBuffer {
                index: index as usize,
                size: buffer_info.size.max(0) as usize,
                presentation_time_us: buffer_info.presentationTimeUs,
                end_of_stream: buffer_info.flags & (AMEDIACODEC_BUFFER_FLAG_END_OF_STREAM as u32) != 0,
            }));
        }

        if index == AMEDIACODEC_INFO_OUTPUT_FORMAT_CHANGED as isize {
            let format = unsafe { OwnedFormat::from_raw(AMediaCodec_getOutputFormat(self.codec)) }
                .ok_or_else(|| Error::RuntimeDecode("Output format changed but none reported".into()))?;
            Ok(OutputEvent::FormatChanged(format.to_track()))
        } else if index == AMEDIACODEC_INFO_OUTPUT_BUFFERS_CHANGED as isize
            || index == AMEDIACODEC_INFO_TRY_AGAIN_LATER as isize
        {
            Ok(OutputEvent::TryAgainLater)
        } else {
            Err(Error::RuntimeDecode(format!("dequeueOutputBuffer failed: {}", index)))
        }
    }

    fn release_output(&self, index: usize, render: bool) -> Result<()> {
        let status = unsafe { AMediaCodec_releaseOutputBuffer(self.codec, index, render) };
        if status.0 != 0 {
            return Err(Error::RuntimeDecode(format!("releaseOutputBuffer failed: {:?}", status.0)));
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if !self.started.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let status = unsafe { AMediaCodec_stop(self.codec) };
        if status.0 != 0 {
            return Err(Error::RuntimeDecode(format!("Failed to stop decoder: {:?}", status.0)));
        }
        debug!("MediaCodec: Stopped {}", self.mime);
        Ok(())
    }
}

impl Drop for NdkDecoder {
    fn drop(&mut self) {
        let _ = self.stop();
        unsafe {
            AMediaCodec_delete(self.codec);
        }
    }
}
