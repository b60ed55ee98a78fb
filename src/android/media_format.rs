//! AMediaFormat helpers

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr;

use ndk_sys::*;

use crate::error::{Error, Result};
use crate::format::TrackFormat;

/// Owned `AMediaFormat`, deleted on drop
pub(crate) struct OwnedFormat(*mut AMediaFormat);

impl OwnedFormat {
    /// Take ownership of a format returned by the NDK. `None` for null.
    pub(crate) unsafe fn from_raw(format: *mut AMediaFormat) -> Option<Self> {
        if format.is_null() {
            None
        } else {
            Some(Self(format))
        }
    }

    pub(crate) fn as_ptr(&self) -> *mut AMediaFormat {
        self.0
    }

    /// Build a decoder input format from track metadata
    pub(crate) fn from_track(track: &TrackFormat) -> Result<Self> {
        let mime = track
            .mime
            .as_deref()
            .ok_or_else(|| Error::Configuration("track has no MIME type".into()))?;
        let mime = CString::new(mime).map_err(|e| Error::Configuration(e.to_string()))?;

        unsafe {
            let format = Self::from_raw(AMediaFormat_new())
                .ok_or_else(|| Error::Configuration("AMediaFormat_new failed".into()))?;

            let mime_key = key("mime");
            AMediaFormat_setString(format.0, mime_key.as_ptr(), mime.as_ptr());
            if let Some(width) = track.width {
                set_i32(format.0, "width", width);
            }
            if let Some(height) = track.height {
                set_i32(format.0, "height", height);
            }
            if let Some(size) = track.max_input_size {
                set_i32(format.0, "max-input-size", size);
            }
            for (i, csd) in track.csd.iter().enumerate() {
                let csd_key = key(&format!("csd-{}", i));
                AMediaFormat_setBuffer(format.0, csd_key.as_ptr(), csd.as_ptr() as *const c_void, csd.len());
            }
            Ok(format)
        }
    }

    pub(crate) fn to_track(&self) -> TrackFormat {
        unsafe {
            let mut csd = Vec::new();
            while let Some(blob) = get_buffer(self.0, &format!("csd-{}", csd.len())) {
                csd.push(blob);
            }
            TrackFormat {
                mime: get_string(self.0, "mime"),
                width: get_i32(self.0, "width"),
                height: get_i32(self.0, "height"),
                color_format: get_i32(self.0, "color-format"),
                duration_us: get_i64(self.0, "durationUs"),
                max_input_size: get_i32(self.0, "max-input-size"),
                csd,
            }
        }
    }
}

impl Drop for OwnedFormat {
    fn drop(&mut self) {
        unsafe {
            AMediaFormat_delete(self.0);
        }
    }
}

fn key(name: &str) -> CString {
    // Keys are compile-time constants without interior NULs
    CString::new(name).unwrap_or_default()
}

unsafe fn set_i32(format: *mut AMediaFormat, name: &str, value: i32) {
    let key = key(name);
    AMediaFormat_setInt32(format, key.as_ptr(), value);
}

unsafe fn get_i32(format: *mut AMediaFormat, name: &str) -> Option<i32> {
    let key = key(name);
    let mut value: i32 = 0;
    AMediaFormat_getInt32(format, key.as_ptr(), &mut value).then_some(value)
}

unsafe fn get_i64(format: *mut AMediaFormat, name: &str) -> Option<i64> {
    let key = key(name);
    let mut value: i64 = 0;
    AMediaFormat_getInt64(format, key.as_ptr(), &mut value).then_some(value)
}

unsafe fn get_string(format: *mut AMediaFormat, name: &str) -> Option<String> {
    let key = key(name);
    let mut value: *const c_char = ptr::null();
    if !AMediaFormat_getString(format, key.as_ptr(), &mut value) || value.is_null() {
        return None;
    }
    // The string is owned by the format and only valid until it changes
    Some(CStr::from_ptr(value).to_string_lossy().into_owned())
}

unsafe fn get_buffer(format: *mut AMediaFormat, name: &str) -> Option<Vec<u8>> {
    let key = key(name);
    let mut data: *mut c_void = ptr::null_mut();
    let mut size: usize = 0;
    if !AMediaFormat_getBuffer(format, key.as_ptr(), &mut data, &mut size) || data.is_null() {
        return None;
    }
    Some(std::slice::from_raw_parts(data as *const u8, size).to_vec())
}
