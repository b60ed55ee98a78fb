//! Track and stream format descriptions
//!
//! Mirrors the handful of `AMediaFormat` keys the pump cares about.

/// MIME prefix shared by every video elementary stream
pub const VIDEO_MIME_PREFIX: &str = "video/";

/// Metadata for one track, read from the container or from the decoder's
/// output format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackFormat {
    pub mime: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub color_format: Option<i32>,
    pub duration_us: Option<i64>,
    pub max_input_size: Option<i32>,
    /// Codec-specific data blobs (`csd-0`, `csd-1`, ...) in key order
    pub csd: Vec<Vec<u8>>,
}

impl TrackFormat {
    pub fn with_mime(mime: impl Into<String>) -> Self {
        Self {
            mime: Some(mime.into()),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, width: i32, height: i32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn is_video(&self) -> bool {
        self.mime.as_deref().map_or(false, is_video_mime)
    }
}

/// Case-insensitive `video/` prefix match
pub fn is_video_mime(mime: &str) -> bool {
    mime.get(..VIDEO_MIME_PREFIX.len())
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case(VIDEO_MIME_PREFIX))
}

/// The selected video track and its negotiated format.
///
/// Starts from the container's track format and is updated whenever the
/// decoder reports an output format change.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub track_index: usize,
    pub mime: String,
    pub width: i32,
    pub height: i32,
    pub color_format: Option<i32>,
    pub duration_us: Option<i64>,
    /// Container format as selected, handed to the decoder on configure
    pub track_format: TrackFormat,
}

impl StreamDescriptor {
    pub fn from_track(track_index: usize, mime: String, format: TrackFormat) -> Self {
        Self {
            track_index,
            mime,
            width: format.width.unwrap_or(0),
            height: format.height.unwrap_or(0),
            color_format: format.color_format,
            duration_us: format.duration_us,
            track_format: format,
        }
    }

    /// Fold a decoder output format into the descriptor. Keys the decoder
    /// leaves out keep their previous values.
    pub fn apply_output_format(&mut self, format: &TrackFormat) {
        if let Some(width) = format.width {
            self.width = width;
        }
        if let Some(height) = format.height {
            self.height = height;
        }
        if format.color_format.is_some() {
            self.color_format = format.color_format;
        }
    }

    pub fn color_format_name(&self) -> Option<&'static str> {
        self.color_format.and_then(color_format_name)
    }
}

/// `MediaCodecInfo.CodecCapabilities` color format codes
const COLOR_FORMAT_NAMES: &[(i32, &str)] = &[
    (1, "COLOR_FormatMonochrome"),
    (2, "COLOR_Format8bitRGB332"),
    (3, "COLOR_Format12bitRGB444"),
    (4, "COLOR_Format16bitARGB4444"),
    (5, "COLOR_Format16bitARGB1555"),
    (6, "COLOR_Format16bitRGB565"),
    (7, "COLOR_Format16bitBGR565"),
    (8, "COLOR_Format18bitRGB666"),
    (9, "COLOR_Format18bitARGB1665"),
    (10, "COLOR_Format19bitARGB1666"),
    (11, "COLOR_Format24bitRGB888"),
    (12, "COLOR_Format24bitBGR888"),
    (13, "COLOR_Format24bitARGB1887"),
    (14, "COLOR_Format25bitARGB1888"),
    (15, "COLOR_Format32bitBGRA8888"),
    (16, "COLOR_Format32bitARGB8888"),
    (17, "COLOR_FormatYUV411Planar"),
    (18, "COLOR_FormatYUV411PackedPlanar"),
    (19, "COLOR_FormatYUV420Planar"),
    (20, "COLOR_FormatYUV420PackedPlanar"),
    (21, "COLOR_FormatYUV420SemiPlanar"),
    (22, "COLOR_FormatYUV422Planar"),
    (23, "COLOR_FormatYUV422PackedPlanar"),
    (24, "COLOR_FormatYUV422SemiPlanar"),
    (25, "COLOR_FormatYCbYCr"),
    (26, "COLOR_FormatYCrYCb"),
    (27, "COLOR_FormatCbYCrY"),
    (28, "COLOR_FormatCrYCbY"),
    (29, "COLOR_FormatYUV444Interleaved"),
    (30, "COLOR_FormatRawBayer8bit"),
    (31, "COLOR_FormatRawBayer10bit"),
    (32, "COLOR_FormatRawBayer8bitcompressed"),
    (33, "COLOR_FormatL2"),
    (34, "COLOR_FormatL4"),
    (35, "COLOR_FormatL8"),
    (36, "COLOR_FormatL16"),
    (37, "COLOR_FormatL24"),
    (38, "COLOR_FormatL32"),
    (39, "COLOR_FormatYUV420PackedSemiPlanar"),
    (40, "COLOR_FormatYUV422PackedSemiPlanar"),
    (41, "COLOR_Format18BitBGR666"),
    (42, "COLOR_Format24BitARGB6666"),
    (43, "COLOR_Format24BitABGR6666"),
    (0x7f00_0100, "COLOR_TI_FormatYUV420PackedSemiPlanar"),
    (0x7f00_0789, "COLOR_FormatSurface"),
    (0x7f00_a000, "COLOR_Format32bitABGR8888"),
    (0x7f36_a888, "COLOR_FormatRGBAFlexible"),
    (0x7f36_b888, "COLOR_FormatRGBFlexible"),
    (0x7f42_0888, "COLOR_FormatYUV420Flexible"),
    (0x7f42_2888, "COLOR_FormatYUV422Flexible"),
    (0x7f44_4888, "COLOR_FormatYUV444Flexible"),
    (0x7fa3_0c00, "COLOR_QCOM_FormatYUV420SemiPlanar"),
    (0x7fa3_0c03, "QOMX_COLOR_FormatYUV420PackedSemiPlanar64x32Tile2m8ka"),
];

/// Human-readable name for a decoder color format code, if known
pub fn color_format_name(code: i32) -> Option<&'static str> {
    COLOR_FORMAT_NAMES
        .iter()
        .find(|(value, _)| *value == code)
        .map(|(_, name)| *name)
}
