//! Frame Pump - extract, decode and render a video file on Android
//!
//! A [`FrameSource`] pulls compressed samples out of a container, a
//! [`DecodePump`] pushes them through a platform decoder on its own worker
//! thread, and the host renders or discards each decoded frame. On Android
//! the backend is AMediaExtractor + AMediaCodec drawing into the activity's
//! window; everywhere else the in-memory [`synthetic`] backend stands in.

pub mod config;
pub mod error;
pub mod format;
pub mod media;
pub mod player;
pub mod pump;
pub mod source;
pub mod synthetic;
pub mod target;

#[cfg(target_os = "android")]
pub mod android;

pub use config::PumpConfig;
pub use error::{Error, Result};
pub use format::{StreamDescriptor, TrackFormat};
pub use media::{Decoder, Demuxer, DisplayTarget, MediaBackend, OutputBuffer, OutputEvent};
pub use player::{FrameObserver, Player};
pub use pump::{DecodePump, DecodedFrame, FrameEvents, FrameHandle, PumpEvent, PumpState};
pub use source::{FrameSource, Sample};

/// Android entry point
#[cfg(target_os = "android")]
#[no_mangle]
fn android_main(app: android_activity::AndroidApp) {
    use android::app::APP_CONFIG;

    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(APP_CONFIG.max_log_level)
            .with_tag(APP_CONFIG.log_tag),
    );

    log::info!("FramePump starting...");
    android::app::run(app);
}
