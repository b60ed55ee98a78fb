//! Android host
//!
//! Copies the bundled clip into app storage and plays it on the activity's
//! native window, rendering every frame as soon as it is decoded.

use std::ffi::CString;
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;

use android_activity::AndroidApp;
use log::{error, info, warn};
use ndk::native_window::NativeWindow;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::platform::android::EventLoopBuilderExtAndroid;
use winit::window::{Window, WindowId};

use super::NdkBackend;
use crate::config::PumpConfig;
use crate::error::{Error, Result};
use crate::format::StreamDescriptor;
use crate::player::{FrameObserver, Player};
use crate::pump::DecodedFrame;

/// Host constants
pub struct AppConfig {
    pub asset_name: &'static str,
    pub log_tag: &'static str,
    pub max_log_level: log::LevelFilter,
}

pub const APP_CONFIG: AppConfig = AppConfig {
    asset_name: "frameCount.mp4",
    log_tag: "FramePump",
    max_log_level: log::LevelFilter::Info,
};

/// Renders every frame and logs the session's progress
#[derive(Default)]
struct RenderObserver {
    frames: u64,
}

impl FrameObserver for RenderObserver {
    fn on_frame_available(&mut self, frame: DecodedFrame) {
        info!(
            "Frame available, pts={}us, EOS={}",
            frame.timestamp_us, frame.end_of_stream
        );
        self.frames += 1;
        if let Err(e) = frame.render() {
            warn!("Failed to render frame: {}", e);
        }
    }

    fn on_format_changed(&mut self, descriptor: &StreamDescriptor) {
        info!(
            "Output is now {}x{} ({})",
            descriptor.width,
            descriptor.height,
            descriptor.color_format_name().unwrap_or("unknown color format")
        );
    }

    fn on_end_of_stream(&mut self) {
        info!("End of stream after {} frames", self.frames);
    }

    fn on_error(&mut self, error: Error) {
        error!("Playback stopped: {}", error);
    }
}

/// Main application state
struct FramePumpApp {
    app: AndroidApp,
    backend: NdkBackend,
    window: Option<Window>,
    player: Option<Player<NdkBackend>>,
}

impl FramePumpApp {
    fn new(app: AndroidApp) -> Self {
        Self {
            app,
            backend: NdkBackend,
            window: None,
            player: None,
        }
    }

    fn release_player(&mut self) {
        release(&mut self.player);
    }
}

impl ApplicationHandler for FramePumpApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        info!("App resumed - creating window");

        let window_attrs = Window::default_attributes().with_title("FramePump");
        match event_loop.create_window(window_attrs) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                error!("Failed to create window: {}", e);
                return;
            }
        }

        // The decoder draws straight into the activity's surface
        match self.app.native_window() {
            Some(window) => start_playback(&self.app, &self.backend, window, &mut self.player),
            None => warn!("Resumed without a native window"),
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        info!("App suspended - releasing decoder");
        self.release_player();
        self.window = None;
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let WindowEvent::CloseRequested = event {
            info!("Close requested");
            self.release_player();
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.release_player();
    }
}

/// Runs the native activity until it exits.
pub fn run(app: AndroidApp) {
    let event_loop = match EventLoop::builder().with_android_app(app.clone()).build() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            error!("Failed to create event loop: {}", e);
            return;
        }
    };

    let mut host = FramePumpApp::new(app);
    if let Err(e) = event_loop.run_app(&mut host) {
        error!("Event loop failed: {}", e);
    }
    info!("FramePump exiting");
}

fn start_playback(
    app: &AndroidApp,
    backend: &NdkBackend,
    window: NativeWindow,
    slot: &mut Option<Player<NdkBackend>>,
) {
    // Without a readable copy of the clip there is nothing to decode
    let video_path = match ensure_video(app) {
        Ok(path) => path,
        Err(e) => {
            error!("Not starting decoder: {}", e);
            return;
        }
    };

    let started = Player::replace(
        slot,
        backend,
        &video_path,
        window,
        RenderObserver::default(),
        PumpConfig::default(),
    )
    .and_then(|player| player.start());

    if let Err(e) = started {
        error!("Failed to start decoder for {}: {}", video_path.display(), e);
        release(slot);
    }
}

fn release(slot: &mut Option<Player<NdkBackend>>) {
    if let Some(mut player) = slot.take() {
        player.release();
    }
}

/// Path of the clip in internal storage, copying it out of the APK assets
/// on first use
fn ensure_video(app: &AndroidApp) -> Result<PathBuf> {
    let dir = app
        .internal_data_path()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no internal data path"))?;
    let path = dir.join(APP_CONFIG.asset_name);
    if !path.exists() {
        copy_asset(app, &dir, &path)?;
    }
    Ok(path)
}

fn copy_asset(app: &AndroidApp, dir: &std::path::Path, dest: &std::path::Path) -> Result<()> {
    let name = CString::new(APP_CONFIG.asset_name)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut asset = app.asset_manager().open(&name).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("asset {} not bundled", APP_CONFIG.asset_name),
        )
    })?;

    fs::create_dir_all(dir)?;
    // Copy under a temporary name so an interrupted copy is never mistaken
    // for the clip
    let partial = dest.with_extension("part");
    let mut out = File::create(&partial)?;
    let bytes = io::copy(&mut asset, &mut out)?;
    out.sync_all()?;
    fs::rename(&partial, dest)?;

    info!("Copied asset {} ({} bytes) to {}", APP_CONFIG.asset_name, bytes, dest.display());
    Ok(())
}
