//! Error types for the frame pump.

use std::path::PathBuf;

use crate::pump::PumpState;

/// Errors raised while opening, configuring or running a decode session.
///
/// Everything up to [`Error::InvalidState`] is reported synchronously by
/// `configure`/`run`. [`Error::RuntimeDecode`] only ever arrives on the event
/// channel once the worker is running.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to open {path}: {reason}")]
    SourceOpen { path: PathBuf, reason: String },

    #[error("no video track found in {0}")]
    NoVideoTrack(PathBuf),

    #[error("no decoder available for MIME type {0}")]
    UnsupportedFormat(String),

    #[error("decoder configuration failed: {0}")]
    Configuration(String),

    #[error("display target is no longer available")]
    TargetUnavailable,

    #[error("display target {0:#x} is already driven by another pump")]
    TargetInUse(u64),

    #[error("decode pump is already running")]
    AlreadyRunning,

    #[error("cannot {op} while pump is {state:?}")]
    InvalidState { op: &'static str, state: PumpState },

    #[error("decode failed: {0}")]
    RuntimeDecode(String),

    #[error("output buffer {index} released twice")]
    DoubleRelease { index: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
