use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while reading the coin line or driving the indicator.
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unexpected GPIO value {value:?} in {path}")]
    BadValue { path: PathBuf, value: String },
}

/// Failure of a single capture attempt. Always recoverable: the session
/// retries the same shot on the next countdown cycle.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera device {0} is not available")]
    DeviceUnavailable(PathBuf),

    #[error("camera command `{command}` failed: {detail}")]
    Command { command: String, detail: String },

    #[error("camera produced an unreadable frame: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failure handing a composite to the print spooler. Logged, never retried.
#[derive(Debug, Error)]
pub enum PrintError {
    #[error("print command `{command}` failed: {detail}")]
    Command { command: String, detail: String },

    #[error("print spooler accepted the job but reported no job id: {0:?}")]
    MissingJobId(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Geometry cannot be computed for the requested strip.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("a strip needs at least one photo")]
    NoShots,

    #[error("source photo has zero width or height")]
    EmptySource,

    #[error("canvas {width}x{height} leaves no room for {count} photos")]
    NoRoom { width: u32, height: u32, count: usize },
}
