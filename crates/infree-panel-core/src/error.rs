//! Error types for the infree panel core library.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the command channel and its collaborators.
#[derive(Error, Debug)]
pub enum Error {
    /// Serial port not found at the given path.
    #[error("Serial device not found at {0}")]
    PortNotFound(String),

    /// Serial port communication error.
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error (serial stream, sysfs, framebuffer device).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device did not acknowledge a frame in time.
    #[error("No acknowledgement within {0:?}")]
    AckTimeout(Duration),

    /// Frame body too large for the wire format.
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// Invalid colour string.
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// Image decode error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
