//! Error types for equalization runs.

use thiserror::Error;

/// Errors that can occur while decoding, validating, or equalizing an image.
#[derive(Debug, Error)]
pub enum Error {
    /// The input file could not be opened or its header could not be parsed.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A configuration value is out of range or unrecognized.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A compute program failed to compile. `log` carries the backend's build log.
    #[error("Failed to build device program '{program}': {log}")]
    DeviceBuildFailure { program: String, log: String },

    /// A dispatch or buffer transfer failed on the device.
    #[error("Device runtime failure: {0}")]
    DeviceRuntimeFailure(String),

    /// Channel buffers handed to the merger do not agree with each other or the layout.
    #[error("Channel mismatch: {0}")]
    ChannelMismatch(String),

    /// The equalized image could not be written.
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl Error {
    /// True for errors raised by the compute backend.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Error::DeviceBuildFailure { .. } | Error::DeviceRuntimeFailure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
