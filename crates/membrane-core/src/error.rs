//! Error types for the membrane simulation.

use thiserror::Error;

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, MembraneError>;

/// Errors that can occur while configuring or running the simulation.
#[derive(Debug, Error)]
pub enum MembraneError {
    /// The domain leaves no interior cells.
    #[error("invalid domain {width}x{height}: both dimensions must be at least 3")]
    InvalidDomain {
        /// Requested width in cells.
        width: usize,
        /// Requested height in cells.
        height: usize,
    },

    /// A configuration value is out of range.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Error message.
        message: String,
    },

    /// A cell coordinate lies outside the grid (or outside the interior
    /// where one is required).
    #[error("cell ({x}, {y}) is not usable in the {width}x{height} domain: {reason}")]
    InvalidCell {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        reason: &'static str,
    },

    /// The compute surface could not be built or an update never completed.
    #[error("compute surface error: {message}")]
    ComputeSurface {
        /// Error message.
        message: String,
    },

    /// More samples were deposited than a batch can hold.
    #[error("capture buffer overflow: a batch holds {capacity} samples")]
    CaptureOverflow {
        /// Batch size.
        capacity: usize,
    },

    /// Audio output failure.
    #[error("audio error: {message}")]
    Audio {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// WAV export failure.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Snapshot export failure.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl MembraneError {
    /// Creates an invalid parameter error.
    pub fn invalid_param(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a compute surface error.
    pub fn compute(message: impl Into<String>) -> Self {
        Self::ComputeSurface {
            message: message.into(),
        }
    }

    /// Creates an audio error.
    pub fn audio(message: impl Into<String>) -> Self {
        Self::Audio {
            message: message.into(),
        }
    }
}
