//! Error types for pct_seg.

use thiserror::Error;

/// Errors that can occur while building, feeding or training the segmentation model.
#[derive(Error, Debug)]
pub enum PctSegError {
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Tensor shape mismatch.
    #[error("tensor shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        got: Vec<usize>,
    },

    /// Geometry or metric failure from pct_core.
    #[error("geometry error: {0}")]
    Core(#[from] pct_core::CoreError),

    /// Training error.
    #[error("training error: {message}")]
    TrainingError {
        /// Description of the error.
        message: String,
    },

    /// Invalid or corrupted data.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl PctSegError {
    /// Shorthand for [`PctSegError::InvalidConfig`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Result type for pct_seg operations.
pub type Result<T> = std::result::Result<T, PctSegError>;
