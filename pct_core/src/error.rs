//! Error types for pct_core operations.

use thiserror::Error;

/// Errors that can occur during geometry and metric computations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// More points were requested than the input provides.
    #[error("requested {requested} points but only {available} are available")]
    NotEnoughPoints {
        /// Number of points requested.
        requested: usize,
        /// Number of points available.
        available: usize,
    },

    /// Two inputs that must be aligned have different lengths.
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        got: usize,
    },

    /// An argument is outside its valid domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for pct_core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::NotEnoughPoints {
            requested: 10,
            available: 5,
        };
        assert_eq!(
            err.to_string(),
            "requested 10 points but only 5 are available"
        );

        let err = CoreError::LengthMismatch {
            expected: 3,
            got: 2,
        };
        assert_eq!(err.to_string(), "length mismatch: expected 3, got 2");

        let err = CoreError::InvalidArgument("k must be positive".to_string());
        assert_eq!(err.to_string(), "invalid argument: k must be positive");
    }

    #[test]
    fn test_error_equality() {
        let a = CoreError::NotEnoughPoints {
            requested: 1,
            available: 0,
        };
        let b = CoreError::NotEnoughPoints {
            requested: 1,
            available: 0,
        };
        assert_eq!(a, b);
        assert_ne!(a, CoreError::InvalidArgument(String::new()));
    }
}
