//! Loss functions for point-wise semantic segmentation.
//!
//! This module provides:
//! - Weighted negative log-likelihood with an ignore label
//! - Label-smoothed cross-entropy
//! - Soft dice loss over softmax probabilities

mod segmentation;

pub use segmentation::{LossOutput, SegmentationLoss};
