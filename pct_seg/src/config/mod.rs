//! Configuration types for pct_seg.
//!
//! This module provides Burn-style configuration structs for the model,
//! the data pipeline and training. Every struct serialises to JSON through
//! Burn's `Config` trait.

mod data;
mod model;
mod training;

pub use data::{AugmentationConfig, NormalizeMode, PreprocessConfig};
pub use model::{AdapterConfig, SegmentationConfig, TransformerConfig};
pub use training::{LossConfig, LrSchedule, OptimizerKind, TrainingConfig};
