//! Training infrastructure for point-wise segmentation.
//!
//! This module provides:
//! - `SegmentationTrainer`: epoch loop, optimizer steps and evaluation
//! - Learning rate schedules and optimizer construction
//! - Training metrics, evaluation reports and best-metric tracking

mod metrics;
mod optimizer;
mod trainer;

pub use metrics::{
    BestMetrics, EpochSummary, EvaluationReport, Improvement, StepOutput, TrainMetrics,
    TrainingHistory,
};
pub use optimizer::{adamw_config, learning_rate, sgd_config};
pub use trainer::SegmentationTrainer;
