//! # pct_seg
//!
//! Point cloud transformer with spatial-pyramid adapters for semantic
//! segmentation of aerial LiDAR, built on Burn.
//!
//! A plain transformer over FPS/kNN patches is coupled to a four-level
//! spatial pyramid of set-abstraction and local-context stages. Interaction
//! blocks exchange information between the two streams through
//! cross-attention, and a coarse-to-fine decoder turns the fused pyramid
//! features into per-point class log-probabilities.
//!
//! ## Features
//!
//! - **Adapter backbone**: `PctAdapter<B>` with dynamic pyramid prompts
//! - **Segmentation model**: residual feature propagation, global context and classifier
//! - **Losses**: weighted NLL or label-smoothed cross-entropy plus soft dice
//! - **Data pipeline**: DALES scenes, augmentation, voxel subsampling and kNN crops
//! - **Training**: AdamW or SGD with cosine/step schedules and IoU evaluation
//!
//! ## Quick Start
//!
//! ```ignore
//! use pct_seg::prelude::*;
//! use burn::backend::{Autodiff, NdArray};
//!
//! type MyBackend = Autodiff<NdArray>;
//!
//! let device = Default::default();
//! let config = TrainingConfig::default();
//! let mut trainer = SegmentationTrainer::<MyBackend>::new(config, &device)?;
//!
//! let pre = Preprocessor::new(PreprocessConfig::default(), Some(Augmentation::new(AugmentationConfig::default())?))?;
//! let train = SceneDataset::new(scenes, pre, true, 30, 42)?;
//! let history = trainer.fit(train, None)?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! pct_core (geometry, labels, metrics)
//!     │
//!     ▼
//! pct_seg
//!   nn ──► model ──► training
//!   data ─────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - `std` (default): Standard library support
//! - `ndarray` (default): CPU backend using ndarray
//! - `wgpu`: GPU acceleration via WebGPU

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod data;
pub mod error;
pub mod geometry;
pub mod loss;
pub mod model;
pub mod nn;
pub mod training;

// Re-export key types for convenience
pub use config::{SegmentationConfig, TrainingConfig};
pub use error::{PctSegError, Result};
pub use loss::SegmentationLoss;
pub use model::{PctAdapter, SegmentationModel};
pub use training::SegmentationTrainer;

pub use pct_core::Point3;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{
        AdapterConfig, AugmentationConfig, LossConfig, LrSchedule, NormalizeMode, OptimizerKind,
        PreprocessConfig, SegmentationConfig, TrainingConfig, TransformerConfig,
    };
    pub use crate::data::{
        Augmentation, Preprocessor, Scene, SceneDataset, SceneSample, SegmentationBatch,
        SegmentationBatcher,
    };
    pub use crate::error::{PctSegError, Result};
    pub use crate::loss::{LossOutput, SegmentationLoss};
    pub use crate::model::{AdapterOutput, ClassificationOutput, PctAdapter, SegmentationModel};
    pub use crate::training::{
        learning_rate, BestMetrics, EvaluationReport, SegmentationTrainer, StepOutput,
        TrainMetrics, TrainingHistory,
    };

    pub use pct_core::{Point3, CLASS_NAMES, IGNORE_LABEL, NUM_CLASSES};
}
