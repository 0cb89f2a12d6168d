//! Data pipeline for LiDAR scenes.
//!
//! - [`Scene`]: labelled points with per-point features
//! - [`Augmentation`]: random scale, rotation, jitter and shift
//! - [`Preprocessor`]: voxel subsampling, kNN crops and normalisation
//! - [`SceneDataset`]: Burn dataset producing crops on access
//! - [`SegmentationBatcher`]: stacks crops into a [`SegmentationBatch`]

mod augmentation;
mod batcher;
mod dataset;
mod preprocess;
mod scene;

pub use augmentation::Augmentation;
pub use batcher::{SegmentationBatch, SegmentationBatcher};
pub use dataset::SceneDataset;
pub use preprocess::{normalize, pad_by_repetition, voxel_subsample, Preprocessor, SceneSample};
pub use scene::Scene;
