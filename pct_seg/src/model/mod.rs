//! Adapter backbone and segmentation model.

mod adapter;
mod segmentation;

pub use adapter::{AdapterOutput, PctAdapter};
pub use segmentation::{ClassificationOutput, SegmentationModel};
