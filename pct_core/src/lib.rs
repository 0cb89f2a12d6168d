//! # pct_core
//!
//! Framework-free building blocks for point-cloud semantic segmentation of
//! aerial LiDAR.
//!
//! This crate holds everything the segmentation model needs that does not
//! touch tensors: point types, sampling and neighbour search, the layout of the
//! spatial pyramid, the DALES class table and segmentation metrics.
//!
//! ## Feature Flags
//!
//! - `parallel` (default): Computes neighbour rows in parallel with rayon
//!
//! ## Modules
//!
//! - [`types`]: Core data types (Point3, Bounds3, VoxelCoord)
//! - [`sampling`]: Farthest point sampling
//! - [`neighbors`]: kNN search and three-NN interpolation weights
//! - [`pyramid`]: Token layout of the four pyramid levels
//! - [`labels`]: DALES classes, label remapping, class balancing
//! - [`metrics`]: IoU, accuracy and running averages
//! - [`error`]: Error types
//!
//! ## Usage
//!
//! ```
//! use pct_core::prelude::*;
//!
//! let points: Vec<Point3> = (0..32)
//!     .map(|i| Point3::new(i as f32, (i % 4) as f32, 0.0))
//!     .collect();
//! let centers = farthest_point_sample(&points, 8).unwrap();
//! let center_xyz = gather_points(&points, &centers);
//! let groups = knn(&points, &center_xyz, 4).unwrap();
//! assert_eq!(groups.len(), 8);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod labels;
pub mod metrics;
pub mod neighbors;
pub mod pyramid;
pub mod sampling;
pub mod types;

/// Prelude module for convenient imports.
///
/// Provides the most commonly used types and functions.
pub mod prelude {
    pub use crate::error::CoreError;
    pub use crate::labels::{
        label_histogram, median_frequency_weights, normalize_intensity, remap_label, CLASS_NAMES,
        IGNORE_LABEL, NUM_CLASSES,
    };
    pub use crate::metrics::{intersection_and_union, AreaStats, AverageMeter, SegmentationMeter};
    pub use crate::neighbors::{knn, three_nn_weights, InterpolationTable, NeighborTable};
    pub use crate::pyramid::{PyramidLayout, LEVELS};
    pub use crate::sampling::{farthest_point_sample, gather_points};
    pub use crate::types::{Bounds3, Point3, VoxelCoord};
}

// Re-export everything at crate root for convenience
pub use error::{CoreError, Result};
pub use labels::{
    label_histogram, median_frequency_weights, normalize_intensity, remap_label, CLASS_NAMES,
    IGNORE_LABEL, MAX_INTENSITY, NUM_CLASSES,
};
pub use metrics::{intersection_and_union, AreaStats, AverageMeter, SegmentationMeter};
pub use neighbors::{
    knn, square_distance, three_nn_weights, InterpolationTable, NeighborTable, INTERPOLATION_EPS,
};
pub use pyramid::{PyramidLayout, LEVELS};
pub use sampling::{farthest_point_sample, gather_points};
pub use types::{Bounds3, Point3, VoxelCoord};
