//! Labelled LiDAR scenes.

use pct_core::{label_histogram, normalize_intensity, remap_label, Bounds3, Point3};

use crate::error::{PctSegError, Result};

/// A labelled point cloud with per-point features.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    /// Point positions.
    pub coords: Vec<Point3>,
    /// Per-point feature vectors, all of the same length.
    pub features: Vec<Vec<f32>>,
    /// Per-point training labels.
    pub labels: Vec<u8>,
}

impl Scene {
    /// Create a scene, checking that all per-point arrays agree.
    pub fn new(coords: Vec<Point3>, features: Vec<Vec<f32>>, labels: Vec<u8>) -> Result<Self> {
        let n = coords.len();
        if features.len() != n || labels.len() != n {
            return Err(PctSegError::InvalidData(format!(
                "scene has {n} points, {} feature rows and {} labels",
                features.len(),
                labels.len()
            )));
        }
        if let Some(first) = features.first() {
            let channels = first.len();
            if features.iter().any(|f| f.len() != channels) {
                return Err(PctSegError::InvalidData(
                    "feature rows have different lengths".into(),
                ));
            }
        }
        Ok(Self {
            coords,
            features,
            labels,
        })
    }

    /// Build a scene from raw DALES columns.
    ///
    /// Intensity is clipped and scaled to `[0, 1]`; raw class ids are remapped
    /// to training labels with unknown points ignored.
    pub fn from_raw_dales(coords: Vec<Point3>, intensity: &[f32], raw_labels: &[u32]) -> Result<Self> {
        let features = intensity
            .iter()
            .map(|&i| vec![normalize_intensity(i)])
            .collect();
        let labels = raw_labels.iter().map(|&l| remap_label(l)).collect();
        Self::new(coords, features, labels)
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Feature channels per point.
    pub fn feature_channels(&self) -> usize {
        self.features.first().map_or(0, Vec::len)
    }

    /// Bounding box of the scene.
    pub fn bounds(&self) -> Option<Bounds3> {
        Bounds3::from_points(&self.coords)
    }

    /// Per-class point counts.
    pub fn label_histogram(&self, num_classes: usize) -> Vec<u64> {
        label_histogram(&self.labels, num_classes)
    }

    /// Copy of the points at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            coords: indices.iter().map(|&i| self.coords[i]).collect(),
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pct_core::IGNORE_LABEL;

    #[test]
    fn test_from_raw_dales() {
        let coords = vec![Point3::splat(0.0), Point3::splat(1.0), Point3::splat(2.0)];
        let scene = Scene::from_raw_dales(coords, &[-5.0, 30000.0, 90000.0], &[0, 1, 8]).unwrap();

        assert_eq!(scene.labels, vec![IGNORE_LABEL, 0, 7]);
        assert_eq!(scene.features, vec![vec![0.0], vec![0.5], vec![1.0]]);
        assert_eq!(scene.feature_channels(), 1);
        assert_eq!(scene.label_histogram(8)[0], 1);
    }

    #[test]
    fn test_length_mismatch() {
        let coords = vec![Point3::splat(0.0); 2];
        assert!(matches!(
            Scene::from_raw_dales(coords, &[1.0], &[1, 2]),
            Err(PctSegError::InvalidData(_))
        ));
    }

    #[test]
    fn test_ragged_features() {
        let coords = vec![Point3::splat(0.0); 2];
        let features = vec![vec![1.0], vec![1.0, 2.0]];
        assert!(Scene::new(coords, features, vec![0, 0]).is_err());
    }

    #[test]
    fn test_select() {
        let coords: Vec<_> = (0..4).map(|i| Point3::splat(i as f32)).collect();
        let scene = Scene::new(coords, vec![vec![0.0]; 4], vec![0, 1, 2, 3]).unwrap();
        let picked = scene.select(&[3, 1, 1]);
        assert_eq!(picked.labels, vec![3, 1, 1]);
        assert_eq!(picked.coords[0], Point3::splat(3.0));
    }
}
