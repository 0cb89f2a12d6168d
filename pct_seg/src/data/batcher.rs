//! Stacking crops into tensors.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use super::preprocess::SceneSample;

/// A batch of crops ready for the model.
#[derive(Debug, Clone)]
pub struct SegmentationBatch<B: Backend> {
    /// Coordinates `[batch, points, 3]`.
    pub xyz: Tensor<B, 3>,
    /// Features `[batch, points, feature_channels]`.
    pub features: Tensor<B, 3>,
    /// Labels `[batch, points]`.
    pub labels: Tensor<B, 2, Int>,
}

impl<B: Backend> SegmentationBatch<B> {
    /// Batch size.
    pub fn batch_size(&self) -> usize {
        self.xyz.dims()[0]
    }

    /// Points per crop.
    pub fn num_points(&self) -> usize {
        self.xyz.dims()[1]
    }
}

/// Batcher holding the target device.
#[derive(Clone, Debug)]
pub struct SegmentationBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> SegmentationBatcher<B> {
    /// Create a batcher for `device`.
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<SceneSample, SegmentationBatch<B>> for SegmentationBatcher<B> {
    fn batch(&self, items: Vec<SceneSample>) -> SegmentationBatch<B> {
        let batch = items.len();
        // Crops share a size; the shortest one bounds the batch otherwise.
        let n = items.iter().map(SceneSample::len).min().unwrap_or(0);
        if items.iter().any(|s| s.len() != n) {
            log::warn!("batching crops of unequal size, truncating to {n} points");
        }
        let channels = items
            .first()
            .and_then(|s| s.features.first())
            .map_or(0, Vec::len);

        let xyz: Vec<f32> = items
            .iter()
            .flat_map(|s| s.coords[..n].iter().flat_map(|p| p.as_array()))
            .collect();
        let features: Vec<f32> = items
            .iter()
            .flat_map(|s| s.features[..n].iter().flat_map(|f| f.iter().copied()))
            .collect();
        let labels: Vec<i64> = items
            .iter()
            .flat_map(|s| s.labels[..n].iter().map(|&l| l as i64))
            .collect();

        SegmentationBatch {
            xyz: Tensor::from_data(TensorData::new(xyz, [batch, n, 3]), &self.device),
            features: Tensor::from_data(TensorData::new(features, [batch, n, channels]), &self.device),
            labels: Tensor::from_data(TensorData::new(labels, [batch, n]), &self.device),
        }
    }
}
