//! Point-wise segmentation model on top of the adapter backbone.

use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{leaky_relu, log_softmax};

use crate::config::SegmentationConfig;
use crate::data::SegmentationBatch;
use crate::error::{PctSegError, Result};
use crate::loss::{LossOutput, SegmentationLoss};
use crate::nn::{ResidualPropagation, ResidualPropagationConfig};

use super::adapter::{AdapterOutput, PctAdapter};

const CONTEXT_DIM: usize = 64;
const CONTEXT_MAPS: usize = 5;
const HEAD_HIDDEN: usize = 128;
const HEAD_SLOPE: f64 = 0.01;

impl SegmentationConfig {
    /// Initialize the full segmentation model.
    ///
    /// # Errors
    ///
    /// Returns [`PctSegError::InvalidConfig`] when [`SegmentationConfig::validate`] fails.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SegmentationModel<B>> {
        let backbone = self.init_adapter(device)?;
        let dim = self.dim();

        let decoders = [2 * dim, 2 * dim, 2 * dim, dim]
            .into_iter()
            .map(|in_channels| ResidualPropagationConfig::new(in_channels, dim).init(device))
            .collect();
        let context = (0..CONTEXT_MAPS)
            .map(|_| LinearConfig::new(dim, CONTEXT_DIM).init(device))
            .collect();

        log::debug!(
            "segmentation model: dim {dim}, {} classes, {} feature channels",
            self.num_classes,
            self.feature_channels
        );

        Ok(SegmentationModel {
            backbone,
            decoders,
            context,
            context_fuse: LinearConfig::new(CONTEXT_MAPS * CONTEXT_DIM, CONTEXT_DIM).init(device),
            head_hidden: LinearConfig::new(dim + CONTEXT_DIM, HEAD_HIDDEN).init(device),
            head_dropout: DropoutConfig::new(self.head_dropout).init(),
            classifier: LinearConfig::new(HEAD_HIDDEN, self.num_classes).init(device),
        })
    }
}

/// Output of [`SegmentationModel::forward_classification`].
#[derive(Debug, Clone)]
pub struct ClassificationOutput<B: Backend> {
    /// Loss terms.
    pub loss: LossOutput<B>,
    /// Log-probabilities `[batch, points, classes]`.
    pub log_probs: Tensor<B, 3>,
    /// Labels `[batch, points]`.
    pub targets: Tensor<B, 2, Int>,
}

/// Adapter backbone, coarse-to-fine decoder, global context and classifier.
#[derive(Module, Debug)]
pub struct SegmentationModel<B: Backend> {
    backbone: PctAdapter<B>,
    decoders: Vec<ResidualPropagation<B>>,
    context: Vec<Linear<B>>,
    context_fuse: Linear<B>,
    head_hidden: Linear<B>,
    head_dropout: Dropout,
    classifier: Linear<B>,
}

impl<B: Backend> SegmentationModel<B> {
    /// Log-probabilities `[batch, points, classes]`.
    pub fn forward(&self, xyz: Tensor<B, 3>, features: Tensor<B, 3>) -> Result<Tensor<B, 3>> {
        let n = xyz.dims()[1];
        let out = self.backbone.forward(xyz, features)?;
        let (x, maps) = self.decode(out)?;

        let pooled = maps
            .into_iter()
            .zip(&self.context)
            .map(|(m, linear)| leaky_relu(linear.forward(m), HEAD_SLOPE).max_dim(1))
            .collect();
        let context = leaky_relu(self.context_fuse.forward(Tensor::cat(pooled, 2)), HEAD_SLOPE);
        let context = context.repeat_dim(1, n);

        let x = Tensor::cat(vec![x, context], 2);
        let x = self.head_dropout.forward(self.head_hidden.forward(x));
        Ok(log_softmax(self.classifier.forward(x), 2))
    }

    /// Decode the adapter levels down to the input cloud.
    ///
    /// Returns the dense features and the maps pooled into the global
    /// context: the adapter levels `c4, c3, c2, c1` followed by the dense
    /// features.
    fn decode(&self, out: AdapterOutput<B>) -> Result<(Tensor<B, 3>, Vec<Tensor<B, 3>>)> {
        // Coarse to fine: c4, c3, c2, c1.
        let mut maps: Vec<Tensor<B, 3>> = out.levels.into_iter().rev().collect();
        if maps.len() + 1 != out.points.len() || self.decoders.len() != maps.len() {
            return Err(PctSegError::ShapeMismatch {
                expected: vec![self.decoders.len(), self.decoders.len() + 1],
                got: vec![maps.len(), out.points.len()],
            });
        }

        let mut x = maps[0].clone();
        for (i, decoder) in self.decoders.iter().enumerate() {
            x = decoder.forward(&out.points[i + 1], &out.points[i], x, maps.get(i + 1).cloned())?;
        }
        maps.push(x.clone());
        Ok((x, maps))
    }

    /// Forward pass with loss against the batch labels.
    pub fn forward_classification(
        &self,
        batch: SegmentationBatch<B>,
        loss: &SegmentationLoss,
    ) -> Result<ClassificationOutput<B>> {
        let log_probs = self.forward(batch.xyz, batch.features)?;
        let loss = loss.forward_batch(log_probs.clone(), batch.labels.clone());
        Ok(ClassificationOutput {
            loss,
            log_probs,
            targets: batch.labels,
        })
    }

    /// Most likely class per point, `[batch, points]`.
    pub fn predict(&self, xyz: Tensor<B, 3>, features: Tensor<B, 3>) -> Result<Tensor<B, 2, Int>> {
        let log_probs = self.forward(xyz, features)?;
        Ok(log_probs.argmax(2).squeeze(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdapterConfig, LossConfig, TransformerConfig};
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn small() -> SegmentationConfig {
        SegmentationConfig::new(
            TransformerConfig::new()
                .with_trans_dim(32)
                .with_depth(4)
                .with_num_heads(4)
                .with_num_group(8)
                .with_group_size(8)
                .with_encoder_dims(32),
            AdapterConfig::new().with_interaction_indexes(vec![[0, 0], [1, 1], [2, 2], [3, 3]]),
        )
        .with_num_points(128)
        .with_num_classes(5)
    }

    #[test]
    fn test_log_probs_shape_and_normalised() {
        let device = Default::default();
        let model = small().init::<TestBackend>(&device).unwrap();

        let xyz = Tensor::random([2, 128, 3], Distribution::Default, &device);
        let features = Tensor::random([2, 128, 1], Distribution::Default, &device);
        let log_probs = model.forward(xyz, features).unwrap();
        assert_eq!(log_probs.dims(), [2, 128, 5]);

        let sums = log_probs.exp().sum_dim(2).into_data().to_vec::<f32>().unwrap();
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_predict_labels_in_range() {
        let device = Default::default();
        let model = small().init::<TestBackend>(&device).unwrap();

        let xyz = Tensor::random([1, 128, 3], Distribution::Default, &device);
        let features = Tensor::zeros([1, 128, 1], &device);
        let labels = model.predict(xyz, features).unwrap();
        assert_eq!(labels.dims(), [1, 128]);

        let values = labels.into_data().convert::<i64>().to_vec::<i64>().unwrap();
        assert!(values.iter().all(|&v| (0..5).contains(&v)));
    }

    #[test]
    fn test_forward_classification_backward() {
        let device = Default::default();
        let model = small().init::<Autodiff<TestBackend>>(&device).unwrap();

        let batch = SegmentationBatch {
            xyz: Tensor::random([1, 128, 3], Distribution::Default, &device),
            features: Tensor::random([1, 128, 1], Distribution::Default, &device),
            labels: Tensor::<Autodiff<TestBackend>, 1, Int>::arange(0..128, &device)
                .remainder_scalar(5)
                .reshape([1, 128]),
        };
        let loss = SegmentationLoss::new(LossConfig::new());
        let out = model.forward_classification(batch, &loss).unwrap();

        let total: f32 = out.loss.total.clone().into_scalar();
        assert!(total.is_finite() && total > 0.0);
        let _grads = out.loss.total.backward();
    }

    #[test]
    fn test_context_pools_adapter_levels_and_dense_features() {
        let device = Default::default();
        let model = small().init::<TestBackend>(&device).unwrap();

        let xyz = Tensor::random([2, 128, 3], Distribution::Default, &device);
        let features = Tensor::random([2, 128, 1], Distribution::Default, &device);
        let out = model.backbone.forward(xyz, features).unwrap();
        let levels = out.levels.clone();

        let (x, maps) = model.decode(out).unwrap();
        assert_eq!(maps.len(), CONTEXT_MAPS);
        let sizes: Vec<_> = maps.iter().map(|m| m.dims()).collect();
        assert_eq!(
            sizes,
            vec![[2, 2, 32], [2, 8, 32], [2, 32, 32], [2, 128, 32], [2, 128, 32]]
        );

        // The first four maps are the adapter levels themselves, coarse first.
        for (map, level) in maps.iter().zip(levels.iter().rev()) {
            map.to_data().assert_eq(&level.to_data(), true);
        }
        maps[4].to_data().assert_eq(&x.to_data(), true);
    }

    #[test]
    fn test_multi_channel_features() {
        let device = Default::default();
        let model = small()
            .with_feature_channels(3)
            .init::<TestBackend>(&device)
            .unwrap();
        let xyz = Tensor::random([1, 128, 3], Distribution::Default, &device);
        let features = Tensor::random([1, 128, 3], Distribution::Default, &device);
        assert_eq!(model.forward(xyz, features).unwrap().dims(), [1, 128, 5]);
    }
}
