//! Spatial pyramid module: four-level hierarchical point features.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use pct_core::pyramid::{LEVELS, LEVEL_RATIOS};

use super::mlp::kaiming_linear;
use super::pnp3d::{PnP3d, PnP3dConfig};
use super::set_abstraction::{SetAbstraction, SetAbstractionConfig};

use crate::geometry::{points_to_host, BatchPoints};

const EMBEDDING_DIM: usize = 64;

/// Configuration for [`SpatialPyramid`].
#[derive(Config, Debug)]
pub struct SpatialPyramidConfig {
    /// Output token width of every level.
    pub trans_dim: usize,
    /// Per-point input features besides xyz.
    pub feature_channels: usize,
    /// Number of transformer patches; level sizes are `16G, 4G, G, G/4`.
    pub num_group: usize,
    /// Neighbours used by set abstraction and local context.
    pub group_size: usize,
}

impl SpatialPyramidConfig {
    /// Level widths `e, 2e, 4e, 8e` with `e = trans_dim / 4`.
    pub fn level_widths(&self) -> [usize; LEVELS] {
        let e = self.trans_dim / 4;
        [e, 2 * e, 4 * e, 8 * e]
    }

    /// Level sizes, finest first.
    pub fn level_sizes(&self) -> [usize; LEVELS] {
        LEVEL_RATIOS.map(|r| r * self.num_group / 4)
    }

    /// Initialize the pyramid.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SpatialPyramid<B> {
        let sizes = self.level_sizes();
        let widths = self.level_widths();

        let mut abstractions = Vec::with_capacity(LEVELS);
        let mut contexts = Vec::with_capacity(LEVELS);
        let mut projections = Vec::with_capacity(LEVELS);
        let mut in_channels = EMBEDDING_DIM;

        for level in 0..LEVELS {
            let width = widths[level];
            let first = if level == 0 { width / 2 } else { in_channels };
            abstractions.push(
                SetAbstractionConfig::new(sizes[level], self.group_size, in_channels, vec![
                    first, first, width,
                ])
                .init(device),
            );
            contexts.push(PnP3dConfig::new(width, self.group_size).init(device));
            projections.push(kaiming_linear(LinearConfig::new(width, self.trans_dim), device));
            in_channels = width;
        }

        SpatialPyramid {
            embedding: kaiming_linear(LinearConfig::new(3 + self.feature_channels, EMBEDDING_DIM), device),
            activation: Relu::new(),
            abstractions,
            contexts,
            projections,
        }
    }
}

/// Pyramid levels, finest first.
#[derive(Debug, Clone)]
pub struct PyramidOutput<B: Backend> {
    /// Level tokens projected to `trans_dim`, `[batch, size_l, trans_dim]`.
    pub levels: Vec<Tensor<B, 3>>,
    /// Level coordinates, `[batch, size_l, 3]`.
    pub xyz: Vec<Tensor<B, 3>>,
    /// Level coordinates on the host.
    pub points: Vec<BatchPoints>,
}

/// Hierarchical point encoder producing the adapter's pyramid tokens.
#[derive(Module, Debug)]
pub struct SpatialPyramid<B: Backend> {
    embedding: Linear<B>,
    activation: Relu,
    abstractions: Vec<SetAbstraction<B>>,
    contexts: Vec<PnP3d<B>>,
    projections: Vec<Linear<B>>,
}

impl<B: Backend> SpatialPyramid<B> {
    /// Forward pass.
    ///
    /// `xyz` is `[batch, points, 3]`, `features` is
    /// `[batch, points, feature_channels]`.
    pub fn forward(&self, xyz: Tensor<B, 3>, features: Tensor<B, 3>) -> crate::error::Result<PyramidOutput<B>> {
        let mut points = points_to_host(xyz.clone())?;
        let mut x = self.activation.forward(
            self.embedding
                .forward(Tensor::cat(vec![xyz.clone(), features], 2)),
        );
        let mut xyz = xyz;

        let mut output = PyramidOutput {
            levels: Vec::with_capacity(LEVELS),
            xyz: Vec::with_capacity(LEVELS),
            points: Vec::with_capacity(LEVELS),
        };

        for ((sa, context), projection) in self
            .abstractions
            .iter()
            .zip(&self.contexts)
            .zip(&self.projections)
        {
            let level = sa.forward(xyz, &points, x)?;
            x = context.forward(level.xyz.clone(), &level.points, level.features)?;
            xyz = level.xyz;
            points = level.points;

            output.levels.push(projection.forward(x.clone()));
            output.xyz.push(xyz.clone());
            output.points.push(points.clone());
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_level_widths() {
        let config = SpatialPyramidConfig::new(384, 1, 256, 32);
        assert_eq!(config.level_widths(), [96, 192, 384, 768]);
        assert_eq!(config.level_sizes(), [4096, 1024, 256, 64]);
    }

    #[test]
    fn test_spatial_pyramid_levels() {
        let device = Default::default();
        let pyramid = SpatialPyramidConfig::new(32, 1, 8, 8).init::<TestBackend>(&device);

        let xyz = Tensor::<TestBackend, 3>::random([2, 160, 3], Distribution::Default, &device);
        let features = Tensor::random([2, 160, 1], Distribution::Default, &device);

        let out = pyramid.forward(xyz, features).unwrap();
        let sizes: Vec<usize> = out.levels.iter().map(|l| l.dims()[1]).collect();
        assert_eq!(sizes, vec![128, 32, 8, 2]);
        assert!(out.levels.iter().all(|l| l.dims() == [2, l.dims()[1], 32]));
        assert_eq!(out.xyz[3].dims(), [2, 2, 3]);
        assert_eq!(out.points[1][0].len(), 32);
    }
}
