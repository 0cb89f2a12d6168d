//! kNN set abstraction: downsample a cloud and pool local neighbourhoods.

use burn::config::Config;
use burn::module::Module;
use burn::prelude::*;
use pct_core::Point3;

use super::mlp::{SharedMlp, SharedMlpConfig};

use crate::geometry::{fps_and_group, gather_neighbors, points_to_tensor, BatchPoints};

/// Configuration for a set abstraction level.
#[derive(Config, Debug)]
pub struct SetAbstractionConfig {
    /// Number of output points.
    pub num_centers: usize,
    /// Neighbours pooled per output point.
    pub neighbors: usize,
    /// Feature channels of the input points (xyz excluded).
    pub in_channels: usize,
    /// Widths of the shared MLP.
    pub widths: Vec<usize>,
}

impl SetAbstractionConfig {
    /// Initialize the level.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SetAbstraction<B> {
        SetAbstraction {
            mlp: SharedMlpConfig::new(self.in_channels + 3, self.widths.clone()).init(device),
            num_centers: self.num_centers,
            neighbors: self.neighbors,
        }
    }
}

/// Output of a set abstraction level.
#[derive(Debug, Clone)]
pub struct Abstracted<B: Backend> {
    /// Sampled points on the host.
    pub points: BatchPoints,
    /// Sampled points, `[batch, centers, 3]`.
    pub xyz: Tensor<B, 3>,
    /// Pooled features, `[batch, centers, widths.last()]`.
    pub features: Tensor<B, 3>,
}

/// Farthest point sampling + kNN grouping + shared MLP + max pooling.
///
/// Neighbour coordinates are expressed relative to their anchor and
/// concatenated in front of the neighbour features.
#[derive(Module, Debug)]
pub struct SetAbstraction<B: Backend> {
    mlp: SharedMlp<B>,
    num_centers: usize,
    neighbors: usize,
}

impl<B: Backend> SetAbstraction<B> {
    /// Forward pass.
    ///
    /// `xyz` is `[batch, points, 3]` with host copy `points`; `features` is
    /// `[batch, points, in_channels]`.
    pub fn forward(
        &self,
        xyz: Tensor<B, 3>,
        points: &[Vec<Point3>],
        features: Tensor<B, 3>,
    ) -> crate::error::Result<Abstracted<B>> {
        let device = xyz.device();
        let grouping = fps_and_group(points, self.num_centers, self.neighbors)?;
        let new_xyz = points_to_tensor::<B>(&grouping.centers, &device)?;

        let grouped_xyz =
            gather_neighbors(xyz, &grouping.neighbors)? - new_xyz.clone().unsqueeze_dim::<4>(2);
        let grouped_features = gather_neighbors(features, &grouping.neighbors)?;

        let x = self
            .mlp
            .forward_grouped(Tensor::cat(vec![grouped_xyz, grouped_features], 3));
        let [batch, centers, _, channels] = x.dims();

        Ok(Abstracted {
            points: grouping.centers,
            xyz: new_xyz,
            features: x.max_dim(2).reshape([batch, centers, channels]),
        })
    }

    /// Number of output points.
    pub fn num_centers(&self) -> usize {
        self.num_centers
    }
}
