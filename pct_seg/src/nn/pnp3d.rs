//! Local context fusion with global bilinear regularisation.
//!
//! Every point encodes its kNN neighbourhood twice, once from coordinates
//! (`[Δxyz, xyz]`) and once from features (`[Δf, f]`), and max-pools the
//! concatenation. A low-rank bilinear statistic of the pooled features is
//! subtracted before a Mish activation.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::activation::mish;
use pct_core::Point3;

use super::mlp::{kaiming_linear, LinearBnRelu, LinearBnReluConfig, SharedMlp, SharedMlpConfig};

use crate::geometry::{gather_neighbors, self_knn};

const BILINEAR_EPS: f64 = 1e-12;

/// Configuration for [`PnP3d`].
#[derive(Config, Debug)]
pub struct PnP3dConfig {
    /// Feature channels; must be divisible by 8.
    pub channels: usize,
    /// Neighbours per point.
    pub neighbors: usize,
}

impl PnP3dConfig {
    /// Initialize the block.
    pub fn init<B: Backend>(&self, device: &B::Device) -> PnP3d<B> {
        let c = self.channels;
        PnP3d {
            xyz_mlp: SharedMlpConfig::new(6, vec![c / 2]).init(device),
            feature_mlp: SharedMlpConfig::new(2 * c, vec![c / 2]).init(device),
            down1: kaiming_linear(LinearConfig::new(c, c / 8).with_bias(false), device),
            down2: kaiming_linear(LinearConfig::new(c, c / 8).with_bias(false), device),
            up: LinearBnReluConfig::new(c / 8, c).init(device),
            activation: Relu::new(),
            neighbors: self.neighbors,
        }
    }
}

/// Point-wise local context block.
#[derive(Module, Debug)]
pub struct PnP3d<B: Backend> {
    xyz_mlp: SharedMlp<B>,
    feature_mlp: SharedMlp<B>,
    down1: Linear<B>,
    down2: Linear<B>,
    up: LinearBnRelu<B>,
    activation: Relu,
    neighbors: usize,
}

impl<B: Backend> PnP3d<B> {
    /// Forward pass.
    ///
    /// Input: `xyz` `[batch, points, 3]` with host copy `points`, `features`
    /// `[batch, points, channels]`.
    /// Output shape: [batch, points, channels]
    pub fn forward(
        &self,
        xyz: Tensor<B, 3>,
        points: &[Vec<Point3>],
        features: Tensor<B, 3>,
    ) -> crate::error::Result<Tensor<B, 3>> {
        let tables = self_knn(points, self.neighbors)?;
        let k = tables.first().map(|t| t.k()).unwrap_or(1);

        let neighbor_xyz = gather_neighbors(xyz.clone(), &tables)?;
        let center_xyz = xyz.unsqueeze_dim::<4>(2).repeat_dim(2, k);
        let xyz_encoding = self.xyz_mlp.forward_grouped(Tensor::cat(
            vec![neighbor_xyz - center_xyz.clone(), center_xyz],
            3,
        ));

        let neighbor_features = gather_neighbors(features.clone(), &tables)?;
        let center_features = features.unsqueeze_dim::<4>(2).repeat_dim(2, k);
        let feature_encoding = self.feature_mlp.forward_grouped(Tensor::cat(
            vec![neighbor_features - center_features.clone(), center_features],
            3,
        ));

        let encoding = Tensor::cat(vec![xyz_encoding, feature_encoding], 3);
        let [batch, n, _, channels] = encoding.dims();
        let f = encoding.max_dim(2).reshape([batch, n, channels]);

        let f1 = self.activation.forward(self.down1.forward(f.clone()));
        let f2 = self.activation.forward(self.down2.forward(f.clone()));

        // Outer product of the per-channel mean (over points) and the
        // per-point mean (over channels), per cloud.
        let channel_stat = f1.clone().mean_dim(1);
        let spatial_stat = f2.clone().mean_dim(2);
        let bilinear = (spatial_stat * channel_stat).add_scalar(BILINEAR_EPS).sqrt();

        let g = self.up.forward(bilinear + f1 + f2);
        Ok(mish(f - g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::points_to_host;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_pnp3d_forward() {
        let device = Default::default();
        let block = PnP3dConfig::new(16, 4).init::<TestBackend>(&device);

        let xyz = Tensor::<TestBackend, 3>::random([2, 12, 3], Distribution::Default, &device);
        let points = points_to_host(xyz.clone()).unwrap();
        let features = Tensor::random([2, 12, 16], Distribution::Default, &device);

        let out = block.forward(xyz, &points, features).unwrap();
        assert_eq!(out.dims(), [2, 12, 16]);
    }

    #[test]
    fn test_pnp3d_handles_fewer_points_than_neighbors() {
        let device = Default::default();
        let block = PnP3dConfig::new(8, 32).init::<TestBackend>(&device);

        let xyz = Tensor::<TestBackend, 3>::random([1, 2, 3], Distribution::Default, &device);
        let points = points_to_host(xyz.clone()).unwrap();
        let features = Tensor::random([1, 2, 8], Distribution::Default, &device);

        let out = block.forward(xyz, &points, features).unwrap();
        assert_eq!(out.dims(), [1, 2, 8]);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }
}
