//! Patch tokens for the transformer branch.
//!
//! The input cloud is split into `num_group` local patches around farthest
//! point centres; a mini-PointNet turns each patch into one token.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use super::mlp::kaiming_linear;

use crate::geometry::{fps_and_group, gather_neighbors, points_to_tensor, BatchPoints};

/// Local patches of a batch of clouds.
#[derive(Debug, Clone)]
pub struct Patches<B: Backend> {
    /// Patch points relative to their centre, `[batch, groups, group_size, 3]`.
    pub neighborhood: Tensor<B, 4>,
    /// Patch centres, `[batch, groups, 3]`.
    pub centers: Tensor<B, 3>,
    /// Patch centres on the host.
    pub center_points: BatchPoints,
}

/// Split clouds into `num_group` patches of `group_size` points.
///
/// `xyz` is the `[batch, points, 3]` tensor of `points`.
pub fn group_patches<B: Backend>(
    xyz: Tensor<B, 3>,
    points: &[Vec<pct_core::Point3>],
    num_group: usize,
    group_size: usize,
) -> crate::error::Result<Patches<B>> {
    let device = xyz.device();
    let grouping = fps_and_group(points, num_group, group_size)?;
    let centers = points_to_tensor::<B>(&grouping.centers, &device)?;
    let neighborhood =
        gather_neighbors(xyz, &grouping.neighbors)? - centers.clone().unsqueeze_dim::<4>(2);

    Ok(Patches {
        neighborhood,
        centers,
        center_points: grouping.centers,
    })
}

/// Configuration for the patch encoder.
#[derive(Config, Debug)]
pub struct PatchEncoderConfig {
    /// Output token width.
    pub encoder_dims: usize,
}

impl PatchEncoderConfig {
    /// Initialize the encoder.
    pub fn init<B: Backend>(&self, device: &B::Device) -> PatchEncoder<B> {
        PatchEncoder {
            first1: kaiming_linear(LinearConfig::new(3, 128), device),
            first2: kaiming_linear(LinearConfig::new(128, 256), device),
            second1: kaiming_linear(LinearConfig::new(512, 512), device),
            second2: kaiming_linear(LinearConfig::new(512, self.encoder_dims), device),
            activation: Relu::new(),
        }
    }
}

/// Mini-PointNet over every patch with a global/local feature concat.
#[derive(Module, Debug)]
pub struct PatchEncoder<B: Backend> {
    first1: Linear<B>,
    first2: Linear<B>,
    second1: Linear<B>,
    second2: Linear<B>,
    activation: Relu,
}

impl<B: Backend> PatchEncoder<B> {
    /// Forward pass.
    ///
    /// Input shape: [batch, groups, group_size, 3]
    /// Output shape: [batch, groups, encoder_dims]
    pub fn forward(&self, patches: Tensor<B, 4>) -> Tensor<B, 3> {
        let [batch, groups, size, _] = patches.dims();
        let x = patches.reshape([batch * groups, size, 3]);

        let local = self
            .first2
            .forward(self.activation.forward(self.first1.forward(x)));
        let global = local.clone().max_dim(1).repeat_dim(1, size);
        let x = Tensor::cat(vec![global, local], 2);

        let x = self
            .second2
            .forward(self.activation.forward(self.second1.forward(x)));
        let encoder_dims = x.dims()[2];

        x.max_dim(1).reshape([batch, groups, encoder_dims])
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
    fn test_group_patches_relative_to_center() {
        let device = Default::default();
        let xyz = Tensor::<TestBackend, 3>::random([2, 64, 3], Distribution::Default, &device);
        let points = points_to_host(xyz.clone()).unwrap();

        let patches = group_patches(xyz, &points, 8, 4).unwrap();
        assert_eq!(patches.neighborhood.dims(), [2, 8, 4, 3]);
        assert_eq!(patches.centers.dims(), [2, 8, 3]);
        assert_eq!(patches.center_points[0].len(), 8);

        // The nearest neighbour of each centre is the centre itself.
        let first = patches
            .neighborhood
            .slice([0..2, 0..8, 0..1, 0..3])
            .abs()
            .max()
            .into_scalar();
        assert!(first < 1e-6);
    }

    #[test]
    fn test_patch_encoder_forward() {
        let device = Default::default();
        let encoder = PatchEncoderConfig::new(48).init::<TestBackend>(&device);

        let patches = Tensor::random([2, 8, 16, 3], Distribution::Default, &device);
        let output = encoder.forward(patches);

        assert_eq!(output.dims(), [2, 8, 48]);
    }

    #[test]
    fn test_patch_encoder_order_invariant() {
        let device = Default::default();
        let encoder = PatchEncoderConfig::new(16).init::<TestBackend>(&device);

        let patches = Tensor::<TestBackend, 4>::random([1, 2, 4, 3], Distribution::Default, &device);
        let order = Tensor::<TestBackend, 1, Int>::from_data([3, 1, 0, 2], &device);
        let shuffled = patches.clone().select(2, order);

        let diff: f32 = (encoder.forward(patches) - encoder.forward(shuffled))
            .abs()
            .max()
            .into_scalar();
        assert!(diff < 1e-5, "Max diff: {}", diff);
    }
}
