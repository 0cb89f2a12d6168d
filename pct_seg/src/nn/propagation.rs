//! Feature propagation from sparse to dense points.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;
use pct_core::Point3;

use super::mlp::{SharedMlp, SharedMlpConfig};
use crate::error::PctSegError;
use crate::geometry::three_nn_interpolate;

const DECODER_SLOPE: f64 = 0.01;

/// Interpolate `sparse_features` onto `dense` and prepend the optional skip
/// features.
fn interpolate_with_skip<B: Backend>(
    dense: &[Vec<Point3>],
    sparse: &[Vec<Point3>],
    sparse_features: Tensor<B, 3>,
    skip: Option<Tensor<B, 3>>,
) -> crate::error::Result<Tensor<B, 3>> {
    let interpolated = three_nn_interpolate(dense, sparse, sparse_features)?;
    match skip {
        Some(skip) => {
            let [b, n, _] = skip.dims();
            let [ib, in_, _] = interpolated.dims();
            if (b, n) != (ib, in_) {
                return Err(PctSegError::ShapeMismatch {
                    expected: vec![ib, in_],
                    got: vec![b, n],
                });
            }
            Ok(Tensor::cat(vec![skip, interpolated], 2))
        }
        None => Ok(interpolated),
    }
}

/// Configuration for [`Propagation`].
#[derive(Config, Debug)]
pub struct PropagationConfig {
    /// Skip channels plus interpolated channels.
    pub in_channels: usize,
    /// Widths of the shared MLP.
    pub widths: Vec<usize>,
}

impl PropagationConfig {
    /// Initialize the layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Propagation<B> {
        Propagation {
            mlp: SharedMlpConfig::new(self.in_channels, self.widths.clone()).init(device),
        }
    }
}

/// Three-nearest-neighbour interpolation followed by a shared MLP.
#[derive(Module, Debug)]
pub struct Propagation<B: Backend> {
    mlp: SharedMlp<B>,
}

impl<B: Backend> Propagation<B> {
    /// Forward pass.
    ///
    /// `sparse_features` `[batch, S, C]` live on `sparse`; the result lives on
    /// `dense`. `skip` is `[batch, N, C_skip]` when present.
    pub fn forward(
        &self,
        dense: &[Vec<Point3>],
        sparse: &[Vec<Point3>],
        sparse_features: Tensor<B, 3>,
        skip: Option<Tensor<B, 3>>,
    ) -> crate::error::Result<Tensor<B, 3>> {
        let x = interpolate_with_skip(dense, sparse, sparse_features, skip)?;
        Ok(self.mlp.forward(x))
    }
}

/// Configuration for [`ResidualPropagation`].
#[derive(Config, Debug)]
pub struct ResidualPropagationConfig {
    /// Skip channels plus interpolated channels.
    pub in_channels: usize,
    /// Output channels.
    pub out_channels: usize,
}

impl ResidualPropagationConfig {
    /// Initialize the decoder stage.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResidualPropagation<B> {
        let c = self.out_channels;
        let linear = || LinearConfig::new(c, c).init(device);
        ResidualPropagation {
            fuse: LinearConfig::new(self.in_channels, c).init(device),
            net1: linear(),
            net2: linear(),
            net3: linear(),
            net4: linear(),
        }
    }
}

/// Decoder stage: interpolation, fusion and two residual units.
#[derive(Module, Debug)]
pub struct ResidualPropagation<B: Backend> {
    fuse: Linear<B>,
    net1: Linear<B>,
    net2: Linear<B>,
    net3: Linear<B>,
    net4: Linear<B>,
}

impl<B: Backend> ResidualPropagation<B> {
    /// Forward pass. Same inputs as [`Propagation::forward`].
    pub fn forward(
        &self,
        dense: &[Vec<Point3>],
        sparse: &[Vec<Point3>],
        sparse_features: Tensor<B, 3>,
        skip: Option<Tensor<B, 3>>,
    ) -> crate::error::Result<Tensor<B, 3>> {
        let x = interpolate_with_skip(dense, sparse, sparse_features, skip)?;
        let x = leaky_relu(self.fuse.forward(x), DECODER_SLOPE);
        let x = residual(&self.net1, &self.net2, x);
        Ok(residual(&self.net3, &self.net4, x))
    }
}

fn residual<B: Backend>(a: &Linear<B>, b: &Linear<B>, x: Tensor<B, 3>) -> Tensor<B, 3> {
    let y = b.forward(leaky_relu(a.forward(x.clone()), DECODER_SLOPE));
    leaky_relu(y + x, DECODER_SLOPE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{points_to_host, points_to_tensor};
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn clouds(batch: usize, n: usize) -> Vec<Vec<Point3>> {
        let device = Default::default();
        let t = Tensor::<TestBackend, 3>::random([batch, n, 3], Distribution::Default, &device);
        points_to_host(t).unwrap()
    }

    #[test]
    fn test_propagation_with_skip() {
        let device = Default::default();
        let layer = PropagationConfig::new(4 + 3, vec![8]).init::<TestBackend>(&device);

        let dense = clouds(2, 10);
        let sparse = clouds(2, 4);
        let skip = points_to_tensor::<TestBackend>(&dense, &device).unwrap();
        let features = Tensor::random([2, 4, 4], Distribution::Default, &device);

        let out = layer.forward(&dense, &sparse, features, Some(skip)).unwrap();
        assert_eq!(out.dims(), [2, 10, 8]);
    }

    #[test]
    fn test_propagation_skip_mismatch() {
        let device = Default::default();
        let layer = PropagationConfig::new(7, vec![8]).init::<TestBackend>(&device);

        let dense = clouds(1, 10);
        let sparse = clouds(1, 4);
        let skip = Tensor::zeros([1, 9, 3], &device);
        let features = Tensor::zeros([1, 4, 4], &device);

        assert!(matches!(
            layer.forward(&dense, &sparse, features, Some(skip)),
            Err(PctSegError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_residual_propagation_single_sparse_point() {
        let device = Default::default();
        let decoder = ResidualPropagationConfig::new(6, 6).init::<TestBackend>(&device);

        let dense = clouds(1, 5);
        let sparse = clouds(1, 1);
        let features = Tensor::random([1, 1, 6], Distribution::Default, &device);

        let out = decoder.forward(&dense, &sparse, features, None).unwrap();
        assert_eq!(out.dims(), [1, 5, 6]);
    }
}
