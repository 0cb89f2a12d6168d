//! Pointwise layer stacks shared by the pyramid, propagation and head modules.
//!
//! All point features are channels-last. A 1x1 convolution over points is a
//! [`Linear`] on the last axis; batch normalisation moves channels to axis 1
//! around the call.

use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig, Relu};
use burn::prelude::*;

/// He gain for ReLU-family activations.
pub const KAIMING_GAIN: f64 = std::f64::consts::SQRT_2;

/// Initialize a linear layer with He-normal weights and a zero bias.
///
/// Batch and layer norms need no counterpart: Burn already starts them at
/// unit scale and zero shift.
pub fn kaiming_linear<B: Backend>(config: LinearConfig, device: &B::Device) -> Linear<B> {
    let mut linear = config
        .with_initializer(Initializer::KaimingNormal {
            gain: KAIMING_GAIN,
            fan_out_only: false,
        })
        .init(device);
    linear.bias = linear
        .bias
        .map(|bias| Param::from_tensor(bias.val().zeros_like()));
    linear
}

/// Configuration for a `Linear → BatchNorm → ReLU` unit.
#[derive(Config, Debug)]
pub struct LinearBnReluConfig {
    /// Input channels.
    pub input_dim: usize,
    /// Output channels.
    pub output_dim: usize,
    /// Whether the linear layer has a bias.
    #[config(default = true)]
    pub bias: bool,
}

impl LinearBnReluConfig {
    /// Initialize the unit.
    pub fn init<B: Backend>(&self, device: &B::Device) -> LinearBnRelu<B> {
        LinearBnRelu {
            linear: kaiming_linear(
                LinearConfig::new(self.input_dim, self.output_dim).with_bias(self.bias),
                device,
            ),
            norm: BatchNormConfig::new(self.output_dim).init(device),
            activation: Relu::new(),
        }
    }
}

/// Pointwise `Linear → BatchNorm → ReLU`.
#[derive(Module, Debug)]
pub struct LinearBnRelu<B: Backend> {
    linear: Linear<B>,
    norm: BatchNorm<B, 1>,
    activation: Relu,
}

impl<B: Backend> LinearBnRelu<B> {
    /// Forward pass.
    ///
    /// Input shape: [batch, points, input_dim]
    /// Output shape: [batch, points, output_dim]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.linear.forward(x);
        let x = batch_norm_channels_last(&self.norm, x);
        self.activation.forward(x)
    }

    /// Forward pass without the activation.
    pub fn forward_linear_bn(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        batch_norm_channels_last(&self.norm, self.linear.forward(x))
    }

    /// Output channels.
    pub fn output_dim(&self) -> usize {
        self.linear.weight.dims()[1]
    }
}

/// Apply a 1D batch norm to a channels-last `[B, N, C]` tensor.
pub fn batch_norm_channels_last<B: Backend>(norm: &BatchNorm<B, 1>, x: Tensor<B, 3>) -> Tensor<B, 3> {
    norm.forward(x.swap_dims(1, 2)).swap_dims(1, 2)
}

/// Configuration for a stack of [`LinearBnRelu`] units.
#[derive(Config, Debug)]
pub struct SharedMlpConfig {
    /// Input channels.
    pub input_dim: usize,
    /// Output channels of every unit.
    pub widths: Vec<usize>,
}

impl SharedMlpConfig {
    /// Initialize the MLP.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SharedMlp<B> {
        let mut layers = Vec::with_capacity(self.widths.len());
        let mut in_dim = self.input_dim;

        for &out_dim in &self.widths {
            layers.push(LinearBnReluConfig::new(in_dim, out_dim).init(device));
            in_dim = out_dim;
        }

        SharedMlp { layers }
    }
}

/// Pointwise MLP of `Linear → BatchNorm → ReLU` units.
#[derive(Module, Debug)]
pub struct SharedMlp<B: Backend> {
    layers: Vec<LinearBnRelu<B>>,
}

impl<B: Backend> SharedMlp<B> {
    /// Forward pass.
    ///
    /// Input shape: [batch, points, input_dim]
    /// Output shape: [batch, points, widths.last()]
    pub fn forward(&self, mut x: Tensor<B, 3>) -> Tensor<B, 3> {
        for layer in &self.layers {
            x = layer.forward(x);
        }
        x
    }

    /// Forward pass for grouped input.
    ///
    /// Input shape: [batch, groups, neighbors, input_dim]
    /// Output shape: [batch, groups, neighbors, widths.last()]
    pub fn forward_grouped(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch, groups, neighbors, channels] = x.dims();
        let y = self.forward(x.reshape([batch, groups * neighbors, channels]));
        let out = y.dims()[2];
        y.reshape([batch, groups, neighbors, out])
    }

    /// Output channels.
    pub fn output_dim(&self) -> Option<usize> {
        self.layers.last().map(LinearBnRelu::output_dim)
    }
}
