//! Transformer → pyramid feature extraction.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Gelu, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;

use super::cross_attention::{CrossAttention, CrossAttentionConfig};
use super::mlp::kaiming_linear;
use super::transformer::DropPath;

/// Epsilon of the norms in front of the cross-attention.
pub(crate) const ADAPTER_NORM_EPS: f64 = 1e-6;

/// Configuration for [`SpmFeedForward`].
#[derive(Config, Debug)]
pub struct SpmFeedForwardConfig {
    /// Token width.
    pub dim: usize,
    /// Hidden width.
    pub hidden: usize,
    /// Dropout after the activation and the output projection.
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl SpmFeedForwardConfig {
    /// Initialize the feed-forward.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SpmFeedForward<B> {
        SpmFeedForward {
            fc1: kaiming_linear(LinearConfig::new(self.dim, self.hidden), device),
            pointwise: kaiming_linear(LinearConfig::new(self.hidden, self.hidden), device),
            fc2: kaiming_linear(LinearConfig::new(self.hidden, self.dim), device),
            activation: Gelu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Bottleneck feed-forward over the concatenated pyramid tokens.
///
/// The pointwise mixing layer is shared by every level.
#[derive(Module, Debug)]
pub struct SpmFeedForward<B: Backend> {
    fc1: Linear<B>,
    pointwise: Linear<B>,
    fc2: Linear<B>,
    activation: Gelu,
    dropout: Dropout,
}

impl<B: Backend> SpmFeedForward<B> {
    /// Forward pass.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.pointwise.forward(self.fc1.forward(x));
        let x = self.dropout.forward(self.activation.forward(x));
        self.dropout.forward(self.fc2.forward(x))
    }
}

/// Configuration for an [`Extractor`].
#[derive(Config, Debug)]
pub struct ExtractorConfig {
    /// Token width of both streams.
    pub dim: usize,
    /// Attention heads.
    pub num_heads: usize,
    /// Whether the feed-forward branch is present.
    #[config(default = true)]
    pub with_ffn: bool,
    /// Hidden width of the feed-forward relative to `dim`.
    #[config(default = 0.25)]
    pub ffn_ratio: f64,
    /// Feed-forward dropout.
    #[config(default = 0.0)]
    pub drop: f64,
    /// Stochastic depth of the feed-forward branch.
    #[config(default = 0.0)]
    pub drop_path: f64,
}

impl ExtractorConfig {
    /// Initialize the extractor.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Extractor<B> {
        let (ffn, ffn_norm) = if self.with_ffn {
            let hidden = ((self.dim as f64 * self.ffn_ratio) as usize).max(1);
            (
                Some(
                    SpmFeedForwardConfig::new(self.dim, hidden)
                        .with_dropout(self.drop)
                        .init(device),
                ),
                Some(LayerNormConfig::new(self.dim).init(device)),
            )
        } else {
            (None, None)
        };

        Extractor {
            spm_norm: LayerNormConfig::new(self.dim)
                .with_epsilon(ADAPTER_NORM_EPS)
                .init(device),
            pct_norm: LayerNormConfig::new(self.dim)
                .with_epsilon(ADAPTER_NORM_EPS)
                .init(device),
            attention: CrossAttentionConfig::new(self.dim, self.num_heads).init(device),
            ffn,
            ffn_norm,
            drop_path: DropPath::new(self.drop_path),
        }
    }
}

/// Updates the pyramid stream with information from the transformer stream.
#[derive(Module, Debug)]
pub struct Extractor<B: Backend> {
    spm_norm: LayerNorm<B>,
    pct_norm: LayerNorm<B>,
    attention: CrossAttention<B>,
    ffn: Option<SpmFeedForward<B>>,
    ffn_norm: Option<LayerNorm<B>>,
    drop_path: DropPath,
}

impl<B: Backend> Extractor<B> {
    /// Forward pass.
    ///
    /// `spm` is `[batch, pyramid_tokens, dim]`, `pct` is `[batch, tokens, dim]`.
    /// Returns the updated pyramid stream.
    pub fn forward(&self, spm: Tensor<B, 3>, pct: Tensor<B, 3>) -> Tensor<B, 3> {
        let cross = self.attention.forward(
            self.spm_norm.forward(spm.clone()),
            self.pct_norm.forward(pct),
        );
        let spm = spm + cross;

        match (&self.ffn, &self.ffn_norm) {
            (Some(ffn), Some(norm)) => {
                spm.clone() + self.drop_path.forward(ffn.forward(norm.forward(spm)))
            }
            _ => spm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn test_extractor_keeps_pyramid_shape() {
        let device = Default::default();
        let extractor = ExtractorConfig::new(16, 2).init::<TestBackend>(&device);

        let spm = Tensor::random([2, 85, 16], Distribution::Default, &device);
        let pct = Tensor::random([2, 7, 16], Distribution::Default, &device);

        assert_eq!(extractor.forward(spm, pct).dims(), [2, 85, 16]);
    }

    #[test]
    fn test_extractor_without_ffn() {
        let device = Default::default();
        let extractor = ExtractorConfig::new(8, 2)
            .with_with_ffn(false)
            .init::<TestBackend>(&device);

        let spm = Tensor::random([1, 5, 8], Distribution::Default, &device);
        let pct = Tensor::random([1, 3, 8], Distribution::Default, &device);

        assert_eq!(extractor.forward(spm, pct).dims(), [1, 5, 8]);
    }

    #[test]
    fn test_spm_feed_forward() {
        let device = Default::default();
        let ffn = SpmFeedForwardConfig::new(32, 8).init::<TestBackend>(&device);
        let out = ffn.forward(Tensor::zeros([1, 4, 32], &device));
        assert_eq!(out.dims(), [1, 4, 32]);
    }
}
