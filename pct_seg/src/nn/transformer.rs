//! Pre-norm transformer blocks of the point cloud transformer branch.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Gelu, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::Distribution;

use super::mlp::kaiming_linear;

/// Stochastic depth: drops the whole residual branch of a sample.
///
/// Only active when the backend records gradients.
#[derive(Module, Clone, Debug)]
pub struct DropPath {
    prob: f64,
}

impl DropPath {
    /// Create a drop path with drop probability `prob`.
    pub fn new(prob: f64) -> Self {
        Self { prob }
    }

    /// Drop probability.
    pub fn prob(&self) -> f64 {
        self.prob
    }

    /// Forward pass over a tensor whose first axis is the batch.
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        if self.prob <= 0.0 || !B::ad_enabled() {
            return x;
        }
        let keep = 1.0 - self.prob;
        let mut shape = [1usize; D];
        shape[0] = x.dims()[0];
        let mask = Tensor::<B, D>::random(shape, Distribution::Bernoulli(keep), &x.device());
        x * mask / keep
    }
}

/// Configuration for multi-head self-attention.
#[derive(Config, Debug)]
pub struct AttentionConfig {
    /// Token width.
    pub dim: usize,
    /// Number of heads.
    pub num_heads: usize,
    /// Whether the fused qkv projection has a bias.
    #[config(default = false)]
    pub qkv_bias: bool,
}

impl AttentionConfig {
    /// Initialize the attention layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Attention<B> {
        let head_dim = self.dim / self.num_heads;
        Attention {
            qkv: kaiming_linear(
                LinearConfig::new(self.dim, self.dim * 3).with_bias(self.qkv_bias),
                device,
            ),
            proj: kaiming_linear(LinearConfig::new(self.dim, self.dim), device),
            num_heads: self.num_heads,
            scale: (head_dim as f64).powf(-0.5),
        }
    }
}

/// Multi-head self-attention with a fused qkv projection.
#[derive(Module, Debug)]
pub struct Attention<B: Backend> {
    qkv: Linear<B>,
    proj: Linear<B>,
    num_heads: usize,
    scale: f64,
}

impl<B: Backend> Attention<B> {
    /// Forward pass.
    ///
    /// Input shape: [batch, tokens, dim]
    /// Output shape: [batch, tokens, dim]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, tokens, dim] = x.dims();
        let head_dim = dim / self.num_heads;

        let qkv = self.qkv.forward(x);
        let split = |i: usize| {
            qkv.clone()
                .slice([0..batch, 0..tokens, i * dim..(i + 1) * dim])
                .reshape([batch, tokens, self.num_heads, head_dim])
                .swap_dims(1, 2)
        };
        let (q, k, v) = (split(0), split(1), split(2));

        let attn = softmax(q.matmul(k.swap_dims(2, 3)) * self.scale, 3);
        let out = attn
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch, tokens, dim]);

        self.proj.forward(out)
    }
}

/// Configuration for the block feed-forward.
#[derive(Config, Debug)]
pub struct FeedForwardConfig {
    /// Input and output width.
    pub dim: usize,
    /// Hidden width.
    pub hidden: usize,
    /// Dropout after each linear layer.
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl FeedForwardConfig {
    /// Initialize the feed-forward.
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeedForward<B> {
        FeedForward {
            fc1: kaiming_linear(LinearConfig::new(self.dim, self.hidden), device),
            fc2: kaiming_linear(LinearConfig::new(self.hidden, self.dim), device),
            activation: Gelu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Two-layer GELU feed-forward.
#[derive(Module, Debug)]
pub struct FeedForward<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    activation: Gelu,
    dropout: Dropout,
}

impl<B: Backend> FeedForward<B> {
    /// Forward pass.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = self.dropout.forward(self.activation.forward(self.fc1.forward(x)));
        self.dropout.forward(self.fc2.forward(x))
    }
}

/// Configuration for a transformer block.
#[derive(Config, Debug)]
pub struct BlockConfig {
    /// Token width.
    pub dim: usize,
    /// Number of heads.
    pub num_heads: usize,
    /// Hidden width of the feed-forward.
    pub mlp_hidden: usize,
    /// Stochastic depth rate of both residual branches.
    #[config(default = 0.0)]
    pub drop_path: f64,
}

impl BlockConfig {
    /// Initialize the block.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Block<B> {
        Block {
            norm1: LayerNormConfig::new(self.dim).init(device),
            attn: AttentionConfig::new(self.dim, self.num_heads).init(device),
            norm2: LayerNormConfig::new(self.dim).init(device),
            mlp: FeedForwardConfig::new(self.dim, self.mlp_hidden).init(device),
            drop_path: DropPath::new(self.drop_path),
        }
    }
}

/// Pre-norm transformer block.
#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    norm1: LayerNorm<B>,
    attn: Attention<B>,
    norm2: LayerNorm<B>,
    mlp: FeedForward<B>,
    drop_path: DropPath,
}

impl<B: Backend> Block<B> {
    /// Forward pass.
    ///
    /// Input shape: [batch, tokens, dim]
    /// Output shape: [batch, tokens, dim]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = x.clone() + self.drop_path.forward(self.attn.forward(self.norm1.forward(x)));
        x.clone() + self.drop_path.forward(self.mlp.forward(self.norm2.forward(x)))
    }
}
