//! Multi-head cross-attention between two token streams.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{leaky_relu, softmax};

use super::mlp::kaiming_linear;

const HEAD_NORM_EPS: f64 = 1e-9;
const OUTPUT_SLOPE: f64 = 0.02;

/// Configuration for [`CrossAttention`].
#[derive(Config, Debug)]
pub struct CrossAttentionConfig {
    /// Token width of both streams.
    pub d_model: usize,
    /// Number of heads.
    pub num_heads: usize,
    /// Dropout on the attention weights.
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl CrossAttentionConfig {
    /// Initialize the attention layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CrossAttention<B> {
        let d = self.d_model;
        let d_k = d / self.num_heads;
        CrossAttention {
            norm_query: LayerNormConfig::new(d).init(device),
            norm_key: LayerNormConfig::new(d).init(device),
            query: kaiming_linear(LinearConfig::new(d, self.num_heads * d_k), device),
            key: kaiming_linear(LinearConfig::new(d, self.num_heads * d_k), device),
            value: kaiming_linear(LinearConfig::new(d, self.num_heads * d_k), device),
            dropout: DropoutConfig::new(self.dropout).init(),
            output: kaiming_linear(LinearConfig::new(d, d), device),
            norm_output: LayerNormConfig::new(d).init(device),
            num_heads: self.num_heads,
            scale: 1.0 / (d_k as f64).sqrt(),
        }
    }
}

/// Cross-attention with per-query head re-normalisation and an offset residual.
///
/// After the softmax over keys, every attention weight is divided by the sum
/// of that query/key weight over all heads. The output is
/// `q + LeakyReLU(LN(W(q - attn)))` where `q` is the projected query.
#[derive(Module, Debug)]
pub struct CrossAttention<B: Backend> {
    norm_query: LayerNorm<B>,
    norm_key: LayerNorm<B>,
    query: Linear<B>,
    key: Linear<B>,
    value: Linear<B>,
    dropout: Dropout,
    output: Linear<B>,
    norm_output: LayerNorm<B>,
    num_heads: usize,
    scale: f64,
}

impl<B: Backend> CrossAttention<B> {
    /// Forward pass.
    ///
    /// `x` provides the queries `[batch, nq, d_model]`, `y` the keys and values
    /// `[batch, nk, d_model]`. Returns `[batch, nq, d_model]`.
    pub fn forward(&self, x: Tensor<B, 3>, y: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, nq, _] = x.dims();
        let [_, nk, _] = y.dims();

        let x = self.norm_query.forward(x);
        let y = self.norm_key.forward(y);

        let q = self.query.forward(x);
        let width = q.dims()[2];
        let d_k = width / self.num_heads;
        let heads = |t: Tensor<B, 3>, n: usize| {
            t.reshape([batch, n, self.num_heads, d_k]).swap_dims(1, 2)
        };

        let k = heads(self.key.forward(y.clone()), nk);
        let v = heads(self.value.forward(y), nk);

        let scores = heads(q.clone(), nq).matmul(k.swap_dims(2, 3)) * self.scale;
        let attn = softmax(scores, 3);
        let attn = attn.clone() / attn.sum_dim(1).add_scalar(HEAD_NORM_EPS);
        let attn = self.dropout.forward(attn);

        let out = attn.matmul(v).swap_dims(1, 2).reshape([batch, nq, width]);
        let offset = self.norm_output.forward(self.output.forward(q.clone() - out));

        q + leaky_relu(offset, OUTPUT_SLOPE)
    }
}
