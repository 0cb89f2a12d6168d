//! Pyramid → transformer feature injection.

use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{LayerNorm, LayerNormConfig};
use burn::prelude::*;

use super::cross_attention::{CrossAttention, CrossAttentionConfig};
use super::extractor::ADAPTER_NORM_EPS;

/// Configuration for an [`Injector`].
#[derive(Config, Debug)]
pub struct InjectorConfig {
    /// Token width.
    pub dim: usize,
    /// Attention heads.
    pub num_heads: usize,
    /// Number of pyramid levels attended to.
    pub levels: usize,
    /// Initial value of every level gate.
    #[config(default = 0.0)]
    pub init_value: f64,
}

impl InjectorConfig {
    /// Initialize the injector.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Injector<B> {
        let norm = || {
            LayerNormConfig::new(self.dim)
                .with_epsilon(ADAPTER_NORM_EPS)
                .init(device)
        };

        Injector {
            pct_norms: (0..self.levels).map(|_| norm()).collect(),
            level_norms: (0..self.levels).map(|_| norm()).collect(),
            attentions: (0..self.levels)
                .map(|_| CrossAttentionConfig::new(self.dim, self.num_heads).init(device))
                .collect(),
            gammas: (0..self.levels)
                .map(|_| Param::from_tensor(Tensor::full([self.dim], self.init_value, device)))
                .collect(),
        }
    }
}

/// Adds gated cross-attention readouts of every pyramid level to the
/// transformer tokens.
#[derive(Module, Debug)]
pub struct Injector<B: Backend> {
    pct_norms: Vec<LayerNorm<B>>,
    level_norms: Vec<LayerNorm<B>>,
    attentions: Vec<CrossAttention<B>>,
    gammas: Vec<Param<Tensor<B, 1>>>,
}

impl<B: Backend> Injector<B> {
    /// Forward pass.
    ///
    /// `pct` is `[batch, tokens, dim]`; `levels` are the pyramid levels,
    /// finest first. Levels beyond the configured count are ignored.
    pub fn forward(&self, pct: Tensor<B, 3>, levels: &[Tensor<B, 3>]) -> Tensor<B, 3> {
        let mut out = pct.clone();
        for (((level, attention), (pct_norm, level_norm)), gamma) in levels
            .iter()
            .zip(&self.attentions)
            .zip(self.pct_norms.iter().zip(&self.level_norms))
            .zip(&self.gammas)
        {
            let readout = attention.forward(
                pct_norm.forward(pct.clone()),
                level_norm.forward(level.clone()),
            );
            out = out + readout * gamma.val().unsqueeze::<3>();
        }
        out
    }
}
