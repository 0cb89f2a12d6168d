//! One interaction stage between the pyramid and transformer streams.
//!
//! A stage builds three prompt tokens from the coarser pyramid levels,
//! prepends them to the transformer tokens, runs its share of the transformer
//! blocks and finally lets the pyramid stream read from the result.

use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;
use burn::tensor::Distribution;
use pct_core::{PyramidLayout, LEVELS};

use super::extractor::{Extractor, ExtractorConfig};
use super::injector::{Injector, InjectorConfig};
use super::mlp::kaiming_linear;
use super::transformer::Block;


/// Prompt tokens per stage, one for each of the three coarser levels.
pub const NUM_PROMPTS: usize = LEVELS - 1;

const PROMPT_SLOPE: f64 = 0.02;
const EXTRA_EXTRACTORS: usize = 2;

/// Configuration for an [`InteractionBlock`].
#[derive(Config, Debug)]
pub struct InteractionBlockConfig {
    /// Extractor settings; also fixes the token width and head count.
    pub extractor: ExtractorConfig,
    /// Inject pyramid features into the transformer tokens before the blocks.
    #[config(default = false)]
    pub use_injector: bool,
    /// Initial injector gate.
    #[config(default = 0.0)]
    pub injector_init: f64,
    /// Run two additional extractors after the first.
    #[config(default = false)]
    pub extra_extractors: bool,
}

impl InteractionBlockConfig {
    /// Initialize the stage.
    pub fn init<B: Backend>(&self, device: &B::Device) -> InteractionBlock<B> {
        let dim = self.extractor.dim;
        let extras = if self.extra_extractors { EXTRA_EXTRACTORS } else { 0 };

        InteractionBlock {
            extractor: self.extractor.init(device),
            extra_extractors: (0..extras).map(|_| self.extractor.init(device)).collect(),
            injector: self.use_injector.then(|| {
                InjectorConfig::new(dim, self.extractor.num_heads, LEVELS)
                    .with_init_value(self.injector_init)
                    .init(device)
            }),
            prompt_pos: Param::from_tensor(Tensor::random(
                [NUM_PROMPTS, dim],
                Distribution::Normal(0.0, 1.0),
                device,
            )),
            prompt_update: kaiming_linear(LinearConfig::new(dim, dim), device),
            prompt_norm: LayerNormConfig::new(dim).init(device),
        }
    }
}

/// Streams after an interaction stage.
#[derive(Debug, Clone)]
pub struct InteractionOutput<B: Backend> {
    /// Transformer tokens without prompts, `[batch, num_group, dim]`.
    pub pct: Tensor<B, 3>,
    /// Updated pyramid stream, `[batch, 85u, dim]`.
    pub spm: Tensor<B, 3>,
    /// Transformer tokens captured after the fetch blocks of this stage.
    pub fetched: Vec<Tensor<B, 3>>,
}

/// Prompted transformer stage with pyramid read-out.
#[derive(Module, Debug)]
pub struct InteractionBlock<B: Backend> {
    extractor: Extractor<B>,
    extra_extractors: Vec<Extractor<B>>,
    injector: Option<Injector<B>>,
    prompt_pos: Param<Tensor<B, 2>>,
    prompt_update: Linear<B>,
    prompt_norm: LayerNorm<B>,
}

impl<B: Backend> InteractionBlock<B> {
    /// Dynamic prompts from pyramid levels 2 to 4: max-pooled level tokens
    /// plus a learned position, updated and normalised.
    ///
    /// Output shape: [batch, 3, dim]
    pub fn prompts(&self, levels: &[Tensor<B, 3>]) -> Tensor<B, 3> {
        let [_, dim] = self.prompt_pos.val().dims();
        let pooled: Vec<Tensor<B, 3>> = levels
            .iter()
            .skip(1)
            .take(NUM_PROMPTS)
            .enumerate()
            .map(|(i, level)| {
                let pos = self
                    .prompt_pos
                    .val()
                    .slice([i..i + 1, 0..dim])
                    .unsqueeze::<3>();
                level.clone().max_dim(1) + pos
            })
            .collect();

        let prompts = leaky_relu(
            self.prompt_update.forward(Tensor::cat(pooled, 1)),
            PROMPT_SLOPE,
        );
        self.prompt_norm.forward(prompts)
    }

    /// Forward pass.
    ///
    /// `blocks` are the transformer blocks owned by this stage, the first of
    /// which has global index `first_index`. After every block whose index is
    /// in `fetch_indexes` the non-prompt tokens are captured.
    pub fn forward(
        &self,
        pct: Tensor<B, 3>,
        spm: Tensor<B, 3>,
        blocks: &[Block<B>],
        first_index: usize,
        fetch_indexes: &[usize],
    ) -> crate::error::Result<InteractionOutput<B>> {
        let layout = PyramidLayout::from_total(spm.dims()[1])?;
        let [batch, _, dim] = spm.dims();
        let levels: Vec<Tensor<B, 3>> = (0..LEVELS)
            .map(|l| spm.clone().slice([0..batch, layout.level_range(l), 0..dim]))
            .collect();

        let pct = match &self.injector {
            Some(injector) => injector.forward(pct, &levels),
            None => pct,
        };

        let mut x = Tensor::cat(vec![self.prompts(&levels), pct], 1);
        let mut fetched = Vec::new();
        for (offset, block) in blocks.iter().enumerate() {
            x = block.forward(x);
            if fetch_indexes.contains(&(first_index + offset)) {
                fetched.push(strip_prompts(x.clone()));
            }
        }

        let mut spm = self.extractor.forward(spm, x.clone());
        for extractor in &self.extra_extractors {
            spm = extractor.forward(spm, x.clone());
        }

        Ok(InteractionOutput {
            pct: strip_prompts(x),
            spm,
            fetched,
        })
    }
}

fn strip_prompts<B: Backend>(x: Tensor<B, 3>) -> Tensor<B, 3> {
    let [batch, tokens, dim] = x.dims();
    x.slice([0..batch, NUM_PROMPTS..tokens, 0..dim])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::transformer::BlockConfig;

    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn blocks(n: usize) -> Vec<Block<TestBackend>> {
        let device = Default::default();
        (0..n)
            .map(|_| BlockConfig::new(16, 2, 32).init(&device))
            .collect()
    }

    #[test]
    fn test_prompts_shape() {
        let device = Default::default();
        let block = InteractionBlockConfig::new(ExtractorConfig::new(16, 2)).init::<TestBackend>(&device);

        let levels: Vec<_> = [64, 16, 4, 1]
            .iter()
            .map(|&n| Tensor::random([2, n, 16], Distribution::Default, &device))
            .collect();

        assert_eq!(block.prompts(&levels).dims(), [2, 3, 16]);
    }

    #[test]
    fn test_interaction_fetches_and_strips_prompts() {
        let device = Default::default();
        let block = InteractionBlockConfig::new(ExtractorConfig::new(16, 2)).init::<TestBackend>(&device);
        let blocks = blocks(3);

        let pct = Tensor::random([2, 4, 16], Distribution::Default, &device);
        let spm = Tensor::random([2, 85, 16], Distribution::Default, &device);

        let out = block.forward(pct, spm, &blocks, 3, &[4, 5]).unwrap();
        assert_eq!(out.pct.dims(), [2, 4, 16]);
        assert_eq!(out.spm.dims(), [2, 85, 16]);
        assert_eq!(out.fetched.len(), 2);
        assert!(out.fetched.iter().all(|f| f.dims() == [2, 4, 16]));
    }

    #[test]
    fn test_interaction_with_injector_and_extras() {
        let device = Default::default();
        let block = InteractionBlockConfig::new(ExtractorConfig::new(16, 2))
            .with_use_injector(true)
            .with_injector_init(0.5)
            .with_extra_extractors(true)
            .init::<TestBackend>(&device);
        let blocks = blocks(1);

        let pct = Tensor::random([1, 4, 16], Distribution::Default, &device);
        let spm = Tensor::random([1, 85, 16], Distribution::Default, &device);

        let out = block.forward(pct, spm, &blocks, 0, &[0]).unwrap();
        assert_eq!(out.fetched.len(), 1);
        assert_eq!(out.spm.dims(), [1, 85, 16]);
    }

    #[test]
    fn test_interaction_rejects_bad_pyramid_length() {
        let device = Default::default();
        let block = InteractionBlockConfig::new(ExtractorConfig::new(16, 2)).init::<TestBackend>(&device);

        let pct = Tensor::random([1, 4, 16], Distribution::Default, &device);
        let spm = Tensor::random([1, 84, 16], Distribution::Default, &device);

        assert!(block.forward(pct, spm, &blocks(1), 0, &[]).is_err());
    }
}
