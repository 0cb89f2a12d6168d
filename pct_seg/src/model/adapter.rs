//! Adapter backbone: transformer branch coupled to the spatial pyramid.

use burn::module::{Ignored, Module, Param};
use burn::nn::{Gelu, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::Distribution;
use pct_core::{PyramidLayout, LEVELS};

use crate::config::SegmentationConfig;
use crate::error::{PctSegError, Result};
use crate::geometry::{points_to_host, BatchPoints};
use crate::nn::{
    group_patches, kaiming_linear, Block, BlockConfig, ExtractorConfig, InteractionBlock,
    InteractionBlockConfig, PatchEncoder, PatchEncoderConfig, Propagation, PropagationConfig,
    SpatialPyramid, SpatialPyramidConfig,
};

const POS_EMBED_HIDDEN: usize = 128;

impl SegmentationConfig {
    /// Initialize the adapter backbone.
    ///
    /// # Errors
    ///
    /// Returns [`PctSegError::InvalidConfig`] when [`SegmentationConfig::validate`] fails.
    pub fn init_adapter<B: Backend>(&self, device: &B::Device) -> Result<PctAdapter<B>> {
        self.validate()?;
        let t = &self.transformer;
        let a = &self.adapter;
        let dim = t.trans_dim;

        let rates = t.drop_path_rates();
        let stages = a
            .interaction_indexes
            .iter()
            .map(|&[first, last]| {
                (first..=last)
                    .map(|i| {
                        BlockConfig::new(dim, t.num_heads, t.mlp_hidden())
                            .with_drop_path(rates[i])
                            .init(device)
                    })
                    .collect()
            })
            .collect();

        let last_stage = a.interaction_indexes.len() - 1;
        let interactions = (0..a.interaction_indexes.len())
            .map(|i| {
                let extractor = ExtractorConfig::new(dim, t.num_heads)
                    .with_with_ffn(a.with_ffn)
                    .with_ffn_ratio(a.ffn_ratio)
                    .with_drop(a.drop)
                    .with_drop_path(a.drop_path);
                InteractionBlockConfig::new(extractor)
                    .with_use_injector(a.use_injector)
                    .with_injector_init(a.injector_init)
                    .with_extra_extractors(a.extra_extractors && i == last_stage)
                    .init(device)
            })
            .collect();

        let propagation = |skip: usize| PropagationConfig::new(dim + skip, vec![4 * dim, dim]).init(device);

        Ok(PctAdapter {
            pyramid: SpatialPyramidConfig::new(dim, self.feature_channels, t.num_group, t.group_size)
                .init(device),
            level_embed: Param::from_tensor(Tensor::random(
                [LEVELS, dim],
                Distribution::Normal(0.0, 1.0),
                device,
            )),
            encoder: PatchEncoderConfig::new(t.encoder_dims).init(device),
            reduce_dim: kaiming_linear(LinearConfig::new(t.encoder_dims, dim), device),
            pos_embed1: kaiming_linear(LinearConfig::new(3, POS_EMBED_HIDDEN), device),
            pos_embed2: kaiming_linear(LinearConfig::new(POS_EMBED_HIDDEN, dim), device),
            activation: Gelu::new(),
            stages,
            interactions,
            propagations: vec![propagation(0), propagation(0), propagation(3)],
            fetch_indexes: Ignored(a.resolved_fetch_indexes()),
            num_group: t.num_group,
            group_size: t.group_size,
        })
    }
}

/// Multi-scale features of the adapter backbone.
#[derive(Debug, Clone)]
pub struct AdapterOutput<B: Backend> {
    /// Fused level features `c1..c4`, finest first, each `[batch, size_l, dim]`.
    pub levels: Vec<Tensor<B, 3>>,
    /// Coordinates from coarse to fine: level 4, 3, 2, 1 and the input cloud.
    pub xyz: Vec<Tensor<B, 3>>,
    /// Host copies of `xyz`, same order.
    pub points: Vec<BatchPoints>,
}

/// Point cloud transformer with spatial-pyramid interaction stages.
#[derive(Module, Debug)]
pub struct PctAdapter<B: Backend> {
    pyramid: SpatialPyramid<B>,
    level_embed: Param<Tensor<B, 2>>,
    encoder: PatchEncoder<B>,
    reduce_dim: Linear<B>,
    pos_embed1: Linear<B>,
    pos_embed2: Linear<B>,
    activation: Gelu,
    stages: Vec<Vec<Block<B>>>,
    interactions: Vec<InteractionBlock<B>>,
    propagations: Vec<Propagation<B>>,
    fetch_indexes: Ignored<Vec<usize>>,
    num_group: usize,
    group_size: usize,
}

impl<B: Backend> PctAdapter<B> {
    /// Forward pass.
    ///
    /// `xyz` is `[batch, points, 3]`, `features` is
    /// `[batch, points, feature_channels]`.
    pub fn forward(&self, xyz: Tensor<B, 3>, features: Tensor<B, 3>) -> Result<AdapterOutput<B>> {
        let [batch, _, _] = xyz.dims();
        let input_points = points_to_host(xyz.clone())?;

        let pyramid = self.pyramid.forward(xyz.clone(), features)?;
        let dim = self.level_embed.val().dims()[1];
        let embedded: Vec<Tensor<B, 3>> = pyramid
            .levels
            .iter()
            .enumerate()
            .map(|(l, level)| {
                let embed = self.level_embed.val().slice([l..l + 1, 0..dim]).unsqueeze::<3>();
                level.clone() + embed
            })
            .collect();
        let mut spm = Tensor::cat(embedded, 1);

        let patches = group_patches(xyz.clone(), &input_points, self.num_group, self.group_size)?;
        let pos = self
            .pos_embed2
            .forward(self.activation.forward(self.pos_embed1.forward(patches.centers)));
        let mut pct = self.reduce_dim.forward(self.encoder.forward(patches.neighborhood)) + pos;

        let mut fetched = Vec::with_capacity(LEVELS);
        let mut first_index = 0;
        for (interaction, blocks) in self.interactions.iter().zip(&self.stages) {
            let out = interaction.forward(pct, spm, blocks, first_index, &self.fetch_indexes.0)?;
            pct = out.pct;
            spm = out.spm;
            fetched.extend(out.fetched);
            first_index += blocks.len();
        }

        let [f1, f2, f3, f4]: [Tensor<B, 3>; LEVELS] =
            fetched.try_into().map_err(|f: Vec<Tensor<B, 3>>| {
                PctSegError::config(format!(
                    "expected {LEVELS} fetched transformer features, got {}",
                    f.len()
                ))
            })?;

        let centers = &patches.center_points;
        let level_points = &pyramid.points;
        let x1 = self.propagations[0].forward(&level_points[0], centers, f1, None)?;
        let x2 = self.propagations[1].forward(&level_points[1], centers, f2, None)?;
        let x4 = self.propagations[2].forward(
            &level_points[3],
            centers,
            f4,
            Some(pyramid.xyz[3].clone()),
        )?;

        let layout = PyramidLayout::new(self.num_group)?;
        let levels = [x1, x2, f3, x4]
            .into_iter()
            .enumerate()
            .map(|(l, x)| spm.clone().slice([0..batch, layout.level_range(l), 0..dim]) + x)
            .collect();

        let mut xyz_list: Vec<Tensor<B, 3>> = pyramid.xyz.into_iter().rev().collect();
        xyz_list.push(xyz);
        let mut points: Vec<BatchPoints> = pyramid.points.into_iter().rev().collect();
        points.push(input_points);

        Ok(AdapterOutput {
            levels,
            xyz: xyz_list,
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdapterConfig, TransformerConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn small() -> SegmentationConfig {
        SegmentationConfig::new(
            TransformerConfig::new()
                .with_trans_dim(32)
                .with_depth(4)
                .with_num_heads(4)
                .with_num_group(8)
                .with_group_size(8)
                .with_encoder_dims(32),
            AdapterConfig::new().with_interaction_indexes(vec![[0, 0], [1, 1], [2, 2], [3, 3]]),
        )
        .with_num_points(128)
    }

    #[test]
    fn test_adapter_output_shapes() {
        let device = Default::default();
        let adapter = small().init_adapter::<TestBackend>(&device).unwrap();

        let xyz = Tensor::random([2, 128, 3], Distribution::Default, &device);
        let features = Tensor::random([2, 128, 1], Distribution::Default, &device);

        let out = adapter.forward(xyz, features).unwrap();
        let sizes: Vec<_> = out.levels.iter().map(|l| l.dims()).collect();
        assert_eq!(sizes, vec![[2, 128, 32], [2, 32, 32], [2, 8, 32], [2, 2, 32]]);

        let xyz_sizes: Vec<_> = out.xyz.iter().map(|t| t.dims()[1]).collect();
        assert_eq!(xyz_sizes, vec![2, 8, 32, 128, 128]);
        assert_eq!(out.points.len(), 5);
        assert_eq!(out.points[0][0].len(), 2);
    }

    #[test]
    fn test_adapter_with_injector_and_extras() {
        let device = Default::default();
        let mut config = small();
        config.adapter.use_injector = true;
        config.adapter.injector_init = 0.1;
        config.adapter.extra_extractors = true;
        config.adapter.interaction_indexes = vec![[0, 1], [2, 3]];
        config.adapter.fetch_indexes = Some(vec![0, 1, 2, 3]);
        let adapter = config.init_adapter::<TestBackend>(&device).unwrap();

        let xyz = Tensor::random([1, 128, 3], Distribution::Default, &device);
        let features = Tensor::zeros([1, 128, 1], &device);

        let out = adapter.forward(xyz, features).unwrap();
        assert_eq!(out.levels[3].dims(), [1, 2, 32]);
    }

    #[test]
    fn test_backbone_linears_start_with_zero_bias() {
        let device = Default::default();
        let adapter = small().init_adapter::<TestBackend>(&device).unwrap();
        for linear in [&adapter.reduce_dim, &adapter.pos_embed1, &adapter.pos_embed2] {
            let bias = linear.bias.as_ref().unwrap().val();
            let max: f32 = bias.abs().max().into_scalar();
            assert_eq!(max, 0.0);
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let device = Default::default();
        let config = small().with_num_points(64);
        assert!(config.init_adapter::<TestBackend>(&device).is_err());
    }
}
