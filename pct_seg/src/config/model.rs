//! Model configuration types: transformer branch, adapter and segmentation head.

use burn::config::Config;
use pct_core::NUM_CLASSES;

use crate::error::PctSegError;

/// Configuration for the point cloud transformer branch.
#[derive(Config, Debug)]
pub struct TransformerConfig {
    /// Token width.
    #[config(default = 384)]
    pub trans_dim: usize,

    /// Number of transformer blocks.
    #[config(default = 12)]
    pub depth: usize,

    /// Attention heads per block.
    #[config(default = 6)]
    pub num_heads: usize,

    /// Upper bound of the stochastic depth schedule.
    #[config(default = 0.1)]
    pub drop_path_rate: f64,

    /// Hidden width of the block MLP relative to `trans_dim`.
    #[config(default = 4.0)]
    pub mlp_ratio: f64,

    /// Number of patches sampled from the input cloud.
    #[config(default = 256)]
    pub num_group: usize,

    /// Points per patch. Also the neighbourhood size of the pyramid branch.
    #[config(default = 32)]
    pub group_size: usize,

    /// Output width of the patch encoder.
    #[config(default = 384)]
    pub encoder_dims: usize,
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformerConfig {
    /// Head width.
    pub fn head_dim(&self) -> usize {
        self.trans_dim / self.num_heads
    }

    /// Hidden width of the block MLP.
    pub fn mlp_hidden(&self) -> usize {
        (self.trans_dim as f64 * self.mlp_ratio) as usize
    }

    /// Stochastic depth rate of every block, linearly spaced from 0 to `drop_path_rate`.
    pub fn drop_path_rates(&self) -> Vec<f64> {
        match self.depth {
            0 => Vec::new(),
            1 => vec![0.0],
            depth => (0..depth)
                .map(|i| self.drop_path_rate * i as f64 / (depth - 1) as f64)
                .collect(),
        }
    }
}

/// Configuration for the adapter that couples the pyramid and transformer branches.
#[derive(Config, Debug)]
pub struct AdapterConfig {
    /// Inclusive `[first, last]` block range of every interaction.
    #[config(default = "vec![[0, 2], [3, 5], [6, 8], [9, 11]]")]
    pub interaction_indexes: Vec<[usize; 2]>,

    /// Global block indices after which transformer tokens are fetched.
    /// Defaults to the last block of every interaction.
    #[config(default = "None")]
    pub fetch_indexes: Option<Vec<usize>>,

    /// Hidden width of the extractor feed-forward relative to the token width.
    #[config(default = 0.25)]
    pub ffn_ratio: f64,

    /// Whether extractors carry a feed-forward branch.
    #[config(default = true)]
    pub with_ffn: bool,

    /// Dropout inside the extractor feed-forward.
    #[config(default = 0.0)]
    pub drop: f64,

    /// Stochastic depth on the extractor feed-forward.
    #[config(default = 0.0)]
    pub drop_path: f64,

    /// Whether pyramid tokens are injected back into the transformer stream.
    #[config(default = false)]
    pub use_injector: bool,

    /// Initial value of the injector level gates.
    #[config(default = 0.0)]
    pub injector_init: f64,

    /// Whether the last interaction runs two additional extractors.
    #[config(default = false)]
    pub extra_extractors: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterConfig {
    /// Resolved fetch indices.
    pub fn resolved_fetch_indexes(&self) -> Vec<usize> {
        match &self.fetch_indexes {
            Some(indexes) => indexes.clone(),
            None => self.interaction_indexes.iter().map(|r| r[1]).collect(),
        }
    }
}

/// Configuration for the full segmentation model.
#[derive(Config, Debug)]
pub struct SegmentationConfig {
    /// Transformer branch.
    pub transformer: TransformerConfig,

    /// Adapter between branches.
    pub adapter: AdapterConfig,

    /// Number of semantic classes.
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,

    /// Per-point feature channels besides xyz.
    #[config(default = 1)]
    pub feature_channels: usize,

    /// Points per input crop.
    #[config(default = 10000)]
    pub num_points: usize,

    /// Dropout of the classifier.
    #[config(default = 0.5)]
    pub head_dropout: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self::new(TransformerConfig::default(), AdapterConfig::default())
    }
}

impl SegmentationConfig {
    /// Token width shared by both branches.
    pub fn dim(&self) -> usize {
        self.transformer.trans_dim
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> crate::error::Result<()> {
        let t = &self.transformer;
        if t.trans_dim == 0 || t.num_heads == 0 || t.depth == 0 {
            return Err(PctSegError::config(
                "trans_dim, num_heads and depth must be positive",
            ));
        }
        if t.trans_dim % t.num_heads != 0 {
            return Err(PctSegError::config(format!(
                "trans_dim {} is not divisible by num_heads {}",
                t.trans_dim, t.num_heads
            )));
        }
        // The pyramid stages run at trans_dim/4 .. 2*trans_dim and bilinear
        // projections divide each width by 8.
        if t.trans_dim % 32 != 0 {
            return Err(PctSegError::config(format!(
                "trans_dim {} must be a multiple of 32",
                t.trans_dim
            )));
        }
        if t.num_group == 0 || t.num_group % 4 != 0 {
            return Err(PctSegError::config(format!(
                "num_group {} must be a positive multiple of 4",
                t.num_group
            )));
        }
        if t.group_size == 0 {
            return Err(PctSegError::config("group_size must be positive"));
        }
        if 16 * t.num_group > self.num_points {
            return Err(PctSegError::config(format!(
                "num_points {} is smaller than the finest pyramid level 16 * {}",
                self.num_points, t.num_group
            )));
        }
        if self.num_classes == 0 {
            return Err(PctSegError::config("num_classes must be positive"));
        }
        self.validate_interactions()
    }

    fn validate_interactions(&self) -> crate::error::Result<()> {
        let ranges = &self.adapter.interaction_indexes;
        if ranges.is_empty() {
            return Err(PctSegError::config("at least one interaction is required"));
        }

        let mut next = 0;
        for range in ranges {
            let [first, last] = *range;
            if first != next || last < first {
                return Err(PctSegError::config(format!(
                    "interaction range {first}..={last} must start at block {next}"
                )));
            }
            if last >= self.transformer.depth {
                return Err(PctSegError::config(format!(
                    "interaction range {first}..={last} exceeds depth {}",
                    self.transformer.depth
                )));
            }
            next = last + 1;
        }

        let fetch = self.adapter.resolved_fetch_indexes();
        if fetch.len() != pct_core::LEVELS {
            return Err(PctSegError::config(format!(
                "exactly {} fetch indexes are required, got {}",
                pct_core::LEVELS,
                fetch.len()
            )));
        }
        if fetch.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PctSegError::config("fetch indexes must be strictly increasing"));
        }
        if let Some(&bad) = fetch.iter().find(|&&idx| idx >= next) {
            return Err(PctSegError::config(format!(
                "fetch index {bad} is not covered by any interaction"
            )));
        }
        Ok(())
    }
}
