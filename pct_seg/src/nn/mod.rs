//! Network building blocks.
//!
//! This module provides:
//! - Transformer branch: patch grouping, patch encoder and pre-norm blocks
//! - Spatial pyramid: set abstraction and local context levels
//! - Adapter glue: cross-attention, extractor, injector and interaction stages
//! - Decoders: feature propagation from sparse to dense points
//!
//! Point features are channels-last throughout (`[batch, points, channels]`).

pub mod cross_attention;
pub mod extractor;
pub mod injector;
pub mod interaction;
pub mod mlp;
pub mod patch;
pub mod pnp3d;
pub mod propagation;
pub mod set_abstraction;
pub mod spm;
pub mod transformer;

pub use cross_attention::{CrossAttention, CrossAttentionConfig};
pub use extractor::{Extractor, ExtractorConfig, SpmFeedForward, SpmFeedForwardConfig};
pub use injector::{Injector, InjectorConfig};
pub use interaction::{InteractionBlock, InteractionBlockConfig, InteractionOutput, NUM_PROMPTS};
pub use mlp::{kaiming_linear, LinearBnRelu, LinearBnReluConfig, SharedMlp, SharedMlpConfig, KAIMING_GAIN};
pub use patch::{group_patches, PatchEncoder, PatchEncoderConfig, Patches};
pub use pnp3d::{PnP3d, PnP3dConfig};
pub use propagation::{
    Propagation, PropagationConfig, ResidualPropagation, ResidualPropagationConfig,
};
pub use set_abstraction::{Abstracted, SetAbstraction, SetAbstractionConfig};
pub use spm::{PyramidOutput, SpatialPyramid, SpatialPyramidConfig};
pub use transformer::{
    Attention, AttentionConfig, Block, BlockConfig, DropPath, FeedForward, FeedForwardConfig,
};
