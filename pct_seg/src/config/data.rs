//! Data pipeline configuration: augmentation and crop preprocessing.

use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::error::PctSegError;

/// How crop coordinates are re-centred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizeMode {
    /// Subtract the per-axis mean.
    Mean,
    /// Subtract the per-axis minimum.
    Min,
}

/// Configuration for training-time coordinate augmentation.
#[derive(Config, Debug)]
pub struct AugmentationConfig {
    /// Scale is drawn from `1 ± scale_factor`.
    #[config(default = 0.1)]
    pub scale_factor: f32,

    /// Draw an independent scale per axis.
    #[config(default = true)]
    pub scale_anisotropic: bool,

    /// Probability of scaling.
    #[config(default = 1.0)]
    pub scale_prob: f32,

    /// Standard deviation of the Gaussian jitter.
    #[config(default = 0.03)]
    pub pert_factor: f32,

    /// Jitter is clipped to `±pert_clip`.
    #[config(default = 0.05)]
    pub pert_clip: f32,

    /// Probability of jittering.
    #[config(default = 1.0)]
    pub pert_prob: f32,

    /// Probability of a random rotation about the z axis.
    #[config(default = 0.5)]
    pub rot_prob: f32,

    /// Maximum absolute shift per axis.
    #[config(default = "[0.1, 0.1, 0.1]")]
    pub shifts: [f32; 3],

    /// Probability of shifting.
    #[config(default = 1.0)]
    pub shift_prob: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AugmentationConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        let probs = [self.scale_prob, self.pert_prob, self.rot_prob, self.shift_prob];
        if probs.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(PctSegError::config("augmentation probabilities must lie in [0, 1]"));
        }
        if !(0.0..1.0).contains(&self.scale_factor) {
            return Err(PctSegError::config("scale_factor must lie in [0, 1)"));
        }
        if self.pert_factor < 0.0 || self.pert_clip < 0.0 || self.shifts.iter().any(|s| *s < 0.0) {
            return Err(PctSegError::config("jitter and shift magnitudes must be non-negative"));
        }
        Ok(())
    }
}

/// Configuration for turning a scene into a fixed-size crop.
#[derive(Config, Debug)]
pub struct PreprocessConfig {
    /// Points per crop.
    #[config(default = 10000)]
    pub num_points: usize,

    /// Voxel edge for grid subsampling. `None` disables subsampling.
    #[config(default = "Some(0.5)")]
    pub voxel_size: Option<f32>,

    /// Shuffle point order inside the crop.
    #[config(default = true)]
    pub shuffle: bool,

    /// Coordinate re-centring.
    #[config(default = "NormalizeMode::Mean")]
    pub normalize: NormalizeMode,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PreprocessConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.num_points == 0 {
            return Err(PctSegError::config("num_points must be positive"));
        }
        if matches!(self.voxel_size, Some(v) if v <= 0.0) {
            return Err(PctSegError::config("voxel_size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let aug = AugmentationConfig::default();
        assert!(aug.validate().is_ok());
        assert_eq!(aug.shifts, [0.1, 0.1, 0.1]);

        let pre = PreprocessConfig::default();
        assert!(pre.validate().is_ok());
        assert_eq!(pre.voxel_size, Some(0.5));
        assert_eq!(pre.normalize, NormalizeMode::Mean);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(AugmentationConfig::new().with_rot_prob(1.5).validate().is_err());
        assert!(AugmentationConfig::new().with_scale_factor(-0.1).validate().is_err());
        assert!(PreprocessConfig::new().with_num_points(0).validate().is_err());
        assert!(PreprocessConfig::new()
            .with_voxel_size(Some(0.0))
            .validate()
            .is_err());
    }
}
