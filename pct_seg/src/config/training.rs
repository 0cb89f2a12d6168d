//! Training configuration types.

use burn::config::Config;
use pct_core::IGNORE_LABEL;
use serde::{Deserialize, Serialize};

use super::SegmentationConfig;
use crate::error::PctSegError;

/// Optimizer family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// AdamW with decoupled weight decay.
    AdamW,
    /// SGD with momentum and L2 weight decay.
    Sgd,
}

/// Per-epoch learning rate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LrSchedule {
    /// Cosine annealing from the base rate to `min_lr` over `max_epoch` epochs.
    Cosine,
    /// Piecewise constant rate with multipliers that take effect at milestone epochs.
    Step,
}

/// Configuration for the segmentation loss.
#[derive(Config, Debug)]
pub struct LossConfig {
    /// Per-class weights of the main term. `None` weighs all classes equally.
    #[config(default = "None")]
    pub class_weights: Option<Vec<f32>>,

    /// Target label excluded from the loss.
    #[config(default = "IGNORE_LABEL")]
    pub ignore_label: u8,

    /// Label smoothing factor. Zero selects plain weighted NLL.
    #[config(default = 0.0)]
    pub label_smoothing: f32,

    /// Weight of the dice term.
    #[config(default = 1.0)]
    pub dice_weight: f32,
}

impl Default for LossConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the segmentation trainer.
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Model configuration.
    pub model: SegmentationConfig,

    /// Loss configuration.
    pub loss: LossConfig,

    /// Training batch size.
    #[config(default = 4)]
    pub batch_size: usize,

    /// Evaluation batch size.
    #[config(default = 4)]
    pub test_batch_size: usize,

    /// Number of epochs.
    #[config(default = 200)]
    pub max_epoch: usize,

    /// Base learning rate.
    #[config(default = 5e-4)]
    pub learning_rate: f64,

    /// Floor of the cosine schedule.
    #[config(default = 1e-6)]
    pub min_lr: f64,

    /// Weight decay.
    #[config(default = 1e-4)]
    pub weight_decay: f64,

    /// SGD momentum.
    #[config(default = 0.9)]
    pub momentum: f64,

    /// Optimizer family.
    #[config(default = "OptimizerKind::AdamW")]
    pub optimizer: OptimizerKind,

    /// Learning rate schedule.
    #[config(default = "LrSchedule::Cosine")]
    pub schedule: LrSchedule,

    /// `(epoch, multiplier)` pairs of the step schedule.
    #[config(default = "vec![(120, 0.1), (160, 0.01)]")]
    pub step_milestones: Vec<(usize, f64)>,

    /// Seed for shuffling, augmentation and initialisation.
    #[config(default = 42)]
    pub seed: u64,

    /// Batches between progress log lines. Zero turns per-batch logging
    /// off; epoch summaries are always logged.
    #[config(default = 10)]
    pub log_interval: usize,

    /// Data loader worker threads.
    #[config(default = 1)]
    pub num_workers: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::new(SegmentationConfig::default(), LossConfig::default())
    }
}

impl TrainingConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.model.validate()?;

        if self.learning_rate <= 0.0 {
            return Err(PctSegError::config("learning_rate must be positive"));
        }
        if self.min_lr < 0.0 || self.min_lr > self.learning_rate {
            return Err(PctSegError::config("min_lr must lie in [0, learning_rate]"));
        }
        if self.batch_size == 0 || self.test_batch_size == 0 {
            return Err(PctSegError::config("batch sizes must be positive"));
        }
        if self.max_epoch == 0 {
            return Err(PctSegError::config("max_epoch must be positive"));
        }
        if !(0.0..1.0).contains(&self.loss.label_smoothing) {
            return Err(PctSegError::config("label_smoothing must lie in [0, 1)"));
        }
        if let Some(weights) = &self.loss.class_weights {
            if weights.len() != self.model.num_classes {
                return Err(PctSegError::config(format!(
                    "{} class weights given for {} classes",
                    weights.len(),
                    self.model.num_classes
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_training_config() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.optimizer, OptimizerKind::AdamW);
        assert_eq!(config.schedule, LrSchedule::Cosine);
        assert_eq!(config.loss.ignore_label, 255);
    }

    #[test]
    fn test_builder_pattern() {
        let config = TrainingConfig::default()
            .with_learning_rate(1e-3)
            .with_optimizer(OptimizerKind::Sgd)
            .with_schedule(LrSchedule::Step);

        assert_eq!(config.learning_rate, 1e-3);
        assert_eq!(config.step_milestones, vec![(120, 0.1), (160, 0.01)]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = TrainingConfig::default().with_learning_rate(0.0);
        assert!(config.validate().is_err());

        let config = TrainingConfig::default().with_batch_size(0);
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.loss.class_weights = Some(vec![1.0; 3]);
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.loss.label_smoothing = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = TrainingConfig::default()
            .with_optimizer(OptimizerKind::Sgd)
            .with_max_epoch(3);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.json");
        config.save(&path).unwrap();

        let loaded = TrainingConfig::load(&path).unwrap();
        assert_eq!(loaded.optimizer, OptimizerKind::Sgd);
        assert_eq!(loaded.max_epoch, 3);
        assert_eq!(loaded.model.transformer.trans_dim, 384);
    }
}
