//! Learning rate schedules and optimizer construction.

use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamWConfig, SgdConfig};

use crate::config::{LrSchedule, TrainingConfig};

/// Learning rate for `epoch` (zero-based).
///
/// Cosine annealing goes from `base` at epoch 0 to `min` at `max_epoch`.
/// The step schedule multiplies `base` by the factor of the last milestone
/// already reached.
pub fn learning_rate(
    schedule: LrSchedule,
    base: f64,
    min: f64,
    epoch: usize,
    max_epoch: usize,
    milestones: &[(usize, f64)],
) -> f64 {
    match schedule {
        LrSchedule::Cosine => {
            if max_epoch == 0 {
                return base;
            }
            let progress = epoch.min(max_epoch) as f64 / max_epoch as f64;
            min + 0.5 * (base - min) * (1.0 + (std::f64::consts::PI * progress).cos())
        }
        LrSchedule::Step => {
            let factor = milestones
                .iter()
                .filter(|(at, _)| epoch >= *at)
                .max_by_key(|(at, _)| *at)
                .map_or(1.0, |(_, f)| *f);
            base * factor
        }
    }
}

/// AdamW with the configured decoupled weight decay.
pub fn adamw_config(config: &TrainingConfig) -> AdamWConfig {
    AdamWConfig::new().with_weight_decay(config.weight_decay as f32)
}

/// SGD with momentum and L2 weight decay.
pub fn sgd_config(config: &TrainingConfig) -> SgdConfig {
    SgdConfig::new()
        .with_momentum(Some(MomentumConfig::new().with_momentum(config.momentum)))
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay as f32)))
}
