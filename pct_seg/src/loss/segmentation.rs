//! Per-point classification losses.

use burn::prelude::*;

use crate::config::LossConfig;

const DICE_SMOOTH: f32 = 1.0;
const WEIGHT_EPS: f32 = 1e-12;

/// Loss terms of one forward pass.
#[derive(Debug, Clone)]
pub struct LossOutput<B: Backend> {
    /// `main + dice_weight * dice`.
    pub total: Tensor<B, 1>,
    /// Weighted NLL or label-smoothed cross-entropy.
    pub main: Tensor<B, 1>,
    /// Soft dice loss.
    pub dice: Tensor<B, 1>,
}

/// Segmentation loss calculator.
///
/// All methods take log-probabilities `[points, classes]` and integer targets
/// `[points]`. Points labelled with the ignore label contribute nothing.
#[derive(Debug, Clone)]
pub struct SegmentationLoss {
    config: LossConfig,
}

impl SegmentationLoss {
    /// Create a new loss calculator.
    pub fn new(config: LossConfig) -> Self {
        Self { config }
    }

    /// Loss configuration.
    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    /// One-hot targets `[points, classes]` and the valid-point mask `[points]`.
    fn one_hot<B: Backend>(&self, targets: Tensor<B, 1, Int>, classes: usize) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let [n] = targets.dims();
        let device = targets.device();

        let ignored = targets.clone().equal_elem(self.config.ignore_label as i64);
        let valid = ignored.clone().bool_not().float();
        let safe = targets.mask_fill(ignored, 0);

        let classes_row = Tensor::<B, 1, Int>::arange(0..classes as i64, &device)
            .unsqueeze::<2>()
            .repeat_dim(0, n);
        let one_hot = safe
            .unsqueeze_dim::<2>(1)
            .repeat_dim(1, classes)
            .equal(classes_row)
            .float()
            * valid.clone().unsqueeze_dim::<2>(1);

        (one_hot, valid)
    }

    /// Class weights as a `[1, classes]` row.
    fn weights<B: Backend>(&self, classes: usize, device: &B::Device) -> Tensor<B, 2> {
        match &self.config.class_weights {
            Some(weights) => {
                Tensor::<B, 1>::from_data(TensorData::new(weights.clone(), [weights.len()]), device)
                    .unsqueeze()
            }
            None => Tensor::ones([1, classes], device),
        }
    }

    /// Weighted negative log-likelihood.
    ///
    /// L = Σᵢ w[yᵢ]·(−log pᵢ[yᵢ]) / Σᵢ w[yᵢ] over non-ignored points.
    pub fn nll_loss<B: Backend>(&self, log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [_, classes] = log_probs.dims();
        let device = log_probs.device();
        let (one_hot, _) = self.one_hot(targets, classes);
        let weighted = one_hot * self.weights::<B>(classes, &device);

        let numerator = (weighted.clone() * log_probs).sum().neg();
        let denominator = weighted.sum().clamp_min(WEIGHT_EPS);
        numerator / denominator
    }

    /// Label-smoothed cross-entropy.
    ///
    /// The target class gets `1 − ε`, every other class `ε / (C − 1)`; each
    /// class column is scaled by its weight and the result is averaged over
    /// non-ignored points.
    pub fn smoothed_loss<B: Backend>(&self, log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [_, classes] = log_probs.dims();
        let device = log_probs.device();
        let eps = self.config.label_smoothing;
        let off = if classes > 1 { eps / (classes - 1) as f32 } else { 0.0 };

        let (one_hot, valid) = self.one_hot(targets, classes);
        let smoothed = (one_hot * (1.0 - eps - off)).add_scalar(off) * valid.clone().unsqueeze_dim::<2>(1);
        let per_point = (smoothed * log_probs * self.weights::<B>(classes, &device)).sum_dim(1);

        per_point.sum().neg() / valid.sum().clamp_min(WEIGHT_EPS)
    }

    /// Soft dice loss over softmax probabilities.
    ///
    /// L = 1 − mean_c (2·I_c + 1) / (P_c + T_c + 1).
    pub fn dice_loss<B: Backend>(&self, log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let [_, classes] = log_probs.dims();
        let (one_hot, valid) = self.one_hot(targets, classes);
        let probs = log_probs.exp() * valid.unsqueeze_dim::<2>(1);

        let intersection = (probs.clone() * one_hot.clone()).sum_dim(0);
        let cardinality = probs.sum_dim(0) + one_hot.sum_dim(0);
        let dice = (intersection * 2.0).add_scalar(DICE_SMOOTH) / cardinality.add_scalar(DICE_SMOOTH);

        dice.mean().neg().add_scalar(1.0)
    }

    /// Main term plus weighted dice term.
    pub fn forward<B: Backend>(&self, log_probs: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> LossOutput<B> {
        let main = if self.config.label_smoothing > 0.0 {
            self.smoothed_loss(log_probs.clone(), targets.clone())
        } else {
            self.nll_loss(log_probs.clone(), targets.clone())
        };
        let dice = self.dice_loss(log_probs, targets);
        let total = main.clone() + dice.clone() * self.config.dice_weight;

        LossOutput { total, main, dice }
    }

    /// Flatten `[batch, points, classes]` / `[batch, points]` and apply [`Self::forward`].
    pub fn forward_batch<B: Backend>(&self, log_probs: Tensor<B, 3>, targets: Tensor<B, 2, Int>) -> LossOutput<B> {
        let [batch, points, classes] = log_probs.dims();
        self.forward(
            log_probs.reshape([batch * points, classes]),
            targets.reshape([batch * points]),
        )
    }
}
