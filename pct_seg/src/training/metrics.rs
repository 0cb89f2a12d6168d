//! Training and evaluation metrics.

use pct_core::{AreaStats, SegmentationMeter, CLASS_NAMES};

/// Scalar summary of training steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainMetrics {
    /// Total loss.
    pub loss: f64,
    /// Main classification term.
    pub main_loss: f64,
    /// Dice term.
    pub dice_loss: f64,
    /// Point accuracy over non-ignored points.
    pub accuracy: f64,
    /// Learning rate used.
    pub learning_rate: f64,
    /// Number of optimizer steps.
    pub step: usize,
}

impl TrainMetrics {
    /// Log metrics at info level.
    pub fn log(&self, prefix: &str) {
        log::info!(
            "{} step={} loss={:.4} main={:.4} dice={:.4} acc={:.4} lr={:.2e}",
            prefix,
            self.step,
            self.loss,
            self.main_loss,
            self.dice_loss,
            self.accuracy,
            self.learning_rate,
        );
    }
}

/// Result of one optimizer step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Scalar metrics of the step.
    pub metrics: TrainMetrics,
    /// Confusion areas of the step.
    pub stats: AreaStats,
}

/// Metrics over a full evaluation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    /// Mean loss.
    pub loss: f64,
    /// Mean IoU.
    pub miou: f64,
    /// Mean class accuracy.
    pub macc: f64,
    /// Overall point accuracy.
    pub oa: f64,
    /// IoU of every class.
    pub iou_per_class: Vec<f64>,
    /// Accuracy of every class.
    pub accuracy_per_class: Vec<f64>,
    /// Non-ignored target points per class.
    pub label_distribution: Vec<u64>,
}

impl EvaluationReport {
    /// Summarise an accumulated meter.
    pub fn from_meter(meter: &SegmentationMeter, loss: f64) -> Self {
        Self {
            loss,
            miou: meter.mean_iou(),
            macc: meter.mean_accuracy(),
            oa: meter.overall_accuracy(),
            iou_per_class: meter.iou_per_class(),
            accuracy_per_class: meter.accuracy_per_class(),
            label_distribution: meter.stats().target.clone(),
        }
    }

    /// Log the summary and one line per class.
    pub fn log(&self, prefix: &str) {
        log::info!(
            "{} loss={:.4} mIoU={:.4} mAcc={:.4} OA={:.4}",
            prefix,
            self.loss,
            self.miou,
            self.macc,
            self.oa
        );
        for (i, (iou, acc)) in self.iou_per_class.iter().zip(&self.accuracy_per_class).enumerate() {
            let count = self.label_distribution.get(i).copied().unwrap_or(0);
            match CLASS_NAMES.get(i).filter(|_| self.iou_per_class.len() == CLASS_NAMES.len()) {
                Some(name) => log::info!("  {name:<12} iou={iou:.4} acc={acc:.4} points={count}"),
                None => log::info!("  class {i:<6} iou={iou:.4} acc={acc:.4} points={count}"),
            }
        }
    }
}

/// Which tracked metrics improved in [`BestMetrics::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Improvement {
    /// Mean IoU improved.
    pub miou: bool,
    /// Overall accuracy improved.
    pub oa: bool,
    /// Mean class accuracy improved.
    pub macc: bool,
}

impl Improvement {
    /// Any metric improved.
    pub fn any(&self) -> bool {
        self.miou || self.oa || self.macc
    }
}

/// Best validation metrics so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BestMetrics {
    /// Best mean IoU.
    pub miou: f64,
    /// Epoch of the best mean IoU.
    pub miou_epoch: Option<usize>,
    /// Best overall accuracy.
    pub oa: f64,
    /// Best mean class accuracy.
    pub macc: f64,
}

impl BestMetrics {
    /// Record `report` of `epoch` and report which metrics improved.
    pub fn update(&mut self, report: &EvaluationReport, epoch: usize) -> Improvement {
        let improvement = Improvement {
            miou: report.miou > self.miou,
            oa: report.oa > self.oa,
            macc: report.macc > self.macc,
        };
        if improvement.miou {
            self.miou = report.miou;
            self.miou_epoch = Some(epoch);
        }
        if improvement.oa {
            self.oa = report.oa;
        }
        if improvement.macc {
            self.macc = report.macc;
        }
        improvement
    }
}

/// Summary of one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    /// Zero-based epoch.
    pub epoch: usize,
    /// Averaged training metrics.
    pub train: TrainMetrics,
    /// Training mean IoU.
    pub train_miou: f64,
    /// Validation report, if a validation set was given.
    pub valid: Option<EvaluationReport>,
}

/// Everything [`super::SegmentationTrainer::fit`] recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    /// Per-epoch summaries.
    pub epochs: Vec<EpochSummary>,
    /// Best validation metrics.
    pub best: BestMetrics,
}

impl TrainingHistory {
    /// Mean training loss of every epoch.
    pub fn train_losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.train.loss).collect()
    }
}
