//! Segmentation trainer.

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

use pct_core::{intersection_and_union, AverageMeter, SegmentationMeter};

use crate::config::{OptimizerKind, TrainingConfig};
use crate::data::{SceneDataset, SegmentationBatch, SegmentationBatcher};
use crate::error::{PctSegError, Result};
use crate::loss::SegmentationLoss;
use crate::model::SegmentationModel;

use super::metrics::{
    BestMetrics, EpochSummary, EvaluationReport, StepOutput, TrainMetrics, TrainingHistory,
};
use super::optimizer::{adamw_config, learning_rate, sgd_config};

/// Owns the model and drives optimisation and evaluation.
#[derive(Debug)]
pub struct SegmentationTrainer<B: AutodiffBackend> {
    model: SegmentationModel<B>,
    loss: SegmentationLoss,
    config: TrainingConfig,
    device: B::Device,
    step: usize,
}

impl<B: AutodiffBackend> SegmentationTrainer<B> {
    /// Build the model from a validated configuration.
    pub fn new(config: TrainingConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        B::seed(config.seed);
        let model = config.model.init(device)?;
        log::info!(
            "trainer: {} params, {:?} optimizer, {:?} schedule",
            model.num_params(),
            config.optimizer,
            config.schedule
        );
        Ok(Self {
            model,
            loss: SegmentationLoss::new(config.loss.clone()),
            config,
            device: device.clone(),
            step: 0,
        })
    }

    /// Training configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Current model.
    pub fn model(&self) -> &SegmentationModel<B> {
        &self.model
    }

    /// Consume the trainer, returning the model.
    pub fn into_model(self) -> SegmentationModel<B> {
        self.model
    }

    /// Learning rate of `epoch` under the configured schedule.
    pub fn learning_rate(&self, epoch: usize) -> f64 {
        let c = &self.config;
        learning_rate(
            c.schedule,
            c.learning_rate,
            c.min_lr,
            epoch,
            c.max_epoch,
            &c.step_milestones,
        )
    }

    /// One forward, backward and optimizer step.
    pub fn train_step<O>(&mut self, batch: SegmentationBatch<B>, optim: &mut O, lr: f64) -> Result<StepOutput>
    where
        O: Optimizer<SegmentationModel<B>, B>,
    {
        let output = self.model.forward_classification(batch, &self.loss)?;

        let stats = area_stats(
            output.log_probs.argmax(2).squeeze(2),
            output.targets,
            self.config.model.num_classes,
            self.config.loss.ignore_label,
        )?;
        let loss = output.loss.total.clone().into_scalar().elem::<f64>();
        if !loss.is_finite() {
            return Err(PctSegError::TrainingError {
                message: format!("non-finite loss at step {}", self.step),
            });
        }

        let grads = output.loss.total.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = optim.step(lr, self.model.clone(), grads);
        self.step += 1;

        let correct: u64 = stats.intersection.iter().sum();
        let total: u64 = stats.target.iter().sum();
        let metrics = TrainMetrics {
            loss,
            main_loss: output.loss.main.into_scalar().elem::<f64>(),
            dice_loss: output.loss.dice.into_scalar().elem::<f64>(),
            accuracy: if total > 0 { correct as f64 / total as f64 } else { 0.0 },
            learning_rate: lr,
            step: self.step,
        };
        Ok(StepOutput { metrics, stats })
    }

    /// One pass over `loader`. Returns averaged metrics and the training mIoU.
    pub fn train_epoch<O>(
        &mut self,
        loader: &dyn DataLoader<SegmentationBatch<B>>,
        optim: &mut O,
        lr: f64,
    ) -> Result<(TrainMetrics, f64)>
    where
        O: Optimizer<SegmentationModel<B>, B>,
    {
        let mut loss = AverageMeter::new();
        let mut main = AverageMeter::new();
        let mut dice = AverageMeter::new();
        let mut meter = SegmentationMeter::new(
            self.config.model.num_classes,
            self.config.loss.ignore_label,
        );

        for (i, batch) in loader.iter().enumerate() {
            let n = batch.batch_size();
            let out = self.train_step(batch, optim, lr)?;
            loss.update(out.metrics.loss, n);
            main.update(out.metrics.main_loss, n);
            dice.update(out.metrics.dice_loss, n);
            meter.accumulate(&out.stats);

            if self.config.log_interval > 0 && (i + 1) % self.config.log_interval == 0 {
                out.metrics.log(&format!("batch {}", i + 1));
            }
        }

        let metrics = TrainMetrics {
            loss: loss.avg,
            main_loss: main.avg,
            dice_loss: dice.avg,
            accuracy: meter.overall_accuracy(),
            learning_rate: lr,
            step: self.step,
        };
        Ok((metrics, meter.mean_iou()))
    }

    /// Evaluate on the inner backend with dropout disabled.
    pub fn evaluate(
        &self,
        loader: &dyn DataLoader<SegmentationBatch<B::InnerBackend>>,
    ) -> Result<EvaluationReport> {
        let model = self.model.valid();
        let mut loss = AverageMeter::new();
        let mut meter = SegmentationMeter::new(
            self.config.model.num_classes,
            self.config.loss.ignore_label,
        );

        for batch in loader.iter() {
            let n = batch.batch_size();
            let output = model.forward_classification(batch, &self.loss)?;
            loss.update(output.loss.total.into_scalar().elem::<f64>(), n);
            let stats = area_stats(
                output.log_probs.argmax(2).squeeze(2),
                output.targets,
                self.config.model.num_classes,
                self.config.loss.ignore_label,
            )?;
            meter.accumulate(&stats);
        }

        Ok(EvaluationReport::from_meter(&meter, loss.avg))
    }

    /// Train for `max_epoch` epochs, evaluating after each one when `valid` is given.
    pub fn fit(&mut self, train: SceneDataset, valid: Option<SceneDataset>) -> Result<TrainingHistory> {
        match self.config.optimizer {
            OptimizerKind::AdamW => {
                let mut optim = adamw_config(&self.config).init::<B, SegmentationModel<B>>();
                self.fit_with(&mut optim, train, valid)
            }
            OptimizerKind::Sgd => {
                let mut optim = sgd_config(&self.config).init::<B, SegmentationModel<B>>();
                self.fit_with(&mut optim, train, valid)
            }
        }
    }

    fn fit_with<O>(
        &mut self,
        optim: &mut O,
        train: SceneDataset,
        valid: Option<SceneDataset>,
    ) -> Result<TrainingHistory>
    where
        O: Optimizer<SegmentationModel<B>, B>,
    {
        let c = &self.config;
        let mut train_builder = DataLoaderBuilder::new(SegmentationBatcher::<B>::new(self.device.clone()))
            .batch_size(c.batch_size)
            .shuffle(c.seed);
        let mut valid_builder =
            DataLoaderBuilder::new(SegmentationBatcher::<B::InnerBackend>::new(self.device.clone()))
                .batch_size(c.test_batch_size);
        // Zero workers loads batches on the calling thread.
        if c.num_workers > 0 {
            train_builder = train_builder.num_workers(c.num_workers);
            valid_builder = valid_builder.num_workers(c.num_workers);
        }
        let train_loader = train_builder.build(train);
        let valid_loader = valid.map(|dataset| valid_builder.build(dataset));

        let mut history = TrainingHistory::default();
        for epoch in 0..self.config.max_epoch {
            let lr = self.learning_rate(epoch);
            let (train_metrics, train_miou) = self.train_epoch(&*train_loader, optim, lr)?;
            log::info!(
                "epoch {}/{} lr={:.2e} loss={:.4} acc={:.4} mIoU={:.4}",
                epoch + 1,
                self.config.max_epoch,
                lr,
                train_metrics.loss,
                train_metrics.accuracy,
                train_miou
            );

            let report = match &valid_loader {
                Some(loader) => {
                    let report = self.evaluate(&**loader)?;
                    report.log(&format!("epoch {} validation", epoch + 1));
                    let improved = history.best.update(&report, epoch);
                    if improved.miou {
                        log::info!("new best mIoU {:.4} at epoch {}", report.miou, epoch + 1);
                    }
                    Some(report)
                }
                None => None,
            };

            history.epochs.push(EpochSummary {
                epoch,
                train: train_metrics,
                train_miou,
                valid: report,
            });
        }

        log_best(&history.best);
        Ok(history)
    }
}

fn log_best(best: &BestMetrics) {
    match best.miou_epoch {
        Some(epoch) => log::info!(
            "best mIoU {:.4} (epoch {}), best OA {:.4}, best mAcc {:.4}",
            best.miou,
            epoch + 1,
            best.oa,
            best.macc
        ),
        None => log::info!("training finished without validation"),
    }
}

/// Confusion areas of predicted and target label tensors.
fn area_stats<B: Backend>(
    pred: Tensor<B, 2, Int>,
    target: Tensor<B, 2, Int>,
    num_classes: usize,
    ignore: u8,
) -> Result<pct_core::AreaStats> {
    let pred = labels_to_host(pred)?;
    let target = labels_to_host(target)?;
    Ok(intersection_and_union(&pred, &target, num_classes, ignore)?)
}

fn labels_to_host<B: Backend>(labels: Tensor<B, 2, Int>) -> Result<Vec<u8>> {
    let values = labels
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| PctSegError::InvalidData(format!("{e:?}")))?;
    values
        .into_iter()
        .map(|v| {
            u8::try_from(v).map_err(|_| PctSegError::InvalidData(format!("label {v} out of range")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AdapterConfig, LossConfig, LrSchedule, PreprocessConfig, SegmentationConfig,
        TransformerConfig,
    };
    use crate::data::{Preprocessor, Scene};
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::batcher::Batcher;
    use pct_core::Point3;

    type TestBackend = Autodiff<NdArray>;

    fn config() -> TrainingConfig {
        let model = SegmentationConfig::new(
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
        .with_num_classes(3);
        TrainingConfig::new(model, LossConfig::new())
            .with_batch_size(2)
            .with_test_batch_size(2)
            .with_max_epoch(2)
            .with_learning_rate(1e-3)
            .with_num_workers(0)
    }

    fn scene(seed: usize) -> Scene {
        let coords: Vec<Point3> = (0..200)
            .map(|i| {
                let t = (i + seed) as f32 * 0.61;
                Point3::new(t.sin() * 5.0, t.cos() * 5.0, (i % 10) as f32 * 0.2)
            })
            .collect();
        let labels = coords.iter().map(|p| if p.z < 0.5 { 0 } else if p.z < 1.2 { 1 } else { 2 }).collect();
        Scene::new(coords, vec![vec![0.5]; 200], labels).unwrap()
    }

    fn dataset(training: bool) -> SceneDataset {
        let pre = Preprocessor::new(
            PreprocessConfig::new().with_num_points(128).with_voxel_size(None),
            None,
        )
        .unwrap();
        SceneDataset::new(vec![scene(0), scene(7)], pre, training, 1, 3).unwrap()
    }

    #[test]
    fn test_train_step_updates_model() {
        let device = Default::default();
        let mut trainer = SegmentationTrainer::<TestBackend>::new(config(), &device).unwrap();
        let mut optim = adamw_config(trainer.config()).init::<TestBackend, SegmentationModel<TestBackend>>();

        let ds = dataset(true);
        let batcher = SegmentationBatcher::<TestBackend>::new(device);
        let batch = batcher.batch(vec![ds.sample(0).unwrap(), ds.sample(1).unwrap()]);

        let out = trainer.train_step(batch, &mut optim, 1e-3).unwrap();
        assert!(out.metrics.loss.is_finite());
        assert_eq!(out.metrics.step, 1);
        assert_eq!(out.stats.target.iter().sum::<u64>(), 256);
        assert!((0.0..=1.0).contains(&out.metrics.accuracy));
    }

    #[test]
    fn test_fit_records_history() {
        let device = Default::default();
        let mut trainer = SegmentationTrainer::<TestBackend>::new(config(), &device).unwrap();
        let history = trainer.fit(dataset(true), Some(dataset(false))).unwrap();

        assert_eq!(history.epochs.len(), 2);
        assert!(history.train_losses().iter().all(|l| l.is_finite()));
        assert!(history.epochs.iter().all(|e| e.valid.is_some()));
        assert!(history.best.miou_epoch.is_some());
    }

    #[test]
    fn test_sgd_step_schedule() {
        let device = Default::default();
        let config = config()
            .with_optimizer(OptimizerKind::Sgd)
            .with_schedule(LrSchedule::Step)
            .with_step_milestones(vec![(1, 0.1)])
            .with_max_epoch(1);
        let mut trainer = SegmentationTrainer::<TestBackend>::new(config, &device).unwrap();
        assert!((trainer.learning_rate(1) - 1e-4).abs() < 1e-12);

        let history = trainer.fit(dataset(true), None).unwrap();
        assert_eq!(history.epochs.len(), 1);
        assert!(history.epochs[0].valid.is_none());
    }

    #[test]
    fn test_zero_log_interval_still_trains_every_batch() {
        let device = Default::default();
        let config = config().with_log_interval(0).with_max_epoch(1);
        let mut trainer = SegmentationTrainer::<TestBackend>::new(config, &device).unwrap();

        // Two scenes, two loops, batches of two.
        let pre = Preprocessor::new(
            PreprocessConfig::new().with_num_points(128).with_voxel_size(None),
            None,
        )
        .unwrap();
        let train = SceneDataset::new(vec![scene(0), scene(7)], pre, true, 2, 3).unwrap();
        let history = trainer.fit(train, None).unwrap();
        assert_eq!(history.epochs[0].train.step, 2);
    }

    #[test]
    fn test_labels_to_host_rejects_negative() {
        let device = Default::default();
        let labels = Tensor::<NdArray, 2, Int>::from_data([[0i64, -1]], &device);
        assert!(labels_to_host(labels).is_err());
    }
}
