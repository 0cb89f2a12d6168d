//! Segmentation metrics: per-class intersection/union, accumulated IoU and
//! accuracy, and a running average meter.

use crate::error::{CoreError, Result};

const IOU_EPS: f64 = 1e-10;

/// Per-class areas of one prediction/target pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AreaStats {
    /// Points predicted and labelled as the class.
    pub intersection: Vec<u64>,
    /// Points predicted or labelled as the class.
    pub union: Vec<u64>,
    /// Points labelled as the class.
    pub target: Vec<u64>,
}

impl AreaStats {
    /// Zeroed statistics for `num_classes` classes.
    pub fn zeros(num_classes: usize) -> Self {
        Self {
            intersection: vec![0; num_classes],
            union: vec![0; num_classes],
            target: vec![0; num_classes],
        }
    }

    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        self.target.len()
    }

    /// Add another set of statistics in place.
    pub fn accumulate(&mut self, other: &AreaStats) {
        for (a, b) in self.intersection.iter_mut().zip(&other.intersection) {
            *a += b;
        }
        for (a, b) in self.union.iter_mut().zip(&other.union) {
            *a += b;
        }
        for (a, b) in self.target.iter_mut().zip(&other.target) {
            *a += b;
        }
    }
}

/// Per-class intersection, union and target areas.
///
/// Positions whose target equals `ignore` are excluded from every count.
/// Labels outside `0..num_classes` are skipped.
///
/// # Errors
///
/// Returns [`CoreError::LengthMismatch`] when `pred` and `target` differ in length.
pub fn intersection_and_union(
    pred: &[u8],
    target: &[u8],
    num_classes: usize,
    ignore: u8,
) -> Result<AreaStats> {
    if pred.len() != target.len() {
        return Err(CoreError::LengthMismatch {
            expected: target.len(),
            got: pred.len(),
        });
    }

    let mut area_pred = vec![0u64; num_classes];
    let mut stats = AreaStats::zeros(num_classes);
    for (&p, &t) in pred.iter().zip(target) {
        if t == ignore {
            continue;
        }
        let (p, t) = (p as usize, t as usize);
        if p < num_classes {
            area_pred[p] += 1;
        }
        if t < num_classes {
            stats.target[t] += 1;
            if p == t {
                stats.intersection[t] += 1;
            }
        }
    }
    for c in 0..num_classes {
        stats.union[c] = area_pred[c] + stats.target[c] - stats.intersection[c];
    }
    Ok(stats)
}

/// Accumulates [`AreaStats`] over an epoch and reports IoU and accuracy.
#[derive(Debug, Clone)]
pub struct SegmentationMeter {
    stats: AreaStats,
    ignore: u8,
}

impl SegmentationMeter {
    /// Create an empty meter.
    pub fn new(num_classes: usize, ignore: u8) -> Self {
        Self {
            stats: AreaStats::zeros(num_classes),
            ignore,
        }
    }

    /// Add a batch of flattened predictions and targets.
    pub fn update(&mut self, pred: &[u8], target: &[u8]) -> Result<AreaStats> {
        let stats = intersection_and_union(pred, target, self.stats.num_classes(), self.ignore)?;
        self.stats.accumulate(&stats);
        Ok(stats)
    }

    /// Add statistics computed elsewhere.
    pub fn accumulate(&mut self, stats: &AreaStats) {
        self.stats.accumulate(stats);
    }

    /// Accumulated statistics.
    pub fn stats(&self) -> &AreaStats {
        &self.stats
    }

    /// IoU of every class, `I / (U + 1e-10)`.
    pub fn iou_per_class(&self) -> Vec<f64> {
        self.stats
            .intersection
            .iter()
            .zip(&self.stats.union)
            .map(|(&i, &u)| i as f64 / (u as f64 + IOU_EPS))
            .collect()
    }

    /// Recall of every class, `I / (T + 1e-10)`.
    pub fn accuracy_per_class(&self) -> Vec<f64> {
        self.stats
            .intersection
            .iter()
            .zip(&self.stats.target)
            .map(|(&i, &t)| i as f64 / (t as f64 + IOU_EPS))
            .collect()
    }

    /// Mean IoU over all classes.
    pub fn mean_iou(&self) -> f64 {
        mean(&self.iou_per_class())
    }

    /// Mean per-class accuracy.
    pub fn mean_accuracy(&self) -> f64 {
        mean(&self.accuracy_per_class())
    }

    /// Fraction of correctly labelled non-ignored points.
    pub fn overall_accuracy(&self) -> f64 {
        let correct: u64 = self.stats.intersection.iter().sum();
        let total: u64 = self.stats.target.iter().sum();
        correct as f64 / (total as f64 + IOU_EPS)
    }

    /// Clear accumulated statistics.
    pub fn reset(&mut self) {
        self.stats = AreaStats::zeros(self.stats.num_classes());
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Running average of a scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AverageMeter {
    /// Last value.
    pub val: f64,
    /// Weighted sum of all values.
    pub sum: f64,
    /// Total weight.
    pub count: f64,
    /// Running average.
    pub avg: f64,
}

impl AverageMeter {
    /// Create an empty meter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `val` with weight `n`.
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n as f64;
        self.avg = if self.count > 0.0 {
            self.sum / self.count
        } else {
            0.0
        };
    }

    /// Clear the meter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_and_union() {
        let pred = [0, 0, 1, 1, 2, 0];
        let target = [0, 1, 1, 1, 255, 2];
        let stats = intersection_and_union(&pred, &target, 3, 255).unwrap();

        assert_eq!(stats.intersection, vec![1, 2, 0]);
        assert_eq!(stats.target, vec![1, 3, 1]);
        // Class 0 predicted at 0, 1, 5; class 2 prediction sits on an ignored point.
        assert_eq!(stats.union, vec![3, 3, 1]);
    }

    #[test]
    fn test_length_mismatch() {
        assert_eq!(
            intersection_and_union(&[0, 1], &[0], 2, 255),
            Err(CoreError::LengthMismatch {
                expected: 1,
                got: 2
            })
        );
    }

    #[test]
    fn test_meter_perfect_prediction() {
        let mut meter = SegmentationMeter::new(2, 255);
        meter.update(&[0, 1, 1], &[0, 1, 1]).unwrap();
        meter.update(&[0, 0], &[0, 255]).unwrap();

        assert!((meter.mean_iou() - 1.0).abs() < 1e-6);
        assert!((meter.mean_accuracy() - 1.0).abs() < 1e-6);
        assert!((meter.overall_accuracy() - 1.0).abs() < 1e-6);

        meter.reset();
        assert_eq!(meter.stats(), &AreaStats::zeros(2));
        assert_eq!(meter.mean_iou(), 0.0);
    }

    #[test]
    fn test_meter_partial() {
        let mut meter = SegmentationMeter::new(2, 255);
        meter.update(&[0, 0, 1, 1], &[0, 1, 1, 1]).unwrap();
        let iou = meter.iou_per_class();
        assert!((iou[0] - 0.5).abs() < 1e-6);
        assert!((iou[1] - 2.0 / 3.0).abs() < 1e-6);
        assert!((meter.overall_accuracy() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_average_meter() {
        let mut meter = AverageMeter::new();
        meter.update(2.0, 1);
        meter.update(5.0, 3);
        assert_eq!(meter.val, 5.0);
        assert_eq!(meter.count, 4.0);
        assert!((meter.avg - 17.0 / 4.0).abs() < 1e-12);
        meter.reset();
        assert_eq!(meter, AverageMeter::default());
    }
}
