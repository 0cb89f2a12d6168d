//! Burn dataset over in-memory scenes.

use std::sync::Mutex;

use burn::data::dataset::Dataset;
use rand::rngs::StdRng;
use rand::SeedableRng;

use pct_core::{label_histogram, median_frequency_weights};

use crate::error::{PctSegError, Result};

use super::preprocess::{Preprocessor, SceneSample};
use super::scene::Scene;

/// Scenes cropped on access.
///
/// Every scene is visited `loop_count` times per epoch; index `i` maps to
/// scene `i % scenes`. Each access draws a fresh crop from a seeded RNG.
///
/// Scenes are checked on construction, so every in-range index yields a
/// sample: the data loader stops at the first `None`.
pub struct SceneDataset {
    scenes: Vec<Scene>,
    preprocessor: Preprocessor,
    training: bool,
    loop_count: usize,
    rng: Mutex<StdRng>,
}

impl SceneDataset {
    /// Create a dataset.
    pub fn new(
        scenes: Vec<Scene>,
        preprocessor: Preprocessor,
        training: bool,
        loop_count: usize,
        seed: u64,
    ) -> Result<Self> {
        if loop_count == 0 {
            return Err(PctSegError::config("loop_count must be positive"));
        }
        for (i, scene) in scenes.iter().enumerate() {
            if scene.is_empty() {
                return Err(PctSegError::InvalidData(format!("scene {i} has no points")));
            }
            if let Some(p) = scene
                .coords
                .iter()
                .position(|p| p.as_array().iter().any(|v| !v.is_finite()))
            {
                return Err(PctSegError::InvalidData(format!(
                    "scene {i} has a non-finite coordinate at point {p}"
                )));
            }
        }
        if let Some(first) = scenes.first() {
            let channels = first.feature_channels();
            if scenes.iter().any(|s| s.feature_channels() != channels) {
                return Err(PctSegError::InvalidData(
                    "scenes have different feature channels".into(),
                ));
            }
        }
        log::info!(
            "{} dataset: {} scenes x {} loops",
            if training { "training" } else { "evaluation" },
            scenes.len(),
            loop_count
        );
        Ok(Self {
            scenes,
            preprocessor,
            training,
            loop_count,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Number of distinct scenes.
    pub fn num_scenes(&self) -> usize {
        self.scenes.len()
    }

    /// Whether crops are drawn in training mode.
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Per-class point counts over all scenes.
    pub fn label_histogram(&self, num_classes: usize) -> Vec<u64> {
        self.scenes.iter().fold(vec![0; num_classes], |mut acc, scene| {
            let counts = label_histogram(&scene.labels, num_classes);
            acc.iter_mut().zip(counts).for_each(|(a, c)| *a += c);
            acc
        })
    }

    /// Median-frequency class weights for the loss.
    pub fn class_weights(&self, num_classes: usize) -> Vec<f32> {
        median_frequency_weights(&self.label_histogram(num_classes))
    }

    /// Crop sample `index`, reporting failures.
    pub fn sample(&self, index: usize) -> Result<SceneSample> {
        if self.scenes.is_empty() || index >= self.len() {
            return Err(PctSegError::InvalidData(format!(
                "index {index} out of range for {} samples",
                self.len()
            )));
        }
        let scene = &self.scenes[index % self.scenes.len()];
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| PctSegError::InvalidData("dataset rng poisoned".into()))?;
        self.preprocessor.process(scene, self.training, &mut *rng)
    }
}

impl Dataset<SceneSample> for SceneDataset {
    fn get(&self, index: usize) -> Option<SceneSample> {
        if index >= self.len() {
            return None;
        }
        match self.sample(index) {
            Ok(sample) => Some(sample),
            Err(e) => {
                log::error!("sample {index} failed, ending the pass early: {e}");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.scenes.len() * self.loop_count
    }
}
