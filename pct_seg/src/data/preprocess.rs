//! Turning scenes into fixed-size crops.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use pct_core::{knn, Bounds3, Point3, VoxelCoord};

use crate::config::{NormalizeMode, PreprocessConfig};
use crate::error::{PctSegError, Result};

use super::augmentation::Augmentation;
use super::scene::Scene;

/// A fixed-size crop ready for batching.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSample {
    /// Normalised coordinates, `num_points` entries.
    pub coords: Vec<Point3>,
    /// Per-point features, `num_points` rows.
    pub features: Vec<Vec<f32>>,
    /// Per-point labels.
    pub labels: Vec<u8>,
}

impl SceneSample {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

/// Voxel subsampling, kNN cropping, padding and normalisation.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
    augmentation: Option<Augmentation>,
}

impl Preprocessor {
    /// Create a preprocessor. Augmentation is only applied in training.
    pub fn new(config: PreprocessConfig, augmentation: Option<Augmentation>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            augmentation,
        })
    }

    /// Preprocessing configuration.
    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Build one crop from `scene`.
    ///
    /// In training the voxel representative and the crop anchor are random;
    /// otherwise the first point of each voxel and the first scene point are
    /// used so evaluation is reproducible.
    pub fn process<R: Rng + ?Sized>(&self, scene: &Scene, training: bool, rng: &mut R) -> Result<SceneSample> {
        if scene.is_empty() {
            return Err(PctSegError::InvalidData("cannot crop an empty scene".into()));
        }

        let mut indices = match self.config.voxel_size {
            Some(size) => voxel_subsample(&scene.coords, size, training, rng),
            None => (0..scene.len()).collect(),
        };

        indices = self.crop(scene, &indices, training, rng)?;
        pad_by_repetition(&mut indices, self.config.num_points);
        if self.config.shuffle {
            indices.shuffle(rng);
        }

        let mut sample = scene.select(&indices);
        if training {
            if let Some(augmentation) = &self.augmentation {
                augmentation.apply(&mut sample.coords, rng);
            }
        }
        normalize(&mut sample.coords, self.config.normalize);

        log::trace!(
            "cropped {} of {} points into a sample of {}",
            indices.len(),
            scene.len(),
            sample.coords.len()
        );
        Ok(SceneSample {
            coords: sample.coords,
            features: sample.features,
            labels: sample.labels,
        })
    }

    /// The `num_points` nearest neighbours of an anchor among `indices`.
    fn crop<R: Rng + ?Sized>(
        &self,
        scene: &Scene,
        indices: &[usize],
        training: bool,
        rng: &mut R,
    ) -> Result<Vec<usize>> {
        let n = self.config.num_points;
        if indices.len() <= n {
            return Ok(indices.to_vec());
        }

        let anchor = if training {
            indices[rng.gen_range(0..indices.len())]
        } else {
            indices[0]
        };
        let candidates: Vec<Point3> = indices.iter().map(|&i| scene.coords[i]).collect();
        let table = knn(&candidates, &[scene.coords[anchor]], n)?;
        Ok(table.row(0).iter().map(|&j| indices[j]).collect())
    }
}

/// One index per occupied voxel.
///
/// The representative is the first point in visiting order; in training the
/// order is shuffled first.
pub fn voxel_subsample<R: Rng + ?Sized>(
    coords: &[Point3],
    voxel_size: f32,
    shuffle: bool,
    rng: &mut R,
) -> Vec<usize> {
    let Some(bounds) = Bounds3::from_points(coords) else {
        return Vec::new();
    };
    let mut order: Vec<usize> = (0..coords.len()).collect();
    if shuffle {
        order.shuffle(rng);
    }

    let mut occupied = HashSet::with_capacity(coords.len());
    let mut kept: Vec<usize> = order
        .into_iter()
        .filter(|&i| occupied.insert(VoxelCoord::containing(coords[i], bounds.min, voxel_size)))
        .collect();
    if !shuffle {
        kept.sort_unstable();
    }
    kept
}

/// Repeat indices cyclically until there are `target` of them.
pub fn pad_by_repetition(indices: &mut Vec<usize>, target: usize) {
    let n = indices.len();
    if n == 0 || n >= target {
        return;
    }
    for i in n..target {
        let v = indices[i % n];
        indices.push(v);
    }
}

/// Re-centre coordinates in place.
pub fn normalize(coords: &mut [Point3], mode: NormalizeMode) {
    if coords.is_empty() {
        return;
    }
    let offset = match mode {
        NormalizeMode::Mean => {
            let sum = coords.iter().fold(Point3::splat(0.0), |acc, &p| acc + p);
            sum / coords.len() as f32
        }
        NormalizeMode::Min => coords.iter().fold(Point3::splat(f32::INFINITY), |acc, &p| acc.min(p)),
    };
    coords.iter_mut().for_each(|p| *p = *p - offset);
}
