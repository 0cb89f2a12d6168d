//! Training-time coordinate augmentation.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use pct_core::Point3;

use crate::config::AugmentationConfig;
use crate::error::{PctSegError, Result};

/// Random scale, rotation about z, clipped Gaussian jitter and shift.
#[derive(Debug, Clone)]
pub struct Augmentation {
    config: AugmentationConfig,
    jitter: Normal<f32>,
}

impl Augmentation {
    /// Create an augmentation from a validated configuration.
    pub fn new(config: AugmentationConfig) -> Result<Self> {
        config.validate()?;
        let jitter = Normal::new(0.0, config.pert_factor)
            .map_err(|e| PctSegError::config(format!("jitter distribution: {e}")))?;
        Ok(Self { config, jitter })
    }

    /// Augmentation configuration.
    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Augment `points` in place.
    pub fn apply<R: Rng + ?Sized>(&self, points: &mut [Point3], rng: &mut R) {
        let c = &self.config;

        if rng.gen::<f32>() < c.scale_prob {
            let f = c.scale_factor;
            let factors = if c.scale_anisotropic {
                Point3::new(
                    rng.gen_range(1.0 - f..=1.0 + f),
                    rng.gen_range(1.0 - f..=1.0 + f),
                    rng.gen_range(1.0 - f..=1.0 + f),
                )
            } else {
                Point3::splat(rng.gen_range(1.0 - f..=1.0 + f))
            };
            points.iter_mut().for_each(|p| *p = p.scale(factors));
        }

        if rng.gen::<f32>() < c.rot_prob {
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            points.iter_mut().for_each(|p| *p = p.rotate_z(angle));
        }

        if c.pert_factor > 0.0 && rng.gen::<f32>() < c.pert_prob {
            let clip = c.pert_clip;
            for p in points.iter_mut() {
                let mut noise = || self.jitter.sample(rng).clamp(-clip, clip);
                *p = *p + Point3::new(noise(), noise(), noise());
            }
        }

        if rng.gen::<f32>() < c.shift_prob {
            let [sx, sy, sz] = c.shifts;
            let shift = Point3::new(
                symmetric(rng, sx),
                symmetric(rng, sy),
                symmetric(rng, sz),
            );
            points.iter_mut().for_each(|p| *p = *p + shift);
        }
    }
}

fn symmetric<R: Rng + ?Sized>(rng: &mut R, bound: f32) -> f32 {
    if bound > 0.0 {
        rng.gen_range(-bound..=bound)
    } else {
        0.0
    }
}
