//! Example: training the segmentation model on synthetic aerial scenes.
//!
//! Generates a few tiles of ground, buildings, vegetation and poles with raw
//! DALES class ids, trains a small model for a handful of epochs and prints
//! the per-class validation IoU.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info cargo run -p pct_seg --example train_synthetic --release
//! ```

use burn::backend::{Autodiff, NdArray};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pct_seg::prelude::*;

type MyBackend = Autodiff<NdArray>;

const TILE: f32 = 40.0;
const GROUND_POINTS: usize = 3000;

/// One synthetic tile in raw DALES ids: 1 ground, 2 vegetation, 5 poles, 8 buildings.
fn synthetic_tile(rng: &mut StdRng) -> Result<Scene> {
    let mut coords = Vec::new();
    let mut intensity = Vec::new();
    let mut raw = Vec::new();
    let mut push = |p: Point3, i: f32, label: u32| {
        coords.push(p);
        intensity.push(i);
        raw.push(label);
    };

    for _ in 0..GROUND_POINTS {
        let p = Point3::new(rng.gen_range(0.0..TILE), rng.gen_range(0.0..TILE), rng.gen_range(0.0..0.2));
        push(p, rng.gen_range(8000.0..15000.0), 1);
    }

    let (bx, by) = (rng.gen_range(5.0..20.0), rng.gen_range(5.0..20.0));
    let height = rng.gen_range(6.0..12.0);
    for _ in 0..800 {
        let p = Point3::new(bx + rng.gen_range(0.0..10.0), by + rng.gen_range(0.0..10.0), height);
        push(p, rng.gen_range(30000.0..40000.0), 8);
    }

    for _ in 0..4 {
        let (tx, ty) = (rng.gen_range(25.0..38.0), rng.gen_range(2.0..38.0));
        for _ in 0..150 {
            let r = rng.gen_range(0.0..2.5f32);
            let a = rng.gen_range(0.0..std::f32::consts::TAU);
            let p = Point3::new(tx + r * a.cos(), ty + r * a.sin(), rng.gen_range(3.0..7.0));
            push(p, rng.gen_range(2000.0..9000.0), 2);
        }
    }

    let (px, py) = (rng.gen_range(2.0..38.0), rng.gen_range(30.0..38.0));
    for _ in 0..60 {
        push(Point3::new(px, py, rng.gen_range(0.5..9.0)), rng.gen_range(20000.0..25000.0), 5);
    }

    Scene::from_raw_dales(coords, &intensity, &raw)
}

fn main() -> Result<()> {
    env_logger::init();

    let mut rng = StdRng::seed_from_u64(7);
    let train_scenes = (0..4).map(|_| synthetic_tile(&mut rng)).collect::<Result<Vec<_>>>()?;
    let valid_scenes = vec![synthetic_tile(&mut rng)?];

    let model = SegmentationConfig::new(
        TransformerConfig::new()
            .with_trans_dim(64)
            .with_depth(4)
            .with_num_heads(4)
            .with_num_group(32)
            .with_group_size(16)
            .with_encoder_dims(64),
        AdapterConfig::new().with_interaction_indexes(vec![[0, 0], [1, 1], [2, 2], [3, 3]]),
    )
    .with_num_points(1024);

    let preprocess = PreprocessConfig::new().with_num_points(1024).with_voxel_size(Some(0.3));
    let train_pre = Preprocessor::new(
        preprocess.clone(),
        Some(Augmentation::new(AugmentationConfig::default())?),
    )?;
    let valid_pre = Preprocessor::new(preprocess, None)?;

    let train = SceneDataset::new(train_scenes, train_pre, true, 4, 1)?;
    let weights = train.class_weights(NUM_CLASSES);
    let valid = SceneDataset::new(valid_scenes, valid_pre, false, 1, 2)?;

    let config = TrainingConfig::new(model, LossConfig::new().with_class_weights(Some(weights)))
        .with_batch_size(4)
        .with_max_epoch(5)
        .with_learning_rate(1e-3)
        .with_log_interval(2);

    let device = Default::default();
    let mut trainer = SegmentationTrainer::<MyBackend>::new(config, &device)?;
    let history = trainer.fit(train, Some(valid))?;

    println!("epoch  train_loss  val_mIoU  val_OA");
    for epoch in &history.epochs {
        let (miou, oa) = epoch.valid.as_ref().map_or((0.0, 0.0), |r| (r.miou, r.oa));
        println!("{:>5}  {:>10.4}  {:>8.4}  {:>6.4}", epoch.epoch + 1, epoch.train.loss, miou, oa);
    }
    if let Some(last) = history.epochs.last().and_then(|e| e.valid.as_ref()) {
        for (name, iou) in CLASS_NAMES.iter().zip(&last.iou_per_class) {
            println!("  {name:<12} {iou:.4}");
        }
    }
    Ok(())
}
