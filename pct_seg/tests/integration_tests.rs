//! End-to-end integration tests.

use burn::backend::{Autodiff, NdArray};
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use burn::tensor::Distribution;

use pct_seg::prelude::*;

type TestBackend = Autodiff<NdArray>;

fn small_model() -> SegmentationConfig {
    SegmentationConfig::new(
        TransformerConfig::new()
            .with_trans_dim(32)
            .with_depth(4)
            .with_num_heads(4)
            .with_num_group(8)
            .with_group_size(8)
            .with_encoder_dims(32),
        AdapterConfig::new()
            .with_interaction_indexes(vec![[0, 1], [2, 2], [3, 3]])
            .with_fetch_indexes(Some(vec![0, 1, 2, 3])),
    )
    .with_num_points(128)
    .with_num_classes(NUM_CLASSES)
}

/// A ground plane with a box-shaped building, labelled with raw DALES ids.
fn synthetic_scene(seed: u32) -> Scene {
    let mut coords = Vec::new();
    let mut intensity = Vec::new();
    let mut raw = Vec::new();
    for i in 0..20u32 {
        for j in 0..20u32 {
            let x = i as f32 * 0.5 + seed as f32 * 0.01;
            let y = j as f32 * 0.5;
            coords.push(Point3::new(x, y, 0.0));
            intensity.push(20000.0);
            raw.push(1);
            if (5..10).contains(&i) && (5..10).contains(&j) {
                coords.push(Point3::new(x, y, 4.0));
                intensity.push(45000.0);
                raw.push(8);
            }
        }
    }
    // Unknown points are ignored.
    coords.push(Point3::new(0.0, 0.0, 10.0));
    intensity.push(70000.0);
    raw.push(0);
    Scene::from_raw_dales(coords, &intensity, &raw).unwrap()
}

#[test]
fn test_scene_to_batch_to_log_probs() {
    let device = Default::default();
    let scene = synthetic_scene(0);
    assert!(scene.labels.contains(&IGNORE_LABEL));

    let pre = Preprocessor::new(
        PreprocessConfig::new().with_num_points(128).with_voxel_size(Some(0.25)),
        Some(Augmentation::new(AugmentationConfig::default()).unwrap()),
    )
    .unwrap();
    let dataset = SceneDataset::new(vec![scene], pre, true, 2, 11).unwrap();
    let samples = vec![dataset.sample(0).unwrap(), dataset.sample(1).unwrap()];
    let batch = SegmentationBatcher::<NdArray>::new(Default::default()).batch(samples);
    assert_eq!(batch.xyz.dims(), [2, 128, 3]);

    let model = small_model().init::<NdArray>(&device).unwrap();
    let log_probs = model.forward(batch.xyz, batch.features).unwrap();
    assert_eq!(log_probs.dims(), [2, 128, NUM_CLASSES]);
}

#[test]
fn test_full_depth_adapter_with_default_stages() {
    let device = Default::default();
    let config = SegmentationConfig::new(
        TransformerConfig::new()
            .with_trans_dim(32)
            .with_num_heads(4)
            .with_num_group(8)
            .with_group_size(8)
            .with_encoder_dims(32),
        AdapterConfig::new(),
    )
    .with_num_points(128)
    .with_num_classes(NUM_CLASSES);
    assert_eq!(config.transformer.depth, 12);
    assert_eq!(config.adapter.resolved_fetch_indexes(), vec![2, 5, 8, 11]);

    let xyz = Tensor::<NdArray, 3>::random([2, 128, 3], Distribution::Default, &device);
    let features = Tensor::<NdArray, 3>::random([2, 128, 1], Distribution::Default, &device);

    let adapter = config.init_adapter::<NdArray>(&device).unwrap();
    let out = adapter.forward(xyz.clone(), features.clone()).unwrap();
    let sizes: Vec<_> = out.levels.iter().map(|l| l.dims()).collect();
    assert_eq!(sizes, vec![[2, 128, 32], [2, 32, 32], [2, 8, 32], [2, 2, 32]]);

    let model = config.init::<NdArray>(&device).unwrap();
    let log_probs = model.forward(xyz, features).unwrap();
    assert_eq!(log_probs.dims(), [2, 128, NUM_CLASSES]);
    let sums = log_probs.exp().sum_dim(2).into_data().to_vec::<f32>().unwrap();
    assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-4));
}

#[test]
fn test_short_training_run() {
    let device = Default::default();
    let config = TrainingConfig::new(small_model(), LossConfig::new().with_label_smoothing(0.1))
        .with_batch_size(2)
        .with_test_batch_size(2)
        .with_max_epoch(2)
        .with_num_workers(0)
        .with_log_interval(1);

    let pre = || Preprocessor::new(PreprocessConfig::new().with_num_points(128), None).unwrap();
    let train =
        SceneDataset::new(vec![synthetic_scene(0), synthetic_scene(1)], pre(), true, 2, 1).unwrap();
    let valid = SceneDataset::new(vec![synthetic_scene(2)], pre(), false, 1, 1).unwrap();

    let mut trainer = SegmentationTrainer::<TestBackend>::new(config, &device).unwrap();
    let history = trainer.fit(train, Some(valid)).unwrap();

    assert_eq!(history.epochs.len(), 2);
    for epoch in &history.epochs {
        assert!(epoch.train.loss.is_finite());
        let report = epoch.valid.as_ref().unwrap();
        assert_eq!(report.iou_per_class.len(), NUM_CLASSES);
        assert!((0.0..=1.0).contains(&report.oa));
        // One crop of 128 points; ignored points are not counted.
        assert!(report.label_distribution.iter().sum::<u64>() <= 128);
    }
    assert!(history.epochs[1].train.step > history.epochs[0].train.step);
}

#[test]
fn test_invalid_training_config_is_rejected() {
    let device = Default::default();
    let config = TrainingConfig::new(small_model().with_num_points(64), LossConfig::new());
    assert!(matches!(
        SegmentationTrainer::<TestBackend>::new(config, &device),
        Err(PctSegError::InvalidConfig { .. })
    ));
}

#[test]
fn test_config_json_round_trip() {
    let config = small_model();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    config.save(&path).unwrap();

    let loaded = SegmentationConfig::load(&path).unwrap();
    assert_eq!(loaded.transformer.trans_dim, 32);
    assert_eq!(loaded.adapter.interaction_indexes, vec![[0, 1], [2, 2], [3, 3]]);
}
