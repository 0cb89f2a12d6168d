//! DALES class table, label remapping and class balancing.

/// Number of training classes.
pub const NUM_CLASSES: usize = 8;

/// Label value excluded from losses and metrics.
pub const IGNORE_LABEL: u8 = 255;

/// Names of the training classes, indexed by label.
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "ground",
    "buildings",
    "cars",
    "trucks",
    "poles",
    "power_lines",
    "fences",
    "vegetation",
];

/// Upper clip bound of raw LiDAR intensity.
pub const MAX_INTENSITY: f32 = 60000.0;

/// Map a raw DALES `sem_class` value to a training label.
///
/// `0` (unknown) and anything above `8` map to [`IGNORE_LABEL`]; `k` in
/// `1..=8` maps to `k - 1`.
#[inline]
pub fn remap_label(raw: u32) -> u8 {
    match raw {
        1..=8 => (raw - 1) as u8,
        _ => IGNORE_LABEL,
    }
}

/// Clip raw intensity to `[0, 60000]` and scale it to `[0, 1]`.
#[inline]
pub fn normalize_intensity(raw: f32) -> f32 {
    raw.clamp(0.0, MAX_INTENSITY) / MAX_INTENSITY
}

/// Per-class point counts. Labels outside `0..num_classes` are skipped.
pub fn label_histogram(labels: &[u8], num_classes: usize) -> Vec<u64> {
    let mut hist = vec![0u64; num_classes];
    for &label in labels {
        if let Some(count) = hist.get_mut(label as usize) {
            *count += 1;
        }
    }
    hist
}

/// Median-frequency balancing weights, `w_c = median(f) / f_c`.
///
/// The median is taken over classes that occur at least once. Classes that
/// never occur get weight 0; an all-zero histogram yields all-ones weights.
pub fn median_frequency_weights(histogram: &[u64]) -> Vec<f32> {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return vec![1.0; histogram.len()];
    }

    let freqs: Vec<f32> = histogram
        .iter()
        .map(|&c| c as f32 / total as f32)
        .collect();
    let mut present: Vec<f32> = freqs.iter().copied().filter(|f| *f > 0.0).collect();
    present.sort_by(f32::total_cmp);
    let mid = present.len() / 2;
    let median = if present.len() % 2 == 0 {
        (present[mid - 1] + present[mid]) / 2.0
    } else {
        present[mid]
    };

    freqs
        .iter()
        .map(|&f| if f > 0.0 { median / f } else { 0.0 })
        .collect()
}
