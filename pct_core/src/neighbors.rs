//! Brute-force neighbour search.
//!
//! Point sets handled by the model are small (a few thousand points per
//! crop), so exact O(N·M) search is used. Rows are computed in parallel when
//! the `parallel` feature is enabled.

use std::cmp::Ordering;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{CoreError, Result};
use crate::types::Point3;

/// Epsilon added to distances before inverting them into interpolation weights.
pub const INTERPOLATION_EPS: f32 = 1e-8;

/// Squared Euclidean distance between two points.
#[inline]
pub fn square_distance(a: Point3, b: Point3) -> f32 {
    a.distance_squared(b)
}

/// Fixed-width neighbour lists, one row of `k` reference indices per query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborTable {
    indices: Vec<usize>,
    k: usize,
}

impl NeighborTable {
    /// Build a table from a flat row-major index list.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] when `k` is zero or does not
    /// divide the index count.
    pub fn from_flat(indices: Vec<usize>, k: usize) -> Result<Self> {
        if k == 0 || indices.len() % k != 0 {
            return Err(CoreError::InvalidArgument(format!(
                "{} indices cannot be split into rows of {}",
                indices.len(),
                k
            )));
        }
        Ok(Self { indices, k })
    }

    /// Neighbours per query.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of queries.
    pub fn len(&self) -> usize {
        self.indices.len() / self.k
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Neighbour indices of query `i`, nearest first.
    pub fn row(&self, i: usize) -> &[usize] {
        &self.indices[i * self.k..(i + 1) * self.k]
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[usize]> {
        self.indices.chunks_exact(self.k)
    }

    /// Flat row-major index list.
    pub fn as_flat(&self) -> &[usize] {
        &self.indices
    }

    /// Consume the table, returning the flat row-major index list.
    pub fn into_indices(self) -> Vec<usize> {
        self.indices
    }
}

fn by_distance(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

fn nearest_k(reference: &[Point3], query: Point3, k: usize) -> Vec<usize> {
    let mut candidates: Vec<(f32, usize)> = reference
        .iter()
        .enumerate()
        .map(|(i, p)| (square_distance(*p, query), i))
        .collect();
    if k < candidates.len() {
        candidates.select_nth_unstable_by(k - 1, by_distance);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(by_distance);
    candidates.into_iter().map(|(_, i)| i).collect()
}

/// For each query, the indices of its `k` nearest reference points.
///
/// Rows are sorted by ascending distance; equal distances are ordered by index.
/// A query that coincides with a reference point gets that point first.
///
/// # Errors
///
/// * [`CoreError::InvalidArgument`] when `k == 0`.
/// * [`CoreError::NotEnoughPoints`] when `k > reference.len()`.
pub fn knn(reference: &[Point3], queries: &[Point3], k: usize) -> Result<NeighborTable> {
    if k == 0 {
        return Err(CoreError::InvalidArgument("k must be positive".to_string()));
    }
    if k > reference.len() {
        return Err(CoreError::NotEnoughPoints {
            requested: k,
            available: reference.len(),
        });
    }

    #[cfg(feature = "parallel")]
    let rows: Vec<Vec<usize>> = queries
        .par_iter()
        .map(|q| nearest_k(reference, *q, k))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<Vec<usize>> = queries.iter().map(|q| nearest_k(reference, *q, k)).collect();

    Ok(NeighborTable {
        indices: rows.into_iter().flatten().collect(),
        k,
    })
}

/// Inverse-distance interpolation weights from a sparse to a dense point set.
///
/// Every query holds exactly three slots. When the reference has fewer than
/// three points the unused slots point at index 0 with weight 0.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolationTable {
    /// Reference indices per query.
    pub indices: Vec<[usize; 3]>,
    /// Normalised weights per query, summing to one.
    pub weights: Vec<[f32; 3]>,
}

impl InterpolationTable {
    /// Number of queries.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the table has no queries.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

fn three_nn_row(reference: &[Point3], query: Point3) -> ([usize; 3], [f32; 3]) {
    let k = reference.len().min(3);
    let nearest = nearest_k(reference, query, k);

    let mut indices = [0usize; 3];
    let mut weights = [0.0f32; 3];
    for (slot, &idx) in nearest.iter().enumerate() {
        indices[slot] = idx;
        weights[slot] = 1.0 / (square_distance(reference[idx], query) + INTERPOLATION_EPS);
    }
    let norm: f32 = weights.iter().sum();
    for w in weights.iter_mut() {
        *w /= norm;
    }
    (indices, weights)
}

/// Three-nearest-neighbour inverse squared-distance weights.
///
/// `w_i = 1 / (d_i + 1e-8)` normalised to sum to one, with `d_i` the squared
/// distance from the query to its i-th nearest reference point.
///
/// # Errors
///
/// Returns [`CoreError::NotEnoughPoints`] when `reference` is empty.
pub fn three_nn_weights(reference: &[Point3], queries: &[Point3]) -> Result<InterpolationTable> {
    if reference.is_empty() {
        return Err(CoreError::NotEnoughPoints {
            requested: 1,
            available: 0,
        });
    }

    #[cfg(feature = "parallel")]
    let rows: Vec<([usize; 3], [f32; 3])> = queries
        .par_iter()
        .map(|q| three_nn_row(reference, *q))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<([usize; 3], [f32; 3])> =
        queries.iter().map(|q| three_nn_row(reference, *q)).collect();

    let (indices, weights) = rows.into_iter().unzip();
    Ok(InterpolationTable { indices, weights })
}
