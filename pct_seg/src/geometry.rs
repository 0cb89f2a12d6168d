//! Bridge between host-side geometry and tensors.
//!
//! Sampling and neighbour search run on the host with `pct_core`; their
//! indices are turned into `select` gathers so feature tensors stay on the
//! autodiff graph.

use burn::prelude::*;
use pct_core::{farthest_point_sample, gather_points, knn, three_nn_weights, NeighborTable, Point3};

use crate::error::{PctSegError, Result};

/// Coordinates of every cloud in a batch, kept on the host.
pub type BatchPoints = Vec<Vec<Point3>>;

fn check_uniform(points: &[Vec<Point3>]) -> Result<usize> {
    let n = points.first().map(Vec::len).unwrap_or(0);
    if let Some(bad) = points.iter().find(|p| p.len() != n) {
        return Err(PctSegError::ShapeMismatch {
            expected: vec![points.len(), n, 3],
            got: vec![points.len(), bad.len(), 3],
        });
    }
    Ok(n)
}

/// Copy a `[B, N, 3]` coordinate tensor to the host.
pub fn points_to_host<B: Backend>(xyz: Tensor<B, 3>) -> Result<BatchPoints> {
    let [batch, n, c] = xyz.dims();
    if c != 3 {
        return Err(PctSegError::ShapeMismatch {
            expected: vec![batch, n, 3],
            got: vec![batch, n, c],
        });
    }
    if n == 0 {
        return Ok(vec![Vec::new(); batch]);
    }
    let values = xyz
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| PctSegError::InvalidData(format!("{e:?}")))?;

    Ok(values
        .chunks_exact(n * 3)
        .map(|cloud| {
            cloud
                .chunks_exact(3)
                .map(|p| Point3::new(p[0], p[1], p[2]))
                .collect()
        })
        .collect())
}

/// Upload host coordinates as a `[B, N, 3]` tensor.
pub fn points_to_tensor<B: Backend>(points: &[Vec<Point3>], device: &B::Device) -> Result<Tensor<B, 3>> {
    let n = check_uniform(points)?;
    let values: Vec<f32> = points
        .iter()
        .flat_map(|cloud| cloud.iter().flat_map(|p| p.as_array()))
        .collect();
    Ok(Tensor::from_data(
        TensorData::new(values, [points.len(), n, 3]),
        device,
    ))
}

/// Gather rows of `[B, N, C]` features with per-batch indices.
///
/// Every index list must have the same length `M`; the result is `[B, M, C]`.
/// The gather is differentiable with respect to `features`.
pub fn gather_rows<B: Backend>(features: Tensor<B, 3>, indices: &[Vec<usize>]) -> Result<Tensor<B, 3>> {
    let [batch, n, channels] = features.dims();
    if indices.len() != batch {
        return Err(PctSegError::ShapeMismatch {
            expected: vec![batch],
            got: vec![indices.len()],
        });
    }
    let m = indices.first().map(Vec::len).unwrap_or(0);

    let mut flat = Vec::with_capacity(batch * m);
    for (b, row) in indices.iter().enumerate() {
        if row.len() != m {
            return Err(PctSegError::ShapeMismatch {
                expected: vec![batch, m],
                got: vec![batch, row.len()],
            });
        }
        if let Some(&bad) = row.iter().find(|&&i| i >= n) {
            return Err(PctSegError::InvalidData(format!(
                "gather index {bad} out of range for {n} rows"
            )));
        }
        flat.extend(row.iter().map(|&i| (b * n + i) as i64));
    }

    let device = features.device();
    let index = Tensor::<B, 1, Int>::from_data(TensorData::new(flat, [batch * m]), &device);
    Ok(features
        .reshape([batch * n, channels])
        .select(0, index)
        .reshape([batch, m, channels]))
}

/// Gather `k` neighbour rows per query: `[B, N, C]` → `[B, S, K, C]`.
pub fn gather_neighbors<B: Backend>(
    features: Tensor<B, 3>,
    tables: &[NeighborTable],
) -> Result<Tensor<B, 4>> {
    let [batch, _, channels] = features.dims();
    let k = tables.first().map(NeighborTable::k).unwrap_or(0);
    let s = tables.first().map(NeighborTable::len).unwrap_or(0);
    let rows: Vec<Vec<usize>> = tables.iter().map(|t| t.as_flat().to_vec()).collect();
    Ok(gather_rows(features, &rows)?.reshape([batch, s, k, channels]))
}

/// Farthest-point centres and their kNN groups for every cloud of a batch.
#[derive(Debug, Clone)]
pub struct Grouping {
    /// Indices of the centres in the input clouds.
    pub center_indices: Vec<Vec<usize>>,
    /// Centre coordinates.
    pub centers: BatchPoints,
    /// `k` input-point neighbours of every centre, nearest first.
    pub neighbors: Vec<NeighborTable>,
}

impl Grouping {
    /// Neighbours per centre.
    pub fn k(&self) -> usize {
        self.neighbors.first().map(NeighborTable::k).unwrap_or(0)
    }
}

/// Sample `n_centers` centres per cloud with FPS and group `k` neighbours around each.
///
/// `k` is clamped to the number of available points.
pub fn fps_and_group(points: &[Vec<Point3>], n_centers: usize, k: usize) -> Result<Grouping> {
    let n = check_uniform(points)?;
    let k = k.min(n);

    let mut grouping = Grouping {
        center_indices: Vec::with_capacity(points.len()),
        centers: Vec::with_capacity(points.len()),
        neighbors: Vec::with_capacity(points.len()),
    };
    for cloud in points {
        let idx = farthest_point_sample(cloud, n_centers)?;
        let centers = gather_points(cloud, &idx);
        grouping.neighbors.push(knn(cloud, &centers, k)?);
        grouping.centers.push(centers);
        grouping.center_indices.push(idx);
    }
    Ok(grouping)
}

/// kNN of every point among its own cloud, `k` clamped to the cloud size.
pub fn self_knn(points: &[Vec<Point3>], k: usize) -> Result<Vec<NeighborTable>> {
    let n = check_uniform(points)?;
    let k = k.min(n);
    points
        .iter()
        .map(|cloud| knn(cloud, cloud, k).map_err(PctSegError::from))
        .collect()
}

/// Interpolate `[B, S, C]` features from `sparse` points onto `dense` points
/// with inverse squared-distance weights over the three nearest neighbours.
pub fn three_nn_interpolate<B: Backend>(
    dense: &[Vec<Point3>],
    sparse: &[Vec<Point3>],
    sparse_features: Tensor<B, 3>,
) -> Result<Tensor<B, 3>> {
    let n = check_uniform(dense)?;
    check_uniform(sparse)?;
    let [batch, _, channels] = sparse_features.dims();

    let mut indices = Vec::with_capacity(batch);
    let mut weights = Vec::with_capacity(batch * n * 3);
    for (dense_cloud, sparse_cloud) in dense.iter().zip(sparse) {
        let table = three_nn_weights(sparse_cloud, dense_cloud)?;
        indices.push(table.indices.iter().flatten().copied().collect::<Vec<_>>());
        weights.extend(table.weights.iter().flatten().copied());
    }

    let device = sparse_features.device();
    let gathered = gather_rows(sparse_features, &indices)?.reshape([batch, n, 3, channels]);
    let weights = Tensor::<B, 3>::from_data(TensorData::new(weights, [batch, n, 3]), &device);

    Ok((gathered * weights.unsqueeze_dim::<4>(3))
        .sum_dim(2)
        .reshape([batch, n, channels]))
}
