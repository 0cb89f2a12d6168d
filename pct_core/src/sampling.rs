//! Farthest point sampling.
//!
//! Picks a well-spread subset of a point cloud by repeatedly taking the point
//! farthest from everything chosen so far. Used to select patch centres for the
//! transformer branch and the anchors of every set-abstraction level.

use crate::error::{CoreError, Result};
use crate::types::Point3;

/// Sample `n` indices from `points` with iterative farthest point sampling.
///
/// Sampling starts from index 0. Each subsequent pick maximises the minimum
/// squared distance to the already selected set; ties keep the lowest index.
///
/// # Errors
///
/// Returns [`CoreError::NotEnoughPoints`] when `n > points.len()`.
pub fn farthest_point_sample(points: &[Point3], n: usize) -> Result<Vec<usize>> {
    if n > points.len() {
        return Err(CoreError::NotEnoughPoints {
            requested: n,
            available: points.len(),
        });
    }
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut selected = Vec::with_capacity(n);
    let mut min_dist = vec![f32::INFINITY; points.len()];
    let mut current = 0usize;

    for _ in 0..n {
        selected.push(current);
        let anchor = points[current];

        let mut best = 0usize;
        let mut best_dist = f32::NEG_INFINITY;
        for (i, (p, d)) in points.iter().zip(min_dist.iter_mut()).enumerate() {
            let dist = p.distance_squared(anchor);
            if dist < *d {
                *d = dist;
            }
            if *d > best_dist {
                best_dist = *d;
                best = i;
            }
        }
        current = best;
    }

    Ok(selected)
}

/// Gather the points at `indices`.
pub fn gather_points(points: &[Point3], indices: &[usize]) -> Vec<Point3> {
    indices.iter().map(|&i| points[i]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize) -> Vec<Point3> {
        (0..n).map(|i| Point3::new(i as f32, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_fps_starts_at_zero_and_picks_far_end() {
        let points = line(10);
        let idx = farthest_point_sample(&points, 3).unwrap();
        assert_eq!(idx[0], 0);
        assert_eq!(idx[1], 9);
        // 4 and 5 tie at squared distance 16; the lower index wins.
        assert_eq!(idx[2], 4);
    }

    #[test]
    fn test_fps_zero_and_too_many() {
        let points = line(4);
        assert!(farthest_point_sample(&points, 0).unwrap().is_empty());
        assert_eq!(
            farthest_point_sample(&points, 5),
            Err(CoreError::NotEnoughPoints {
                requested: 5,
                available: 4
            })
        );
    }

    #[test]
    fn test_fps_full_is_permutation() {
        let points: Vec<Point3> = (0..16)
            .map(|i| Point3::new((i % 4) as f32, (i / 4) as f32, (i * 7 % 5) as f32))
            .collect();
        let mut idx = farthest_point_sample(&points, points.len()).unwrap();
        idx.sort_unstable();
        assert_eq!(idx, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_gather_points() {
        let points = line(5);
        let gathered = gather_points(&points, &[4, 1]);
        assert_eq!(gathered, vec![Point3::new(4.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)]);
    }
}
