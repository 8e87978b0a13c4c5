//! CPU-based point cloud filtering operations
//!
//! Filtering operations include:
//! - Voxel grid sampling (subset selection, no averaging)

use nalgebra::Point3;
use rayon::prelude::*;

const PARALLEL_SORT_THRESHOLD: usize = 10_000;

/// Select at most one representative point per cubic voxel of side `voxel_size`.
///
/// Returns a membership mask of the same length as `points`. In every occupied
/// voxel the point closest to the voxel center is kept, ties resolved by the
/// lower index, so the selection is deterministic. A non-positive (or
/// non-finite) voxel size keeps every point.
pub fn voxel_grid_sampling(points: &[Point3<f64>], voxel_size: f64) -> Vec<bool> {
    let n = points.len();
    if !(voxel_size > 0.0 && voxel_size.is_finite()) {
        return vec![true; n];
    }

    // 1. Compute voxel keys
    let mut keys: Vec<(i64, i64, i64, usize)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            (
                (p.x / voxel_size).floor() as i64,
                (p.y / voxel_size).floor() as i64,
                (p.z / voxel_size).floor() as i64,
                i,
            )
        })
        .collect();

    // 2. Sort by voxel key, index last so that runs are ordered
    if n > PARALLEL_SORT_THRESHOLD {
        keys.par_sort_unstable();
    } else {
        keys.sort_unstable();
    }

    // 3. Pick one point per run
    let mut mask = vec![false; n];
    let mut run_start = 0;
    while run_start < keys.len() {
        let (hx, hy, hz, _) = keys[run_start];
        let center = Point3::new(
            (hx as f64 + 0.5) * voxel_size,
            (hy as f64 + 0.5) * voxel_size,
            (hz as f64 + 0.5) * voxel_size,
        );

        let mut best_idx = keys[run_start].3;
        let mut best_dist = (points[best_idx] - center).norm_squared();
        let mut run_end = run_start + 1;
        while run_end < keys.len() && (keys[run_end].0, keys[run_end].1, keys[run_end].2) == (hx, hy, hz) {
            let idx = keys[run_end].3;
            let dist = (points[idx] - center).norm_squared();
            if dist < best_dist {
                best_dist = dist;
                best_idx = idx;
            }
            run_end += 1;
        }

        mask[best_idx] = true;
        run_start = run_end;
    }

    mask
}
