//! CPU-based normal estimation operations
//!
//! - Normal estimation using PCA on k-nearest neighbors
//! - Normal orientation consistency

use crate::spatial::PointIndex;
use multiway_core::PointCloud;
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rayon::prelude::*;

/// Estimate normals for the point cloud using K-nearest neighbors.
/// Uses the eigenvector of the smallest eigenvalue of the neighborhood covariance.
/// Modifies the point cloud in place to add normals; signs are arbitrary.
pub fn estimate_normals(pc: &mut PointCloud, k: usize) {
    if pc.is_empty() {
        return;
    }

    let index = PointIndex::new(&pc.points);
    let points = &pc.points;

    let normals: Vec<Vector3<f64>> = points
        .par_iter()
        .map(|p| {
            let neighbors = index.k_nearest(p, k);
            if neighbors.len() < 3 {
                return Vector3::z(); // Default up
            }

            let mut centroid = Vector3::zeros();
            for &n in &neighbors {
                centroid += points[n].coords;
            }
            centroid /= neighbors.len() as f64;

            let mut cov = Matrix3::zeros();
            for &n in &neighbors {
                let d = points[n].coords - centroid;
                cov += d * d.transpose();
            }
            cov /= neighbors.len() as f64;

            let eigen = SymmetricEigen::new(cov);

            // Find index of smallest eigenvalue explicitly, the order is not guaranteed
            let mut min_val = f64::MAX;
            let mut min_idx = 0;
            for i in 0..3 {
                let val = eigen.eigenvalues[i];
                if val < min_val {
                    min_val = val;
                    min_idx = i;
                }
            }

            eigen.eigenvectors.column(min_idx).into_owned()
        })
        .collect();

    pc.normals = Some(normals);
}

/// Orient normals consistently by propagating signs through k-NN neighborhoods.
pub fn orient_normals(pc: &mut PointCloud, k: usize) {
    let n = pc.len();
    if n < 3 {
        return;
    }

    let mut normals = match pc.normals.take() {
        Some(n) => n,
        None => return,
    };

    let index = PointIndex::new(&pc.points);

    let mut visited = vec![false; n];
    for seed in 0..n {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut queue = vec![seed];

        while let Some(i) = queue.pop() {
            for j in index.k_nearest(&pc.points[i], k) {
                if visited[j] {
                    continue;
                }
                // Flip if pointing opposite to current
                if normals[j].dot(&normals[i]) < 0.0 {
                    normals[j] = -normals[j];
                }
                visited[j] = true;
                queue.push(j);
            }
        }
    }

    pc.normals = Some(normals);
}

/// Flip all normals together so that most of them point away from the centroid.
///
/// When the vote is inconclusive (flat patches), the mean normal is made to
/// have a positive dominant component instead.
pub fn orient_normals_outward(pc: &mut PointCloud) {
    let Some(normals) = pc.normals.as_mut() else {
        return;
    };
    if normals.is_empty() {
        return;
    }

    let mut centroid = Vector3::zeros();
    for p in &pc.points {
        centroid += p.coords;
    }
    centroid /= pc.points.len() as f64;

    let mut vote = 0.0;
    let mut mean_normal = Vector3::zeros();
    let mut spread = 0.0f64;
    for (p, nrm) in pc.points.iter().zip(normals.iter()) {
        let d = p.coords - centroid;
        vote += nrm.dot(&d);
        mean_normal += nrm;
        spread = spread.max(d.norm());
    }

    let inconclusive = vote.abs() <= 1e-6 * spread.max(1.0) * normals.len() as f64;
    let flip = if inconclusive {
        let dominant = mean_normal.iamax();
        mean_normal[dominant] < 0.0
    } else {
        vote < 0.0
    };

    if flip {
        for nrm in normals.iter_mut() {
            *nrm = -*nrm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn plane(n: usize, spacing: f64) -> PointCloud {
        let mut points = Vec::new();
        for y in 0..n {
            for x in 0..n {
                points.push(Point3::new(x as f64 * spacing, y as f64 * spacing, 0.0));
            }
        }
        PointCloud::new(points)
    }

    #[test]
    fn test_plane_normals_along_z() {
        let mut pc = plane(8, 0.1);
        estimate_normals(&mut pc, 8);
        for n in pc.normals.as_ref().unwrap() {
            assert!(n.z.abs() > 0.999);
        }
    }

    #[test]
    fn test_orientation_is_consistent() {
        let mut pc = plane(8, 0.1);
        let normals: Vec<_> = (0..64)
            .map(|i| if i % 3 == 0 { -Vector3::z() } else { Vector3::z() })
            .collect();
        pc.normals = Some(normals);
        orient_normals(&mut pc, 6);
        orient_normals_outward(&mut pc);
        for n in pc.normals.as_ref().unwrap() {
            assert!((n - Vector3::z()).norm() < 1e-12);
        }
    }

    #[test]
    fn test_sphere_normals_point_outward() {
        let mut points = Vec::new();
        for i in 0..20 {
            for j in 0..20 {
                let theta = std::f64::consts::PI * (i as f64 + 0.5) / 20.0;
                let phi = 2.0 * std::f64::consts::PI * j as f64 / 20.0;
                points.push(Point3::new(
                    theta.sin() * phi.cos(),
                    theta.sin() * phi.sin(),
                    theta.cos(),
                ));
            }
        }
        let mut pc = PointCloud::new(points);
        pc.normals = Some(pc.points.iter().map(|p| -p.coords).collect());
        orient_normals_outward(&mut pc);
        let outward = pc
            .points
            .iter()
            .zip(pc.normals.as_ref().unwrap())
            .filter(|(p, n)| p.coords.dot(n) > 0.0)
            .count();
        assert_eq!(outward, pc.len());
    }
}
