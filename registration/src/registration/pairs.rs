//! Correspondence pairs between two objects
//!
//! `PointPairs` holds every sampled source point of one object matched against
//! one other object. The list is allocated once and refreshed in place every
//! iteration; `active` lists the indices of the pairs that passed all gates.

use multiway_core::Pose;
use multiway_point_cloud::AlignableGeometry;
use nalgebra::{Point3, Vector3};
use std::ops::{Add, AddAssign};

/// One source point and its closest target point, both in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPair {
    /// Index of the source point in the source geometry
    pub src_vert: usize,
    pub src_point: Point3<f64>,
    pub src_norm: Vector3<f64>,
    /// Index of the closest point in the target geometry
    pub tgt_vert: usize,
    pub tgt_point: Point3<f64>,
    pub tgt_norm: Vector3<f64>,
    pub normals_angle_cos: f64,
    pub weight: f64,
    pub dist_sq: f64,
}

impl PointPair {
    fn new(src_vert: usize) -> Self {
        Self {
            src_vert,
            src_point: Point3::origin(),
            src_norm: Vector3::zeros(),
            tgt_vert: 0,
            tgt_point: Point3::origin(),
            tgt_norm: Vector3::zeros(),
            normals_angle_cos: 0.0,
            weight: 0.0,
            dist_sq: f64::INFINITY,
        }
    }

    /// Signed distance from the source point to the target tangent plane
    pub fn dist_to_plane(&self) -> f64 {
        self.tgt_norm.dot(&(self.src_point - self.tgt_point))
    }
}

/// Gates a freshly found pair must pass to become active
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairGating {
    pub cos_threshold: f64,
    pub dist_threshold_sq: f64,
    pub mutual_closest: bool,
}

/// Sum of squared distances and the number of terms
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumSum {
    pub sum: f64,
    pub num: usize,
}

impl NumSum {
    /// Root of the mean; `f64::MAX` when there are no terms
    pub fn root_mean_sq(&self) -> f64 {
        if self.num == 0 {
            f64::MAX
        } else {
            (self.sum / self.num as f64).sqrt()
        }
    }
}

impl Add for NumSum {
    type Output = NumSum;

    fn add(self, rhs: NumSum) -> NumSum {
        NumSum {
            sum: self.sum + rhs.sum,
            num: self.num + rhs.num,
        }
    }
}

impl AddAssign for NumSum {
    fn add_assign(&mut self, rhs: NumSum) {
        self.sum += rhs.sum;
        self.num += rhs.num;
    }
}

/// Pairs from object `src_obj` to object `tgt_obj`
#[derive(Debug, Clone)]
pub struct PointPairs {
    pub src_obj: usize,
    pub tgt_obj: usize,
    pub vec: Vec<PointPair>,
    /// Sorted indices into `vec` of the active pairs
    pub active: Vec<usize>,
}

impl PointPairs {
    /// One (inactive) pair per sampled source point
    pub fn new(src_obj: usize, tgt_obj: usize, samples: &[bool]) -> Self {
        let count = samples.iter().filter(|&&s| s).count();
        let mut vec = Vec::with_capacity(count);
        vec.extend(
            samples
                .iter()
                .enumerate()
                .filter(|(_, s)| **s)
                .map(|(v, _)| PointPair::new(v)),
        );
        Self {
            src_obj,
            tgt_obj,
            vec,
            active: Vec::with_capacity(count),
        }
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    pub fn num_active(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, idx: usize) -> bool {
        self.active.binary_search(&idx).is_ok()
    }

    pub fn active_pairs(&self) -> impl Iterator<Item = &PointPair> + '_ {
        self.active.iter().map(move |&i| &self.vec[i])
    }

    /// Recompute every pair for the given poses and rebuild the active set.
    ///
    /// Pairs failing a gate keep their refreshed data but are left out of
    /// `active`. The result depends only on the inputs, so calling it twice
    /// with the same poses yields the same pairs.
    pub fn update(
        &mut self,
        src: &dyn AlignableGeometry,
        src_xf: &Pose,
        tgt: &dyn AlignableGeometry,
        tgt_xf: &Pose,
        gating: &PairGating,
    ) {
        self.active.clear();

        for (idx, pair) in self.vec.iter_mut().enumerate() {
            let v = pair.src_vert;
            let src_point = src_xf.transform_point(&src.point(v));
            let src_norm = src_xf.isometry.rotation * src.normal(v);
            pair.src_point = src_point;
            pair.src_norm = src_norm;
            pair.weight = src.weight(v);

            let Some(prj) = tgt.project_posed(&src_point, tgt_xf) else {
                pair.dist_sq = f64::INFINITY;
                continue;
            };
            pair.tgt_vert = prj.vert;
            pair.tgt_point = prj.point;
            pair.tgt_norm = prj.normal;
            pair.normals_angle_cos = src_norm.dot(&prj.normal);
            pair.dist_sq = prj.dist_sq;

            if pair.normals_angle_cos < gating.cos_threshold
                || pair.dist_sq > gating.dist_threshold_sq
            {
                continue;
            }

            if gating.mutual_closest {
                let back = src.project_posed(&prj.point, src_xf);
                if back.map(|b| b.vert) != Some(v) {
                    continue;
                }
            }

            self.active.push(idx);
        }
    }

    /// Deactivate pairs with squared distance above `max_dist_sq`; returns how many
    pub fn deactivate_far_pairs(&mut self, max_dist_sq: f64) -> usize {
        let before = self.active.len();
        let vec = &self.vec;
        self.active.retain(|&i| !(vec[i].dist_sq > max_dist_sq));
        before - self.active.len()
    }

    pub fn sum_sq_dist_to_point(&self) -> NumSum {
        let mut res = NumSum::default();
        for pair in self.active_pairs() {
            res.sum += pair.dist_sq;
            res.num += 1;
        }
        res
    }

    pub fn sum_sq_dist_to_plane(&self) -> NumSum {
        let mut res = NumSum::default();
        for pair in self.active_pairs() {
            let d = pair.dist_to_plane();
            res.sum += d * d;
            res.num += 1;
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiway_core::{translation_pose, PointCloud};
    use multiway_point_cloud::CloudGeometry;

    fn line_geometry(n: usize, normal: Vector3<f64>) -> CloudGeometry {
        let points: Vec<_> = (0..n).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let pc = PointCloud::new(points).with_normals(vec![normal; n]).unwrap();
        CloudGeometry::new(pc).unwrap()
    }

    fn gating(dist: f64) -> PairGating {
        PairGating {
            cos_threshold: 0.7,
            dist_threshold_sq: dist * dist,
            mutual_closest: false,
        }
    }

    #[test]
    fn test_new_allocates_only_samples() {
        let pairs = PointPairs::new(0, 1, &[true, false, true, true]);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs.num_active(), 0);
        assert_eq!(
            pairs.vec.iter().map(|p| p.src_vert).collect::<Vec<_>>(),
            vec![0, 2, 3]
        );
    }

    #[test]
    fn test_update_gates_by_distance() {
        let src = line_geometry(5, Vector3::z());
        let tgt = line_geometry(5, Vector3::z());
        let mut pairs = PointPairs::new(0, 1, &[true; 5]);

        pairs.update(
            &src,
            &Pose::identity(),
            &tgt,
            &translation_pose(Vector3::new(0.0, 0.5, 0.0)),
            &gating(1.0),
        );
        assert_eq!(pairs.num_active(), 5);
        assert!((pairs.sum_sq_dist_to_point().root_mean_sq() - 0.5).abs() < 1e-12);
        assert!(pairs.sum_sq_dist_to_plane().root_mean_sq() < 1e-12);

        pairs.update(
            &src,
            &Pose::identity(),
            &tgt,
            &translation_pose(Vector3::new(0.0, 2.0, 0.0)),
            &gating(1.0),
        );
        assert_eq!(pairs.num_active(), 0);
        // inactive pairs are retained for reuse
        assert_eq!(pairs.len(), 5);
        assert!((pairs.vec[0].dist_sq - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_update_gates_by_normals() {
        let src = line_geometry(5, Vector3::z());
        let tgt = line_geometry(5, -Vector3::z());
        let mut pairs = PointPairs::new(0, 1, &[true; 5]);
        pairs.update(&src, &Pose::identity(), &tgt, &Pose::identity(), &gating(1.0));
        assert_eq!(pairs.num_active(), 0);
        assert!((pairs.vec[0].normals_angle_cos + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_mutual_closest() {
        // source has 5 points, target only the first 2: far source points all
        // map to target point 1 whose closest source point is 1
        let src = line_geometry(5, Vector3::z());
        let tgt = line_geometry(2, Vector3::z());
        let mut pairs = PointPairs::new(0, 1, &[true; 5]);
        let mut gate = gating(10.0);

        pairs.update(&src, &Pose::identity(), &tgt, &Pose::identity(), &gate);
        assert_eq!(pairs.num_active(), 5);

        gate.mutual_closest = true;
        pairs.update(&src, &Pose::identity(), &tgt, &Pose::identity(), &gate);
        assert_eq!(pairs.active, vec![0, 1]);
    }

    #[test]
    fn test_deactivate_far_pairs() {
        let src = line_geometry(4, Vector3::z());
        let tgt = line_geometry(1, Vector3::z());
        let mut pairs = PointPairs::new(0, 1, &[true; 4]);
        pairs.update(&src, &Pose::identity(), &tgt, &Pose::identity(), &gating(10.0));
        assert_eq!(pairs.num_active(), 4);

        // squared distances are 0, 1, 4, 9
        assert_eq!(pairs.deactivate_far_pairs(4.0), 1);
        assert_eq!(pairs.active, vec![0, 1, 2]);
        assert_eq!(pairs.deactivate_far_pairs(4.0), 0);
        assert!(pairs.is_active(2));
        assert!(!pairs.is_active(3));
    }

    #[test]
    fn test_root_mean_sq_of_empty_sum() {
        assert_eq!(NumSum::default().root_mean_sq(), f64::MAX);
        let total = NumSum { sum: 8.0, num: 1 } + NumSum { sum: 0.0, num: 1 };
        assert!((total.root_mean_sq() - 2.0).abs() < 1e-12);
    }
}
