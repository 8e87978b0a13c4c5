//! Point-to-point transform estimation
//!
//! Accumulates weighted (source, target) pairs and finds the transform `x`
//! minimizing `Σ w |x(src) - tgt|²` under different degree-of-freedom
//! constraints. All estimators return `None` when the pairs carry no weight.

use multiway_core::{perpendicular_basis, pose_from_parts, rotation_about_axis, Pose};
use nalgebra::{Matrix3, Point3, Vector3};

const SVD_MAX_ITERATIONS: usize = 200;
const AXIS_SEARCH_STEPS: usize = 180;
const GOLDEN_SECTION_ITERATIONS: usize = 60;

#[derive(Debug, Clone)]
pub struct PointToPointAligner {
    sum_w: f64,
    sum_src: Vector3<f64>,
    sum_tgt: Vector3<f64>,
    /// Σ w tgt srcᵀ
    sum_tgt_src: Matrix3<f64>,
    /// Σ w |src|²
    sum_src_sq: f64,
}

/// Centered statistics of the accumulated pairs
struct Centered {
    src_centroid: Vector3<f64>,
    tgt_centroid: Vector3<f64>,
    /// Σ w (tgt - ct)(src - cs)ᵀ
    cross: Matrix3<f64>,
    /// Σ w |src - cs|²
    src_spread: f64,
}

impl Default for PointToPointAligner {
    fn default() -> Self {
        Self::new()
    }
}

impl PointToPointAligner {
    pub fn new() -> Self {
        Self {
            sum_w: 0.0,
            sum_src: Vector3::zeros(),
            sum_tgt: Vector3::zeros(),
            sum_tgt_src: Matrix3::zeros(),
            sum_src_sq: 0.0,
        }
    }

    pub fn add(&mut self, src: &Point3<f64>, tgt: &Point3<f64>, weight: f64) {
        self.sum_w += weight;
        self.sum_src += src.coords * weight;
        self.sum_tgt += tgt.coords * weight;
        self.sum_tgt_src += tgt.coords * src.coords.transpose() * weight;
        self.sum_src_sq += src.coords.norm_squared() * weight;
    }

    pub fn total_weight(&self) -> f64 {
        self.sum_w
    }

    fn centered(&self) -> Option<Centered> {
        if !(self.sum_w > 0.0) {
            return None;
        }
        let cs = self.sum_src / self.sum_w;
        let ct = self.sum_tgt / self.sum_w;
        Some(Centered {
            src_centroid: cs,
            tgt_centroid: ct,
            cross: self.sum_tgt_src - ct * cs.transpose() * self.sum_w,
            src_spread: (self.sum_src_sq - cs.norm_squared() * self.sum_w).max(0.0),
        })
    }

    /// Best translation, rotation fixed to identity
    pub fn find_best_translation(&self) -> Option<Vector3<f64>> {
        let c = self.centered()?;
        Some(c.tgt_centroid - c.src_centroid)
    }

    /// Best rotation and translation
    pub fn find_best_rigid_xf(&self) -> Option<Pose> {
        let c = self.centered()?;
        let rotation = best_rotation(&c.cross)?;
        Some(compose(&rotation, 1.0, &c))
    }

    /// Best rotation, translation and uniform scale
    pub fn find_best_rigid_scale_xf(&self) -> Option<Pose> {
        let c = self.centered()?;
        let svd = c.cross.try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)?;
        let (u, v_t) = (svd.u?, svd.v_t?);
        let d = if (u * v_t).determinant() < 0.0 { -1.0 } else { 1.0 };
        let rotation = u * Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d)) * v_t;

        let s = &svd.singular_values;
        let trace = s[0] + s[1] + d * s[2];
        let scale = if c.src_spread > 0.0 && trace > 0.0 {
            trace / c.src_spread
        } else {
            1.0
        };
        Some(compose(&rotation, scale, &c))
    }

    /// Best rotation about exactly `axis`, and translation
    pub fn find_best_rigid_xf_fixed_rotation_axis(&self, axis: &Vector3<f64>) -> Option<Pose> {
        let c = self.centered()?;
        let k = axis.try_normalize(f64::EPSILON)?;
        let angle = best_angle_about(&c.cross, &k).0;
        let rotation = rotation_about_axis(&k, angle).to_rotation_matrix().into_inner();
        Some(compose(&rotation, 1.0, &c))
    }

    /// Best rotation about some axis orthogonal to `ort`, and translation
    pub fn find_best_rigid_xf_orthogonal_rotation_axis(&self, ort: &Vector3<f64>) -> Option<Pose> {
        let c = self.centered()?;
        if ort.norm_squared() == 0.0 {
            return None;
        }
        let (d0, d1) = perpendicular_basis(ort);
        let axis_at = |phi: f64| d0 * phi.cos() + d1 * phi.sin();
        let score = |phi: f64| best_angle_about(&c.cross, &axis_at(phi)).1;

        // the objective has period π in the axis direction: coarse scan, then refine
        let step = std::f64::consts::PI / AXIS_SEARCH_STEPS as f64;
        let mut best_phi = 0.0;
        let mut best_score = f64::NEG_INFINITY;
        for i in 0..AXIS_SEARCH_STEPS {
            let phi = i as f64 * step;
            let value = score(phi);
            if value > best_score {
                best_score = value;
                best_phi = phi;
            }
        }
        let phi = golden_section_max(&score, best_phi - step, best_phi + step);

        let axis = axis_at(phi);
        let angle = best_angle_about(&c.cross, &axis).0;
        let rotation = rotation_about_axis(&axis, angle).to_rotation_matrix().into_inner();
        Some(compose(&rotation, 1.0, &c))
    }
}

/// Kabsch rotation maximizing tr(R Hᵀ) for H = Σ w tgt srcᵀ
fn best_rotation(cross: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = cross.try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)?;
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut rotation = u * v_t;

    // Ensure proper rotation (det = 1)
    if rotation.determinant() < 0.0 {
        let mut u_corrected = u;
        u_corrected.set_column(2, &(u.column(2) * -1.0));
        rotation = u_corrected * v_t;
    }
    Some(rotation)
}

/// Best angle about unit axis `k` and the value of Σ w tgt·R src it reaches.
///
/// With Rodrigues' formula Σ w tgt·R src = A cos θ + B sin θ + C where
/// A = tr H - kᵀHk, B = k·Σ w src×tgt and C = kᵀHk.
fn best_angle_about(cross: &Matrix3<f64>, k: &Vector3<f64>) -> (f64, f64) {
    let h = cross;
    let khk = k.dot(&(h * k));
    let a = h.trace() - khk;
    let v = Vector3::new(h[(2, 1)] - h[(1, 2)], h[(0, 2)] - h[(2, 0)], h[(1, 0)] - h[(0, 1)]);
    let b = k.dot(&v);
    (b.atan2(a), (a * a + b * b).sqrt() + khk)
}

fn golden_section_max(f: &dyn Fn(f64) -> f64, mut lo: f64, mut hi: f64) -> f64 {
    let ratio = (5.0f64.sqrt() - 1.0) / 2.0;
    let mut x1 = hi - ratio * (hi - lo);
    let mut x2 = lo + ratio * (hi - lo);
    let mut f1 = f(x1);
    let mut f2 = f(x2);
    for _ in 0..GOLDEN_SECTION_ITERATIONS {
        if f1 < f2 {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = lo + ratio * (hi - lo);
            f2 = f(x2);
        } else {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = hi - ratio * (hi - lo);
            f1 = f(x1);
        }
    }
    (lo + hi) / 2.0
}

/// Transform `x(p) = s R (p - cs) + ct`
fn compose(rotation: &Matrix3<f64>, scale: f64, c: &Centered) -> Pose {
    let translation = c.tgt_centroid - rotation * c.src_centroid * scale;
    pose_from_parts(rotation, translation, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiway_core::translation_pose;
    use nalgebra::{Rotation3, UnitQuaternion};

    fn sample_points() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 0.0, 3.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(-1.0, 0.5, 2.0),
        ]
    }

    fn aligner_for(xf: &Pose) -> PointToPointAligner {
        let mut aligner = PointToPointAligner::new();
        for p in sample_points() {
            aligner.add(&p, &xf.transform_point(&p), 1.0);
        }
        aligner
    }

    fn assert_same_xf(a: &Pose, b: &Pose) {
        for p in sample_points() {
            let d = (a.transform_point(&p) - b.transform_point(&p)).norm();
            assert!(d < 1e-9, "transforms differ by {}", d);
        }
    }

    #[test]
    fn test_empty_aligner_is_degenerate() {
        let aligner = PointToPointAligner::new();
        assert!(aligner.find_best_translation().is_none());
        assert!(aligner.find_best_rigid_xf().is_none());
        assert!(aligner.find_best_rigid_scale_xf().is_none());
    }

    #[test]
    fn test_translation() {
        let xf = translation_pose(Vector3::new(1.0, -2.0, 0.5));
        let t = aligner_for(&xf).find_best_translation().unwrap();
        assert!((t - Vector3::new(1.0, -2.0, 0.5)).norm() < 1e-12);
    }

    #[test]
    fn test_rigid() {
        let rot = Rotation3::from_euler_angles(0.3, -0.2, 0.9);
        let xf = pose_from_parts(rot.matrix(), Vector3::new(0.5, 1.0, -1.0), 1.0);
        let found = aligner_for(&xf).find_best_rigid_xf().unwrap();
        assert_same_xf(&found, &xf);
    }

    #[test]
    fn test_rigid_scale() {
        let rot = Rotation3::from_euler_angles(-0.4, 0.1, 0.7);
        let xf = pose_from_parts(rot.matrix(), Vector3::new(-2.0, 0.0, 3.0), 1.7);
        let found = aligner_for(&xf).find_best_rigid_scale_xf().unwrap();
        assert!((found.scaling() - 1.7).abs() < 1e-9);
        assert_same_xf(&found, &xf);
    }

    #[test]
    fn test_fixed_axis() {
        let axis = Vector3::new(1.0, 1.0, 0.0).normalize();
        let q = UnitQuaternion::from_axis_angle(&nalgebra::Unit::new_normalize(axis), 0.6);
        let xf = pose_from_parts(q.to_rotation_matrix().matrix(), Vector3::new(0.0, 1.0, 2.0), 1.0);
        let found = aligner_for(&xf)
            .find_best_rigid_xf_fixed_rotation_axis(&axis)
            .unwrap();
        assert_same_xf(&found, &xf);
    }

    #[test]
    fn test_fixed_axis_keeps_axis() {
        // rotation about x cannot be expressed about z, the result still turns about z
        let rot = Rotation3::from_axis_angle(&Vector3::x_axis(), 0.5);
        let xf = pose_from_parts(rot.matrix(), Vector3::zeros(), 1.0);
        let found = aligner_for(&xf)
            .find_best_rigid_xf_fixed_rotation_axis(&Vector3::z())
            .unwrap();
        let axis = found.isometry.rotation.axis();
        if let Some(axis) = axis {
            assert!(axis.cross(&Vector3::z()).norm() < 1e-9);
        }
    }

    #[test]
    fn test_orthogonal_axis() {
        // rotation about x is orthogonal to the z axis constraint
        let rot = Rotation3::from_axis_angle(&Vector3::x_axis(), 0.4);
        let xf = pose_from_parts(rot.matrix(), Vector3::new(1.0, 0.0, 0.0), 1.0);
        let found = aligner_for(&xf)
            .find_best_rigid_xf_orthogonal_rotation_axis(&Vector3::z())
            .unwrap();
        for p in sample_points() {
            let d = (found.transform_point(&p) - xf.transform_point(&p)).norm();
            assert!(d < 1e-6, "transforms differ by {}", d);
        }
    }

    #[test]
    fn test_zero_axis_is_degenerate() {
        let aligner = aligner_for(&Pose::identity());
        assert!(aligner
            .find_best_rigid_xf_fixed_rotation_axis(&Vector3::zeros())
            .is_none());
        assert!(aligner
            .find_best_rigid_xf_orthogonal_rotation_axis(&Vector3::zeros())
            .is_none());
    }
}
