//! Point-to-plane transform estimation
//!
//! Minimizes `Σ w (n·(x(src) - tgt))²` with the transform linearized for small
//! rotations: `x(p) ≈ p + r×p + σp + t`, where `r` is a rotation vector, `1 + σ`
//! the scale and `t` the shift. Unknowns are stacked as `[r, σ, t]`.

use multiway_core::{perpendicular_basis, Pose};
use nalgebra::{
    DMatrix, DVector, Matrix3, Point3, SMatrix, SVector, Similarity3, Translation3, UnitQuaternion,
    Vector3,
};

type Matrix7 = SMatrix<f64, 7, 7>;
type Vector7 = SVector<f64, 7>;

const SVD_MAX_ITERATIONS: usize = 200;
/// A system whose smallest singular value is below this fraction of the
/// largest is rank deficient and has no unique solution
const RELATIVE_RANK_TOLERANCE: f64 = 1e-12;

/// Small-angle transform update found by `PointToPlaneAligner`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amendment {
    /// Rotation vector: axis times angle in radians
    pub rot_angles: Vector3<f64>,
    pub shift: Vector3<f64>,
    pub scale: f64,
}

impl Amendment {
    pub fn is_finite(&self) -> bool {
        self.rot_angles.iter().chain(self.shift.iter()).all(|v| v.is_finite())
            && self.scale.is_finite()
    }

    /// `x(p) = scale * R(rot_angles) p + shift`
    pub fn rigid_scale_xf(&self) -> Pose {
        Similarity3::from_parts(
            Translation3::from(self.shift),
            UnitQuaternion::from_scaled_axis(self.rot_angles),
            self.scale,
        )
    }
}

#[derive(Debug, Clone)]
pub struct PointToPlaneAligner {
    /// Σ w J Jᵀ with J = [src×n, n·src, n]
    sum_a: Matrix7,
    /// Σ w J n·(src - tgt)
    sum_b: Vector7,
    sum_w: f64,
    count: usize,
}

impl Default for PointToPlaneAligner {
    fn default() -> Self {
        Self::new()
    }
}

impl PointToPlaneAligner {
    pub fn new() -> Self {
        Self {
            sum_a: Matrix7::zeros(),
            sum_b: Vector7::zeros(),
            sum_w: 0.0,
            count: 0,
        }
    }

    pub fn add(&mut self, src: &Point3<f64>, tgt: &Point3<f64>, tgt_normal: &Vector3<f64>, weight: f64) {
        let s = src.coords;
        let n = tgt_normal;
        let c = s.cross(n);
        let j = Vector7::from_column_slice(&[c.x, c.y, c.z, n.dot(&s), n.x, n.y, n.z]);
        let residual = n.dot(&(s - tgt.coords));

        self.sum_a += j * j.transpose() * weight;
        self.sum_b += j * (residual * weight);
        self.sum_w += weight;
        self.count += 1;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn total_weight(&self) -> f64 {
        self.sum_w
    }

    /// Rotation and shift
    pub fn calculate_amendment(&self) -> Option<Amendment> {
        let basis = [
            unit(0),
            unit(1),
            unit(2),
            unit(4),
            unit(5),
            unit(6),
        ];
        self.solve_in(&basis)
    }

    /// Rotation, scale and shift
    pub fn calculate_amendment_with_scale(&self) -> Option<Amendment> {
        let basis: Vec<Vector7> = (0..7).map(unit).collect();
        self.solve_in(&basis)
    }

    /// Rotation about `axis` only, and shift
    pub fn calculate_fixed_axis_amendment(&self, axis: &Vector3<f64>) -> Option<Amendment> {
        let k = axis.try_normalize(f64::EPSILON)?;
        let basis = [rotation_dir(&k), unit(4), unit(5), unit(6)];
        self.solve_in(&basis)
    }

    /// Rotation about an axis orthogonal to `ort`, and shift
    pub fn calculate_orthogonal_axis_amendment(&self, ort: &Vector3<f64>) -> Option<Amendment> {
        if ort.norm_squared() == 0.0 {
            return None;
        }
        let (d0, d1) = perpendicular_basis(ort);
        let basis = [rotation_dir(&d0), rotation_dir(&d1), unit(4), unit(5), unit(6)];
        self.solve_in(&basis)
    }

    /// Best shift with rotation fixed to identity and unit scale
    pub fn find_best_translation(&self) -> Option<Vector3<f64>> {
        self.find_best_translation_given(&Vector3::zeros(), 1.0)
    }

    /// Best shift for the given rotation vector and scale.
    ///
    /// `None` without weight or when the normals do not constrain every
    /// direction of the shift.
    pub fn find_best_translation_given(&self, rot_angles: &Vector3<f64>, scale: f64) -> Option<Vector3<f64>> {
        if !(self.sum_w > 0.0) {
            return None;
        }
        let a_tt: Matrix3<f64> = self.sum_a.fixed_view::<3, 3>(4, 4).into_owned();
        let a_tr: Matrix3<f64> = self.sum_a.fixed_view::<3, 3>(4, 0).into_owned();
        let a_ts: Vector3<f64> = self.sum_a.fixed_view::<3, 1>(4, 3).into_owned();
        let b_t: Vector3<f64> = self.sum_b.fixed_view::<3, 1>(4, 0).into_owned();

        let rhs = -(b_t + a_tr * rot_angles + a_ts * (scale - 1.0));
        let m = DMatrix::from_column_slice(3, 3, a_tt.as_slice());
        let shift = solve_full_rank(m, DVector::from_column_slice(rhs.as_slice()))?;
        Some(Vector3::new(shift[0], shift[1], shift[2]))
    }

    /// Minimize over `x = Σ y_i basis_i`; `None` if that minimum is not unique
    fn solve_in(&self, basis: &[Vector7]) -> Option<Amendment> {
        if !(self.sum_w > 0.0) {
            return None;
        }
        let d = basis.len();
        let m = DMatrix::from_fn(d, d, |i, j| basis[i].dot(&(self.sum_a * basis[j])));
        let rhs = DVector::from_fn(d, |i, _| -basis[i].dot(&self.sum_b));
        let y = solve_full_rank(m, rhs)?;

        let mut x = Vector7::zeros();
        for (i, b) in basis.iter().enumerate() {
            x += b * y[i];
        }
        Some(Amendment {
            rot_angles: Vector3::new(x[0], x[1], x[2]),
            scale: 1.0 + x[3],
            shift: Vector3::new(x[4], x[5], x[6]),
        })
    }
}

fn unit(i: usize) -> Vector7 {
    let mut v = Vector7::zeros();
    v[i] = 1.0;
    v
}

fn rotation_dir(axis: &Vector3<f64>) -> Vector7 {
    let mut v = Vector7::zeros();
    v[0] = axis.x;
    v[1] = axis.y;
    v[2] = axis.z;
    v
}

/// Solution of the symmetric system `m y = rhs`, `None` if `m` is singular
fn solve_full_rank(m: DMatrix<f64>, rhs: DVector<f64>) -> Option<DVector<f64>> {
    if m.iter().chain(rhs.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    let svd = m.try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)?;
    let max_sv = svd.singular_values.max();
    let min_sv = svd.singular_values.min();
    let tolerance = max_sv * RELATIVE_RANK_TOLERANCE;
    if !(max_sv > 0.0) || min_sv <= tolerance {
        return None;
    }
    svd.solve(&rhs, tolerance).ok()
}
