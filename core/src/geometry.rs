use nalgebra::{Matrix3, Rotation3, Similarity3, Translation3, Unit, UnitQuaternion, Vector3};

/// Object pose: rotation, translation and uniform scale.
///
/// Composition is `a * b` (apply `b` first), `inverse()` inverts, and
/// `transform_point` / `inverse_transform_point` apply the pose to points.
pub type Pose = Similarity3<f64>;

/// Pose from a rotation matrix, a translation and a uniform scale.
///
/// The matrix is assumed orthonormal with determinant +1.
pub fn pose_from_parts(rotation: &Matrix3<f64>, translation: Vector3<f64>, scale: f64) -> Pose {
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*rotation));
    Similarity3::from_parts(Translation3::from(translation), rotation, scale)
}

/// Pure translation pose
pub fn translation_pose(translation: Vector3<f64>) -> Pose {
    Similarity3::from_parts(
        Translation3::from(translation),
        UnitQuaternion::identity(),
        1.0,
    )
}

/// Rotation by `angle` radians about `axis`; identity for a zero axis
pub fn rotation_about_axis(axis: &Vector3<f64>, angle: f64) -> UnitQuaternion<f64> {
    match Unit::try_new(*axis, f64::EPSILON) {
        Some(axis) => UnitQuaternion::from_axis_angle(&axis, angle),
        None => UnitQuaternion::identity(),
    }
}

/// True when every component of the pose is a finite number
pub fn is_finite_pose(pose: &Pose) -> bool {
    pose.isometry.translation.vector.iter().all(|v| v.is_finite())
        && pose.isometry.rotation.coords.iter().all(|v| v.is_finite())
        && pose.scaling().is_finite()
}

/// Two unit vectors orthogonal to `axis` and to each other
pub fn perpendicular_basis(axis: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let n = axis.normalize();
    // pick the coordinate axis least aligned with n
    let helper = if n.x.abs() <= n.y.abs() && n.x.abs() <= n.z.abs() {
        Vector3::x()
    } else if n.y.abs() <= n.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    let d0 = n.cross(&helper).normalize();
    let d1 = n.cross(&d0);
    (d0, d1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    #[test]
    fn test_pose_from_parts_applies_scale_then_translation() {
        let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let pose = pose_from_parts(rot.matrix(), Vector3::new(1.0, 0.0, 0.0), 2.0);
        let p = pose.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert!((p - Point3::new(1.0, 2.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_perpendicular_basis_is_orthonormal() {
        for axis in [
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(-5.0, 0.1, 0.0),
        ] {
            let (d0, d1) = perpendicular_basis(&axis);
            assert!(d0.dot(&axis).abs() < 1e-12);
            assert!(d1.dot(&axis).abs() < 1e-12);
            assert!(d0.dot(&d1).abs() < 1e-12);
            assert!((d0.norm() - 1.0).abs() < 1e-12);
            assert!((d1.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_finite_pose_check() {
        assert!(is_finite_pose(&Pose::identity()));
        let bad = translation_pose(Vector3::new(f64::NAN, 0.0, 0.0));
        assert!(!is_finite_pose(&bad));
    }

    #[test]
    fn test_rotation_about_zero_axis_is_identity() {
        let q = rotation_about_axis(&Vector3::zeros(), 1.0);
        assert_eq!(q, UnitQuaternion::identity());
    }
}
