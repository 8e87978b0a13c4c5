//! Configuration of a multi-way ICP run

use multiway_core::{Error, Result};
use nalgebra::Vector3;
use std::fmt;

/// Which error metric drives the transform estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IcpMethod {
    /// Point-to-point for every iteration
    PointToPoint,
    /// Point-to-plane for every iteration
    PointToPlane,
    /// Point-to-point for the first two iterations, point-to-plane afterwards
    #[default]
    Combined,
}

/// Degrees of freedom of the per-object transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IcpMode {
    /// Rotation, translation and uniform scale
    RigidScale,
    /// Rotation and translation
    #[default]
    AnyRigidXf,
    /// Rotation about any axis orthogonal to `fixed_rotation_axis`, and translation
    OrthogonalAxis,
    /// Rotation about `fixed_rotation_axis`, and translation
    FixedAxis,
    /// Translation only
    TranslationOnly,
}

impl IcpMode {
    pub fn uses_fixed_axis(&self) -> bool {
        matches!(self, IcpMode::OrthogonalAxis | IcpMode::FixedAxis)
    }
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IcpExitType {
    /// No run has happened yet
    #[default]
    NotStarted,
    /// Iteration limit reached
    MaxIterations,
    /// Some object had no valid transform in the last iteration
    NotFoundSolution,
    /// RMS distance fell below `exit_val`
    StopMsdReached,
    /// RMS distance stopped improving
    MaxBadIterations,
}

impl fmt::Display for IcpExitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            IcpExitType::NotStarted => "ICP hasn't started yet.",
            IcpExitType::MaxIterations => "Limit of iterations reached.",
            IcpExitType::NotFoundSolution => "Solution not found in some iteration.",
            IcpExitType::StopMsdReached => "Required mean square deviation reached.",
            IcpExitType::MaxBadIterations => "Limit of bad iterations reached.",
        };
        f.write_str(text)
    }
}

/// Parameters of a multi-way ICP run
#[derive(Debug, Clone, PartialEq)]
pub struct IcpParams {
    pub method: IcpMethod,
    pub mode: IcpMode,
    /// Maximum rotation angle (radians) of one point-to-plane step
    pub p2pl_angle_limit: f64,
    /// Maximum scale change of one point-to-plane step, at least 1
    pub p2pl_scale_limit: f64,
    /// Minimal cosine between source and target normals of an active pair
    pub cos_threshold: f64,
    /// Maximal squared distance of an active pair
    pub dist_threshold_sq: f64,
    /// Pairs farther than `far_dist_factor` times the RMS distance are deactivated
    pub far_dist_factor: f64,
    /// Axis used by `OrthogonalAxis` and `FixedAxis` modes
    pub fixed_rotation_axis: Vector3<f64>,
    pub iter_limit: usize,
    /// Non-improving iterations tolerated before stopping
    pub bad_iter_stop_count: usize,
    /// Stop as soon as the RMS distance drops below this value
    pub exit_val: f64,
    /// Keep only pairs whose points are each other's closest points
    pub mutual_closest: bool,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            method: IcpMethod::Combined,
            mode: IcpMode::AnyRigidXf,
            p2pl_angle_limit: std::f64::consts::PI / 6.0,
            p2pl_scale_limit: 2.0,
            cos_threshold: 0.7,
            dist_threshold_sq: 1.0,
            far_dist_factor: 3.0,
            fixed_rotation_axis: Vector3::zeros(),
            iter_limit: 10,
            bad_iter_stop_count: 3,
            exit_val: 0.0,
            mutual_closest: false,
        }
    }
}

impl IcpParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: IcpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_mode(mut self, mode: IcpMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_iter_limit(mut self, iter_limit: usize) -> Self {
        self.iter_limit = iter_limit;
        self
    }

    pub fn with_bad_iter_stop_count(mut self, count: usize) -> Self {
        self.bad_iter_stop_count = count;
        self
    }

    pub fn with_exit_val(mut self, exit_val: f64) -> Self {
        self.exit_val = exit_val;
        self
    }

    pub fn with_far_dist_factor(mut self, factor: f64) -> Self {
        self.far_dist_factor = factor;
        self
    }

    /// Set the maximal pair distance (not squared)
    pub fn with_dist_threshold(mut self, dist: f64) -> Self {
        self.dist_threshold_sq = dist * dist;
        self
    }

    pub fn with_cos_threshold(mut self, cos: f64) -> Self {
        self.cos_threshold = cos;
        self
    }

    pub fn with_mutual_closest(mut self, mutual_closest: bool) -> Self {
        self.mutual_closest = mutual_closest;
        self
    }

    pub fn with_p2pl_limits(mut self, angle_limit: f64, scale_limit: f64) -> Self {
        self.p2pl_angle_limit = angle_limit;
        self.p2pl_scale_limit = scale_limit;
        self
    }

    pub fn with_fixed_rotation_axis(mut self, axis: Vector3<f64>) -> Self {
        self.fixed_rotation_axis = axis;
        self
    }

    /// Check the invariants the iteration loop relies on
    pub fn validate(&self) -> Result<()> {
        if !(self.p2pl_angle_limit > 0.0 && self.p2pl_angle_limit.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "p2pl_angle_limit must be positive, got {}",
                self.p2pl_angle_limit
            )));
        }
        if !(self.p2pl_scale_limit >= 1.0 && self.p2pl_scale_limit.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "p2pl_scale_limit must be at least 1, got {}",
                self.p2pl_scale_limit
            )));
        }
        if !(self.dist_threshold_sq >= 0.0) {
            return Err(Error::InvalidInput(format!(
                "dist_threshold_sq must be non-negative, got {}",
                self.dist_threshold_sq
            )));
        }
        if !(self.far_dist_factor >= 0.0 && self.far_dist_factor.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "far_dist_factor must be non-negative, got {}",
                self.far_dist_factor
            )));
        }
        if self.cos_threshold.is_nan() || self.exit_val.is_nan() {
            return Err(Error::InvalidInput(
                "cos_threshold and exit_val must not be NaN".to_string(),
            ));
        }
        if self.mode.uses_fixed_axis() {
            let axis = &self.fixed_rotation_axis;
            if !axis.iter().all(|c| c.is_finite()) || axis.norm_squared() == 0.0 {
                return Err(Error::InvalidInput(format!(
                    "{:?} mode requires a non-zero fixed_rotation_axis",
                    self.mode
                )));
            }
        }
        Ok(())
    }
}
