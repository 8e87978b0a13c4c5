//! Multi-way ICP: simultaneous alignment of N objects
//!
//! Every object is matched against every other object. Each iteration
//! refreshes all correspondences from a snapshot of the current poses, then
//! solves one transform per object from the pairs where it is the source, and
//! only then moves the objects. All per-object work runs on the rayon pool.

use super::pairs::{NumSum, PairGating, PointPairs};
use super::params::{IcpExitType, IcpMethod, IcpMode, IcpParams};
use super::point_to_plane::PointToPlaneAligner;
use super::point_to_point::PointToPointAligner;
use multiway_core::{is_finite_pose, translation_pose, Error, Pose, Result};
use multiway_point_cloud::AlignableGeometry;
use nalgebra::Vector3;
use rayon::prelude::*;
use std::sync::Arc;

const MAX_FAR_PAIR_ROUNDS: usize = 3;

/// Geometry and its current world pose
#[derive(Clone)]
pub struct IcpObject {
    pub geometry: Arc<dyn AlignableGeometry>,
    pub xf: Pose,
}

impl IcpObject {
    pub fn new(geometry: Arc<dyn AlignableGeometry>, xf: Pose) -> Self {
        Self { geometry, xf }
    }
}

/// Metrics reported after every completed iteration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationStats {
    pub iteration: usize,
    pub point_to_point: bool,
    /// RMS distance of the metric matching the solver of this iteration
    pub rms: f64,
    pub active_pairs: usize,
}

/// Outcome of `MultiwayIcp::run`
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Final pose of every object, in input order
    pub transforms: Vec<Pose>,
    pub exit_type: IcpExitType,
    pub iterations: usize,
    /// Last computed RMS distance, `f64::MAX` if no iteration completed
    pub rms: f64,
    pub active_pairs: usize,
}

pub struct MultiwayIcp {
    objects: Vec<IcpObject>,
    /// `pairs_per_obj[i]` holds one list per object j != i
    pairs_per_obj: Vec<Vec<PointPairs>>,
    params: IcpParams,
    iter: usize,
    exit_type: IcpExitType,
}

impl MultiwayIcp {
    /// Prepare the registration of `objects`, sampling source points on a
    /// grid of `sampling_voxel_size` (non-positive keeps every point).
    pub fn new(objects: Vec<IcpObject>, sampling_voxel_size: f64) -> Result<Self> {
        if objects.is_empty() {
            return Err(Error::InvalidInput(
                "Multiway ICP needs at least one object".to_string(),
            ));
        }
        if let Some(i) = objects.iter().position(|o| o.geometry.num_points() == 0) {
            return Err(Error::InvalidInput(format!("Object {} has no points", i)));
        }
        if let Some(i) = objects.iter().position(|o| !is_finite_pose(&o.xf)) {
            return Err(Error::InvalidInput(format!(
                "Object {} has a non-finite initial pose",
                i
            )));
        }

        let mut icp = Self {
            objects,
            pairs_per_obj: Vec::new(),
            params: IcpParams::default(),
            iter: 0,
            exit_type: IcpExitType::NotStarted,
        };
        icp.resample_points(sampling_voxel_size);
        Ok(icp)
    }

    /// Same as `new` followed by `set_params`
    pub fn with_params(objects: Vec<IcpObject>, sampling_voxel_size: f64, params: IcpParams) -> Result<Self> {
        let mut icp = Self::new(objects, sampling_voxel_size)?;
        icp.set_params(params)?;
        Ok(icp)
    }

    pub fn params(&self) -> &IcpParams {
        &self.params
    }

    pub fn set_params(&mut self, params: IcpParams) -> Result<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub fn objects(&self) -> &[IcpObject] {
        &self.objects
    }

    /// Rebuild every pair list from a fresh grid sampling; all pairs start inactive
    pub fn resample_points(&mut self, sampling_voxel_size: f64) {
        let samples: Vec<Vec<bool>> = self
            .objects
            .par_iter()
            .map(|obj| obj.geometry.grid_sampling(sampling_voxel_size))
            .collect();

        let n = self.objects.len();
        self.pairs_per_obj = samples
            .iter()
            .enumerate()
            .map(|(i, mask)| {
                (0..n)
                    .filter(|&j| j != i)
                    .map(|j| PointPairs::new(i, j, mask))
                    .collect()
            })
            .collect();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            objects = n,
            voxel_size = sampling_voxel_size,
            samples = self.num_samples(),
            "resampled multiway ICP points"
        );
    }

    /// Current pose of every object
    pub fn transforms(&self) -> Vec<Pose> {
        self.objects.iter().map(|o| o.xf).collect()
    }

    /// Pair lists where object `i` is the source
    pub fn pairs(&self, i: usize) -> &[PointPairs] {
        &self.pairs_per_obj[i]
    }

    pub fn exit_type(&self) -> IcpExitType {
        self.exit_type
    }

    /// Number of the current (or last) iteration, 0 before the first one
    pub fn iteration(&self) -> usize {
        self.iter
    }

    pub fn status_info(&self) -> String {
        format!("Performed {} iterations.\n{}", self.iter, self.exit_type)
    }

    /// Total number of tracked source points over all pair lists
    pub fn num_samples(&self) -> usize {
        self.all_pairs().map(|p| p.len()).sum()
    }

    pub fn num_active_pairs(&self) -> usize {
        self.all_pairs().map(|p| p.num_active()).sum()
    }

    /// RMS point-to-point distance over all active pairs (`f64::MAX` if none)
    pub fn mean_sq_dist_to_point(&self) -> f64 {
        self.all_pairs()
            .fold(NumSum::default(), |acc, p| acc + p.sum_sq_dist_to_point())
            .root_mean_sq()
    }

    /// RMS point-to-plane distance over all active pairs (`f64::MAX` if none)
    pub fn mean_sq_dist_to_plane(&self) -> f64 {
        self.all_pairs()
            .fold(NumSum::default(), |acc, p| acc + p.sum_sq_dist_to_plane())
            .root_mean_sq()
    }

    fn all_pairs(&self) -> impl Iterator<Item = &PointPairs> + '_ {
        self.pairs_per_obj.iter().flatten()
    }

    /// Run iterations until a stop condition fires and return the poses
    pub fn run(&mut self) -> RunResult {
        self.run_with_observer(|_| {})
    }

    /// Same as `run`, calling `observer` after each iteration that produced new poses
    pub fn run_with_observer<F>(&mut self, mut observer: F) -> RunResult
    where
        F: FnMut(&IterationStats),
    {
        let mut min_dist = f64::MAX;
        let mut bad_iter_count = 0;
        let mut last_rms = f64::MAX;
        self.exit_type = IcpExitType::MaxIterations;
        self.iter = 0;

        for iter in 1..=self.params.iter_limit {
            self.iter = iter;
            self.update_point_pairs();

            let pt2pt = self.params.method == IcpMethod::PointToPoint
                || (self.params.method == IcpMethod::Combined && iter < 3);
            if !self.solve_iteration(pt2pt) {
                self.exit_type = IcpExitType::NotFoundSolution;
                break;
            }

            let cur_dist = if pt2pt {
                self.mean_sq_dist_to_point()
            } else {
                self.mean_sq_dist_to_plane()
            };
            last_rms = cur_dist;

            let stats = IterationStats {
                iteration: iter,
                point_to_point: pt2pt,
                rms: cur_dist,
                active_pairs: self.num_active_pairs(),
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(
                iteration = stats.iteration,
                point_to_point = stats.point_to_point,
                rms = stats.rms,
                active_pairs = stats.active_pairs,
                "multiway ICP iteration"
            );
            observer(&stats);

            if cur_dist < self.params.exit_val {
                self.exit_type = IcpExitType::StopMsdReached;
                break;
            }

            if cur_dist < min_dist {
                min_dist = cur_dist;
                bad_iter_count = 0;
            } else {
                if bad_iter_count >= self.params.bad_iter_stop_count {
                    self.exit_type = IcpExitType::MaxBadIterations;
                    break;
                }
                bad_iter_count += 1;
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            iterations = self.iter,
            exit = ?self.exit_type,
            rms = last_rms,
            "multiway ICP finished"
        );

        RunResult {
            transforms: self.transforms(),
            exit_type: self.exit_type,
            iterations: self.iter,
            rms: last_rms,
            active_pairs: self.num_active_pairs(),
        }
    }

    /// Recompute all correspondences for the current poses, then drop far outliers
    pub fn update_point_pairs(&mut self) {
        let gating = PairGating {
            cos_threshold: self.params.cos_threshold,
            dist_threshold_sq: self.params.dist_threshold_sq,
            mutual_closest: self.params.mutual_closest,
        };
        let objects = &self.objects;

        self.pairs_per_obj
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, pairs_of_src)| {
                let src = &objects[i];
                for pairs in pairs_of_src.iter_mut() {
                    let tgt = &objects[pairs.tgt_obj];
                    pairs.update(
                        src.geometry.as_ref(),
                        &src.xf,
                        tgt.geometry.as_ref(),
                        &tgt.xf,
                        &gating,
                    );
                }
            });

        self.deactivate_far_dist_pairs();
    }

    fn deactivate_far_dist_pairs(&mut self) {
        for _round in 0..MAX_FAR_PAIR_ROUNDS {
            let avg_dist = self.mean_sq_dist_to_point();
            let max_dist_sq = (self.params.far_dist_factor * avg_dist).powi(2);
            if max_dist_sq >= self.params.dist_threshold_sq {
                break;
            }

            let deactivated: usize = self
                .pairs_per_obj
                .iter_mut()
                .flatten()
                .map(|p| p.deactivate_far_pairs(max_dist_sq))
                .sum();

            #[cfg(feature = "tracing")]
            tracing::trace!(
                round = _round,
                max_dist_sq,
                deactivated,
                "deactivated far pairs"
            );

            if deactivated == 0 {
                break;
            }
        }
    }

    /// Solve every object and move them all, or none if any solve failed
    fn solve_iteration(&mut self, pt2pt: bool) -> bool {
        let this = &*self;
        let new_xfs: Vec<Option<Pose>> = (0..this.objects.len())
            .into_par_iter()
            .map(|id| {
                if pt2pt {
                    this.solve_point_to_point(id)
                } else {
                    this.solve_point_to_plane(id)
                }
            })
            .collect();

        if let Some(_id) = new_xfs.iter().position(|xf| xf.is_none()) {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                object = _id,
                iteration = self.iter,
                "no valid transform found for object"
            );
            return false;
        }

        for (obj, xf) in self.objects.iter_mut().zip(new_xfs) {
            if let Some(xf) = xf {
                obj.xf = xf;
            }
        }
        true
    }

    fn solve_point_to_point(&self, id: usize) -> Option<Pose> {
        let mut p2pt = PointToPointAligner::new();
        for pairs in &self.pairs_per_obj[id] {
            for vp in pairs.active_pairs() {
                p2pt.add(&vp.src_point, &vp.tgt_point, vp.weight);
            }
        }

        let axis = &self.params.fixed_rotation_axis;
        let res = match self.params.mode {
            IcpMode::RigidScale => p2pt.find_best_rigid_scale_xf(),
            IcpMode::AnyRigidXf => p2pt.find_best_rigid_xf(),
            IcpMode::OrthogonalAxis => p2pt.find_best_rigid_xf_orthogonal_rotation_axis(axis),
            IcpMode::FixedAxis => p2pt.find_best_rigid_xf_fixed_rotation_axis(axis),
            IcpMode::TranslationOnly => p2pt.find_best_translation().map(translation_pose),
        }?;

        if !is_finite_pose(&res) {
            return None;
        }
        Some(res * self.objects[id].xf)
    }

    fn solve_point_to_plane(&self, id: usize) -> Option<Pose> {
        let mut centroid = Vector3::zeros();
        let mut active_count = 0usize;
        for pairs in &self.pairs_per_obj[id] {
            for vp in pairs.active_pairs() {
                centroid += vp.src_point.coords + vp.tgt_point.coords;
                active_count += 1;
            }
        }
        if active_count == 0 {
            return None;
        }
        centroid /= (2 * active_count) as f64;

        let mut p2pl = PointToPlaneAligner::new();
        for pairs in &self.pairs_per_obj[id] {
            for vp in pairs.active_pairs() {
                p2pl.add(
                    &(vp.src_point - centroid),
                    &(vp.tgt_point - centroid),
                    &vp.tgt_norm,
                    vp.weight,
                );
            }
        }

        let params = &self.params;
        let res = if params.mode == IcpMode::TranslationOnly {
            translation_pose(p2pl.find_best_translation()?)
        } else {
            let axis = &params.fixed_rotation_axis;
            let mut am = match params.mode {
                IcpMode::RigidScale => p2pl.calculate_amendment_with_scale(),
                IcpMode::OrthogonalAxis => p2pl.calculate_orthogonal_axis_amendment(axis),
                IcpMode::FixedAxis => p2pl.calculate_fixed_axis_amendment(axis),
                IcpMode::AnyRigidXf | IcpMode::TranslationOnly => p2pl.calculate_amendment(),
            }?;
            if !am.is_finite() {
                return None;
            }

            let angle = am.rot_angles.norm();
            let scale_limit = params.p2pl_scale_limit;
            if angle > params.p2pl_angle_limit
                || am.scale > scale_limit
                || scale_limit * am.scale < 1.0
            {
                am.scale = am.scale.clamp(1.0 / scale_limit, scale_limit);
                if angle > params.p2pl_angle_limit {
                    am.rot_angles *= params.p2pl_angle_limit / angle;
                }
                // shift is re-derived for the limited rotation and scale
                am.shift = p2pl.find_best_translation_given(&am.rot_angles, am.scale)?;
            }
            am.rigid_scale_xf()
        };

        if !is_finite_pose(&res) {
            return None;
        }
        let centroid_xf = translation_pose(centroid);
        Some(centroid_xf * res * centroid_xf.inverse() * self.objects[id].xf)
    }
}
