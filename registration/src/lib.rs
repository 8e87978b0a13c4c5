//! Multi-way point set registration
//!
//! This crate aligns N point clouds or meshes to each other at once:
//! - Correspondence search between every ordered pair of objects
//! - Point-to-point and point-to-plane transform estimation
//! - Rigid, rigid + scale and axis-constrained degrees of freedom

pub mod registration;

pub use registration::{
    Amendment, IcpExitType, IcpMethod, IcpMode, IcpObject, IcpParams, IterationStats,
    MultiwayIcp, NumSum, PairGating, PointPair, PointPairs, PointToPlaneAligner,
    PointToPointAligner, RunResult,
};
