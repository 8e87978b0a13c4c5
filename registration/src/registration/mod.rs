//! Multi-way rigid registration
//!
//! - `params`: run configuration and exit classification
//! - `pairs`: per object-pair correspondence lists
//! - `point_to_point` / `point_to_plane`: per-object transform estimation
//! - `multiway`: the iteration controller

pub mod multiway;
pub mod pairs;
pub mod params;
pub mod point_to_plane;
pub mod point_to_point;

pub use multiway::{IcpObject, IterationStats, MultiwayIcp, RunResult};
pub use pairs::{NumSum, PairGating, PointPair, PointPairs};
pub use params::{IcpExitType, IcpMethod, IcpMode, IcpParams};
pub use point_to_plane::{Amendment, PointToPlaneAligner};
pub use point_to_point::PointToPointAligner;

pub use multiway_core::{Error, Result};
