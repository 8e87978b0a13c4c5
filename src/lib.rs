pub use multiway_core as core;
pub use multiway_point_cloud as point_cloud;
pub use multiway_registration as registration;

pub use multiway_core::{Error, PointCloud, Pose, Result, TriangleMesh};
pub use multiway_point_cloud::{AlignableGeometry, CloudGeometry, MeshGeometry};
pub use multiway_registration::{
    IcpExitType, IcpMethod, IcpMode, IcpObject, IcpParams, IterationStats, MultiwayIcp,
    RunResult,
};

/// Size the rayon pool used by sampling, correspondence updates and solves.
///
/// Call once at startup, before the first `MultiwayIcp` is built. Later calls
/// return the first outcome. An explicit `num_threads` takes precedence over
/// the `MULTIWAY_CPU_THREADS` environment variable.
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<()> {
    multiway_core::init_global_thread_pool(num_threads)
}
