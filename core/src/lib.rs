//! Shared types for multi-way registration
//!
//! - `PointCloud` and `TriangleMesh` containers
//! - `Pose` (similarity transform) helpers
//! - Error type used by every crate in the workspace
//! - Global rayon pool initialization

pub mod geometry;
pub mod mesh;
pub mod point_cloud;
pub mod runtime;

pub use geometry::*;
pub use mesh::TriangleMesh;
pub use point_cloud::PointCloud;
pub use runtime::{current_cpu_threads, init_global_thread_pool};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
