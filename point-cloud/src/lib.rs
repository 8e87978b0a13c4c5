//! Point cloud operations used by multi-way registration
//!
//! # Module Organization
//!
//! - `cpu`: voxel grid sampling, normal estimation and orientation
//! - `spatial`: R-tree backed nearest point and nearest triangle indices
//! - `alignable`: the geometry interface consumed by the ICP engine, and its
//!   point cloud and triangle mesh implementations
//!
//! # Usage
//!
//! ```ignore
//! use multiway_point_cloud::{AlignableGeometry, CloudGeometry};
//! let geometry = CloudGeometry::new(cloud)?;
//! let mask = geometry.grid_sampling(0.05);
//! ```

pub mod alignable;
pub mod cpu;
pub mod spatial;

pub use alignable::{
    AlignableGeometry, CloudGeometry, MeshGeometry, Projection, DEFAULT_NORMAL_NEIGHBORS,
};
pub use cpu::{estimate_normals, orient_normals, orient_normals_outward, voxel_grid_sampling};
pub use spatial::{closest_point_on_triangle, PointIndex, SurfacePoint, TriangleIndex};
