//! CPU-based point cloud operations
//!
//! - Filtering (voxel grid sampling)
//! - Normal estimation and orientation

pub mod filtering;
pub mod normals;

pub use filtering::*;
pub use normals::*;
