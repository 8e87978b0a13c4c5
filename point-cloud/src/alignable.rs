//! Geometry interface consumed by the registration engine
//!
//! An `AlignableGeometry` exposes indexed points with normals (and optional
//! weights) in its own local frame, a nearest-point projection and a voxel
//! grid sampling mask. Poses are never stored here; callers pass them in.
//!
//! `CloudGeometry` projects onto the nearest sample point, `MeshGeometry`
//! onto the nearest point of the triangle surface.

use crate::cpu::{estimate_normals, orient_normals, orient_normals_outward, voxel_grid_sampling};
use crate::spatial::{PointIndex, TriangleIndex};
use multiway_core::{Error, PointCloud, Pose, Result, TriangleMesh};
use nalgebra::{Point3, Vector3};

/// Neighborhood size used when normals have to be estimated
pub const DEFAULT_NORMAL_NEIGHBORS: usize = 12;

/// Result of projecting a query point onto a geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Index of the closest point
    pub vert: usize,
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
    pub dist_sq: f64,
}

pub trait AlignableGeometry: Send + Sync {
    fn num_points(&self) -> usize;

    /// Point `v` in the local frame
    fn point(&self, v: usize) -> Point3<f64>;

    /// Unit normal of point `v` in the local frame (zero if unknown)
    fn normal(&self, v: usize) -> Vector3<f64>;

    fn weight(&self, _v: usize) -> f64 {
        1.0
    }

    /// Membership mask keeping at most one point per voxel
    fn grid_sampling(&self, voxel_size: f64) -> Vec<bool>;

    /// Closest point to `query`, both in the local frame
    fn project(&self, query: &Point3<f64>) -> Option<Projection>;

    /// Closest point to a world-space `query` when the geometry is placed at `pose`.
    ///
    /// The returned point, normal and squared distance are in world space.
    fn project_posed(&self, query: &Point3<f64>, pose: &Pose) -> Option<Projection> {
        let local = pose.inverse_transform_point(query);
        self.project(&local).map(|prj| {
            let point = pose.transform_point(&prj.point);
            Projection {
                vert: prj.vert,
                point,
                normal: pose.isometry.rotation * prj.normal,
                dist_sq: (point - query).norm_squared(),
            }
        })
    }
}

/// Point cloud with normals and a nearest neighbor index
pub struct CloudGeometry {
    cloud: PointCloud,
    normals: Vec<Vector3<f64>>,
    index: PointIndex,
}

impl CloudGeometry {
    /// Wrap a point cloud; normals are estimated and oriented when missing.
    pub fn new(mut cloud: PointCloud) -> Result<Self> {
        if cloud.is_empty() {
            return Err(Error::InvalidInput(
                "Geometry must contain at least one point".to_string(),
            ));
        }
        if cloud
            .points
            .iter()
            .any(|p| !p.coords.iter().all(|c| c.is_finite()))
        {
            return Err(Error::InvalidInput(
                "Geometry contains non-finite coordinates".to_string(),
            ));
        }

        let normals = match cloud.normals.take() {
            Some(normals) => {
                if normals.len() != cloud.len() {
                    return Err(Error::InvalidInput(format!(
                        "Normal count {} does not match point count {}",
                        normals.len(),
                        cloud.len()
                    )));
                }
                normals
            }
            None => {
                estimate_normals(&mut cloud, DEFAULT_NORMAL_NEIGHBORS);
                orient_normals(&mut cloud, DEFAULT_NORMAL_NEIGHBORS);
                orient_normals_outward(&mut cloud);
                cloud.normals.take().unwrap_or_default()
            }
        };
        let normals: Vec<Vector3<f64>> = normals
            .into_iter()
            .map(|n| n.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros))
            .collect();

        let index = PointIndex::new(&cloud.points);
        Ok(Self {
            cloud,
            normals,
            index,
        })
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.cloud.points
    }

    pub fn normals(&self) -> &[Vector3<f64>] {
        &self.normals
    }
}

impl AlignableGeometry for CloudGeometry {
    fn num_points(&self) -> usize {
        self.cloud.len()
    }

    fn point(&self, v: usize) -> Point3<f64> {
        self.cloud.points[v]
    }

    fn normal(&self, v: usize) -> Vector3<f64> {
        self.normals[v]
    }

    fn weight(&self, v: usize) -> f64 {
        self.cloud.weights.as_ref().map_or(1.0, |w| w[v])
    }

    fn grid_sampling(&self, voxel_size: f64) -> Vec<bool> {
        voxel_grid_sampling(&self.cloud.points, voxel_size)
    }

    fn project(&self, query: &Point3<f64>) -> Option<Projection> {
        self.index.nearest(query).map(|(vert, dist_sq)| Projection {
            vert,
            point: self.cloud.points[vert],
            normal: self.normals[vert],
            dist_sq,
        })
    }
}

/// Triangle mesh whose vertices are the samples and whose faces are the
/// projection target
pub struct MeshGeometry {
    vertices: Vec<Point3<f64>>,
    faces: Vec<[usize; 3]>,
    normals: Vec<Vector3<f64>>,
    index: TriangleIndex,
}

impl MeshGeometry {
    /// Vertex normals are computed (area weighted) when the mesh has none.
    pub fn new(mesh: &TriangleMesh) -> Result<Self> {
        mesh.validate()?;
        if mesh
            .vertices
            .iter()
            .any(|p| !p.coords.iter().all(|c| c.is_finite()))
        {
            return Err(Error::InvalidInput(
                "Geometry contains non-finite coordinates".to_string(),
            ));
        }

        let normals = match &mesh.normals {
            Some(normals) if normals.len() != mesh.num_vertices() => {
                return Err(Error::InvalidInput(format!(
                    "Normal count {} does not match vertex count {}",
                    normals.len(),
                    mesh.num_vertices()
                )));
            }
            Some(normals) => normals.clone(),
            None => {
                let mut with_normals = mesh.clone();
                with_normals.compute_vertex_normals();
                with_normals.normals.unwrap_or_default()
            }
        };
        let normals: Vec<Vector3<f64>> = normals
            .into_iter()
            .map(|n| n.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::zeros))
            .collect();

        let index = TriangleIndex::new(&mesh.vertices, &mesh.faces);
        if index.is_empty() {
            return Err(Error::InvalidInput(
                "Mesh must contain at least one non-degenerate face".to_string(),
            ));
        }

        Ok(Self {
            vertices: mesh.vertices.clone(),
            faces: mesh.faces.clone(),
            normals,
            index,
        })
    }

    pub fn vertices(&self) -> &[Point3<f64>] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    pub fn normals(&self) -> &[Vector3<f64>] {
        &self.normals
    }

    fn face_normal(&self, face: usize) -> Vector3<f64> {
        let [a, b, c] = self.faces[face].map(|v| self.vertices[v]);
        (b - a)
            .cross(&(c - a))
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }
}

impl AlignableGeometry for MeshGeometry {
    fn num_points(&self) -> usize {
        self.vertices.len()
    }

    fn point(&self, v: usize) -> Point3<f64> {
        self.vertices[v]
    }

    fn normal(&self, v: usize) -> Vector3<f64> {
        self.normals[v]
    }

    fn grid_sampling(&self, voxel_size: f64) -> Vec<bool> {
        voxel_grid_sampling(&self.vertices, voxel_size)
    }

    /// Nearest point on the faces. The normal blends the corner normals by
    /// barycentric weight and falls back to the face normal; `vert` is the
    /// corner with the largest weight.
    fn project(&self, query: &Point3<f64>) -> Option<Projection> {
        let hit = self.index.nearest(query)?;
        let face = self.faces[hit.face];

        let mut blended = Vector3::zeros();
        let mut vert = face[0];
        let mut best_weight = f64::NEG_INFINITY;
        for (&v, &w) in face.iter().zip(hit.barycentric.iter()) {
            blended += self.normals[v] * w;
            if w > best_weight {
                best_weight = w;
                vert = v;
            }
        }
        let normal = blended
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(|| self.face_normal(hit.face));

        Some(Projection {
            vert,
            point: hit.point,
            normal,
            dist_sq: hit.dist_sq,
        })
    }
}
