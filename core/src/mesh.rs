//! Triangle mesh container
//!
//! Vertices serve as registration samples and faces as the projection surface.
//! `to_point_cloud` drops the faces for callers that only need the vertices.

use crate::point_cloud::PointCloud;
use nalgebra::{Point3, Vector3};

/// Triangle mesh with vertices and face indices
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3<f64>>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3<f64>>>,
}

impl TriangleMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vertices_and_faces(vertices: Vec<Point3<f64>>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
        }
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Checks that every face references existing vertices
    pub fn validate(&self) -> crate::Result<()> {
        let n = self.vertices.len();
        for (i, face) in self.faces.iter().enumerate() {
            if face.iter().any(|&v| v >= n) {
                return Err(crate::Error::InvalidInput(format!(
                    "Face {} references a vertex outside 0..{}",
                    i, n
                )));
            }
        }
        Ok(())
    }

    /// Compute vertex normals as the area-weighted sum of adjacent face normals.
    /// Vertices without a non-degenerate adjacent face get a zero normal.
    pub fn compute_vertex_normals(&mut self) {
        let mut vertex_normals = vec![Vector3::zeros(); self.vertices.len()];

        for face in &self.faces {
            let v0 = self.vertices[face[0]];
            let e1 = self.vertices[face[1]] - v0;
            let e2 = self.vertices[face[2]] - v0;
            // length of the cross product is twice the triangle area
            let weighted = e1.cross(&e2);
            for &vertex_idx in face.iter() {
                vertex_normals[vertex_idx] += weighted;
            }
        }

        for normal in vertex_normals.iter_mut() {
            if let Some(unit) = normal.try_normalize(f64::EPSILON) {
                *normal = unit;
            }
        }

        self.normals = Some(vertex_normals);
    }

    /// Convert to a point cloud carrying the vertex normals
    pub fn to_point_cloud(&self) -> crate::Result<PointCloud> {
        self.validate()?;
        let normals = match &self.normals {
            Some(n) => n.clone(),
            None => {
                let mut with_normals = self.clone();
                with_normals.compute_vertex_normals();
                with_normals.normals.unwrap_or_default()
            }
        };
        PointCloud::new(self.vertices.clone()).with_normals(normals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> TriangleMesh {
        TriangleMesh::with_vertices_and_faces(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_vertex_normals_of_flat_square() {
        let mut mesh = unit_square();
        mesh.compute_vertex_normals();
        for n in mesh.normals.as_ref().unwrap() {
            assert!((n - Vector3::z()).norm() < 1e-12);
        }
    }

    #[test]
    fn test_to_point_cloud_keeps_vertices() {
        let pc = unit_square().to_point_cloud().unwrap();
        assert_eq!(pc.len(), 4);
        assert!(pc.has_normals());
    }

    #[test]
    fn test_invalid_face_index() {
        let mesh = TriangleMesh::with_vertices_and_faces(vec![Point3::origin()], vec![[0, 1, 2]]);
        assert!(mesh.validate().is_err());
        assert!(mesh.to_point_cloud().is_err());
    }
}
