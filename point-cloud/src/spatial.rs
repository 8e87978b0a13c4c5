//! R-tree backed nearest neighbor indices over fixed point and triangle sets

use nalgebra::{Point3, Vector3};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

// Wrapper for RTree
struct IndexedPoint(usize, [f64; 3]);

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 3]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.1)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.1[0] - point[0];
        let dy = self.1[1] - point[1];
        let dz = self.1[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

/// Nearest neighbor index; stores point indices, not the points themselves
pub struct PointIndex {
    tree: RTree<IndexedPoint>,
}

impl PointIndex {
    pub fn new(points: &[Point3<f64>]) -> Self {
        let wrappers: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedPoint(i, [p.x, p.y, p.z]))
            .collect();
        Self {
            tree: RTree::bulk_load(wrappers),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Index and squared distance of the point nearest to `query`
    pub fn nearest(&self, query: &Point3<f64>) -> Option<(usize, f64)> {
        let q = [query.x, query.y, query.z];
        self.tree
            .nearest_neighbor(&q)
            .map(|p| (p.0, p.distance_2(&q)))
    }

    /// Indices of the `k` nearest points, closest first
    pub fn k_nearest(&self, query: &Point3<f64>, k: usize) -> Vec<usize> {
        let q = [query.x, query.y, query.z];
        self.tree
            .nearest_neighbor_iter(&q)
            .take(k)
            .map(|p| p.0)
            .collect()
    }
}

struct IndexedTriangle {
    face: usize,
    corners: [Point3<f64>; 3],
}

impl RTreeObject for IndexedTriangle {
    type Envelope = AABB<[f64; 3]>;
    fn envelope(&self) -> Self::Envelope {
        let [a, b, c] = &self.corners;
        AABB::from_corners(
            [a.x.min(b.x).min(c.x), a.y.min(b.y).min(c.y), a.z.min(b.z).min(c.z)],
            [a.x.max(b.x).max(c.x), a.y.max(b.y).max(c.y), a.z.max(b.z).max(c.z)],
        )
    }
}

impl PointDistance for IndexedTriangle {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let q = Point3::from(*point);
        let (closest, _) = closest_point_on_triangle(&q, &self.corners);
        (closest - q).norm_squared()
    }
}

/// Closest point of a triangle surface to a query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub face: usize,
    pub point: Point3<f64>,
    /// Weights of the face corners, summing to one
    pub barycentric: [f64; 3],
    pub dist_sq: f64,
}

/// Nearest surface point index over the faces of a triangle mesh.
///
/// Faces with (numerically) zero area are left out.
pub struct TriangleIndex {
    tree: RTree<IndexedTriangle>,
}

impl TriangleIndex {
    /// `faces` must reference valid entries of `vertices`
    pub fn new(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Self {
        let triangles: Vec<IndexedTriangle> = faces
            .iter()
            .enumerate()
            .filter_map(|(face, f)| {
                let corners = [vertices[f[0]], vertices[f[1]], vertices[f[2]]];
                let doubled_area = (corners[1] - corners[0])
                    .cross(&(corners[2] - corners[0]))
                    .norm();
                let longest = (corners[1] - corners[0])
                    .norm_squared()
                    .max((corners[2] - corners[1]).norm_squared())
                    .max((corners[0] - corners[2]).norm_squared());
                (doubled_area > f64::EPSILON * longest).then_some(IndexedTriangle { face, corners })
            })
            .collect();
        Self {
            tree: RTree::bulk_load(triangles),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn nearest(&self, query: &Point3<f64>) -> Option<SurfacePoint> {
        let q = [query.x, query.y, query.z];
        self.tree.nearest_neighbor(&q).map(|tri| {
            let (point, barycentric) = closest_point_on_triangle(query, &tri.corners);
            SurfacePoint {
                face: tri.face,
                point,
                barycentric,
                dist_sq: (point - query).norm_squared(),
            }
        })
    }
}

/// Closest point on triangle `abc` to `p`, with its barycentric weights.
///
/// Walks the Voronoi regions of the corners, then the edges, then the face.
/// `abc` must have non-zero area.
pub fn closest_point_on_triangle(p: &Point3<f64>, corners: &[Point3<f64>; 3]) -> (Point3<f64>, [f64; 3]) {
    let [a, b, c] = corners;
    let ab: Vector3<f64> = b - a;
    let ac: Vector3<f64> = c - a;

    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (*a, [1.0, 0.0, 0.0]);
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (*b, [0.0, 1.0, 0.0]);
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, [1.0 - v, v, 0.0]);
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (*c, [0.0, 0.0, 1.0]);
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, [1.0 - w, 0.0, w]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && d4 - d3 >= 0.0 && d5 - d6 >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, [0.0, 1.0 - w, w]);
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    (a + ab * v + ac * w, [1.0 - v - w, v, w])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_on_line() {
        let points: Vec<_> = (0..10).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let index = PointIndex::new(&points);
        assert_eq!(index.len(), 10);

        let (idx, dist_sq) = index.nearest(&Point3::new(3.2, 1.0, 0.0)).unwrap();
        assert_eq!(idx, 3);
        assert!((dist_sq - (0.04 + 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_k_nearest_sorted() {
        let points: Vec<_> = (0..10).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let index = PointIndex::new(&points);
        let knn = index.k_nearest(&Point3::new(5.1, 0.0, 0.0), 3);
        assert_eq!(knn, vec![5, 6, 4]);
    }

    #[test]
    fn test_empty_index() {
        let index = PointIndex::new(&[]);
        assert!(index.is_empty());
        assert!(index.nearest(&Point3::origin()).is_none());
    }

    fn unit_triangle() -> [Point3<f64>; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn test_closest_point_regions() {
        let tri = unit_triangle();

        let (p, bary) = closest_point_on_triangle(&Point3::new(0.25, 0.25, 0.5), &tri);
        assert!((p - Point3::new(0.25, 0.25, 0.0)).norm() < 1e-12);
        assert!((bary[0] - 0.5).abs() < 1e-12 && (bary[1] - 0.25).abs() < 1e-12);

        let (p, bary) = closest_point_on_triangle(&Point3::new(-1.0, -1.0, 0.0), &tri);
        assert_eq!(p, tri[0]);
        assert_eq!(bary, [1.0, 0.0, 0.0]);

        // beyond the hypotenuse
        let (p, bary) = closest_point_on_triangle(&Point3::new(1.0, 1.0, 0.0), &tri);
        assert!((p - Point3::new(0.5, 0.5, 0.0)).norm() < 1e-12);
        assert!((bary[1] - 0.5).abs() < 1e-12 && (bary[2] - 0.5).abs() < 1e-12);

        let (p, _) = closest_point_on_triangle(&Point3::new(0.5, -2.0, 1.0), &tri);
        assert!((p - Point3::new(0.5, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_triangle_index_picks_nearest_face() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(10.0, 10.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
            // collinear corner: zero area face
            Point3::new(20.0, 0.0, 0.0),
        ];
        let faces = vec![[0, 1, 2], [0, 2, 3], [0, 1, 4]];
        let index = TriangleIndex::new(&vertices, &faces);
        assert_eq!(index.len(), 2);

        let hit = index.nearest(&Point3::new(2.0, 7.0, -0.5)).unwrap();
        assert_eq!(hit.face, 1);
        assert!((hit.point - Point3::new(2.0, 7.0, 0.0)).norm() < 1e-12);
        assert!((hit.dist_sq - 0.25).abs() < 1e-12);
    }
}
