use nalgebra::{Point3, Vector3};

#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    pub points: Vec<Point3<f64>>,
    pub normals: Option<Vec<Vector3<f64>>>,
    /// Per-point correspondence weights, 1.0 when absent
    pub weights: Option<Vec<f64>>,
}

impl PointCloud {
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        Self {
            points,
            normals: None,
            weights: None,
        }
    }

    pub fn with_normals(mut self, normals: Vec<Vector3<f64>>) -> crate::Result<Self> {
        if normals.len() == self.points.len() {
            self.normals = Some(normals);
            Ok(self)
        } else {
            Err(crate::Error::InvalidInput(format!(
                "Normal count {} does not match point count {}",
                normals.len(),
                self.points.len()
            )))
        }
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> crate::Result<Self> {
        if weights.len() != self.points.len() {
            return Err(crate::Error::InvalidInput(format!(
                "Weight count {} does not match point count {}",
                weights.len(),
                self.points.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(crate::Error::InvalidInput(
                "Weights must be finite and non-negative".to_string(),
            ));
        }
        self.weights = Some(weights);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Axis-aligned bounds as (min, max); origin for an empty cloud
    pub fn bounds(&self) -> (Point3<f64>, Point3<f64>) {
        if self.points.is_empty() {
            return (Point3::origin(), Point3::origin());
        }

        let mut min = self.points[0];
        let mut max = self.points[0];
        for p in &self.points {
            min = min.inf(p);
            max = max.sup(p);
        }
        (min, max)
    }

    pub fn bounding_box_diagonal(&self) -> f64 {
        let (min, max) = self.bounds();
        (max - min).norm()
    }
}
