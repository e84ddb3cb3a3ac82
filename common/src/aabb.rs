use cgmath::{EuclideanSpace, Point3};

/// An axis-aligned bounding box (AABB) in 3D space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// Creates a new AABB from min and max points.
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// Creates a degenerate AABB containing a single point.
    pub fn from_point(point: Point3<f32>) -> Self {
        Self { min: point, max: point }
    }

    /// Creates an AABB that encompasses all the given points.
    /// Returns None if the points slice is empty.
    pub fn from_points(points: &[Point3<f32>]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut aabb = Self::from_point(*first);
        for point in rest {
            aabb.extend(*point);
        }
        Some(aabb)
    }

    /// Grows the box so it contains `point`.
    pub fn extend(&mut self, point: Point3<f32>) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);

        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    /// Midpoint of the box, `(min + max) * 0.5`.
    pub fn center(&self) -> Point3<f32> {
        self.min.midpoint(self.max)
    }

    pub fn contains_point(&self, point: Point3<f32>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EPSILON;

    #[test]
    fn test_from_points_empty() {
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn test_center_of_extrema() {
        let aabb = Aabb::from_points(&[
            Point3::new(-1.0, 0.0, 0.0),
            Point3::new(3.0, 2.0, -4.0),
        ])
        .unwrap();

        let center = aabb.center();
        assert!((center.x - 1.0).abs() < EPSILON);
        assert!((center.y - 1.0).abs() < EPSILON);
        assert!((center.z + 2.0).abs() < EPSILON);
    }

    #[test]
    fn test_extend_keeps_existing_bounds() {
        let mut aabb = Aabb::from_point(Point3::new(0.0, 0.0, 0.0));
        aabb.extend(Point3::new(1.0, -1.0, 2.0));
        aabb.extend(Point3::new(0.5, 0.5, 0.5));

        assert_eq!(aabb.min, Point3::new(0.0, -1.0, 0.0));
        assert_eq!(aabb.max, Point3::new(1.0, 0.0, 2.0));
        assert!(aabb.contains_point(Point3::new(0.5, -0.5, 1.0)));
        assert!(!aabb.contains_point(Point3::new(1.5, 0.0, 0.0)));
    }
}
