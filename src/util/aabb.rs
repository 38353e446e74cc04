//! Axis-aligned bounding boxes and the overlap tests used by melee and
//! interest management.

use super::vec2::Vec2;

/// Axis-aligned box, `min` is the top-left corner in screen space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Box of `width` x `height` centered on `center`
    pub fn from_center(center: Vec2, width: f32, height: f32) -> Self {
        let half = Vec2::new(width * 0.5, height * 0.5);
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Square box enclosing a circle
    pub fn around_circle(center: Vec2, radius: f32) -> Self {
        Self::from_center(center, radius * 2.0, radius * 2.0)
    }

    /// Smallest box containing every point, `None` for an empty slice
    pub fn enclosing(points: &[Vec2]) -> Option<Self> {
        let first = *points.first()?;
        let mut bounds = Self::new(first, first);
        for p in &points[1..] {
            bounds.min.x = bounds.min.x.min(p.x);
            bounds.min.y = bounds.min.y.min(p.y);
            bounds.max.x = bounds.max.x.max(p.x);
            bounds.max.y = bounds.max.y.max(p.y);
        }
        Some(bounds)
    }

    /// Inclusive on every edge
    #[inline]
    pub fn contains_point(&self, point: Vec2) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Coarse circle test against the box, matching the fixture query used
    /// for melee hits: the circle's bounding square must touch the box.
    #[inline]
    pub fn overlaps_circle(&self, center: Vec2, radius: f32) -> bool {
        self.min.x <= center.x + radius
            && self.max.x >= center.x - radius
            && self.min.y <= center.y + radius
            && self.max.y >= center.y - radius
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_point_edges_inclusive() {
        let b = Aabb::from_center(Vec2::ZERO, 10.0, 4.0);
        assert!(b.contains_point(Vec2::new(5.0, 2.0)));
        assert!(b.contains_point(Vec2::new(-5.0, -2.0)));
        assert!(!b.contains_point(Vec2::new(5.01, 0.0)));
    }

    #[test]
    fn test_overlaps_circle() {
        let b = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0));
        assert!(b.overlaps_circle(Vec2::new(-2.0, 5.0), 2.5));
        assert!(!b.overlaps_circle(Vec2::new(-3.0, 5.0), 2.5));
    }

    #[test]
    fn test_enclosing() {
        assert!(Aabb::enclosing(&[]).is_none());
        let b = Aabb::enclosing(&[Vec2::new(1.0, 5.0), Vec2::new(-2.0, 3.0), Vec2::new(4.0, -1.0)])
            .unwrap();
        assert_eq!(b.min, Vec2::new(-2.0, -1.0));
        assert_eq!(b.max, Vec2::new(4.0, 5.0));
        assert_eq!(b.center(), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn test_box_overlap() {
        let a = Aabb::new(Vec2::ZERO, Vec2::new(2.0, 2.0));
        let b = Aabb::new(Vec2::new(2.0, 2.0), Vec2::new(3.0, 3.0));
        let c = Aabb::new(Vec2::new(2.1, 0.0), Vec2::new(3.0, 1.0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }
}
