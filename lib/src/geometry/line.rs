//! Line segments.

use super::{Point, PointF};
use crate::{Coord, CoordF};
use std::fmt;

/// A line segment between two points.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Line {
    pub a: Point,
    pub b: Point,
}

impl Line {
    /// Create a new segment.
    #[inline]
    pub const fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    /// Direction vector `b - a`.
    #[inline]
    pub fn direction(&self) -> Point {
        self.b - self.a
    }

    /// Unit direction vector.
    #[inline]
    pub fn unit_direction(&self) -> PointF {
        self.direction().to_f64().normalize()
    }

    /// Midpoint of the segment.
    #[inline]
    pub fn midpoint(&self) -> Point {
        Point::new((self.a.x + self.b.x) / 2, (self.a.y + self.b.y) / 2)
    }

    /// Squared length.
    #[inline]
    pub fn length_squared(&self) -> i128 {
        self.a.distance_squared(&self.b)
    }

    /// Length in scaled units.
    #[inline]
    pub fn length(&self) -> CoordF {
        self.a.distance(&self.b)
    }

    /// Whether both ends coincide.
    #[inline]
    pub fn is_point(&self) -> bool {
        self.a == self.b
    }

    /// The segment with swapped ends.
    #[inline]
    pub fn reversed(&self) -> Self {
        Self::new(self.b, self.a)
    }

    /// Distance from `p` to the segment.
    pub fn distance_to_point(&self, p: &Point) -> CoordF {
        (p.distance_to_segment_squared(self.a, self.b) as CoordF).sqrt()
    }

    /// Closest point on the segment to `p`.
    pub fn project_point(&self, p: &Point) -> Point {
        p.project_onto_segment(self.a, self.b)
    }

    /// Point at parameter `t` in `[0, 1]`.
    #[inline]
    pub fn point_at(&self, t: CoordF) -> Point {
        self.a.lerp(&self.b, t)
    }

    /// Whether `p` is within `tolerance` of the segment.
    pub fn contains_point(&self, p: &Point, tolerance: Coord) -> bool {
        p.distance_to_segment_squared(self.a, self.b) <= tolerance as i128 * tolerance as i128
    }

    /// Whether the two segments touch or cross.
    pub fn intersects(&self, other: &Line) -> bool {
        self.intersection_param(other).is_some()
    }

    /// Intersection point of two segments.
    pub fn intersection(&self, other: &Line) -> Option<Point> {
        self.intersection_param(other).map(|t| self.point_at(t))
    }

    /// Parameter along `self` of the crossing with `other`.
    ///
    /// Returns `None` for parallel or disjoint segments.
    pub fn intersection_param(&self, other: &Line) -> Option<CoordF> {
        let d1 = self.direction();
        let d2 = other.direction();
        let denom = d1.cross(&d2);
        if denom == 0 {
            return None;
        }
        let diff = other.a - self.a;
        let t = diff.cross(&d2) as CoordF / denom as CoordF;
        let u = diff.cross(&d1) as CoordF / denom as CoordF;
        if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
            Some(t)
        } else {
            None
        }
    }

    /// Side of `p` relative to the directed segment. Positive is left.
    #[inline]
    pub fn ccw(&self, p: &Point) -> i128 {
        self.a.ccw(&self.b, p)
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line({:?} -> {:?})", self.a, self.b)
    }
}

impl From<(Point, Point)> for Line {
    #[inline]
    fn from((a, b): (Point, Point)) -> Self {
        Self::new(a, b)
    }
}

/// A list of segments.
pub type Lines = Vec<Line>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection() {
        let l1 = Line::new(Point::new(0, 0), Point::new(1000, 1000));
        let l2 = Line::new(Point::new(0, 1000), Point::new(1000, 0));
        assert_eq!(l1.intersection(&l2), Some(Point::new(500, 500)));
        assert!(l1.intersects(&l2));
    }

    #[test]
    fn test_parallel_lines_do_not_intersect() {
        let l1 = Line::new(Point::new(0, 0), Point::new(1000, 0));
        let l2 = Line::new(Point::new(0, 10), Point::new(1000, 10));
        assert!(l1.intersection(&l2).is_none());
    }

    #[test]
    fn test_distance_to_point() {
        let l = Line::new(Point::new(0, 0), Point::new(1000, 0));
        assert!((l.distance_to_point(&Point::new(500, 300)) - 300.0).abs() < 1e-9);
        assert!(l.contains_point(&Point::new(500, 3), 5));
    }
}
