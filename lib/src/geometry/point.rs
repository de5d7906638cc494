//! Point types for 2D geometry.
//!
//! All layer geometry lives on an integer micrometer grid (`Point`). Floating
//! point vectors (`PointF`) are used for intermediate directions, normals and
//! interpolation, and are rounded back onto the grid when stored.

use crate::{scale, unscale, Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// A 2D point with scaled integer coordinates.
///
/// 1 unit = 1 micrometer.
///
/// # Example
/// ```
/// use slicecore::geometry::Point;
/// use slicecore::scale;
///
/// // A point at (1mm, 2mm)
/// let p = Point::new(scale(1.0), scale(2.0));
/// assert_eq!(p, Point::new_scale(1.0, 2.0));
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: Coord,
    pub y: Coord,
}

impl Point {
    /// Create a new point with the given coordinates.
    #[inline]
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }

    /// Create a new point from millimeter coordinates.
    #[inline]
    pub fn new_scale(x: CoordF, y: CoordF) -> Self {
        Self {
            x: scale(x),
            y: scale(y),
        }
    }

    /// The origin.
    #[inline]
    pub const fn zero() -> Self {
        Self { x: 0, y: 0 }
    }

    /// Convert to a floating point vector in scaled units.
    #[inline]
    pub fn to_f64(&self) -> PointF {
        PointF::new(self.x as CoordF, self.y as CoordF)
    }

    /// Convert to millimeters.
    #[inline]
    pub fn to_mm(&self) -> (CoordF, CoordF) {
        (unscale(self.x), unscale(self.y))
    }

    /// Squared distance to another point.
    /// Returns i128 to avoid overflow with large coordinates.
    #[inline]
    pub fn distance_squared(&self, other: &Point) -> i128 {
        let dx = (other.x - self.x) as i128;
        let dy = (other.y - self.y) as i128;
        dx * dx + dy * dy
    }

    /// Distance to another point in scaled units.
    #[inline]
    pub fn distance(&self, other: &Point) -> CoordF {
        (self.distance_squared(other) as CoordF).sqrt()
    }

    /// Squared length of this point as a vector.
    #[inline]
    pub fn length_squared(&self) -> i128 {
        let x = self.x as i128;
        let y = self.y as i128;
        x * x + y * y
    }

    /// Length of this point as a vector.
    #[inline]
    pub fn length(&self) -> CoordF {
        (self.length_squared() as CoordF).sqrt()
    }

    /// Cross product (z component) of two vectors.
    #[inline]
    pub fn cross(&self, other: &Point) -> i128 {
        self.x as i128 * other.y as i128 - self.y as i128 * other.x as i128
    }

    /// Dot product of two vectors.
    #[inline]
    pub fn dot(&self, other: &Point) -> i128 {
        self.x as i128 * other.x as i128 + self.y as i128 * other.y as i128
    }

    /// Orientation of the turn `self -> p1 -> p2`. Positive is counter-clockwise.
    #[inline]
    pub fn ccw(&self, p1: &Point, p2: &Point) -> i128 {
        (*p1 - *self).cross(&(*p2 - *self))
    }

    /// The vector rotated by 90 degrees counter-clockwise.
    #[inline]
    pub fn turn_90_ccw(&self) -> Point {
        Point::new(-self.y, self.x)
    }

    /// Rescale this vector to the given length.
    pub fn normal(&self, len: Coord) -> Point {
        let l = self.length();
        if l < 0.5 {
            return Point::zero();
        }
        Point::new(
            (self.x as CoordF * len as CoordF / l).round() as Coord,
            (self.y as CoordF * len as CoordF / l).round() as Coord,
        )
    }

    /// Index of the point in `points` closest to this one.
    pub fn nearest_point_index(&self, points: &[Point]) -> Option<usize> {
        points
            .iter()
            .enumerate()
            .min_by_key(|(_, p)| self.distance_squared(p))
            .map(|(i, _)| i)
    }

    /// Project this point onto the segment `a`-`b`, clamped to the segment.
    pub fn project_onto_segment(&self, a: Point, b: Point) -> Point {
        let ab = b - a;
        let len2 = ab.length_squared();
        if len2 == 0 {
            return a;
        }
        let t = ((*self - a).dot(&ab) as CoordF / len2 as CoordF).clamp(0.0, 1.0);
        a.lerp(&b, t)
    }

    /// Squared distance from this point to the segment `a`-`b`.
    pub fn distance_to_segment_squared(&self, a: Point, b: Point) -> i128 {
        self.distance_squared(&self.project_onto_segment(a, b))
    }

    /// Linear interpolation towards `other`.
    #[inline]
    pub fn lerp(&self, other: &Point, t: CoordF) -> Point {
        Point::new(
            (self.x as CoordF + (other.x - self.x) as CoordF * t).round() as Coord,
            (self.y as CoordF + (other.y - self.y) as CoordF * t).round() as Coord,
        )
    }

    /// Whether two points are within `tolerance` of each other.
    #[inline]
    pub fn coincides_with(&self, other: &Point, tolerance: Coord) -> bool {
        self.distance_squared(other) <= tolerance as i128 * tolerance as i128
    }

    /// Whether `other` lies within `max_dist` of this point.
    #[inline]
    pub fn shorter_than(&self, other: &Point, max_dist: Coord) -> bool {
        let d = *other - *self;
        if d.x.abs() > max_dist || d.y.abs() > max_dist {
            return false;
        }
        d.length_squared() <= max_dist as i128 * max_dist as i128
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({}, {})", self.x, self.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", unscale(self.x), unscale(self.y))
    }
}

impl Add for Point {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Point {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Point {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl SubAssign for Point {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.x -= other.x;
        self.y -= other.y;
    }
}

impl Neg for Point {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl Mul<Coord> for Point {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: Coord) -> Self {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

impl Mul<CoordF> for Point {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: CoordF) -> Self {
        Self::new(
            (self.x as CoordF * scalar).round() as Coord,
            (self.y as CoordF * scalar).round() as Coord,
        )
    }
}

impl Div<Coord> for Point {
    type Output = Self;

    #[inline]
    fn div(self, scalar: Coord) -> Self {
        Self::new(self.x / scalar, self.y / scalar)
    }
}

impl From<(Coord, Coord)> for Point {
    #[inline]
    fn from((x, y): (Coord, Coord)) -> Self {
        Self::new(x, y)
    }
}

impl From<PointF> for Point {
    #[inline]
    fn from(p: PointF) -> Self {
        Self::new(p.x.round() as Coord, p.y.round() as Coord)
    }
}

/// A 2D vector with floating point coordinates in scaled units.
#[derive(Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    pub x: CoordF,
    pub y: CoordF,
}

impl PointF {
    /// Create a new vector.
    #[inline]
    pub const fn new(x: CoordF, y: CoordF) -> Self {
        Self { x, y }
    }

    /// Round onto the integer grid.
    #[inline]
    pub fn to_point(&self) -> Point {
        Point::from(*self)
    }

    /// Distance to another vector.
    #[inline]
    pub fn distance(&self, other: &PointF) -> CoordF {
        (*other - *self).length()
    }

    /// Squared length.
    #[inline]
    pub fn length_squared(&self) -> CoordF {
        self.x * self.x + self.y * self.y
    }

    /// Length.
    #[inline]
    pub fn length(&self) -> CoordF {
        self.length_squared().sqrt()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len < 1e-12 {
            Self::default()
        } else {
            Self::new(self.x / len, self.y / len)
        }
    }

    /// The vector rotated by 90 degrees counter-clockwise.
    #[inline]
    pub fn perp(&self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Dot product.
    #[inline]
    pub fn dot(&self, other: &PointF) -> CoordF {
        self.x * other.x + self.y * other.y
    }

    /// Cross product (z component).
    #[inline]
    pub fn cross(&self, other: &PointF) -> CoordF {
        self.x * other.y - self.y * other.x
    }
}

impl fmt::Debug for PointF {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointF({:.3}, {:.3})", self.x, self.y)
    }
}

impl Add for PointF {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for PointF {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl Neg for PointF {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl Mul<CoordF> for PointF {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: CoordF) -> Self {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

impl Div<CoordF> for PointF {
    type Output = Self;

    #[inline]
    fn div(self, scalar: CoordF) -> Self {
        Self::new(self.x / scalar, self.y / scalar)
    }
}

impl From<Point> for PointF {
    #[inline]
    fn from(p: Point) -> Self {
        p.to_f64()
    }
}

/// A list of points.
pub type Points = Vec<Point>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_scale() {
        let p = Point::new_scale(1.5, -2.0);
        assert_eq!(p, Point::new(1500, -2000));
        assert_eq!(p.to_mm(), (1.5, -2.0));
    }

    #[test]
    fn test_distance_and_length() {
        let a = Point::new(0, 0);
        let b = Point::new(3000, 4000);
        assert_eq!(a.distance_squared(&b), 25_000_000);
        assert!((a.distance(&b) - 5000.0).abs() < 1e-9);
        assert!((b.length() - 5000.0).abs() < 1e-9);
    }

    #[test]
    fn test_ccw() {
        let o = Point::new(0, 0);
        assert!(o.ccw(&Point::new(10, 0), &Point::new(10, 10)) > 0);
        assert!(o.ccw(&Point::new(10, 0), &Point::new(10, -10)) < 0);
        assert_eq!(o.ccw(&Point::new(10, 0), &Point::new(20, 0)), 0);
    }

    #[test]
    fn test_project_onto_segment() {
        let p = Point::new(500, 300);
        let proj = p.project_onto_segment(Point::new(0, 0), Point::new(1000, 0));
        assert_eq!(proj, Point::new(500, 0));

        let beyond = Point::new(2000, 10).project_onto_segment(Point::new(0, 0), Point::new(1000, 0));
        assert_eq!(beyond, Point::new(1000, 0));
    }

    #[test]
    fn test_normal() {
        let v = Point::new(300, 400).normal(1000);
        assert_eq!(v, Point::new(600, 800));
        assert_eq!(Point::zero().normal(1000), Point::zero());
    }

    #[test]
    fn test_shorter_than() {
        let a = Point::new(0, 0);
        assert!(a.shorter_than(&Point::new(30, 40), 50));
        assert!(!a.shorter_than(&Point::new(30, 41), 50));
        assert!(!a.shorter_than(&Point::new(100, 0), 50));
    }

    #[test]
    fn test_pointf_ops() {
        let v = PointF::new(3.0, 4.0);
        assert!((v.length() - 5.0).abs() < 1e-12);
        let n = v.normalize();
        assert!((n.length() - 1.0).abs() < 1e-12);
        assert_eq!(v.perp(), PointF::new(-4.0, 3.0));
        assert_eq!(v.to_point(), Point::new(3, 4));
    }
}
