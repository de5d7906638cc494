//! Polygon type and polygon-set helpers.
//!
//! A [`Polygon`] is a closed loop; the closing edge from the last point back
//! to the first is implicit. Orientation carries meaning in a polygon set:
//! counter-clockwise loops (positive area) bound material, clockwise loops
//! (negative area) are holes.

use super::simplify::{remove_colinear_edges, remove_degenerate_verts, simplify_points};
use super::{BoundingBox, Line, Point, Polyline};
use crate::{Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut, Index, IndexMut};

/// A closed polygon defined by a sequence of points.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    /// Create a new empty polygon.
    #[inline]
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Create a polygon from a vector of points.
    #[inline]
    pub fn from_points(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// The points of the polygon.
    #[inline]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Mutable access to the points.
    #[inline]
    pub fn points_mut(&mut self) -> &mut Vec<Point> {
        &mut self.points
    }

    /// Consume the polygon and return its points.
    #[inline]
    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    /// Edge starting at vertex `index`.
    #[inline]
    pub fn edge(&self, index: usize) -> Line {
        let n = self.points.len();
        Line::new(self.points[index % n], self.points[(index + 1) % n])
    }

    /// All edges including the closing one.
    pub fn edges(&self) -> Vec<Line> {
        if self.points.len() < 2 {
            return Vec::new();
        }
        (0..self.points.len()).map(|i| self.edge(i)).collect()
    }

    /// Signed area (shoelace formula), in scaled units squared.
    /// Positive for counter-clockwise loops.
    pub fn signed_area(&self) -> CoordF {
        if self.points.len() < 3 {
            return 0.0;
        }
        let n = self.points.len();
        let mut sum: i128 = 0;
        for i in 0..n {
            let j = (i + 1) % n;
            sum += self.points[i].x as i128 * self.points[j].y as i128;
            sum -= self.points[j].x as i128 * self.points[i].y as i128;
        }
        sum as CoordF / 2.0
    }

    /// Unsigned area.
    #[inline]
    pub fn area(&self) -> CoordF {
        self.signed_area().abs()
    }

    /// Whether the loop is counter-clockwise.
    #[inline]
    pub fn is_counter_clockwise(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Reverse if needed so the loop is counter-clockwise.
    pub fn make_counter_clockwise(&mut self) {
        if self.signed_area() < 0.0 {
            self.reverse();
        }
    }

    /// Reverse if needed so the loop is clockwise.
    pub fn make_clockwise(&mut self) {
        if self.signed_area() > 0.0 {
            self.reverse();
        }
    }

    /// Reverse the point order.
    #[inline]
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Total edge length.
    pub fn perimeter(&self) -> CoordF {
        if self.points.len() < 2 {
            return 0.0;
        }
        (0..self.points.len()).map(|i| self.edge(i).length()).sum()
    }

    /// Bounding box of the polygon.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// Crossing-number test. Points exactly on the boundary may go either way.
    pub fn contains_point(&self, p: &Point) -> bool {
        if self.points.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = self.points.len() - 1;
        for i in 0..self.points.len() {
            let pi = &self.points[i];
            let pj = &self.points[j];
            if (pi.y > p.y) != (pj.y > p.y) {
                let x_cross = pi.x as i128
                    + (pj.x as i128 - pi.x as i128) * (p.y as i128 - pi.y as i128)
                        / (pj.y as i128 - pi.y as i128);
                if (p.x as i128) < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Closest point on the boundary to `p`, with the index of its edge.
    pub fn closest_point(&self, p: &Point) -> Option<(usize, Point)> {
        if self.points.is_empty() {
            return None;
        }
        if self.points.len() == 1 {
            return Some((0, self.points[0]));
        }
        (0..self.points.len())
            .map(|i| (i, self.edge(i).project_point(p)))
            .min_by_key(|(_, q)| p.distance_squared(q))
    }

    /// Simplify in place. See [`simplify_points`](super::simplify::simplify_points).
    pub fn simplify(&mut self, max_resolution: Coord, max_deviation: Coord) {
        self.points = simplify_points(&self.points, true, max_resolution, max_deviation);
    }

    /// Remove spikes where the outline folds back onto itself.
    pub fn remove_degenerate_verts(&mut self) {
        self.points = remove_degenerate_verts(&self.points, true);
    }

    /// Remove vertices with a turning angle below `max_angle` radians.
    pub fn remove_colinear_edges(&mut self, max_angle: CoordF) {
        self.points = remove_colinear_edges(&self.points, max_angle);
    }

    /// The loop as a polyline starting and ending at vertex 0.
    pub fn to_polyline(&self) -> Polyline {
        Polyline::from_polygon(self)
    }

    /// Translate all points by `v`.
    pub fn translate(&mut self, v: Point) {
        for p in &mut self.points {
            *p += v;
        }
    }

    /// Axis-aligned rectangle, counter-clockwise.
    pub fn rectangle(min: Point, max: Point) -> Self {
        Self::from_points(vec![
            min,
            Point::new(max.x, min.y),
            max,
            Point::new(min.x, max.y),
        ])
    }

    /// Regular polygon approximating a circle, counter-clockwise.
    pub fn circle(center: Point, radius: Coord, segments: usize) -> Self {
        let segments = segments.max(3);
        (0..segments)
            .map(|i| {
                let a = std::f64::consts::TAU * i as CoordF / segments as CoordF;
                Point::new(
                    center.x + (radius as CoordF * a.cos()).round() as Coord,
                    center.y + (radius as CoordF * a.sin()).round() as Coord,
                )
            })
            .collect()
    }
}

impl fmt::Debug for Polygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Polygon({} points)", self.points.len())
    }
}

impl Deref for Polygon {
    type Target = [Point];

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

impl DerefMut for Polygon {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.points
    }
}

impl Index<usize> for Polygon {
    type Output = Point;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl IndexMut<usize> for Polygon {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.points[index]
    }
}

impl FromIterator<Point> for Polygon {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self::from_points(iter.into_iter().collect())
    }
}

/// A set of polygons; outer loops and holes distinguished by orientation.
pub type Polygons = Vec<Polygon>;

/// Sum of signed areas: outer loops add, holes subtract.
pub fn polygons_area(polygons: &[Polygon]) -> CoordF {
    polygons.iter().map(Polygon::signed_area).sum()
}

/// Even-odd inside test over a whole polygon set.
pub fn polygons_contain_point(polygons: &[Polygon], p: &Point) -> bool {
    polygons.iter().filter(|poly| poly.contains_point(p)).count() % 2 == 1
}

/// Bounding box of a polygon set.
pub fn polygons_bounding_box(polygons: &[Polygon]) -> BoundingBox {
    let mut bbox = BoundingBox::new();
    for poly in polygons {
        for p in poly.points() {
            bbox.merge_point(*p);
        }
    }
    bbox
}

/// Total number of vertices in a polygon set.
pub fn polygons_point_count(polygons: &[Polygon]) -> usize {
    polygons.iter().map(|p| p.len()).sum()
}

/// Closest boundary point over a polygon set: `(polygon index, edge index, point)`.
pub fn polygons_closest_point(polygons: &[Polygon], p: &Point) -> Option<(usize, usize, Point)> {
    polygons
        .iter()
        .enumerate()
        .filter_map(|(pi, poly)| poly.closest_point(p).map(|(ei, q)| (pi, ei, q)))
        .min_by_key(|(_, _, q)| p.distance_squared(q))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: Coord) -> Polygon {
        Polygon::rectangle(Point::new(0, 0), Point::new(size, size))
    }

    #[test]
    fn test_signed_area_orientation() {
        let mut sq = square(1000);
        assert!((sq.signed_area() - 1_000_000.0).abs() < 1e-9);
        assert!(sq.is_counter_clockwise());
        sq.make_clockwise();
        assert!(sq.signed_area() < 0.0);
    }

    #[test]
    fn test_contains_point() {
        let sq = square(1000);
        assert!(sq.contains_point(&Point::new(500, 500)));
        assert!(!sq.contains_point(&Point::new(1500, 500)));
    }

    #[test]
    fn test_polygons_even_odd() {
        let outer = square(1000);
        let mut hole = Polygon::rectangle(Point::new(250, 250), Point::new(750, 750));
        hole.make_clockwise();
        let set = vec![outer, hole];
        assert!(polygons_contain_point(&set, &Point::new(100, 100)));
        assert!(!polygons_contain_point(&set, &Point::new(500, 500)));
        assert!((polygons_area(&set) - 750_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_closest_point() {
        let sq = square(1000);
        let (edge, q) = sq.closest_point(&Point::new(500, -40)).unwrap();
        assert_eq!(edge, 0);
        assert_eq!(q, Point::new(500, 0));
    }

    #[test]
    fn test_perimeter_and_circle() {
        assert!((square(1000).perimeter() - 4000.0).abs() < 1e-9);
        let c = Polygon::circle(Point::zero(), 1000, 64);
        assert!(c.is_counter_clockwise());
        assert!((c.area() - std::f64::consts::PI * 1e6).abs() < 0.01 * std::f64::consts::PI * 1e6);
    }
}
