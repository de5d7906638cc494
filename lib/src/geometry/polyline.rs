//! Polyline type for open paths.

use super::simplify::simplify_points;
use super::{BoundingBox, Line, Point, Polygon};
use crate::{Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut, Index, IndexMut};

/// An open polyline defined by a sequence of points.
///
/// Unlike a [`Polygon`], a polyline is not implicitly closed: it runs from the
/// first point to the last point.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Point>,
}

impl Polyline {
    /// Create a new empty polyline.
    #[inline]
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Create a polyline from a vector of points.
    #[inline]
    pub fn from_points(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Create a polyline walking once around `polygon`, repeating its first point.
    pub fn from_polygon(polygon: &Polygon) -> Self {
        let mut points = polygon.points().to_vec();
        if let Some(&first) = points.first() {
            points.push(first);
        }
        Self { points }
    }

    /// The points of this polyline.
    #[inline]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Mutable access to the points.
    #[inline]
    pub fn points_mut(&mut self) -> &mut Vec<Point> {
        &mut self.points
    }

    /// Consume the polyline and return its points.
    #[inline]
    pub fn into_points(self) -> Vec<Point> {
        self.points
    }

    /// First point, if any.
    #[inline]
    pub fn first_point(&self) -> Option<Point> {
        self.points.first().copied()
    }

    /// Last point, if any.
    #[inline]
    pub fn last_point(&self) -> Option<Point> {
        self.points.last().copied()
    }

    /// Segments of the polyline.
    pub fn edges(&self) -> Vec<Line> {
        self.points
            .windows(2)
            .map(|w| Line::new(w[0], w[1]))
            .collect()
    }

    /// Total length in scaled units.
    pub fn length(&self) -> CoordF {
        self.points.windows(2).map(|w| w[0].distance(&w[1])).sum()
    }

    /// Reverse the point order.
    #[inline]
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Bounding box of all points.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// Closest point on the polyline to `p`.
    pub fn closest_point(&self, p: &Point) -> Option<Point> {
        match self.points.len() {
            0 => None,
            1 => Some(self.points[0]),
            _ => self
                .points
                .windows(2)
                .map(|w| p.project_onto_segment(w[0], w[1]))
                .min_by_key(|q| p.distance_squared(q)),
        }
    }

    /// Remove vertices that do not change the path by more than `max_deviation`
    /// where adjacent segments are shorter than `max_resolution`.
    pub fn simplify(&mut self, max_resolution: Coord, max_deviation: Coord) {
        self.points = simplify_points(&self.points, false, max_resolution, max_deviation);
    }
}

impl fmt::Debug for Polyline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Polyline({} points)", self.points.len())
    }
}

impl Deref for Polyline {
    type Target = [Point];

    fn deref(&self) -> &Self::Target {
        &self.points
    }
}

impl DerefMut for Polyline {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.points
    }
}

impl Index<usize> for Polyline {
    type Output = Point;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl IndexMut<usize> for Polyline {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.points[index]
    }
}

impl FromIterator<Point> for Polyline {
    fn from_iter<I: IntoIterator<Item = Point>>(iter: I) -> Self {
        Self::from_points(iter.into_iter().collect())
    }
}

/// A list of polylines.
pub type Polylines = Vec<Polyline>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length() {
        let pl = Polyline::from_points(vec![
            Point::new(0, 0),
            Point::new(3000, 0),
            Point::new(3000, 4000),
        ]);
        assert!((pl.length() - 7000.0).abs() < 1e-9);
        assert_eq!(pl.edges().len(), 2);
    }

    #[test]
    fn test_from_polygon_closes_loop() {
        let poly = Polygon::rectangle(Point::new(0, 0), Point::new(10, 10));
        let pl = Polyline::from_polygon(&poly);
        assert_eq!(pl.len(), 5);
        assert_eq!(pl.first_point(), pl.last_point());
    }

    #[test]
    fn test_closest_point() {
        let pl = Polyline::from_points(vec![Point::new(0, 0), Point::new(1000, 0)]);
        assert_eq!(pl.closest_point(&Point::new(400, 50)), Some(Point::new(400, 0)));
        assert_eq!(Polyline::new().closest_point(&Point::zero()), None);
    }

    #[test]
    fn test_simplify_drops_colinear_points() {
        let mut pl = Polyline::from_points(vec![
            Point::new(0, 0),
            Point::new(100, 1),
            Point::new(200, 0),
            Point::new(300, 0),
        ]);
        pl.simplify(500, 10);
        assert_eq!(pl.points(), &[Point::new(0, 0), Point::new(300, 0)]);
    }
}
