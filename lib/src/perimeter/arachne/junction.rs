//! Extrusion junction for variable-width walls.
//!
//! An `ExtrusionJunction` is one vertex of a variable-width path: a centerline
//! position and the bead width at that position.

use crate::geometry::Point;
use crate::{unscale, Coord, CoordF};

/// A vertex of a variable-width extrusion path.
///
/// The width is linearly interpolated between consecutive junctions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtrusionJunction {
    /// Centerline position (scaled coordinates).
    pub position: Point,

    /// Bead width at this position (scaled). Zero for inner contour markers.
    pub width: Coord,

    /// Inset index of the bead this junction belongs to (0 = outer wall).
    pub perimeter_index: usize,

    /// Horizontal distance by which this junction overhangs the layer below.
    pub overhang_distance: Coord,
}

impl ExtrusionJunction {
    /// Create a junction.
    pub fn new(position: Point, width: Coord, perimeter_index: usize) -> Self {
        Self {
            position,
            width,
            perimeter_index,
            overhang_distance: 0,
        }
    }

    /// Width in millimeters.
    #[inline]
    pub fn width_mm(&self) -> CoordF {
        unscale(self.width)
    }

    /// Distance to another junction (scaled units).
    pub fn distance_to(&self, other: &ExtrusionJunction) -> CoordF {
        self.position.distance(&other.position)
    }

    /// Junction at parameter `t` between `self` (0) and `other` (1).
    ///
    /// Position and width are interpolated; the inset index is taken from `self`.
    pub fn lerp(&self, other: &ExtrusionJunction, t: CoordF) -> ExtrusionJunction {
        let w = self.width as CoordF + t * (other.width - self.width) as CoordF;
        ExtrusionJunction {
            position: self.position.lerp(&other.position, t),
            width: w.round() as Coord,
            perimeter_index: self.perimeter_index,
            overhang_distance: self.overhang_distance,
        }
    }
}

impl From<(Point, Coord, usize)> for ExtrusionJunction {
    fn from((position, width, perimeter_index): (Point, Coord, usize)) -> Self {
        Self::new(position, width, perimeter_index)
    }
}

/// A sequence of junctions.
pub type ExtrusionJunctions = Vec<ExtrusionJunction>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale;

    #[test]
    fn test_junction_new() {
        let j = ExtrusionJunction::new(Point::new_scale(10.0, 20.0), scale(0.45), 1);
        assert_eq!(j.position, Point::new(10_000, 20_000));
        assert!((j.width_mm() - 0.45).abs() < 1e-9);
        assert_eq!(j.perimeter_index, 1);
        assert_eq!(j.overhang_distance, 0);
    }

    #[test]
    fn test_junction_lerp() {
        let a = ExtrusionJunction::new(Point::new(0, 0), 300, 0);
        let b = ExtrusionJunction::new(Point::new(10_000, 10_000), 500, 0);
        let mid = a.lerp(&b, 0.5);
        assert_eq!(mid.position, Point::new(5_000, 5_000));
        assert_eq!(mid.width, 400);
        assert!((a.distance_to(&b) - 14_142.1356).abs() < 0.01);
    }

    #[test]
    fn test_junction_from_tuple() {
        let j: ExtrusionJunction = (Point::new(100, 200), 450, 2).into();
        assert_eq!(j.position.x, 100);
        assert_eq!(j.width, 450);
        assert_eq!(j.perimeter_index, 2);
    }
}
