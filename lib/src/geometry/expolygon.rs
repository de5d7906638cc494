//! Polygons with holes.
//!
//! Boolean operations return [`ExPolygon`]s; the rest of the crate mostly works
//! on flat orientation-encoded [`Polygons`]. [`ExPolygon::to_polygons`] and
//! [`group_by_nesting`] convert between the two.

use super::{BoundingBox, Point, Polygon, Polygons};
use crate::CoordF;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A polygon with holes.
///
/// The contour is counter-clockwise, holes are clockwise.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExPolygon {
    /// The outer contour.
    pub contour: Polygon,
    /// The holes.
    pub holes: Vec<Polygon>,
}

impl ExPolygon {
    /// Create an ExPolygon without holes.
    #[inline]
    pub fn new(contour: Polygon) -> Self {
        Self {
            contour,
            holes: Vec::new(),
        }
    }

    /// Create an ExPolygon with holes.
    #[inline]
    pub fn with_holes(contour: Polygon, holes: Vec<Polygon>) -> Self {
        Self { contour, holes }
    }

    /// Whether the contour has no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contour.is_empty()
    }

    /// Contour area minus hole areas.
    pub fn area(&self) -> CoordF {
        self.contour.area() - self.holes.iter().map(|h| h.area()).sum::<CoordF>()
    }

    /// Bounding box of the contour.
    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        self.contour.bounding_box()
    }

    /// Inside the contour and outside every hole.
    pub fn contains_point(&self, p: &Point) -> bool {
        self.contour.contains_point(p) && !self.holes.iter().any(|h| h.contains_point(p))
    }

    /// Enforce counter-clockwise contour and clockwise holes.
    pub fn make_canonical(&mut self) {
        self.contour.make_counter_clockwise();
        for hole in &mut self.holes {
            hole.make_clockwise();
        }
    }

    /// Flatten into orientation-encoded polygons.
    pub fn to_polygons(&self) -> Polygons {
        let mut out = Vec::with_capacity(1 + self.holes.len());
        let mut contour = self.contour.clone();
        contour.make_counter_clockwise();
        out.push(contour);
        for hole in &self.holes {
            let mut h = hole.clone();
            h.make_clockwise();
            out.push(h);
        }
        out
    }
}

impl fmt::Debug for ExPolygon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExPolygon(contour: {} points, holes: {})",
            self.contour.len(),
            self.holes.len()
        )
    }
}

impl From<Polygon> for ExPolygon {
    fn from(polygon: Polygon) -> Self {
        Self::new(polygon)
    }
}

/// A list of ExPolygons.
pub type ExPolygons = Vec<ExPolygon>;

/// Flatten a list of ExPolygons into orientation-encoded polygons.
pub fn expolygons_to_polygons(expolygons: &[ExPolygon]) -> Polygons {
    expolygons.iter().flat_map(ExPolygon::to_polygons).collect()
}

/// Group flat loops into ExPolygons by nesting depth.
///
/// Loops at even depth become contours, loops at odd depth become holes of
/// the innermost enclosing contour. Orientation of the input is ignored.
pub fn group_by_nesting(polygons: &[Polygon]) -> ExPolygons {
    let loops: Vec<&Polygon> = polygons.iter().filter(|p| p.len() >= 3).collect();
    let depth_and_parent: Vec<(usize, Option<usize>)> = loops
        .iter()
        .enumerate()
        .map(|(i, poly)| {
            let sample_point = poly[0];
            let mut depth = 0;
            let mut parent: Option<usize> = None;
            for (j, other) in loops.iter().enumerate() {
                if i == j || other.area() <= poly.area() {
                    continue;
                }
                if other.contains_point(&sample_point) {
                    depth += 1;
                    let smaller = match parent {
                        Some(k) => other.area() < loops[k].area(),
                        None => true,
                    };
                    if smaller {
                        parent = Some(j);
                    }
                }
            }
            (depth, parent)
        })
        .collect();

    let mut result: ExPolygons = Vec::new();
    let mut slot: Vec<Option<usize>> = vec![None; loops.len()];
    for (i, poly) in loops.iter().enumerate() {
        if depth_and_parent[i].0 % 2 == 0 {
            let mut contour = (*poly).clone();
            contour.make_counter_clockwise();
            slot[i] = Some(result.len());
            result.push(ExPolygon::new(contour));
        }
    }
    for (i, poly) in loops.iter().enumerate() {
        let (depth, parent) = depth_and_parent[i];
        if depth % 2 == 1 {
            if let Some(target) = parent.and_then(|p| slot[p]) {
                let mut hole = (*poly).clone();
                hole.make_clockwise();
                result[target].holes.push(hole);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: i64, y0: i64, x1: i64, y1: i64) -> Polygon {
        Polygon::rectangle(Point::new(x0, y0), Point::new(x1, y1))
    }

    #[test]
    fn test_area_with_hole() {
        let ex = ExPolygon::with_holes(rect(0, 0, 100, 100), vec![rect(25, 25, 75, 75)]);
        assert!((ex.area() - 7500.0).abs() < 1e-9);
        assert!(ex.contains_point(&Point::new(10, 10)));
        assert!(!ex.contains_point(&Point::new(50, 50)));
    }

    #[test]
    fn test_group_by_nesting() {
        let loops = vec![
            rect(0, 0, 1000, 1000),
            rect(100, 100, 900, 900),
            rect(200, 200, 300, 300),
            rect(2000, 0, 2100, 100),
        ];
        let grouped = group_by_nesting(&loops);
        assert_eq!(grouped.len(), 3);
        let with_hole = grouped.iter().find(|e| e.holes.len() == 1).unwrap();
        assert!(with_hole.holes[0].signed_area() < 0.0);
        assert!(with_hole.contour.signed_area() > 0.0);
    }

    #[test]
    fn test_to_polygons_orientation() {
        let mut hole = rect(25, 25, 75, 75);
        hole.make_counter_clockwise();
        let ex = ExPolygon::with_holes(rect(0, 0, 100, 100), vec![hole]);
        let polys = ex.to_polygons();
        assert!(polys[0].signed_area() > 0.0);
        assert!(polys[1].signed_area() < 0.0);
    }
}
