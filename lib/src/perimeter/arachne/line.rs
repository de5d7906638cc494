//! Variable-width extrusion lines.
//!
//! An `ExtrusionLine` is a polyline or loop of [`ExtrusionJunction`]s printed
//! as one bead. The width is linearly interpolated between junctions.

use super::junction::ExtrusionJunction;
use crate::geometry::simplify::COLLINEARITY_THRESHOLD;
use crate::geometry::{Point, Polygon, Polyline};
use crate::{Coord, CoordF};

/// A variable-width bead path.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtrusionLine {
    /// Junctions along the path.
    pub junctions: Vec<ExtrusionJunction>,

    /// Inset index, counted from the outside (0 = outer wall).
    pub inset_idx: usize,

    /// Whether this is the center bead of an odd bead count. Odd lines are
    /// open and only exist in part of the outline.
    pub is_odd: bool,

    /// Whether the path is a loop. The closing segment from the last junction
    /// back to the first is implicit.
    pub is_closed: bool,

    /// Seam vertex chosen by the planner, `None` while unset.
    pub start_idx: Option<usize>,
}

impl ExtrusionLine {
    /// Create an empty line.
    pub fn new(inset_idx: usize, is_odd: bool, is_closed: bool) -> Self {
        Self {
            junctions: Vec::new(),
            inset_idx,
            is_odd,
            is_closed,
            start_idx: None,
        }
    }

    /// Create a line from junctions.
    pub fn from_junctions(
        junctions: Vec<ExtrusionJunction>,
        inset_idx: usize,
        is_odd: bool,
        is_closed: bool,
    ) -> Self {
        Self {
            junctions,
            inset_idx,
            is_odd,
            is_closed,
            start_idx: None,
        }
    }

    /// Constant-width loop along a polygon.
    pub fn from_polygon(polygon: &Polygon, width: Coord, inset_idx: usize) -> Self {
        let junctions = polygon
            .points()
            .iter()
            .map(|p| ExtrusionJunction::new(*p, width, inset_idx))
            .collect();
        Self::from_junctions(junctions, inset_idx, false, true)
    }

    /// Number of junctions.
    #[inline]
    pub fn len(&self) -> usize {
        self.junctions.len()
    }

    /// Whether the line has no junctions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.junctions.is_empty()
    }

    /// Append a junction.
    pub fn push(&mut self, junction: ExtrusionJunction) {
        self.junctions.push(junction);
    }

    /// First junction.
    pub fn first(&self) -> Option<&ExtrusionJunction> {
        self.junctions.first()
    }

    /// Last junction.
    pub fn last(&self) -> Option<&ExtrusionJunction> {
        self.junctions.last()
    }

    /// Iterate over junctions.
    pub fn iter(&self) -> std::slice::Iter<'_, ExtrusionJunction> {
        self.junctions.iter()
    }

    /// Reverse the direction of travel.
    pub fn reverse(&mut self) {
        self.junctions.reverse();
        if let Some(idx) = self.start_idx {
            self.start_idx = Some(self.junctions.len().saturating_sub(1 + idx));
        }
    }

    /// Path length in scaled units, closing segment included for loops.
    pub fn length(&self) -> CoordF {
        let open: CoordF = self
            .junctions
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .sum();
        match (self.is_closed, self.junctions.first(), self.junctions.last()) {
            (true, Some(first), Some(last)) if self.junctions.len() > 2 => open + last.distance_to(first),
            _ => open,
        }
    }

    /// Whether the line is shorter than `limit` scaled units.
    pub fn shorter_than(&self, limit: Coord) -> bool {
        self.length() < limit as CoordF
    }

    /// Smallest junction width.
    pub fn min_width(&self) -> Coord {
        self.junctions.iter().map(|j| j.width).min().unwrap_or(0)
    }

    /// Largest junction width.
    pub fn max_width(&self) -> Coord {
        self.junctions.iter().map(|j| j.width).max().unwrap_or(0)
    }

    /// Length-weighted average width.
    pub fn average_width(&self) -> CoordF {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (a, b) in self.segments() {
            let len = a.distance_to(b);
            weighted += len * (a.width + b.width) as CoordF / 2.0;
            total += len;
        }
        if total > 0.0 {
            weighted / total
        } else {
            self.junctions.first().map_or(0.0, |j| j.width as CoordF)
        }
    }

    /// Whether this is the outer wall.
    pub fn is_external(&self) -> bool {
        self.inset_idx == 0
    }

    /// Whether every junction has zero width: an inner contour marker, not a
    /// printable bead.
    pub fn is_marker(&self) -> bool {
        self.junctions.iter().all(|j| j.width == 0)
    }

    /// Consecutive junction pairs, closing pair included for loops.
    pub fn segments(&self) -> impl Iterator<Item = (&ExtrusionJunction, &ExtrusionJunction)> {
        let n = self.junctions.len();
        let count = if self.is_closed && n > 2 { n } else { n.saturating_sub(1) };
        (0..count).map(move |i| (&self.junctions[i], &self.junctions[(i + 1) % n]))
    }

    /// Centerline positions.
    pub fn points(&self) -> Vec<Point> {
        self.junctions.iter().map(|j| j.position).collect()
    }

    /// Centerline as a polygon (widths dropped).
    pub fn to_polygon(&self) -> Polygon {
        Polygon::from_points(self.points())
    }

    /// Centerline as a polyline (widths dropped).
    pub fn to_polyline(&self) -> Polyline {
        Polyline::from_points(self.points())
    }

    /// Signed area of the loop. Positive for counter-clockwise.
    pub fn signed_area(&self) -> CoordF {
        if self.junctions.len() < 3 {
            return 0.0;
        }
        self.to_polygon().signed_area()
    }

    /// Remove junctions that change neither the path nor the extruded area by
    /// more than the given tolerances.
    ///
    /// A junction is dropped when it is colinear with its neighbours, or when
    /// an adjacent segment is shorter than `max_resolution`, its deviation
    /// from the shortcut is below `max_deviation` and the extrusion area lost
    /// by interpolating its width is below `max_area_deviation`.
    ///
    /// Runs until nothing else can be removed, so a simplified line is a
    /// fixed point.
    pub fn simplify(&mut self, max_resolution: Coord, max_deviation: Coord, max_area_deviation: Coord) {
        let closed = self.is_closed;
        let min_len = if closed { 3 } else { 2 };
        self.junctions.dedup_by(|b, a| a.position == b.position && a.width == b.width);
        if closed {
            while self.junctions.len() > 1
                && self.junctions.first().map(|j| (j.position, j.width))
                    == self.junctions.last().map(|j| (j.position, j.width))
            {
                self.junctions.pop();
            }
        }
        if self.junctions.len() <= min_len {
            return;
        }

        loop {
            let current = &self.junctions;
            let n = current.len();
            let mut kept: Vec<ExtrusionJunction> = Vec::with_capacity(n);
            kept.push(current[0]);
            let last_candidate = if closed { n } else { n - 1 };
            for i in 1..last_candidate {
                let curr = current[i];
                let next = if i + 1 < n { current[i + 1] } else { kept[0] };
                let remaining = last_candidate - i - 1;
                let Some(&prev) = kept.last() else {
                    kept.push(curr);
                    continue;
                };
                if kept.len() + remaining + usize::from(!closed) < min_len {
                    kept.push(curr);
                    continue;
                }
                if Self::removable(&prev, &curr, &next, max_resolution, max_deviation, max_area_deviation) {
                    continue;
                }
                kept.push(curr);
            }
            if !closed {
                kept.push(current[n - 1]);
            }
            let changed = kept.len() != n;
            self.junctions = kept;
            if !changed || self.junctions.len() <= min_len {
                break;
            }
        }
        if let Some(idx) = self.start_idx {
            if idx >= self.junctions.len() {
                self.start_idx = None;
            }
        }
    }

    fn removable(
        prev: &ExtrusionJunction,
        curr: &ExtrusionJunction,
        next: &ExtrusionJunction,
        max_resolution: Coord,
        max_deviation: Coord,
        max_area_deviation: Coord,
    ) -> bool {
        let (a, p, b) = (prev.position, curr.position, next.position);
        let ab = (b - a).to_f64();
        let len2 = ab.length_squared();
        let t = if len2 > 0.0 {
            ((p - a).to_f64().dot(&ab) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let deviation = (p.distance_to_segment_squared(a, b) as CoordF).sqrt();
        let interpolated_width = prev.width as CoordF + t * (next.width - prev.width) as CoordF;
        let width_error = (curr.width as CoordF - interpolated_width).abs();
        let span = a.distance(&p) + p.distance(&b);
        let area_error = width_error * span / 2.0;

        if deviation <= COLLINEARITY_THRESHOLD as CoordF && width_error <= 1.0 {
            return true;
        }
        let short = a.distance(&p) < max_resolution as CoordF || p.distance(&b) < max_resolution as CoordF;
        short && deviation < max_deviation as CoordF && area_error < max_area_deviation as CoordF
    }
}

impl std::ops::Index<usize> for ExtrusionLine {
    type Output = ExtrusionJunction;

    fn index(&self, index: usize) -> &Self::Output {
        &self.junctions[index]
    }
}

impl<'a> IntoIterator for &'a ExtrusionLine {
    type Item = &'a ExtrusionJunction;
    type IntoIter = std::slice::Iter<'a, ExtrusionJunction>;

    fn into_iter(self) -> Self::IntoIter {
        self.junctions.iter()
    }
}

/// All lines of one inset.
pub type VariableWidthLines = Vec<ExtrusionLine>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale;

    fn junction(x: Coord, y: Coord, w: Coord) -> ExtrusionJunction {
        ExtrusionJunction::new(Point::new(x, y), w, 0)
    }

    fn square_line(size: Coord, width: Coord) -> ExtrusionLine {
        let poly = Polygon::rectangle(Point::new(0, 0), Point::new(size, size));
        ExtrusionLine::from_polygon(&poly, width, 0)
    }

    #[test]
    fn test_closed_length_includes_closing_segment() {
        let line = square_line(scale(10.0), 400);
        assert!((line.length() - scale(40.0) as CoordF).abs() < 1e-6);

        let mut open = line.clone();
        open.is_closed = false;
        assert!((open.length() - scale(30.0) as CoordF).abs() < 1e-6);
    }

    #[test]
    fn test_widths() {
        let line = ExtrusionLine::from_junctions(
            vec![junction(0, 0, 300), junction(1000, 0, 500)],
            1,
            true,
            false,
        );
        assert_eq!(line.min_width(), 300);
        assert_eq!(line.max_width(), 500);
        assert!((line.average_width() - 400.0).abs() < 1e-9);
        assert!(!line.is_marker());
        assert!(!line.is_external());
    }

    #[test]
    fn test_marker_line() {
        let line = square_line(1000, 0);
        assert!(line.is_marker());
        assert!(line.signed_area() > 0.0);
    }

    #[test]
    fn test_simplify_removes_colinear() {
        let mut line = ExtrusionLine::from_junctions(
            (0..=10).map(|i| junction(i * 1000, 0, 400)).collect(),
            0,
            false,
            false,
        );
        line.simplify(500, 25, 50_000);
        assert_eq!(line.len(), 2);
        assert_eq!(line.first().map(|j| j.position), Some(Point::new(0, 0)));
        assert_eq!(line.last().map(|j| j.position), Some(Point::new(10_000, 0)));
    }

    #[test]
    fn test_simplify_keeps_width_changes() {
        let mut line = ExtrusionLine::from_junctions(
            vec![junction(0, 0, 400), junction(5000, 0, 800), junction(10_000, 0, 400)],
            0,
            false,
            false,
        );
        line.simplify(500, 25, 50_000);
        assert_eq!(line.len(), 3);
    }

    #[test]
    fn test_simplify_is_fixed_point() {
        let mut line = ExtrusionLine::from_junctions(
            (0..40)
                .map(|i| {
                    let a = i as CoordF / 40.0 * std::f64::consts::TAU;
                    junction((5000.0 * a.cos()) as Coord, (5000.0 * a.sin()) as Coord, 400 + (i % 3) * 5)
                })
                .collect(),
            0,
            false,
            true,
        );
        line.simplify(1000, 50, 50_000);
        let once = line.clone();
        line.simplify(1000, 50, 50_000);
        assert_eq!(line, once);
        assert!(line.len() >= 3);
    }

    #[test]
    fn test_reverse_keeps_start_vertex() {
        let mut line = square_line(1000, 400);
        line.start_idx = Some(1);
        let start = line[1].position;
        line.reverse();
        assert_eq!(line.start_idx.map(|i| line[i].position), Some(start));
    }
}
