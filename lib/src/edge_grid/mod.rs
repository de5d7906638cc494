//! EdgeGrid - Spatial acceleration structure for polygon edge queries.
//!
//! A uniform grid over the bounding box of a set of contours, where every
//! cell stores the edges passing through it. The grid answers the queries the
//! wall generator and the travel planner issue in tight loops:
//!
//! - does a segment cross any edge, and where
//! - which boundary point is closest to a query point
//! - is a point inside the (even-odd) region bounded by the closed contours
//!
//! # Example
//!
//! ```
//! use slicecore::edge_grid::EdgeGrid;
//! use slicecore::geometry::{Point, Polygon};
//!
//! let square = Polygon::rectangle(Point::new(0, 0), Point::new(10_000, 10_000));
//! let grid = EdgeGrid::from_polygons(&[square], 1_000);
//!
//! assert!(grid.line_intersects_any(&Point::new(-500, 5_000), &Point::new(5_000, 5_000)));
//! assert!(grid.point_inside(&Point::new(5_000, 5_000)));
//! ```

use crate::geometry::{BoundingBox, Line, Point, PointF, Polygon, Polyline};
use crate::{Coord, CoordF};

/// A sequence of points forming either an open polyline or a closed polygon.
#[derive(Clone, Debug)]
pub struct Contour {
    points: Vec<Point>,
    open: bool,
}

impl Contour {
    /// Closed contour from a polygon.
    pub fn from_polygon(polygon: &Polygon) -> Self {
        Self {
            points: polygon.points().to_vec(),
            open: false,
        }
    }

    /// Open contour from a polyline.
    pub fn from_polyline(polyline: &Polyline) -> Self {
        Self {
            points: polyline.points().to_vec(),
            open: true,
        }
    }

    /// Whether this contour is an open polyline.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The contour points.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of segments, including the closing one for closed contours.
    pub fn num_segments(&self) -> usize {
        match self.points.len() {
            0 | 1 => 0,
            n if self.open => n - 1,
            n => n,
        }
    }

    /// Segment starting at point `idx`.
    pub fn segment(&self, idx: usize) -> Line {
        let next = if idx + 1 >= self.points.len() { 0 } else { idx + 1 };
        Line::new(self.points[idx], self.points[next])
    }
}

/// Result of a closest point query.
#[derive(Clone, Copy, Debug)]
pub struct ClosestPointResult {
    /// Index of the contour.
    pub contour_idx: usize,
    /// Index of the segment start point.
    pub start_point_idx: usize,
    /// Distance from the query to the closest point.
    pub distance: CoordF,
    /// Parameter on the segment in `[0, 1]`.
    pub t: CoordF,
    /// The closest point, unrounded.
    pub foot: PointF,
    /// The closest point rounded to the integer grid.
    pub point: Point,
}

/// A crossing between a query segment and a grid edge.
#[derive(Clone, Copy, Debug)]
pub struct Intersection {
    /// Index of the contour.
    pub contour_idx: usize,
    /// Index of the segment within the contour.
    pub segment_idx: usize,
    /// The crossing point.
    pub point: Point,
    /// Parameter along the query segment in `[0, 1]`.
    pub distance: CoordF,
}

/// Uniform grid of contour edges.
#[derive(Clone, Debug, Default)]
pub struct EdgeGrid {
    bbox: BoundingBox,
    resolution: Coord,
    rows: usize,
    cols: usize,
    contours: Vec<Contour>,
    /// `(contour_idx, segment_idx)` pairs, grouped per cell.
    cell_data: Vec<(usize, usize)>,
    /// Start offset of every cell in `cell_data`, plus a final sentinel.
    cell_offsets: Vec<usize>,
}

impl EdgeGrid {
    /// Grid over closed polygons with cells of `resolution` units.
    pub fn from_polygons(polygons: &[Polygon], resolution: Coord) -> Self {
        Self::from_contours(polygons.iter().map(Contour::from_polygon).collect(), resolution)
    }

    /// Grid over open polylines.
    pub fn from_polylines(polylines: &[Polyline], resolution: Coord) -> Self {
        Self::from_contours(polylines.iter().map(Contour::from_polyline).collect(), resolution)
    }

    fn from_contours(contours: Vec<Contour>, resolution: Coord) -> Self {
        let mut grid = Self {
            resolution: resolution.max(1),
            contours,
            ..Self::default()
        };
        for contour in &grid.contours {
            for p in contour.points() {
                grid.bbox.merge_point(*p);
            }
        }
        if grid.bbox.is_empty() {
            return grid;
        }
        grid.bbox.expand(grid.resolution);
        grid.cols = (grid.bbox.width() / grid.resolution + 1).max(1) as usize;
        grid.rows = (grid.bbox.height() / grid.resolution + 1).max(1) as usize;

        let mut entries: Vec<(usize, usize, usize)> = Vec::new();
        for (contour_idx, contour) in grid.contours.iter().enumerate() {
            for seg_idx in 0..contour.num_segments() {
                let seg = contour.segment(seg_idx);
                grid.visit_cells(&seg.a, &seg.b, |row, col| {
                    entries.push((row * grid.cols + col, contour_idx, seg_idx));
                    true
                });
            }
        }
        entries.sort_unstable();

        let num_cells = grid.rows * grid.cols;
        grid.cell_offsets = vec![0; num_cells + 1];
        for &(cell, _, _) in &entries {
            grid.cell_offsets[cell + 1] += 1;
        }
        for i in 0..num_cells {
            grid.cell_offsets[i + 1] += grid.cell_offsets[i];
        }
        grid.cell_data = entries.into_iter().map(|(_, c, s)| (c, s)).collect();
        grid
    }

    /// Bounding box of the grid, including its one-cell margin.
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Cell size in scaled units.
    pub fn resolution(&self) -> Coord {
        self.resolution
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The indexed contours.
    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    /// Whether the grid holds no edges.
    pub fn is_empty(&self) -> bool {
        self.cell_data.is_empty()
    }

    fn cell_coord(&self, v: Coord, min: Coord, count: usize) -> i64 {
        ((v - min).div_euclid(self.resolution)).clamp(0, count as i64 - 1)
    }

    /// Visit every cell the segment passes through, column by column.
    /// The visitor returns `false` to stop early.
    fn visit_cells<F>(&self, p1: &Point, p2: &Point, mut visitor: F)
    where
        F: FnMut(usize, usize) -> bool,
    {
        if self.rows == 0 || self.cols == 0 {
            return;
        }
        let (a, b) = if p1.x <= p2.x { (*p1, *p2) } else { (*p2, *p1) };
        let col_a = self.cell_coord(a.x, self.bbox.min.x, self.cols);
        let col_b = self.cell_coord(b.x, self.bbox.min.x, self.cols);
        for col in col_a..=col_b {
            // y extent of the segment within this column
            let x_lo = (self.bbox.min.x + col * self.resolution).max(a.x);
            let x_hi = (self.bbox.min.x + (col + 1) * self.resolution).min(b.x);
            let y_at = |x: Coord| -> Coord {
                if b.x == a.x {
                    a.y
                } else {
                    a.y + ((b.y - a.y) as i128 * (x - a.x) as i128 / (b.x - a.x) as i128) as Coord
                }
            };
            let (mut y_lo, mut y_hi) = if b.x == a.x {
                (a.y.min(b.y), a.y.max(b.y))
            } else {
                let (y0, y1) = (y_at(x_lo), y_at(x_hi));
                (y0.min(y1), y0.max(y1))
            };
            y_lo -= 1;
            y_hi += 1;
            let row_lo = self.cell_coord(y_lo, self.bbox.min.y, self.rows);
            let row_hi = self.cell_coord(y_hi, self.bbox.min.y, self.rows);
            for row in row_lo..=row_hi {
                if !visitor(row as usize, col as usize) {
                    return;
                }
            }
        }
    }

    fn cell_edges(&self, row: usize, col: usize) -> &[(usize, usize)] {
        if row >= self.rows || col >= self.cols {
            return &[];
        }
        let idx = row * self.cols + col;
        &self.cell_data[self.cell_offsets[idx]..self.cell_offsets[idx + 1]]
    }

    /// Whether the segment `p1`-`p2` touches or crosses any edge.
    pub fn line_intersects_any(&self, p1: &Point, p2: &Point) -> bool {
        let line = Line::new(*p1, *p2);
        let mut found = false;
        self.visit_cells(p1, p2, |row, col| {
            found = self
                .cell_edges(row, col)
                .iter()
                .any(|&(c, s)| line.intersects(&self.contours[c].segment(s)));
            !found
        });
        found
    }

    /// All crossings of the segment `p1`-`p2`, sorted along the segment.
    pub fn find_intersections(&self, p1: &Point, p2: &Point) -> Vec<Intersection> {
        let line = Line::new(*p1, *p2);
        let mut seen = std::collections::HashSet::new();
        let mut result = Vec::new();
        self.visit_cells(p1, p2, |row, col| {
            for &(contour_idx, segment_idx) in self.cell_edges(row, col) {
                if !seen.insert((contour_idx, segment_idx)) {
                    continue;
                }
                let edge = self.contours[contour_idx].segment(segment_idx);
                if let Some(t) = line.intersection_param(&edge) {
                    result.push(Intersection {
                        contour_idx,
                        segment_idx,
                        point: line.point_at(t),
                        distance: t,
                    });
                }
            }
            true
        });
        result.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then((a.contour_idx, a.segment_idx).cmp(&(b.contour_idx, b.segment_idx)))
        });
        result
    }

    /// Closest boundary point to `query` within `search_radius`.
    pub fn closest_point(&self, query: &Point, search_radius: Coord) -> Option<ClosestPointResult> {
        self.closest_point_f(query.to_f64(), search_radius as CoordF)
    }

    /// Closest boundary point to a floating point query within `search_radius`.
    ///
    /// Cells are searched in rings of growing radius around the query cell,
    /// stopping once no unvisited ring can hold a closer edge. Ties are broken
    /// by contour and segment index so the result is deterministic.
    pub fn closest_point_f(&self, query: PointF, search_radius: CoordF) -> Option<ClosestPointResult> {
        if self.rows == 0 || self.cols == 0 {
            return None;
        }
        let res = self.resolution as CoordF;
        let fc = ((query.x - self.bbox.min.x as CoordF) / res).floor() as i64;
        let fr = ((query.y - self.bbox.min.y as CoordF) / res).floor() as i64;
        let grid_span = (self.rows + self.cols) as i64 + fr.abs() + fc.abs();
        let max_ring = ((search_radius / res).ceil() as i64 + 1).min(grid_span);
        let mut best: Option<ClosestPointResult> = None;

        let mut ring = 0i64;
        loop {
            for (r, c) in ring_cells(fr, fc, ring) {
                if r < 0 || c < 0 || r >= self.rows as i64 || c >= self.cols as i64 {
                    continue;
                }
                for &(contour_idx, seg_idx) in self.cell_edges(r as usize, c as usize) {
                    let seg = self.contours[contour_idx].segment(seg_idx);
                    let (foot, t) = closest_on_segment(query, &seg);
                    let d = query.distance(&foot);
                    if d > search_radius {
                        continue;
                    }
                    let better = match &best {
                        None => true,
                        Some(b) => {
                            d < b.distance
                                || (d == b.distance
                                    && (contour_idx, seg_idx) < (b.contour_idx, b.start_point_idx))
                        }
                    };
                    if better {
                        best = Some(ClosestPointResult {
                            contour_idx,
                            start_point_idx: seg_idx,
                            distance: d,
                            t,
                            foot,
                            point: foot.to_point(),
                        });
                    }
                }
            }
            // Any edge in ring k+1 is at least k cells away from the query.
            if let Some(b) = &best {
                if b.distance <= ring as CoordF * res {
                    break;
                }
            }
            ring += 1;
            if ring > max_ring {
                break;
            }
        }
        best
    }

    /// Even-odd inside test against the closed contours.
    pub fn point_inside(&self, point: &Point) -> bool {
        self.point_inside_f(point.to_f64())
    }

    /// Even-odd inside test for a floating point query.
    ///
    /// Casts a ray towards +x through the query row.
    pub fn point_inside_f(&self, p: PointF) -> bool {
        if self.rows == 0 || self.cols == 0 {
            return false;
        }
        let res = self.resolution as CoordF;
        let row = ((p.y - self.bbox.min.y as CoordF) / res).floor() as i64;
        if row < 0 || row >= self.rows as i64 {
            return false;
        }
        let col0 = (((p.x - self.bbox.min.x as CoordF) / res).floor() as i64).max(0);
        let mut seen = std::collections::HashSet::new();
        let mut crossings = 0usize;
        for col in col0..self.cols as i64 {
            for &(contour_idx, seg_idx) in self.cell_edges(row as usize, col as usize) {
                let contour = &self.contours[contour_idx];
                if contour.is_open() || !seen.insert((contour_idx, seg_idx)) {
                    continue;
                }
                let seg = contour.segment(seg_idx);
                let (a, b) = (seg.a.to_f64(), seg.b.to_f64());
                if (a.y > p.y) != (b.y > p.y) {
                    let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
                    if p.x < x {
                        crossings += 1;
                    }
                }
            }
        }
        crossings % 2 == 1
    }

    /// Closed-contour segments stored in the cell row holding height `y`, each
    /// listed once. Every segment crossing that height is among them.
    pub fn closed_segments_near_row(&self, y: CoordF) -> Vec<Line> {
        if self.rows == 0 || self.cols == 0 {
            return Vec::new();
        }
        let row = ((y - self.bbox.min.y as CoordF) / self.resolution as CoordF).floor() as i64;
        if row < 0 || row >= self.rows as i64 {
            return Vec::new();
        }
        let mut ids: Vec<(usize, usize)> = (0..self.cols)
            .flat_map(|col| self.cell_edges(row as usize, col).iter().copied())
            .filter(|&(contour_idx, _)| !self.contours[contour_idx].is_open())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .map(|(contour_idx, seg_idx)| self.contours[contour_idx].segment(seg_idx))
            .collect()
    }

    /// Distance to the boundary, positive inside and negative outside.
    pub fn signed_distance(&self, p: PointF, search_radius: CoordF) -> Option<(CoordF, ClosestPointResult)> {
        let closest = self.closest_point_f(p, search_radius)?;
        let sign = if self.point_inside_f(p) { 1.0 } else { -1.0 };
        Some((sign * closest.distance, closest))
    }
}

/// Cells on the square ring at Chebyshev distance `ring` around `(r, c)`.
fn ring_cells(r: i64, c: i64, ring: i64) -> Vec<(i64, i64)> {
    if ring == 0 {
        return vec![(r, c)];
    }
    let mut cells = Vec::with_capacity(8 * ring as usize);
    for dc in -ring..=ring {
        cells.push((r - ring, c + dc));
        cells.push((r + ring, c + dc));
    }
    for dr in (-ring + 1)..ring {
        cells.push((r + dr, c - ring));
        cells.push((r + dr, c + ring));
    }
    cells
}

/// Closest point on a segment to `query`, with its parameter.
pub(crate) fn closest_on_segment(query: PointF, seg: &Line) -> (PointF, CoordF) {
    let a = seg.a.to_f64();
    let d = seg.b.to_f64() - a;
    let len2 = d.length_squared();
    if len2 < 1e-12 {
        return (a, 0.0);
    }
    let t = ((query - a).dot(&d) / len2).clamp(0.0, 1.0);
    (a + d * t, t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: Coord) -> Polygon {
        Polygon::rectangle(Point::new(0, 0), Point::new(size, size))
    }

    #[test]
    fn test_contour_segments() {
        let contour = Contour::from_polygon(&square(1_000));
        assert!(!contour.is_open());
        assert_eq!(contour.num_segments(), 4);
        assert_eq!(contour.segment(3), Line::new(Point::new(0, 1_000), Point::new(0, 0)));

        let open = Contour::from_polyline(&Polyline::from_points(vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 100),
        ]));
        assert!(open.is_open());
        assert_eq!(open.num_segments(), 2);
    }

    #[test]
    fn test_line_intersects_any() {
        let grid = EdgeGrid::from_polygons(&[square(1_000_000)], 100_000);
        assert!(grid.line_intersects_any(&Point::new(-500_000, 500_000), &Point::new(500_000, 500_000)));
        assert!(!grid.line_intersects_any(&Point::new(-500_000, -500_000), &Point::new(-100_000, -100_000)));
        // Long diagonal fully inside
        assert!(!grid.line_intersects_any(&Point::new(10_000, 20_000), &Point::new(990_000, 970_000)));
    }

    #[test]
    fn test_find_intersections_sorted() {
        let grid = EdgeGrid::from_polygons(&[square(1_000_000)], 100_000);
        let hits = grid.find_intersections(&Point::new(1_500_000, 500_000), &Point::new(-500_000, 500_000));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].point, Point::new(1_000_000, 500_000));
        assert_eq!(hits[1].point, Point::new(0, 500_000));
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn test_closest_point() {
        let grid = EdgeGrid::from_polygons(&[square(1_000_000)], 100_000);
        let result = grid.closest_point(&Point::new(500_000, -100_000), 200_000).unwrap();
        assert_eq!(result.point, Point::new(500_000, 0));
        assert!((result.distance - 100_000.0).abs() < 1e-6);

        // Deep inside, the nearest edge is several rings away.
        let result = grid.closest_point(&Point::new(400_000, 500_000), 1_000_000).unwrap();
        assert!((result.distance - 400_000.0).abs() < 1e-6);
        assert_eq!(result.point.x, 0);

        assert!(grid.closest_point(&Point::new(500_000, 500_000), 1_000).is_none());
    }

    #[test]
    fn test_point_inside_with_hole() {
        let mut hole = Polygon::rectangle(Point::new(250, 250), Point::new(750, 750));
        hole.make_clockwise();
        let grid = EdgeGrid::from_polygons(&[square(1_000), hole], 100);
        assert!(grid.point_inside(&Point::new(100, 500)));
        assert!(!grid.point_inside(&Point::new(500, 500)));
        assert!(!grid.point_inside(&Point::new(-100, 500)));
    }

    #[test]
    fn test_signed_distance() {
        let grid = EdgeGrid::from_polygons(&[square(1_000)], 100);
        let (d, _) = grid.signed_distance(PointF::new(500.0, 200.0), 10_000.0).unwrap();
        assert!((d - 200.0).abs() < 1e-9);
        let (d, _) = grid.signed_distance(PointF::new(500.0, -50.0), 10_000.0).unwrap();
        assert!((d + 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_grid() {
        let grid = EdgeGrid::from_polygons(&[], 1_000);
        assert!(grid.is_empty());
        assert!(!grid.line_intersects_any(&Point::new(0, 0), &Point::new(1, 1)));
        assert!(grid.find_intersections(&Point::new(0, 0), &Point::new(1, 1)).is_empty());
        assert!(grid.closest_point(&Point::new(0, 0), 1_000).is_none());
    }

    #[test]
    fn test_multiple_polygons() {
        let a = square(100_000);
        let mut b = square(100_000);
        b.translate(Point::new(200_000, 0));
        let grid = EdgeGrid::from_polygons(&[a, b], 10_000);
        let hits = grid.find_intersections(&Point::new(-50_000, 50_000), &Point::new(350_000, 50_000));
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn test_row_segments_hold_every_crossing() {
        let circle = Polygon::circle(Point::new(50_000, 50_000), 40_000, 90);
        let grid = EdgeGrid::from_polygons(&[circle.clone()], 3_000);
        let crosses = |l: &Line, y: CoordF| (l.a.y as CoordF > y) != (l.b.y as CoordF > y);
        for y in [-5_000.0, 10_000.5, 31_234.0, 50_000.0, 89_999.0, 120_000.0] {
            let expected = circle.edges().iter().filter(|l| crosses(l, y)).count();
            let near = grid.closed_segments_near_row(y);
            assert_eq!(near.iter().filter(|l| crosses(l, y)).count(), expected, "y = {y}");
            assert!(near.len() < circle.len());
        }
        let open = EdgeGrid::from_polylines(&[Polyline::from_points(vec![Point::new(0, 0), Point::new(0, 10_000)])], 1_000);
        assert!(open.closed_segments_near_row(5_000.0).is_empty());
    }
}
