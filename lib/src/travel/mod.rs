//! Combing: travel routing that stays inside printed material.
//!
//! A travel move that crosses a wall leaves a visible mark, and a travel over
//! air oozes. [`Comb`] routes travel moves through the inside of the layer's
//! parts instead: a straight move between two points of the same part is
//! replaced by a detour along the part boundary whenever the straight line
//! would leave the part (concave outlines, holes).
//!
//! # Algorithm
//!
//! 1. Build two inside boundaries per layer: the preferred one (further from
//!    the outer wall) and the minimum one (as close to the walls as a travel
//!    may get). Both are grouped into parts.
//! 2. Move the travel end points into the preferred boundary and find the
//!    parts they belong to.
//! 3. Same part: find where the straight line crosses the part boundary and
//!    walk around the crossed contour in the shorter direction, offset
//!    slightly into the material. If the route still leaves the part, retry
//!    on the minimum boundary; if that fails too, combing fails.
//! 4. Different parts (or one end outside): comb to the point where the
//!    straight line leaves the start part, travel through air (walking
//!    around other parts when avoiding them) and comb from the entry point of
//!    the end part.
//! 5. Every route is simplified greedily: a waypoint is dropped when the
//!    shortcut does not cross the boundary.
//!
//! The result is a [`CombPaths`]: in-part sections and air sections, with
//! flags the layer planner uses to decide on retraction.

use crate::clipper::{self, OffsetJoinType};
use crate::config::CombingSettings;
use crate::edge_grid::{EdgeGrid, Intersection};
use crate::geometry::{group_by_nesting, BoundingBox, ExPolygon, Point, Polygon};
use crate::Coord;

/// Configuration for combing.
#[derive(Clone, Debug, PartialEq)]
pub struct CombConfig {
    /// Distance the travel end points are moved into the boundary.
    pub move_inside_distance: Coord,
    /// Points further than this outside the boundary are not considered inside.
    pub max_move_inside_distance: Coord,
    /// Clearance kept between the route and the boundary it walks along.
    pub boundary_clearance: Coord,
    /// Whether air travel walks around other parts.
    pub avoid_other_parts: bool,
    /// Clearance kept from other parts when avoiding them.
    pub avoid_distance: Coord,
    /// Cell size of the edge grids.
    pub grid_resolution: Coord,
}

impl Default for CombConfig {
    fn default() -> Self {
        Self {
            move_inside_distance: 400,
            max_move_inside_distance: 1_600,
            boundary_clearance: 20,
            avoid_other_parts: true,
            avoid_distance: 625,
            grid_resolution: 2_000,
        }
    }
}

impl CombConfig {
    /// Create a new comb config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for a layer whose innermost walls are `inner_wall_width` wide.
    pub fn from_settings(settings: &CombingSettings, inner_wall_width: Coord) -> Self {
        Self {
            move_inside_distance: inner_wall_width,
            max_move_inside_distance: inner_wall_width * 4,
            avoid_other_parts: settings.avoid_other_parts,
            avoid_distance: settings.avoid_distance,
            ..Self::default()
        }
    }

    /// Set the distance end points are moved inside.
    pub fn with_move_inside_distance(mut self, distance: Coord) -> Self {
        self.move_inside_distance = distance;
        self
    }

    /// Enable or disable routing around other parts.
    pub fn with_avoid_other_parts(mut self, avoid: bool) -> Self {
        self.avoid_other_parts = avoid;
        self
    }

    /// Set the grid resolution.
    pub fn with_grid_resolution(mut self, resolution: Coord) -> Self {
        self.grid_resolution = resolution;
        self
    }
}

/// One section of a combed travel.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CombPath {
    /// Waypoints of the section.
    pub points: Vec<Point>,
    /// Whether the section crosses a boundary it could not avoid.
    pub cross_boundary: bool,
}

impl CombPath {
    fn new(points: Vec<Point>) -> Self {
        Self {
            points,
            cross_boundary: false,
        }
    }

    /// Number of waypoints.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the section has no waypoints.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// A combed travel: in-part and air sections in travel order.
///
/// An empty `CombPaths` means the straight move is fine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CombPaths {
    /// Sections in travel order.
    pub paths: Vec<CombPath>,
    /// Whether part of the travel leaves the comb boundary.
    pub through_air: bool,
}

impl CombPaths {
    /// Number of sections.
    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether there are no sections.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterate over the sections.
    pub fn iter(&self) -> std::slice::Iter<'_, CombPath> {
        self.paths.iter()
    }

    /// Whether any section crosses a boundary.
    pub fn crosses_boundary(&self) -> bool {
        self.paths.iter().any(|p| p.cross_boundary)
    }

    /// Length of the travel from `start` through every waypoint to `end`.
    pub fn travel_length(&self, start: Point, end: Point) -> f64 {
        let mut length = 0.0;
        let mut last = start;
        for p in self.paths.iter().flat_map(|path| path.points.iter()) {
            length += last.distance(p);
            last = *p;
        }
        length + last.distance(&end)
    }
}

/// Which side of a boundary a route keeps to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Material,
    Air,
}

/// Direction for walking around a boundary polygon.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Boundary polygons grouped into parts, with an edge grid for queries.
#[derive(Clone, Debug, Default)]
struct Boundary {
    /// The parts.
    parts: Vec<ExPolygon>,
    /// Every contour and hole of every part, flattened.
    polygons: Vec<Polygon>,
    /// Part index of every flattened polygon.
    polygon_part: Vec<usize>,
    /// Whether a flattened polygon is a hole.
    polygon_is_hole: Vec<bool>,
    /// Bounding box of all boundaries.
    bbox: BoundingBox,
    /// Cumulative distance along each polygon at every vertex.
    polygon_params: Vec<Vec<f64>>,
    /// Edge grid for fast intersection testing.
    grid: EdgeGrid,
}

impl Boundary {
    fn new(parts: Vec<ExPolygon>, resolution: Coord) -> Self {
        let mut boundary = Self {
            parts,
            ..Self::default()
        };
        for (part_idx, part) in boundary.parts.iter().enumerate() {
            for (i, poly) in part.to_polygons().into_iter().enumerate() {
                boundary.polygons.push(poly);
                boundary.polygon_part.push(part_idx);
                boundary.polygon_is_hole.push(i > 0);
            }
        }

        for poly in &boundary.polygons {
            for point in poly.points() {
                boundary.bbox.merge_point(*point);
            }
        }

        for poly in &boundary.polygons {
            let points = poly.points();
            let mut params = Vec::with_capacity(points.len() + 1);
            let mut cumulative = 0.0;
            params.push(cumulative);
            for i in 0..points.len() {
                let next = points[(i + 1) % points.len()];
                cumulative += points[i].distance(&next);
                params.push(cumulative);
            }
            boundary.polygon_params.push(params);
        }

        boundary.grid = EdgeGrid::from_polygons(&boundary.polygons, resolution.max(1));
        boundary
    }

    fn from_polygons(polygons: &[Polygon], resolution: Coord) -> Self {
        Self::new(group_by_nesting(polygons), resolution)
    }

    fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Total perimeter length of a polygon.
    fn polygon_length(&self, poly_idx: usize) -> f64 {
        self.polygon_params
            .get(poly_idx)
            .and_then(|params| params.last().copied())
            .unwrap_or(0.0)
    }

    /// Distance along a polygon from its first vertex to a segment start.
    fn distance_to_segment(&self, poly_idx: usize, seg_idx: usize) -> f64 {
        self.polygon_params
            .get(poly_idx)
            .and_then(|params| params.get(seg_idx).copied())
            .unwrap_or(0.0)
    }

    /// Index of the part containing `p`.
    fn part_containing(&self, p: &Point) -> Option<usize> {
        if !self.bbox.contains_point(p) {
            return None;
        }
        self.parts.iter().position(|part| part.contains_point(p))
    }

    /// Crossings of `a`-`b` with the polygons accepted by `filter`.
    fn crossings(&self, a: &Point, b: &Point, filter: impl Fn(usize) -> bool) -> Vec<Intersection> {
        self.grid
            .find_intersections(a, b)
            .into_iter()
            .filter(|i| filter(i.contour_idx))
            .collect()
    }

    /// Move `p` at least `distance` into the boundary.
    ///
    /// Points outside by more than `max_distance` stay outside and yield `None`.
    fn move_inside(&self, p: Point, distance: Coord, max_distance: Coord) -> Option<Point> {
        if let Some(part_idx) = self.part_containing(&p) {
            let Some(closest) = self.grid.closest_point(&p, distance) else {
                return Some(p);
            };
            let away = p.to_f64() - closest.foot;
            let len = away.length();
            if len < 1.0 {
                return Some(p);
            }
            let moved = (closest.foot + away * (distance as f64 / len)).to_point();
            let inside = self.parts[part_idx].contains_point(&moved);
            return Some(if inside { moved } else { p });
        }
        let closest = self.grid.closest_point(&p, max_distance)?;
        let moved = self.offset_from_edge(
            closest.contour_idx,
            closest.start_point_idx,
            closest.point,
            distance,
            Side::Material,
        );
        self.part_containing(&moved).map(|_| moved)
    }

    /// `point` on edge `seg_idx` of a polygon, pushed `offset` to the given side.
    fn offset_from_edge(&self, poly_idx: usize, seg_idx: usize, point: Point, offset: Coord, side: Side) -> Point {
        let Some(poly) = self.polygons.get(poly_idx) else {
            return point;
        };
        let points = poly.points();
        if points.len() < 2 {
            return point;
        }
        let p1 = points[seg_idx % points.len()];
        let p2 = points[(seg_idx + 1) % points.len()];
        let normal = (p2 - p1).turn_90_ccw().normal(offset);
        self.pick_side(poly_idx, point, normal, side)
    }

    /// Vertex of a polygon, pushed `offset` to the given side along the bisector.
    fn offset_vertex(&self, poly_idx: usize, vertex_idx: usize, offset: Coord, side: Side) -> Point {
        let points = self.polygons[poly_idx].points();
        let n = points.len();
        let curr = points[vertex_idx];
        if n < 3 {
            return curr;
        }
        let prev = points[(vertex_idx + n - 1) % n];
        let next = points[(vertex_idx + 1) % n];

        let n1 = (curr - prev).turn_90_ccw().to_f64().normalize();
        let n2 = (next - curr).turn_90_ccw().to_f64().normalize();
        let avg = n1 + n2;
        if avg.length() < 0.01 {
            return curr;
        }
        let normal = (avg.normalize() * offset as f64).to_point();
        self.pick_side(poly_idx, curr, normal, side)
    }

    /// `base + normal` or `base - normal`, whichever lies on `side` of the polygon's part.
    fn pick_side(&self, poly_idx: usize, base: Point, normal: Point, side: Side) -> Point {
        let part = &self.parts[self.polygon_part[poly_idx]];
        let want_inside = side == Side::Material;
        let left = base + normal;
        if part.contains_point(&left) == want_inside {
            return left;
        }
        let right = base - normal;
        if part.contains_point(&right) == want_inside {
            return right;
        }
        left
    }

    /// Shorter direction around a polygon between two segments.
    fn shortest_direction(&self, poly_idx: usize, seg1: usize, seg2: usize) -> Direction {
        let total_length = self.polygon_length(poly_idx);
        if total_length <= 0.0 {
            return Direction::Forward;
        }
        let dist1 = self.distance_to_segment(poly_idx, seg1);
        let dist2 = self.distance_to_segment(poly_idx, seg2);
        let forward_dist = if dist2 >= dist1 {
            dist2 - dist1
        } else {
            total_length - dist1 + dist2
        };
        if forward_dist <= total_length - forward_dist {
            Direction::Forward
        } else {
            Direction::Backward
        }
    }

    /// Route from `start` to `end` around every crossed polygon.
    ///
    /// `crossings` must be sorted along the segment. The route starts with
    /// `start` and ends with `end`.
    fn walk(&self, start: Point, end: Point, crossings: &[Intersection], clearance: Coord, side: Side) -> Vec<Point> {
        let mut result = vec![start];
        let mut first_idx = 0;

        while first_idx < crossings.len() {
            let first = &crossings[first_idx];
            let last_same = (first_idx + 1..crossings.len())
                .rev()
                .find(|&j| crossings[j].contour_idx == first.contour_idx);

            result.push(self.offset_from_edge(first.contour_idx, first.segment_idx, first.point, clearance, side));

            let Some(second_idx) = last_same else {
                first_idx += 1;
                continue;
            };
            let second = &crossings[second_idx];
            let poly_len = self.polygons[first.contour_idx].len();
            let mut seg_idx = first.segment_idx;
            let mut steps = 0;

            match self.shortest_direction(first.contour_idx, first.segment_idx, second.segment_idx) {
                Direction::Forward => {
                    while seg_idx != second.segment_idx && steps <= poly_len {
                        seg_idx = (seg_idx + 1) % poly_len;
                        result.push(self.offset_vertex(first.contour_idx, seg_idx, clearance, side));
                        steps += 1;
                    }
                }
                Direction::Backward => {
                    while seg_idx != second.segment_idx && steps <= poly_len {
                        result.push(self.offset_vertex(first.contour_idx, seg_idx, clearance, side));
                        seg_idx = if seg_idx == 0 { poly_len - 1 } else { seg_idx - 1 };
                        steps += 1;
                    }
                }
            }

            result.push(self.offset_from_edge(second.contour_idx, second.segment_idx, second.point, clearance, side));
            first_idx = second_idx + 1;
        }

        result.push(end);
        result
    }
}

/// Drop waypoints whose shortcut is not blocked.
fn simplify_route(path: &[Point], blocked: impl Fn(&Point, &Point) -> bool) -> Vec<Point> {
    if path.len() <= 2 {
        return path.to_vec();
    }
    let mut result = Vec::with_capacity(path.len());
    result.push(path[0]);
    let mut current_idx = 0;
    while current_idx < path.len() - 1 {
        let current = &path[current_idx];
        let mut best_next_idx = current_idx + 1;
        for try_idx in (current_idx + 2)..path.len() {
            if !blocked(current, &path[try_idx]) {
                best_next_idx = try_idx;
            }
        }
        result.push(path[best_next_idx]);
        current_idx = best_next_idx;
    }
    result
}

/// Travel router for one layer.
#[derive(Clone, Debug)]
pub struct Comb {
    config: CombConfig,
    /// Boundary as close to the walls as a travel may get.
    inside_minimum: Boundary,
    /// Boundary combing prefers, further away from the outer walls.
    inside_optimal: Boundary,
    /// Every minimum part grown by the avoid distance, for air travel.
    outside: Boundary,
    /// Minimum part every outside part grew from.
    outside_origin: Vec<usize>,
}

impl Comb {
    /// Router over the given boundaries.
    pub fn new(boundary_minimum: &[Polygon], boundary_preferred: &[Polygon], config: CombConfig) -> Self {
        let resolution = config.grid_resolution;
        let inside_minimum = Boundary::from_polygons(boundary_minimum, resolution);
        let inside_optimal = Boundary::from_polygons(boundary_preferred, resolution);

        let grow = config.avoid_distance + config.move_inside_distance;
        let mut outside_origin = Vec::new();
        let mut outside_parts = Vec::new();
        for (part_idx, part) in inside_minimum.parts.iter().enumerate() {
            for grown in clipper::offset(std::slice::from_ref(&part.contour), grow, OffsetJoinType::Round) {
                if grown.is_counter_clockwise() {
                    outside_origin.push(part_idx);
                    outside_parts.push(ExPolygon::new(grown));
                }
            }
        }
        let outside = Boundary::new(outside_parts, resolution);

        log::trace!(
            "comb boundaries: {} minimum parts, {} preferred parts",
            inside_minimum.parts.len(),
            inside_optimal.parts.len()
        );
        Self {
            config,
            inside_minimum,
            inside_optimal,
            outside,
            outside_origin,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &CombConfig {
        &self.config
    }

    /// Whether there is any boundary to comb through.
    pub fn is_empty(&self) -> bool {
        self.inside_optimal.is_empty() && self.inside_minimum.is_empty()
    }

    /// Whether `p` lies inside the preferred boundary.
    pub fn inside_preferred(&self, p: &Point) -> bool {
        self.inside_optimal.part_containing(p).is_some()
    }

    /// Push `p` `distance` into the preferred boundary.
    ///
    /// Points outside are first snapped to the closest edge within
    /// `max_distance`; `None` when no edge is that close.
    pub fn move_inside(&self, p: Point, distance: Coord, max_distance: Coord) -> Option<Point> {
        self.inside_optimal.move_inside(p, distance, max_distance)
    }

    /// Route a travel from `start` to `end`.
    ///
    /// `start_inside` and `end_inside` tell whether the nozzle is considered
    /// to be inside a part at either end. Travels shorter than
    /// `max_comb_distance_ignored` are not combed and yield empty paths.
    /// Returns `None` when a route between two points of the same part leaves
    /// that part on both boundaries; the caller then travels straight.
    pub fn calc(
        &self,
        start: Point,
        end: Point,
        start_inside: bool,
        end_inside: bool,
        max_comb_distance_ignored: Coord,
    ) -> Option<CombPaths> {
        if start.shorter_than(&end, max_comb_distance_ignored) {
            return Some(CombPaths::default());
        }

        if start_inside && end_inside {
            let mut same_part = false;
            for boundary in [&self.inside_optimal, &self.inside_minimum] {
                let (Some((s, a)), Some((e, b))) = (self.locate(boundary, start), self.locate(boundary, end)) else {
                    continue;
                };
                if a != b {
                    continue;
                }
                same_part = true;
                if let Some(waypoints) = self.comb_inside(boundary, a, s, e) {
                    let mut points = Vec::with_capacity(waypoints.len() + 2);
                    if s != start {
                        points.push(s);
                    }
                    points.extend(waypoints);
                    if e != end {
                        points.push(e);
                    }
                    return Some(CombPaths {
                        paths: vec![CombPath::new(points)],
                        through_air: false,
                    });
                }
            }
            if same_part {
                return None;
            }
        }

        Some(self.comb_through_air(start, end, start_inside, end_inside))
    }

    /// Move `p` into `boundary` and return it with its part.
    fn locate(&self, boundary: &Boundary, p: Point) -> Option<(Point, usize)> {
        let moved = boundary.move_inside(p, self.config.move_inside_distance, self.config.max_move_inside_distance)?;
        boundary.part_containing(&moved).map(|part| (moved, part))
    }

    /// Waypoints strictly between `start` and `end` inside one part.
    fn comb_inside(&self, boundary: &Boundary, part: usize, start: Point, end: Point) -> Option<Vec<Point>> {
        let in_part = |poly_idx: usize| boundary.polygon_part[poly_idx] == part;
        let crossings = boundary.crossings(&start, &end, in_part);
        if crossings.is_empty() {
            return Some(Vec::new());
        }
        let route = boundary.walk(start, end, &crossings, self.config.boundary_clearance, Side::Material);
        let blocked = |a: &Point, b: &Point| !boundary.crossings(a, b, in_part).is_empty();
        let route = simplify_route(&route, blocked);
        if route.windows(2).any(|w| blocked(&w[0], &w[1])) {
            return None;
        }
        Some(route[1..route.len() - 1].to_vec())
    }

    /// Sections for a travel that leaves its start part or enters another one.
    fn comb_through_air(&self, start: Point, end: Point, start_inside: bool, end_inside: bool) -> CombPaths {
        let boundary = &self.inside_optimal;
        let start_loc = if start_inside { self.locate(boundary, start) } else { None };
        let end_loc = if end_inside { self.locate(boundary, end) } else { None };
        let mut paths = Vec::with_capacity(3);

        let air_from = match start_loc {
            Some((s, part)) => {
                let exit = self.crossing_point(boundary, part, s, end_loc.map_or(end, |(e, _)| e), false);
                paths.push(self.section_inside(boundary, part, start, s, exit));
                exit
            }
            None => start,
        };
        let entry = end_loc.map(|(e, part)| (e, part, self.crossing_point(boundary, part, air_from, e, true)));
        let air_to = entry.map_or(end, |(_, _, p)| p);

        let skip: Vec<usize> = [start_loc.map(|l| l.1), end_loc.map(|l| l.1)]
            .into_iter()
            .flatten()
            .filter_map(|optimal_part| self.minimum_part_of(boundary, optimal_part))
            .collect();
        paths.push(self.section_through_air(air_from, air_to, &skip));

        if let Some((e, part, entry)) = entry {
            paths.push(self.section_inside(boundary, part, entry, entry, e));
        }

        CombPaths {
            paths,
            through_air: true,
        }
    }

    /// In-part section from `from` (moved to `s`) to `to`, ending with `to`.
    fn section_inside(&self, boundary: &Boundary, part: usize, from: Point, s: Point, to: Point) -> CombPath {
        let mut points = Vec::new();
        if s != from {
            points.push(s);
        }
        match self.comb_inside(boundary, part, s, to) {
            Some(waypoints) => {
                points.extend(waypoints);
                points.push(to);
                CombPath::new(points)
            }
            None => {
                points.push(to);
                CombPath {
                    points,
                    cross_boundary: true,
                }
            }
        }
    }

    /// Where the line `a`-`b` leaves (or, with `entering`, last enters) the outer contour of `part`.
    ///
    /// The point is pushed into the part by the move-inside distance.
    fn crossing_point(&self, boundary: &Boundary, part: usize, a: Point, b: Point, entering: bool) -> Point {
        let crossings = boundary.crossings(&a, &b, |poly_idx| {
            boundary.polygon_part[poly_idx] == part && !boundary.polygon_is_hole[poly_idx]
        });
        let chosen = if entering { crossings.last() } else { crossings.first() };
        match chosen {
            Some(c) => boundary.offset_from_edge(
                c.contour_idx,
                c.segment_idx,
                c.point,
                self.config.boundary_clearance,
                Side::Material,
            ),
            None => {
                if entering {
                    b
                } else {
                    a
                }
            }
        }
    }

    /// Index of the minimum-boundary part that holds the given preferred part.
    fn minimum_part_of(&self, optimal: &Boundary, optimal_part: usize) -> Option<usize> {
        let first_point = optimal.parts.get(optimal_part)?.contour.points().first()?;
        self.inside_minimum.part_containing(first_point)
    }

    /// Air section from `from` to `to`, walking around parts not in `skip`.
    fn section_through_air(&self, from: Point, to: Point, skip: &[usize]) -> CombPath {
        let outside = &self.outside;
        let other_part = |poly_idx: usize| !skip.contains(&self.outside_origin[outside.polygon_part[poly_idx]]);
        let crossings = outside.crossings(&from, &to, other_part);
        if crossings.is_empty() {
            return CombPath::new(vec![from, to]);
        }
        if !self.config.avoid_other_parts {
            return CombPath {
                points: vec![from, to],
                cross_boundary: true,
            };
        }
        let route = outside.walk(from, to, &crossings, self.config.boundary_clearance, Side::Air);
        let blocked = |a: &Point, b: &Point| !outside.crossings(a, b, other_part).is_empty();
        let route = simplify_route(&route, blocked);
        let cross_boundary = route.windows(2).any(|w| blocked(&w[0], &w[1]));
        CombPath {
            points: route,
            cross_boundary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::polygons_contain_point;

    fn square(min: Coord, max: Coord) -> Polygon {
        Polygon::rectangle(Point::new(min, min), Point::new(max, max))
    }

    /// U shape: 10mm square with a 6mm wide notch cut from the top.
    fn u_shape() -> Vec<Polygon> {
        vec![Polygon::from_points(vec![
            Point::new(0, 0),
            Point::new(10_000, 0),
            Point::new(10_000, 10_000),
            Point::new(8_000, 10_000),
            Point::new(8_000, 2_000),
            Point::new(2_000, 2_000),
            Point::new(2_000, 10_000),
            Point::new(0, 10_000),
        ])]
    }

    fn comb_for(outline: &[Polygon]) -> Comb {
        let minimum = clipper::offset(outline, -300, OffsetJoinType::Miter);
        let preferred = clipper::offset(outline, -500, OffsetJoinType::Miter);
        Comb::new(&minimum, &preferred, CombConfig::default().with_move_inside_distance(100))
    }

    #[test]
    fn test_comb_config_builder() {
        let config = CombConfig::new()
            .with_avoid_other_parts(false)
            .with_grid_resolution(500);
        assert!(!config.avoid_other_parts);
        assert_eq!(config.grid_resolution, 500);

        let from = CombConfig::from_settings(&CombingSettings::default(), 450);
        assert_eq!(from.move_inside_distance, 450);
        assert_eq!(from.avoid_distance, CombingSettings::default().avoid_distance);
    }

    #[test]
    fn test_straight_travel_inside_needs_no_waypoints() {
        let comb = comb_for(&[square(0, 10_000)]);
        let paths = comb
            .calc(Point::new(2_000, 2_000), Point::new(8_000, 7_000), true, true, 0)
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths.paths[0].is_empty());
        assert!(!paths.through_air);
        assert!(!paths.crosses_boundary());
    }

    #[test]
    fn test_short_travel_is_ignored() {
        let comb = comb_for(&u_shape());
        let paths = comb
            .calc(Point::new(1_000, 9_000), Point::new(1_100, 9_000), true, true, 500)
            .unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn test_comb_around_notch_stays_inside() {
        let outline = u_shape();
        let comb = comb_for(&outline);
        let preferred = clipper::offset(&outline, -500, OffsetJoinType::Miter);
        let start = Point::new(1_000, 9_000);
        let end = Point::new(9_000, 9_000);
        let paths = comb.calc(start, end, true, true, 0).unwrap();

        assert_eq!(paths.len(), 1);
        assert!(!paths.through_air);
        assert!(!paths.crosses_boundary());
        let points = &paths.paths[0].points;
        assert!(points.len() >= 2, "route must go around the notch: {points:?}");
        assert!(points.iter().all(|p| p.y < 2_000), "{points:?}");

        let mut route = vec![start];
        route.extend(points.iter().copied());
        route.push(end);
        for w in route.windows(2) {
            let mid = w[0].lerp(&w[1], 0.5);
            assert!(polygons_contain_point(&preferred, &mid) || polygons_contain_point(&outline, &mid));
        }
        for p in points {
            assert!(polygons_contain_point(&preferred, p), "{p:?} outside the preferred boundary");
        }
    }

    #[test]
    fn test_comb_around_hole() {
        let outline = vec![square(0, 10_000), {
            let mut hole = square(3_000, 7_000);
            hole.make_clockwise();
            hole
        }];
        let comb = comb_for(&outline);
        let paths = comb
            .calc(Point::new(1_500, 5_000), Point::new(8_500, 5_000), true, true, 0)
            .unwrap();
        assert_eq!(paths.len(), 1);
        let points = &paths.paths[0].points;
        assert!(!points.is_empty());
        let hole_box = BoundingBox::from_points_minmax(Point::new(3_000, 3_000), Point::new(7_000, 7_000));
        assert!(points.iter().all(|p| !hole_box.contains_point(p)));
    }

    #[test]
    fn test_travel_between_parts_goes_through_air() {
        let outline = vec![square(0, 5_000), {
            let mut p = square(10_000, 15_000);
            p.translate(Point::new(0, -10_000));
            p
        }];
        let comb = comb_for(&outline);
        let start = Point::new(2_500, 2_500);
        let end = Point::new(12_500, 2_500);
        let paths = comb.calc(start, end, true, true, 0).unwrap();
        assert!(paths.through_air);
        assert_eq!(paths.len(), 3);
        assert!(!paths.crosses_boundary());
        assert!(paths.travel_length(start, end) >= 10_000.0 - 1.0);
    }

    #[test]
    fn test_air_travel_avoids_other_part() {
        let outline = vec![square(4_000, 6_000)];
        let comb = comb_for(&outline);
        let start = Point::new(0, 5_000);
        let end = Point::new(10_000, 5_000);
        let paths = comb.calc(start, end, false, false, 0).unwrap();
        assert!(paths.through_air);
        assert_eq!(paths.len(), 1);
        let path = &paths.paths[0];
        assert!(!path.cross_boundary);
        assert!(path.len() > 2, "expected a detour: {:?}", path.points);

        let blocking = Comb::new(
            &clipper::offset(&outline, -300, OffsetJoinType::Miter),
            &clipper::offset(&outline, -500, OffsetJoinType::Miter),
            CombConfig::default().with_avoid_other_parts(false),
        );
        let straight = blocking.calc(start, end, false, false, 0).unwrap();
        assert_eq!(straight.paths[0].points, vec![start, end]);
        assert!(straight.paths[0].cross_boundary);
    }

    #[test]
    fn test_empty_boundaries() {
        let comb = Comb::new(&[], &[], CombConfig::default());
        assert!(comb.is_empty());
        let start = Point::new(0, 5_000);
        let end = Point::new(10_000, 5_000);
        let paths = comb.calc(start, end, true, true, 0).unwrap();
        assert!(paths.through_air);
        assert_eq!(paths.paths[0].points, vec![start, end]);
        assert!(!paths.crosses_boundary());
    }

    #[test]
    fn test_simplify_route() {
        assert!(simplify_route(&[], |_, _| false).is_empty());
        let path = vec![Point::new(0, 0), Point::new(50, 50), Point::new(100, 100)];
        assert_eq!(simplify_route(&path, |_, _| false), vec![path[0], path[2]]);
        assert_eq!(simplify_route(&path, |_, _| true), path);
    }

    #[test]
    fn test_polygon_length() {
        let boundary = Boundary::from_polygons(&[square(0, 1_000)], 500);
        assert!((boundary.polygon_length(0) - 4_000.0).abs() < 1e-6);
        assert_eq!(boundary.shortest_direction(0, 0, 1), Direction::Forward);
        assert_eq!(boundary.shortest_direction(0, 0, 3), Direction::Backward);
    }
}
