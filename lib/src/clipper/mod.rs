//! Polygon boolean operations and offsets.
//!
//! Thin layer over geo-clipper working on orientation-encoded [`Polygons`]:
//! counter-clockwise loops are material, clockwise loops are holes. Results
//! always come back in that canonical orientation.
//!
//! Inputs are grouped into contours and holes by nesting depth before being
//! handed to the clipper, so a polygon set with inconsistent orientation is
//! treated with even-odd semantics. This is what the wall generator relies on
//! to fill zero-width contour loops and to repair self-touching outlines.
//!
//! These operations are used for:
//! - outline preparation before wall generation
//! - combing boundaries
//! - bridge wall masks and inner contour filling

use crate::geometry::{
    expolygons_to_polygons, group_by_nesting, polygons_contain_point, ExPolygon, Point, Polygon,
    Polygons, Polyline,
};
use crate::{scale, unscale, Coord, CoordF};
use geo::{Coord as GeoCoord, LineString, MultiPolygon, Polygon as GeoPolygon};
use geo_clipper::{Clipper, EndType, JoinType};

/// Integer factor geo-clipper uses when converting millimeters to its fixed point.
const CLIPPER_FACTOR: f64 = 1000.0;

/// Join type for offset corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetJoinType {
    /// Square corners
    Square,
    /// Round corners
    #[default]
    Round,
    /// Mitered corners
    Miter,
}

impl From<OffsetJoinType> for JoinType {
    fn from(jt: OffsetJoinType) -> Self {
        match jt {
            OffsetJoinType::Square => JoinType::Square,
            OffsetJoinType::Round => JoinType::Round(0.01),
            OffsetJoinType::Miter => JoinType::Miter(1.2),
        }
    }
}

fn ring_to_geo(poly: &Polygon) -> LineString<f64> {
    let mut ring: Vec<GeoCoord<f64>> = poly
        .points()
        .iter()
        .map(|p| GeoCoord {
            x: unscale(p.x),
            y: unscale(p.y),
        })
        .collect();
    if let Some(&first) = ring.first() {
        ring.push(first);
    }
    LineString::new(ring)
}

fn expolygon_to_geo(expoly: &ExPolygon) -> GeoPolygon<f64> {
    GeoPolygon::new(
        ring_to_geo(&expoly.contour),
        expoly.holes.iter().map(ring_to_geo).collect(),
    )
}

fn ring_from_geo(ring: &LineString<f64>) -> Polygon {
    let mut points: Vec<Point> = ring
        .coords()
        .map(|c| Point::new(scale(c.x), scale(c.y)))
        .collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    Polygon::from_points(points)
}

fn geo_to_polygons(multi: &MultiPolygon<f64>) -> Polygons {
    let mut out = Polygons::new();
    for poly in &multi.0 {
        let mut contour = ring_from_geo(poly.exterior());
        if contour.len() < 3 {
            continue;
        }
        contour.make_counter_clockwise();
        out.push(contour);
        for interior in poly.interiors() {
            let mut hole = ring_from_geo(interior);
            if hole.len() < 3 {
                continue;
            }
            hole.make_clockwise();
            out.push(hole);
        }
    }
    out
}

fn polygons_to_geo(polygons: &[Polygon]) -> MultiPolygon<f64> {
    MultiPolygon::new(
        group_by_nesting(polygons)
            .iter()
            .map(expolygon_to_geo)
            .collect(),
    )
}

// ============================================================================
// Boolean Operations
// ============================================================================

/// Union of two polygon sets.
pub fn union(subject: &[Polygon], clip: &[Polygon]) -> Polygons {
    if subject.is_empty() && clip.is_empty() {
        return Polygons::new();
    }
    let result = polygons_to_geo(subject).union(&polygons_to_geo(clip), CLIPPER_FACTOR);
    geo_to_polygons(&result)
}

/// Union of a single polygon set with itself.
///
/// Resolves overlaps and self-intersections into a clean canonical set.
pub fn union_all(polygons: &[Polygon]) -> Polygons {
    union(polygons, &[])
}

/// Intersection of two polygon sets.
pub fn intersection(subject: &[Polygon], clip: &[Polygon]) -> Polygons {
    if subject.is_empty() || clip.is_empty() {
        return Polygons::new();
    }
    let result = polygons_to_geo(subject).intersection(&polygons_to_geo(clip), CLIPPER_FACTOR);
    geo_to_polygons(&result)
}

/// Difference `subject - clip`.
pub fn difference(subject: &[Polygon], clip: &[Polygon]) -> Polygons {
    if subject.is_empty() {
        return Polygons::new();
    }
    if clip.is_empty() {
        return union_all(subject);
    }
    let result = polygons_to_geo(subject).difference(&polygons_to_geo(clip), CLIPPER_FACTOR);
    geo_to_polygons(&result)
}

/// Symmetric difference of two polygon sets.
pub fn xor(subject: &[Polygon], clip: &[Polygon]) -> Polygons {
    let result = polygons_to_geo(subject).xor(&polygons_to_geo(clip), CLIPPER_FACTOR);
    geo_to_polygons(&result)
}

// ============================================================================
// Offset Operations
// ============================================================================

/// Offset a polygon set by `delta` scaled units.
///
/// Positive delta grows material, negative delta shrinks it.
pub fn offset(polygons: &[Polygon], delta: Coord, join_type: OffsetJoinType) -> Polygons {
    if polygons.is_empty() {
        return Polygons::new();
    }
    if delta == 0 {
        return union_all(polygons);
    }
    let result = polygons_to_geo(polygons).offset(
        unscale(delta),
        join_type.into(),
        EndType::ClosedPolygon,
        CLIPPER_FACTOR,
    );
    geo_to_polygons(&result)
}

/// Morphological opening then closing: removes features thinner than `2 * epsilon`
/// and fills gaps narrower than `2 * epsilon`.
pub fn open_close(polygons: &[Polygon], epsilon: Coord) -> Polygons {
    let shrunk = offset(polygons, -epsilon, OffsetJoinType::Miter);
    let grown = offset(&shrunk, 2 * epsilon, OffsetJoinType::Miter);
    offset(&grown, -epsilon, OffsetJoinType::Miter)
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Fill closed loops with even-odd semantics and return a canonical set.
pub fn even_odd_fill(loops: &[Polygon]) -> Polygons {
    union_all(&expolygons_to_polygons(&group_by_nesting(loops)))
}

/// Drop every loop whose absolute area is below `min_area` (scaled units squared).
pub fn remove_small_areas(polygons: &[Polygon], min_area: CoordF) -> Polygons {
    polygons
        .iter()
        .filter(|p| p.area() >= min_area)
        .cloned()
        .collect()
}

/// Split `polyline` at the boundary of `region`, returning the pieces inside
/// (`keep_inside = true`) or outside of it, in travel order.
pub fn clip_polyline(polyline: &Polyline, region: &[Polygon], keep_inside: bool) -> Vec<Polyline> {
    let points = polyline.points();
    let mut pieces: Vec<Polyline> = Vec::new();
    if points.len() < 2 {
        return pieces;
    }
    let mut current: Vec<Point> = Vec::new();

    for w in points.windows(2) {
        let (a, b) = (w[0], w[1]);
        let mut params: Vec<CoordF> = vec![0.0, 1.0];
        let seg = crate::geometry::Line::new(a, b);
        for poly in region {
            for edge in poly.edges() {
                if let Some(t) = seg.intersection_param(&edge) {
                    params.push(t);
                }
            }
        }
        params.sort_by(|x, y| x.total_cmp(y));
        params.dedup_by(|x, y| (*x - *y).abs() < 1e-9);

        for span in params.windows(2) {
            let (t0, t1) = (span[0], span[1]);
            let mid = seg.point_at((t0 + t1) / 2.0);
            let inside = polygons_contain_point(region, &mid);
            let p0 = seg.point_at(t0);
            let p1 = seg.point_at(t1);
            if inside == keep_inside {
                if current.last() != Some(&p0) {
                    if current.len() >= 2 {
                        pieces.push(Polyline::from_points(std::mem::take(&mut current)));
                    }
                    current.clear();
                    current.push(p0);
                }
                current.push(p1);
            } else if current.len() >= 2 {
                pieces.push(Polyline::from_points(std::mem::take(&mut current)));
            } else {
                current.clear();
            }
        }
    }
    if current.len() >= 2 {
        pieces.push(Polyline::from_points(current));
    }
    pieces
}
