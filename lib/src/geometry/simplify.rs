//! Point-sequence cleanup shared by polygons, polylines and extrusion lines.
//!
//! Simplification runs to a fixed point: after it returns, no remaining vertex
//! qualifies for removal, so simplifying an already simplified path changes
//! nothing.

use super::Point;
use crate::{Coord, CoordF};

/// Deviation (in scaled units) below which a vertex is treated as colinear.
pub const COLLINEARITY_THRESHOLD: Coord = 1;

/// Distance from `p` to the segment `a`-`b`.
#[inline]
pub(crate) fn deviation(p: &Point, a: &Point, b: &Point) -> CoordF {
    (p.distance_to_segment_squared(*a, *b) as CoordF).sqrt()
}

/// Remove vertices that are colinear with their neighbours, or that border a
/// segment shorter than `max_resolution` while deviating less than
/// `max_deviation` from the shortcut.
///
/// The first vertex of a closed loop and both ends of an open path are kept.
pub fn simplify_points(
    points: &[Point],
    closed: bool,
    max_resolution: Coord,
    max_deviation: Coord,
) -> Vec<Point> {
    let min_len = if closed { 3 } else { 2 };
    let mut current: Vec<Point> = points.to_vec();
    current.dedup();
    if closed {
        while current.len() > 1 && current.first() == current.last() {
            current.pop();
        }
    }
    if current.len() <= min_len {
        return current;
    }

    loop {
        let n = current.len();
        let mut kept: Vec<Point> = Vec::with_capacity(n);
        kept.push(current[0]);
        let last_candidate = if closed { n } else { n - 1 };
        for i in 1..last_candidate {
            let curr = current[i];
            let next = if i + 1 < n { current[i + 1] } else { current[0] };
            let remaining = last_candidate - i - 1;
            if kept.len() + remaining + usize::from(!closed) < min_len {
                kept.push(curr);
                continue;
            }
            let Some(&prev) = kept.last() else {
                kept.push(curr);
                continue;
            };
            if curr == prev {
                continue;
            }
            let dev = deviation(&curr, &prev, &next);
            let short = prev.distance(&curr) < max_resolution as CoordF
                || curr.distance(&next) < max_resolution as CoordF;
            if dev <= COLLINEARITY_THRESHOLD as CoordF || (short && dev < max_deviation as CoordF) {
                continue;
            }
            kept.push(curr);
        }
        if !closed {
            kept.push(current[n - 1]);
        }
        if kept.len() == current.len() {
            return kept;
        }
        current = kept;
        if current.len() <= min_len {
            return current;
        }
    }
}

/// Remove vertices where the path turns back onto itself (spikes of zero width).
pub fn remove_degenerate_verts(points: &[Point], closed: bool) -> Vec<Point> {
    let mut result: Vec<Point> = points.to_vec();
    let mut changed = true;
    while changed && result.len() >= 3 {
        changed = false;
        let n = result.len();
        let mut kept: Vec<Point> = Vec::with_capacity(n);
        for i in 0..n {
            let is_end = !closed && (i == 0 || i == n - 1);
            if is_end {
                kept.push(result[i]);
                continue;
            }
            let prev = match kept.last() {
                Some(p) => *p,
                None => result[(i + n - 1) % n],
            };
            let curr = result[i];
            let next = result[(i + 1) % n];
            let d1 = curr - prev;
            let d2 = next - curr;
            let folds_back = d1.cross(&d2) == 0 && d1.dot(&d2) < 0;
            if curr == prev || folds_back {
                changed = true;
                continue;
            }
            kept.push(curr);
        }
        result = kept;
    }
    result
}

/// Remove vertices whose incoming and outgoing directions differ by less than
/// `max_angle` radians.
pub fn remove_colinear_edges(points: &[Point], max_angle: CoordF) -> Vec<Point> {
    let n = points.len();
    if n < 4 {
        return points.to_vec();
    }
    let mut kept: Vec<Point> = Vec::with_capacity(n);
    for i in 0..n {
        let prev = match kept.last() {
            Some(p) if i > 0 => *p,
            _ => points[(i + n - 1) % n],
        };
        let curr = points[i];
        let next = points[(i + 1) % n];
        let a = (curr - prev).to_f64();
        let b = (next - curr).to_f64();
        let angle = a.cross(&b).atan2(a.dot(&b)).abs();
        let remaining = n - i - 1;
        if angle < max_angle && kept.len() + remaining >= 3 {
            continue;
        }
        kept.push(curr);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_with_midpoints() -> Vec<Point> {
        vec![
            Point::new(0, 0),
            Point::new(500, 0),
            Point::new(1000, 0),
            Point::new(1000, 1000),
            Point::new(0, 1000),
            Point::new(0, 500),
        ]
    }

    #[test]
    fn test_simplify_closed_removes_colinear() {
        let simplified = simplify_points(&square_with_midpoints(), true, 10, 5);
        assert_eq!(simplified.len(), 4);
    }

    #[test]
    fn test_simplify_is_fixed_point() {
        let wobbly: Vec<Point> = (0..50)
            .map(|i| Point::new(i * 40, if i % 2 == 0 { 0 } else { 7 }))
            .collect();
        let once = simplify_points(&wobbly, false, 100, 10);
        let twice = simplify_points(&once, false, 100, 10);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_remove_degenerate_spike() {
        let pts = vec![
            Point::new(0, 0),
            Point::new(1000, 0),
            Point::new(2000, 0),
            Point::new(1500, 0),
            Point::new(1000, 1000),
        ];
        let cleaned = remove_degenerate_verts(&pts, true);
        assert!(!cleaned.contains(&Point::new(2000, 0)));
    }

    #[test]
    fn test_remove_colinear_edges() {
        let cleaned = remove_colinear_edges(&square_with_midpoints(), 0.005);
        assert_eq!(cleaned.len(), 4);
    }
}
