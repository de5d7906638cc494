//! Wall generation on whole layer outlines.

use proptest::prelude::*;
use slicecore::config::WallSettings;
use slicecore::geometry::{polygons_area, Point, Polygon};
use slicecore::{scale, Coord, ExtrusionLine, VariableWidthLines, WallToolPaths};

/// Vertical cut through the middle of a 20 mm strip, off any grid line.
const STRIP_MIDDLE: Coord = 10_003;

fn rectangle_mm(width: f64, height: f64) -> Polygon {
    Polygon::rectangle(Point::new(0, 0), Point::new(scale(width), scale(height)))
}

fn strip(width: Coord) -> Polygon {
    Polygon::rectangle(Point::new(0, 0), Point::new(scale(20.0), width))
}

fn strip_walls(width: Coord, walls: usize) -> Vec<VariableWidthLines> {
    let settings = WallSettings::default().with_wall_count(walls);
    WallToolPaths::from_settings(&[strip(width)], &settings).generate().to_vec()
}

/// Beads met walking across the walls at `x`: two per loop around, one per center line.
fn beads_across(toolpaths: &[VariableWidthLines], x: Coord) -> usize {
    toolpaths
        .iter()
        .flatten()
        .flat_map(|line| line.segments())
        .filter(|(a, b)| (a.position.x > x) != (b.position.x > x))
        .count()
}

fn orientation(p: Point, q: Point, r: Point) -> i128 {
    let v = (q.x - p.x) as i128 * (r.y - p.y) as i128 - (q.y - p.y) as i128 * (r.x - p.x) as i128;
    v.signum()
}

/// Whether two segments cross at a point interior to both.
fn properly_cross(a: (Point, Point), b: (Point, Point)) -> bool {
    orientation(b.0, b.1, a.0) * orientation(b.0, b.1, a.1) < 0
        && orientation(a.0, a.1, b.0) * orientation(a.0, a.1, b.1) < 0
}

/// First pair of crossing segments among all walls, as (line, segment) indices.
fn find_crossing(toolpaths: &[VariableWidthLines]) -> Option<((usize, usize), (usize, usize))> {
    let lines: Vec<Vec<(Point, Point)>> = toolpaths
        .iter()
        .flatten()
        .map(|line| line.segments().map(|(a, b)| (a.position, b.position)).collect())
        .collect();
    for (i, a) in lines.iter().enumerate() {
        for (j, b) in lines.iter().enumerate().skip(i) {
            for (si, sa) in a.iter().enumerate() {
                for (sj, sb) in b.iter().enumerate() {
                    if i == j && sj <= si {
                        continue;
                    }
                    if properly_cross(*sa, *sb) {
                        return Some(((i, si), (j, sj)));
                    }
                }
            }
        }
    }
    None
}

#[test]
fn test_two_islands_are_generated_independently() {
    let mut right = rectangle_mm(8.0, 8.0);
    right.translate(Point::new(scale(20.0), 0));
    let outline = vec![rectangle_mm(8.0, 8.0), right];
    let mut walls = WallToolPaths::from_settings(&outline, &WallSettings::default().with_wall_count(2));
    let toolpaths = walls.generate().to_vec();

    assert_eq!(toolpaths.len(), 2);
    for bucket in &toolpaths {
        assert_eq!(bucket.len(), 2, "{bucket:?}");
    }
    // One inner contour per island.
    assert_eq!(walls.get_inner_contour().len(), 2);
}

#[test]
fn test_buckets_are_sorted_by_inset() {
    let outline = vec![rectangle_mm(12.0, 7.0)];
    let mut walls = WallToolPaths::from_settings(&outline, &WallSettings::default().with_wall_count(4));
    for (inset, bucket) in walls.generate().iter().enumerate() {
        assert!(bucket.iter().all(|line| line.inset_idx == inset));
        assert!(bucket.iter().all(|line| line.start_idx.is_none()));
    }
}

#[test]
fn test_inner_contour_fills_remaining_area() {
    let outline = vec![rectangle_mm(10.0, 10.0)];
    let mut walls = WallToolPaths::from_settings(&outline, &WallSettings::default().with_wall_count(1));
    walls.generate();
    let area = polygons_area(walls.get_inner_contour()) / 1e6;
    // 10 mm minus one 0.4 mm wall on each side
    assert!((area - 9.2 * 9.2).abs() < 1.0, "inner area {area}");
}

#[test]
fn test_bead_count_never_drops_as_strip_widens() {
    let mut previous = 0;
    for width in (40..=1500).step_by(20) {
        let beads = beads_across(&strip_walls(width, 3), STRIP_MIDDLE);
        assert!(beads >= previous, "{width} um strip: {beads} beads after {previous}");
        previous = beads;
    }
    assert!(previous >= 3, "{previous}");
}

#[test]
fn test_transition_bands_keep_their_beads() {
    // Around the one to two bead split the strip keeps at least its center line.
    for width in [640, 660, 661, 662, 680] {
        let beads = beads_across(&strip_walls(width, 3), STRIP_MIDDLE);
        assert!((1..=2).contains(&beads), "{width} um strip: {beads} beads");
    }
    // Around the three to four bead split the center bead survives next to the outer loop.
    for width in [1440, 1460, 1461, 1462] {
        let beads = beads_across(&strip_walls(width, 3), STRIP_MIDDLE);
        assert!((3..=4).contains(&beads), "{width} um strip: {beads} beads");
    }
}

#[test]
fn test_walls_of_square_with_hole_do_not_cross() {
    let mut hole = Polygon::rectangle(Point::new(scale(4.0), scale(4.0)), Point::new(scale(8.0), scale(8.0)));
    hole.make_clockwise();
    let outline = vec![rectangle_mm(12.0, 12.0), hole];
    let mut walls = WallToolPaths::from_settings(&outline, &WallSettings::default().with_wall_count(3));
    let toolpaths = walls.generate().to_vec();
    assert!(!toolpaths.is_empty());
    assert_eq!(find_crossing(&toolpaths), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn test_walls_stay_inside_rectangle(width in 3.0f64..15.0, height in 3.0f64..15.0, count in 1usize..4) {
        let outline = vec![rectangle_mm(width, height)];
        let mut walls = WallToolPaths::from_settings(&outline, &WallSettings::default().with_wall_count(count));
        let toolpaths = walls.generate().to_vec();
        prop_assert!(toolpaths.len() <= count);
        let lines: Vec<&ExtrusionLine> = toolpaths.iter().flatten().collect();
        for line in lines {
            for j in line.iter() {
                let half = j.width / 2;
                prop_assert!(j.position.x - half >= -50 && j.position.x + half <= scale(width) + 50);
                prop_assert!(j.position.y - half >= -50 && j.position.y + half <= scale(height) + 50);
            }
        }
    }

    #[test]
    fn test_strip_walls_do_not_cross(width in 100i64..3_000, count in 1usize..4) {
        let toolpaths = strip_walls(width, count);
        prop_assert_eq!(find_crossing(&toolpaths), None);
    }

    #[test]
    fn test_post_processing_is_idempotent(width in 4.0f64..12.0, count in 1usize..4) {
        let outline = vec![rectangle_mm(width, 6.0)];
        let mut walls = WallToolPaths::from_settings(&outline, &WallSettings::default().with_wall_count(count));
        let once = walls.generate().to_vec();
        let twice = walls.post_process(once.clone());
        prop_assert_eq!(once, twice);
    }
}
