//! Variable-width wall generation.
//!
//! [`WallToolPaths`] turns a layer outline into wall toolpaths whose width
//! follows the local thickness of the shape, so thin features and walls that
//! do not fit a whole number of beads are filled without gaps or overlaps.
//!
//! # Pipeline
//!
//! 1. The outline is cleaned: a small morphological open/close, simplification,
//!    self-intersection repair and removal of degenerate vertices, colinear
//!    edges and tiny areas.
//! 2. Every island is sampled on a grid ([`medial`]): the distance to the
//!    outline, the medial ridge and from it the local thickness everywhere.
//! 3. The beading strategy ([`beading`]) divides that thickness into beads,
//!    blending between bead counts across transitions.
//! 4. Paired beads are extracted as closed loops of constant offset ratio;
//!    an unpaired center bead follows the ridge as an open odd line.
//! 5. Fragments are stitched, the innermost zero-width loops are turned into
//!    the inner contour and the remaining lines are simplified.
//!
//! Islands are independent and generated in parallel.

pub mod beading;
mod contour;
pub mod junction;
pub mod line;
mod medial;
pub mod stitch;

pub use beading::{Beading, BeadingStrategy, BeadingStrategyFactory};
pub use junction::{ExtrusionJunction, ExtrusionJunctions};
pub use line::{ExtrusionLine, VariableWidthLines};
pub use stitch::PolylineStitcher;

use crate::clipper::{even_odd_fill, open_close, remove_small_areas, union_all};
use crate::config::WallSettings;
use crate::geometry::{group_by_nesting, polygons_area, Polygon, Polygons};
use crate::pipeline::CancellationToken;
use crate::{Coord, CoordF};
use contour::trace_loops;
use medial::{trace_center_lines, BeadLayouter, CenterPoint, IslandLayouts, Layout, MedialField, MedialParams};
use rayon::prelude::*;

/// Vertices turning less than this (radians) are dropped from the prepared outline.
const COLINEAR_ANGLE: CoordF = 0.005;

/// Generated walls of one island, before post-processing.
#[derive(Debug, Default)]
struct IslandToolpaths {
    lines: Vec<ExtrusionLine>,
    markers: Vec<ExtrusionLine>,
}

/// Variable-width wall generator for one layer outline.
#[derive(Debug, Clone)]
pub struct WallToolPaths {
    outline: Polygons,
    bead_width_0: Coord,
    bead_width_x: Coord,
    inset_count: usize,
    wall_0_inset: Coord,
    print_thin_walls: bool,
    settings: WallSettings,
    toolpaths: Vec<VariableWidthLines>,
    inner_contour: Polygons,
    toolpaths_generated: bool,
}

impl WallToolPaths {
    /// Generator with explicit widths and wall count; the remaining tunables
    /// come from `settings`.
    pub fn new(
        outline: &[Polygon],
        bead_width_0: Coord,
        bead_width_x: Coord,
        inset_count: usize,
        wall_0_inset: Coord,
        settings: &WallSettings,
    ) -> Self {
        let mut settings = settings.clone();
        settings.wall_line_width_0 = bead_width_0;
        settings.wall_line_width_x = bead_width_x;
        settings.wall_line_count = inset_count;
        settings.wall_0_inset = wall_0_inset;
        Self {
            outline: outline.to_vec(),
            bead_width_0,
            bead_width_x,
            inset_count,
            wall_0_inset,
            print_thin_walls: settings.fill_outline_gaps,
            settings,
            toolpaths: Vec::new(),
            inner_contour: Vec::new(),
            toolpaths_generated: false,
        }
    }

    /// Generator taking widths, wall count and inset from `settings`.
    pub fn from_settings(outline: &[Polygon], settings: &WallSettings) -> Self {
        Self::new(
            outline,
            settings.wall_line_width_0,
            settings.wall_line_width_x,
            settings.wall_line_count,
            settings.wall_0_inset,
            settings,
        )
    }

    /// Generate the toolpaths, once; later calls return the cached result.
    pub fn generate(&mut self) -> &[VariableWidthLines] {
        self.generate_with_cancel(&CancellationToken::new())
    }

    /// Generate the toolpaths, giving up between islands when `cancel` fires.
    ///
    /// A cancelled run leaves an empty, ungenerated result.
    pub fn generate_with_cancel(&mut self, cancel: &CancellationToken) -> &[VariableWidthLines] {
        if self.toolpaths_generated {
            return &self.toolpaths;
        }
        if self.inset_count == 0 {
            self.fill_outline_with_inner_contour();
            return &self.toolpaths;
        }

        let prepared = prepare_outline(&self.outline, &self.settings);
        if prepared.is_empty() {
            self.toolpaths.clear();
            self.inner_contour.clear();
            self.toolpaths_generated = true;
            return &self.toolpaths;
        }

        let max_bead_count = 2 * self.inset_count as Coord;
        let strategy = BeadingStrategyFactory::make_strategy(&self.settings, max_bead_count, self.print_thin_walls);
        let layouter = BeadLayouter::new(strategy.as_ref(), max_bead_count);
        let params = MedialParams {
            pitch: (self.settings.min_bead_width as CoordF / 8.0).max(10.0),
            transition_angle: strategy.transitioning_angle(),
            filter_distance: self.settings.wall_transition_filter_distance as CoordF,
            filter_deviation: self.settings.wall_transition_filter_deviation as CoordF,
            thickness_cap: layouter.thickness_cap(),
        };

        let islands = group_by_nesting(&prepared);
        let generated: Option<Vec<IslandToolpaths>> = islands
            .par_iter()
            .map(|island| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some(self.generate_island(&island.to_polygons(), &params, strategy.as_ref(), &layouter))
            })
            .collect();
        let Some(generated) = generated else {
            log::debug!("wall generation cancelled");
            return &self.toolpaths;
        };

        let mut buckets: Vec<VariableWidthLines> = vec![Vec::new(); self.inset_count + 1];
        let mut markers = Vec::new();
        for island in generated {
            for line in island.lines {
                let idx = line.inset_idx.min(self.inset_count);
                buckets[idx].push(line);
            }
            markers.extend(island.markers);
        }
        let (toolpaths, separated) = self.post_process_lines(buckets);
        markers.extend(separated);

        let marker_loops: Polygons = markers
            .iter()
            .filter(|m| m.is_closed && !m.is_odd && m.len() >= 3)
            .map(ExtrusionLine::to_polygon)
            .collect();
        self.inner_contour = even_odd_fill(&marker_loops);
        self.toolpaths = toolpaths;
        self.toolpaths_generated = true;

        log::debug!(
            "walls: {} islands, {} insets, {} lines, {} inner contour polygons",
            islands.len(),
            self.toolpaths.len(),
            self.toolpaths.iter().map(Vec::len).sum::<usize>(),
            self.inner_contour.len()
        );
        &self.toolpaths
    }

    /// Generated toolpaths; empty until [`generate`](Self::generate) ran.
    pub fn toolpaths(&self) -> &[VariableWidthLines] {
        &self.toolpaths
    }

    /// Area left inside the innermost wall, generating walls when needed.
    ///
    /// Without walls this is the prepared outline itself.
    pub fn get_inner_contour(&mut self) -> &Polygons {
        if !self.toolpaths_generated {
            self.generate();
        }
        &self.inner_contour
    }

    /// Whether there is nothing to print: no walls were generated, or the
    /// outline is empty when generation has not run yet.
    pub fn is_empty(&self) -> bool {
        if self.toolpaths_generated {
            self.toolpaths.iter().all(Vec::is_empty)
        } else {
            self.outline.iter().all(|p| p.len() < 3)
        }
    }

    /// Requested number of walls.
    pub fn inset_count(&self) -> usize {
        self.inset_count
    }

    /// Outer and inner bead width.
    pub fn bead_widths(&self) -> (Coord, Coord) {
        (self.bead_width_0, self.bead_width_x)
    }

    /// Extra inset of the outer wall.
    pub fn wall_0_inset(&self) -> Coord {
        self.wall_0_inset
    }

    /// Drop empty inset buckets. Returns whether anything is left.
    pub fn remove_empty_toolpaths(toolpaths: &mut Vec<VariableWidthLines>) -> bool {
        toolpaths.retain(|bucket| !bucket.is_empty());
        !toolpaths.is_empty()
    }

    /// Give the whole prepared outline to the inner contour and print no walls.
    pub fn fill_outline_with_inner_contour(&mut self) {
        self.toolpaths.clear();
        self.inner_contour = prepare_outline(&self.outline, &self.settings);
        self.toolpaths_generated = true;
    }

    /// Run the post-processing on already generated toolpaths.
    ///
    /// Zero-width lines are dropped; applying it to its own output changes nothing.
    pub fn post_process(&self, toolpaths: Vec<VariableWidthLines>) -> Vec<VariableWidthLines> {
        self.post_process_lines(toolpaths).0
    }

    fn generate_island(
        &self,
        polygons: &[Polygon],
        params: &MedialParams,
        strategy: &dyn BeadingStrategy,
        layouter: &BeadLayouter<'_>,
    ) -> IslandToolpaths {
        let Some(field) = MedialField::build(polygons, params, strategy) else {
            return IslandToolpaths::default();
        };
        let layouts = IslandLayouts::build(&field, layouter);
        let mut result = IslandToolpaths::default();

        for bead in 0..=self.inset_count {
            let values: Vec<CoordF> = (0..field.grid.len())
                .into_par_iter()
                .map(|idx| {
                    let d = field.distance[idx];
                    match layouts.get(idx).paired(bead) {
                        Some((location, _)) => d - location,
                        None => (d - field.thickness[idx] / 2.0).min(-1e-3),
                    }
                })
                .collect();
            for ring in trace_loops(&field.grid, &values) {
                let mut junctions: Vec<ExtrusionJunction> = Vec::with_capacity(ring.len());
                for crossing in &ring {
                    let width = bead_width_at(layouts.get(crossing.a), layouts.get(crossing.b), bead, crossing.t);
                    let junction = ExtrusionJunction::new(crossing.point.to_point(), width.round() as Coord, bead);
                    if junctions.last().map_or(true, |last| last.position != junction.position) {
                        junctions.push(junction);
                    }
                }
                while junctions.len() > 1 && junctions.first().map(|j| j.position) == junctions.last().map(|j| j.position) {
                    junctions.pop();
                }
                if junctions.len() < 3 {
                    continue;
                }
                let line = ExtrusionLine::from_junctions(junctions, bead, false, true);
                if bead == self.inset_count {
                    result.markers.push(line);
                } else {
                    result.lines.push(line);
                }
            }
        }

        let tolerance = field.grid.pitch + 2.0 * self.settings.meshfix_maximum_deviation as CoordF;
        let centers: Vec<CenterPoint> = field
            .ridge
            .iter()
            .filter_map(|sample| {
                let thickness = field.thickness[sample.node];
                let (inset_idx, width) = layouts.get(sample.node).center()?;
                let on_ridge = (2.0 * sample.radius - thickness).abs() <= tolerance;
                (width > 0.0 && inset_idx < self.inset_count && on_ridge).then_some(CenterPoint {
                    point: sample.point,
                    width,
                    inset_idx,
                })
            })
            .collect();
        result.lines.extend(trace_center_lines(&centers, field.grid.pitch));
        result
    }

    /// Stitch, separate markers, simplify and drop degenerate lines.
    fn post_process_lines(&self, toolpaths: Vec<VariableWidthLines>) -> (Vec<VariableWidthLines>, Vec<ExtrusionLine>) {
        let stitcher = PolylineStitcher::new((self.bead_width_x - 1).max(0));
        let max_resolution = self.settings.meshfix_maximum_resolution;
        let max_deviation = self.settings.meshfix_maximum_deviation;
        let max_area_deviation = self.settings.meshfix_maximum_extrusion_area_deviation;

        let mut markers = Vec::new();
        let mut result: Vec<VariableWidthLines> = toolpaths
            .into_iter()
            .map(|bucket| {
                let mut bucket = stitcher.stitch(bucket);
                bucket.retain(|line| !is_too_short_odd(line));
                let (zero_width, mut printable): (Vec<_>, Vec<_>) = bucket
                    .into_iter()
                    .partition(|line| line.inset_idx >= self.inset_count || line.is_marker());
                markers.extend(zero_width);
                for line in &mut printable {
                    line.simplify(max_resolution, max_deviation, max_area_deviation);
                    line.start_idx = None;
                }
                printable.retain(|line| {
                    line.len() >= 2 && !line.shorter_than(max_deviation) && !is_too_short_odd(line)
                });
                printable
            })
            .collect();
        Self::remove_empty_toolpaths(&mut result);

        debug_assert!(
            result.iter().all(|bucket| {
                let inset = bucket.first().map(|l| l.inset_idx);
                bucket.iter().all(|l| Some(l.inset_idx) == inset)
            }),
            "wall bucket holds lines of different insets"
        );
        debug_assert!(
            result
                .windows(2)
                .all(|w| w[0].first().map(|l| l.inset_idx) < w[1].first().map(|l| l.inset_idx)),
            "wall toolpaths are not sorted by inset"
        );
        (result, markers)
    }
}

/// Odd open lines too short to print for their own width.
fn is_too_short_odd(line: &ExtrusionLine) -> bool {
    line.is_odd && !line.is_closed && line.shorter_than(line.min_width() / 2)
}

/// Width of `bead` at a crossing between two sample nodes.
fn bead_width_at(a: &Layout, b: &Layout, bead: usize, t: CoordF) -> CoordF {
    match (a.paired(bead), b.paired(bead)) {
        (Some((_, wa)), Some((_, wb))) => wa + (wb - wa) * t,
        (Some((_, w)), None) | (None, Some((_, w))) => w,
        (None, None) => 0.0,
    }
}

/// Clean an outline for wall generation. Returns an empty set when nothing
/// printable is left.
pub fn prepare_outline(outline: &[Polygon], settings: &WallSettings) -> Polygons {
    let epsilon = settings.meshfix_maximum_deviation / 2 - 1;
    let mut prepared = if epsilon > 0 {
        open_close(outline, epsilon)
    } else {
        union_all(outline)
    };
    for polygon in &mut prepared {
        polygon.simplify(settings.meshfix_maximum_resolution, settings.meshfix_maximum_deviation);
    }
    prepared.retain(|p| p.len() >= 3);
    let mut prepared = union_all(&prepared);
    for polygon in &mut prepared {
        polygon.remove_degenerate_verts();
        polygon.remove_colinear_edges(COLINEAR_ANGLE);
    }
    prepared.retain(|p| p.len() >= 3);
    let half_width = settings.wall_line_width_0 as CoordF / 2.0;
    let prepared = remove_small_areas(&prepared, half_width * half_width);
    if polygons_area(&prepared) <= 0.0 {
        return Vec::new();
    }
    prepared
}
