//! Local wall thickness field.
//!
//! The outline is sampled on a regular grid. Every node stores its signed
//! distance to the outline and the foot of that distance on the boundary.
//! Neighbouring nodes whose feet lie far apart straddle the medial axis: the
//! point between them that is equidistant to both feet is a ridge sample, and
//! twice its distance is the local thickness of the shape.
//!
//! Ridge samples where the two feet face each other (the wedge between the
//! walls is narrower than the transition angle) are central and get their own
//! thickness. Other ridge samples, such as the bisectors leaving convex
//! corners, inherit the thickness of the deeper ridge they lead to. Every
//! other node takes the thickness of the first ridge node found walking away
//! from its foot.
//!
//! [`BeadLayouter`] turns a thickness into bead locations and widths,
//! blending between bead counts close to a transition thickness.

use super::beading::{Beading, BeadingStrategy};
use super::contour::SampleGrid;
use super::junction::ExtrusionJunction;
use super::line::ExtrusionLine;
use crate::edge_grid::EdgeGrid;
use crate::geometry::{polygons_bounding_box, PointF, Polygon};
use crate::{Coord, CoordF};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::f64::consts::PI;

/// Upper bound on sample nodes per island; the pitch grows to stay below it.
const MAX_NODES: usize = 4_000_000;

/// Feet closer than this many pitches are treated as the same boundary feature.
const RIDGE_SEPARATION: CoordF = 3.0;

/// Paired beads closer than this many pitches are printed as one center bead.
const MIN_PAIR_GAP: CoordF = 3.0;

/// Bead locations and widths for one thickness, outermost first.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Layout {
    pub locations: Vec<CoordF>,
    pub widths: Vec<CoordF>,
}

impl Layout {
    fn from_beading(beading: &Beading) -> Self {
        Self {
            locations: beading.toolpath_locations.iter().map(|v| *v as CoordF).collect(),
            widths: beading.bead_widths.iter().map(|v| *v as CoordF).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.widths.len()
    }

    /// Location and width of bead `i` when it has a mirrored partner.
    pub fn paired(&self, i: usize) -> Option<(CoordF, CoordF)> {
        (i < self.len() / 2).then(|| (self.locations[i], self.widths[i]))
    }

    /// Inset index and width of the unpaired center bead of an odd count.
    pub fn center(&self) -> Option<(usize, CoordF)> {
        let n = self.len();
        (n % 2 == 1).then(|| (n / 2, self.widths[n / 2]))
    }

    /// Expand `lo` to the bead count of `hi` and interpolate towards it.
    ///
    /// An odd `lo` splits its center bead into two half-width beads; an even
    /// `lo` gains a zero-width center bead.
    fn blend(lo: &Beading, hi: &Beading, lambda: CoordF, thickness: CoordF) -> Option<Self> {
        let mut layout = Self::from_beading(lo);
        let target = Self::from_beading(hi);
        if layout.len() + 1 != target.len() {
            return None;
        }
        let mid = layout.len() / 2;
        if layout.len() % 2 == 1 {
            let half_width = layout.widths[mid] / 2.0;
            layout.widths[mid] = half_width;
            layout.widths.insert(mid, half_width);
            layout.locations[mid] = thickness / 2.0;
            layout.locations.insert(mid, thickness / 2.0);
        } else {
            layout.widths.insert(mid, 0.0);
            layout.locations.insert(mid, thickness / 2.0);
        }
        for i in 0..layout.len() {
            layout.locations[i] += lambda * (target.locations[i] - layout.locations[i]);
            layout.widths[i] += lambda * (target.widths[i] - layout.widths[i]);
        }
        Some(layout)
    }

    /// Replace the innermost pair by one center bead of their combined width
    /// when the two lie less than `min_gap` apart.
    ///
    /// A pair that close encloses too few sample nodes to be traced as a loop.
    /// Zero-width marker pairs are kept.
    pub fn merge_close_pair(mut self, min_gap: CoordF) -> Self {
        let n = self.len();
        if n < 2 || n % 2 == 1 {
            return self;
        }
        let (inner, mirror) = (n / 2 - 1, n / 2);
        if self.widths[inner] <= 0.0 || self.widths[mirror] <= 0.0 {
            return self;
        }
        if self.locations[mirror] - self.locations[inner] >= min_gap {
            return self;
        }
        self.locations[inner] = (self.locations[inner] + self.locations[mirror]) / 2.0;
        self.widths[inner] += self.widths[mirror];
        self.locations.remove(mirror);
        self.widths.remove(mirror);
        self
    }
}

/// Bead layouts of one island, shared by all nodes of equal thickness.
#[derive(Debug)]
pub(crate) struct IslandLayouts {
    layouts: Vec<Layout>,
    of_node: Vec<usize>,
}

impl IslandLayouts {
    /// Layouts for every node of `field`, thickness rounded to whole units.
    pub fn build(field: &MedialField, layouter: &BeadLayouter<'_>) -> Self {
        let min_gap = MIN_PAIR_GAP * field.grid.pitch;
        let keys: BTreeSet<Coord> = field.thickness.par_iter().map(|t| t.round() as Coord).collect();
        let keys: Vec<Coord> = keys.into_iter().collect();
        let layouts = keys
            .par_iter()
            .map(|&t| layouter.layout(t as CoordF).merge_close_pair(min_gap))
            .collect();
        let of_node = field
            .thickness
            .par_iter()
            .map(|t| keys.binary_search(&(t.round() as Coord)).unwrap_or_else(|i| i.min(keys.len() - 1)))
            .collect();
        Self { layouts, of_node }
    }

    #[inline]
    pub fn get(&self, node: usize) -> &Layout {
        &self.layouts[self.of_node[node]]
    }
}

#[derive(Debug, Clone, Copy)]
struct TransitionBand {
    lower_bead_count: Coord,
    from: CoordF,
    to: CoordF,
}

/// Thickness to bead layout, with smooth transitions between counts.
#[derive(Debug)]
pub(crate) struct BeadLayouter<'a> {
    strategy: &'a dyn BeadingStrategy,
    bands: Vec<TransitionBand>,
    thickness_cap: CoordF,
}

impl<'a> BeadLayouter<'a> {
    /// Layouter for a strategy capped at `max_bead_count` beads.
    ///
    /// Around every transition thickness a band of width
    /// `transitioning_length * 2 sin(angle / 2)` is blended, split at the
    /// anchor position and clamped to half the distance to the neighbouring
    /// transitions.
    pub fn new(strategy: &'a dyn BeadingStrategy, max_bead_count: Coord) -> Self {
        let max_bead_count = max_bead_count.max(0);
        let slope = 2.0 * (strategy.transitioning_angle() / 2.0).sin();
        let thresholds: Vec<CoordF> = (0..=max_bead_count + 1)
            .map(|n| strategy.transition_thickness(n) as CoordF)
            .collect();

        let mut bands = Vec::new();
        for n in 0..=max_bead_count {
            let idx = n as usize;
            let threshold = thresholds[idx];
            let prev_gap = if idx == 0 { threshold } else { threshold - thresholds[idx - 1] };
            let next_gap = thresholds[idx + 1] - threshold;
            let delta = strategy.transitioning_length(n) as CoordF * slope;
            let anchor = strategy.transition_anchor_pos(n).clamp(0.0, 1.0);
            let from = threshold - (anchor * delta).min(prev_gap.max(0.0) / 2.0);
            let to = threshold + ((1.0 - anchor) * delta).min(next_gap.max(0.0) / 2.0);
            if to > from {
                bands.push(TransitionBand {
                    lower_bead_count: n,
                    from,
                    to,
                });
            }
        }
        let last_threshold = thresholds[max_bead_count as usize];
        let thickness_cap = bands
            .last()
            .map_or(last_threshold, |b| b.to.max(last_threshold))
            + 50.0;
        Self {
            strategy,
            bands,
            thickness_cap,
        }
    }

    /// Thickness beyond which the layout no longer changes.
    pub fn thickness_cap(&self) -> CoordF {
        self.thickness_cap
    }

    /// Layout for a local thickness.
    pub fn layout(&self, thickness: CoordF) -> Layout {
        let thickness = thickness.clamp(0.0, self.thickness_cap);
        let t = thickness.round() as Coord;
        if let Some(band) = self
            .bands
            .iter()
            .find(|b| thickness > b.from && thickness < b.to)
        {
            let lambda = (thickness - band.from) / (band.to - band.from);
            let lo = self.strategy.compute(t, band.lower_bead_count);
            let hi = self.strategy.compute(t, band.lower_bead_count + 1);
            if let Some(layout) = Layout::blend(&lo, &hi, lambda, thickness) {
                return layout;
            }
        }
        let count = self.strategy.optimal_bead_count(t);
        Layout::from_beading(&self.strategy.compute(t, count))
    }
}

/// Tunables of the thickness field.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MedialParams {
    /// Requested grid pitch.
    pub pitch: CoordF,
    /// Wedge angle below which a ridge is central.
    pub transition_angle: CoordF,
    /// Ridge runs shorter than this may be merged with their neighbours.
    pub filter_distance: CoordF,
    /// Allowed thickness change when merging a short run.
    pub filter_deviation: CoordF,
    /// Thickness assigned to regions wider than any layout change.
    pub thickness_cap: CoordF,
}

/// Point on the medial axis, found between two grid nodes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RidgeSample {
    pub point: PointF,
    pub radius: CoordF,
    pub central: bool,
    /// Node on whose edge the sample was found.
    pub node: usize,
}

/// Sampled distance and thickness of one island.
#[derive(Debug)]
pub(crate) struct MedialField {
    pub grid: SampleGrid,
    /// Signed distance to the outline, positive inside.
    pub distance: Vec<CoordF>,
    pub inside: Vec<bool>,
    /// Local thickness per node.
    pub thickness: Vec<CoordF>,
    pub ridge: Vec<RidgeSample>,
}

impl MedialField {
    /// Sample the island bounded by `polygons`. Returns `None` for empty input.
    pub fn build(polygons: &[Polygon], params: &MedialParams, strategy: &dyn BeadingStrategy) -> Option<Self> {
        let bbox = polygons_bounding_box(polygons);
        if !bbox.is_defined() || bbox.width() <= 0 || bbox.height() <= 0 {
            return None;
        }
        let grid = Self::make_grid(bbox.min.to_f64(), bbox.max.to_f64(), params.pitch);
        let pitch = grid.pitch;
        let radius_cap = params.thickness_cap / 2.0 + 2.0 * pitch;
        let search_radius = radius_cap + 2.0 * pitch;

        let resolution = (search_radius / 4.0).max(4.0 * pitch).round() as Coord;
        let edges = EdgeGrid::from_polygons(polygons, resolution.max(1));

        let rows: Vec<Vec<(bool, CoordF, Option<PointF>)>> = (0..grid.rows)
            .into_par_iter()
            .map(|row| Self::sample_row(&grid, row, &edges, search_radius))
            .collect();
        let n = grid.len();
        let mut inside = Vec::with_capacity(n);
        let mut distance = Vec::with_capacity(n);
        let mut feet = Vec::with_capacity(n);
        for (is_inside, d, foot) in rows.into_iter().flatten() {
            inside.push(is_inside);
            distance.push(d);
            feet.push(foot);
        }

        let (ridge, ridge_of_node) = Self::find_ridge(&grid, &inside, &feet, params.transition_angle);
        let mut field = Self {
            grid,
            distance,
            inside,
            thickness: vec![0.0; n],
            ridge,
        };
        let ridge_thickness = field.ridge_thickness(&ridge_of_node, params, radius_cap, strategy);
        field.thickness = field.propagate_thickness(&feet, &ridge_thickness, params.thickness_cap, radius_cap);
        Some(field)
    }

    fn make_grid(min: PointF, max: PointF, requested_pitch: CoordF) -> SampleGrid {
        let mut pitch = requested_pitch.max(1.0);
        loop {
            let margin = 2.0 * pitch;
            let cols = ((max.x - min.x + 2.0 * margin) / pitch).ceil() as usize + 1;
            let rows = ((max.y - min.y + 2.0 * margin) / pitch).ceil() as usize + 1;
            if cols * rows <= MAX_NODES {
                return SampleGrid {
                    origin: PointF::new(min.x - margin, min.y - margin),
                    pitch,
                    cols,
                    rows,
                };
            }
            pitch *= ((cols * rows) as CoordF / MAX_NODES as CoordF).sqrt() * 1.05;
        }
    }

    /// Inside test by scanline parity and the distance to the closest edge.
    fn sample_row(
        grid: &SampleGrid,
        row: usize,
        edges: &EdgeGrid,
        search_radius: CoordF,
    ) -> Vec<(bool, CoordF, Option<PointF>)> {
        let y = grid.origin.y + row as CoordF * grid.pitch;
        let mut crossings: Vec<CoordF> = edges
            .closed_segments_near_row(y)
            .into_iter()
            .map(|l| (l.a.to_f64(), l.b.to_f64()))
            .filter(|(a, b)| (a.y > y) != (b.y > y))
            .map(|(a, b)| a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y))
            .collect();
        crossings.sort_by(|a, b| a.total_cmp(b));

        let mut passed = 0;
        (0..grid.cols)
            .map(|col| {
                let p = PointF::new(grid.origin.x + col as CoordF * grid.pitch, y);
                while passed < crossings.len() && crossings[passed] < p.x {
                    passed += 1;
                }
                let is_inside = passed % 2 == 1;
                let closest = edges.closest_point_f(p, search_radius);
                let d = closest.map_or(search_radius, |c| c.distance);
                (is_inside, if is_inside { d } else { -d }, closest.map(|c| c.foot))
            })
            .collect()
    }

    /// Ridge samples between neighbouring inside nodes with distant feet.
    ///
    /// Rows are scanned in parallel; samples keep row-major node order.
    fn find_ridge(
        grid: &SampleGrid,
        inside: &[bool],
        feet: &[Option<PointF>],
        transition_angle: CoordF,
    ) -> (Vec<RidgeSample>, Vec<Option<usize>>) {
        let found: Vec<Vec<(RidgeSample, usize)>> = (0..grid.rows)
            .into_par_iter()
            .map(|row| Self::ridge_in_row(grid, row, inside, feet, transition_angle))
            .collect();

        let mut ridge: Vec<RidgeSample> = Vec::new();
        let mut ridge_of_node: Vec<Option<usize>> = vec![None; grid.len()];
        for (sample, other) in found.into_iter().flatten() {
            let sample_idx = ridge.len();
            ridge.push(sample);
            for node in [sample.node, other] {
                let node_pos = grid.position(node);
                let closer = match ridge_of_node[node] {
                    Some(existing) => sample.point.distance(&node_pos) < ridge[existing].point.distance(&node_pos),
                    None => true,
                };
                if closer {
                    ridge_of_node[node] = Some(sample_idx);
                }
            }
        }
        (ridge, ridge_of_node)
    }

    /// Ridge samples on the edges leaving the nodes of one row to the right
    /// and upwards, each with the node across the edge.
    fn ridge_in_row(
        grid: &SampleGrid,
        row: usize,
        inside: &[bool],
        feet: &[Option<PointF>],
        transition_angle: CoordF,
    ) -> Vec<(RidgeSample, usize)> {
        let min_separation = RIDGE_SEPARATION * grid.pitch;
        let mut found = Vec::new();
        for col in 0..grid.cols {
            let idx = grid.index(col, row);
            if !inside[idx] {
                continue;
            }
            let Some(fp) = feet[idx] else {
                continue;
            };
            let right = (col + 1 < grid.cols).then(|| grid.index(col + 1, row));
            let up = (row + 1 < grid.rows).then(|| grid.index(col, row + 1));
            for q in [right, up].into_iter().flatten() {
                if !inside[q] {
                    continue;
                }
                let Some(fq) = feet[q] else {
                    continue;
                };
                if fp.distance(&fq) <= min_separation {
                    continue;
                }
                let p_pos = grid.position(idx);
                let dir = grid.position(q) - p_pos;
                let denom = 2.0 * dir.dot(&(fq - fp));
                if denom.abs() < 1e-9 {
                    continue;
                }
                let t = (((p_pos - fq).length_squared() - (p_pos - fp).length_squared()) / denom).clamp(0.0, 1.0);
                let m = p_pos + dir * t;
                let r1 = m.distance(&fp);
                let r2 = m.distance(&fq);
                if r1 < 1e-6 || r2 < 1e-6 {
                    continue;
                }
                let u1 = (m - fp) / r1;
                let u2 = (m - fq) / r2;
                let wedge = PI - u1.dot(&u2).clamp(-1.0, 1.0).acos();
                let sample = RidgeSample {
                    point: m,
                    radius: (r1 + r2) / 2.0,
                    central: wedge <= transition_angle,
                    node: idx,
                };
                found.push((sample, q));
            }
        }
        found
    }

    /// Thickness of every ridge node.
    fn ridge_thickness(
        &self,
        ridge_of_node: &[Option<usize>],
        params: &MedialParams,
        radius_cap: CoordF,
        strategy: &dyn BeadingStrategy,
    ) -> Vec<Option<CoordF>> {
        let cap = params.thickness_cap;
        let pitch = self.grid.pitch;
        let mut thickness: Vec<Option<CoordF>> = vec![None; self.grid.len()];
        let mut pending = Vec::new();
        let radius_of = |node: usize| ridge_of_node[node].map_or(0.0, |s| self.ridge[s].radius);

        for (node, sample) in ridge_of_node.iter().enumerate() {
            let Some(sample) = sample.map(|s| self.ridge[s]) else {
                continue;
            };
            if sample.radius >= radius_cap - pitch {
                thickness[node] = Some(cap);
            } else if sample.central {
                thickness[node] = Some((2.0 * sample.radius).min(cap));
            } else {
                pending.push(node);
            }
        }

        self.filter_transitions(ridge_of_node, &mut thickness, params, strategy);

        // Deepest first, so every node can inherit from an already resolved one.
        pending.sort_by(|a, b| radius_of(*b).total_cmp(&radius_of(*a)).then(a.cmp(b)));
        for node in pending {
            let radius = radius_of(node);
            let mut best: Option<(CoordF, CoordF)> = None;
            for other in self.grid.neighbours(node, 2) {
                let (Some(_), Some(t)) = (ridge_of_node[other], thickness[other]) else {
                    continue;
                };
                let other_radius = radius_of(other);
                if other_radius >= radius && best.map_or(true, |(r, _)| other_radius > r) {
                    best = Some((other_radius, t));
                }
            }
            thickness[node] = Some(best.map_or((2.0 * radius).min(cap), |(_, t)| t));
        }
        thickness
    }

    /// Merge short runs of one bead count into the surrounding count when
    /// their thickness stays close to the transition between the two.
    fn filter_transitions(
        &self,
        ridge_of_node: &[Option<usize>],
        thickness: &mut [Option<CoordF>],
        params: &MedialParams,
        strategy: &dyn BeadingStrategy,
    ) {
        let is_central = |node: usize| {
            ridge_of_node[node].map_or(false, |s| self.ridge[s].central) && thickness[node].is_some()
        };
        let count_of = |t: CoordF| strategy.optimal_bead_count(t.round() as Coord);
        let mut component_of: Vec<Option<usize>> = vec![None; self.grid.len()];
        let mut components: Vec<Vec<usize>> = Vec::new();
        let mut merged: Vec<(usize, CoordF)> = Vec::new();

        for start in 0..self.grid.len() {
            if component_of[start].is_some() || !is_central(start) {
                continue;
            }
            let Some(start_t) = thickness[start] else {
                continue;
            };
            let count = count_of(start_t);
            let id = components.len();
            let mut members = vec![start];
            component_of[start] = Some(id);
            let mut queue = VecDeque::from([start]);
            while let Some(node) = queue.pop_front() {
                for other in self.grid.neighbours(node, 1) {
                    if component_of[other].is_some() || !is_central(other) {
                        continue;
                    }
                    if thickness[other].map(count_of) == Some(count) {
                        component_of[other] = Some(id);
                        members.push(other);
                        queue.push_back(other);
                    }
                }
            }
            components.push(members);
        }

        for (id, members) in components.iter().enumerate() {
            let Some(count) = thickness[members[0]].map(count_of) else {
                continue;
            };
            let (mut min, mut max) = (
                PointF::new(CoordF::MAX, CoordF::MAX),
                PointF::new(CoordF::MIN, CoordF::MIN),
            );
            for &node in members {
                let p = self.grid.position(node);
                min = PointF::new(min.x.min(p.x), min.y.min(p.y));
                max = PointF::new(max.x.max(p.x), max.y.max(p.y));
            }
            if max.distance(&min) >= params.filter_distance {
                continue;
            }

            let mut neighbour_counts = BTreeSet::new();
            let mut neighbour_thickness: BTreeMap<Coord, Vec<CoordF>> = BTreeMap::new();
            for &node in members {
                for other in self.grid.neighbours(node, 1) {
                    if component_of[other].map_or(true, |c| c == id) || !is_central(other) {
                        continue;
                    }
                    if let Some(t) = thickness[other] {
                        let other_count = count_of(t);
                        neighbour_counts.insert(other_count);
                        neighbour_thickness.entry(other_count).or_default().push(t);
                    }
                }
            }
            if neighbour_counts.len() != 1 {
                continue;
            }
            let Some((&other_count, values)) = neighbour_thickness.iter().next() else {
                continue;
            };
            let threshold = strategy.transition_thickness(count.min(other_count)) as CoordF;
            let close_to_threshold = members.iter().all(|&node| {
                thickness[node].map_or(false, |t| (t - threshold).abs() <= 2.0 * params.filter_deviation)
            });
            if !close_to_threshold || values.is_empty() {
                continue;
            }
            let replacement = values.iter().sum::<CoordF>() / values.len() as CoordF;
            log::trace!(
                "merging {} ridge nodes of {count} beads into {other_count} beads",
                members.len()
            );
            merged.extend(members.iter().map(|&node| (node, replacement)));
        }

        for (node, replacement) in merged {
            thickness[node] = Some(replacement);
        }
    }

    /// Thickness for every node: ridge nodes keep their own, inside nodes walk
    /// away from their foot until they meet the ridge.
    fn propagate_thickness(
        &self,
        feet: &[Option<PointF>],
        ridge_thickness: &[Option<CoordF>],
        cap: CoordF,
        radius_cap: CoordF,
    ) -> Vec<CoordF> {
        let grid = &self.grid;
        let pitch = grid.pitch;
        let walked: Vec<Option<CoordF>> = (0..grid.len())
            .into_par_iter()
            .map(|idx| {
                if !self.inside[idx] {
                    return None;
                }
                if let Some(t) = ridge_thickness[idx] {
                    return Some(t);
                }
                let d0 = self.distance[idx];
                if d0 >= radius_cap {
                    return Some(cap);
                }
                let p = grid.position(idx);
                let foot = feet[idx]?;
                let dir = p - foot;
                let len = dir.length();
                if len < 1e-9 {
                    return None;
                }
                let u = dir / len;
                let step = pitch / 2.0;
                let limit = radius_cap + 2.0 * pitch - d0;
                let mut max_distance = d0;
                let mut s = step;
                while s <= limit {
                    let Some(node) = grid.nearest(p + u * s) else {
                        break;
                    };
                    if !self.inside[node] {
                        break;
                    }
                    if let Some(t) = ridge_thickness[node] {
                        return Some(t);
                    }
                    let d = self.distance[node];
                    if d >= radius_cap {
                        return Some(cap);
                    }
                    max_distance = max_distance.max(d);
                    s += step;
                }
                if s > limit {
                    Some(cap)
                } else {
                    Some((2.0 * max_distance).min(cap))
                }
            })
            .collect();

        (0..grid.len())
            .map(|idx| match walked[idx] {
                Some(t) => t,
                None => {
                    let from_neighbours = grid
                        .neighbours(idx, 1)
                        .filter_map(|n| walked[n])
                        .fold(None, |acc: Option<CoordF>, t| Some(acc.map_or(t, |a| a.max(t))));
                    from_neighbours.unwrap_or_else(|| (2.0 * self.distance[idx].max(0.0)).min(cap))
                }
            })
            .collect()
    }
}

/// A ridge point carrying an odd center bead.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CenterPoint {
    pub point: PointF,
    pub width: CoordF,
    pub inset_idx: usize,
}

/// Chain center bead points into open or closed odd lines.
///
/// Points are merged per grid cell of size `cell`; chains follow the best
/// aligned neighbouring cell of the same inset and swallow side cells so a
/// ridge band two cells thick yields a single line.
pub(crate) fn trace_center_lines(points: &[CenterPoint], cell: CoordF) -> Vec<ExtrusionLine> {
    #[derive(Default, Clone, Copy)]
    struct Bucket {
        sum: PointF,
        width: CoordF,
        count: usize,
    }
    let mut buckets: BTreeMap<(usize, i64, i64), Bucket> = BTreeMap::new();
    for p in points {
        let key = (
            p.inset_idx,
            (p.point.y / cell).floor() as i64,
            (p.point.x / cell).floor() as i64,
        );
        let bucket = buckets.entry(key).or_default();
        bucket.sum = bucket.sum + p.point;
        bucket.width += p.width;
        bucket.count += 1;
    }
    let keys: Vec<(usize, i64, i64)> = buckets.keys().copied().collect();
    let index: BTreeMap<(usize, i64, i64), usize> = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let centers: Vec<(PointF, CoordF)> = keys
        .iter()
        .filter_map(|k| buckets.get(k))
        .map(|b| (b.sum / b.count as CoordF, b.width / b.count as CoordF))
        .collect();
    let adjacency: Vec<Vec<usize>> = keys
        .iter()
        .map(|&(k, y, x)| {
            let mut adj = Vec::new();
            for dy in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    if let Some(&n) = index.get(&(k, y + dy, x + dx)) {
                        adj.push(n);
                    }
                }
            }
            adj
        })
        .collect();

    let mut order: Vec<usize> = (0..keys.len()).collect();
    // Chain ends first, so open lines are traced from one end.
    order.sort_by_key(|&i| (adjacency[i].len() > 1, i));

    let mut visited = vec![false; keys.len()];
    let mut lines = Vec::new();
    for start in order {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut chain = vec![start];
        let mut direction: Option<PointF> = None;
        loop {
            let Some(&current) = chain.last() else {
                break;
            };
            let candidates: Vec<usize> = adjacency[current].iter().copied().filter(|&n| !visited[n]).collect();
            let here = centers[current].0;
            let pick = candidates.iter().copied().max_by(|&a, &b| {
                let score = |n: usize| {
                    let d = centers[n].0 - here;
                    let len = d.length().max(1e-9);
                    match direction {
                        Some(dir) => dir.dot(&(d / len)),
                        None => -len,
                    }
                };
                score(a).total_cmp(&score(b)).then(b.cmp(&a))
            });
            let Some(next) = pick else {
                break;
            };
            visited[next] = true;
            for &side in &candidates {
                if side != next && adjacency[next].contains(&side) {
                    visited[side] = true;
                }
            }
            let step = centers[next].0 - here;
            let len = step.length();
            if len > 1e-9 {
                direction = Some(step / len);
            }
            chain.push(next);
        }
        if chain.len() < 2 {
            continue;
        }
        let closed = chain.len() >= 4
            && chain
                .last()
                .map_or(false, |last| adjacency[*last].contains(&start));
        let inset_idx = keys[start].0;
        let junctions = chain
            .iter()
            .map(|&i| {
                let (p, w) = centers[i];
                ExtrusionJunction::new(p.to_point(), w.round() as Coord, inset_idx)
            })
            .collect();
        lines.push(ExtrusionLine::from_junctions(junctions, inset_idx, true, closed));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::super::beading::BeadingStrategyFactory;
    use super::*;
    use crate::config::WallSettings;
    use crate::geometry::Point;

    fn strategy(walls: usize) -> Box<dyn BeadingStrategy> {
        BeadingStrategyFactory::make_strategy(&WallSettings::default(), 2 * walls as Coord, false)
    }

    fn params(layouter: &BeadLayouter<'_>) -> MedialParams {
        MedialParams {
            pitch: 40.0,
            transition_angle: 10f64.to_radians(),
            filter_distance: 100_000.0,
            filter_deviation: 100.0,
            thickness_cap: layouter.thickness_cap(),
        }
    }

    #[test]
    fn test_layout_outside_bands_matches_strategy() {
        let s = strategy(3);
        let layouter = BeadLayouter::new(s.as_ref(), 6);
        let layout = layouter.layout(1200.0);
        assert_eq!(layout.widths, vec![400.0, 400.0, 400.0]);
        assert_eq!(layout.center(), Some((1, 400.0)));
        assert_eq!(layout.paired(0), Some((200.0, 400.0)));
        assert_eq!(layout.paired(1), None);
    }

    #[test]
    fn test_layout_wide_has_markers() {
        let s = strategy(3);
        let layouter = BeadLayouter::new(s.as_ref(), 6);
        let layout = layouter.layout(layouter.thickness_cap());
        assert_eq!(layout.len(), 8);
        assert_eq!(layout.paired(2), Some((1000.0, 400.0)));
        assert_eq!(layout.paired(3), Some((1200.0, 0.0)));
    }

    #[test]
    fn test_layout_blends_across_split() {
        let s = strategy(3);
        let layouter = BeadLayouter::new(s.as_ref(), 6);
        let threshold = s.transition_thickness(1) as CoordF;
        let below = layouter.layout(threshold - 15.0);
        let above = layouter.layout(threshold + 15.0);
        // Inside the band both sides already have the higher count.
        assert_eq!(below.len(), 2);
        assert_eq!(above.len(), 2);
        let (loc_below, _) = below.paired(0).unwrap_or_default();
        let (loc_above, _) = above.paired(0).unwrap_or_default();
        assert!(loc_below > loc_above - 30.0 && loc_below > 0.0);
        assert!(loc_below <= threshold / 2.0);
    }

    fn band_start(layouter: &BeadLayouter<'_>, lower_bead_count: Coord) -> CoordF {
        layouter
            .bands
            .iter()
            .find(|b| b.lower_bead_count == lower_bead_count)
            .map(|b| b.from)
            .unwrap()
    }

    #[test]
    fn test_split_center_bead_stays_single_until_separated() {
        let s = strategy(3);
        let layouter = BeadLayouter::new(s.as_ref(), 6);
        let blended = layouter.layout(band_start(&layouter, 1) + 2.0);
        assert_eq!(blended.len(), 2);
        let merged = blended.clone().merge_close_pair(120.0);
        assert_eq!(merged.len(), 1);
        let (inset, width) = merged.center().unwrap();
        assert_eq!(inset, 0);
        assert!((width - blended.widths.iter().sum::<CoordF>()).abs() < 1e-9);

        let blended = layouter.layout(band_start(&layouter, 3) + 2.0);
        assert_eq!(blended.len(), 4);
        let merged = blended.clone().merge_close_pair(120.0);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.paired(0), blended.paired(0));
        assert_eq!(merged.center().map(|(inset, _)| inset), Some(1));

        // Far enough apart to trace as a loop.
        let apart = layouter.layout(1000.0);
        assert_eq!(apart.clone().merge_close_pair(120.0), apart);
    }

    #[test]
    fn test_marker_pair_is_never_merged() {
        let s = strategy(3);
        let layouter = BeadLayouter::new(s.as_ref(), 6);
        let wide = layouter.layout(layouter.thickness_cap());
        assert_eq!(wide.clone().merge_close_pair(1e6), wide);
    }

    #[test]
    fn test_island_layouts_share_equal_thickness() {
        let s = strategy(3);
        let layouter = BeadLayouter::new(s.as_ref(), 6);
        let strip = Polygon::rectangle(Point::new(0, 0), Point::new(8000, 660));
        let field = MedialField::build(&[strip], &params(&layouter), s.as_ref()).unwrap();
        let layouts = IslandLayouts::build(&field, &layouter);
        assert!(layouts.layouts.len() < field.grid.len() / 10);
        let mid = field.grid.nearest(PointF::new(4000.0, 330.0)).unwrap();
        let expected = layouter
            .layout(field.thickness[mid].round())
            .merge_close_pair(MIN_PAIR_GAP * field.grid.pitch);
        assert_eq!(layouts.get(mid), &expected);
        // Inside the split band the strip prints one center bead, not a lost pair.
        assert_eq!(layouts.get(mid).center().map(|(inset, _)| inset), Some(0));
    }

    #[test]
    fn test_strip_thickness_field() {
        let s = strategy(3);
        let layouter = BeadLayouter::new(s.as_ref(), 6);
        let strip = Polygon::rectangle(Point::new(0, 0), Point::new(8000, 600));
        let field = MedialField::build(&[strip], &params(&layouter), s.as_ref()).unwrap();
        assert!(field.ridge.iter().any(|r| r.central));
        let mid = field
            .grid
            .nearest(PointF::new(4000.0, 200.0))
            .unwrap();
        assert!(field.inside[mid]);
        assert!((field.thickness[mid] - 600.0).abs() < 20.0, "{}", field.thickness[mid]);
    }

    #[test]
    fn test_square_is_wide_in_the_middle() {
        let s = strategy(3);
        let layouter = BeadLayouter::new(s.as_ref(), 6);
        let square = Polygon::rectangle(Point::new(0, 0), Point::new(6000, 6000));
        let field = MedialField::build(&[square], &params(&layouter), s.as_ref()).unwrap();
        let near_edge = field.grid.nearest(PointF::new(3000.0, 100.0)).unwrap();
        assert!((field.thickness[near_edge] - layouter.thickness_cap()).abs() < 1e-6);
        let near_corner = field.grid.nearest(PointF::new(300.0, 150.0)).unwrap();
        assert!((field.thickness[near_corner] - layouter.thickness_cap()).abs() < 1e-6);
    }

    #[test]
    fn test_center_line_tracing() {
        let points: Vec<CenterPoint> = (0..50)
            .map(|i| CenterPoint {
                point: PointF::new(i as CoordF * 20.0, 300.0),
                width: 500.0,
                inset_idx: 0,
            })
            .collect();
        let lines = trace_center_lines(&points, 40.0);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert!(line.is_odd && !line.is_closed);
        assert!(line.length() > 900.0);
        assert!(line.iter().all(|j| j.width == 500));
    }
}
