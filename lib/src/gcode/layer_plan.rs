//! Per-layer motion planning.
//!
//! A [`LayerPlan`] collects every move of one layer, grouped per extruder in
//! [`ExtruderPlan`]s. Consecutive moves sharing a config and modifiers merge
//! into one [`GCodePath`]. Travels are routed through the comb boundary when
//! combing is on and decide retraction and z-hop on the way. Walls print
//! with variable width and slow down around bridges.
//!
//! Once everything is planned, [`LayerPlan::process_fan_speed_and_minimal_layer_time`]
//! settles cooling and [`LayerPlan::finalize`] resolves coasting and speeds
//! into a [`FinalizedLayer`].

use serde::{Deserialize, Serialize};

use crate::clipper::{self, OffsetJoinType};
use crate::config::CombingMode;
use crate::geometry::{polygons_contain_point, BoundingBox, Point, Polygon, Polygons, Polyline};
use crate::perimeter::ExtrusionLine;
use crate::pipeline::SliceContext;
use crate::travel::{Comb, CombConfig, CombPaths};
use crate::{scale, Coord, CoordF};

use super::extruder_plan::{ExtruderPlan, PlanInsert, PlanInsertCommand};
use super::path::{GCodePath, GCodePathConfig, PrintFeatureType, SpaceFillType};
use super::path_order::{OrderedPath, PathOrderOptimizer};
use super::time_estimate::TimeMaterialEstimates;

/// Segments shorter than this (squared) are not printed.
const MINIMUM_SQUARED_LINE_LENGTH: i128 = 25;
/// Bridge coasting never acts on more volume than this.
const MAX_NON_BRIDGE_LINE_VOLUME: CoordF = 100_000.0;
const MIN_LINE_LENGTH: Coord = 5;
/// Length of the segments used to speed up again after a bridge.
const ACCELERATION_SEGMENT_LENGTH: Coord = 1_000;
const ACCELERATION_FACTOR: CoordF = 0.75;
/// Maximum distance a travel start is pulled into the comb boundary.
const MAX_MOVE_INSIDE_DISTANCE: Coord = 2_000;
/// Travels whose coasting distance is shorter than this are left alone.
const MIN_COAST_DISTANCE: CoordF = 100.0;

/// Outline areas of one layer that drive the comb boundary.
#[derive(Debug, Clone, Default)]
pub struct LayerGeometry {
    /// Outlines of every part.
    pub outline: Polygons,
    /// Area inside the innermost walls (skin and infill).
    pub inner_area: Polygons,
    pub infill_area: Polygons,
    /// Top-most and bottom-most skin.
    pub outer_surface_fill: Polygons,
    /// Raft outline, used on raft layers.
    pub raft_outline: Polygons,
}

impl LayerGeometry {
    /// Geometry of a layer with only outlines known.
    ///
    /// The inner and infill areas default to the outline itself.
    pub fn from_outline(outline: Polygons) -> Self {
        Self {
            inner_area: outline.clone(),
            infill_area: outline.clone(),
            outline,
            ..Self::default()
        }
    }

    pub fn with_inner_area(mut self, inner_area: Polygons) -> Self {
        self.inner_area = inner_area;
        self
    }

    pub fn with_infill_area(mut self, infill_area: Polygons) -> Self {
        self.infill_area = infill_area;
        self
    }

    pub fn with_outer_surface_fill(mut self, fill: Polygons) -> Self {
        self.outer_surface_fill = fill;
        self
    }

    pub fn with_raft_outline(mut self, raft_outline: Polygons) -> Self {
        self.raft_outline = raft_outline;
        self
    }
}

/// How an extrusion deviates from its config.
///
/// Moves only merge into the current path when these match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrusionModifiers {
    pub space_fill_type: SpaceFillType,
    /// Flow ratio on top of the config flow.
    pub flow: CoordF,
    /// Actual line width relative to the config line width.
    pub width_factor: CoordF,
    pub spiralize: bool,
    pub speed_factor: CoordF,
    /// Fan speed (%) while printing, `None` follows the plan.
    pub fan_speed: Option<CoordF>,
}

impl Default for ExtrusionModifiers {
    fn default() -> Self {
        Self {
            space_fill_type: SpaceFillType::None,
            flow: 1.0,
            width_factor: 1.0,
            spiralize: false,
            speed_factor: 1.0,
            fan_speed: None,
        }
    }
}

impl ExtrusionModifiers {
    pub fn new(space_fill_type: SpaceFillType) -> Self {
        Self {
            space_fill_type,
            ..Self::default()
        }
    }

    pub fn with_flow(mut self, flow: CoordF) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_width_factor(mut self, width_factor: CoordF) -> Self {
        self.width_factor = width_factor;
        self
    }

    pub fn with_speed_factor(mut self, speed_factor: CoordF) -> Self {
        self.speed_factor = speed_factor;
        self
    }

    pub fn with_spiralize(mut self, spiralize: bool) -> Self {
        self.spiralize = spiralize;
        self
    }

    pub fn with_fan_speed(mut self, fan_speed: Option<CoordF>) -> Self {
        self.fan_speed = fan_speed;
        self
    }
}

/// Running state while a wall crosses bridges.
#[derive(Debug, Clone, Copy)]
struct BridgeState {
    /// Volume printed since the last bridge, scaled by speed.
    non_bridge_line_volume: CoordF,
    speed_factor: CoordF,
    /// Distance left until the next bridge starts, 0 when none follows.
    distance_to_bridge_start: CoordF,
}

impl BridgeState {
    fn new() -> Self {
        Self {
            non_bridge_line_volume: MAX_NON_BRIDGE_LINE_VOLUME,
            speed_factor: 1.0,
            distance_to_bridge_start: 0.0,
        }
    }
}

/// Every move of one layer, grouped per extruder.
#[derive(Debug)]
pub struct LayerPlan<'a> {
    ctx: &'a SliceContext,
    layer_nr: i64,
    z: Coord,
    layer_thickness: Coord,
    travel_config: GCodePathConfig,
    /// Never empty.
    extruder_plans: Vec<ExtruderPlan>,
    last_extruder_previous_layer: usize,
    start_position: Point,
    last_planned_position: Option<Point>,
    first_travel_destination: Option<(Point, bool)>,
    was_inside: bool,
    is_inside: bool,
    current_mesh: Option<usize>,
    comb_boundary_minimum: Polygons,
    comb_boundary_preferred: Polygons,
    comb: Option<Comb>,
    bridge_wall_mask: Polygons,
    overhang_mask: Polygons,
}

impl<'a> LayerPlan<'a> {
    /// Plan for layer `layer_nr` at height `z`, starting with `start_extruder`.
    ///
    /// Raft layers have negative numbers. The comb boundaries are computed
    /// from `geometry` up front.
    pub fn new(
        ctx: &'a SliceContext,
        layer_nr: i64,
        z: Coord,
        layer_thickness: Coord,
        start_extruder: usize,
        geometry: &LayerGeometry,
    ) -> Self {
        let nozzle_size = ctx.machine.extruder(start_extruder).nozzle_size;
        let outer_wall_width = ctx.walls.wall_line_width_0;
        let comb_boundary_minimum = compute_comb_boundary(
            ctx,
            layer_nr,
            geometry,
            -(nozzle_size / 2 + 100 + outer_wall_width / 2),
        );
        let comb_boundary_preferred =
            compute_comb_boundary(ctx, layer_nr, geometry, -(nozzle_size * 3 / 2 + outer_wall_width / 2));
        let comb = (ctx.combing.mode != CombingMode::Off).then(|| {
            Comb::new(
                &comb_boundary_minimum,
                &comb_boundary_preferred,
                CombConfig::from_settings(&ctx.combing, innermost_wall_width(ctx)),
            )
        });
        log::trace!(
            "layer {layer_nr}: comb boundary with {} minimum and {} preferred polygons",
            comb_boundary_minimum.len(),
            comb_boundary_preferred.len()
        );

        let mut plan = Self {
            ctx,
            layer_nr,
            z,
            layer_thickness,
            travel_config: GCodePathConfig::travel(
                ctx.planning.travel_speed,
                ctx.machine.acceleration,
                ctx.machine.max_xy_jerk,
            ),
            extruder_plans: Vec::new(),
            last_extruder_previous_layer: start_extruder,
            start_position: Point::zero(),
            last_planned_position: None,
            first_travel_destination: None,
            was_inside: true,
            is_inside: false,
            current_mesh: None,
            comb_boundary_minimum,
            comb_boundary_preferred,
            comb,
            bridge_wall_mask: Polygons::new(),
            overhang_mask: Polygons::new(),
        };
        let first = plan.make_extruder_plan(start_extruder);
        plan.extruder_plans.push(first);
        plan
    }

    /// Builder method: position used before anything was planned.
    pub fn with_start_position(mut self, position: Point) -> Self {
        self.start_position = position;
        self
    }

    /// Builder method: extruder that ended the previous layer.
    pub fn with_last_extruder_previous_layer(mut self, extruder_nr: usize) -> Self {
        self.last_extruder_previous_layer = extruder_nr;
        self
    }

    pub fn layer_nr(&self) -> i64 {
        self.layer_nr
    }

    pub fn z(&self) -> Coord {
        self.z
    }

    pub fn layer_thickness(&self) -> Coord {
        self.layer_thickness
    }

    /// Extruder currently planned for.
    pub fn extruder(&self) -> usize {
        self.current_plan().extruder_nr()
    }

    pub fn extruder_plans(&self) -> &[ExtruderPlan] {
        &self.extruder_plans
    }

    pub fn last_planned_position(&self) -> Option<Point> {
        self.last_planned_position
    }

    /// Last planned position, or the layer start position when nothing moved yet.
    pub fn last_planned_position_or_start(&self) -> Point {
        self.last_planned_position.unwrap_or(self.start_position)
    }

    /// Destination of the first travel and whether it ended inside a part.
    pub fn first_travel_destination(&self) -> Option<(Point, bool)> {
        self.first_travel_destination
    }

    pub fn comb_boundary_minimum(&self) -> &[Polygon] {
        &self.comb_boundary_minimum
    }

    pub fn comb_boundary_preferred(&self) -> &[Polygon] {
        &self.comb_boundary_preferred
    }

    pub fn travel_config(&self) -> &GCodePathConfig {
        &self.travel_config
    }

    /// Whether the upcoming moves happen inside a part.
    pub fn set_is_inside(&mut self, is_inside: bool) {
        self.is_inside = is_inside;
    }

    /// Mesh the upcoming paths belong to.
    pub fn set_mesh(&mut self, mesh: Option<usize>) {
        self.current_mesh = mesh;
    }

    /// Regions where walls print as bridges.
    pub fn set_bridge_wall_mask(&mut self, mask: Polygons) {
        self.bridge_wall_mask = mask;
    }

    /// Regions where walls overhang the layer below.
    pub fn set_overhang_mask(&mut self, mask: Polygons) {
        self.overhang_mask = mask;
    }

    pub fn overhang_mask(&self) -> &[Polygon] {
        &self.overhang_mask
    }

    fn current_plan(&self) -> &ExtruderPlan {
        &self.extruder_plans[self.extruder_plans.len() - 1]
    }

    fn current_plan_mut(&mut self) -> &mut ExtruderPlan {
        let last = self.extruder_plans.len() - 1;
        &mut self.extruder_plans[last]
    }

    fn make_extruder_plan(&self, extruder_nr: usize) -> ExtruderPlan {
        let ctx = self.ctx;
        let mut plan = ExtruderPlan::new(
            extruder_nr,
            self.layer_nr,
            self.layer_thickness,
            ctx.fan_speed_layer_time(extruder_nr),
            ctx.machine.extruder(extruder_nr),
            &ctx.machine,
        )
        .with_raft_layer(self.layer_nr < 0);
        if let Some(overrides) = ctx.overrides(self.layer_nr) {
            plan.set_min_layer_time_override(overrides.min_layer_time);
        }
        plan
    }

    /// Index of the path new moves with `config` and `modifiers` go to.
    fn latest_path_index(&mut self, config: &GCodePathConfig, modifiers: &ExtrusionModifiers) -> usize {
        let mesh = self.current_mesh;
        let paths = &mut self.current_plan_mut().paths;
        if let Some(last) = paths.last() {
            if !last.done
                && last.config == *config
                && last.mesh == mesh
                && last.flow == modifiers.flow
                && last.width_factor == modifiers.width_factor
                && last.speed_factor == modifiers.speed_factor
                && last.spiralize == modifiers.spiralize
            {
                return paths.len() - 1;
            }
        }
        paths.push(GCodePath::new(
            *config,
            mesh,
            modifiers.space_fill_type,
            modifiers.flow,
            modifiers.width_factor,
            modifiers.spiralize,
            modifiers.speed_factor,
        ));
        paths.len() - 1
    }

    /// The path the next move with `config` and `modifiers` is appended to.
    ///
    /// Creates a new path unless the last one matches and is still open.
    pub fn latest_path_with_config(
        &mut self,
        config: &GCodePathConfig,
        modifiers: &ExtrusionModifiers,
    ) -> &mut GCodePath {
        let idx = self.latest_path_index(config, modifiers);
        &mut self.current_plan_mut().paths[idx]
    }

    /// Close the current path so the next move starts a new one.
    pub fn force_new_path_start(&mut self) {
        if let Some(last) = self.current_plan_mut().paths.last_mut() {
            last.done = true;
        }
    }

    fn push_travel_point(&mut self, path_idx: usize, p: Point) {
        if self.last_planned_position.is_none() {
            self.first_travel_destination = Some((p, self.is_inside));
        }
        self.current_plan_mut().paths[path_idx].points.push(p);
        self.last_planned_position = Some(p);
    }

    /// Travel to `p` in a straight line without any retraction logic.
    pub fn add_travel_simple(&mut self, p: Point) -> &mut GCodePath {
        let config = self.travel_config;
        let idx = self.latest_path_index(&config, &ExtrusionModifiers::default());
        self.push_travel_point(idx, p);
        &mut self.current_plan_mut().paths[idx]
    }

    /// Travel to `p`, combing when possible and deciding retraction and z-hop.
    pub fn add_travel(&mut self, p: Point, force_retract: bool) -> &mut GCodePath {
        let ctx = self.ctx;
        let extruder_nr = self.extruder();
        let extruder = ctx.machine.extruder(extruder_nr);
        let retraction = &extruder.retraction;
        let travel_config = self.travel_config;
        let modifiers = ExtrusionModifiers::default();
        let mut path_idx = self.latest_path_index(&travel_config, &modifiers);

        let is_first_travel_of_extruder_after_switch = self.current_plan().paths.len() == 1
            && (self.extruder_plans.len() > 1 || self.last_extruder_previous_layer != extruder_nr);
        let mut bypass_combing =
            is_first_travel_of_extruder_after_switch && extruder.retraction_hop_after_extruder_switch;
        let is_first_travel_of_layer = self.last_planned_position.is_none();

        if is_first_travel_of_layer {
            bypass_combing = true;
            self.first_travel_destination = Some((p, self.is_inside));
            if self.layer_nr == 0 && retraction.enabled && retraction.z_hop_enabled {
                let path = &mut self.current_plan_mut().paths[path_idx];
                path.retract = true;
                path.perform_z_hop = true;
            }
            self.force_new_path_start();
        } else if force_retract {
            let combing = self.comb.is_some();
            let path = &mut self.current_plan_mut().paths[path_idx];
            path.retract = true;
            if !combing {
                path.perform_z_hop = retraction.z_hop_enabled;
            }
        }

        let routed = match (&self.comb, self.last_planned_position) {
            (Some(comb), Some(last)) if !bypass_combing => Some((
                last,
                comb.calc(last, p, self.was_inside, self.is_inside, extruder.nozzle_size),
            )),
            _ => None,
        };

        let mut combed = false;
        if let Some((last, result)) = routed {
            match result {
                Some(comb_paths) => {
                    combed = true;
                    self.apply_comb_paths(path_idx, last, p, &comb_paths);
                }
                None => log::warn!(
                    "layer {}: combing from {last:?} to {p:?} failed, travelling straight",
                    self.layer_nr
                ),
            }
        }

        let shorter_than_min_travel = !is_first_travel_of_layer
            && self
                .last_planned_position
                .is_some_and(|last| last.shorter_than(&p, retraction.retraction_min_travel_distance));
        if !force_retract && shorter_than_min_travel {
            let path = &mut self.current_plan_mut().paths[path_idx];
            path.retract = false;
            path.perform_z_hop = false;
        }

        if !combed && !is_first_travel_of_layer && !shorter_than_min_travel {
            if self.was_inside && self.move_inside_comb_boundary(innermost_wall_width(ctx)) {
                // The move inside happens before the retraction.
                let path = &mut self.current_plan_mut().paths[path_idx];
                path.retract = false;
                path.perform_z_hop = false;
                path_idx = self.latest_path_index(&travel_config, &modifiers);
            }
            let path = &mut self.current_plan_mut().paths[path_idx];
            path.retract = retraction.enabled;
            path.perform_z_hop = retraction.enabled && retraction.z_hop_enabled;
        }

        self.force_new_path_start();
        self.push_travel_point(path_idx, p);
        self.was_inside = self.is_inside;
        &mut self.current_plan_mut().paths[path_idx]
    }

    /// Copy a comb route into the travel path and decide retraction.
    fn apply_comb_paths(&mut self, path_idx: usize, last: Point, p: Point, comb_paths: &CombPaths) {
        let ctx = self.ctx;
        let retraction = &ctx.machine.extruder(self.extruder()).retraction;
        let (plate_min, plate_max) = ctx.machine.build_plate();
        let build_plate = BoundingBox::from_points_minmax(plate_min, plate_max);
        let max_resolution = ctx.planning.max_resolution as i128;

        let path = &mut self.current_plan_mut().paths[path_idx];
        let mut retract = path.retract || (comb_paths.len() > 1 && retraction.enabled);
        if !retract {
            if comb_paths.through_air || comb_paths.crosses_boundary() {
                retract = retraction.enabled;
            }
            if let [only] = comb_paths.paths.as_slice() {
                if ctx.combing.limit_support_retractions
                    && comb_paths.through_air
                    && !only.cross_boundary
                    && only.points == [last, p]
                {
                    // Straight travel through air, e.g. between support lines.
                    retract = false;
                }
            }
        }

        let mut distance = 0.0;
        let mut previous = last;
        for comb_path in comb_paths.iter() {
            for point in &comb_path.points {
                if *point == p {
                    continue;
                }
                let point = build_plate.clamp_point(point);
                let far_enough = path
                    .points
                    .last()
                    .map_or(true, |prev| prev.distance_squared(&point) > max_resolution * max_resolution);
                if far_enough {
                    path.points.push(point);
                    distance += previous.distance(&point);
                    previous = point;
                }
            }
        }
        distance += previous.distance(&p);

        let max_distance = ctx.combing.max_distance;
        path.retract = retract || (max_distance > 0 && distance > max_distance as CoordF && retraction.enabled);
        path.perform_z_hop = path.retract && retraction.z_hop_enabled && !comb_paths.through_air;
    }

    /// Pull the nozzle into the preferred comb boundary by `distance`.
    ///
    /// Returns whether a move was planned.
    pub fn move_inside_comb_boundary(&mut self, distance: Coord) -> bool {
        let Some(comb) = &self.comb else {
            return false;
        };
        let p = self.last_planned_position_or_start();
        let Some(moved) = comb.move_inside(p, distance, MAX_MOVE_INSIDE_DISTANCE) else {
            return false;
        };
        // Twice, to get out of tight corners.
        let moved = comb.move_inside(moved, distance, MAX_MOVE_INSIDE_DISTANCE).unwrap_or(moved);
        if !comb.inside_preferred(&moved) {
            return false;
        }
        self.add_travel_simple(moved);
        self.force_new_path_start();
        true
    }

    /// Plan a prime blob: a non-retracted move along Y that primes the nozzle.
    pub fn plan_prime(&mut self, prime_blob_wipe_length: CoordF) {
        self.force_new_path_start();
        let target = self.last_planned_position_or_start() + Point::new(0, scale(prime_blob_wipe_length));
        let path = self.add_travel_simple(target);
        path.retract = false;
        path.perform_z_hop = false;
        path.perform_prime = true;
        self.force_new_path_start();
    }

    /// Extrude from the last position to `p`.
    pub fn add_extrusion_move(&mut self, p: Point, config: &GCodePathConfig, modifiers: ExtrusionModifiers) {
        let idx = self.latest_path_index(config, &modifiers);
        let plan = self.current_plan_mut();
        let path = &mut plan.paths[idx];
        path.points.push(p);
        path.fan_speed = modifiers.fan_speed;
        plan.record_first_extrusion_acc_jerk(config.acceleration, config.jerk);
        self.last_planned_position = Some(p);
    }

    /// Switch to another extruder.
    ///
    /// Travels to the end position of the current extruder and starts a new
    /// [`ExtruderPlan`]. A plan that is still empty takes over the new
    /// extruder number.
    pub fn set_extruder(&mut self, extruder_nr: usize) {
        let ctx = self.ctx;
        if extruder_nr == self.extruder() {
            log::debug!("layer {}: extruder {extruder_nr} is already active", self.layer_nr);
        }
        self.set_is_inside(false);

        let previous = ctx.machine.extruder(self.extruder());
        let end_pos = if previous.end_pos_abs {
            previous.end_pos + previous.nozzle_offset
        } else {
            previous.end_pos + self.last_planned_position_or_start()
        };
        if previous.end_pos_abs || self.last_planned_position.is_some() {
            self.add_travel(end_pos, false);
        }

        let current = self.current_plan_mut();
        if current.is_empty() {
            current.set_extruder_nr(extruder_nr);
        }
        let plan = self.make_extruder_plan(extruder_nr);
        self.extruder_plans.push(plan);

        let next = ctx.machine.extruder(extruder_nr);
        let start_pos = if next.start_pos_abs {
            next.start_pos + next.nozzle_offset
        } else {
            next.start_pos + self.last_planned_position_or_start()
        };
        if next.start_pos_abs || self.last_planned_position.is_some() {
            self.last_planned_position = Some(start_pos);
        }
        log::trace!("layer {}: switched to extruder {extruder_nr}", self.layer_nr);
    }

    /// Print a closed polygon starting at `start_idx`, then wipe along it.
    #[allow(clippy::too_many_arguments)]
    pub fn add_polygon(
        &mut self,
        polygon: &Polygon,
        start_idx: usize,
        backwards: bool,
        config: &GCodePathConfig,
        wall_0_wipe_dist: Coord,
        flow: CoordF,
        always_retract: bool,
    ) {
        let points = polygon.points();
        let n = points.len();
        if n == 0 {
            return;
        }
        let start_idx = start_idx % n;
        let at = |i: usize| {
            if backwards {
                points[(start_idx + n - i % n) % n]
            } else {
                points[(start_idx + i) % n]
            }
        };
        let modifiers = ExtrusionModifiers::new(SpaceFillType::Polygons).with_flow(flow);

        self.add_travel(points[start_idx], always_retract);
        for i in 1..n {
            self.add_extrusion_move(at(i), config, modifiers);
        }
        if n > 2 {
            self.add_extrusion_move(points[start_idx], config, modifiers);
            if wall_0_wipe_dist > 0 {
                self.wipe_along(n, &at, wall_0_wipe_dist);
                self.force_new_path_start();
            }
        } else {
            log::warn!("layer {}: polygon with {n} points printed as a loop", self.layer_nr);
        }
    }

    /// Travel along a loop of `n` points for `wipe_dist`.
    fn wipe_along(&mut self, n: usize, at: &dyn Fn(usize) -> Point, wipe_dist: Coord) {
        let wipe_dist = wipe_dist as CoordF;
        let mut p0 = at(0);
        let mut traversed = 0.0;
        for i in 1.. {
            if i > n && traversed == 0.0 {
                break;
            }
            let p1 = at(i);
            let d = p0.distance(&p1);
            if traversed + d >= wipe_dist {
                let end = p0 + (p1 - p0).normal((wipe_dist - traversed).round() as Coord);
                self.add_travel_simple(end);
                break;
            }
            self.add_travel_simple(p1);
            traversed += d;
            p0 = p1;
        }
    }

    /// Print polygons in nearest-first order.
    #[allow(clippy::too_many_arguments)]
    pub fn add_polygons_by_optimizer(
        &mut self,
        polygons: &[Polygon],
        config: &GCodePathConfig,
        wall_0_wipe_dist: Coord,
        flow: CoordF,
        always_retract: bool,
        reverse_order: bool,
        start_near: Option<Point>,
    ) {
        if polygons.is_empty() {
            return;
        }
        let start = start_near.unwrap_or_else(|| self.last_planned_position_or_start());
        let mut order = PathOrderOptimizer::new(start).optimize_polygons(polygons.iter().map(Polygon::points));
        if reverse_order {
            order.reverse();
        }
        for path in order {
            self.add_polygon(
                &polygons[path.index],
                path.start_vertex,
                path.backwards,
                config,
                wall_0_wipe_dist,
                flow,
                always_retract,
            );
        }
    }

    /// First vertex from `start_idx` on that has material below it.
    fn first_supported_vertex(&self, wall: &ExtrusionLine, start_idx: usize) -> usize {
        if self.bridge_wall_mask.is_empty() && self.overhang_mask.is_empty() {
            return start_idx;
        }
        let air_below = clipper::union(&self.bridge_wall_mask, &self.overhang_mask);
        let n = wall.len();
        (0..n)
            .map(|i| (start_idx + i) % n)
            .find(|&idx| !polygons_contain_point(&air_below, &wall.junctions[idx].position))
            .unwrap_or(start_idx)
    }

    fn bridging(&self) -> bool {
        self.ctx.bridge.enabled && !self.bridge_wall_mask.is_empty()
    }

    /// Parts of `a`-`b` over the bridge mask, nearest to `a` first.
    fn bridge_pieces(&self, a: Point, b: Point) -> Vec<(Point, Point)> {
        let line = Polyline::from_points(vec![a, b]);
        let mut pieces: Vec<(Point, Point)> = clipper::clip_polyline(&line, &self.bridge_wall_mask, true)
            .into_iter()
            .filter_map(|piece| {
                let (first, last) = (piece.first_point()?, piece.last_point()?);
                if first.distance_squared(&a) <= last.distance_squared(&a) {
                    Some((first, last))
                } else {
                    Some((last, first))
                }
            })
            .collect();
        pieces.sort_by_key(|(b0, _)| b0.distance_squared(&a));
        pieces
    }

    /// Distance along `wall` from segment `step` to the next bridge.
    ///
    /// 0 when no bridge of at least the minimum length follows.
    fn distance_to_bridge_start(&self, wall: &ExtrusionLine, start_idx: usize, step: usize) -> CoordF {
        let n = wall.len();
        let segments = if wall.is_closed { n } else { n.saturating_sub(1) };
        let min_bridge_length = self.ctx.bridge.min_length as CoordF;
        let mut distance = 0.0;
        for s in step..segments {
            let a = wall.junctions[(start_idx + s) % n].position;
            let b = wall.junctions[(start_idx + s + 1) % n].position;
            let mut cursor = a;
            for (b0, b1) in self.bridge_pieces(a, b) {
                distance += cursor.distance(&b0);
                if b0.distance(&b1) >= min_bridge_length {
                    return distance;
                }
                distance += b0.distance(&b1);
                cursor = b1;
            }
            distance += cursor.distance(&b);
        }
        0.0
    }

    /// Print a wall with variable width, starting at junction `start_idx`.
    ///
    /// Segments are split where the width changes too much for one move.
    /// Short walls print at the small feature speed. Parts over the bridge
    /// mask print with `bridge_config`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_wall(
        &mut self,
        wall: &ExtrusionLine,
        start_idx: usize,
        config: &GCodePathConfig,
        bridge_config: &GCodePathConfig,
        wall_0_wipe_dist: Coord,
        flow: CoordF,
        always_retract: bool,
    ) {
        let n = wall.len();
        if n == 0 {
            return;
        }
        if n < 2 {
            log::warn!("layer {}: wall with a single junction skipped", self.layer_nr);
            return;
        }
        let ctx = self.ctx;
        let planning = &ctx.planning;
        let mut start_idx = start_idx % n;
        if wall.is_closed {
            start_idx = self.first_supported_vertex(wall, start_idx);
        }

        let is_small_feature = planning.small_feature_max_length > 0 && wall.shorter_than(planning.small_feature_max_length);
        let small_feature_speed_factor = {
            let factor = if self.layer_nr == 0 {
                planning.small_feature_speed_factor_0
            } else {
                planning.small_feature_speed_factor
            };
            let factor = if factor == 0.0 { 1.0 } else { factor };
            let min_speed = ctx.fan_speed_layer_time(self.extruder()).cool_min_speed;
            if config.speed > 0.0 {
                factor.max(min_speed / config.speed)
            } else {
                factor
            }
        };
        let max_area_deviation = planning.max_extrusion_area_deviation.max(1);
        let max_resolution = planning.max_resolution.max(1);
        let nominal_width = config.line_width.max(1) as CoordF;
        let bridging = self.bridging();

        let junction = |i: usize| wall.junctions[(start_idx + i) % n];
        let end = if wall.is_closed { n + 1 } else { n };
        let mut state = BridgeState::new();
        let mut p0 = junction(0);
        self.add_travel(p0.position, always_retract);

        for i in 1..end {
            let p1 = junction(i);
            if bridging {
                state.distance_to_bridge_start = self.distance_to_bridge_start(wall, start_idx, i - 1);
            }

            let delta_width = p1.width - p0.width;
            let line_vector = p1.position - p0.position;
            let line_length = p0.position.distance(&p1.position).round() as Coord;
            let area_deviation = delta_width.abs() * line_length / 4;
            let pieces_for_deviation = (area_deviation + max_area_deviation - 1) / max_area_deviation;
            let pieces_for_resolution = line_length / max_resolution;
            let pieces = pieces_for_deviation.min(pieces_for_resolution).max(1);
            let piece_length = (line_length + pieces / 2) / pieces;

            for piece in 0..pieces {
                let progress = (piece as CoordF + 0.5) / pieces as CoordF;
                let width = p0.width as CoordF + progress * delta_width as CoordF;
                let width_factor = width / nominal_width;
                let destination = if piece + 1 == pieces {
                    p1.position
                } else {
                    p0.position + line_vector.normal(piece_length * (piece + 1))
                };
                if is_small_feature {
                    let modifiers = ExtrusionModifiers::new(SpaceFillType::Polygons)
                        .with_flow(flow)
                        .with_width_factor(width_factor)
                        .with_speed_factor(small_feature_speed_factor);
                    self.add_extrusion_move(destination, config, modifiers);
                } else {
                    let origin = p0.position + line_vector.normal(piece_length * piece);
                    self.add_wall_line(origin, destination, config, bridge_config, flow, width_factor, &mut state);
                }
            }
            p0 = p1;
        }

        if wall.is_closed && wall_0_wipe_dist > 0 {
            let at = |i: usize| junction(i).position;
            self.wipe_along(n, &at, wall_0_wipe_dist);
            self.force_new_path_start();
        }
    }

    /// Print one straight wall segment, bridging over the bridge mask.
    #[allow(clippy::too_many_arguments)]
    fn add_wall_line(
        &mut self,
        p0: Point,
        p1: Point,
        config: &GCodePathConfig,
        bridge_config: &GCodePathConfig,
        flow: CoordF,
        width_factor: CoordF,
        state: &mut BridgeState,
    ) {
        let modifiers = ExtrusionModifiers::new(SpaceFillType::Polygons)
            .with_flow(flow)
            .with_width_factor(width_factor);
        if !self.bridging() {
            self.add_extrusion_move(p1, config, modifiers.with_speed_factor(state.speed_factor));
            return;
        }

        let pieces = self.bridge_pieces(p0, p1);
        let mut cursor = p0;
        if pieces.is_empty() {
            self.add_non_bridge_line(&mut cursor, p1, config, bridge_config, modifiers, state, false);
            return;
        }
        let min_bridge_length = self.ctx.bridge.min_length as CoordF;
        for (b0, b1) in pieces {
            let bridge_length = b0.distance(&b1);
            if bridge_length < min_bridge_length {
                // Too short to bridge: print it like the rest of the wall.
                self.add_extrusion_move(b1, config, modifiers.with_speed_factor(state.speed_factor));
                cursor = b1;
                continue;
            }
            self.add_non_bridge_line(&mut cursor, b0, config, bridge_config, modifiers, state, true);
            if bridge_length > MIN_LINE_LENGTH as CoordF {
                self.add_extrusion_move(b1, bridge_config, modifiers);
                state.non_bridge_line_volume = 0.0;
                cursor = b1;
                state.speed_factor = if config.speed > 0.0 {
                    (bridge_config.speed / config.speed).clamp(0.8, 1.0)
                } else {
                    1.0
                };
            }
        }
        self.add_non_bridge_line(&mut cursor, p1, config, bridge_config, modifiers, state, true);
    }

    /// Print from `cursor` to `line_end` off the bridge mask.
    ///
    /// After a bridge the speed ramps up in short segments; before a bridge
    /// the end of the line coasts.
    #[allow(clippy::too_many_arguments)]
    fn add_non_bridge_line(
        &mut self,
        cursor: &mut Point,
        line_end: Point,
        config: &GCodePathConfig,
        bridge_config: &GCodePathConfig,
        modifiers: ExtrusionModifiers,
        state: &mut BridgeState,
        change_flow: bool,
    ) {
        let bridge_coast = self.ctx.bridge.coast;
        let mut remaining = cursor.distance(&line_end);
        while remaining > MIN_LINE_LENGTH as CoordF {
            let mut segment_end = if state.speed_factor == 1.0 || remaining < ACCELERATION_SEGMENT_LENGTH as CoordF {
                line_end
            } else {
                *cursor + (line_end - *cursor).normal(ACCELERATION_SEGMENT_LENGTH)
            };
            let segment_flow = if change_flow && state.speed_factor < 1.0 {
                modifiers.flow / state.speed_factor
            } else {
                modifiers.flow
            };
            let segment = modifiers.with_flow(segment_flow).with_speed_factor(state.speed_factor);

            if state.distance_to_bridge_start > 0.0 {
                let non_bridge_rate = config.speed * config.flow;
                let speed_flow_factor = if non_bridge_rate > 0.0 {
                    (bridge_config.speed * bridge_config.flow) / non_bridge_rate
                } else {
                    1.0
                };
                let coast_dist = state.non_bridge_line_volume.min(MAX_NON_BRIDGE_LINE_VOLUME)
                    * (1.0 - speed_flow_factor)
                    * bridge_coast
                    / 40.0;
                if state.distance_to_bridge_start - remaining <= coast_dist {
                    segment_end = line_end;
                }
                let length = cursor.distance(&segment_end);
                if coast_dist > 0.0 && state.distance_to_bridge_start - length <= coast_dist {
                    if length - coast_dist > MIN_LINE_LENGTH as CoordF {
                        let coast_start = segment_end + (*cursor - segment_end).normal(coast_dist.round() as Coord);
                        self.add_extrusion_move(coast_start, config, segment);
                    }
                    self.add_extrusion_move(segment_end, config, segment.with_flow(0.0));
                } else {
                    self.add_extrusion_move(segment_end, config, segment);
                }
                state.distance_to_bridge_start -= length;
            } else {
                self.add_extrusion_move(segment_end, config, segment);
            }

            state.non_bridge_line_volume += cursor.distance(&segment_end)
                * segment_flow
                * modifiers.width_factor
                * state.speed_factor
                * config.speed;
            *cursor = segment_end;
            state.speed_factor = 1.0 - (1.0 - state.speed_factor) * ACCELERATION_FACTOR;
            if state.speed_factor >= 0.9 {
                state.speed_factor = 1.0;
            }
            remaining = cursor.distance(&line_end);
        }
    }

    /// Print walls in nearest-first order.
    ///
    /// Closed walls start at their own start junction when they have one.
    #[allow(clippy::too_many_arguments)]
    pub fn add_walls(
        &mut self,
        walls: &[ExtrusionLine],
        config: &GCodePathConfig,
        bridge_config: &GCodePathConfig,
        wall_0_wipe_dist: Coord,
        flow: CoordF,
        always_retract: bool,
    ) {
        let points: Vec<Vec<Point>> = walls.iter().map(ExtrusionLine::points).collect();
        let paths: Vec<(&[Point], bool)> = points
            .iter()
            .zip(walls)
            .map(|(p, wall)| (p.as_slice(), wall.is_closed))
            .collect();
        let order = PathOrderOptimizer::new(self.last_planned_position_or_start()).optimize_paths(&paths);
        for path in order {
            let wall = &walls[path.index];
            if wall.is_closed {
                let start = wall.start_idx.unwrap_or(path.start_vertex);
                self.add_wall(wall, start, config, bridge_config, wall_0_wipe_dist, flow, always_retract);
            } else if path.backwards {
                let mut reversed = wall.clone();
                reversed.reverse();
                self.add_wall(&reversed, 0, config, bridge_config, wall_0_wipe_dist, flow, always_retract);
            } else {
                self.add_wall(wall, 0, config, bridge_config, wall_0_wipe_dist, flow, always_retract);
            }
        }
    }

    /// Print a variable-width infill wall as is.
    pub fn add_infill_wall(&mut self, wall: &ExtrusionLine, config: &GCodePathConfig, force_retract: bool) {
        let Some(first) = wall.first() else {
            return;
        };
        self.add_travel(first.position, force_retract);
        let nominal_width = config.line_width.max(1) as CoordF;
        for junction in wall.iter() {
            let modifiers = ExtrusionModifiers::new(SpaceFillType::Polygons)
                .with_width_factor(junction.width as CoordF / nominal_width);
            self.add_extrusion_move(junction.position, config, modifiers);
        }
    }

    /// Print open lines in nearest-first order.
    ///
    /// Lines whose ends coincide are printed as loops.
    pub fn add_lines_by_optimizer(
        &mut self,
        lines: &[Polyline],
        config: &GCodePathConfig,
        modifiers: ExtrusionModifiers,
        wipe_dist: Coord,
        start_near: Option<Point>,
        reverse_direction: bool,
    ) {
        let start = start_near.unwrap_or_else(|| self.last_planned_position_or_start());
        let order = PathOrderOptimizer::new(start)
            .with_detect_loops(true)
            .with_reverse_direction(reverse_direction)
            .optimize_polylines(lines.iter().map(Polyline::points));
        self.add_lines_in_given_order(lines, &order, config, modifiers, wipe_dist);
    }

    /// Print lines in the order and direction given by `order`.
    ///
    /// Starts within half a line width of the nozzle are reached by a move
    /// without extrusion instead of a travel. With `wipe_dist` set, lines end
    /// with a short non-extruding move beyond their last point.
    pub fn add_lines_in_given_order(
        &mut self,
        lines: &[Polyline],
        order: &[OrderedPath],
        config: &GCodePathConfig,
        modifiers: ExtrusionModifiers,
        wipe_dist: Coord,
    ) {
        let line_width = config.line_width;
        let max_gap = (if config.is_bridge_path { 2 * line_width } else { line_width / 2 }) as i128;
        for (order_idx, path) in order.iter().enumerate() {
            let Some(line) = lines.get(path.index) else { continue };
            let points = line.points();
            let n = points.len();
            if n == 0 {
                continue;
            }
            let start = points[path.start_vertex.min(n - 1)];

            if self.last_planned_position_or_start().distance_squared(&start) <= max_gap * max_gap {
                let flow = if config.is_bridge_path { modifiers.flow } else { 0.0 };
                self.add_extrusion_move(start, config, modifiers.with_flow(flow));
            } else {
                self.add_travel(start, false);
            }

            let mut p0 = start;
            let mut before_end = start;
            for idx in 0..n {
                let point_idx = if path.is_closed {
                    (path.start_vertex + idx + 1) % n
                } else if path.backwards {
                    n - 1 - idx
                } else {
                    idx
                };
                let p1 = points[point_idx];
                if p0.distance_squared(&p1) >= MINIMUM_SQUARED_LINE_LENGTH {
                    self.add_extrusion_move(p1, config, modifiers);
                    before_end = p0;
                    p0 = p1;
                }
            }

            if wipe_dist != 0 && before_end != p0 && line.length() > 2.0 * line_width as CoordF {
                let next_start = order.get(order_idx + 1).and_then(|next| {
                    let next_points = lines.get(next.index)?.points();
                    next_points.get(next.start_vertex).copied()
                });
                let next_is_far = next_start.map_or(true, |next| {
                    next.distance_squared(&p0) > 4 * line_width as i128 * line_width as i128
                });
                if next_is_far {
                    let wipe_end = p0 + (p0 - before_end).normal(wipe_dist);
                    self.add_extrusion_move(wipe_end, config, modifiers.with_flow(0.0));
                }
            }
        }
    }

    /// Apply back pressure compensation to every extruder plan.
    pub fn apply_back_pressure_compensation(&mut self) {
        let ctx = self.ctx;
        let compensation = ctx.planning.speed_equalize_flow_width_factor;
        if compensation == 0.0 {
            return;
        }
        let max_speed = ctx
            .planning
            .speed_equalize_flow_max
            .min(ctx.machine.max_feedrate[0])
            .min(ctx.machine.max_feedrate[1]);
        for plan in &mut self.extruder_plans {
            plan.apply_back_pressure_compensation(compensation, max_speed);
        }
    }

    /// Settle cooling for every extruder plan, starting at `start`.
    ///
    /// Only the last plan of the layer enforces the minimum layer time.
    pub fn process_fan_speed_and_minimal_layer_time(&mut self, start: Point) {
        let count = self.extruder_plans.len();
        let mut position = start;
        for (idx, plan) in self.extruder_plans.iter_mut().enumerate() {
            plan.process_fan_speed_and_minimal_layer_time(idx + 1 == count, position);
            if let Some(last) = plan.paths.iter().rev().find_map(|path| path.points.last()) {
                position = *last;
            }
        }
    }

    /// Total estimated time of the layer (s).
    pub fn total_print_time(&self) -> CoordF {
        self.extruder_plans.iter().map(ExtruderPlan::total_print_time).sum()
    }

    /// Resolve coasting and speeds into the finished layer.
    pub fn finalize(mut self) -> FinalizedLayer {
        let ctx = self.ctx;
        let temperature = ctx.overrides(self.layer_nr).and_then(|o| o.nozzle_temperature);
        let mut position = self.start_position;
        let mut extruder_plans = Vec::with_capacity(self.extruder_plans.len());

        for plan in &mut self.extruder_plans {
            if plan.paths.is_empty() {
                continue;
            }
            let extruder_nr = plan.extruder_nr();
            let coasting = &ctx.machine.extruder(extruder_nr).coasting;
            if coasting.enabled {
                apply_coasting(&mut plan.paths, position, coasting, self.layer_thickness);
            }
            if let Some(temperature) = temperature {
                plan.insert_command(PlanInsert::new(
                    0,
                    0.0,
                    PlanInsertCommand::NozzleTemperature {
                        extruder_nr,
                        temperature,
                        wait: false,
                    },
                ));
            }
            if let Some(last) = plan.paths.iter().rev().find_map(|path| path.points.last()) {
                position = *last;
            }

            let paths = plan
                .paths
                .iter()
                .filter(|path| !path.points.is_empty())
                .map(|path| FinalizedPath {
                    feature: path.config.feature,
                    points: path.points.clone(),
                    speed: plan.path_speed(path),
                    acceleration: path.config.acceleration,
                    jerk: path.config.jerk,
                    line_width: (path.config.line_width as CoordF * path.width_factor).round() as Coord,
                    extrusion_mm3_per_mm: path.extrusion_mm3_per_mm(),
                    fan_speed: path.fan_speed.or(path.config.fan_speed),
                    retract: path.retract,
                    perform_z_hop: path.perform_z_hop,
                    perform_prime: path.perform_prime,
                    spiralize: path.spiralize,
                    is_bridge: path.config.is_bridge_path,
                    mesh: path.mesh,
                })
                .collect();
            extruder_plans.push(FinalizedExtruderPlan {
                extruder_nr,
                fan_speed: plan.fan_speed(),
                extra_time: plan.extra_time(),
                total_print_time: plan.total_print_time(),
                estimates: plan.estimates(),
                first_extrusion_acc_jerk: plan.first_extrusion_acc_jerk(),
                inserts: plan.inserts().to_vec(),
                paths,
            });
        }
        log::debug!(
            "layer {}: finalized {} extruder plans, {:.2}s",
            self.layer_nr,
            extruder_plans.len(),
            self.total_print_time()
        );

        FinalizedLayer {
            layer_nr: self.layer_nr,
            z: self.z,
            layer_thickness: self.layer_thickness,
            extruder_plans,
        }
    }
}

/// Width of the innermost wall, used to pull travels inside.
fn innermost_wall_width(ctx: &SliceContext) -> Coord {
    if ctx.walls.wall_line_count > 1 {
        ctx.walls.wall_line_width_x
    } else {
        ctx.walls.wall_line_width_0
    }
}

/// Region travels stay inside, shrunk from the outline by `offset`.
fn compute_comb_boundary(ctx: &SliceContext, layer_nr: i64, geometry: &LayerGeometry, offset: Coord) -> Polygons {
    let mode = ctx.combing.mode;
    if mode == CombingMode::Off {
        return Polygons::new();
    }
    if layer_nr < 0 {
        if mode == CombingMode::NoSkin {
            return Polygons::new();
        }
        return clipper::offset(&geometry.raft_outline, 100, OffsetJoinType::Miter);
    }
    match mode {
        CombingMode::Off => Polygons::new(),
        CombingMode::All => clipper::offset(&geometry.outline, offset, OffsetJoinType::Miter),
        CombingMode::NoSkin => {
            let skin = clipper::difference(&geometry.inner_area, &geometry.infill_area);
            clipper::difference(&clipper::offset(&geometry.outline, offset, OffsetJoinType::Miter), &skin)
        }
        CombingMode::NoOuterSurfaces => clipper::difference(
            &clipper::offset(&geometry.outline, offset, OffsetJoinType::Miter),
            &geometry.outer_surface_fill,
        ),
        CombingMode::Infill => geometry.infill_area.clone(),
    }
}

/// Split extrusion paths that end before a travel into a printed head and a
/// non-extruding tail, so the nozzle pressure drains before the travel.
fn apply_coasting(
    paths: &mut Vec<GCodePath>,
    start: Point,
    coasting: &crate::config::CoastingConfig,
    layer_thickness: Coord,
) {
    if coasting.volume <= 0.0 {
        return;
    }
    let mut position = start;
    let mut i = 0;
    while i < paths.len() {
        let path_start = position;
        if let Some(last) = paths[i].points.last() {
            position = *last;
        }
        let followed_by_travel = paths.get(i + 1).is_some_and(GCodePath::is_travel_path);
        let path = &paths[i];
        if followed_by_travel && !path.is_travel_path() && path.flow > 0.0 && !path.spiralize {
            if let Some(tail) = split_coasting(&mut paths[i], path_start, coasting, layer_thickness) {
                paths.insert(i + 1, tail);
                i += 1;
            }
        }
        i += 1;
    }
}

/// Cut the coasting tail off `path`, which starts at `start`.
fn split_coasting(
    path: &mut GCodePath,
    start: Point,
    coasting: &crate::config::CoastingConfig,
    layer_thickness: Coord,
) -> Option<GCodePath> {
    let width = path.config.line_width as CoordF * path.width_factor;
    if width <= 0.0 || layer_thickness <= 0 {
        return None;
    }
    let volume_to_distance = |volume: CoordF| volume * 1e9 / (layer_thickness as CoordF * width);
    let coast_dist = volume_to_distance(coasting.volume);
    let min_dist = volume_to_distance(coasting.min_volume + coasting.volume);

    let mut points = Vec::with_capacity(path.points.len() + 1);
    points.push(start);
    points.extend_from_slice(&path.points);
    let n = points.len();

    let mut accumulated = vec![0.0];
    let mut total = 0.0;
    let mut coast_idx = None;
    let mut shorter_than_min = true;
    let mut last = points[n - 1];
    for back in 1..n {
        let point = points[n - 1 - back];
        total += point.distance(&last);
        accumulated.push(total);
        if coast_idx.is_none() && total >= coast_dist {
            coast_idx = Some(back);
        }
        if total >= min_dist {
            shorter_than_min = false;
            break;
        }
        last = point;
    }
    if total < MIN_COAST_DISTANCE {
        return None;
    }

    let mut actual_coast_dist = coast_dist;
    if shorter_than_min {
        actual_coast_dist = total * coast_dist / min_dist;
        coast_idx = (1..accumulated.len()).find(|&i| accumulated[i] >= actual_coast_dist);
    }
    let idx = coast_idx?;
    let before = n - 1 - idx;
    let residual = actual_coast_dist - accumulated[idx - 1];
    let (a, b) = (points[before], points[before + 1]);
    let coast_start = b + (a - b).normal(residual.round() as Coord);

    let mut head: Vec<Point> = points[1..=before].to_vec();
    head.push(coast_start);
    let tail_points = points[before + 1..].to_vec();

    let mut tail = path.clone();
    tail.points = tail_points;
    tail.flow = 0.0;
    tail.speed_factor *= coasting.speed;
    tail.done = true;
    path.points = head;
    Some(tail)
}

/// A path with every factor resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedPath {
    pub feature: PrintFeatureType,
    pub points: Vec<Point>,
    /// mm/s
    pub speed: CoordF,
    pub acceleration: CoordF,
    pub jerk: CoordF,
    /// Actual line width, 0 for travels.
    pub line_width: Coord,
    pub extrusion_mm3_per_mm: CoordF,
    /// Fan speed override (%), `None` follows the plan.
    pub fan_speed: Option<CoordF>,
    pub retract: bool,
    pub perform_z_hop: bool,
    pub perform_prime: bool,
    pub spiralize: bool,
    pub is_bridge: bool,
    pub mesh: Option<usize>,
}

impl FinalizedPath {
    pub fn is_travel(&self) -> bool {
        self.line_width == 0 && self.extrusion_mm3_per_mm == 0.0
    }
}

/// Moves of one extruder within a finalized layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedExtruderPlan {
    pub extruder_nr: usize,
    /// Fan speed (%).
    pub fan_speed: CoordF,
    /// Time to wait to reach the minimum layer time (s).
    pub extra_time: CoordF,
    pub total_print_time: CoordF,
    pub estimates: TimeMaterialEstimates,
    pub first_extrusion_acc_jerk: Option<(CoordF, CoordF)>,
    pub inserts: Vec<PlanInsert>,
    pub paths: Vec<FinalizedPath>,
}

/// A fully planned layer, ready for G-code emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedLayer {
    pub layer_nr: i64,
    pub z: Coord,
    pub layer_thickness: Coord,
    pub extruder_plans: Vec<FinalizedExtruderPlan>,
}

impl FinalizedLayer {
    /// Every path of the layer in print order.
    pub fn paths(&self) -> impl Iterator<Item = &FinalizedPath> {
        self.extruder_plans.iter().flat_map(|plan| plan.paths.iter())
    }

    /// Estimated time of the layer including waiting (s).
    pub fn total_time(&self) -> CoordF {
        self.extruder_plans.iter().map(|plan| plan.total_print_time).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CombingMode, ExtruderSettings};
    use crate::perimeter::ExtrusionJunction;
    use crate::pipeline::LayerOverrides;

    fn ctx_without_combing() -> SliceContext {
        let mut ctx = SliceContext::new();
        ctx.combing.mode = CombingMode::Off;
        ctx
    }

    fn wall_config() -> GCodePathConfig {
        GCodePathConfig::new(PrintFeatureType::OuterWall, 400, 200, 30.0)
    }

    fn square(min: Coord, max: Coord) -> Polygon {
        Polygon::rectangle(Point::new(min, min), Point::new(max, max))
    }

    #[test]
    fn test_short_travel_does_not_retract() {
        let ctx = ctx_without_combing();
        let min = ctx.machine.extruder(0).retraction.retraction_min_travel_distance;
        let mut plan = LayerPlan::new(&ctx, 5, 1_200, 200, 0, &LayerGeometry::default());
        let config = wall_config();

        plan.add_travel(Point::new(10_000, 10_000), false);
        plan.add_extrusion_move(Point::new(20_000, 10_000), &config, ExtrusionModifiers::default());
        assert!(!plan.add_travel(Point::new(20_000 + min - 1, 10_000), false).retract);

        plan.add_extrusion_move(Point::new(30_000, 10_000), &config, ExtrusionModifiers::default());
        assert!(plan.add_travel(Point::new(30_000 + min + 1, 10_000), false).retract);
    }

    #[test]
    fn test_forced_retraction_survives_short_travel() {
        let ctx = ctx_without_combing();
        let mut plan = LayerPlan::new(&ctx, 5, 1_200, 200, 0, &LayerGeometry::default());
        plan.add_travel(Point::new(0, 0), false);
        plan.add_extrusion_move(Point::new(10_000, 0), &wall_config(), ExtrusionModifiers::default());
        assert!(plan.add_travel(Point::new(10_100, 0), true).retract);
    }

    #[test]
    fn test_first_travel_of_first_layer_hops() {
        let mut ctx = ctx_without_combing();
        ctx.machine.extruders[0].retraction.z_hop_enabled = true;
        let mut plan = LayerPlan::new(&ctx, 0, 200, 200, 0, &LayerGeometry::default());
        let path = plan.add_travel(Point::new(5_000, 5_000), false);
        assert!(path.retract);
        assert!(path.perform_z_hop);
        assert_eq!(plan.first_travel_destination(), Some((Point::new(5_000, 5_000), false)));
    }

    #[test]
    fn test_combing_inside_one_part_does_not_retract() {
        let ctx = SliceContext::new();
        let geometry = LayerGeometry::from_outline(vec![square(0, 20_000)]);
        let mut plan = LayerPlan::new(&ctx, 3, 800, 200, 0, &geometry);
        assert!(!plan.comb_boundary_minimum().is_empty());

        plan.set_is_inside(true);
        plan.add_travel(Point::new(5_000, 5_000), false);
        plan.add_extrusion_move(Point::new(5_000, 15_000), &wall_config(), ExtrusionModifiers::default());
        let path = plan.add_travel(Point::new(15_000, 15_000), false);
        assert!(!path.retract);
        assert!(!path.perform_z_hop);
        assert_eq!(path.points.last(), Some(&Point::new(15_000, 15_000)));
    }

    #[test]
    fn test_travel_between_parts_retracts() {
        let ctx = SliceContext::new();
        let geometry = LayerGeometry::from_outline(vec![square(0, 10_000), square(30_000, 40_000)]);
        let mut plan = LayerPlan::new(&ctx, 3, 800, 200, 0, &geometry);
        plan.set_is_inside(true);
        plan.add_travel(Point::new(5_000, 5_000), false);
        plan.add_extrusion_move(Point::new(5_000, 8_000), &wall_config(), ExtrusionModifiers::default());
        assert!(plan.add_travel(Point::new(35_000, 35_000), false).retract);
    }

    #[test]
    fn test_comb_boundary_modes() {
        let geometry = LayerGeometry::from_outline(vec![square(0, 20_000)])
            .with_infill_area(vec![square(2_000, 18_000)]);
        let ctx = ctx_without_combing();
        let plan = LayerPlan::new(&ctx, 1, 400, 200, 0, &geometry);
        assert!(plan.comb_boundary_minimum().is_empty());

        let mut ctx = SliceContext::new();
        ctx.combing.mode = CombingMode::Infill;
        let plan = LayerPlan::new(&ctx, 1, 400, 200, 0, &geometry);
        assert_eq!(plan.comb_boundary_preferred(), geometry.infill_area.as_slice());

        let mut ctx = SliceContext::new();
        ctx.combing.mode = CombingMode::NoSkin;
        let plan = LayerPlan::new(&ctx, -1, 400, 200, 0, &geometry);
        assert!(plan.comb_boundary_minimum().is_empty());
    }

    #[test]
    fn test_moves_merge_into_one_path() {
        let ctx = ctx_without_combing();
        let mut plan = LayerPlan::new(&ctx, 2, 600, 200, 0, &LayerGeometry::default());
        let config = wall_config();
        plan.add_travel(Point::zero(), false);
        plan.add_extrusion_move(Point::new(1_000, 0), &config, ExtrusionModifiers::default());
        plan.add_extrusion_move(Point::new(2_000, 0), &config, ExtrusionModifiers::default());
        plan.add_extrusion_move(Point::new(3_000, 0), &config, ExtrusionModifiers::default().with_flow(0.5));

        let paths = plan.extruder_plans()[0].paths();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[1].points.len(), 2);
        assert_eq!(paths[2].flow, 0.5);
    }

    #[test]
    fn test_set_extruder_starts_new_plan() {
        let mut ctx = ctx_without_combing();
        ctx.machine.extruders = vec![ExtruderSettings::default(), ExtruderSettings::default()];
        ctx.fan_speed_layer_time = vec![Default::default(), Default::default()];

        let mut plan = LayerPlan::new(&ctx, 2, 600, 200, 0, &LayerGeometry::default());
        plan.add_travel(Point::zero(), false);
        plan.add_extrusion_move(Point::new(5_000, 0), &wall_config(), ExtrusionModifiers::default());
        plan.set_extruder(1);

        assert_eq!(plan.extruder(), 1);
        assert_eq!(plan.extruder_plans().len(), 2);
        assert_eq!(plan.extruder_plans()[0].extruder_nr(), 0);
        assert_eq!(plan.last_planned_position(), Some(Point::new(5_000, 0)));
    }

    #[test]
    fn test_empty_plan_takes_new_extruder() {
        let mut ctx = ctx_without_combing();
        ctx.machine.extruders = vec![ExtruderSettings::default(), ExtruderSettings::default()];
        let mut plan = LayerPlan::new(&ctx, 2, 600, 200, 0, &LayerGeometry::default());
        plan.set_extruder(1);
        assert_eq!(plan.extruder_plans()[0].extruder_nr(), 1);
        assert!(plan.last_planned_position().is_none());
    }

    #[test]
    fn test_polygon_wipes_along_first_edge() {
        let ctx = ctx_without_combing();
        let mut plan = LayerPlan::new(&ctx, 2, 600, 200, 0, &LayerGeometry::default());
        plan.add_polygon(&square(0, 10_000), 0, false, &wall_config(), 2_000, 1.0, false);

        assert_eq!(plan.last_planned_position(), Some(Point::new(2_000, 0)));
        let paths = plan.extruder_plans()[0].paths();
        let extrusion = paths.iter().find(|p| !p.is_travel_path()).unwrap();
        assert_eq!(extrusion.points.len(), 4);
        assert_eq!(extrusion.points.last(), Some(&Point::new(0, 0)));
        assert!(paths.last().unwrap().is_travel_path());
    }

    #[test]
    fn test_wall_bridges_over_mask() {
        let mut ctx = ctx_without_combing();
        ctx.bridge.enabled = true;
        let mut plan = LayerPlan::new(&ctx, 4, 1_000, 200, 0, &LayerGeometry::default());
        plan.set_bridge_wall_mask(vec![Polygon::rectangle(Point::new(5_000, -1_000), Point::new(15_000, 1_000))]);

        let mut wall = ExtrusionLine::new(0, false, false);
        wall.push(ExtrusionJunction::new(Point::new(0, 0), 400, 0));
        wall.push(ExtrusionJunction::new(Point::new(20_000, 0), 400, 0));
        let config = wall_config();
        let bridge = GCodePathConfig::new(PrintFeatureType::OuterWall, 400, 200, 15.0).with_bridge();
        plan.add_wall(&wall, 0, &config, &bridge, 0, 1.0, false);

        let paths = plan.extruder_plans()[0].paths();
        let bridge_path = paths.iter().find(|p| p.config.is_bridge_path).unwrap();
        assert_eq!(bridge_path.points.last(), Some(&Point::new(15_000, 0)));
        // The approach coasts into the bridge.
        let coast = paths.iter().find(|p| !p.is_travel_path() && p.flow == 0.0).unwrap();
        assert_eq!(coast.points.last(), Some(&Point::new(5_000, 0)));
        // Speed ramps up again after the bridge.
        assert!(paths.iter().any(|p| p.speed_factor == 0.8));
        assert_eq!(plan.last_planned_position(), Some(Point::new(20_000, 0)));
    }

    #[test]
    fn test_variable_width_wall_is_split() {
        let ctx = ctx_without_combing();
        let mut plan = LayerPlan::new(&ctx, 4, 1_000, 200, 0, &LayerGeometry::default());
        let mut wall = ExtrusionLine::new(1, true, false);
        wall.push(ExtrusionJunction::new(Point::new(0, 0), 300, 1));
        wall.push(ExtrusionJunction::new(Point::new(10_000, 0), 700, 1));
        plan.add_wall(&wall, 0, &wall_config(), &wall_config().with_bridge(), 0, 1.0, false);

        let extrusions: Vec<&GCodePath> = plan.extruder_plans()[0]
            .paths()
            .iter()
            .filter(|p| !p.is_travel_path())
            .collect();
        assert!(extrusions.len() > 1);
        assert!(extrusions.first().unwrap().width_factor < extrusions.last().unwrap().width_factor);
        assert_eq!(plan.last_planned_position(), Some(Point::new(10_000, 0)));
    }

    #[test]
    fn test_small_feature_slows_down() {
        let mut ctx = ctx_without_combing();
        ctx.planning.small_feature_max_length = 50_000;
        let mut plan = LayerPlan::new(&ctx, 4, 1_000, 200, 0, &LayerGeometry::default());
        let wall = ExtrusionLine::from_polygon(&square(0, 5_000), 400, 0);
        plan.add_wall(&wall, 0, &wall_config(), &wall_config().with_bridge(), 0, 1.0, false);
        let paths = plan.extruder_plans()[0].paths();
        assert!(paths.iter().filter(|p| !p.is_travel_path()).all(|p| p.speed_factor == 0.5));
    }

    #[test]
    fn test_adjacent_lines_connect_without_travel() {
        let ctx = ctx_without_combing();
        let mut plan = LayerPlan::new(&ctx, 4, 1_000, 200, 0, &LayerGeometry::default())
            .with_start_position(Point::new(-5_000, 0));
        let lines = vec![
            Polyline::from_points(vec![Point::new(0, 0), Point::new(10_000, 0)]),
            Polyline::from_points(vec![Point::new(10_000, 150), Point::new(0, 150)]),
        ];
        let config = GCodePathConfig::new(PrintFeatureType::Skin, 400, 200, 40.0);
        plan.add_lines_by_optimizer(&lines, &config, ExtrusionModifiers::new(SpaceFillType::Lines), 0, None, false);

        let paths = plan.extruder_plans()[0].paths();
        assert_eq!(paths.iter().filter(|p| p.is_travel_path()).count(), 1);
        assert_eq!(plan.last_planned_position(), Some(Point::new(0, 150)));
    }

    #[test]
    fn test_line_wipe_extends_past_end() {
        let ctx = ctx_without_combing();
        let mut plan = LayerPlan::new(&ctx, 4, 1_000, 200, 0, &LayerGeometry::default());
        let lines = vec![Polyline::from_points(vec![Point::new(0, 0), Point::new(10_000, 0)])];
        let config = GCodePathConfig::new(PrintFeatureType::Infill, 400, 200, 60.0);
        plan.add_lines_by_optimizer(&lines, &config, ExtrusionModifiers::new(SpaceFillType::Lines), 300, None, false);
        assert_eq!(plan.last_planned_position(), Some(Point::new(10_300, 0)));
    }

    #[test]
    fn test_prime_blob() {
        let ctx = ctx_without_combing();
        let mut plan = LayerPlan::new(&ctx, 0, 200, 200, 0, &LayerGeometry::default())
            .with_start_position(Point::new(1_000, 1_000));
        plan.plan_prime(5.0);
        let paths = plan.extruder_plans()[0].paths();
        assert!(paths[0].perform_prime);
        assert_eq!(paths[0].points, vec![Point::new(1_000, 6_000)]);
    }

    #[test]
    fn test_coasting_splits_path_before_travel() {
        let mut ctx = ctx_without_combing();
        ctx.machine.extruders[0].coasting.enabled = true;
        let mut plan = LayerPlan::new(&ctx, 4, 1_000, 200, 0, &LayerGeometry::default());
        plan.add_travel(Point::new(0, 0), false);
        plan.add_extrusion_move(Point::new(20_000, 0), &wall_config(), ExtrusionModifiers::default());
        plan.add_travel(Point::new(20_000, 5_000), false);

        let layer = plan.finalize();
        let paths: Vec<&FinalizedPath> = layer.paths().collect();
        assert_eq!(paths.len(), 4);
        // 0.064 mm3 over a 0.4 x 0.2 mm line
        assert_eq!(paths[1].points, vec![Point::new(19_200, 0)]);
        assert_eq!(paths[2].points, vec![Point::new(20_000, 0)]);
        assert_eq!(paths[2].extrusion_mm3_per_mm, 0.0);
        assert!(paths[2].speed < paths[1].speed);
    }

    #[test]
    fn test_finalize_resolves_plan() {
        let ctx = ctx_without_combing().with_overrides(
            4,
            LayerOverrides {
                nozzle_temperature: Some(215.0),
                ..LayerOverrides::default()
            },
        );
        let mut plan = LayerPlan::new(&ctx, 4, 1_000, 200, 0, &LayerGeometry::default());
        plan.add_polygon(&square(0, 10_000), 0, false, &wall_config(), 0, 1.0, false);
        plan.apply_back_pressure_compensation();
        plan.process_fan_speed_and_minimal_layer_time(Point::zero());
        let time = plan.total_print_time();
        let layer = plan.finalize();

        assert_eq!(layer.layer_nr, 4);
        assert_eq!(layer.extruder_plans.len(), 1);
        let extruder_plan = &layer.extruder_plans[0];
        assert_eq!(extruder_plan.total_print_time, time);
        assert!(matches!(
            extruder_plan.inserts[0].command,
            PlanInsertCommand::NozzleTemperature { temperature, .. } if temperature == 215.0
        ));
        assert!(layer.total_time() >= ctx.fan_speed_layer_time(0).cool_min_layer_time - 0.1 - 1e-6);
        assert!(layer.paths().next().unwrap().is_travel());
    }
}
