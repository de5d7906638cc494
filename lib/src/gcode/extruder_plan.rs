//! Paths of one extruder within one layer, with cooling decisions.
//!
//! After all paths of a layer are planned, every [`ExtruderPlan`] estimates
//! its print time and, for the last plan of the layer, stretches extrusion
//! time until the minimum layer time is met. The fan speed follows from the
//! resulting layer time and the layer number.

use serde::{Deserialize, Serialize};

use crate::config::{ExtruderSettings, FanSpeedLayerTimeSettings, MachineSettings, RetractionConfig};
use crate::geometry::Point;
use crate::{unscale, Coord, CoordF, SCALING_FACTOR};

use super::path::GCodePath;
use super::time_estimate::{TimeEstimateCalculator, TimeMaterialEstimates};

/// Command inserted into the motion stream at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PlanInsertCommand {
    /// Set (or wait for) a nozzle temperature.
    NozzleTemperature {
        extruder_nr: usize,
        temperature: CoordF,
        wait: bool,
    },
    /// Set the fan speed (percent).
    FanSpeed { fan_speed: CoordF },
}

/// A command to emit once `time_after_path_start` seconds of path
/// `path_idx` have been printed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanInsert {
    pub path_idx: usize,
    pub time_after_path_start: CoordF,
    pub command: PlanInsertCommand,
}

impl PlanInsert {
    pub fn new(path_idx: usize, time_after_path_start: CoordF, command: PlanInsertCommand) -> Self {
        Self {
            path_idx,
            time_after_path_start,
            command,
        }
    }
}

/// Paths printed by one extruder in one layer.
#[derive(Debug, Clone)]
pub struct ExtruderPlan {
    pub(crate) paths: Vec<GCodePath>,
    pub(crate) inserts: Vec<PlanInsert>,
    extruder_nr: usize,
    layer_nr: i64,
    is_raft_layer: bool,
    layer_thickness: Coord,
    fan_speed_layer_time_settings: FanSpeedLayerTimeSettings,
    retraction_config: RetractionConfig,
    filament_area: CoordF,
    estimator: TimeEstimateCalculator,

    /// Which features the cooling slowdown acts on, see [`GCodePath::needs_slowdown`].
    slowdown_level: u8,
    extrude_speed_factor: CoordF,
    fan_speed: CoordF,
    extra_time: CoordF,
    total_print_time: CoordF,
    estimates: TimeMaterialEstimates,
    min_layer_time_override: Option<CoordF>,
    first_extrusion_acc_jerk: Option<(CoordF, CoordF)>,
}

impl ExtruderPlan {
    pub fn new(
        extruder_nr: usize,
        layer_nr: i64,
        layer_thickness: Coord,
        fan_speed_layer_time_settings: FanSpeedLayerTimeSettings,
        extruder: &ExtruderSettings,
        machine: &MachineSettings,
    ) -> Self {
        let slowdown_level = u8::from(fan_speed_layer_time_settings.cool_slowdown_infill_first);
        Self {
            paths: Vec::new(),
            inserts: Vec::new(),
            extruder_nr,
            layer_nr,
            is_raft_layer: false,
            layer_thickness,
            fan_speed: fan_speed_layer_time_settings.cool_fan_speed_min,
            fan_speed_layer_time_settings,
            retraction_config: extruder.retraction.clone(),
            filament_area: extruder.filament_area(),
            estimator: TimeEstimateCalculator::new(machine),
            slowdown_level,
            extrude_speed_factor: 1.0,
            extra_time: 0.0,
            total_print_time: 0.0,
            estimates: TimeMaterialEstimates::default(),
            min_layer_time_override: None,
            first_extrusion_acc_jerk: None,
        }
    }

    /// Builder method: mark the plan as part of a raft layer.
    pub fn with_raft_layer(mut self, is_raft_layer: bool) -> Self {
        self.is_raft_layer = is_raft_layer;
        self
    }

    pub fn extruder_nr(&self) -> usize {
        self.extruder_nr
    }

    pub fn layer_nr(&self) -> i64 {
        self.layer_nr
    }

    pub fn paths(&self) -> &[GCodePath] {
        &self.paths
    }

    pub fn inserts(&self) -> &[PlanInsert] {
        &self.inserts
    }

    /// Whether nothing has been planned for this extruder.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.inserts.is_empty()
    }

    pub(crate) fn set_extruder_nr(&mut self, extruder_nr: usize) {
        self.extruder_nr = extruder_nr;
    }

    /// Queue a command; inserts stay sorted by path and time.
    pub fn insert_command(&mut self, insert: PlanInsert) {
        let at = self.inserts.partition_point(|other| {
            (other.path_idx, other.time_after_path_start) <= (insert.path_idx, insert.time_after_path_start)
        });
        self.inserts.insert(at, insert);
    }

    pub fn fan_speed(&self) -> CoordF {
        self.fan_speed
    }

    pub fn set_fan_speed(&mut self, fan_speed: CoordF) {
        self.fan_speed = fan_speed;
    }

    pub fn extrude_speed_factor(&self) -> CoordF {
        self.extrude_speed_factor
    }

    pub fn set_extrude_speed_factor(&mut self, factor: CoordF) {
        self.extrude_speed_factor = factor;
    }

    pub fn slowdown_level(&self) -> u8 {
        self.slowdown_level
    }

    /// Dwell time needed to reach the minimum layer time (s).
    pub fn extra_time(&self) -> CoordF {
        self.extra_time
    }

    /// Print time including the dwell, as of the last cooling pass (s).
    pub fn total_print_time(&self) -> CoordF {
        self.total_print_time
    }

    pub fn estimates(&self) -> TimeMaterialEstimates {
        self.estimates
    }

    /// Replace the configured minimum layer time for this plan.
    pub fn set_min_layer_time_override(&mut self, seconds: Option<CoordF>) {
        self.min_layer_time_override = seconds;
    }

    /// Acceleration and jerk of the first extrusion, if any.
    pub fn first_extrusion_acc_jerk(&self) -> Option<(CoordF, CoordF)> {
        self.first_extrusion_acc_jerk
    }

    pub(crate) fn record_first_extrusion_acc_jerk(&mut self, acceleration: CoordF, jerk: CoordF) {
        if self.first_extrusion_acc_jerk.is_none() {
            self.first_extrusion_acc_jerk = Some((acceleration, jerk));
        }
    }

    /// Speed a path is printed at after all factors (mm/s).
    pub fn path_speed(&self, path: &GCodePath) -> CoordF {
        let mut speed = path.config.speed * path.speed_factor;
        if !path.is_travel_path() {
            speed *= path.speed_back_pressure_factor;
            if path.slowed_at(self.slowdown_level) {
                speed *= self.extrude_speed_factor;
            }
        }
        speed
    }

    /// Scale extrusion speeds so thin lines print faster and wide lines slower.
    ///
    /// `compensation` is how strongly the speed follows the width ratio; no
    /// path is sped up beyond `max_speed`.
    pub fn apply_back_pressure_compensation(&mut self, compensation: CoordF, max_speed: CoordF) {
        const MIN_FACTOR: CoordF = 0.001;
        for path in &mut self.paths {
            if path.is_travel_path() || path.config.is_bridge_path {
                continue;
            }
            let nominal = path.config.line_width as CoordF;
            let actual = nominal * path.width_factor;
            if actual <= 0.0 {
                continue;
            }
            let mut factor = (1.0 + (nominal / actual - 1.0) * compensation).max(MIN_FACTOR);
            let speed = path.config.speed * path.speed_factor;
            if speed > 0.0 && max_speed > 0.0 {
                factor = factor.min(max_speed / speed);
            }
            path.speed_back_pressure_factor = factor;
        }
    }

    /// Estimate time and material of every path, starting at `start`.
    ///
    /// Each path stores its own share; the sum is returned and kept.
    pub fn compute_naive_time_estimates(&mut self, start: Point) -> TimeMaterialEstimates {
        let z = unscale(self.layer_thickness) * self.layer_nr.max(0) as CoordF;
        let start_mm = start.to_mm();
        let mut estimator = self.estimator.clone();
        estimator.reset();
        estimator.set_position([start_mm.0, start_mm.1, z, 0.0]);

        let mut ranges = Vec::with_capacity(self.paths.len());
        let mut e = 0.0;
        let mut prev = start;
        for path in &self.paths {
            let speed = self.path_speed(path);
            estimator.set_acceleration(path.config.acceleration);
            estimator.set_max_xy_jerk(path.config.jerk);
            let first_block = estimator.block_count();
            let mm3_per_mm = path.extrusion_mm3_per_mm();
            for p in &path.points {
                let length = prev.distance(p) / SCALING_FACTOR;
                if self.filament_area > 0.0 {
                    e += length * mm3_per_mm / self.filament_area;
                }
                let (x, y) = p.to_mm();
                estimator.plan([x, y, z, e], speed, path.config.feature);
                prev = *p;
            }
            ranges.push(first_block..estimator.block_count());
        }
        let block_times = estimator.block_times();

        let mut total = TimeMaterialEstimates::default();
        let mut was_retracted = false;
        let mut prev = start;
        for (path, range) in self.paths.iter_mut().zip(ranges) {
            let mut estimates = TimeMaterialEstimates::default();
            let time: CoordF = block_times[range].iter().sum();
            if path.is_travel_path() {
                if path.retract {
                    estimates.retracted_travel_time = time;
                } else {
                    estimates.unretracted_travel_time = time;
                }
            } else {
                if path.slowed_at(self.slowdown_level) {
                    estimates.extrude_time = time;
                } else {
                    estimates.fixed_extrude_time = time;
                }
                estimates.material = path.length_from(prev) * path.extrusion_mm3_per_mm();
            }

            if path.retract != was_retracted {
                let config = &self.retraction_config;
                let speed = if path.retract { config.speed } else { config.prime_speed };
                if config.enabled && speed > 0.0 {
                    let t = config.distance / speed;
                    estimates.retracted_travel_time += 0.5 * t;
                    estimates.unretracted_travel_time += 0.5 * t;
                }
                was_retracted = path.retract;
            }

            if let Some(last) = path.points.last() {
                prev = *last;
            }
            path.estimates = estimates;
            total += estimates;
        }
        self.estimates = total;
        total
    }

    /// Slow down extrusions until the plan takes at least `min_time`.
    ///
    /// `fixed_time` is time the slowdown does not touch and `slowable_time`
    /// the time it may stretch. Returns `false` when the slowdown level was
    /// raised and the estimates have to be recomputed before calling again.
    pub fn force_minimal_layer_time(
        &mut self,
        min_time: CoordF,
        min_speed: CoordF,
        fixed_time: CoordF,
        slowable_time: CoordF,
        start: Point,
    ) -> bool {
        let total_time = fixed_time + slowable_time;
        if total_time >= min_time {
            self.extra_time = 0.0;
            self.total_print_time = total_time;
            return true;
        }
        if slowable_time <= 0.0 {
            self.extra_time = min_time - total_time;
            self.total_print_time = min_time;
            return true;
        }

        let min_extrude_time = (min_time - fixed_time).max(1.0);
        let factor = slowable_time / min_extrude_time;

        if self.slowdown_level > 0 {
            let level = self.slowdown_level;
            let mut add_level = false;
            for path in self.paths.iter_mut().filter(|path| path.slowed_at(level)) {
                let base = path.config.speed * path.speed_back_pressure_factor;
                if base <= 0.0 {
                    continue;
                }
                if base * path.speed_factor * factor < min_speed {
                    path.speed_factor = min_speed / base;
                    add_level = true;
                }
            }
            if add_level && self.slowdown_level < 2 {
                self.slowdown_level += 1;
                log::trace!(
                    "layer {} extruder {}: raising slowdown level to {}",
                    self.layer_nr,
                    self.extruder_nr,
                    self.slowdown_level
                );
                return false;
            }
        }

        let level = self.slowdown_level;
        for path in self.paths.iter_mut().filter(|path| path.slowed_at(level)) {
            let base = path.config.speed * path.speed_back_pressure_factor;
            if base <= 0.0 {
                continue;
            }
            let speed = base * path.speed_factor;
            if speed < min_speed {
                path.speed_factor = speed / base / factor;
            } else if speed * factor < min_speed {
                path.speed_factor = min_speed / base / factor;
            }
        }
        if factor < self.extrude_speed_factor {
            self.extrude_speed_factor = factor;
        }

        let estimates = self.compute_naive_time_estimates(start);
        let total = estimates.total_time();
        let missing = min_time - total;
        self.extra_time = if missing > 0.1 { missing } else { 0.0 };
        self.total_print_time = total + self.extra_time;
        true
    }

    /// Apply the minimum layer time (when `force_minimal_layer_time` is set)
    /// and choose the fan speed for this plan.
    pub fn process_fan_speed_and_minimal_layer_time(&mut self, force_minimal_layer_time: bool, start: Point) {
        let settings = self.fan_speed_layer_time_settings.clone();
        let min_time = self.min_layer_time_override.unwrap_or(settings.cool_min_layer_time);

        let mut estimates = self.compute_naive_time_estimates(start);
        if estimates.extrude_time == 0.0 && self.slowdown_level > 0 {
            self.slowdown_level = 0;
            estimates = self.compute_naive_time_estimates(start);
        }
        self.total_print_time = estimates.total_time();
        // Fan speed follows the time before any slowdown.
        let layer_time = estimates.unretracted_travel_time + estimates.total_extrude_time();

        if force_minimal_layer_time {
            loop {
                let done = self.force_minimal_layer_time(
                    min_time,
                    settings.cool_min_speed,
                    estimates.fixed_time(),
                    estimates.extrude_time,
                    start,
                );
                if done {
                    break;
                }
                estimates = self.compute_naive_time_estimates(start);
            }
        }

        self.process_fan_speed_for_minimal_layer_time(force_minimal_layer_time, layer_time, min_time);
        self.process_fan_speed_for_first_layers();

        if self.layer_nr >= settings.cool_fan_full_layer && self.extrude_speed_factor < 1.0 {
            for path in self.paths.iter_mut().filter(|path| !path.is_travel_path()) {
                path.fan_speed = Some(100.0);
            }
        }
        log::debug!(
            "layer {} extruder {}: {:.2}s (+{:.2}s dwell), speed factor {:.3}, fan {:.0}%",
            self.layer_nr,
            self.extruder_nr,
            self.total_print_time - self.extra_time,
            self.extra_time,
            self.extrude_speed_factor,
            self.fan_speed
        );
    }

    fn process_fan_speed_for_minimal_layer_time(&mut self, force: bool, layer_time: CoordF, min_time: CoordF) {
        let s = &self.fan_speed_layer_time_settings;
        self.fan_speed = s.cool_fan_speed_min;
        if force && layer_time < min_time {
            self.fan_speed = s.cool_fan_speed_max;
        } else if min_time >= s.cool_min_layer_time_fan_speed_max {
            self.fan_speed = s.cool_fan_speed_min;
        } else if force && layer_time < s.cool_min_layer_time_fan_speed_max {
            let span = s.cool_min_layer_time_fan_speed_max - min_time;
            let fraction = (layer_time - min_time) / span;
            self.fan_speed = s.cool_fan_speed_max - (s.cool_fan_speed_max - s.cool_fan_speed_min) * fraction;
        }
    }

    fn process_fan_speed_for_first_layers(&mut self) {
        let s = &self.fan_speed_layer_time_settings;
        let full_layer = s.cool_fan_full_layer;
        if self.layer_nr < full_layer && full_layer > 0 && !self.is_raft_layer {
            let layer = self.layer_nr.max(0) as CoordF;
            self.fan_speed = s.cool_fan_speed_0 + (self.fan_speed - s.cool_fan_speed_0) * layer / full_layer as CoordF;
        }
    }
}
