//! Print time estimation with a trapezoidal velocity planner.
//!
//! Every planned move becomes a block with an entry, nominal and exit speed
//! limited by per-axis feedrates, accelerations and jerk. A reverse and a
//! forward pass over the blocks make entry speeds reachable, after which
//! each block takes acceleration + plateau + deceleration time.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::config::MachineSettings;
use crate::CoordF;

use super::path::PrintFeatureType;

/// Slowest speed the planner brings a block down to (mm/s).
pub const MINIMUM_PLANNER_SPEED: CoordF = 0.05;

const X: usize = 0;
const Y: usize = 1;
const Z: usize = 2;
const E: usize = 3;

/// Position in X, Y, Z (mm) and E (mm of filament).
pub type Position = [CoordF; 4];

/// Time and material estimates of a path or plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeMaterialEstimates {
    /// Extrusion time that the cooling slowdown may stretch (s).
    pub extrude_time: CoordF,
    /// Extrusion time kept at its speed at the current slowdown level (s).
    pub fixed_extrude_time: CoordF,
    /// Travel time without retraction (s).
    pub unretracted_travel_time: CoordF,
    /// Travel time while retracted (s).
    pub retracted_travel_time: CoordF,
    /// Extruded material (mm3).
    pub material: CoordF,
}

impl TimeMaterialEstimates {
    /// Time spent on travels.
    pub fn travel_time(&self) -> CoordF {
        self.unretracted_travel_time + self.retracted_travel_time
    }

    /// Time that is not stretched by slowing down extrusions.
    pub fn fixed_time(&self) -> CoordF {
        self.travel_time() + self.fixed_extrude_time
    }

    /// Time spent extruding.
    pub fn total_extrude_time(&self) -> CoordF {
        self.extrude_time + self.fixed_extrude_time
    }

    /// Total time.
    pub fn total_time(&self) -> CoordF {
        self.total_extrude_time() + self.travel_time()
    }
}

impl Add for TimeMaterialEstimates {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl AddAssign for TimeMaterialEstimates {
    fn add_assign(&mut self, other: Self) {
        self.extrude_time += other.extrude_time;
        self.fixed_extrude_time += other.fixed_extrude_time;
        self.unretracted_travel_time += other.unretracted_travel_time;
        self.retracted_travel_time += other.retracted_travel_time;
        self.material += other.material;
    }
}

#[derive(Debug, Clone)]
struct Block {
    feature: PrintFeatureType,
    accelerate_until: CoordF,
    decelerate_after: CoordF,
    initial_feedrate: CoordF,
    final_feedrate: CoordF,
    entry_speed: CoordF,
    max_entry_speed: CoordF,
    nominal_length_flag: bool,
    recalculate_flag: bool,
    distance: CoordF,
    acceleration: CoordF,
    nominal_feedrate: CoordF,
}

impl Block {
    /// Shape the velocity profile for the given entry and exit factors.
    fn calculate_trapezoid(&mut self, entry_factor: CoordF, exit_factor: CoordF) {
        let initial = self.nominal_feedrate * entry_factor;
        let final_ = self.nominal_feedrate * exit_factor;

        let mut accelerate = acceleration_distance(initial, self.nominal_feedrate, self.acceleration);
        let decelerate = acceleration_distance(self.nominal_feedrate, final_, -self.acceleration);
        let mut plateau = self.distance - accelerate - decelerate;

        // Nominal speed is never reached: accelerate up to the meeting point.
        if plateau < 0.0 {
            accelerate = intersection_distance(initial, final_, self.acceleration, self.distance)
                .clamp(0.0, self.distance);
            plateau = 0.0;
        }

        self.accelerate_until = accelerate;
        self.decelerate_after = accelerate + plateau;
        self.initial_feedrate = initial;
        self.final_feedrate = final_;
    }

    fn time(&self) -> CoordF {
        let plateau = self.decelerate_after - self.accelerate_until;
        let mut time = acceleration_time(self.initial_feedrate, self.accelerate_until, self.acceleration);
        if self.nominal_feedrate > 0.0 {
            time += plateau / self.nominal_feedrate;
        }
        time + acceleration_time(self.final_feedrate, self.distance - self.decelerate_after, self.acceleration)
    }
}

/// Distance needed to go from `initial` to `target` speed.
fn acceleration_distance(initial: CoordF, target: CoordF, acceleration: CoordF) -> CoordF {
    if acceleration == 0.0 {
        return 0.0;
    }
    (target * target - initial * initial) / (2.0 * acceleration)
}

/// Distance after which a block accelerating from `initial` must start
/// decelerating to end at `final_`.
fn intersection_distance(initial: CoordF, final_: CoordF, acceleration: CoordF, distance: CoordF) -> CoordF {
    if acceleration == 0.0 {
        return 0.0;
    }
    (2.0 * acceleration * distance - initial * initial + final_ * final_) / (4.0 * acceleration)
}

/// Highest speed from which `target` is reachable over `distance`.
fn max_allowable_speed(acceleration: CoordF, target: CoordF, distance: CoordF) -> CoordF {
    (target * target - 2.0 * acceleration * distance).max(0.0).sqrt()
}

/// Time to cover `distance` starting at `velocity` with constant acceleration.
fn acceleration_time(velocity: CoordF, distance: CoordF, acceleration: CoordF) -> CoordF {
    if distance <= 0.0 {
        return 0.0;
    }
    if acceleration == 0.0 {
        return if velocity > 0.0 { distance / velocity } else { 0.0 };
    }
    let discriminant = (velocity * velocity + 2.0 * acceleration * distance).max(0.0);
    (-velocity + discriminant.sqrt()) / acceleration
}

/// Motion planner used to estimate how long a sequence of moves takes.
#[derive(Debug, Clone)]
pub struct TimeEstimateCalculator {
    max_feedrate: [CoordF; 4],
    max_acceleration: [CoordF; 4],
    minimum_feedrate: CoordF,
    acceleration: CoordF,
    max_xy_jerk: CoordF,
    max_z_jerk: CoordF,
    max_e_jerk: CoordF,

    previous_feedrate: [CoordF; 4],
    previous_nominal_feedrate: CoordF,
    position: Position,
    blocks: Vec<Block>,
    extra_time: CoordF,
}

impl Default for TimeEstimateCalculator {
    fn default() -> Self {
        Self::new(&MachineSettings::default())
    }
}

impl TimeEstimateCalculator {
    /// Planner with the machine's kinematic limits.
    pub fn new(machine: &MachineSettings) -> Self {
        Self {
            max_feedrate: machine.max_feedrate,
            max_acceleration: machine.max_acceleration,
            minimum_feedrate: machine.minimum_feedrate,
            acceleration: machine.acceleration,
            max_xy_jerk: machine.max_xy_jerk,
            max_z_jerk: machine.max_z_jerk,
            max_e_jerk: machine.max_e_jerk,
            previous_feedrate: [0.0; 4],
            previous_nominal_feedrate: 0.0,
            position: [0.0; 4],
            blocks: Vec::new(),
            extra_time: 0.0,
        }
    }

    /// Forget all planned moves.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.extra_time = 0.0;
        self.previous_feedrate = [0.0; 4];
        self.previous_nominal_feedrate = 0.0;
    }

    /// Set the position the next move starts from.
    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Current position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Acceleration used for following moves (mm/s2).
    pub fn set_acceleration(&mut self, acceleration: CoordF) {
        self.acceleration = acceleration;
    }

    /// XY jerk used for following moves (mm/s).
    pub fn set_max_xy_jerk(&mut self, jerk: CoordF) {
        self.max_xy_jerk = jerk;
    }

    /// Add a fixed amount of time, such as a dwell.
    pub fn add_time(&mut self, seconds: CoordF) {
        self.extra_time += seconds;
    }

    /// Number of blocks planned so far.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Plan a move to `target` at `feedrate` (mm/s).
    pub fn plan(&mut self, target: Position, feedrate: CoordF, feature: PrintFeatureType) {
        let mut delta = [0.0; 4];
        let mut abs_delta = [0.0; 4];
        let mut max_travel: CoordF = 0.0;
        for n in 0..4 {
            delta[n] = target[n] - self.position[n];
            abs_delta[n] = delta[n].abs();
            max_travel = max_travel.max(abs_delta[n]);
        }
        if max_travel <= 0.0 {
            return;
        }
        let feedrate = feedrate.max(self.minimum_feedrate);

        let mut distance = (abs_delta[X].powi(2) + abs_delta[Y].powi(2) + abs_delta[Z].powi(2)).sqrt();
        if distance <= 0.0 {
            distance = abs_delta[E];
        }
        let mut nominal_feedrate = feedrate;

        let mut current_feedrate = [0.0; 4];
        let mut current_abs_feedrate = [0.0; 4];
        let mut feedrate_factor: CoordF = 1.0;
        for n in 0..4 {
            current_feedrate[n] = delta[n] * feedrate / distance;
            current_abs_feedrate[n] = current_feedrate[n].abs();
            if current_abs_feedrate[n] > self.max_feedrate[n] && self.max_feedrate[n] > 0.0 {
                feedrate_factor = feedrate_factor.min(self.max_feedrate[n] / current_abs_feedrate[n]);
            }
        }
        if feedrate_factor < 1.0 {
            for n in 0..4 {
                current_feedrate[n] *= feedrate_factor;
                current_abs_feedrate[n] *= feedrate_factor;
            }
            nominal_feedrate *= feedrate_factor;
        }

        let mut acceleration = self.acceleration;
        for n in 0..4 {
            if acceleration * (abs_delta[n] / distance) > self.max_acceleration[n] {
                acceleration = self.max_acceleration[n];
            }
        }

        let mut vmax_junction = self.max_xy_jerk / 2.0;
        if current_abs_feedrate[Z] > self.max_z_jerk / 2.0 {
            vmax_junction = vmax_junction.min(self.max_z_jerk / 2.0);
        }
        if current_abs_feedrate[E] > self.max_e_jerk / 2.0 {
            vmax_junction = vmax_junction.min(self.max_e_jerk / 2.0);
        }
        vmax_junction = vmax_junction.min(nominal_feedrate);
        let safe_speed = vmax_junction;

        if !self.blocks.is_empty() && self.previous_nominal_feedrate > 0.0001 {
            let xy_jerk = ((current_feedrate[X] - self.previous_feedrate[X]).powi(2)
                + (current_feedrate[Y] - self.previous_feedrate[Y]).powi(2))
            .sqrt();
            let mut factor: CoordF = 1.0;
            if xy_jerk > self.max_xy_jerk {
                factor = self.max_xy_jerk / xy_jerk;
            }
            let z_jerk = (current_feedrate[Z] - self.previous_feedrate[Z]).abs();
            if z_jerk > self.max_z_jerk {
                factor = factor.min(self.max_z_jerk / z_jerk);
            }
            let e_jerk = (current_feedrate[E] - self.previous_feedrate[E]).abs();
            if e_jerk > self.max_e_jerk {
                factor = factor.min(self.max_e_jerk / e_jerk);
            }
            vmax_junction = self.previous_nominal_feedrate.min(nominal_feedrate * factor);
        }

        let v_allowable = max_allowable_speed(-acceleration, MINIMUM_PLANNER_SPEED, distance);
        let mut block = Block {
            feature,
            accelerate_until: 0.0,
            decelerate_after: 0.0,
            initial_feedrate: 0.0,
            final_feedrate: 0.0,
            entry_speed: vmax_junction.min(v_allowable),
            max_entry_speed: vmax_junction,
            nominal_length_flag: nominal_feedrate <= v_allowable,
            recalculate_flag: true,
            distance,
            acceleration,
            nominal_feedrate,
        };

        self.previous_feedrate = current_feedrate;
        self.previous_nominal_feedrate = nominal_feedrate;
        self.position = target;

        if nominal_feedrate <= 0.0 {
            return;
        }
        block.calculate_trapezoid(block.entry_speed / nominal_feedrate, safe_speed / nominal_feedrate);
        self.blocks.push(block);
    }

    /// Total time per feature type, indexed by [`PrintFeatureType::index`].
    ///
    /// Time added with [`add_time`](Self::add_time) is reported under
    /// [`PrintFeatureType::NoneType`].
    pub fn calculate(&mut self) -> [CoordF; PrintFeatureType::COUNT] {
        self.plan_velocities();
        let mut totals = [0.0; PrintFeatureType::COUNT];
        totals[PrintFeatureType::NoneType.index()] = self.extra_time;
        for block in &self.blocks {
            totals[block.feature.index()] += block.time();
        }
        totals
    }

    /// Time of every planned block in planning order.
    pub fn block_times(&mut self) -> Vec<CoordF> {
        self.plan_velocities();
        self.blocks.iter().map(Block::time).collect()
    }

    fn plan_velocities(&mut self) {
        self.reverse_pass();
        self.forward_pass();
        self.recalculate_trapezoids();
    }

    /// Lower entry speeds so every block can decelerate into the next one.
    fn reverse_pass(&mut self) {
        for n in (0..self.blocks.len().saturating_sub(1)).rev() {
            let next_entry = self.blocks[n + 1].entry_speed;
            let current = &mut self.blocks[n];
            if current.entry_speed != current.max_entry_speed {
                if !current.nominal_length_flag && current.max_entry_speed > next_entry {
                    current.entry_speed = current
                        .max_entry_speed
                        .min(max_allowable_speed(-current.acceleration, next_entry, current.distance));
                } else {
                    current.entry_speed = current.max_entry_speed;
                }
                current.recalculate_flag = true;
            }
        }
    }

    /// Lower entry speeds that cannot be reached from the previous block.
    fn forward_pass(&mut self) {
        for n in 1..self.blocks.len() {
            let (head, tail) = self.blocks.split_at_mut(n);
            let prev = &head[n - 1];
            let current = &mut tail[0];
            if !prev.nominal_length_flag && prev.entry_speed < current.entry_speed {
                let entry_speed = current
                    .entry_speed
                    .min(max_allowable_speed(-prev.acceleration, prev.entry_speed, prev.distance));
                if current.entry_speed != entry_speed {
                    current.entry_speed = entry_speed;
                    current.recalculate_flag = true;
                }
            }
        }
    }

    fn recalculate_trapezoids(&mut self) {
        let count = self.blocks.len();
        for n in 0..count.saturating_sub(1) {
            let next_entry = self.blocks[n + 1].entry_speed;
            let next_flag = self.blocks[n + 1].recalculate_flag;
            let current = &mut self.blocks[n];
            if current.recalculate_flag || next_flag {
                let nominal = current.nominal_feedrate;
                current.calculate_trapezoid(current.entry_speed / nominal, next_entry / nominal);
                current.recalculate_flag = false;
            }
        }
        if let Some(last) = self.blocks.last_mut() {
            let nominal = last.nominal_feedrate;
            last.calculate_trapezoid(last.entry_speed / nominal, MINIMUM_PLANNER_SPEED / nominal);
            last.recalculate_flag = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator() -> TimeEstimateCalculator {
        TimeEstimateCalculator::new(&MachineSettings::default())
    }

    fn total(times: &[CoordF]) -> CoordF {
        times.iter().sum()
    }

    #[test]
    fn test_single_move_is_slower_than_constant_speed() {
        let mut calc = calculator();
        calc.plan([100.0, 0.0, 0.0, 0.0], 50.0, PrintFeatureType::Infill);
        let times = calc.calculate();
        let t = times[PrintFeatureType::Infill.index()];
        assert!(t > 2.0);
        // Ramps at 3000 mm/s2 cost a few hundredths of a second.
        assert!(t < 2.1);
        assert_eq!(total(&times), t);
    }

    #[test]
    fn test_short_move_never_reaches_nominal_speed() {
        let mut calc = calculator();
        calc.set_acceleration(100.0);
        calc.plan([1.0, 0.0, 0.0, 0.0], 200.0, PrintFeatureType::OuterWall);
        let t = total(&calc.calculate());
        assert!(t > 1.0 / 200.0);
        // Bounded by accelerating from rest over both halves.
        let expected = 2.0 * ((2.0 * 0.5 / 100.0) as CoordF).sqrt();
        assert!(t < expected * 1.1);
    }

    #[test]
    fn test_zero_length_move_is_ignored() {
        let mut calc = calculator();
        calc.plan([0.0, 0.0, 0.0, 0.0], 50.0, PrintFeatureType::Infill);
        assert_eq!(calc.block_count(), 0);
        assert_eq!(total(&calc.calculate()), 0.0);
    }

    #[test]
    fn test_feedrate_is_limited_per_axis() {
        let mut calc = calculator();
        calc.set_acceleration(1.0e6);
        // Z may only move at 12 mm/s.
        calc.plan([0.0, 0.0, 12.0, 0.0], 100.0, PrintFeatureType::MoveCombing);
        let t = total(&calc.calculate());
        assert!(t >= 1.0 && t < 1.2);
    }

    #[test]
    fn test_extra_time_is_reported_separately() {
        let mut calc = calculator();
        calc.add_time(3.0);
        calc.plan([10.0, 0.0, 0.0, 0.0], 10.0, PrintFeatureType::Skin);
        let times = calc.calculate();
        assert_eq!(times[PrintFeatureType::NoneType.index()], 3.0);
        assert!(times[PrintFeatureType::Skin.index()] > 0.9);
    }

    #[test]
    fn test_block_times_sum_to_total() {
        let mut calc = calculator();
        let corners = [[20.0, 0.0], [20.0, 20.0], [0.0, 20.0], [0.0, 0.0]];
        for [x, y] in corners {
            calc.plan([x, y, 0.0, 0.0], 60.0, PrintFeatureType::OuterWall);
        }
        let blocks = calc.block_times();
        assert_eq!(blocks.len(), 4);
        assert!((total(&blocks) - total(&calc.calculate())).abs() < 1e-9);
        // Every corner costs time over the straight-line estimate.
        assert!(total(&blocks) > 80.0 / 60.0);
    }

    #[test]
    fn test_estimates_arithmetic() {
        let a = TimeMaterialEstimates {
            extrude_time: 1.0,
            fixed_extrude_time: 0.5,
            unretracted_travel_time: 0.25,
            retracted_travel_time: 0.25,
            material: 2.0,
        };
        let sum = a + a;
        assert_eq!(sum.total_time(), 4.0);
        assert_eq!(sum.fixed_time(), 2.0);
        assert_eq!(sum.material, 4.0);
    }
}
