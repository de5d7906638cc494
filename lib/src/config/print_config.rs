//! Typed setting bundles.
//!
//! Each bundle groups the settings one component reads, in scaled units where
//! the value is a length. Bundles are built from a [`Settings`] store with
//! `from_settings` (missing keys fall back to the `Default` value) or
//! assembled directly with the builder methods.

use crate::config::settings::{FromSetting, Settings, SettingsResult};
use crate::geometry::Point;
use crate::{Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How travel moves are kept inside printed material.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombingMode {
    /// No combing, every long travel retracts.
    Off,
    /// Comb through the whole part outline.
    #[default]
    All,
    /// Avoid travelling over skin areas.
    NoSkin,
    /// Avoid travelling over top and bottom surfaces.
    NoOuterSurfaces,
    /// Comb only through infill areas.
    Infill,
}

impl FromSetting for CombingMode {
    const EXPECTED: &'static str = "combing mode";

    fn from_setting(raw: &str) -> Option<Self> {
        match raw.trim() {
            "off" => Some(Self::Off),
            "all" => Some(Self::All),
            "noskin" => Some(Self::NoSkin),
            "no_outer_surfaces" => Some(Self::NoOuterSurfaces),
            "infill" => Some(Self::Infill),
            _ => None,
        }
    }
}

/// Nozzle lift style during a retracted travel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZHopType {
    /// Straight vertical lift.
    #[default]
    DirectLift,
    /// Lift while moving on a small helix.
    SpiralLift,
    /// Lift and travel combined into a ramp.
    TrapezoidalLift,
}

impl FromSetting for ZHopType {
    const EXPECTED: &'static str = "z-hop type";

    fn from_setting(raw: &str) -> Option<Self> {
        match raw.trim() {
            "direct_lift" | "normal" => Some(Self::DirectLift),
            "spiral_lift" | "spiral" => Some(Self::SpiralLift),
            "trapezoidal_lift" | "trapezoidal" => Some(Self::TrapezoidalLift),
            _ => None,
        }
    }
}

// ============================================================================
// Walls
// ============================================================================

/// Settings for variable-width wall generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WallSettings {
    // === Widths ===
    /// Outer wall line width.
    pub wall_line_width_0: Coord,
    /// Inner wall line width.
    pub wall_line_width_x: Coord,
    /// Number of walls.
    pub wall_line_count: usize,
    /// Extra inward offset of the outer wall.
    pub wall_0_inset: Coord,

    // === Transitions ===
    /// Distance over which a bead count change is smoothed.
    pub wall_transition_length: Coord,
    /// Maximum taper angle (radians) at which bead counts may change.
    pub wall_transition_angle: CoordF,
    /// Bead count changes closer together than this are merged.
    pub wall_transition_filter_distance: Coord,
    /// Allowed width deviation when merging bead count changes.
    pub wall_transition_filter_deviation: Coord,
    /// Number of beads over which surplus width is spread.
    pub wall_distribution_count: usize,

    // === Minimum widths ===
    /// Minimum width of the two beads an odd middle bead splits into.
    pub min_even_wall_line_width: Coord,
    /// Minimum width of an added odd middle bead.
    pub min_odd_wall_line_width: Coord,
    /// Features thinner than this are dropped.
    pub min_feature_size: Coord,
    /// Narrowest bead printed for thin features.
    pub min_bead_width: Coord,
    /// Print thin features with a single widened bead.
    pub fill_outline_gaps: bool,

    // === Resolution ===
    /// Segments shorter than this may be merged by simplification.
    pub meshfix_maximum_resolution: Coord,
    /// Maximum deviation of a simplified line from the original.
    pub meshfix_maximum_deviation: Coord,
    /// Maximum extrusion area change allowed when merging junctions of different widths.
    pub meshfix_maximum_extrusion_area_deviation: Coord,
}

impl Default for WallSettings {
    fn default() -> Self {
        Self {
            wall_line_width_0: 400,
            wall_line_width_x: 400,
            wall_line_count: 3,
            wall_0_inset: 0,
            wall_transition_length: 400,
            wall_transition_angle: 10f64.to_radians(),
            wall_transition_filter_distance: 100_000,
            wall_transition_filter_deviation: 100,
            wall_distribution_count: 1,
            min_even_wall_line_width: 340,
            min_odd_wall_line_width: 340,
            min_feature_size: 100,
            min_bead_width: 340,
            fill_outline_gaps: false,
            meshfix_maximum_resolution: 500,
            meshfix_maximum_deviation: 25,
            meshfix_maximum_extrusion_area_deviation: 50_000,
        }
    }
}

impl WallSettings {
    /// Read from a settings store.
    pub fn from_settings(s: &Settings) -> SettingsResult<Self> {
        let d = Self::default();
        Ok(Self {
            wall_line_width_0: s.get_coord_or("wall_line_width_0", d.wall_line_width_0)?,
            wall_line_width_x: s.get_coord_or("wall_line_width_x", d.wall_line_width_x)?,
            wall_line_count: s.get_or("wall_line_count", d.wall_line_count)?,
            wall_0_inset: s.get_coord_or("wall_0_inset", d.wall_0_inset)?,
            wall_transition_length: s.get_coord_or("wall_transition_length", d.wall_transition_length)?,
            wall_transition_angle: s.get_angle_or("wall_transition_angle", d.wall_transition_angle)?,
            wall_transition_filter_distance: s.get_coord_or(
                "wall_transition_filter_distance",
                d.wall_transition_filter_distance,
            )?,
            wall_transition_filter_deviation: s.get_coord_or(
                "wall_transition_filter_deviation",
                d.wall_transition_filter_deviation,
            )?,
            wall_distribution_count: s.get_or("wall_distribution_count", d.wall_distribution_count)?,
            min_even_wall_line_width: s.get_coord_or("min_even_wall_line_width", d.min_even_wall_line_width)?,
            min_odd_wall_line_width: s.get_coord_or("min_odd_wall_line_width", d.min_odd_wall_line_width)?,
            min_feature_size: s.get_coord_or("min_feature_size", d.min_feature_size)?,
            min_bead_width: s.get_coord_or("min_bead_width", d.min_bead_width)?,
            fill_outline_gaps: s.get_or("fill_outline_gaps", d.fill_outline_gaps)?,
            meshfix_maximum_resolution: s
                .get_coord_or("meshfix_maximum_resolution", d.meshfix_maximum_resolution)?,
            meshfix_maximum_deviation: s.get_coord_or("meshfix_maximum_deviation", d.meshfix_maximum_deviation)?,
            // Given in square micrometers, so not scaled.
            meshfix_maximum_extrusion_area_deviation: s.get_or(
                "meshfix_maximum_extrusion_area_deviation",
                d.meshfix_maximum_extrusion_area_deviation,
            )?,
        })
    }

    /// Builder method: set both line widths.
    pub fn with_line_width(mut self, width: Coord) -> Self {
        self.wall_line_width_0 = width;
        self.wall_line_width_x = width;
        self
    }

    /// Builder method: set the wall count.
    pub fn with_wall_count(mut self, count: usize) -> Self {
        self.wall_line_count = count;
        self
    }

    /// Builder method: enable thin feature printing.
    pub fn with_fill_outline_gaps(mut self, enabled: bool) -> Self {
        self.fill_outline_gaps = enabled;
        self
    }

    /// Builder method: set the outer wall inset.
    pub fn with_wall_0_inset(mut self, inset: Coord) -> Self {
        self.wall_0_inset = inset;
        self
    }

    /// Builder method: set the distribution count.
    pub fn with_distribution_count(mut self, count: usize) -> Self {
        self.wall_distribution_count = count;
        self
    }

    /// Threshold (fraction of the outer width) above which an odd middle bead splits in two.
    pub fn split_middle_threshold(&self) -> CoordF {
        let w0 = self.wall_line_width_0.max(1) as CoordF;
        ((2.0 * self.min_even_wall_line_width as CoordF - w0) / w0).clamp(0.01, 0.99)
    }

    /// Threshold (fraction of the inner width) above which a middle bead is added.
    pub fn add_middle_threshold(&self) -> CoordF {
        let wx = self.wall_line_width_x.max(1) as CoordF;
        (self.min_odd_wall_line_width as CoordF / wx).clamp(0.01, 0.99)
    }
}

// ============================================================================
// Retraction and coasting
// ============================================================================

/// Retraction behaviour of one extruder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetractionConfig {
    /// Whether travels may retract at all.
    pub enabled: bool,
    /// Filament length retracted (mm).
    pub distance: CoordF,
    /// Retract speed (mm/s).
    pub speed: CoordF,
    /// Unretract speed (mm/s).
    pub prime_speed: CoordF,
    /// Extra material primed after a travel (mm3).
    pub prime_volume: CoordF,
    /// Z-hop height, zero for none.
    pub z_hop: Coord,
    /// Whether z-hop is performed on retracted travels.
    pub z_hop_enabled: bool,
    /// Z-hop style.
    pub z_hop_type: ZHopType,
    /// Travels shorter than this never retract.
    pub retraction_min_travel_distance: Coord,
    /// Window (mm of filament) in which retractions are counted.
    pub retraction_extrusion_window: CoordF,
    /// Maximum retractions within the extrusion window.
    pub retraction_count_max: usize,
}

impl Default for RetractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            distance: 6.5,
            speed: 25.0,
            prime_speed: 25.0,
            prime_volume: 0.0,
            z_hop: 200,
            z_hop_enabled: false,
            z_hop_type: ZHopType::DirectLift,
            retraction_min_travel_distance: 1_500,
            retraction_extrusion_window: 6.5,
            retraction_count_max: 90,
        }
    }
}

impl RetractionConfig {
    /// Read from a settings store.
    pub fn from_settings(s: &Settings) -> SettingsResult<Self> {
        let d = Self::default();
        let distance = s.get_or("retraction_amount", d.distance)?;
        Ok(Self {
            enabled: s.get_or("retraction_enable", d.enabled)?,
            distance,
            speed: s.get_or("retraction_retract_speed", d.speed)?,
            prime_speed: s.get_or("retraction_prime_speed", d.prime_speed)?,
            prime_volume: s.get_or("retraction_extra_prime_amount", d.prime_volume)?,
            z_hop: s.get_coord_or("retraction_hop", d.z_hop)?,
            z_hop_enabled: s.get_or("retraction_hop_enabled", d.z_hop_enabled)?,
            z_hop_type: s.get_or("retraction_hop_type", d.z_hop_type)?,
            retraction_min_travel_distance: s.get_coord_or("retraction_min_travel", d.retraction_min_travel_distance)?,
            retraction_extrusion_window: s.get_or("retraction_extrusion_window", distance)?,
            retraction_count_max: s.get_or("retraction_count_max", d.retraction_count_max)?,
        })
    }

    /// Builder method: set the minimum travel distance that retracts.
    pub fn with_min_travel_distance(mut self, distance: Coord) -> Self {
        self.retraction_min_travel_distance = distance;
        self
    }

    /// Builder method: enable z-hop with the given height.
    pub fn with_z_hop(mut self, height: Coord) -> Self {
        self.z_hop = height;
        self.z_hop_enabled = height > 0;
        self
    }
}

/// Coasting behaviour of one extruder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoastingConfig {
    /// Whether coasting is applied.
    pub enabled: bool,
    /// Volume (mm3) that would ooze and is therefore not extruded.
    pub volume: CoordF,
    /// Speed of the coasting move relative to the extrusion speed.
    pub speed: CoordF,
    /// Paths with less volume than this coast proportionally less.
    pub min_volume: CoordF,
}

impl Default for CoastingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            volume: 0.064,
            speed: 0.9,
            min_volume: 0.8,
        }
    }
}

impl CoastingConfig {
    /// Read from a settings store.
    pub fn from_settings(s: &Settings) -> SettingsResult<Self> {
        let d = Self::default();
        Ok(Self {
            enabled: s.get_or("coasting_enable", d.enabled)?,
            volume: s.get_or("coasting_volume", d.volume)?,
            speed: s.get_ratio_or("coasting_speed", d.speed)?,
            min_volume: s.get_or("coasting_min_volume", d.min_volume)?,
        })
    }

    /// Builder method: enable coasting with a volume.
    pub fn with_volume(mut self, volume: CoordF) -> Self {
        self.enabled = true;
        self.volume = volume;
        self
    }
}

// ============================================================================
// Machine
// ============================================================================

/// Per-extruder machine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtruderSettings {
    /// Nozzle diameter.
    pub nozzle_size: Coord,
    /// Offset of this nozzle relative to the first one.
    pub nozzle_offset: Point,
    /// Filament diameter (mm).
    pub material_diameter: CoordF,
    /// Position travelled to when the extruder becomes active.
    pub start_pos: Point,
    /// Whether `start_pos` is absolute rather than relative to the last position.
    pub start_pos_abs: bool,
    /// Position travelled to before the extruder is switched off.
    pub end_pos: Point,
    /// Whether `end_pos` is absolute.
    pub end_pos_abs: bool,
    /// Retraction on ordinary travels.
    pub retraction: RetractionConfig,
    /// Retraction on extruder switches.
    pub switch_retraction: RetractionConfig,
    /// Coasting at the end of extrusion paths.
    pub coasting: CoastingConfig,
    /// Lift the nozzle after a switch to this extruder.
    pub retraction_hop_after_extruder_switch: bool,
}

impl Default for ExtruderSettings {
    fn default() -> Self {
        Self {
            nozzle_size: 400,
            nozzle_offset: Point::zero(),
            material_diameter: 1.75,
            start_pos: Point::zero(),
            start_pos_abs: false,
            end_pos: Point::zero(),
            end_pos_abs: false,
            retraction: RetractionConfig::default(),
            switch_retraction: RetractionConfig {
                distance: 16.0,
                speed: 20.0,
                prime_speed: 20.0,
                ..RetractionConfig::default()
            },
            coasting: CoastingConfig::default(),
            retraction_hop_after_extruder_switch: true,
        }
    }
}

impl ExtruderSettings {
    /// Read from an extruder settings store.
    pub fn from_settings(s: &Settings) -> SettingsResult<Self> {
        let d = Self::default();
        let retraction = RetractionConfig::from_settings(s)?;
        let switch_retraction = RetractionConfig {
            distance: s.get_or("switch_extruder_retraction_amount", d.switch_retraction.distance)?,
            speed: s.get_or("switch_extruder_retraction_speed", d.switch_retraction.speed)?,
            prime_speed: s.get_or("switch_extruder_prime_speed", d.switch_retraction.prime_speed)?,
            ..retraction.clone()
        };
        Ok(Self {
            nozzle_size: s.get_coord_or("machine_nozzle_size", d.nozzle_size)?,
            nozzle_offset: Point::new(
                s.get_coord_or("machine_nozzle_offset_x", 0)?,
                s.get_coord_or("machine_nozzle_offset_y", 0)?,
            ),
            material_diameter: s.get_or("material_diameter", d.material_diameter)?,
            start_pos: Point::new(
                s.get_coord_or("machine_extruder_start_pos_x", 0)?,
                s.get_coord_or("machine_extruder_start_pos_y", 0)?,
            ),
            start_pos_abs: s.get_or("machine_extruder_start_pos_abs", d.start_pos_abs)?,
            end_pos: Point::new(
                s.get_coord_or("machine_extruder_end_pos_x", 0)?,
                s.get_coord_or("machine_extruder_end_pos_y", 0)?,
            ),
            end_pos_abs: s.get_or("machine_extruder_end_pos_abs", d.end_pos_abs)?,
            retraction,
            switch_retraction,
            coasting: CoastingConfig::from_settings(s)?,
            retraction_hop_after_extruder_switch: s.get_or(
                "retraction_hop_after_extruder_switch",
                d.retraction_hop_after_extruder_switch,
            )?,
        })
    }

    /// Cross-section of the filament (mm2).
    pub fn filament_area(&self) -> CoordF {
        std::f64::consts::PI * (self.material_diameter / 2.0).powi(2)
    }
}

/// Machine-wide settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineSettings {
    /// Build plate width.
    pub machine_width: Coord,
    /// Build plate depth.
    pub machine_depth: Coord,
    /// Build volume height.
    pub machine_height: Coord,
    /// Whether the origin is at the plate centre.
    pub machine_center_is_zero: bool,
    /// Maximum feedrate per axis X, Y, Z, E (mm/s).
    pub max_feedrate: [CoordF; 4],
    /// Maximum acceleration per axis X, Y, Z, E (mm/s2).
    pub max_acceleration: [CoordF; 4],
    /// Default acceleration (mm/s2).
    pub acceleration: CoordF,
    /// Maximum XY jerk (mm/s).
    pub max_xy_jerk: CoordF,
    /// Maximum Z jerk (mm/s).
    pub max_z_jerk: CoordF,
    /// Maximum E jerk (mm/s).
    pub max_e_jerk: CoordF,
    /// Slowest feedrate the firmware plans (mm/s).
    pub minimum_feedrate: CoordF,
    /// Per-extruder settings, indexed by extruder number.
    pub extruders: Vec<ExtruderSettings>,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            machine_width: 220_000,
            machine_depth: 220_000,
            machine_height: 250_000,
            machine_center_is_zero: false,
            max_feedrate: [500.0, 500.0, 12.0, 120.0],
            max_acceleration: [3000.0, 3000.0, 100.0, 10000.0],
            acceleration: 3000.0,
            max_xy_jerk: 20.0,
            max_z_jerk: 0.4,
            max_e_jerk: 5.0,
            minimum_feedrate: 0.0,
            extruders: vec![ExtruderSettings::default()],
        }
    }
}

impl MachineSettings {
    /// Read machine settings from the global store and one store per extruder.
    pub fn from_settings(global: &Settings, extruders: &[Settings]) -> SettingsResult<Self> {
        let d = Self::default();
        let axis = |prefix: &str, defaults: [CoordF; 4]| -> SettingsResult<[CoordF; 4]> {
            Ok([
                global.get_or(&format!("{prefix}_x"), defaults[0])?,
                global.get_or(&format!("{prefix}_y"), defaults[1])?,
                global.get_or(&format!("{prefix}_z"), defaults[2])?,
                global.get_or(&format!("{prefix}_e"), defaults[3])?,
            ])
        };
        let extruders = if extruders.is_empty() {
            vec![ExtruderSettings::from_settings(global)?]
        } else {
            extruders
                .iter()
                .map(ExtruderSettings::from_settings)
                .collect::<SettingsResult<Vec<_>>>()?
        };
        Ok(Self {
            machine_width: global.get_coord_or("machine_width", d.machine_width)?,
            machine_depth: global.get_coord_or("machine_depth", d.machine_depth)?,
            machine_height: global.get_coord_or("machine_height", d.machine_height)?,
            machine_center_is_zero: global.get_or("machine_center_is_zero", d.machine_center_is_zero)?,
            max_feedrate: axis("machine_max_feedrate", d.max_feedrate)?,
            max_acceleration: axis("machine_max_acceleration", d.max_acceleration)?,
            acceleration: global.get_or("machine_acceleration", d.acceleration)?,
            max_xy_jerk: global.get_or("machine_max_jerk_xy", d.max_xy_jerk)?,
            max_z_jerk: global.get_or("machine_max_jerk_z", d.max_z_jerk)?,
            max_e_jerk: global.get_or("machine_max_jerk_e", d.max_e_jerk)?,
            minimum_feedrate: global.get_or("machine_minimum_feedrate", d.minimum_feedrate)?,
            extruders,
        })
    }

    /// Settings of one extruder, falling back to the first one.
    pub fn extruder(&self, extruder_nr: usize) -> &ExtruderSettings {
        self.extruders
            .get(extruder_nr)
            .or_else(|| self.extruders.first())
            .unwrap_or_else(|| default_extruder())
    }

    /// Physical build plate bounds in printer coordinates.
    pub fn build_plate(&self) -> (Point, Point) {
        if self.machine_center_is_zero {
            let half = Point::new(self.machine_width / 2, self.machine_depth / 2);
            (-half, half)
        } else {
            (Point::zero(), Point::new(self.machine_width, self.machine_depth))
        }
    }
}

fn default_extruder() -> &'static ExtruderSettings {
    static DEFAULT: std::sync::OnceLock<ExtruderSettings> = std::sync::OnceLock::new();
    DEFAULT.get_or_init(ExtruderSettings::default)
}

// ============================================================================
// Travel
// ============================================================================

/// Combing and travel avoidance settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombingSettings {
    /// Combing mode.
    pub mode: CombingMode,
    /// Combed travels longer than this retract anyway; zero disables the limit.
    pub max_distance: Coord,
    /// Route travels around other parts.
    pub avoid_other_parts: bool,
    /// Route travels around support.
    pub avoid_supports: bool,
    /// Clearance kept from parts when avoiding them.
    pub avoid_distance: Coord,
    /// Skip retractions on travels between support lines.
    pub limit_support_retractions: bool,
    /// Always retract before travelling to an outer wall.
    pub retract_before_outer_wall: bool,
}

impl Default for CombingSettings {
    fn default() -> Self {
        Self {
            mode: CombingMode::All,
            max_distance: 0,
            avoid_other_parts: true,
            avoid_supports: false,
            avoid_distance: 625,
            limit_support_retractions: true,
            retract_before_outer_wall: false,
        }
    }
}

impl CombingSettings {
    /// Read from a settings store.
    pub fn from_settings(s: &Settings) -> SettingsResult<Self> {
        let d = Self::default();
        Ok(Self {
            mode: s.get_or("retraction_combing", d.mode)?,
            max_distance: s.get_coord_or("retraction_combing_max_distance", d.max_distance)?,
            avoid_other_parts: s.get_or("travel_avoid_other_parts", d.avoid_other_parts)?,
            avoid_supports: s.get_or("travel_avoid_supports", d.avoid_supports)?,
            avoid_distance: s.get_coord_or("travel_avoid_distance", d.avoid_distance)?,
            limit_support_retractions: s.get_or("limit_support_retractions", d.limit_support_retractions)?,
            retract_before_outer_wall: s.get_or("travel_retract_before_outer_wall", d.retract_before_outer_wall)?,
        })
    }

    /// Builder method: set the combing mode.
    pub fn with_mode(mut self, mode: CombingMode) -> Self {
        self.mode = mode;
        self
    }
}

// ============================================================================
// Bridging and path planning
// ============================================================================

/// Bridge wall settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BridgeWallSettings {
    /// Whether bridge walls get their own configuration.
    pub enabled: bool,
    /// Unsupported wall segments shorter than this print as normal walls.
    pub min_length: Coord,
    /// Coasting before a bridge, as a fraction of the coasting volume.
    pub coast: CoordF,
}

impl Default for BridgeWallSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_length: 2_100,
            coast: 1.0,
        }
    }
}

impl BridgeWallSettings {
    /// Read from a settings store.
    pub fn from_settings(s: &Settings) -> SettingsResult<Self> {
        let d = Self::default();
        Ok(Self {
            enabled: s.get_or("bridge_settings_enabled", d.enabled)?,
            min_length: s.get_coord_or("bridge_wall_min_length", d.min_length)?,
            coast: s.get_ratio_or("bridge_wall_coast", d.coast)?,
        })
    }
}

/// Settings used while turning geometry into paths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathPlanningSettings {
    /// Closed walls shorter than this are small features.
    pub small_feature_max_length: Coord,
    /// Speed factor for small features.
    pub small_feature_speed_factor: CoordF,
    /// Speed factor for small features on the first layer.
    pub small_feature_speed_factor_0: CoordF,
    /// Wipe distance after an outer wall loop.
    pub wall_0_wipe_dist: Coord,
    /// Wipe distance after an infill line.
    pub infill_wipe_dist: Coord,
    /// How strongly extrusion speed follows line width.
    pub speed_equalize_flow_width_factor: CoordF,
    /// Maximum speed (mm/s) after flow equalization.
    pub speed_equalize_flow_max: CoordF,
    /// Maximum extrusion area change within one variable-width piece (um2).
    pub max_extrusion_area_deviation: Coord,
    /// Shortest segment kept when splitting variable-width lines.
    pub max_resolution: Coord,
    /// Travel speed (mm/s).
    pub travel_speed: CoordF,
}

impl Default for PathPlanningSettings {
    fn default() -> Self {
        Self {
            small_feature_max_length: 0,
            small_feature_speed_factor: 0.5,
            small_feature_speed_factor_0: 0.5,
            wall_0_wipe_dist: 0,
            infill_wipe_dist: 0,
            speed_equalize_flow_width_factor: 1.0,
            speed_equalize_flow_max: 150.0,
            max_extrusion_area_deviation: 50_000,
            max_resolution: 500,
            travel_speed: 150.0,
        }
    }
}

impl PathPlanningSettings {
    /// Read from a settings store.
    pub fn from_settings(s: &Settings) -> SettingsResult<Self> {
        let d = Self::default();
        Ok(Self {
            small_feature_max_length: s.get_coord_or("small_feature_max_length", d.small_feature_max_length)?,
            small_feature_speed_factor: s.get_ratio_or("small_feature_speed_factor", d.small_feature_speed_factor)?,
            small_feature_speed_factor_0: s
                .get_ratio_or("small_feature_speed_factor_0", d.small_feature_speed_factor_0)?,
            wall_0_wipe_dist: s.get_coord_or("wall_0_wipe_dist", d.wall_0_wipe_dist)?,
            infill_wipe_dist: s.get_coord_or("infill_wipe_dist", d.infill_wipe_dist)?,
            speed_equalize_flow_width_factor: s
                .get_ratio_or("speed_equalize_flow_width_factor", d.speed_equalize_flow_width_factor)?,
            speed_equalize_flow_max: s.get_or("speed_equalize_flow_max", d.speed_equalize_flow_max)?,
            max_extrusion_area_deviation: s.get_or(
                "meshfix_maximum_extrusion_area_deviation",
                d.max_extrusion_area_deviation,
            )?,
            max_resolution: s.get_coord_or("meshfix_maximum_resolution", d.max_resolution)?,
            travel_speed: s.get_or("speed_travel", d.travel_speed)?,
        })
    }
}

// ============================================================================
// Cooling
// ============================================================================

/// Fan and minimum layer time settings of one extruder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FanSpeedLayerTimeSettings {
    /// Layers faster than this are slowed down (s).
    pub cool_min_layer_time: CoordF,
    /// Layer time at or below which the fan runs at maximum (s).
    pub cool_min_layer_time_fan_speed_max: CoordF,
    /// Fan speed on the first layer (percent).
    pub cool_fan_speed_0: CoordF,
    /// Regular fan speed (percent).
    pub cool_fan_speed_min: CoordF,
    /// Maximum fan speed (percent).
    pub cool_fan_speed_max: CoordF,
    /// Slowest allowed print speed when slowing down (mm/s).
    pub cool_min_speed: CoordF,
    /// First layer at regular fan speed.
    pub cool_fan_full_layer: i64,
    /// Lift the head away when the layer is still too fast at minimum speed.
    pub cool_lift_head: bool,
    /// Slow down infill and support before walls and skin.
    pub cool_slowdown_infill_first: bool,
}

impl Default for FanSpeedLayerTimeSettings {
    fn default() -> Self {
        Self {
            cool_min_layer_time: 5.0,
            cool_min_layer_time_fan_speed_max: 10.0,
            cool_fan_speed_0: 0.0,
            cool_fan_speed_min: 100.0,
            cool_fan_speed_max: 100.0,
            cool_min_speed: 10.0,
            cool_fan_full_layer: 2,
            cool_lift_head: false,
            cool_slowdown_infill_first: false,
        }
    }
}

impl FanSpeedLayerTimeSettings {
    /// Read from an extruder settings store.
    ///
    /// `cool_fan_full_layer` is stored as a layer number starting at one.
    pub fn from_settings(s: &Settings) -> SettingsResult<Self> {
        let d = Self::default();
        let full_layer: i64 = s.get_or("cool_fan_full_layer", d.cool_fan_full_layer + 1)?;
        Ok(Self {
            cool_min_layer_time: s.get_or("cool_min_layer_time", d.cool_min_layer_time)?,
            cool_min_layer_time_fan_speed_max: s
                .get_or("cool_min_layer_time_fan_speed_max", d.cool_min_layer_time_fan_speed_max)?,
            cool_fan_speed_0: s.get_or("cool_fan_speed_0", d.cool_fan_speed_0)?,
            cool_fan_speed_min: s.get_or("cool_fan_speed_min", d.cool_fan_speed_min)?,
            cool_fan_speed_max: s.get_or("cool_fan_speed_max", d.cool_fan_speed_max)?,
            cool_min_speed: s.get_or("cool_min_speed", d.cool_min_speed)?,
            cool_fan_full_layer: (full_layer - 1).max(0),
            cool_lift_head: s.get_or("cool_lift_head", d.cool_lift_head)?,
            cool_slowdown_infill_first: s.get_or("cool_slowdown_infill_first", d.cool_slowdown_infill_first)?,
        })
    }

    /// Builder method: set the minimum layer time.
    pub fn with_min_layer_time(mut self, seconds: CoordF) -> Self {
        self.cool_min_layer_time = seconds;
        self
    }

    /// Builder method: set the minimum speed.
    pub fn with_min_speed(mut self, speed: CoordF) -> Self {
        self.cool_min_speed = speed;
        self
    }
}

impl fmt::Display for WallSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WallSettings(walls={}, w0={}um, wx={}um)",
            self.wall_line_count, self.wall_line_width_0, self.wall_line_width_x
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_settings_from_store() {
        let s = Settings::new()
            .with("wall_line_width_0", 0.45)
            .with("wall_line_count", 4)
            .with("wall_transition_angle", 20);
        let walls = WallSettings::from_settings(&s).unwrap();
        assert_eq!(walls.wall_line_width_0, 450);
        assert_eq!(walls.wall_line_width_x, 400);
        assert_eq!(walls.wall_line_count, 4);
        assert!((walls.wall_transition_angle - 20f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn test_thresholds_are_clamped() {
        let walls = WallSettings::default();
        // (2 * 340 - 400) / 400
        assert!((walls.split_middle_threshold() - 0.7).abs() < 1e-9);
        assert!((walls.add_middle_threshold() - 0.85).abs() < 1e-9);

        let mut odd = walls.clone();
        odd.min_odd_wall_line_width = 1_000;
        assert!((odd.add_middle_threshold() - 0.99).abs() < 1e-9);
    }

    #[test]
    fn test_enum_parsing() {
        let s = Settings::new()
            .with("retraction_combing", "noskin")
            .with("retraction_hop_type", "spiral_lift");
        assert_eq!(CombingSettings::from_settings(&s).unwrap().mode, CombingMode::NoSkin);
        assert_eq!(
            RetractionConfig::from_settings(&s).unwrap().z_hop_type,
            ZHopType::SpiralLift
        );
        assert!(CombingSettings::from_settings(&Settings::new().with("retraction_combing", "sometimes")).is_err());
    }

    #[test]
    fn test_ratio_settings() {
        let s = Settings::new().with("coasting_speed", 80).with("bridge_wall_coast", 50);
        assert!((CoastingConfig::from_settings(&s).unwrap().speed - 0.8).abs() < 1e-12);
        assert!((BridgeWallSettings::from_settings(&s).unwrap().coast - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_fan_full_layer_is_one_based() {
        let s = Settings::new().with("cool_fan_full_layer", 4);
        assert_eq!(FanSpeedLayerTimeSettings::from_settings(&s).unwrap().cool_fan_full_layer, 3);
    }

    #[test]
    fn test_machine_extruder_fallback() {
        let machine = MachineSettings::default();
        assert_eq!(machine.extruder(5).nozzle_size, 400);
        let (min, max) = machine.build_plate();
        assert_eq!(min, Point::zero());
        assert_eq!(max, Point::new(220_000, 220_000));
    }

    #[test]
    fn test_machine_without_extruders_uses_defaults() {
        let machine = MachineSettings {
            extruders: Vec::new(),
            ..MachineSettings::default()
        };
        assert_eq!(machine.extruder(0), &ExtruderSettings::default());
        assert_eq!(machine.extruder(3).nozzle_size, 400);
    }
}
