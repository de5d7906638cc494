//! Motion segments and their print configurations.
//!
//! A [`GCodePath`] is one run of moves sharing a [`GCodePathConfig`] and the
//! same flow modifiers. Travel paths have a zero line width.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;
use crate::{unscale, Coord, CoordF, SCALING_FACTOR};

use super::time_estimate::TimeMaterialEstimates;

/// Kind of feature a path prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrintFeatureType {
    NoneType,
    OuterWall,
    InnerWall,
    Skin,
    Support,
    SkirtBrim,
    Infill,
    SupportInfill,
    MoveCombing,
    MoveRetraction,
    SupportInterface,
    PrimeTower,
}

impl PrintFeatureType {
    /// Number of feature types.
    pub const COUNT: usize = 12;

    /// All feature types in index order.
    pub const ALL: [PrintFeatureType; Self::COUNT] = [
        Self::NoneType,
        Self::OuterWall,
        Self::InnerWall,
        Self::Skin,
        Self::Support,
        Self::SkirtBrim,
        Self::Infill,
        Self::SupportInfill,
        Self::MoveCombing,
        Self::MoveRetraction,
        Self::SupportInterface,
        Self::PrimeTower,
    ];

    /// Position of this feature in per-feature tables.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether this is a travel feature.
    pub fn is_move(self) -> bool {
        matches!(self, Self::MoveCombing | Self::MoveRetraction)
    }

    /// Whether this feature is support material.
    pub fn is_support(self) -> bool {
        matches!(self, Self::Support | Self::SupportInfill | Self::SupportInterface)
    }
}

/// How a path fills space, used when merging and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpaceFillType {
    #[default]
    None,
    Polygons,
    PolyLines,
    Lines,
}

/// Print settings shared by every path of one feature.
///
/// Two paths may only be merged when their configs are equal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GCodePathConfig {
    /// Feature printed with this config.
    pub feature: PrintFeatureType,
    /// Nominal speed (mm/s).
    pub speed: CoordF,
    /// Acceleration (mm/s2).
    pub acceleration: CoordF,
    /// XY jerk (mm/s).
    pub jerk: CoordF,
    /// Nominal line width; zero for travels.
    pub line_width: Coord,
    /// Layer thickness the line is printed at.
    pub layer_thickness: Coord,
    /// Flow ratio.
    pub flow: CoordF,
    /// Whether this config prints walls over air.
    pub is_bridge_path: bool,
    /// Fan speed override (percent) while printing this feature.
    pub fan_speed: Option<CoordF>,
}

impl GCodePathConfig {
    /// Extrusion config.
    pub fn new(feature: PrintFeatureType, line_width: Coord, layer_thickness: Coord, speed: CoordF) -> Self {
        Self {
            feature,
            speed,
            acceleration: 3000.0,
            jerk: 20.0,
            line_width,
            layer_thickness,
            flow: 1.0,
            is_bridge_path: false,
            fan_speed: None,
        }
    }

    /// Travel config.
    pub fn travel(speed: CoordF, acceleration: CoordF, jerk: CoordF) -> Self {
        Self {
            feature: PrintFeatureType::MoveCombing,
            speed,
            acceleration,
            jerk,
            line_width: 0,
            layer_thickness: 0,
            flow: 0.0,
            is_bridge_path: false,
            fan_speed: None,
        }
    }

    /// Builder method: set acceleration and jerk.
    pub fn with_kinematics(mut self, acceleration: CoordF, jerk: CoordF) -> Self {
        self.acceleration = acceleration;
        self.jerk = jerk;
        self
    }

    /// Builder method: set the flow ratio.
    pub fn with_flow(mut self, flow: CoordF) -> Self {
        self.flow = flow;
        self
    }

    /// Builder method: mark as bridge config.
    pub fn with_bridge(mut self) -> Self {
        self.is_bridge_path = true;
        self
    }

    /// Builder method: set the fan speed override.
    pub fn with_fan_speed(mut self, fan_speed: CoordF) -> Self {
        self.fan_speed = Some(fan_speed);
        self
    }

    /// Whether paths with this config only move.
    pub fn is_travel_path(&self) -> bool {
        self.line_width == 0
    }

    /// Volume extruded per millimeter of path (mm3/mm).
    pub fn extrusion_mm3_per_mm(&self) -> CoordF {
        unscale(self.line_width) * unscale(self.layer_thickness) * self.flow
    }
}

/// A run of moves with one config.
#[derive(Debug, Clone, PartialEq)]
pub struct GCodePath {
    pub config: GCodePathConfig,
    /// Mesh the path belongs to, if any.
    pub mesh: Option<usize>,
    pub space_fill_type: SpaceFillType,
    /// Flow multiplier on top of the config flow.
    pub flow: CoordF,
    /// Actual line width relative to the config line width.
    pub width_factor: CoordF,
    pub spiralize: bool,
    /// Speed multiplier applied by the planner (bridging, small features, cooling).
    pub speed_factor: CoordF,
    /// Speed multiplier compensating for variable line width.
    pub speed_back_pressure_factor: CoordF,
    pub retract: bool,
    pub perform_z_hop: bool,
    pub perform_prime: bool,
    /// Closed paths accept no further points.
    pub done: bool,
    pub points: Vec<Point>,
    /// Fan speed override (percent) for this path.
    pub fan_speed: Option<CoordF>,
    pub estimates: TimeMaterialEstimates,
}

impl GCodePath {
    pub fn new(
        config: GCodePathConfig,
        mesh: Option<usize>,
        space_fill_type: SpaceFillType,
        flow: CoordF,
        width_factor: CoordF,
        spiralize: bool,
        speed_factor: CoordF,
    ) -> Self {
        Self {
            config,
            mesh,
            space_fill_type,
            flow,
            width_factor,
            spiralize,
            speed_factor,
            speed_back_pressure_factor: 1.0,
            retract: false,
            perform_z_hop: false,
            perform_prime: false,
            done: false,
            points: Vec::new(),
            fan_speed: None,
            estimates: TimeMaterialEstimates::default(),
        }
    }

    /// Whether this path only moves.
    pub fn is_travel_path(&self) -> bool {
        self.config.is_travel_path()
    }

    /// Volume extruded per millimeter of this path (mm3/mm).
    pub fn extrusion_mm3_per_mm(&self) -> CoordF {
        self.config.extrusion_mm3_per_mm() * self.flow * self.width_factor
    }

    /// Whether the path is slowed down at the given cooling slowdown level.
    ///
    /// Level 0 slows every extrusion, level 1 only infill and support,
    /// level 2 additionally skin and inner walls.
    pub fn needs_slowdown(&self, level: u8) -> bool {
        if self.is_travel_path() {
            return false;
        }
        let feature = self.config.feature;
        match level {
            0 => true,
            1 => feature == PrintFeatureType::Infill || feature.is_support(),
            _ => {
                feature == PrintFeatureType::Infill
                    || feature.is_support()
                    || feature == PrintFeatureType::Skin
                    || feature == PrintFeatureType::InnerWall
            }
        }
    }

    /// Whether the slowdown at `level` acts on this path.
    ///
    /// At level 2 paths already slowed at level 1 are left alone.
    pub fn slowed_at(&self, level: u8) -> bool {
        if level > 1 {
            self.needs_slowdown(level) && !self.needs_slowdown(level - 1)
        } else {
            self.needs_slowdown(level)
        }
    }

    /// Length of the path starting from `start` (mm).
    pub fn length_from(&self, start: Point) -> CoordF {
        let mut prev = start;
        let mut length = 0.0;
        for p in &self.points {
            length += prev.distance(p);
            prev = *p;
        }
        length / SCALING_FACTOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall() -> GCodePathConfig {
        GCodePathConfig::new(PrintFeatureType::InnerWall, 400, 200, 60.0)
    }

    #[test]
    fn test_travel_config() {
        let travel = GCodePathConfig::travel(150.0, 3000.0, 20.0);
        assert!(travel.is_travel_path());
        assert_eq!(travel.extrusion_mm3_per_mm(), 0.0);
        assert!(!wall().is_travel_path());
    }

    #[test]
    fn test_extrusion_volume() {
        let path = GCodePath::new(wall(), None, SpaceFillType::Polygons, 0.5, 1.5, false, 1.0);
        // 0.4 * 0.2 * 0.5 * 1.5
        assert!((path.extrusion_mm3_per_mm() - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_slowdown_levels() {
        let make = |feature| GCodePath::new(
            GCodePathConfig::new(feature, 400, 200, 60.0),
            None,
            SpaceFillType::Lines,
            1.0,
            1.0,
            false,
            1.0,
        );
        let infill = make(PrintFeatureType::Infill);
        let skin = make(PrintFeatureType::Skin);
        let outer = make(PrintFeatureType::OuterWall);

        assert!(outer.needs_slowdown(0));
        assert!(infill.needs_slowdown(1) && !skin.needs_slowdown(1));
        assert!(skin.needs_slowdown(2) && !outer.needs_slowdown(2));
        assert!(skin.slowed_at(2) && !infill.slowed_at(2));

        let travel = GCodePath::new(
            GCodePathConfig::travel(150.0, 3000.0, 20.0),
            None,
            SpaceFillType::None,
            0.0,
            1.0,
            false,
            1.0,
        );
        assert!(!travel.needs_slowdown(0));
    }

    #[test]
    fn test_length_from() {
        let mut path = GCodePath::new(wall(), None, SpaceFillType::Polygons, 1.0, 1.0, false, 1.0);
        path.points = vec![Point::new(3_000, 0), Point::new(3_000, 4_000)];
        assert!((path.length_from(Point::zero()) - 7.0).abs() < 1e-9);
    }
}
