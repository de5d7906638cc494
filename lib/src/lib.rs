//! Slicing core: variable-width walls and per-layer motion planning.
//!
//! The crate turns already-sliced layer outlines into ordered, fully annotated
//! motion plans:
//!
//! - [`perimeter`]: variable-width wall generation ([`WallToolPaths`])
//! - [`gcode`]: the per-layer planner ([`LayerPlan`], [`ExtruderPlan`]) with
//!   combing, retraction, bridging, coasting, minimum layer time and fan control
//! - [`pipeline`]: parallel per-layer generation with ordered hand-off and
//!   cooperative cancellation
//!
//! Text emission of G-code, mesh slicing and infill pattern synthesis live
//! outside this crate; they produce or consume the types defined here.
//!
//! # Units
//!
//! All geometry uses integer coordinates scaled by [`SCALING_FACTOR`], so one
//! unit is one micrometer. Speeds are mm/s, times are seconds.

pub mod clipper;
pub mod config;
pub mod edge_grid;
pub mod gcode;
pub mod geometry;
pub mod perimeter;
pub mod pipeline;
pub mod travel;

pub use config::{Settings, SettingsError, SettingsResult};
pub use gcode::{ExtruderPlan, FinalizedLayer, GCodePath, GCodePathConfig, LayerPlan};
pub use geometry::{BoundingBox, ExPolygon, Line, Point, PointF, Polygon, Polygons, Polyline};
pub use perimeter::arachne::{ExtrusionJunction, ExtrusionLine, VariableWidthLines, WallToolPaths};
pub use pipeline::{CancellationToken, LayerPipeline, LayerSink, SliceContext};

/// Integer coordinate type (micrometers).
pub type Coord = i64;

/// Floating point coordinate type.
pub type CoordF = f64;

/// Units per millimeter.
pub const SCALING_FACTOR: CoordF = 1000.0;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convert millimeters to scaled integer units.
#[inline]
pub fn scale(mm: CoordF) -> Coord {
    (mm * SCALING_FACTOR).round() as Coord
}

/// Convert scaled integer units to millimeters.
#[inline]
pub fn unscale(v: Coord) -> CoordF {
    v as CoordF / SCALING_FACTOR
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] SettingsError),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("slicing was cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Crate-level result.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling() {
        assert_eq!(scale(1.0), 1000);
        assert_eq!(scale(0.4), 400);
        assert_eq!(scale(-0.0005), -1);
        assert!((unscale(2500) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_error_display() {
        let err: Error = SettingsError::Missing("wall_line_count".into()).into();
        assert!(err.to_string().contains("wall_line_count"));
        assert_eq!(Error::Cancelled.to_string(), "slicing was cancelled");
    }
}
