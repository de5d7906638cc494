//! Geometry primitives.
//!
//! - [`Point`] / [`PointF`]: integer grid points and floating point vectors
//! - [`Line`]: segment between two points
//! - [`Polygon`]: closed loop, [`Polyline`]: open path
//! - [`ExPolygon`]: contour with holes
//! - [`BoundingBox`]: axis-aligned bounds
//!
//! ## Coordinate System
//!
//! Coordinates are integers scaled by `SCALING_FACTOR` (1000), so 1 unit is
//! 1 micrometer. Use [`crate::scale`] / [`crate::unscale`] to convert from and
//! to millimeters.

mod bounding_box;
mod expolygon;
mod line;
mod point;
mod polygon;
mod polyline;
pub mod simplify;

pub use bounding_box::BoundingBox;
pub use expolygon::{expolygons_to_polygons, group_by_nesting, ExPolygon, ExPolygons};
pub use line::{Line, Lines};
pub use point::{Point, PointF, Points};
pub use polygon::{
    polygons_area, polygons_bounding_box, polygons_closest_point, polygons_contain_point,
    polygons_point_count, Polygon, Polygons,
};
pub use polyline::{Polyline, Polylines};
