//! Per-layer motion planning.
//!
//! - [`path`]: path configs and planned paths
//! - [`path_order`]: nearest-first ordering of loops and lines
//! - [`time_estimate`]: trapezoid-profile time estimation
//! - [`extruder_plan`]: moves of one extruder within a layer, minimum layer
//!   time and fan control
//! - [`layer_plan`]: the layer planner with combing, retraction, bridging and
//!   coasting

pub mod extruder_plan;
pub mod layer_plan;
pub mod path;
pub mod path_order;
pub mod time_estimate;

pub use extruder_plan::{ExtruderPlan, PlanInsert, PlanInsertCommand};
pub use layer_plan::{
    ExtrusionModifiers, FinalizedExtruderPlan, FinalizedLayer, FinalizedPath, LayerGeometry, LayerPlan,
};
pub use path::{GCodePath, GCodePathConfig, PrintFeatureType, SpaceFillType};
pub use path_order::{OrderedPath, PathOrderOptimizer};
pub use time_estimate::{TimeEstimateCalculator, TimeMaterialEstimates};
