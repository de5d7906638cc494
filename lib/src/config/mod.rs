//! Configuration for wall generation and layer planning.
//!
//! - [`Settings`]: the read-only key/value store supplied by the host
//! - typed bundles ([`WallSettings`], [`RetractionConfig`], ...) read from it
//!
//! Lengths in bundles are scaled integer units, speeds mm/s, times seconds.

mod print_config;
mod settings;

pub use print_config::{
    BridgeWallSettings, CoastingConfig, CombingMode, CombingSettings, ExtruderSettings,
    FanSpeedLayerTimeSettings, MachineSettings, PathPlanningSettings, RetractionConfig,
    WallSettings, ZHopType,
};
pub use settings::{FromSetting, Settings, SettingsError, SettingsResult};
