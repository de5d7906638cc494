//! Key/value settings store.
//!
//! Settings arrive from the host as strings keyed by setting name. Values are
//! parsed on access through [`FromSetting`], so a store can be shared
//! read-only between threads and queried with whatever type the caller needs.
//!
//! Stores chain to an optional parent (mesh -> extruder -> global), and a
//! lookup falls through to the parent when the key is absent.

use crate::{scale, Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors reading a setting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("setting '{0}' is not defined")]
    Missing(String),

    #[error("setting '{key}' has value '{value}' which is not a valid {expected}")]
    Invalid {
        key: String,
        value: String,
        expected: &'static str,
    },
}

/// Result type for settings access.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Types that can be parsed from a setting string.
pub trait FromSetting: Sized {
    /// Human readable type name for error messages.
    const EXPECTED: &'static str;

    /// Parse the raw value, `None` if it is malformed.
    fn from_setting(raw: &str) -> Option<Self>;
}

impl FromSetting for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_setting(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

impl FromSetting for f64 {
    const EXPECTED: &'static str = "number";

    fn from_setting(raw: &str) -> Option<Self> {
        raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl FromSetting for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_setting(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        raw.parse::<i64>()
            .ok()
            .or_else(|| f64::from_setting(raw).map(|v| v.round() as i64))
    }
}

impl FromSetting for usize {
    const EXPECTED: &'static str = "non-negative integer";

    fn from_setting(raw: &str) -> Option<Self> {
        i64::from_setting(raw).and_then(|v| usize::try_from(v).ok())
    }
}

impl FromSetting for u8 {
    const EXPECTED: &'static str = "small integer";

    fn from_setting(raw: &str) -> Option<Self> {
        i64::from_setting(raw).and_then(|v| u8::try_from(v).ok())
    }
}

impl FromSetting for String {
    const EXPECTED: &'static str = "string";

    fn from_setting(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

/// Read-only store of raw setting values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    values: BTreeMap<String, String>,
    #[serde(skip)]
    parent: Option<Arc<Settings>>,
}

impl Settings {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that falls back to `parent`.
    pub fn with_parent(parent: Arc<Settings>) -> Self {
        Self {
            values: BTreeMap::new(),
            parent: Some(parent),
        }
    }

    /// Builder method: add a value.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    /// Whether the key is defined here or in a parent.
    pub fn has(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// Raw string value, searching parents.
    pub fn raw(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(v) => Some(v.as_str()),
            None => self.parent.as_deref().and_then(|p| p.raw(key)),
        }
    }

    /// Number of values defined in this store (parents excluded).
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether this store defines no values itself.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Typed value of a required setting.
    pub fn get<T: FromSetting>(&self, key: &str) -> SettingsResult<T> {
        let raw = self
            .raw(key)
            .ok_or_else(|| SettingsError::Missing(key.to_string()))?;
        T::from_setting(raw).ok_or_else(|| SettingsError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
            expected: T::EXPECTED,
        })
    }

    /// Typed value, or `default` when the key is not defined.
    ///
    /// A defined but malformed value is still an error.
    pub fn get_or<T: FromSetting>(&self, key: &str, default: T) -> SettingsResult<T> {
        match self.get(key) {
            Err(SettingsError::Missing(_)) => Ok(default),
            other => other,
        }
    }

    /// Length in millimeters converted to scaled units.
    pub fn get_coord(&self, key: &str) -> SettingsResult<Coord> {
        self.get::<f64>(key).map(scale)
    }

    /// Length in millimeters converted to scaled units, with a scaled default.
    pub fn get_coord_or(&self, key: &str, default: Coord) -> SettingsResult<Coord> {
        match self.get_coord(key) {
            Err(SettingsError::Missing(_)) => Ok(default),
            other => other,
        }
    }

    /// Angle in degrees converted to radians, with a default in radians.
    pub fn get_angle_or(&self, key: &str, default: CoordF) -> SettingsResult<CoordF> {
        match self.get::<f64>(key) {
            Ok(deg) => Ok(deg.to_radians()),
            Err(SettingsError::Missing(_)) => Ok(default),
            Err(e) => Err(e),
        }
    }

    /// Percentage converted to a ratio, with a default ratio.
    pub fn get_ratio_or(&self, key: &str, default: CoordF) -> SettingsResult<CoordF> {
        match self.get::<f64>(key) {
            Ok(pct) => Ok(pct / 100.0),
            Err(SettingsError::Missing(_)) => Ok(default),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let s = Settings::new()
            .with("wall_line_count", 3)
            .with("wall_line_width_0", "0.4")
            .with("retraction_enable", "true")
            .with("wall_transition_angle", 10);

        assert_eq!(s.get::<usize>("wall_line_count"), Ok(3));
        assert_eq!(s.get_coord("wall_line_width_0"), Ok(400));
        assert_eq!(s.get::<bool>("retraction_enable"), Ok(true));
        let angle = s.get_angle_or("wall_transition_angle", 0.0).unwrap();
        assert!((angle - 10f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn test_missing_and_invalid() {
        let s = Settings::new().with("wall_line_count", "three");
        assert_eq!(
            s.get::<usize>("speed_wall"),
            Err(SettingsError::Missing("speed_wall".into()))
        );
        assert!(matches!(
            s.get::<usize>("wall_line_count"),
            Err(SettingsError::Invalid { .. })
        ));
        assert_eq!(s.get_or("speed_wall", 30.0), Ok(30.0));
        assert!(s.get_or("wall_line_count", 2usize).is_err());
    }

    #[test]
    fn test_parent_fallback() {
        let global = Arc::new(Settings::new().with("layer_height", 0.2).with("speed_wall", 30));
        let mut mesh = Settings::with_parent(global);
        mesh.set("speed_wall", 25);

        assert_eq!(mesh.get_coord("layer_height"), Ok(200));
        assert_eq!(mesh.get::<f64>("speed_wall"), Ok(25.0));
        assert!(mesh.has("layer_height"));
        assert_eq!(mesh.len(), 1);
    }

    #[test]
    fn test_integer_accepts_float_text() {
        let s = Settings::new().with("cool_fan_full_layer", "4.0");
        assert_eq!(s.get::<i64>("cool_fan_full_layer"), Ok(4));
    }
}
