//! Tunables for every ordering component, loadable from TOML.
//!
//! Every field carries a serde default so a partial file (or no file at all)
//! yields a working configuration. Values that make no numeric sense are
//! replaced with their defaults by [`OrderingConfig::sanitized`].

#![allow(clippy::module_name_repetitions)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SPACING: f64 = 1000.0;
pub const DEFAULT_INITIAL_POSITION: f64 = 1000.0;
pub const DEFAULT_SPREAD: f64 = 0.5;
pub const DEFAULT_MIN_RELATIVE_GAP: f64 = 1e-10;
pub const DEFAULT_ABOVE_MAX: f64 = 0.3;
pub const DEFAULT_BELOW_MIN: f64 = 0.7;
pub const DEFAULT_CANONICAL_STEP: f64 = 1.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderingConfig {
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    #[serde(default)]
    pub drop_zone: DropZoneConfig,
    #[serde(default)]
    pub reorder: ReorderConfig,
    #[serde(default)]
    pub consistency: ConsistencyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Gap added after the last sibling on append.
    #[serde(default = "default_spacing")]
    pub default_spacing: f64,
    /// Position handed out for the first item of an empty group.
    #[serde(default = "default_initial_position")]
    pub initial_position: f64,
    /// Width of the central band (as a fraction of the neighbor interval) a
    /// between-insert is drawn from. `0.0` pins the exact midpoint.
    #[serde(default = "default_spread")]
    pub spread: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            default_spacing: default_spacing(),
            initial_position: default_initial_position(),
            spread: default_spread(),
        }
    }
}

impl PositionConfig {
    /// Same defaults, but every between-insert lands on the exact midpoint.
    #[must_use]
    pub fn midpoint() -> Self {
        Self {
            spread: 0.0,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Adjacent siblings closer than this (relative to their magnitude,
    /// floored at 1.0) trip a rebalance.
    #[serde(default = "default_min_relative_gap")]
    pub min_relative_gap: f64,
    #[serde(default = "default_spacing")]
    pub start: f64,
    #[serde(default = "default_spacing")]
    pub spacing: f64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            min_relative_gap: default_min_relative_gap(),
            start: default_spacing(),
            spacing: default_spacing(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DropZoneConfig {
    /// Pointer ratios at or below this reorder above the target.
    #[serde(default = "default_above_max")]
    pub above_max: f64,
    /// Pointer ratios at or above this reorder below the target.
    #[serde(default = "default_below_min")]
    pub below_min: f64,
}

impl Default for DropZoneConfig {
    fn default() -> Self {
        Self {
            above_max: default_above_max(),
            below_min: default_below_min(),
        }
    }
}

/// Where a nested drop lands among the target's existing children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NestPlacement {
    First,
    #[default]
    Last,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderConfig {
    #[serde(default)]
    pub nest_placement: NestPlacement,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    /// Distance between consecutive canonical ranks assigned by the
    /// authoritative algorithm.
    #[serde(default = "default_canonical_step")]
    pub canonical_step: f64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            canonical_step: default_canonical_step(),
        }
    }
}

impl OrderingConfig {
    /// Replace nonsensical values with defaults, logging each fallback.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let position = PositionConfig::default();
        self.position.default_spacing = positive_or(
            "position.default_spacing",
            self.position.default_spacing,
            position.default_spacing,
        );
        self.position.initial_position = finite_or(
            "position.initial_position",
            self.position.initial_position,
            position.initial_position,
        );
        if !(0.0..1.0).contains(&self.position.spread) {
            tracing::warn!(
                value = self.position.spread,
                "position.spread outside [0, 1), using default"
            );
            self.position.spread = position.spread;
        }

        let rebalance = RebalanceConfig::default();
        self.rebalance.min_relative_gap = positive_or(
            "rebalance.min_relative_gap",
            self.rebalance.min_relative_gap,
            rebalance.min_relative_gap,
        );
        self.rebalance.start = finite_or("rebalance.start", self.rebalance.start, rebalance.start);
        self.rebalance.spacing =
            positive_or("rebalance.spacing", self.rebalance.spacing, rebalance.spacing);

        let zones = self.drop_zone;
        let zones_valid = zones.above_max.is_finite()
            && zones.below_min.is_finite()
            && zones.above_max >= 0.0
            && zones.below_min <= 1.0
            && zones.above_max < zones.below_min;
        if !zones_valid {
            tracing::warn!(
                above_max = zones.above_max,
                below_min = zones.below_min,
                "drop zone thresholds invalid, using defaults"
            );
            self.drop_zone = DropZoneConfig::default();
        }

        self.consistency.canonical_step = positive_or(
            "consistency.canonical_step",
            self.consistency.canonical_step,
            ConsistencyConfig::default().canonical_step,
        );

        self
    }
}

/// Load an [`OrderingConfig`] from a TOML file.
///
/// A missing file yields the defaults. The result is always sanitized.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<OrderingConfig> {
    if !path.exists() {
        return Ok(OrderingConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Parse an [`OrderingConfig`] from TOML text and sanitize it.
///
/// # Errors
///
/// Returns an error if `content` is not valid TOML for this schema.
pub fn parse_config(content: &str) -> Result<OrderingConfig> {
    let config = toml::from_str::<OrderingConfig>(content)?;
    Ok(config.sanitized())
}

fn positive_or(field: &str, value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        tracing::warn!(field, value, fallback, "non-positive value, using default");
        fallback
    }
}

fn finite_or(field: &str, value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        tracing::warn!(field, value, fallback, "non-finite value, using default");
        fallback
    }
}

const fn default_spacing() -> f64 {
    DEFAULT_SPACING
}

const fn default_initial_position() -> f64 {
    DEFAULT_INITIAL_POSITION
}

const fn default_spread() -> f64 {
    DEFAULT_SPREAD
}

const fn default_min_relative_gap() -> f64 {
    DEFAULT_MIN_RELATIVE_GAP
}

const fn default_above_max() -> f64 {
    DEFAULT_ABOVE_MAX
}

const fn default_below_min() -> f64 {
    DEFAULT_BELOW_MIN
}

const fn default_canonical_step() -> f64 {
    DEFAULT_CANONICAL_STEP
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = OrderingConfig::default();
        assert_eq!(config.position.default_spacing, 1000.0);
        assert_eq!(config.position.initial_position, 1000.0);
        assert_eq!(config.position.spread, 0.5);
        assert_eq!(config.rebalance.start, 1000.0);
        assert_eq!(config.rebalance.spacing, 1000.0);
        assert_eq!(config.drop_zone.above_max, 0.3);
        assert_eq!(config.drop_zone.below_min, 0.7);
        assert_eq!(config.reorder.nest_placement, NestPlacement::Last);
        assert_eq!(config.consistency.canonical_step, 1.0);
    }

    #[test]
    fn empty_toml_is_default() {
        let config = parse_config("").expect("parse empty");
        assert_eq!(config, OrderingConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = parse_config(
            r#"
            [reorder]
            nest_placement = "first"

            [position]
            default_spacing = 64.0
            "#,
        )
        .expect("parse");
        assert_eq!(config.reorder.nest_placement, NestPlacement::First);
        assert_eq!(config.position.default_spacing, 64.0);
        assert_eq!(config.position.initial_position, 1000.0);
    }

    #[test]
    fn negative_spacing_falls_back_to_default() {
        let config = parse_config("[position]\ndefault_spacing = -5.0\n").expect("parse");
        assert_eq!(config.position.default_spacing, DEFAULT_SPACING);
    }

    #[test]
    fn inverted_drop_zones_fall_back_to_default() {
        let config =
            parse_config("[drop_zone]\nabove_max = 0.8\nbelow_min = 0.2\n").expect("parse");
        assert_eq!(config.drop_zone, DropZoneConfig::default());
    }

    #[test]
    fn spread_of_one_is_rejected() {
        let mut config = OrderingConfig::default();
        config.position.spread = 1.0;
        assert_eq!(config.sanitized().position.spread, DEFAULT_SPREAD);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(parse_config("[position\n").is_err());
    }

    #[test]
    fn load_missing_file_is_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&dir.path().join("ordo.toml")).expect("load");
        assert_eq!(config, OrderingConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ordo.toml");
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(file, "[rebalance]\nspacing = 10.0").expect("write");

        let config = load_config(&path).expect("load");
        assert_eq!(config.rebalance.spacing, 10.0);
    }

    #[test]
    fn load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ordo.toml");
        std::fs::write(&path, "[position]\ndefault_spacing = \"wide\"\n").expect("write");

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("ordo.toml"), "error: {err:#}");
    }
}
