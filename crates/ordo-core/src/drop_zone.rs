//! Classify a drop from the pointer's vertical offset within the target row.
//!
//! ```text
//! 0.0 ┌──────────────┐
//!     │ reorder above│   ratio <= above_max (0.3)
//!     ├──────────────┤
//!     │     nest     │   central band
//!     ├──────────────┤
//!     │ reorder below│   ratio >= below_min (0.7)
//! 1.0 └──────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::config::DropZoneConfig;

/// Side of the target a reorder lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Above,
    Below,
}

/// What a drop means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "position")]
pub enum DropClassification {
    /// Become a sibling of the target, on the given side.
    Reorder(Placement),
    /// Become a child of the target.
    Nest,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DropZoneResolver {
    config: DropZoneConfig,
}

impl DropZoneResolver {
    /// Build a resolver; inverted or out-of-range thresholds fall back to the
    /// defaults.
    #[must_use]
    pub fn new(config: DropZoneConfig) -> Self {
        let valid = config.above_max.is_finite()
            && config.below_min.is_finite()
            && config.above_max >= 0.0
            && config.below_min <= 1.0
            && config.above_max < config.below_min;
        if valid {
            Self { config }
        } else {
            tracing::warn!(
                above_max = config.above_max,
                below_min = config.below_min,
                "drop zone thresholds invalid, using defaults"
            );
            Self::default()
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DropZoneConfig {
        &self.config
    }

    /// Classify `pointer_offset_ratio` (0.0 = top edge, 1.0 = bottom edge).
    ///
    /// Ratios outside `[0, 1]` are clamped; NaN is read as the center.
    #[must_use]
    pub fn classify(&self, pointer_offset_ratio: f64) -> DropClassification {
        let ratio = if pointer_offset_ratio.is_nan() {
            0.5
        } else {
            pointer_offset_ratio.clamp(0.0, 1.0)
        };

        if ratio <= self.config.above_max {
            DropClassification::Reorder(Placement::Above)
        } else if ratio >= self.config.below_min {
            DropClassification::Reorder(Placement::Below)
        } else {
            DropClassification::Nest
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_zones() {
        let resolver = DropZoneResolver::default();
        assert_eq!(
            resolver.classify(0.15),
            DropClassification::Reorder(Placement::Above)
        );
        assert_eq!(resolver.classify(0.5), DropClassification::Nest);
        assert_eq!(
            resolver.classify(0.85),
            DropClassification::Reorder(Placement::Below)
        );
    }

    #[test]
    fn boundaries_are_inclusive_for_reorder() {
        let resolver = DropZoneResolver::default();
        assert_eq!(
            resolver.classify(0.3),
            DropClassification::Reorder(Placement::Above)
        );
        assert_eq!(
            resolver.classify(0.7),
            DropClassification::Reorder(Placement::Below)
        );
        assert_eq!(resolver.classify(0.31), DropClassification::Nest);
        assert_eq!(resolver.classify(0.69), DropClassification::Nest);
    }

    #[test]
    fn out_of_range_is_clamped() {
        let resolver = DropZoneResolver::default();
        assert_eq!(
            resolver.classify(-2.0),
            DropClassification::Reorder(Placement::Above)
        );
        assert_eq!(
            resolver.classify(7.0),
            DropClassification::Reorder(Placement::Below)
        );
        assert_eq!(resolver.classify(f64::NAN), DropClassification::Nest);
    }

    #[test]
    fn custom_thresholds() {
        let resolver = DropZoneResolver::new(DropZoneConfig {
            above_max: 0.5,
            below_min: 0.5,
        });
        // above_max == below_min is invalid, defaults apply.
        assert_eq!(resolver.config(), &DropZoneConfig::default());

        let narrow = DropZoneResolver::new(DropZoneConfig {
            above_max: 0.45,
            below_min: 0.55,
        });
        assert_eq!(narrow.classify(0.5), DropClassification::Nest);
        assert_eq!(
            narrow.classify(0.4),
            DropClassification::Reorder(Placement::Above)
        );
    }

    #[test]
    fn classification_serializes_with_mode() {
        let json = serde_json::to_string(&DropClassification::Reorder(Placement::Above))
            .expect("serialize");
        assert_eq!(json, r#"{"mode":"reorder","position":"above"}"#);
        let nest = serde_json::to_string(&DropClassification::Nest).expect("serialize");
        assert_eq!(nest, r#"{"mode":"nest"}"#);
    }
}
