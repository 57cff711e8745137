//! Precision-exhaustion detection and evenly spaced reassignment.
//!
//! Repeated inserts at one boundary halve the local gap each time. Checking
//! the global range never notices; the detector samples the actual minimum
//! adjacent gap after sorting. The gap is compared relative to the magnitude
//! of the values involved (floored at `1.0`) because `f64` resolution shrinks
//! as values grow.

use crate::config::RebalanceConfig;
use crate::model::{ItemUpdate, OrderableItem};

/// Smallest gap between adjacent values after sorting.
///
/// Returns `None` for fewer than two values.
pub fn min_adjacent_gap(positions: &[f64]) -> Option<f64> {
    if positions.len() < 2 {
        return None;
    }
    let mut sorted = positions.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .min_by(f64::total_cmp)
}

/// True if any two values, after sorting, sit closer than
/// `min_relative_gap` scaled by their magnitude.
///
/// Duplicates and non-finite values always need rebalancing.
pub fn needs_rebalancing(positions: &[f64], min_relative_gap: f64) -> bool {
    if positions.iter().any(|p| !p.is_finite()) {
        return true;
    }
    if positions.len() < 2 {
        return false;
    }

    let threshold = if min_relative_gap.is_finite() && min_relative_gap > 0.0 {
        min_relative_gap
    } else {
        crate::config::DEFAULT_MIN_RELATIVE_GAP
    };

    let mut sorted = positions.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.windows(2).any(|w| {
        let scale = w[0].abs().max(w[1].abs()).max(1.0);
        w[1] - w[0] < threshold * scale
    })
}

/// `count` strictly increasing values `start, start + spacing, …`.
///
/// Non-positive spacing falls back to the default spacing; a non-finite
/// start falls back to the default start.
#[allow(clippy::cast_precision_loss)]
pub fn rebalance(count: usize, start: f64, spacing: f64) -> Vec<f64> {
    let defaults = RebalanceConfig::default();
    let spacing = if spacing.is_finite() && spacing > 0.0 {
        spacing
    } else {
        defaults.spacing
    };
    let start = if start.is_finite() { start } else { defaults.start };
    (0..count).map(|i| start + spacing * i as f64).collect()
}

/// Configured rebalancer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rebalancer {
    config: RebalanceConfig,
}

impl Rebalancer {
    #[must_use]
    pub const fn new(config: RebalanceConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &RebalanceConfig {
        &self.config
    }

    pub fn needs_rebalancing(&self, positions: &[f64]) -> bool {
        needs_rebalancing(positions, self.config.min_relative_gap)
    }

    pub fn values(&self, count: usize) -> Vec<f64> {
        rebalance(count, self.config.start, self.config.spacing)
    }

    /// Fresh positions for an already ordered group, one update per item.
    ///
    /// Relative order is taken from the slice as given; parents are never
    /// touched.
    pub fn reassign(&self, ordered: &[&OrderableItem]) -> Vec<ItemUpdate> {
        ordered
            .iter()
            .zip(self.values(ordered.len()))
            .map(|(item, position)| ItemUpdate::reposition(item.id.clone(), position))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;
    use crate::model::ParentAssignment;

    #[test]
    fn evenly_spaced_is_healthy() {
        assert!(!needs_rebalancing(&[1000.0, 2000.0, 3000.0], 1e-10));
    }

    #[test]
    fn fewer_than_two_is_healthy() {
        assert!(!needs_rebalancing(&[], 1e-10));
        assert!(!needs_rebalancing(&[42.0], 1e-10));
    }

    #[test]
    fn duplicates_need_rebalancing() {
        assert!(needs_rebalancing(&[1000.0, 1000.0], 1e-10));
    }

    #[test]
    fn non_finite_needs_rebalancing() {
        assert!(needs_rebalancing(&[1000.0, f64::NAN], 1e-10));
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        assert!(!needs_rebalancing(&[3000.0, 1000.0, 2000.0], 1e-10));
        assert!(needs_rebalancing(&[3000.0, 1000.0, 3000.0 + 1e-9], 1e-10));
    }

    #[test]
    fn fifty_midpoint_subdivisions_trip() {
        let mut positions = vec![1000.0, 2000.0];
        let mut next = 2000.0;
        for _ in 0..50 {
            next = (1000.0 + next) / 2.0;
            positions.push(next);
        }
        assert!(needs_rebalancing(&positions, 1e-10));
    }

    #[test]
    fn chain_is_detected_despite_wide_range() {
        let mut positions: Vec<f64> = (1..=100).map(|i| f64::from(i) * 1000.0).collect();
        let mut upper = 2000.0;
        for _ in 0..40 {
            upper = (1000.0 + upper) / 2.0;
            positions.push(upper);
        }
        assert!(needs_rebalancing(&positions, 1e-10));
    }

    #[test]
    fn min_gap_reports_smallest() {
        assert_eq!(min_adjacent_gap(&[10.0, 40.0, 15.0]), Some(5.0));
        assert_eq!(min_adjacent_gap(&[1.0]), None);
    }

    #[test]
    fn rebalance_is_evenly_spaced() {
        let values = rebalance(4, 1000.0, 1000.0);
        assert_eq!(values, vec![1000.0, 2000.0, 3000.0, 4000.0]);
    }

    #[test]
    fn rebalance_bad_spacing_uses_default() {
        assert_eq!(rebalance(2, 0.0, -1.0), vec![0.0, 1000.0]);
        assert_eq!(rebalance(2, f64::NAN, 10.0), vec![1000.0, 1010.0]);
    }

    #[test]
    fn rebalance_zero_count_is_empty() {
        assert!(rebalance(0, 1000.0, 1000.0).is_empty());
    }

    #[test]
    fn reassign_preserves_order_and_parents() {
        let items = vec![
            OrderableItem::child("a", 1.0, "p", "s"),
            OrderableItem::child("b", 1.000_000_000_01, "p", "s"),
            OrderableItem::child("c", 1.000_000_000_02, "p", "s"),
        ];
        let ordered: Vec<&OrderableItem> = items.iter().collect();
        let updates = Rebalancer::default().reassign(&ordered);

        let ids: Vec<&str> = updates.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let positions: Vec<f64> = updates.iter().map(|u| u.position).collect();
        assert_eq!(positions, vec![1000.0, 2000.0, 3000.0]);
        assert!(updates.iter().all(|u| u.parent == ParentAssignment::Unchanged));
    }
}
