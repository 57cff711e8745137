//! Fractional position calculation between two optional neighbors.
//!
//! # Placement rules
//!
//! | prev | next | result |
//! |------|------|--------|
//! | none | none | `initial_position` |
//! | `p`  | none | `p + default_spacing` |
//! | none | `n > 0` | `n / 2` |
//! | none | `n <= 0` | `n - default_spacing` |
//! | `p`  | `n`  | random value from the central `spread` band of `(p, n)` |
//!
//! The randomized band keeps repeated inserts at the same spot from marching
//! deterministically toward one neighbor. The random source is a parameter so
//! callers (and tests) control reproducibility with a seeded RNG.
//!
//! Every successful result is strictly greater than `prev` and strictly less
//! than `next`. When no such `f64` exists the calculator returns
//! [`PositionError::PrecisionExhausted`], which callers answer with a
//! rebalance.

#![allow(clippy::module_name_repetitions)]

use rand::Rng;

use crate::config::PositionConfig;
use crate::error::ErrorCode;
use crate::model::OrderableItem;

/// Anything that carries an order value.
pub trait Positioned {
    fn position(&self) -> f64;
}

impl Positioned for f64 {
    fn position(&self) -> f64 {
        *self
    }
}

impl Positioned for OrderableItem {
    fn position(&self) -> f64 {
        self.position
    }
}

impl<T: Positioned + ?Sized> Positioned for &T {
    fn position(&self) -> f64 {
        (**self).position()
    }
}

/// The order values on either side of an insertion slot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Neighbors {
    pub prev: Option<f64>,
    pub next: Option<f64>,
}

/// Neighbors of insertion slot `index` in a caller-ordered sibling slice.
///
/// Slot `i` sits between `ordered[i - 1]` and `ordered[i]`, so `0` is the
/// start and `ordered.len()` is the end. The slice is neither sorted nor
/// filtered here. Empty input and slots past the end yield no neighbors.
pub fn adjacent_positions<T: Positioned>(ordered: &[T], index: usize) -> Neighbors {
    if ordered.is_empty() || index > ordered.len() {
        return Neighbors::default();
    }
    let prev = index
        .checked_sub(1)
        .and_then(|i| ordered.get(i))
        .map(Positioned::position);
    let next = ordered.get(index).map(Positioned::position);
    Neighbors { prev, next }
}

/// Errors from position calculation.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum PositionError {
    /// `prev` is not strictly below `next`.
    #[error("neighbor positions out of order: prev={prev} next={next}")]
    InvertedNeighbors { prev: f64, next: f64 },
    /// A neighbor is NaN or infinite.
    #[error("neighbor position is not finite: {0}")]
    NonFinite(f64),
    /// No `f64` lies strictly between the bounds.
    #[error("no representable position between {prev:?} and {next:?}")]
    PrecisionExhausted { prev: Option<f64>, next: Option<f64> },
}

impl PositionError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvertedNeighbors { .. } => ErrorCode::InvertedNeighbors,
            Self::NonFinite(_) => ErrorCode::NonFinitePosition,
            Self::PrecisionExhausted { .. } => ErrorCode::PrecisionExhausted,
        }
    }
}

/// Computes new order values from neighbor values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionCalculator {
    config: PositionConfig,
}

impl PositionCalculator {
    /// Build a calculator, replacing unusable settings with defaults.
    #[must_use]
    pub fn new(config: PositionConfig) -> Self {
        let defaults = PositionConfig::default();
        let mut config = config;
        if !(config.default_spacing.is_finite() && config.default_spacing > 0.0) {
            tracing::warn!(
                value = config.default_spacing,
                "non-positive spacing, using default"
            );
            config.default_spacing = defaults.default_spacing;
        }
        if !config.initial_position.is_finite() {
            config.initial_position = defaults.initial_position;
        }
        if !(0.0..1.0).contains(&config.spread) {
            config.spread = defaults.spread;
        }
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &PositionConfig {
        &self.config
    }

    /// A value strictly between `prev` and `next` (either may be absent).
    ///
    /// # Errors
    ///
    /// - [`PositionError::NonFinite`] if a neighbor is NaN or infinite.
    /// - [`PositionError::InvertedNeighbors`] if `prev >= next`.
    /// - [`PositionError::PrecisionExhausted`] if no `f64` fits.
    pub fn calculate(
        &self,
        prev: Option<f64>,
        next: Option<f64>,
        rng: &mut impl Rng,
    ) -> Result<f64, PositionError> {
        for value in prev.iter().chain(next.iter()) {
            if !value.is_finite() {
                return Err(PositionError::NonFinite(*value));
            }
        }

        match (prev, next) {
            (None, None) => Ok(self.config.initial_position),
            (Some(p), None) => {
                let value = p + self.config.default_spacing;
                if value.is_finite() && value > p {
                    Ok(value)
                } else {
                    Err(PositionError::PrecisionExhausted { prev, next })
                }
            }
            (None, Some(n)) => {
                let half = n / 2.0;
                if n > 0.0 {
                    // Halving must stay strictly inside (0, n); a subnormal
                    // `n` leaves no such value.
                    return if half > 0.0 && half < n {
                        Ok(half)
                    } else {
                        Err(PositionError::PrecisionExhausted { prev, next })
                    };
                }
                // No room below a non-positive first sibling by halving.
                let value = n - self.config.default_spacing;
                if value.is_finite() && value < n {
                    Ok(value)
                } else {
                    Err(PositionError::PrecisionExhausted { prev, next })
                }
            }
            (Some(p), Some(n)) => self.between(p, n, rng),
        }
    }

    /// `count` strictly increasing values that all fit between `prev` and
    /// `next`, for placing several items at one slot.
    ///
    /// # Errors
    ///
    /// Same as [`calculate`](Self::calculate), for any of the values.
    pub fn calculate_run(
        &self,
        prev: Option<f64>,
        next: Option<f64>,
        count: usize,
        rng: &mut impl Rng,
    ) -> Result<Vec<f64>, PositionError> {
        let mut values = Vec::with_capacity(count);
        let mut left = prev;
        for _ in 0..count {
            let value = self.calculate(left, next, rng)?;
            values.push(value);
            left = Some(value);
        }
        Ok(values)
    }

    fn between(&self, prev: f64, next: f64, rng: &mut impl Rng) -> Result<f64, PositionError> {
        if prev >= next {
            return Err(PositionError::InvertedNeighbors { prev, next });
        }

        let gap = next - prev;
        let midpoint = if gap.is_finite() {
            prev + gap / 2.0
        } else {
            prev / 2.0 + next / 2.0
        };

        let candidate = if self.config.spread > 0.0 && gap.is_finite() {
            let half_band = gap * self.config.spread / 2.0;
            let low = midpoint - half_band;
            let high = midpoint + half_band;
            if low < high {
                rng.gen_range(low..high)
            } else {
                midpoint
            }
        } else {
            midpoint
        };

        if prev < candidate && candidate < next {
            Ok(candidate)
        } else if prev < midpoint && midpoint < next {
            Ok(midpoint)
        } else {
            Err(PositionError::PrecisionExhausted {
                prev: Some(prev),
                next: Some(next),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn calc() -> PositionCalculator {
        PositionCalculator::default()
    }

    #[test]
    fn empty_group_uses_initial_position() {
        let value = calc().calculate(None, None, &mut rng()).unwrap();
        assert_eq!(value, 1000.0);
    }

    #[test]
    fn empty_group_is_stable_across_calls() {
        let c = calc();
        let mut r = rng();
        let first = c.calculate(None, None, &mut r).unwrap();
        let second = c.calculate(None, None, &mut r).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn append_adds_spacing() {
        let value = calc().calculate(Some(3000.0), None, &mut rng()).unwrap();
        assert_eq!(value, 4000.0);
    }

    #[test]
    fn prepend_halves_next() {
        assert_eq!(calc().calculate(None, Some(1000.0), &mut rng()).unwrap(), 500.0);
        assert_eq!(calc().calculate(None, Some(0.5), &mut rng()).unwrap(), 0.25);
    }

    #[test]
    fn prepend_below_non_positive_subtracts_spacing() {
        assert_eq!(calc().calculate(None, Some(0.0), &mut rng()).unwrap(), -1000.0);
        assert_eq!(calc().calculate(None, Some(-4.0), &mut rng()).unwrap(), -1004.0);
    }

    #[test]
    fn prepend_below_smallest_subnormal_exhausts_precision() {
        let next = f64::from_bits(1);
        let err = calc().calculate(None, Some(next), &mut rng()).unwrap_err();
        assert_eq!(
            err,
            PositionError::PrecisionExhausted {
                prev: None,
                next: Some(next),
            }
        );

        let next = f64::from_bits(2);
        let value = calc().calculate(None, Some(next), &mut rng()).unwrap();
        assert!(0.0 < value && value < next);
    }

    #[test]
    fn between_lands_in_central_band() {
        let c = calc();
        let mut r = rng();
        for _ in 0..200 {
            let value = c.calculate(Some(1000.0), Some(2000.0), &mut r).unwrap();
            assert!((1250.0..=1750.0).contains(&value), "value {value} outside band");
        }
    }

    #[test]
    fn between_is_reproducible_with_same_seed() {
        let c = calc();
        let a = c.calculate(Some(1.0), Some(2.0), &mut StdRng::seed_from_u64(99)).unwrap();
        let b = c.calculate(Some(1.0), Some(2.0), &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_spread_is_exact_midpoint() {
        let c = PositionCalculator::new(PositionConfig::midpoint());
        assert_eq!(c.calculate(Some(1000.0), Some(2000.0), &mut rng()).unwrap(), 1500.0);
    }

    #[test]
    fn between_never_returns_a_bound() {
        let c = calc();
        let prev = 1.0_f64;
        let next = prev + f64::EPSILON * 4.0;
        let value = c.calculate(Some(prev), Some(next), &mut rng()).unwrap();
        assert!(prev < value && value < next);
    }

    #[test]
    fn adjacent_floats_exhaust_precision() {
        let prev = 1.0_f64;
        let next = f64::from_bits(prev.to_bits() + 1);
        let err = calc().calculate(Some(prev), Some(next), &mut rng()).unwrap_err();
        assert!(matches!(err, PositionError::PrecisionExhausted { .. }));
        assert_eq!(err.code(), ErrorCode::PrecisionExhausted);
    }

    #[test]
    fn inverted_neighbors_rejected() {
        let err = calc().calculate(Some(5.0), Some(5.0), &mut rng()).unwrap_err();
        assert!(matches!(err, PositionError::InvertedNeighbors { .. }));
    }

    #[test]
    fn non_finite_neighbor_rejected() {
        let err = calc().calculate(Some(f64::NAN), None, &mut rng()).unwrap_err();
        assert!(matches!(err, PositionError::NonFinite(_)));
    }

    #[test]
    fn huge_bounds_use_overflow_safe_midpoint() {
        let value = calc()
            .calculate(Some(-f64::MAX), Some(f64::MAX), &mut rng())
            .unwrap();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn non_positive_spacing_falls_back_to_default() {
        let c = PositionCalculator::new(PositionConfig {
            default_spacing: -10.0,
            ..PositionConfig::default()
        });
        assert_eq!(c.config().default_spacing, 1000.0);
        assert_eq!(c.calculate(Some(0.0), None, &mut rng()).unwrap(), 1000.0);
    }

    #[test]
    fn run_is_strictly_increasing_within_bounds() {
        let values = calc()
            .calculate_run(Some(1000.0), Some(2000.0), 5, &mut rng())
            .unwrap();
        assert_eq!(values.len(), 5);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert!(values.iter().all(|v| 1000.0 < *v && *v < 2000.0));
    }

    #[test]
    fn adjacent_positions_middle_slot() {
        let siblings = [1000.0, 2000.0, 3000.0];
        let n = adjacent_positions(&siblings, 1);
        assert_eq!(n.prev, Some(1000.0));
        assert_eq!(n.next, Some(2000.0));
    }

    #[test]
    fn adjacent_positions_edges() {
        let siblings = [1000.0, 2000.0];
        assert_eq!(
            adjacent_positions(&siblings, 0),
            Neighbors {
                prev: None,
                next: Some(1000.0)
            }
        );
        assert_eq!(
            adjacent_positions(&siblings, 2),
            Neighbors {
                prev: Some(2000.0),
                next: None
            }
        );
    }

    #[test]
    fn adjacent_positions_out_of_range_or_empty() {
        let empty: [f64; 0] = [];
        assert_eq!(adjacent_positions(&empty, 0), Neighbors::default());
        assert_eq!(adjacent_positions(&[1.0, 2.0], 3), Neighbors::default());
    }

    #[test]
    fn adjacent_positions_reads_items() {
        let items = vec![
            OrderableItem::root("a", 10.0, "s"),
            OrderableItem::root("b", 20.0, "s"),
        ];
        let refs: Vec<&OrderableItem> = items.iter().collect();
        let n = adjacent_positions(&refs, 1);
        assert_eq!(n.prev, Some(10.0));
        assert_eq!(n.next, Some(20.0));
    }
}
