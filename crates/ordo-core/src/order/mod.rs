//! Numeric order values for siblings.
//!
//! - [`position`]: new values between optional neighbors.
//! - [`rebalance`]: precision-exhaustion detection and even respacing.

pub mod position;
pub mod rebalance;

pub use position::{Neighbors, PositionCalculator, PositionError, Positioned, adjacent_positions};
pub use rebalance::{Rebalancer, min_adjacent_gap, needs_rebalancing, rebalance};
