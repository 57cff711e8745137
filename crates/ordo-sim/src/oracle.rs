use std::collections::BTreeSet;

use ordo_core::config::PositionConfig;
use ordo_core::{ItemId, PositionCalculator, ScopeId, Snapshot, flatten, organize_snapshot};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;
use crate::simulator::{Action, MoveOutcome, SimulationResult, StepRecord};

// ── Core result types ─────────────────────────────────────────────────────────

/// Outcome of one or more invariant checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "invariant", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// The stored parent links loop through `item`.
    BrokenCycle { item: ItemId },

    /// Flattening the final forest lost or duplicated items.
    HiddenItems { expected: usize, flattened: usize },

    /// Two siblings share a position, so their order rests on the id
    /// tie-break alone.
    DuplicatePosition {
        scope: ScopeId,
        parent: Option<ItemId>,
        position: f64,
    },

    /// Two adjacent siblings leave no representable midpoint.
    ///
    /// A rebalance should have respaced the group before this happened.
    NoRoomBetween {
        scope: ScopeId,
        parent: Option<ItemId>,
        prev: f64,
        next: f64,
    },

    /// A plan made against an up-to-date snapshot disagreed with the
    /// authoritative order.
    FreshMismatch { step: usize },

    /// The client rejected a cycle that the server would have accepted, on a
    /// fresh snapshot.
    RejectionParity { step: usize },
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Invariant checks over a finished simulation.
///
/// # Invariants checked
///
/// 1. **Acyclic** (`check_acyclic`): organizing the final state breaks no cycles.
/// 2. **Completeness** (`check_completeness`): every item appears exactly once
///    when the forest is flattened.
/// 3. **Strict order** (`check_strict_order`): no sibling group holds two
///    equal positions, and every adjacent pair still has a midpoint.
/// 4. **Fresh agreement** (`check_fresh_agreement`): fresh plans always match
///    the authoritative result.
/// 5. **Rejection parity** (`check_rejection_parity`): a cycle the client
///    refuses on a fresh snapshot is refused by the server too.
pub struct OrderingOracle;

impl OrderingOracle {
    #[must_use]
    pub fn check_all(result: &SimulationResult) -> OracleResult {
        let snapshot = result.final_snapshot();
        Self::check_acyclic(&snapshot)
            .merge(Self::check_completeness(&snapshot))
            .merge(Self::check_strict_order(&snapshot, result.seed))
            .merge(Self::check_fresh_agreement(&result.trace))
            .merge(Self::check_rejection_parity(&result.trace))
    }

    // ── Invariant 1: Acyclic ─────────────────────────────────────────────────

    #[must_use]
    pub fn check_acyclic(snapshot: &Snapshot) -> OracleResult {
        let forest = organize_snapshot(snapshot);
        OracleResult::from_violations(
            forest
                .broken_cycles
                .into_iter()
                .map(|item| InvariantViolation::BrokenCycle { item })
                .collect(),
        )
    }

    // ── Invariant 2: Completeness ────────────────────────────────────────────

    #[must_use]
    pub fn check_completeness(snapshot: &Snapshot) -> OracleResult {
        let flat = flatten(&organize_snapshot(snapshot));
        let distinct: BTreeSet<&ItemId> = flat.iter().map(|item| &item.id).collect();
        if flat.len() == snapshot.len() && distinct.len() == snapshot.len() {
            OracleResult::pass()
        } else {
            OracleResult::from_violations(vec![InvariantViolation::HiddenItems {
                expected: snapshot.len(),
                flattened: distinct.len(),
            }])
        }
    }

    // ── Invariant 3: Strict order ────────────────────────────────────────────

    /// Walk every sibling group and check each adjacent gap with a
    /// midpoint calculator.
    #[must_use]
    pub fn check_strict_order(snapshot: &Snapshot, seed: u64) -> OracleResult {
        let calculator = PositionCalculator::new(PositionConfig::midpoint());
        let mut rng = DeterministicRng::fork(seed, 0xDEAD);
        let mut violations = Vec::new();

        for scope in snapshot.scopes() {
            let mut parents: BTreeSet<Option<&ItemId>> = BTreeSet::new();
            for item in snapshot.scope_items(scope) {
                parents.insert(snapshot.effective_parent(item));
            }

            for parent in parents {
                let group = snapshot.sibling_group(scope, parent, &BTreeSet::new());
                for pair in group.windows(2) {
                    let (prev, next) = (pair[0].position, pair[1].position);
                    if prev.total_cmp(&next).is_eq() {
                        violations.push(InvariantViolation::DuplicatePosition {
                            scope: scope.clone(),
                            parent: parent.cloned(),
                            position: prev,
                        });
                    } else if calculator
                        .calculate(Some(prev), Some(next), &mut rng)
                        .is_err()
                    {
                        violations.push(InvariantViolation::NoRoomBetween {
                            scope: scope.clone(),
                            parent: parent.cloned(),
                            prev,
                            next,
                        });
                    }
                }
            }
        }

        OracleResult::from_violations(violations)
    }

    // ── Invariant 4: Fresh agreement ─────────────────────────────────────────

    #[must_use]
    pub fn check_fresh_agreement(trace: &[StepRecord]) -> OracleResult {
        OracleResult::from_violations(
            trace
                .iter()
                .filter(|record| record.fresh)
                .filter(|record| {
                    matches!(
                        record.action,
                        Action::Move {
                            outcome: MoveOutcome::Applied { matched: false, .. }
                                | MoveOutcome::ServerRejected { .. },
                            ..
                        }
                    )
                })
                .map(|record| InvariantViolation::FreshMismatch { step: record.step })
                .collect(),
        )
    }

    // ── Invariant 5: Rejection parity ────────────────────────────────────────

    #[must_use]
    pub fn check_rejection_parity(trace: &[StepRecord]) -> OracleResult {
        OracleResult::from_violations(
            trace
                .iter()
                .filter(|record| record.fresh)
                .filter(|record| {
                    matches!(
                        record.action,
                        Action::Move {
                            outcome: MoveOutcome::ClientRejected {
                                server_rejects: Some(false),
                                ..
                            },
                            ..
                        }
                    )
                })
                .map(|record| InvariantViolation::RejectionParity { step: record.step })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use ordo_core::OrderableItem;

    use super::*;

    fn record(step: usize, fresh: bool, outcome: MoveOutcome) -> StepRecord {
        StepRecord {
            step,
            scope: ScopeId::from("s"),
            fresh,
            action: Action::Move {
                dragged: vec![ItemId::from("a")],
                target: ItemId::from("b"),
                ratio: 0.1,
                outcome,
            },
        }
    }

    #[test]
    fn healthy_forest_passes() {
        let snapshot = Snapshot::new(vec![
            OrderableItem::root("a", 1.0, "s"),
            OrderableItem::child("b", 1.0, "a", "s"),
            OrderableItem::root("c", 2.0, "s"),
        ]);
        assert!(OrderingOracle::check_acyclic(&snapshot).passed);
        assert!(OrderingOracle::check_completeness(&snapshot).passed);
        assert!(OrderingOracle::check_strict_order(&snapshot, 0).passed);
    }

    #[test]
    fn loop_is_reported() {
        let snapshot = Snapshot::new(vec![
            OrderableItem::child("a", 1.0, "b", "s"),
            OrderableItem::child("b", 2.0, "a", "s"),
        ]);
        let result = OrderingOracle::check_acyclic(&snapshot);
        assert!(!result.passed);
        assert!(matches!(
            result.violations[0],
            InvariantViolation::BrokenCycle { .. }
        ));
    }

    #[test]
    fn tied_siblings_are_reported() {
        let snapshot = Snapshot::new(vec![
            OrderableItem::root("a", 5.0, "s"),
            OrderableItem::root("b", 5.0, "s"),
        ]);
        let result = OrderingOracle::check_strict_order(&snapshot, 1);
        assert_eq!(result.violations.len(), 1);
        assert!(matches!(
            result.violations[0],
            InvariantViolation::DuplicatePosition { .. }
        ));
    }

    #[test]
    fn exhausted_gap_is_reported() {
        let next = f64::from_bits(1000.0_f64.to_bits() + 1);
        let snapshot = Snapshot::new(vec![
            OrderableItem::root("a", 1000.0, "s"),
            OrderableItem::root("b", next, "s"),
        ]);
        let result = OrderingOracle::check_strict_order(&snapshot, 1);
        assert!(matches!(
            result.violations.as_slice(),
            [InvariantViolation::NoRoomBetween { .. }]
        ));
    }

    #[test]
    fn stale_mismatch_is_allowed_fresh_is_not() {
        let applied = MoveOutcome::Applied {
            rebalanced: false,
            matched: false,
            updates: 3,
        };
        let trace = vec![record(0, false, applied.clone()), record(1, true, applied)];
        let result = OrderingOracle::check_fresh_agreement(&trace);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::FreshMismatch { step: 1 }]
        );
    }

    #[test]
    fn rejection_parity_only_flags_disagreement() {
        let rejected = |server_rejects| MoveOutcome::ClientRejected {
            code: "E2006".into(),
            server_rejects,
        };
        let trace = vec![
            record(0, true, rejected(Some(true))),
            record(1, true, rejected(None)),
            record(2, true, rejected(Some(false))),
            record(3, false, rejected(Some(false))),
        ];
        let result = OrderingOracle::check_rejection_parity(&trace);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::RejectionParity { step: 2 }]
        );
    }
}
