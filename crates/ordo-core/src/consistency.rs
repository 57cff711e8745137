//! Authoritative re-execution of a move and reconciliation with the client's
//! optimistic plan.
//!
//! The authoritative algorithm works on dense ranks rather than fractional
//! positions:
//!
//! 1. every dragged item leaves its old group, and the old group is
//!    renumbered so no gap remains;
//! 2. the dragged items are inserted at the hinted index of the destination
//!    group, shifting every trailing sibling down;
//! 3. the destination group is renumbered `1, 2, 3, …` times the canonical
//!    step.
//!
//! Exact values differ from the client's fractional prediction. Relative
//! sibling order must not, and [`ConsistencyValidator::reconcile`] reports it
//! when it does. The authoritative updates always win.

#![allow(clippy::module_name_repetitions)]

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::ConsistencyConfig;
use crate::error::ErrorCode;
use crate::model::{ItemId, ItemUpdate, OrderableItem, ScopeId};
use crate::reorder::{MovePlan, parent_label};
use crate::snapshot::Snapshot;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where the moved items go, relative to the rest of the destination group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "at", content = "sibling")]
pub enum InsertionHint {
    Start,
    After(ItemId),
}

/// The move description the authoritative side consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritativeMove {
    pub scope_id: ScopeId,
    /// Items to move, in the order they end up in.
    pub dragged: Vec<ItemId>,
    pub new_parent_id: Option<ItemId>,
    pub hint: InsertionHint,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("item not found: '{0}'")]
    ItemNotFound(ItemId),
    #[error("item '{item}' is not in scope '{scope}'")]
    ScopeMismatch { item: ItemId, scope: ScopeId },
    #[error("insertion anchor '{anchor}' is not among the children of {}", parent_label(.parent.as_ref()))]
    AnchorNotInGroup {
        anchor: ItemId,
        parent: Option<ItemId>,
    },
    #[error("moving '{item}' under '{parent}' would create a cycle")]
    CircularParent { item: ItemId, parent: ItemId },
}

impl ValidationError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ItemNotFound(_) => ErrorCode::ItemNotFound,
            Self::ScopeMismatch { .. } => ErrorCode::ScopeMismatch,
            Self::AnchorNotInGroup { .. } => ErrorCode::AnchorNotInGroup,
            Self::CircularParent { .. } => ErrorCode::CircularParentRejected,
        }
    }
}

/// Updates produced by [`ConsistencyValidator::execute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoritativeOutcome {
    /// Dragged items first, then renumbered siblings whose value changed.
    pub updates: Vec<ItemUpdate>,
    /// Final destination group order.
    pub order: Vec<ItemId>,
}

/// BLAKE3 digests of the two destination orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFingerprints {
    pub predicted: String,
    pub authoritative: String,
}

/// Where the predicted and authoritative orders part ways.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// First index at which the two orders differ.
    pub first_divergence: usize,
    pub predicted: Vec<ItemId>,
    pub authoritative: Vec<ItemId>,
}

/// Diagnostic payload for audit and telemetry collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub scope_id: ScopeId,
    pub parent_id: Option<ItemId>,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<Mismatch>,
    pub fingerprints: OrderFingerprints,
}

impl ConsistencyReport {
    /// [`ErrorCode::ConsistencyMismatch`] when the orders disagreed.
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        if self.matched {
            None
        } else {
            Some(ErrorCode::ConsistencyMismatch)
        }
    }

    /// Serialize for an audit sink.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` failures.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Result of [`ConsistencyValidator::reconcile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub authoritative_move: AuthoritativeMove,
    /// Updates to persist; these replace the client's prediction.
    pub updates: Vec<ItemUpdate>,
    pub report: ConsistencyReport,
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

impl AuthoritativeMove {
    /// Derive the hint from a client plan and the snapshot it was planned on.
    ///
    /// The hint names the sibling that precedes the first moved item once the
    /// plan is applied, or [`InsertionHint::Start`] if there is none.
    ///
    /// # Errors
    ///
    /// [`ValidationError::ItemNotFound`] if the plan names an item missing
    /// from `client`.
    pub fn from_plan(client: &Snapshot, plan: &MovePlan) -> Result<Self, ValidationError> {
        let applied = client
            .with_updates(&plan.updates)
            .map_err(|err| ValidationError::ItemNotFound(err.0))?;
        let moved: BTreeSet<ItemId> = plan.moved.iter().cloned().collect();
        let group = applied.sibling_group(&plan.scope_id, plan.new_parent_id.as_ref(), &BTreeSet::new());

        let first = group.iter().position(|item| moved.contains(&item.id));
        let hint = first
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| group.get(index))
            .map_or(InsertionHint::Start, |item| InsertionHint::After(item.id.clone()));

        Ok(Self {
            scope_id: plan.scope_id.clone(),
            dragged: plan.moved.clone(),
            new_parent_id: plan.new_parent_id.clone(),
            hint,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConsistencyValidator {
    config: ConsistencyConfig,
}

impl ConsistencyValidator {
    #[must_use]
    pub fn new(config: ConsistencyConfig) -> Self {
        if config.canonical_step.is_finite() && config.canonical_step > 0.0 {
            Self { config }
        } else {
            tracing::warn!(
                canonical_step = config.canonical_step,
                "canonical step invalid, using default"
            );
            Self::default()
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ConsistencyConfig {
        &self.config
    }

    /// Canonical value of the 0-based rank `index`.
    #[allow(clippy::cast_precision_loss)]
    fn canonical(&self, index: usize) -> f64 {
        (index + 1) as f64 * self.config.canonical_step
    }

    /// Run the authoritative algorithm against server state.
    ///
    /// # Errors
    ///
    /// Any [`ValidationError`]; `server` is only read.
    pub fn execute(
        &self,
        server: &Snapshot,
        mv: &AuthoritativeMove,
    ) -> Result<AuthoritativeOutcome, ValidationError> {
        let scope = &mv.scope_id;
        let dragged: BTreeSet<ItemId> = mv.dragged.iter().cloned().collect();

        let mut old_parents: BTreeSet<Option<&ItemId>> = BTreeSet::new();
        for id in &mv.dragged {
            let item = server
                .get(id)
                .ok_or_else(|| ValidationError::ItemNotFound(id.clone()))?;
            if &item.scope_id != scope {
                return Err(ValidationError::ScopeMismatch {
                    item: id.clone(),
                    scope: scope.clone(),
                });
            }
            old_parents.insert(server.effective_parent(item));
        }

        if let Some(parent) = &mv.new_parent_id {
            if !server.get(parent).is_some_and(|item| &item.scope_id == scope) {
                return Err(ValidationError::ItemNotFound(parent.clone()));
            }
            if let Some(hit) = server.first_in_chain(Some(parent), &dragged) {
                return Err(ValidationError::CircularParent {
                    item: hit.clone(),
                    parent: parent.clone(),
                });
            }
        }

        let siblings = server.sibling_group(scope, mv.new_parent_id.as_ref(), &dragged);
        let index = match &mv.hint {
            InsertionHint::Start => 0,
            InsertionHint::After(anchor) => {
                siblings
                    .iter()
                    .position(|item| &item.id == anchor)
                    .ok_or_else(|| ValidationError::AnchorNotInGroup {
                        anchor: anchor.clone(),
                        parent: mv.new_parent_id.clone(),
                    })?
                    + 1
            }
        };

        let mut seen = BTreeSet::new();
        let incoming = mv
            .dragged
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| server.get(id));
        let (before, after) = siblings.split_at(index);
        let destination: Vec<&OrderableItem> = before
            .iter()
            .copied()
            .chain(incoming)
            .chain(after.iter().copied())
            .collect();

        let mut updates = Vec::new();
        let mut trailing = Vec::new();
        for (rank, item) in destination.iter().enumerate() {
            let value = self.canonical(rank);
            if dragged.contains(&item.id) {
                updates.push(ItemUpdate::reparent(item.id.clone(), value, mv.new_parent_id.clone()));
            } else if item.position.total_cmp(&value).is_ne() {
                trailing.push(ItemUpdate::reposition(item.id.clone(), value));
            }
        }

        for parent in old_parents {
            if parent == mv.new_parent_id.as_ref() {
                continue;
            }
            let remaining = server.sibling_group(scope, parent, &dragged);
            trailing.extend(remaining.iter().enumerate().filter_map(|(rank, item)| {
                let value = self.canonical(rank);
                item.position
                    .total_cmp(&value)
                    .is_ne()
                    .then(|| ItemUpdate::reposition(item.id.clone(), value))
            }));
        }
        updates.extend(trailing);

        tracing::debug!(
            scope = %scope,
            new_parent = ?mv.new_parent_id,
            index,
            updates = updates.len(),
            "executed authoritative move"
        );

        Ok(AuthoritativeOutcome {
            updates,
            order: destination.iter().map(|item| item.id.clone()).collect(),
        })
    }

    /// Re-execute `plan` authoritatively and compare relative orders.
    ///
    /// `client` is the snapshot the plan was computed from; `server` is the
    /// system of record. The plan's updates are applied to `server` to get
    /// the predicted order. Updates naming items the server no longer holds
    /// are skipped for the prediction.
    ///
    /// # Errors
    ///
    /// Any [`ValidationError`] raised deriving the hint or executing.
    pub fn reconcile(
        &self,
        server: &Snapshot,
        client: &Snapshot,
        plan: &MovePlan,
    ) -> Result<Reconciliation, ValidationError> {
        let authoritative_move = AuthoritativeMove::from_plan(client, plan)?;
        let outcome = self.execute(server, &authoritative_move)?;

        let known: Vec<ItemUpdate> = plan
            .updates
            .iter()
            .filter(|update| server.contains(&update.id))
            .cloned()
            .collect();
        let predicted_state = server
            .with_updates(&known)
            .map_err(|err| ValidationError::ItemNotFound(err.0))?;
        let predicted: Vec<ItemId> = predicted_state
            .sibling_group(&plan.scope_id, plan.new_parent_id.as_ref(), &BTreeSet::new())
            .iter()
            .map(|item| item.id.clone())
            .collect();

        let matched = predicted == outcome.order;
        let fingerprints = OrderFingerprints {
            predicted: fingerprint(&predicted),
            authoritative: fingerprint(&outcome.order),
        };
        let mismatch = (!matched).then(|| Mismatch {
            first_divergence: first_divergence(&predicted, &outcome.order),
            predicted,
            authoritative: outcome.order.clone(),
        });

        if let Some(detail) = &mismatch {
            tracing::warn!(
                code = %ErrorCode::ConsistencyMismatch,
                reason = ErrorCode::ConsistencyMismatch.message(),
                scope = %plan.scope_id,
                parent = ?plan.new_parent_id,
                first_divergence = detail.first_divergence,
                predicted = %fingerprints.predicted,
                authoritative = %fingerprints.authoritative,
                "optimistic order differs from authoritative order"
            );
        }

        Ok(Reconciliation {
            authoritative_move,
            updates: outcome.updates,
            report: ConsistencyReport {
                scope_id: plan.scope_id.clone(),
                parent_id: plan.new_parent_id.clone(),
                matched,
                mismatch,
                fingerprints,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// BLAKE3 digest of an id sequence.
fn fingerprint(order: &[ItemId]) -> String {
    let mut hasher = blake3::Hasher::new();
    for id in order {
        hasher.update(id.as_str().as_bytes());
        hasher.update(b"\x00");
    }
    format!("blake3:{}", hasher.finalize())
}

fn first_divergence(a: &[ItemId], b: &[ItemId]) -> usize {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .unwrap_or_else(|| a.len().min(b.len()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
