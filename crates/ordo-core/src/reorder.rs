//! Plan a single drop: new parent, insertion slot, and concrete updates.
//!
//! # Algorithm
//!
//! 1. **Parent**: `nest` adopts the target as parent; `reorder` adopts the
//!    target's own parent, so the dragged items become the target's siblings
//!    at any depth.
//! 2. **Cycle check**: the new parent's ancestor chain (itself included) must
//!    not contain a dragged item. One failing item rejects the whole drag.
//! 3. **Siblings**: the destination group `(scope, parent)` is built with every
//!    dragged item excluded, and the target is located in it. A target missing
//!    from its own group is an error, never an append.
//! 4. **Positions**: neighbors of the insertion slot feed the
//!    [`PositionCalculator`]. When the result would exhaust precision the
//!    whole group is respaced by the [`Rebalancer`] and every member gets an
//!    update; only dragged items ever receive a parent change.
//!
//! Dragged items whose ancestor is also dragged move with that ancestor and
//! get no update of their own. The remaining items are placed side by side in
//! their current display order.

#![allow(clippy::module_name_repetitions)]

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{NestPlacement, OrderingConfig};
use crate::drop_zone::{DropClassification, DropZoneResolver, Placement};
use crate::error::ErrorCode;
use crate::graph::hierarchy::organize_snapshot;
use crate::model::{ItemId, ItemUpdate, OrderableItem, ScopeId};
use crate::order::{PositionCalculator, Rebalancer, adjacent_positions};
use crate::snapshot::Snapshot;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The drop target as the rendering layer saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTarget {
    pub id: ItemId,
    pub parent_id: Option<ItemId>,
    pub scope_id: ScopeId,
}

impl From<&OrderableItem> for DropTarget {
    fn from(item: &OrderableItem) -> Self {
        Self {
            id: item.id.clone(),
            parent_id: item.parent_id.clone(),
            scope_id: item.scope_id.clone(),
        }
    }
}

/// A classified drop, passed to [`ReorderCoordinator::resolve`] once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub dragged: Vec<ItemId>,
    pub target: DropTarget,
    pub classification: DropClassification,
}

/// Raw drop input from the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveDescriptor {
    pub dragged_ids: Vec<ItemId>,
    pub target_id: ItemId,
    pub pointer_offset_ratio: f64,
}

/// Outcome of a resolved move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovePlan {
    pub scope_id: ScopeId,
    /// Parent adopted by the moved items.
    pub new_parent_id: Option<ItemId>,
    /// Dragged items that received an update, in placement order.
    pub moved: Vec<ItemId>,
    pub updates: Vec<ItemUpdate>,
    /// The whole destination group was respaced; apply atomically.
    pub rebalanced: bool,
}

/// Insertion point for a new item.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "at", content = "anchor")]
pub enum InsertAt {
    Start,
    #[default]
    End,
    Before(ItemId),
    After(ItemId),
}

/// Position chosen for a new item, plus sibling respacing if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItemPlacement {
    pub item: OrderableItem,
    pub sibling_updates: Vec<ItemUpdate>,
    pub rebalanced: bool,
}

/// Errors that reject a move or placement. No updates accompany an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReorderError {
    #[error("no items were dragged")]
    EmptyDrag,
    #[error("item not found: '{0}'")]
    ItemNotFound(ItemId),
    #[error("item '{item}' is in scope '{item_scope}' but the target is in scope '{target_scope}'")]
    ScopeMismatch {
        item: ItemId,
        item_scope: ScopeId,
        target_scope: ScopeId,
    },
    #[error("drop target '{0}' is one of the dragged items")]
    TargetIsDragged(ItemId),
    #[error("drop target '{target}' not found among the children of {}", parent_label(.parent.as_ref()))]
    TargetNotInSiblingGroup {
        target: ItemId,
        parent: Option<ItemId>,
    },
    #[error("moving '{item}' under '{parent}' would create a cycle")]
    CircularParentRejected { item: ItemId, parent: ItemId },
    #[error("insertion anchor '{0}' is not in the destination group")]
    AnchorNotInGroup(ItemId),
}

impl ReorderError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyDrag => ErrorCode::EmptyDrag,
            Self::ItemNotFound(_) => ErrorCode::ItemNotFound,
            Self::ScopeMismatch { .. } => ErrorCode::ScopeMismatch,
            Self::TargetIsDragged(_) => ErrorCode::TargetIsDragged,
            Self::TargetNotInSiblingGroup { .. } => ErrorCode::TargetNotInSiblingGroup,
            Self::CircularParentRejected { .. } => ErrorCode::CircularParentRejected,
            Self::AnchorNotInGroup(_) => ErrorCode::AnchorNotInGroup,
        }
    }
}

pub(crate) fn parent_label(parent: Option<&ItemId>) -> String {
    parent.map_or_else(|| "the root".to_string(), |id| format!("'{id}'"))
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReorderCoordinator {
    calculator: PositionCalculator,
    rebalancer: Rebalancer,
    drop_zone: DropZoneResolver,
    nest_placement: NestPlacement,
}

/// Values for the items entering a slot, plus respaced neighbors.
struct Placed {
    entering: Vec<f64>,
    siblings: Vec<ItemUpdate>,
    rebalanced: bool,
}

impl ReorderCoordinator {
    #[must_use]
    pub fn new(config: &OrderingConfig) -> Self {
        Self {
            calculator: PositionCalculator::new(config.position),
            rebalancer: Rebalancer::new(config.rebalance),
            drop_zone: DropZoneResolver::new(config.drop_zone),
            nest_placement: config.reorder.nest_placement,
        }
    }

    #[must_use]
    pub const fn drop_zone(&self) -> &DropZoneResolver {
        &self.drop_zone
    }

    #[must_use]
    pub const fn calculator(&self) -> &PositionCalculator {
        &self.calculator
    }

    #[must_use]
    pub const fn rebalancer(&self) -> &Rebalancer {
        &self.rebalancer
    }

    /// Classify a raw descriptor and resolve it against `snapshot`.
    ///
    /// # Errors
    ///
    /// [`ReorderError::ItemNotFound`] if the target is absent, otherwise as
    /// [`resolve`](Self::resolve).
    pub fn resolve_descriptor(
        &self,
        snapshot: &Snapshot,
        descriptor: &MoveDescriptor,
        rng: &mut impl Rng,
    ) -> Result<MovePlan, ReorderError> {
        let target = snapshot
            .get(&descriptor.target_id)
            .ok_or_else(|| ReorderError::ItemNotFound(descriptor.target_id.clone()))?;
        let request = MoveRequest {
            dragged: descriptor.dragged_ids.clone(),
            target: DropTarget::from(target),
            classification: self.drop_zone.classify(descriptor.pointer_offset_ratio),
        };
        self.resolve(snapshot, &request, rng)
    }

    /// Resolve a classified move into a [`MovePlan`].
    ///
    /// # Errors
    ///
    /// Any [`ReorderError`]; see the module docs for the checks.
    pub fn resolve(
        &self,
        snapshot: &Snapshot,
        request: &MoveRequest,
        rng: &mut impl Rng,
    ) -> Result<MovePlan, ReorderError> {
        if request.dragged.is_empty() {
            return Err(ReorderError::EmptyDrag);
        }
        let target = &request.target;
        let scope = &target.scope_id;
        let target_item = snapshot
            .get(&target.id)
            .ok_or_else(|| ReorderError::ItemNotFound(target.id.clone()))?;
        if &target_item.scope_id != scope {
            return Err(ReorderError::ScopeMismatch {
                item: target.id.clone(),
                item_scope: target_item.scope_id.clone(),
                target_scope: scope.clone(),
            });
        }

        let dragged: BTreeSet<ItemId> = request.dragged.iter().cloned().collect();
        for id in &dragged {
            let item = snapshot
                .get(id)
                .ok_or_else(|| ReorderError::ItemNotFound(id.clone()))?;
            if &item.scope_id != scope {
                return Err(ReorderError::ScopeMismatch {
                    item: id.clone(),
                    item_scope: item.scope_id.clone(),
                    target_scope: scope.clone(),
                });
            }
        }

        let new_parent = match request.classification {
            DropClassification::Nest => Some(target.id.clone()),
            DropClassification::Reorder(_) => resolvable_parent(snapshot, target),
        };

        if let Some(parent) = &new_parent
            && let Some(hit) = snapshot.first_in_chain(Some(parent), &dragged)
        {
            return Err(ReorderError::CircularParentRejected {
                item: hit.clone(),
                parent: parent.clone(),
            });
        }
        if dragged.contains(&target.id) {
            return Err(ReorderError::TargetIsDragged(target.id.clone()));
        }

        let siblings = snapshot.sibling_group(scope, new_parent.as_ref(), &dragged);
        let index = match request.classification {
            DropClassification::Reorder(placement) => {
                let at = siblings
                    .iter()
                    .position(|sibling| sibling.id == target.id)
                    .ok_or_else(|| ReorderError::TargetNotInSiblingGroup {
                        target: target.id.clone(),
                        parent: new_parent.clone(),
                    })?;
                match placement {
                    Placement::Above => at,
                    Placement::Below => at + 1,
                }
            }
            DropClassification::Nest => match self.nest_placement {
                NestPlacement::First => 0,
                NestPlacement::Last => siblings.len(),
            },
        };

        let moving = travelling_roots(snapshot, &dragged);
        let placed = self.place(&siblings, index, moving.len(), rng);

        let mut updates: Vec<ItemUpdate> = moving
            .iter()
            .zip(&placed.entering)
            .map(|(id, position)| ItemUpdate::reparent(id.clone(), *position, new_parent.clone()))
            .collect();
        updates.extend(placed.siblings);

        tracing::debug!(
            scope = %scope,
            new_parent = ?new_parent,
            index,
            moved = moving.len(),
            rebalanced = placed.rebalanced,
            "resolved move"
        );

        Ok(MovePlan {
            scope_id: scope.clone(),
            new_parent_id: new_parent,
            moved: moving,
            updates,
            rebalanced: placed.rebalanced,
        })
    }

    /// Choose a position for a new item `id` in `(scope, parent)`.
    ///
    /// # Errors
    ///
    /// - [`ReorderError::ItemNotFound`] if `parent` is not an item of `scope`.
    /// - [`ReorderError::AnchorNotInGroup`] if a `Before`/`After` anchor is
    ///   not a member of the group.
    pub fn place_new(
        &self,
        snapshot: &Snapshot,
        id: ItemId,
        scope: &ScopeId,
        parent: Option<&ItemId>,
        at: &InsertAt,
        rng: &mut impl Rng,
    ) -> Result<NewItemPlacement, ReorderError> {
        if let Some(parent_id) = parent
            && !snapshot
                .get(parent_id)
                .is_some_and(|item| &item.scope_id == scope)
        {
            return Err(ReorderError::ItemNotFound(parent_id.clone()));
        }

        let siblings = snapshot.sibling_group(scope, parent, &BTreeSet::new());
        let locate = |anchor: &ItemId| {
            siblings
                .iter()
                .position(|sibling| &sibling.id == anchor)
                .ok_or_else(|| ReorderError::AnchorNotInGroup(anchor.clone()))
        };
        let index = match at {
            InsertAt::Start => 0,
            InsertAt::End => siblings.len(),
            InsertAt::Before(anchor) => locate(anchor)?,
            InsertAt::After(anchor) => locate(anchor)? + 1,
        };

        let placed = self.place(&siblings, index, 1, rng);
        let position = placed
            .entering
            .first()
            .copied()
            .unwrap_or(self.calculator.config().initial_position);

        Ok(NewItemPlacement {
            item: OrderableItem::new(id, position, parent.cloned(), scope.clone()),
            sibling_updates: placed.siblings,
            rebalanced: placed.rebalanced,
        })
    }

    /// Positions for `count` items entering slot `index` of `siblings`.
    fn place(
        &self,
        siblings: &[&OrderableItem],
        index: usize,
        count: usize,
        rng: &mut impl Rng,
    ) -> Placed {
        let neighbors = adjacent_positions(siblings, index);
        let computed = self
            .calculator
            .calculate_run(neighbors.prev, neighbors.next, count, rng);

        match computed {
            Ok(entering) => {
                let mut group: Vec<f64> = siblings.iter().map(|s| s.position).collect();
                group.extend(&entering);
                if !self.rebalancer.needs_rebalancing(&group) {
                    return Placed {
                        entering,
                        siblings: Vec::new(),
                        rebalanced: false,
                    };
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "position calculation failed, rebalancing group");
            }
        }

        let index = index.min(siblings.len());
        let values = self.rebalancer.values(siblings.len() + count);
        let (before, after) = siblings.split_at(index);
        let mut updates = Vec::with_capacity(siblings.len());
        updates.extend(
            before
                .iter()
                .zip(&values[..index])
                .map(|(item, position)| ItemUpdate::reposition(item.id.clone(), *position)),
        );
        updates.extend(
            after
                .iter()
                .zip(&values[index + count..])
                .map(|(item, position)| ItemUpdate::reposition(item.id.clone(), *position)),
        );

        Placed {
            entering: values[index..index + count].to_vec(),
            siblings: updates,
            rebalanced: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The target's declared parent if it names an item of the target's scope.
///
/// An unresolvable parent was rendered at root level, so root it is.
fn resolvable_parent(snapshot: &Snapshot, target: &DropTarget) -> Option<ItemId> {
    target
        .parent_id
        .as_ref()
        .filter(|parent_id| *parent_id != &target.id)
        .filter(|parent_id| {
            snapshot
                .get(parent_id)
                .is_some_and(|parent| parent.scope_id == target.scope_id)
        })
        .cloned()
}

/// Dragged items without a dragged ancestor, in display order.
fn travelling_roots(snapshot: &Snapshot, dragged: &BTreeSet<ItemId>) -> Vec<ItemId> {
    let roots: Vec<&ItemId> = dragged
        .iter()
        .filter(|id| {
            !snapshot
                .ancestors(id)
                .iter()
                .any(|ancestor| dragged.contains(*ancestor))
        })
        .collect();

    if roots.len() < 2 {
        return roots.into_iter().cloned().collect();
    }

    let display: BTreeMap<ItemId, usize> = organize_snapshot(snapshot)
        .iter()
        .enumerate()
        .map(|(index, entry)| (entry.item.id.clone(), index))
        .collect();
    let mut ordered: Vec<ItemId> = roots.into_iter().cloned().collect();
    ordered.sort_by_key(|id| display.get(id).copied().unwrap_or(usize::MAX));
    ordered
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
