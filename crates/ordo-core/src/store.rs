//! Storage seams: where snapshots come from and where updates go.
//!
//! The engine never reads or writes storage itself. A caller acquires a
//! consistent [`Snapshot`] through a [`SnapshotProvider`], runs the engine,
//! and hands the resulting [`UpdateBatch`] to a [`PersistenceSink`], which
//! must apply it all-or-nothing. [`MemoryStore`] implements both and backs
//! the tests and the simulator.

#![allow(clippy::module_name_repetitions)]

use serde::{Deserialize, Serialize};

use crate::consistency::Reconciliation;
use crate::error::ErrorCode;
use crate::model::{ItemId, ItemUpdate, OrderableItem, ParentAssignment, ScopeId};
use crate::reorder::{MovePlan, NewItemPlacement};
use crate::snapshot::Snapshot;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Source of consistent point-in-time snapshots.
pub trait SnapshotProvider {
    /// Every item of `scope`, as of one instant.
    fn snapshot(&self, scope: &ScopeId) -> Snapshot;
}

/// Destination for engine output.
pub trait PersistenceSink {
    /// Error type for rejected batches.
    type Error: std::fmt::Debug + std::fmt::Display;

    /// Apply every update in `batch`, or none of them.
    fn persist(&mut self, batch: &UpdateBatch) -> Result<(), Self::Error>;
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// One atomic unit of writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateBatch {
    pub scope_id: ScopeId,
    pub updates: Vec<ItemUpdate>,
    /// The batch rewrites a whole sibling group.
    pub full_rebalance: bool,
}

impl UpdateBatch {
    #[must_use]
    pub const fn new(scope_id: ScopeId, updates: Vec<ItemUpdate>, full_rebalance: bool) -> Self {
        Self {
            scope_id,
            updates,
            full_rebalance,
        }
    }

    /// Optimistic batch for a client plan.
    #[must_use]
    pub fn from_plan(plan: &MovePlan) -> Self {
        Self::new(plan.scope_id.clone(), plan.updates.clone(), plan.rebalanced)
    }

    /// Authoritative batch. Renumbering always covers the whole group.
    #[must_use]
    pub fn from_reconciliation(reconciliation: &Reconciliation) -> Self {
        Self::new(
            reconciliation.report.scope_id.clone(),
            reconciliation.updates.clone(),
            true,
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("unknown item: '{0}'")]
    UnknownItem(ItemId),
    #[error("update batch for scope '{0}' is empty")]
    EmptyBatch(ScopeId),
    #[error("item '{item}' is not in scope '{scope}'")]
    ScopeMismatch { item: ItemId, scope: ScopeId },
    #[error("item '{0}' already exists")]
    DuplicateItem(ItemId),
}

impl StoreError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownItem(_) => ErrorCode::ItemNotFound,
            Self::EmptyBatch(_) => ErrorCode::EmptyBatch,
            Self::ScopeMismatch { .. } => ErrorCode::ScopeMismatch,
            Self::DuplicateItem(_) => ErrorCode::DuplicateItem,
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A versioned [`Snapshot`] that acts as the system of record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    items: Snapshot,
    version: u64,
}

impl MemoryStore {
    pub fn new(items: impl IntoIterator<Item = OrderableItem>) -> Self {
        Self {
            items: Snapshot::new(items),
            version: 0,
        }
    }

    /// Number of batches applied so far.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Everything the store holds, across scopes.
    #[must_use]
    pub const fn all(&self) -> &Snapshot {
        &self.items
    }

    /// Persist a newly placed item and any sibling respacing it required.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateItem`] if the id is already taken.
    /// - [`StoreError::UnknownItem`] or [`StoreError::ScopeMismatch`] if a
    ///   sibling update or the parent is not an item of the new item's scope.
    pub fn create(&mut self, placement: &NewItemPlacement) -> Result<(), StoreError> {
        let item = &placement.item;
        if self.items.contains(&item.id) {
            return Err(StoreError::DuplicateItem(item.id.clone()));
        }
        if let Some(parent) = &item.parent_id {
            self.check_in_scope(parent, &item.scope_id)?;
        }
        self.check_updates(&placement.sibling_updates, &item.scope_id)?;

        let mut next = self.items.clone();
        next.insert(placement.item.clone());
        next.apply(&placement.sibling_updates)
            .map_err(|err| StoreError::UnknownItem(err.0))?;
        self.items = next;
        self.version += 1;
        Ok(())
    }

    /// Delete one item. Its children surface at root level.
    pub fn remove(&mut self, id: &ItemId) -> Option<OrderableItem> {
        let removed = self.items.remove(id);
        if removed.is_some() {
            self.version += 1;
        }
        removed
    }

    fn check_in_scope(&self, id: &ItemId, scope: &ScopeId) -> Result<(), StoreError> {
        let item = self
            .items
            .get(id)
            .ok_or_else(|| StoreError::UnknownItem(id.clone()))?;
        if &item.scope_id == scope {
            Ok(())
        } else {
            Err(StoreError::ScopeMismatch {
                item: id.clone(),
                scope: scope.clone(),
            })
        }
    }

    /// Every updated item, and every parent it is moved under, lives in `scope`.
    fn check_updates(&self, updates: &[ItemUpdate], scope: &ScopeId) -> Result<(), StoreError> {
        for update in updates {
            self.check_in_scope(&update.id, scope)?;
            if let ParentAssignment::Set(Some(parent)) = &update.parent {
                self.check_in_scope(parent, scope)?;
            }
        }
        Ok(())
    }
}

impl SnapshotProvider for MemoryStore {
    fn snapshot(&self, scope: &ScopeId) -> Snapshot {
        self.items.scope_items(scope).cloned().collect()
    }
}

impl PersistenceSink for MemoryStore {
    type Error = StoreError;

    fn persist(&mut self, batch: &UpdateBatch) -> Result<(), Self::Error> {
        if batch.is_empty() {
            return Err(StoreError::EmptyBatch(batch.scope_id.clone()));
        }
        self.check_updates(&batch.updates, &batch.scope_id)?;
        self.items
            .apply(&batch.updates)
            .map_err(|err| StoreError::UnknownItem(err.0))?;
        self.version += 1;
        tracing::debug!(
            scope = %batch.scope_id,
            updates = batch.len(),
            full_rebalance = batch.full_rebalance,
            version = self.version,
            "persisted update batch"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
