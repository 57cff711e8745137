//! Point-in-time item set that every engine call reads from.
//!
//! A [`Snapshot`] is a plain value: the engine never mutates one behind the
//! caller's back. Parent resolution follows one rule everywhere:
//!
//! - the **effective parent** of an item is its declared `parent_id` when that
//!   id names another item in the same scope, and root level otherwise.
//!
//! Orphaned references therefore surface an item at the root instead of
//! hiding it, and sibling groups agree with what [`crate::graph::hierarchy`]
//! renders.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::model::{ItemId, ItemUpdate, OrderableItem, ScopeId};

/// An update referenced an item the snapshot does not hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown item: '{0}'")]
pub struct UnknownItem(pub ItemId);

/// Sibling order: ascending position, then id for a stable tiebreak.
pub fn sibling_cmp(a: &OrderableItem, b: &OrderableItem) -> Ordering {
    a.position
        .total_cmp(&b.position)
        .then_with(|| a.id.cmp(&b.id))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    items: BTreeMap<ItemId, OrderableItem>,
}

impl Snapshot {
    /// Build a snapshot. A repeated id keeps the last occurrence.
    pub fn new(items: impl IntoIterator<Item = OrderableItem>) -> Self {
        let mut map = BTreeMap::new();
        for item in items {
            if let Some(previous) = map.insert(item.id.clone(), item) {
                tracing::warn!(id = %previous.id, "duplicate item id in snapshot, keeping last");
            }
        }
        Self { items: map }
    }

    #[must_use]
    pub fn get(&self, id: &ItemId) -> Option<&OrderableItem> {
        self.items.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in id order.
    pub fn iter(&self) -> impl Iterator<Item = &OrderableItem> {
        self.items.values()
    }

    /// Distinct scopes present, in order.
    pub fn scopes(&self) -> BTreeSet<&ScopeId> {
        self.items.values().map(|item| &item.scope_id).collect()
    }

    pub fn scope_items<'a>(&'a self, scope: &ScopeId) -> impl Iterator<Item = &'a OrderableItem> {
        self.items
            .values()
            .filter(move |item| &item.scope_id == scope)
    }

    /// Declared parent if it resolves within the item's scope, else `None`.
    #[must_use]
    pub fn effective_parent<'a>(&'a self, item: &'a OrderableItem) -> Option<&'a ItemId> {
        let parent_id = item.parent_id.as_ref()?;
        if parent_id == &item.id {
            return None;
        }
        self.items
            .get(parent_id)
            .filter(|parent| parent.scope_id == item.scope_id)
            .map(|parent| &parent.id)
    }

    /// Items of `(scope, parent)` ordered by [`sibling_cmp`], minus `exclude`.
    #[must_use]
    pub fn sibling_group(
        &self,
        scope: &ScopeId,
        parent: Option<&ItemId>,
        exclude: &BTreeSet<ItemId>,
    ) -> Vec<&OrderableItem> {
        let mut group: Vec<&OrderableItem> = self
            .scope_items(scope)
            .filter(|item| !exclude.contains(&item.id))
            .filter(|item| self.effective_parent(item) == parent)
            .collect();
        group.sort_by(|a, b| sibling_cmp(a, b));
        group
    }

    /// Direct children of `id`, ordered.
    #[must_use]
    pub fn children(&self, id: &ItemId) -> Vec<&OrderableItem> {
        self.items.get(id).map_or_else(Vec::new, |item| {
            self.sibling_group(&item.scope_id, Some(&item.id), &BTreeSet::new())
        })
    }

    /// Ancestor ids of `id`, nearest first. Stops at the root or at the
    /// first repeat.
    #[must_use]
    pub fn ancestors(&self, id: &ItemId) -> Vec<&ItemId> {
        let mut chain = Vec::new();
        let Some(start) = self.items.get(id) else {
            return chain;
        };
        let mut visited: BTreeSet<&ItemId> = BTreeSet::new();
        visited.insert(&start.id);

        let mut current = self.effective_parent(start);
        while let Some(parent_id) = current {
            if !visited.insert(parent_id) {
                break; // cycle guard
            }
            chain.push(parent_id);
            current = self
                .items
                .get(parent_id)
                .and_then(|parent| self.effective_parent(parent));
        }
        chain
    }

    /// First member of `candidates` found walking up from `start`
    /// (inclusive) to the root.
    #[must_use]
    pub fn first_in_chain<'a>(
        &'a self,
        start: Option<&'a ItemId>,
        candidates: &BTreeSet<ItemId>,
    ) -> Option<&'a ItemId> {
        let start = start?;
        if candidates.contains(start) {
            return Some(start);
        }
        self.ancestors(start)
            .into_iter()
            .find(|ancestor| candidates.contains(*ancestor))
    }

    /// Ids in the subtree rooted at `root`, including `root`, in BFS order.
    #[must_use]
    pub fn subtree_ids(&self, root: &ItemId) -> Vec<ItemId> {
        let mut visited: BTreeSet<ItemId> = BTreeSet::new();
        let mut queue: VecDeque<ItemId> = VecDeque::new();
        let mut result = Vec::new();

        if !self.contains(root) {
            return result;
        }
        queue.push_back(root.clone());

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue; // cycle guard
            }
            for child in self.children(&current) {
                if !visited.contains(&child.id) {
                    queue.push_back(child.id.clone());
                }
            }
            result.push(current);
        }
        result
    }

    /// Insert or replace one item.
    pub fn insert(&mut self, item: OrderableItem) -> Option<OrderableItem> {
        self.items.insert(item.id.clone(), item)
    }

    /// Drop an item. Its children become root-level through orphan adoption.
    pub fn remove(&mut self, id: &ItemId) -> Option<OrderableItem> {
        self.items.remove(id)
    }

    /// Apply every update, or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownItem`] for the first update naming an absent item;
    /// the snapshot is left untouched.
    pub fn apply(&mut self, updates: &[ItemUpdate]) -> Result<(), UnknownItem> {
        if let Some(missing) = updates.iter().find(|u| !self.items.contains_key(&u.id)) {
            return Err(UnknownItem(missing.id.clone()));
        }
        for update in updates {
            if let Some(item) = self.items.get_mut(&update.id) {
                update.apply_to(item);
            }
        }
        Ok(())
    }

    /// Copy of this snapshot with `updates` applied.
    ///
    /// # Errors
    ///
    /// Same as [`apply`](Self::apply).
    pub fn with_updates(&self, updates: &[ItemUpdate]) -> Result<Self, UnknownItem> {
        let mut next = self.clone();
        next.apply(updates)?;
        Ok(next)
    }
}

impl FromIterator<OrderableItem> for Snapshot {
    fn from_iter<I: IntoIterator<Item = OrderableItem>>(iter: I) -> Self {
        Self::new(iter)
    }
}
