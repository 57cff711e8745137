use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque unique identifier of an orderable item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for ItemId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Identifier of the enclosing collection (a list, a job) an item lives in.
///
/// Items in different scopes never compare.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for ScopeId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// One row of a reorderable tree.
///
/// `parent_id` is either a reference or `None` (root level). There is no
/// third "missing" state, so sibling-group computation cannot misclassify
/// an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderableItem {
    pub id: ItemId,
    /// Order among siblings, ascending.
    pub position: f64,
    pub parent_id: Option<ItemId>,
    pub scope_id: ScopeId,
}

impl OrderableItem {
    pub fn new(
        id: impl Into<ItemId>,
        position: f64,
        parent_id: Option<ItemId>,
        scope_id: impl Into<ScopeId>,
    ) -> Self {
        Self {
            id: id.into(),
            position,
            parent_id,
            scope_id: scope_id.into(),
        }
    }

    /// Root-level item in `scope_id`.
    pub fn root(id: impl Into<ItemId>, position: f64, scope_id: impl Into<ScopeId>) -> Self {
        Self::new(id, position, None, scope_id)
    }

    /// Item nested under `parent`.
    pub fn child(
        id: impl Into<ItemId>,
        position: f64,
        parent: impl Into<ItemId>,
        scope_id: impl Into<ScopeId>,
    ) -> Self {
        Self::new(id, position, Some(parent.into()), scope_id)
    }
}

/// What an update does to an item's `parent_id`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "parent_id")]
pub enum ParentAssignment {
    /// Leave `parent_id` as it is (rebalanced siblings).
    #[default]
    Unchanged,
    /// Overwrite `parent_id`; `None` moves the item to root level.
    Set(Option<ItemId>),
}

/// A single row change emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub id: ItemId,
    pub position: f64,
    #[serde(default)]
    pub parent: ParentAssignment,
}

impl ItemUpdate {
    /// Position-only update.
    #[must_use]
    pub const fn reposition(id: ItemId, position: f64) -> Self {
        Self {
            id,
            position,
            parent: ParentAssignment::Unchanged,
        }
    }

    /// Position update that also adopts `parent_id`.
    #[must_use]
    pub const fn reparent(id: ItemId, position: f64, parent_id: Option<ItemId>) -> Self {
        Self {
            id,
            position,
            parent: ParentAssignment::Set(parent_id),
        }
    }

    /// Apply this update to `item` in place.
    pub fn apply_to(&self, item: &mut OrderableItem) {
        item.position = self.position;
        if let ParentAssignment::Set(parent_id) = &self.parent {
            item.parent_id.clone_from(parent_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_display_and_from() {
        let id = ItemId::from("task-7");
        assert_eq!(id.to_string(), "task-7");
        assert_eq!(id.as_str(), "task-7");
        assert_eq!(ItemId::from("task-7".to_string()), id);
    }

    #[test]
    fn constructors_set_parent() {
        let root = OrderableItem::root("a", 1000.0, "job-1");
        assert!(root.parent_id.is_none());

        let child = OrderableItem::child("b", 2000.0, "a", "job-1");
        assert_eq!(child.parent_id, Some(ItemId::from("a")));
        assert_eq!(child.scope_id, ScopeId::from("job-1"));
    }

    #[test]
    fn reposition_keeps_parent() {
        let mut item = OrderableItem::child("b", 2000.0, "a", "job-1");
        ItemUpdate::reposition(ItemId::from("b"), 1500.0).apply_to(&mut item);
        assert!((item.position - 1500.0).abs() < f64::EPSILON);
        assert_eq!(item.parent_id, Some(ItemId::from("a")));
    }

    #[test]
    fn reparent_to_root_clears_parent() {
        let mut item = OrderableItem::child("b", 2000.0, "a", "job-1");
        ItemUpdate::reparent(ItemId::from("b"), 500.0, None).apply_to(&mut item);
        assert!(item.parent_id.is_none());
    }

    #[test]
    fn update_serializes_parent_assignment() {
        let update = ItemUpdate::reparent(ItemId::from("b"), 500.0, Some(ItemId::from("a")));
        let json = serde_json::to_string(&update).expect("serialize");
        assert!(json.contains("\"kind\":\"set\""), "json: {json}");
        assert!(json.contains("\"parent_id\":\"a\""), "json: {json}");

        let back: ItemUpdate = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, update);
    }

    #[test]
    fn update_without_parent_defaults_to_unchanged() {
        let update: ItemUpdate =
            serde_json::from_str(r#"{"id":"b","position":12.5}"#).expect("deserialize");
        assert_eq!(update.parent, ParentAssignment::Unchanged);
    }
}
