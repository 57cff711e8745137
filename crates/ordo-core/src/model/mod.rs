//! Fixed record types shared by every ordering component.

pub mod item;

pub use item::{ItemId, ItemUpdate, OrderableItem, ParentAssignment, ScopeId};
