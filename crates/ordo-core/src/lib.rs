//! ordo-core library.
//!
//! Ordering engine for tree-shaped, drag-and-drop reorderable collections.
//! Every entry point takes a [`Snapshot`] and returns a value; nothing here
//! holds shared mutable state.
//!
//! Flow of a drop:
//!
//! ```text
//! pointer ratio ─► DropZoneResolver ─► ReorderCoordinator ─► MovePlan (optimistic)
//!                                            │
//!                     PositionCalculator / Rebalancer
//!
//! MovePlan ─► ConsistencyValidator::reconcile (server) ─► UpdateBatch ─► PersistenceSink
//! ```
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums per module, each mapping to an
//!   [`ErrorCode`]; `anyhow::Result` only at I/O boundaries.
//! - **Logging**: `tracing` macros (`debug!` for plan decisions, `warn!` for
//!   recoveries from bad data).
//! - **Randomness**: callers pass the RNG, so a seeded RNG reproduces a plan
//!   exactly.

pub mod config;
pub mod consistency;
pub mod drop_zone;
pub mod error;
pub mod graph;
pub mod model;
pub mod order;
pub mod reorder;
pub mod snapshot;
pub mod store;

pub use config::{OrderingConfig, load_config, parse_config};
pub use consistency::{
    AuthoritativeMove, ConsistencyReport, ConsistencyValidator, InsertionHint, Reconciliation,
    ValidationError,
};
pub use drop_zone::{DropClassification, DropZoneResolver, Placement};
pub use error::ErrorCode;
pub use graph::{Forest, flatten, organize, organize_snapshot};
pub use model::{ItemId, ItemUpdate, OrderableItem, ParentAssignment, ScopeId};
pub use order::{PositionCalculator, PositionError, Rebalancer, needs_rebalancing, rebalance};
pub use reorder::{
    DropTarget, InsertAt, MoveDescriptor, MovePlan, MoveRequest, NewItemPlacement,
    ReorderCoordinator, ReorderError,
};
pub use snapshot::Snapshot;
pub use store::{MemoryStore, PersistenceSink, SnapshotProvider, StoreError, UpdateBatch};
