//! Tree-shaped views over a flat item set.
//!
//! ## Submodules
//!
//! - [`hierarchy`]: Forest construction with orphan adoption and a cycle
//!   guard, plus depth-first flattening.

pub mod hierarchy;

pub use hierarchy::{FlatEntry, Forest, TreeNode, flatten, organize, organize_snapshot};
