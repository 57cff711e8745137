//! Parent-child tree construction from a flat item list, and back.
//!
//! # Organize
//!
//! [`organize`] groups items by effective parent, orders each sibling group
//! with [`sibling_cmp`], and attaches children recursively. Roots of
//! different scopes are kept apart (ordered by scope first).
//!
//! - **Orphans**: a `parent_id` that does not resolve to an item of the same
//!   scope is treated as root level, so a dangling reference never hides an
//!   item.
//! - **Cycle guard**: while walking parent links, a link that would revisit a
//!   node on the current path is cut and that node becomes root level. Items
//!   are visited in id order so the cut is deterministic. `organize` never
//!   fails and always yields a valid forest.
//!
//! The guard tolerates bad data that already exists. Preventing new cycles is
//! the job of [`crate::reorder`], which rejects such moves outright.
//!
//! # Flatten
//!
//! [`flatten`] walks the forest depth-first, parents before children, so a
//! child always appears after its parent and before the parent's later
//! siblings.

#![allow(clippy::module_name_repetitions)]

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ItemId, OrderableItem};
use crate::snapshot::{Snapshot, sibling_cmp};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One node of a [`Forest`]. Children are indices into the forest's node
/// arena, so no operation on a forest recurses with its depth.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub item: OrderableItem,
    /// `0` for roots.
    pub depth: usize,
    /// Arena indices of the direct children, in sibling order.
    pub children: Vec<usize>,
}

/// One row of a flattened forest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatEntry<'a> {
    /// `0` for roots.
    pub depth: usize,
    pub item: &'a OrderableItem,
}

/// Result of [`organize`]: the roots plus what the defensive guards did.
///
/// Nodes live in one arena laid out depth-first, parents before children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forest {
    nodes: Vec<TreeNode>,
    roots: Vec<usize>,
    /// Items whose declared parent did not resolve and were lifted to root.
    pub adopted_orphans: Vec<ItemId>,
    /// Items whose parent link was cut to break a cycle.
    pub broken_cycles: Vec<ItemId>,
}

impl Forest {
    /// Total node count.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node, depth-first.
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&TreeNode> {
        self.nodes.get(index)
    }

    /// Root nodes in order.
    pub fn roots(&self) -> impl Iterator<Item = &TreeNode> {
        self.roots.iter().filter_map(|&index| self.nodes.get(index))
    }

    /// Direct children of `node`, in sibling order.
    pub fn children<'a>(&'a self, node: &'a TreeNode) -> impl Iterator<Item = &'a TreeNode> {
        node.children
            .iter()
            .filter_map(|&index| self.nodes.get(index))
    }

    /// Number of nodes in the subtree at `index`, including the node itself.
    ///
    /// A subtree is the node plus the run of deeper nodes that follows it.
    pub fn subtree_size(&self, index: usize) -> usize {
        let Some(node) = self.nodes.get(index) else {
            return 0;
        };
        1 + self.nodes[index + 1..]
            .iter()
            .take_while(|next| next.depth > node.depth)
            .count()
    }

    /// Depth-first, parent-before-children traversal.
    pub fn iter(&self) -> impl Iterator<Item = FlatEntry<'_>> {
        self.nodes.iter().map(|node| FlatEntry {
            depth: node.depth,
            item: &node.item,
        })
    }
}

// ---------------------------------------------------------------------------
// Core functions
// ---------------------------------------------------------------------------

/// Build a forest from a flat list in any order.
pub fn organize(items: &[OrderableItem]) -> Forest {
    organize_snapshot(&Snapshot::new(items.iter().cloned()))
}

/// Build a forest from a [`Snapshot`].
pub fn organize_snapshot(snapshot: &Snapshot) -> Forest {
    let mut adopted_orphans = Vec::new();
    let mut parents: BTreeMap<&ItemId, Option<&ItemId>> = BTreeMap::new();
    for item in snapshot.iter() {
        let parent = snapshot.effective_parent(item);
        if parent.is_none() && item.parent_id.is_some() {
            tracing::warn!(id = %item.id, "parent does not resolve, treating as root");
            adopted_orphans.push(item.id.clone());
        }
        parents.insert(&item.id, parent);
    }

    let broken_cycles = break_cycles(&mut parents);
    for id in &broken_cycles {
        tracing::warn!(id = %id, "parent link closes a cycle, treating as root");
    }

    let mut roots: Vec<&OrderableItem> = Vec::new();
    let mut children: BTreeMap<&ItemId, Vec<&OrderableItem>> = BTreeMap::new();
    for item in snapshot.iter() {
        match parents.get(&item.id).copied().flatten() {
            Some(parent_id) => children.entry(parent_id).or_default().push(item),
            None => roots.push(item),
        }
    }

    roots.sort_by(|a, b| a.scope_id.cmp(&b.scope_id).then_with(|| sibling_cmp(a, b)));
    for group in children.values_mut() {
        group.sort_by(|a, b| sibling_cmp(a, b));
    }

    let (nodes, roots) = build(&roots, &children);
    Forest {
        nodes,
        roots,
        adopted_orphans,
        broken_cycles,
    }
}

/// Depth-first, parent-before-children list of every item in `forest`.
pub fn flatten(forest: &Forest) -> Vec<OrderableItem> {
    forest.iter().map(|entry| entry.item.clone()).collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lay the forest out depth-first with an explicit work stack.
///
/// `children` must be acyclic, which [`break_cycles`] guarantees.
fn build(
    roots: &[&OrderableItem],
    children: &BTreeMap<&ItemId, Vec<&OrderableItem>>,
) -> (Vec<TreeNode>, Vec<usize>) {
    let mut nodes: Vec<TreeNode> = Vec::new();
    let mut root_indices = Vec::with_capacity(roots.len());
    // (item, depth, parent index)
    let mut stack: Vec<(&OrderableItem, usize, Option<usize>)> =
        roots.iter().rev().map(|item| (*item, 0, None)).collect();

    while let Some((item, depth, parent)) = stack.pop() {
        let index = nodes.len();
        match parent.and_then(|p| nodes.get_mut(p)) {
            Some(parent_node) => parent_node.children.push(index),
            None => root_indices.push(index),
        }
        nodes.push(TreeNode {
            item: item.clone(),
            depth,
            children: Vec::new(),
        });
        if let Some(kids) = children.get(&item.id) {
            stack.extend(kids.iter().rev().map(|kid| (*kid, depth + 1, Some(index))));
        }
    }
    (nodes, root_indices)
}

/// Cut every parent link that would revisit a node on the current walk.
///
/// Returns the ids whose links were cut, in the order they were cut.
fn break_cycles(parents: &mut BTreeMap<&ItemId, Option<&ItemId>>) -> Vec<ItemId> {
    let mut done: BTreeSet<ItemId> = BTreeSet::new();
    let mut cut = Vec::new();
    let ids: Vec<ItemId> = parents.keys().map(|id| (*id).clone()).collect();

    for start in &ids {
        if done.contains(start) {
            continue;
        }
        let mut path: Vec<ItemId> = Vec::new();
        let mut on_path: BTreeSet<ItemId> = BTreeSet::new();
        let mut current = start.clone();

        loop {
            path.push(current.clone());
            on_path.insert(current.clone());

            let Some(parent) = parents.get(&current).copied().flatten() else {
                break;
            };
            if on_path.contains(parent) {
                if let Some(slot) = parents.get_mut(&current) {
                    *slot = None;
                }
                cut.push(current);
                break;
            }
            if done.contains(parent) {
                break;
            }
            current = parent.clone();
        }

        done.extend(path);
    }
    cut
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn order(forest: &Forest) -> Vec<(usize, String)> {
        forest
            .iter()
            .map(|entry| (entry.depth, entry.item.id.to_string()))
            .collect()
    }

    fn flat_ids(items: &[OrderableItem]) -> Vec<String> {
        items.iter().map(|item| item.id.to_string()).collect()
    }

    #[test]
    fn empty_input_is_empty_forest() {
        let forest = organize(&[]);
        assert!(forest.is_empty());
        assert_eq!(forest.len(), 0);
        assert!(flatten(&forest).is_empty());
    }

    #[test]
    fn nests_children_in_position_order() {
        let items = vec![
            OrderableItem::child("c2", 2000.0, "p", "job"),
            OrderableItem::root("p", 1000.0, "job"),
            OrderableItem::child("c1", 1000.0, "p", "job"),
            OrderableItem::root("q", 2000.0, "job"),
        ];
        let forest = organize(&items);
        assert_eq!(forest.roots().count(), 2);
        assert_eq!(
            order(&forest),
            vec![
                (0, "p".to_string()),
                (1, "c1".to_string()),
                (1, "c2".to_string()),
                (0, "q".to_string()),
            ]
        );
    }

    #[test]
    fn child_precedes_parents_later_siblings() {
        // p ── c ── g ; q
        let items = vec![
            OrderableItem::root("q", 2.0, "s"),
            OrderableItem::child("g", 1.0, "c", "s"),
            OrderableItem::child("c", 1.0, "p", "s"),
            OrderableItem::root("p", 1.0, "s"),
        ];
        let flat = flatten(&organize(&items));
        assert_eq!(flat_ids(&flat), vec!["p", "c", "g", "q"]);
    }

    #[test]
    fn flatten_of_flat_input_is_identity() {
        let items = vec![
            OrderableItem::root("a", 1000.0, "s"),
            OrderableItem::child("a1", 1000.0, "a", "s"),
            OrderableItem::child("a2", 2000.0, "a", "s"),
            OrderableItem::root("b", 2000.0, "s"),
            OrderableItem::child("b1", 500.0, "b", "s"),
        ];
        let flat = flatten(&organize(&items));
        assert_eq!(flat, items);
    }

    #[test]
    fn orphan_is_adopted_as_root() {
        let items = vec![
            OrderableItem::root("a", 1.0, "s"),
            OrderableItem::child("b", 2.0, "deleted", "s"),
        ];
        let forest = organize(&items);
        assert_eq!(forest.roots().count(), 2);
        assert_eq!(forest.adopted_orphans, vec![ItemId::from("b")]);
        assert_eq!(forest.len(), 2);
    }

    #[test]
    fn cross_scope_parent_is_orphan() {
        let items = vec![
            OrderableItem::root("p", 1.0, "s1"),
            OrderableItem::child("c", 1.0, "p", "s2"),
        ];
        let forest = organize(&items);
        assert_eq!(forest.roots().count(), 2);
        // Roots are grouped by scope first.
        let scopes: Vec<&str> = forest.roots().map(|root| root.item.scope_id.as_str()).collect();
        assert_eq!(scopes, vec!["s1", "s2"]);
    }

    #[test]
    fn self_parent_is_root() {
        let items = vec![OrderableItem::child("a", 1.0, "a", "s")];
        let forest = organize(&items);
        assert_eq!(forest.roots().count(), 1);
        assert_eq!(forest.len(), 1);
    }

    #[test]
    fn two_cycle_is_broken_deterministically() {
        let items = vec![
            OrderableItem::child("b", 1.0, "a", "s"),
            OrderableItem::child("a", 1.0, "b", "s"),
        ];
        let forest = organize(&items);
        // Walk starts at "a" (id order): a -> b -> a, so b's link is cut.
        assert_eq!(forest.broken_cycles, vec![ItemId::from("b")]);
        assert_eq!(order(&forest), vec![(0, "b".to_string()), (1, "a".to_string())]);
    }

    #[test]
    fn cycle_with_tail_keeps_every_item() {
        // x -> a -> b -> c -> a
        let items = vec![
            OrderableItem::child("a", 1.0, "c", "s"),
            OrderableItem::child("b", 1.0, "a", "s"),
            OrderableItem::child("c", 1.0, "b", "s"),
            OrderableItem::child("x", 1.0, "a", "s"),
        ];
        let forest = organize(&items);
        assert_eq!(forest.len(), 4);
        assert_eq!(forest.broken_cycles.len(), 1);
        assert_eq!(forest.roots().count(), 1);
    }

    #[test]
    fn input_order_does_not_change_result() {
        let mut items = vec![
            OrderableItem::child("a", 1.0, "c", "s"),
            OrderableItem::child("b", 1.0, "a", "s"),
            OrderableItem::child("c", 1.0, "b", "s"),
            OrderableItem::root("r", 3.0, "s"),
        ];
        let first = organize(&items);
        items.reverse();
        let second = organize(&items);
        assert_eq!(first, second);
    }

    #[test]
    fn tree_node_size_counts_descendants() {
        let items = vec![
            OrderableItem::root("p", 1.0, "s"),
            OrderableItem::child("c", 1.0, "p", "s"),
            OrderableItem::child("g", 1.0, "c", "s"),
        ];
        let forest = organize(&items);
        assert_eq!(forest.subtree_size(0), 3);
        assert_eq!(forest.subtree_size(1), 2);
        assert_eq!(forest.subtree_size(9), 0);
    }

    #[test]
    fn children_are_arena_links_in_sibling_order() {
        let items = vec![
            OrderableItem::root("p", 1.0, "s"),
            OrderableItem::child("c2", 2.0, "p", "s"),
            OrderableItem::child("c1", 1.0, "p", "s"),
        ];
        let forest = organize(&items);
        let root = forest.roots().next().unwrap();
        let kids: Vec<&str> = forest.children(root).map(|n| n.item.id.as_str()).collect();
        assert_eq!(kids, vec!["c1", "c2"]);
        assert!(forest.children(forest.node(1).unwrap()).next().is_none());
    }

    fn chain(len: usize) -> Vec<OrderableItem> {
        (0..len)
            .map(|i| {
                let parent = i.checked_sub(1).map(|p| ItemId::new(format!("n{p:07}")));
                OrderableItem::new(format!("n{i:07}"), 1000.0, parent, "s")
            })
            .collect()
    }

    #[test]
    fn deep_chain_organizes_without_recursion() {
        let items = chain(100_000);
        let forest = organize(&items);
        assert_eq!(forest.len(), 100_000);
        assert_eq!(forest.roots().count(), 1);
        assert_eq!(forest.subtree_size(0), 100_000);
        assert!(forest.iter().enumerate().all(|(i, entry)| entry.depth == i));

        let flat = flatten(&forest);
        assert_eq!(flat.last().map(|item| item.id.as_str()), Some("n0099999"));

        let copy = forest.clone();
        assert_eq!(copy, forest);
        drop(copy);
    }

    #[test]
    fn deep_cycle_is_cut_once() {
        let mut items = chain(50_000);
        items[0].parent_id = Some(ItemId::new("n0049999"));
        let forest = organize(&items);
        assert_eq!(forest.len(), 50_000);
        assert_eq!(forest.broken_cycles.len(), 1);
        assert_eq!(forest.roots().count(), 1);
    }
}
