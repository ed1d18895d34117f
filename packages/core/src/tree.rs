//! Tree Assembly
//!
//! Turns a flat list of [`RetroNode`] rows into a forest. The assembler is
//! a structural transform only: children keep the order in which the input
//! presented them, so callers that want sibling order by `order_index`
//! run [`sort_for_assembly`] first.
//!
//! Nodes are never dropped. A node whose `parent_id` is absent, does not
//! resolve to any node in the input, or whose ancestor chain loops back to
//! itself becomes a root.

use crate::models::RetroNode;
use std::collections::{HashMap, HashSet};

/// A node with its children attached (derived view, never persisted)
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTree {
    pub node: RetroNode,
    pub children: Vec<NodeTree>,
}

impl NodeTree {
    pub fn leaf(node: RetroNode) -> Self {
        Self {
            node,
            children: Vec::new(),
        }
    }

    /// Depth-first search for `id` in this subtree
    pub fn find(&self, id: &str) -> Option<&NodeTree> {
        if self.node.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Levels in this subtree (a leaf has depth 1)
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(NodeTree::depth).max().unwrap_or(0)
    }

    /// Number of nodes in this subtree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(NodeTree::size).sum::<usize>()
    }
}

/// Build a forest from a flat node list
///
/// One pass builds the id lookup (the first occurrence of a duplicated id
/// owns it); a second pass links every node to its resolvable parent in
/// input order. Cycles are broken by demoting the earliest node of each
/// cycle, in input order, to a root.
pub fn assemble_forest(nodes: Vec<RetroNode>) -> Vec<NodeTree> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        index.entry(node.id.as_str()).or_insert(i);
    }

    let mut parent_of: Vec<Option<usize>> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            node.parent_id
                .as_deref()
                .and_then(|parent_id| index.get(parent_id).copied())
                .filter(|&p| p != i)
        })
        .collect();

    for i in 0..nodes.len() {
        if loops_back(&parent_of, i) {
            tracing::warn!(
                "Parent cycle through node {}, placing it at the root",
                nodes[i].id
            );
            parent_of[i] = None;
        }
    }

    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut roots = Vec::new();
    for (i, parent) in parent_of.iter().enumerate() {
        match parent {
            Some(p) => children_of[*p].push(i),
            None => roots.push(i),
        }
    }

    let mut slots: Vec<Option<RetroNode>> = nodes.into_iter().map(Some).collect();
    roots
        .into_iter()
        .filter_map(|root| build_subtree(root, &children_of, &mut slots))
        .collect()
}

/// Does the ancestor chain starting at `start` come back to `start`?
fn loops_back(parent_of: &[Option<usize>], start: usize) -> bool {
    let mut seen = HashSet::new();
    let mut current = parent_of[start];
    while let Some(p) = current {
        if p == start {
            return true;
        }
        // A loop that does not include `start`; it is broken when its own
        // members are visited.
        if !seen.insert(p) {
            return false;
        }
        current = parent_of[p];
    }
    false
}

fn build_subtree(
    at: usize,
    children_of: &[Vec<usize>],
    slots: &mut [Option<RetroNode>],
) -> Option<NodeTree> {
    let node = slots[at].take()?;
    let children = children_of[at]
        .iter()
        .filter_map(|&child| build_subtree(child, children_of, slots))
        .collect();
    Some(NodeTree { node, children })
}

/// Order a flat list so siblings follow `order_index`
///
/// Nodes are grouped by the path of their parent (ancestors before
/// descendants), then by `order_index`. The sort is stable, so equal
/// `order_index` values keep arrival order.
pub fn sort_for_assembly(nodes: &mut [RetroNode]) {
    nodes.sort_by(|a, b| {
        parent_path(&a.path)
            .cmp(parent_path(&b.path))
            .then_with(|| a.order_index.cmp(&b.order_index))
    });
}

fn parent_path(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(cut) => &path[..cut],
        None => "",
    }
}

/// Pre-order traversal of a forest
pub fn flatten_preorder(forest: &[NodeTree]) -> Vec<&RetroNode> {
    let mut out = Vec::new();
    let mut stack: Vec<&NodeTree> = forest.iter().rev().collect();
    while let Some(tree) = stack.pop() {
        out.push(&tree.node);
        stack.extend(tree.children.iter().rev());
    }
    out
}
