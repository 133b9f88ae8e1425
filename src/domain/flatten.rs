//! Tree flattener: nested source tree to flat taxon list.
//!
//! Anonymous interior nodes (no taxon id) are collapsed: their named
//! descendants are reparented to the nearest named ancestor.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::entities::{ArgusonNode, TaxonId, TaxonNode, DEFAULT_RANK};

/// Converts an [`ArgusonNode`] tree into [`TaxonNode`] records.
#[derive(Debug, Clone, Default)]
pub struct TreeFlattener {
    max_depth: Option<usize>,
}

impl TreeFlattener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every node deeper than `max_depth` (root = 0, anonymous levels count).
    pub fn with_max_depth(max_depth: Option<usize>) -> Self {
        Self { max_depth }
    }

    fn within_depth(&self, depth: usize) -> bool {
        self.max_depth.map_or(true, |max| depth <= max)
    }

    /// Flatten the tree in pre-order, children left to right.
    ///
    /// Returns an empty list when the root carries no taxon id; callers decide
    /// whether that aborts the run.
    pub fn flatten(&self, tree: &ArgusonNode) -> Vec<TaxonNode> {
        if tree.ott_id().is_none() {
            warn!(
                "source tree root {:?} has no taxon id, nothing to flatten",
                tree.node_id
            );
            return Vec::new();
        }

        let mut nodes = Vec::new();
        let mut stack: Vec<(&ArgusonNode, Option<TaxonId>, usize)> = vec![(tree, None, 0)];

        while let Some((current, named_parent, depth)) = stack.pop() {
            let effective_parent = match current.ott_id() {
                Some(id) => {
                    nodes.push(self.to_taxon(current, id, named_parent, depth));
                    Some(id)
                }
                None => named_parent,
            };

            if self.within_depth(depth + 1) {
                for child in current.children.iter().rev() {
                    stack.push((child, effective_parent, depth + 1));
                }
            }
        }

        fill_descendant_counts(&mut nodes);
        debug!("flattened {} named taxa", nodes.len());
        nodes
    }

    fn to_taxon(
        &self,
        node: &ArgusonNode,
        id: TaxonId,
        parent_id: Option<TaxonId>,
        depth: usize,
    ) -> TaxonNode {
        let taxon = node.taxon.clone().unwrap_or_default();
        let name = taxon
            .name
            .or_else(|| node.node_id.clone())
            .unwrap_or_default();
        TaxonNode {
            id,
            name,
            rank: taxon.rank.unwrap_or_else(|| DEFAULT_RANK.to_string()),
            parent_id,
            child_ids: self.named_descendants(node, depth),
            num_tips: node.num_tips.unwrap_or(0),
            descendant_count: 1,
            common_name: None,
        }
    }

    /// Nearest named descendants reachable through anonymous nodes only.
    fn named_descendants(&self, node: &ArgusonNode, depth: usize) -> Vec<TaxonId> {
        let mut found = Vec::new();
        if !self.within_depth(depth + 1) {
            return found;
        }
        let mut stack: Vec<(&ArgusonNode, usize)> =
            node.children.iter().rev().map(|c| (c, depth + 1)).collect();

        while let Some((current, level)) = stack.pop() {
            match current.ott_id() {
                Some(id) => found.push(id),
                None if self.within_depth(level + 1) => {
                    for child in current.children.iter().rev() {
                        stack.push((child, level + 1));
                    }
                }
                None => {}
            }
        }
        found
    }
}

/// Nodes arrive in pre-order, so a reverse sweep sees every child before its parent.
fn fill_descendant_counts(nodes: &mut [TaxonNode]) {
    let position: HashMap<TaxonId, usize> =
        nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
    let mut counts = vec![1usize; nodes.len()];

    for i in (0..nodes.len()).rev() {
        if let Some(parent_pos) = nodes[i].parent_id.and_then(|p| position.get(&p).copied()) {
            counts[parent_pos] += counts[i];
        }
    }
    for (node, count) in nodes.iter_mut().zip(counts) {
        node.descendant_count = count;
    }
}
