use std::collections::HashMap;

use generational_arena::{Arena, Index};
use tracing::{debug, instrument};

use crate::domain::entities::{TaxonId, TaxonNode};
use crate::domain::error::{DomainError, DomainResult};

/// Tree node in the arena-based taxonomy.
#[derive(Debug)]
pub struct TreeNode {
    /// Taxon payload, `descendant_count` filled from the index
    pub taxon: TaxonNode,
    /// Index of parent node in the arena, None for the root
    pub parent: Option<Index>,
    /// Indices of child nodes in the arena, in input order
    pub children: Vec<Index>,
    /// Number of nodes in the subtree rooted here, inclusive
    pub subtree_size: usize,
}

/// Validated parent→children index over a flat taxon list.
///
/// Subtree sizes are computed once on construction, so the same tree can be
/// partitioned repeatedly with different thresholds.
#[derive(Debug)]
pub struct TaxonTree {
    arena: Arena<TreeNode>,
    by_id: HashMap<TaxonId, Index>,
    root: Index,
}

impl TaxonTree {
    /// Build the index from a flat node list.
    ///
    /// Rejects empty input, duplicate ids, missing or multiple roots,
    /// dangling parent references and cycles.
    #[instrument(level = "debug", skip(nodes), fields(count = nodes.len()))]
    pub fn from_nodes(nodes: Vec<TaxonNode>) -> DomainResult<Self> {
        if nodes.is_empty() {
            return Err(DomainError::EmptyTree);
        }

        let mut arena = Arena::with_capacity(nodes.len());
        let mut by_id = HashMap::with_capacity(nodes.len());
        let mut links = Vec::with_capacity(nodes.len());
        let mut root: Option<(TaxonId, Index)> = None;

        for taxon in nodes {
            let id = taxon.id;
            let parent_id = taxon.parent_id;
            let idx = arena.insert(TreeNode {
                taxon,
                parent: None,
                children: Vec::new(),
                subtree_size: 1,
            });
            if by_id.insert(id, idx).is_some() {
                return Err(DomainError::DuplicateTaxon(id));
            }
            match parent_id {
                Some(parent) => links.push((idx, id, parent)),
                None => {
                    if let Some((existing, _)) = root {
                        return Err(DomainError::MultipleRoots(existing, id));
                    }
                    root = Some((id, idx));
                }
            }
        }

        let (_, root) = root.ok_or(DomainError::NoRoot)?;

        for (idx, child, parent) in links {
            let parent_idx = *by_id
                .get(&parent)
                .ok_or(DomainError::UnknownParent { child, parent })?;
            if let Some(node) = arena.get_mut(idx) {
                node.parent = Some(parent_idx);
            }
            if let Some(parent_node) = arena.get_mut(parent_idx) {
                parent_node.children.push(idx);
            }
        }

        let mut tree = Self { arena, by_id, root };
        tree.compute_subtree_sizes()?;
        debug!(
            "indexed {} taxa, depth {}",
            tree.len(),
            tree.depth()
        );
        Ok(tree)
    }

    /// Bottom-up size pass; nodes not reached from the root sit on a cycle.
    fn compute_subtree_sizes(&mut self) -> DomainResult<()> {
        let order: Vec<Index> = self.iter_postorder().map(|(idx, _)| idx).collect();

        if order.len() != self.arena.len() {
            let reached: std::collections::HashSet<Index> = order.iter().copied().collect();
            let stray = self
                .arena
                .iter()
                .find(|(idx, _)| !reached.contains(idx))
                .map(|(_, node)| node.taxon.id)
                .unwrap_or_default();
            return Err(DomainError::CycleDetected(stray));
        }

        for idx in order {
            let size = 1 + self.arena[idx]
                .children
                .iter()
                .map(|&child| self.arena[child].subtree_size)
                .sum::<usize>();
            let node = &mut self.arena[idx];
            node.subtree_size = size;
            node.taxon.descendant_count = size;
        }
        Ok(())
    }

    pub fn root(&self) -> Index {
        self.root
    }

    pub fn root_id(&self) -> TaxonId {
        self.arena[self.root].taxon.id
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Node at a valid index. Indices handed out by this tree are always valid.
    pub fn node(&self, idx: Index) -> &TreeNode {
        &self.arena[idx]
    }

    pub fn get(&self, id: TaxonId) -> Option<&TreeNode> {
        self.by_id.get(&id).map(|&idx| &self.arena[idx])
    }

    pub fn index_of(&self, id: TaxonId) -> Option<Index> {
        self.by_id.get(&id).copied()
    }

    pub fn subtree_size(&self, id: TaxonId) -> Option<usize> {
        self.get(id).map(|n| n.subtree_size)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Number of levels from the root to the deepest leaf.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root, 1usize)];
        while let Some((idx, level)) = stack.pop() {
            deepest = deepest.max(level);
            for &child in &self.arena[idx].children {
                stack.push((child, level + 1));
            }
        }
        deepest
    }
}

pub struct TreeIterator<'a> {
    tree: &'a TaxonTree,
    stack: Vec<Index>,
}

impl<'a> TreeIterator<'a> {
    fn new(tree: &'a TaxonTree) -> Self {
        Self {
            tree,
            stack: vec![tree.root],
        }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let current_idx = self.stack.pop()?;
        let node = self.tree.arena.get(current_idx)?;
        // Push children in reverse order for left-to-right traversal
        for &child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some((current_idx, node))
    }
}

pub struct PostOrderIterator<'a> {
    tree: &'a TaxonTree,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(tree: &'a TaxonTree) -> Self {
        Self {
            tree,
            stack: vec![(tree.root, false)],
        }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current_idx, visited)) = self.stack.pop() {
            if let Some(node) = self.tree.arena.get(current_idx) {
                if !visited {
                    self.stack.push((current_idx, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current_idx, node));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxon(id: TaxonId, parent: Option<TaxonId>) -> TaxonNode {
        let node = TaxonNode::new(id, format!("t{id}"), "no rank");
        match parent {
            Some(p) => node.with_parent(p),
            None => node,
        }
    }

    #[test]
    fn given_small_tree_when_indexing_then_sizes_are_inclusive() {
        let tree = TaxonTree::from_nodes(vec![
            taxon(1, None),
            taxon(2, Some(1)),
            taxon(3, Some(2)),
            taxon(4, Some(1)),
        ])
        .unwrap();

        assert_eq!(tree.subtree_size(1), Some(4));
        assert_eq!(tree.subtree_size(2), Some(2));
        assert_eq!(tree.subtree_size(4), Some(1));
        assert_eq!(tree.get(1).unwrap().taxon.descendant_count, 4);
        assert_eq!(tree.depth(), 3);
    }

    #[test]
    fn given_postorder_iteration_then_children_precede_parents() {
        let tree =
            TaxonTree::from_nodes(vec![taxon(1, None), taxon(2, Some(1)), taxon(3, Some(1))])
                .unwrap();

        let order: Vec<TaxonId> = tree.iter_postorder().map(|(_, n)| n.taxon.id).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }
}
