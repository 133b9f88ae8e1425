//! Adaptive clade partitioning.
//!
//! Cuts a validated [`TaxonTree`] into connected subtrees ("clades") packed
//! toward a target size. Children are visited smallest subtree first so that
//! as many whole small subtrees as possible are inlined before a large one
//! forces a split.
//!
//! Placement rules for a child of subtree size `s` while the current clade
//! holds `len` nodes:
//!
//! ```text
//! len >= hard_max          -> split (leaves are still inlined)
//! s <= target - len        -> inline, continue into its children
//! s <  floor               -> inline, continue into its children
//! otherwise                -> split
//! ```
//!
//! Non-leaf nodes are only ever added while `len < hard_max`, so every node at
//! position `hard_max` or later in a clade is a leaf inlined at the ceiling.

use std::fmt;

use generational_arena::Index;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::arena::TaxonTree;
use crate::domain::entities::{Clade, TaxonNode};
use crate::domain::error::{DomainError, DomainResult};

/// Size thresholds in node counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Soft size to pack each clade toward
    pub target: usize,
    /// Smallest subtree worth splitting into its own clade
    pub floor: usize,
    /// Clade size past which non-leaf children are always split out
    pub hard_max: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            target: 250,
            floor: 20,
            hard_max: 500,
        }
    }
}

impl Thresholds {
    pub fn new(target: usize, floor: usize, hard_max: usize) -> DomainResult<Self> {
        let thresholds = Self {
            target,
            floor,
            hard_max,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> DomainResult<()> {
        let invalid = |message: String| Err(DomainError::InvalidThresholds { message });
        if self.target == 0 || self.floor == 0 || self.hard_max == 0 {
            return invalid(format!("all thresholds must be at least 1 ({self})"));
        }
        if self.floor > self.target {
            return invalid(format!(
                "floor {} exceeds target {}",
                self.floor, self.target
            ));
        }
        if self.hard_max < self.target {
            return invalid(format!(
                "hard_max {} is below target {}",
                self.hard_max, self.target
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Thresholds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "target={} floor={} hard_max={}",
            self.target, self.floor, self.hard_max
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Inline,
    Split,
}

/// One level of the explicit DFS used while filling a clade.
struct Frame {
    children: Vec<Index>,
    next: usize,
}

/// Partitions taxonomies into clades. Pure, no I/O.
#[derive(Debug, Clone)]
pub struct CladePartitioner {
    thresholds: Thresholds,
}

impl CladePartitioner {
    /// Fails fast on inconsistent thresholds.
    pub fn new(thresholds: Thresholds) -> DomainResult<Self> {
        thresholds.validate()?;
        Ok(Self { thresholds })
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Index a flat node list and partition it.
    pub fn partition_nodes(&self, nodes: Vec<TaxonNode>) -> DomainResult<Vec<Clade>> {
        let tree = TaxonTree::from_nodes(nodes)?;
        Ok(self.partition(&tree))
    }

    /// Partition an indexed tree. Output order is not significant; only
    /// `child_clade_roots` links the clades together.
    #[instrument(level = "debug", skip(self, tree), fields(nodes = tree.len(), thresholds = %self.thresholds))]
    pub fn partition(&self, tree: &TaxonTree) -> Vec<Clade> {
        let mut clades = Vec::new();
        let mut pending = vec![tree.root()];

        while let Some(root) = pending.pop() {
            let clade = self.build_clade(tree, root);
            for &child_root in clade.child_clade_roots.iter().rev() {
                if let Some(idx) = tree.index_of(child_root) {
                    pending.push(idx);
                }
            }
            debug!(
                "clade {}: {} nodes, {} child clades",
                clade.root_id,
                clade.len(),
                clade.child_clade_roots.len()
            );
            clades.push(clade);
        }

        clades
    }

    fn build_clade(&self, tree: &TaxonTree, root: Index) -> Clade {
        let root_node = tree.node(root);
        let mut nodes = vec![root_node.taxon.clone()];
        let mut child_clade_roots = Vec::new();
        let mut stack = vec![Frame {
            children: sorted_children(tree, root),
            next: 0,
        }];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            if frame.next == frame.children.len() {
                stack.pop();
                continue;
            }
            let child = frame.children[frame.next];
            frame.next += 1;

            let child_node = tree.node(child);
            match self.place(nodes.len(), child_node.subtree_size) {
                Placement::Inline => {
                    nodes.push(child_node.taxon.clone());
                    if !child_node.children.is_empty() {
                        stack.push(Frame {
                            children: sorted_children(tree, child),
                            next: 0,
                        });
                    }
                }
                Placement::Split => child_clade_roots.push(child_node.taxon.id),
            }
        }

        Clade {
            root_id: root_node.taxon.id,
            nodes,
            child_clade_roots,
        }
    }

    fn place(&self, len: usize, size: usize) -> Placement {
        let Thresholds {
            target,
            floor,
            hard_max,
        } = self.thresholds;

        if len >= hard_max {
            if size == 1 {
                Placement::Inline
            } else {
                Placement::Split
            }
        } else if size <= target.saturating_sub(len) || size < floor {
            Placement::Inline
        } else {
            Placement::Split
        }
    }
}

/// Children ordered by ascending subtree size, ties by ascending taxon id.
fn sorted_children(tree: &TaxonTree, idx: Index) -> Vec<Index> {
    let mut children = tree.node(idx).children.clone();
    children.sort_by_key(|&child| {
        let node = tree.node(child);
        (node.subtree_size, node.taxon.id)
    });
    children
}

/// Summary figures for a partition result.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PartitionStats {
    pub clade_count: usize,
    pub node_count: usize,
    pub largest: usize,
    pub smallest: usize,
    pub mean: f64,
}

impl PartitionStats {
    pub fn from_clades(clades: &[Clade]) -> Self {
        if clades.is_empty() {
            return Self::default();
        }
        let node_count: usize = clades.iter().map(Clade::len).sum();
        Self {
            clade_count: clades.len(),
            node_count,
            largest: clades.iter().map(Clade::len).max().unwrap_or(0),
            smallest: clades.iter().map(Clade::len).min().unwrap_or(0),
            mean: node_count as f64 / clades.len() as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partitioner(target: usize, floor: usize, hard_max: usize) -> CladePartitioner {
        CladePartitioner::new(Thresholds::new(target, floor, hard_max).unwrap()).unwrap()
    }

    #[test]
    fn given_room_under_target_when_placing_then_inlines() {
        let p = partitioner(5, 2, 8);
        assert_eq!(p.place(1, 4), Placement::Inline);
        assert_eq!(p.place(2, 4), Placement::Split);
    }

    #[test]
    fn given_subtree_below_floor_when_overflowing_then_inlines() {
        let p = partitioner(5, 3, 8);
        assert_eq!(p.place(5, 2), Placement::Inline);
        assert_eq!(p.place(7, 2), Placement::Inline);
        assert_eq!(p.place(5, 3), Placement::Split);
    }

    #[test]
    fn given_clade_at_ceiling_when_placing_then_only_leaves_inline() {
        let p = partitioner(5, 3, 8);
        assert_eq!(p.place(8, 1), Placement::Inline);
        assert_eq!(p.place(8, 2), Placement::Split);
        assert_eq!(p.place(12, 1), Placement::Inline);
    }

    #[test]
    fn given_no_clades_when_computing_stats_then_all_zero() {
        assert_eq!(PartitionStats::from_clades(&[]), PartitionStats::default());
    }
}
