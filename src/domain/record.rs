//! Persisted clade record layout and tree reassembly from stored records.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::entities::{Clade, TaxonId, TaxonNode};
use crate::domain::error::{DomainError, DomainResult};

/// Record value as stored in the backend collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CladeRecord {
    #[serde(rename = "$type")]
    pub record_type: String,
    pub root_ott_id: TaxonId,
    pub nodes: Vec<TaxonNode>,
    #[serde(default)]
    pub refs: Vec<TaxonId>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub created_at: String,
}

impl CladeRecord {
    pub fn from_clade(clade: &Clade, record_type: &str, source: &str, created_at: &str) -> Self {
        Self {
            record_type: record_type.to_string(),
            root_ott_id: clade.root_id,
            nodes: clade.nodes.clone(),
            refs: clade.child_clade_roots.clone(),
            source: source.to_string(),
            created_at: created_at.to_string(),
        }
    }

    pub fn key(&self) -> String {
        self.root_ott_id.to_string()
    }

    /// Check a record read back from storage against its key.
    pub fn validate(&self, key: &str) -> DomainResult<()> {
        let invalid = |message: String| {
            Err(DomainError::InvalidRecord {
                key: key.to_string(),
                message,
            })
        };
        if self.key() != key {
            return invalid(format!("root {} does not match key", self.root_ott_id));
        }
        match self.nodes.first() {
            Some(first) if first.id == self.root_ott_id => {}
            Some(first) => return invalid(format!("first node {} is not the root", first.id)),
            None => return invalid("record has no nodes".to_string()),
        }
        if self.refs.contains(&self.root_ott_id) {
            return invalid("record references itself".to_string());
        }
        Ok(())
    }

    pub fn into_clade(self) -> Clade {
        Clade {
            root_id: self.root_ott_id,
            nodes: self.nodes,
            child_clade_roots: self.refs,
        }
    }
}

/// Roots of the clades reachable from `root` through `child_clade_roots`,
/// breadth-first. A missing clade or one reached twice is a data error.
pub fn reachable_clades(clades: &BTreeMap<TaxonId, Clade>, root: TaxonId) -> DomainResult<Vec<TaxonId>> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([root]);

    while let Some(clade_root) = queue.pop_front() {
        if !seen.insert(clade_root) {
            return Err(DomainError::DuplicateReference(clade_root));
        }
        let clade = clades
            .get(&clade_root)
            .ok_or(DomainError::MissingClade(clade_root))?;
        order.push(clade_root);
        queue.extend(clade.child_clade_roots.iter().copied());
    }

    Ok(order)
}

/// Rebuild the flat node list of the tree rooted at `root` by following
/// `child_clade_roots` from the root clade.
///
/// Clades not reachable from `root` are ignored, so a collection holding
/// several trees can be reassembled one tree at a time.
pub fn reassemble(clades: &BTreeMap<TaxonId, Clade>, root: TaxonId) -> DomainResult<Vec<TaxonNode>> {
    let nodes = reachable_clades(clades, root)?
        .into_iter()
        .filter_map(|id| clades.get(&id))
        .flat_map(|clade| clade.nodes.iter().cloned())
        .collect();
    Ok(nodes)
}
