//! Domain entities: core data structures

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable taxon identifier (Open Tree Taxonomy id).
pub type TaxonId = u64;

/// Rank assigned when the source does not report one.
pub const DEFAULT_RANK: &str = "no rank";

/// One named taxon in the flattened tree.
///
/// Wire names follow the persisted clade record layout (`ottId`, `parentOttId`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonNode {
    #[serde(rename = "ottId")]
    pub id: TaxonId,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_rank")]
    pub rank: String,
    /// None only for the tree root
    #[serde(rename = "parentOttId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaxonId>,
    /// Nearest named descendants, in source order
    #[serde(rename = "childOttIds", default, skip_serializing_if = "Vec::is_empty")]
    pub child_ids: Vec<TaxonId>,
    #[serde(rename = "numTips", default)]
    pub num_tips: u64,
    /// Size of the subtree rooted here, inclusive
    #[serde(rename = "descendantCount", default = "default_descendant_count")]
    pub descendant_count: usize,
    #[serde(rename = "commonName", default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
}

fn default_rank() -> String {
    DEFAULT_RANK.to_string()
}

fn default_descendant_count() -> usize {
    1
}

impl TaxonNode {
    pub fn new(id: TaxonId, name: impl Into<String>, rank: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            rank: rank.into(),
            parent_id: None,
            child_ids: Vec::new(),
            num_tips: 0,
            descendant_count: 1,
            common_name: None,
        }
    }

    pub fn with_parent(mut self, parent_id: TaxonId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Name for display: scientific name, falling back to `ott<id>`.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("ott{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for TaxonNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.common_name {
            Some(common) => write!(f, "{} ({}) [{}]", self.label(), common, self.rank),
            None => write!(f, "{} [{}]", self.label(), self.rank),
        }
    }
}

/// A connected subtree chosen as the unit of storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clade {
    /// Root taxon of this clade, also its storage key
    pub root_id: TaxonId,
    /// Member nodes, clade root first
    pub nodes: Vec<TaxonNode>,
    /// Roots of the clades split out directly below this one
    pub child_clade_roots: Vec<TaxonId>,
}

impl Clade {
    /// Storage key: decimal form of the root id.
    pub fn key(&self) -> String {
        self.root_id.to_string()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_node(&self) -> Option<&TaxonNode> {
        self.nodes.iter().find(|n| n.id == self.root_id)
    }

    pub fn contains(&self, id: TaxonId) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }
}

/// Taxon information attached to a node of the nested source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgusonTaxon {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ott_id: Option<TaxonId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,
}

/// One node of the nested tree returned by the tree source ("arguson" format).
///
/// Nodes without a taxon id (e.g. `mrcaott...` synthesis nodes) are anonymous.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgusonNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon: Option<ArgusonTaxon>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_tips: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ArgusonNode>,
}

impl ArgusonNode {
    pub fn ott_id(&self) -> Option<TaxonId> {
        self.taxon.as_ref().and_then(|t| t.ott_id)
    }
}
