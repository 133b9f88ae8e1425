//! Sync pipeline service
//!
//! fetch -> flatten -> enrich -> partition, producing a [`SyncPlan`] that the
//! record writer persists. Plans can also be rebuilt from stored clades.

use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, instrument};

use crate::application::error_ext::JsonResultExt;
use crate::application::retry::{with_retry, RetryPolicy};
use crate::application::services::enrichment::{EnrichmentReport, EnrichmentService};
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{
    reassemble, Clade, CladePartitioner, CladeRecord, DomainError, PartitionStats, TaxonId,
    TaxonNode, TreeFlattener,
};
use crate::infrastructure::traits::TreeSource;

/// What to fetch from the tree source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub root: TaxonId,
    /// Depth limit passed to the service (None = whole subtree)
    pub height_limit: Option<u32>,
    /// Local depth cutoff applied while flattening
    pub max_depth: Option<usize>,
}

impl FetchRequest {
    pub fn new(root: TaxonId) -> Self {
        Self {
            root,
            height_limit: None,
            max_depth: None,
        }
    }
}

/// Partitioned tree ready to be written.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub root_id: TaxonId,
    pub stats: PartitionStats,
    pub clades: Vec<Clade>,
    pub enrichment: Option<EnrichmentReport>,
}

impl SyncPlan {
    pub fn from_clades(root_id: TaxonId, clades: Vec<Clade>) -> Self {
        Self {
            root_id,
            stats: PartitionStats::from_clades(&clades),
            clades,
            enrichment: None,
        }
    }

    /// Node count per rank, across all clades.
    pub fn rank_breakdown(&self) -> BTreeMap<String, usize> {
        let mut ranks = BTreeMap::new();
        for node in self.clades.iter().flat_map(|c| c.nodes.iter()) {
            *ranks.entry(node.rank.clone()).or_insert(0) += 1;
        }
        ranks
    }

    /// Encoded record size per clade root, largest first.
    pub fn record_sizes(&self, record_type: &str, source: &str, created_at: &str) -> Vec<(TaxonId, usize)> {
        let mut sizes: Vec<(TaxonId, usize)> = self
            .clades
            .par_iter()
            .map(|clade| {
                let record = CladeRecord::from_clade(clade, record_type, source, created_at);
                let size = serde_json::to_vec(&record).map_or(0, |bytes| bytes.len());
                (clade.root_id, size)
            })
            .collect();
        sizes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        sizes
    }

    /// Clades in storage order (by root id), for stable JSON dumps.
    pub fn sorted_clades(&self) -> Vec<&Clade> {
        let mut clades: Vec<&Clade> = self.clades.iter().collect();
        clades.sort_by_key(|c| c.root_id);
        clades
    }

    /// Pretty JSON with clades in storage order, independent of partition order.
    pub fn to_json(&self) -> ApplicationResult<String> {
        let dump = PlanDump {
            root_id: self.root_id,
            stats: &self.stats,
            clades: self.sorted_clades(),
        };
        serde_json::to_string_pretty(&dump).with_json_context("serialize plan")
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanDump<'a> {
    root_id: TaxonId,
    stats: &'a PartitionStats,
    clades: Vec<&'a Clade>,
}

pub struct SyncService {
    tree_source: Arc<dyn TreeSource>,
    enrichment: Option<EnrichmentService>,
    partitioner: CladePartitioner,
    retry: RetryPolicy,
}

impl SyncService {
    pub fn new(
        tree_source: Arc<dyn TreeSource>,
        enrichment: Option<EnrichmentService>,
        partitioner: CladePartitioner,
    ) -> Self {
        Self {
            tree_source,
            enrichment,
            partitioner,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn partitioner(&self) -> &CladePartitioner {
        &self.partitioner
    }

    /// Fetch and flatten. An empty answer or a root without id aborts.
    ///
    /// Throttled and transient fetch failures are retried under the
    /// service's [`RetryPolicy`].
    #[instrument(level = "debug", skip(self))]
    pub fn fetch(&self, request: &FetchRequest) -> ApplicationResult<Vec<TaxonNode>> {
        let label = format!("fetch subtree ott{}", request.root);
        let tree = with_retry(&self.retry, &label, || {
            self.tree_source.fetch_subtree(request.root, request.height_limit)
        })
        .map_err(|e| ApplicationError::remote(label, e))?
            .ok_or_else(|| ApplicationError::NoData {
                message: format!("tree source returned no tree for ott{}", request.root),
            })?;

        let nodes = TreeFlattener::with_max_depth(request.max_depth).flatten(&tree);
        if nodes.is_empty() {
            return Err(DomainError::NoRoot.into());
        }
        info!("fetched ott{}: {} named nodes", request.root, nodes.len());
        Ok(nodes)
    }

    /// Full pipeline up to, not including, the write.
    pub fn plan(&self, request: &FetchRequest) -> ApplicationResult<SyncPlan> {
        let nodes = self.fetch(request)?;
        self.plan_nodes(nodes)
    }

    /// Enrich (when configured) and partition an already flat node list.
    pub fn plan_nodes(&self, mut nodes: Vec<TaxonNode>) -> ApplicationResult<SyncPlan> {
        let enrichment = self
            .enrichment
            .as_ref()
            .map(|service| service.enrich(&mut nodes));

        let root_id = nodes
            .iter()
            .find(|n| n.is_root())
            .map(|n| n.id)
            .ok_or(DomainError::NoRoot)?;
        let clades = self.partitioner.partition_nodes(nodes)?;

        let mut plan = SyncPlan::from_clades(root_id, clades);
        plan.enrichment = enrichment;
        info!(
            "partitioned ott{root_id}: {} clades, {} nodes, largest {}",
            plan.stats.clade_count, plan.stats.node_count, plan.stats.largest
        );
        Ok(plan)
    }

    /// Rebuild a plan from stored clades: reassemble the tree under `root`,
    /// then enrich and partition again.
    pub fn replan(&self, stored: &BTreeMap<TaxonId, Clade>, root: TaxonId) -> ApplicationResult<SyncPlan> {
        let mut nodes = reassemble(stored, root)?;
        // a stored subtree keeps the link to its parent above the cut
        if let Some(top) = nodes.iter_mut().find(|n| n.id == root) {
            top.parent_id = None;
        }
        if nodes.is_empty() {
            return Err(ApplicationError::NoData {
                message: format!("no stored nodes under ott{root}"),
            });
        }
        info!("reassembled ott{root}: {} nodes from store", nodes.len());
        self.plan_nodes(nodes)
    }
}
