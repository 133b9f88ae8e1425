//! Common-name enrichment service
//!
//! Two best-effort passes against a [`NameSource`]: the vernacular-name
//! property first, then English labels for the ids still unnamed. A failed
//! batch costs only its own names.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::application::retry::pause;
use crate::config::EnrichmentSettings;
use crate::domain::{accept_label, NamePass, TaxonId, TaxonNode};
use crate::infrastructure::traits::NameSource;

#[derive(Debug, Clone)]
pub struct EnrichmentOptions {
    pub batch_size: usize,
    pub delay: Duration,
    /// Replace common names that are already set
    pub force: bool,
}

impl EnrichmentOptions {
    pub fn from_settings(settings: &EnrichmentSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            delay: Duration::from_millis(settings.delay_ms),
            force: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub looked_up: usize,
    pub from_vernacular: usize,
    pub from_label: usize,
    /// Nodes whose common name differs from before the run
    pub changed: usize,
    pub failed_batches: usize,
}

impl EnrichmentReport {
    pub fn named(&self) -> usize {
        self.from_vernacular + self.from_label
    }
}

pub struct EnrichmentService {
    names: Arc<dyn NameSource>,
    options: EnrichmentOptions,
}

impl EnrichmentService {
    pub fn new(names: Arc<dyn NameSource>, options: EnrichmentOptions) -> Self {
        Self { names, options }
    }

    /// Attach common names to `nodes` in place.
    #[instrument(level = "debug", skip(self, nodes), fields(nodes = nodes.len()))]
    pub fn enrich(&self, nodes: &mut [TaxonNode]) -> EnrichmentReport {
        let force = self.options.force;
        let ids: Vec<TaxonId> = nodes
            .iter()
            .filter(|n| force || n.common_name.is_none())
            .map(|n| n.id)
            .collect();
        let mut report = EnrichmentReport {
            looked_up: ids.len(),
            ..Default::default()
        };
        if ids.is_empty() {
            return report;
        }
        let scientific: HashMap<TaxonId, &str> =
            nodes.iter().map(|n| (n.id, n.name.as_str())).collect();

        let mut found: HashMap<TaxonId, String> = HashMap::new();
        self.run_pass(NamePass::Vernacular, &ids, &mut report, |id, name| {
            // shortest name wins
            let shorter = found
                .get(&id)
                .map_or(true, |current| name.chars().count() < current.chars().count());
            if shorter {
                found.insert(id, name);
            }
        });
        report.from_vernacular = found.len();

        let remaining: Vec<TaxonId> = ids.iter().copied().filter(|id| !found.contains_key(id)).collect();
        if !remaining.is_empty() {
            pause(self.options.delay);
            let mut labels: HashMap<TaxonId, String> = HashMap::new();
            self.run_pass(NamePass::Label, &remaining, &mut report, |id, name| {
                if labels.contains_key(&id) {
                    return;
                }
                if accept_label(&name, scientific.get(&id).copied()) {
                    labels.insert(id, name);
                }
            });
            report.from_label = labels.len();
            found.extend(labels);
        }

        for node in nodes.iter_mut() {
            if let Some(name) = found.remove(&node.id) {
                if node.common_name.as_deref() != Some(name.as_str()) {
                    node.common_name = Some(name);
                    report.changed += 1;
                }
            }
        }
        info!(
            "enrichment: {} of {} named ({} vernacular, {} label), {} changed, {} failed batches",
            report.named(),
            report.looked_up,
            report.from_vernacular,
            report.from_label,
            report.changed,
            report.failed_batches
        );
        report
    }

    fn run_pass(
        &self,
        pass: NamePass,
        ids: &[TaxonId],
        report: &mut EnrichmentReport,
        mut accept: impl FnMut(TaxonId, String),
    ) {
        let batches: Vec<&[TaxonId]> = ids.chunks(self.options.batch_size.max(1)).collect();
        debug!("{pass} pass: {} ids in {} batches", ids.len(), batches.len());
        for (i, batch) in batches.iter().enumerate() {
            if i > 0 {
                pause(self.options.delay);
            }
            match self.names.lookup(pass, batch) {
                Ok(hits) => {
                    for hit in hits {
                        accept(hit.id, hit.name);
                    }
                }
                Err(e) => {
                    warn!("{pass} batch {}/{} failed: {e}", i + 1, batches.len());
                    report.failed_batches += 1;
                }
            }
        }
    }
}
