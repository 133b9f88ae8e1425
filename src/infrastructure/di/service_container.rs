//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use tracing::debug;

use crate::application::ApplicationError;
use crate::application::services::{
    EnrichmentOptions, EnrichmentService, RecordWriter, SyncService, WriteMode, WriterOptions,
};
use crate::config::Settings;
use crate::domain::{CladePartitioner, Thresholds};
use crate::infrastructure::atproto::AtprotoStore;
use crate::infrastructure::error::InfraResult;
use crate::infrastructure::otol::OtolTreeSource;
use crate::infrastructure::traits::{NameSource, RecordStore, TreeSource};
use crate::infrastructure::wikidata::WikidataNameSource;

/// Container holding the remote collaborators and building services on demand.
///
/// The record store needs credentials, so it is only connected when a
/// command asks for it.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    pub tree_source: Arc<dyn TreeSource>,

    pub name_source: Arc<dyn NameSource>,

    /// Pre-connected store (tests); None means authenticate per account
    store: Option<Arc<dyn RecordStore>>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> InfraResult<Self> {
        let tree_source = Arc::new(OtolTreeSource::new(&settings.tree_source)?);
        let name_source = Arc::new(WikidataNameSource::new(&settings.enrichment)?);
        Ok(Self::with_deps(settings, tree_source, name_source, None))
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        tree_source: Arc<dyn TreeSource>,
        name_source: Arc<dyn NameSource>,
        store: Option<Arc<dyn RecordStore>>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            tree_source,
            name_source,
            store,
        }
    }

    /// Record store for `account`, authenticating on first use.
    pub fn store(&self, account: &str) -> InfraResult<Arc<dyn RecordStore>> {
        if let Some(store) = &self.store {
            return Ok(Arc::clone(store));
        }
        let credentials = self.settings.credentials(account)?;
        debug!("connecting store for account '{account}'");
        let store = AtprotoStore::authenticate(
            &self.settings.store,
            &credentials.identity,
            &credentials.secret,
        )?;
        Ok(Arc::new(store))
    }

    pub fn enrichment_service(&self, force: bool) -> EnrichmentService {
        EnrichmentService::new(
            Arc::clone(&self.name_source),
            EnrichmentOptions::from_settings(&self.settings.enrichment).with_force(force),
        )
    }

    /// Enrichment unless disabled in config or by the caller.
    pub fn enrichment_if(&self, wanted: bool, force: bool) -> Option<EnrichmentService> {
        (wanted && self.settings.enrichment.enabled).then(|| self.enrichment_service(force))
    }

    pub fn sync_service(
        &self,
        thresholds: Thresholds,
        enrichment: Option<EnrichmentService>,
    ) -> InfraResult<SyncService> {
        let partitioner = CladePartitioner::new(thresholds).map_err(ApplicationError::from)?;
        Ok(SyncService::new(
            Arc::clone(&self.tree_source),
            enrichment,
            partitioner,
        )
        .with_retry_policy(self.settings.tree_source.retry.clone()))
    }

    pub fn writer(&self, store: Arc<dyn RecordStore>, mode: WriteMode, no_batch: bool) -> RecordWriter {
        RecordWriter::new(
            store,
            WriterOptions::from_settings(&self.settings.store)
                .with_mode(mode)
                .with_no_batch(no_batch),
        )
    }
}
