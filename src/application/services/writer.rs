//! Record writer service
//!
//! Persists clades as keyed records in a rate-limited store:
//!
//! ```text
//! list existing keys ──► encode + size check ──► overwrite in place (Replace)
//!                                                  │
//!            individual creates ◄── on failure ── batched creates
//! ```
//!
//! Every call runs through the retry loop. A record whose calls are
//! exhausted becomes a per-record failure; the run continues. Replacing
//! never removes a stored record first, so a failed overwrite leaves the
//! previous version in place.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::application::retry::{pause, with_retry, RetryPolicy};
use crate::application::{ApplicationError, ApplicationResult};
use crate::config::StoreSettings;
use crate::domain::{Clade, CladeRecord, DomainError, TaxonId};
use crate::infrastructure::traits::{RecordStore, StoredRecord};

/// `createdAt` stamp for records written now, second precision UTC.
pub fn timestamp_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// What to do with clades whose key already exists in the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    SkipExisting,
    /// Overwrite the stored record in place
    Replace,
}

/// Tunables for one writer.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub collection: String,
    pub source_tag: String,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub rate_delay: Duration,
    pub max_record_bytes: usize,
    /// One record per call, never batched
    pub no_batch: bool,
    pub mode: WriteMode,
    pub retry: RetryPolicy,
}

impl WriterOptions {
    pub fn from_settings(store: &StoreSettings) -> Self {
        Self {
            collection: store.collection.clone(),
            source_tag: store.source_tag.clone(),
            batch_size: store.batch_size,
            batch_delay: Duration::from_millis(store.batch_delay_ms),
            rate_delay: Duration::from_millis(store.rate_delay_ms),
            max_record_bytes: store.max_record_bytes,
            no_batch: false,
            mode: WriteMode::default(),
            retry: store.retry.clone(),
        }
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_no_batch(mut self, no_batch: bool) -> Self {
        self.no_batch = no_batch;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub key: String,
    pub reason: String,
}

/// Outcome of one write run, by record key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Newly created keys
    pub written: Vec<String>,
    /// Existing keys overwritten in place
    pub replaced: Vec<String>,
    pub skipped: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<RecordFailure>,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, key: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("record {key} failed: {reason}");
        self.failed.push(RecordFailure {
            key: key.to_string(),
            reason,
        });
    }
}

/// Writes clades to a [`RecordStore`].
pub struct RecordWriter {
    store: Arc<dyn RecordStore>,
    options: WriterOptions,
}

impl RecordWriter {
    pub fn new(store: Arc<dyn RecordStore>, options: WriterOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// All records of the collection, following the listing cursor to the end.
    pub fn list_records(&self) -> ApplicationResult<Vec<StoredRecord>> {
        let collection = &self.options.collection;
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = with_retry(&self.options.retry, "list records", || {
                self.store.list_page(collection, cursor.as_deref())
            })
            .map_err(|e| ApplicationError::remote(format!("list {collection}"), e))?;
            records.extend(page.records);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!("listed {} records in {collection}", records.len());
        Ok(records)
    }

    pub fn list_existing_keys(&self) -> ApplicationResult<BTreeSet<String>> {
        Ok(self.list_records()?.into_iter().map(|r| r.key).collect())
    }

    /// Stored clades keyed by root id. A record that does not decode or does
    /// not match its key is a data error.
    pub fn fetch_clades(&self) -> ApplicationResult<BTreeMap<TaxonId, Clade>> {
        let mut clades = BTreeMap::new();
        for stored in self.list_records()? {
            let record: CladeRecord =
                serde_json::from_value(stored.value).map_err(|e| DomainError::InvalidRecord {
                    key: stored.key.clone(),
                    message: e.to_string(),
                })?;
            record.validate(&stored.key)?;
            clades.insert(record.root_ott_id, record.into_clade());
        }
        Ok(clades)
    }

    /// Write `clades`, stamping each record with `created_at`.
    ///
    /// A listing failure aborts before anything is written.
    #[instrument(level = "debug", skip(self, clades), fields(clades = clades.len()))]
    pub fn write(&self, clades: &[Clade], created_at: &str) -> ApplicationResult<WriteReport> {
        let existing = self.list_existing_keys()?;
        let mut report = WriteReport::default();

        let mut pending = Vec::with_capacity(clades.len());
        let mut to_replace = Vec::new();
        for clade in clades {
            let key = clade.key();
            let exists = existing.contains(&key);
            if exists && self.options.mode == WriteMode::SkipExisting {
                report.skipped.push(key);
                continue;
            }
            let value = match self.encode(clade, created_at) {
                Ok(value) => value,
                Err(reason) => {
                    report.fail(&key, reason);
                    continue;
                }
            };
            if exists {
                to_replace.push((key, value));
            } else {
                pending.push((key, value));
            }
        }
        info!(
            "{} to create, {} existing skipped, {} to replace",
            pending.len(),
            report.skipped.len(),
            to_replace.len()
        );

        self.put_each(&to_replace, &mut report);
        if !to_replace.is_empty() && !pending.is_empty() {
            pause(self.options.rate_delay);
        }

        if self.options.no_batch || self.options.batch_size <= 1 {
            self.create_each(&pending, &mut report);
        } else {
            let batches: Vec<_> = pending.chunks(self.options.batch_size).collect();
            for (i, batch) in batches.iter().enumerate() {
                if i > 0 {
                    pause(self.options.batch_delay);
                }
                self.create_batch(batch, &mut report);
            }
        }

        info!(
            "written {}, replaced {}, skipped {}, failed {}",
            report.written.len(),
            report.replaced.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Delete the records under `keys`, one call each. The caller decides
    /// which keys are safe to remove.
    #[instrument(level = "debug", skip(self, keys), fields(keys = keys.len()))]
    pub fn prune(&self, keys: &[String]) -> WriteReport {
        let mut report = WriteReport::default();
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                pause(self.options.rate_delay);
            }
            let label = format!("delete {key}");
            match with_retry(&self.options.retry, &label, || {
                self.store.delete(&self.options.collection, key)
            }) {
                Ok(()) => report.deleted.push(key.clone()),
                Err(e) => report.fail(key, format!("delete: {e}")),
            }
        }
        info!("deleted {}, failed {}", report.deleted.len(), report.failed.len());
        report
    }

    fn encode(&self, clade: &Clade, created_at: &str) -> Result<serde_json::Value, String> {
        let record = CladeRecord::from_clade(
            clade,
            &self.options.collection,
            &self.options.source_tag,
            created_at,
        );
        let bytes = serde_json::to_vec(&record).map_err(|e| format!("encode: {e}"))?;
        if bytes.len() > self.options.max_record_bytes {
            return Err(format!(
                "record is {} bytes, limit is {}",
                bytes.len(),
                self.options.max_record_bytes
            ));
        }
        serde_json::to_value(&record).map_err(|e| format!("encode: {e}"))
    }

    fn put_each(&self, records: &[(String, serde_json::Value)], report: &mut WriteReport) {
        for (i, (key, value)) in records.iter().enumerate() {
            if i > 0 {
                pause(self.options.rate_delay);
            }
            let label = format!("put {key}");
            match with_retry(&self.options.retry, &label, || {
                self.store.put(&self.options.collection, key, value)
            }) {
                Ok(()) => report.replaced.push(key.clone()),
                Err(e) => report.fail(key, format!("put: {e}")),
            }
        }
    }

    fn create_batch(&self, batch: &[(String, serde_json::Value)], report: &mut WriteReport) {
        let label = format!("batch of {}", batch.len());
        match with_retry(&self.options.retry, &label, || {
            self.store.apply_creates(&self.options.collection, batch)
        }) {
            Ok(()) => {
                debug!("{label} written");
                report.written.extend(batch.iter().map(|(key, _)| key.clone()));
            }
            Err(e) => {
                warn!("{label} failed ({e}), falling back to individual writes");
                pause(self.options.rate_delay);
                self.create_each(batch, report);
            }
        }
    }

    fn create_each(&self, records: &[(String, serde_json::Value)], report: &mut WriteReport) {
        for (i, (key, value)) in records.iter().enumerate() {
            if i > 0 {
                pause(self.options.rate_delay);
            }
            let label = format!("create {key}");
            match with_retry(&self.options.retry, &label, || {
                self.store.create(&self.options.collection, key, value)
            }) {
                Ok(()) => report.written.push(key.clone()),
                Err(e) => report.fail(key, e.to_string()),
            }
        }
    }
}
