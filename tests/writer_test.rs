//! Tests for RecordWriter
//!
//! Uses a scripted in-memory store: each operation pops queued failures
//! before it succeeds, so retry and fallback paths run deterministically.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use cladesync::application::services::{RecordWriter, WriteMode, WriterOptions};
use cladesync::application::{ApplicationError, RetryPolicy};
use cladesync::domain::{Clade, CladeRecord, DomainError, TaxonId};
use cladesync::infrastructure::traits::{RecordPage, RecordStore, StoredRecord};
use cladesync::infrastructure::{RemoteError, RemoteResult};
use cladesync::util::testing::{init_test_setup, taxon};

const COLLECTION: &str = "test.clade";
const CREATED_AT: &str = "2024-01-01T00:00:00Z";

// ============================================================
// Mock store
// ============================================================

#[derive(Default)]
struct StoreState {
    records: BTreeMap<String, Value>,
    page_size: usize,
    list_failures: VecDeque<RemoteError>,
    create_failures: VecDeque<RemoteError>,
    batch_failures: VecDeque<RemoteError>,
    put_failures: VecDeque<RemoteError>,
    /// Keys whose delete always fails
    undeletable: HashSet<String>,
    calls: Vec<String>,
}

struct MockStore {
    state: Mutex<StoreState>,
}

impl MockStore {
    fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                page_size: 100,
                ..Default::default()
            }),
        }
    }

    fn with_records(keys: &[TaxonId]) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap();
            for key in keys {
                state
                    .records
                    .insert(key.to_string(), json!({ "stale": true }));
            }
        }
        store
    }

    fn state(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    fn keys(&self) -> Vec<String> {
        self.state().records.keys().cloned().collect()
    }
}

impl RecordStore for MockStore {
    fn list_page(&self, _collection: &str, cursor: Option<&str>) -> RemoteResult<RecordPage> {
        let mut state = self.state();
        state.calls.push(format!("list:{}", cursor.unwrap_or("-")));
        if let Some(e) = state.list_failures.pop_front() {
            return Err(e);
        }
        let start: usize = cursor.map_or(0, |c| c.parse().unwrap());
        let records: Vec<StoredRecord> = state
            .records
            .iter()
            .skip(start)
            .take(state.page_size)
            .map(|(key, value)| StoredRecord {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        let end = start + records.len();
        let cursor = (end < state.records.len()).then(|| end.to_string());
        Ok(RecordPage { records, cursor })
    }

    fn create(&self, _collection: &str, key: &str, value: &Value) -> RemoteResult<()> {
        let mut state = self.state();
        state.calls.push(format!("create:{key}"));
        if let Some(e) = state.create_failures.pop_front() {
            return Err(e);
        }
        if state.records.contains_key(key) {
            return Err(RemoteError::Rejected {
                status: 400,
                message: "record already exists".to_string(),
            });
        }
        state.records.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn put(&self, _collection: &str, key: &str, value: &Value) -> RemoteResult<()> {
        let mut state = self.state();
        state.calls.push(format!("put:{key}"));
        if let Some(e) = state.put_failures.pop_front() {
            return Err(e);
        }
        state.records.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn apply_creates(&self, _collection: &str, records: &[(String, Value)]) -> RemoteResult<()> {
        let mut state = self.state();
        state.calls.push(format!("batch:{}", records.len()));
        if let Some(e) = state.batch_failures.pop_front() {
            return Err(e);
        }
        for (key, value) in records {
            state.records.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn delete(&self, _collection: &str, key: &str) -> RemoteResult<()> {
        let mut state = self.state();
        state.calls.push(format!("delete:{key}"));
        if state.undeletable.contains(key) {
            return Err(RemoteError::Rejected {
                status: 403,
                message: "not allowed".to_string(),
            });
        }
        state.records.remove(key);
        Ok(())
    }
}

// ============================================================
// Helpers
// ============================================================

fn options(batch_size: usize) -> WriterOptions {
    WriterOptions {
        collection: COLLECTION.to_string(),
        source_tag: "test-source".to_string(),
        batch_size,
        batch_delay: Duration::ZERO,
        rate_delay: Duration::ZERO,
        max_record_bytes: 100_000,
        no_batch: false,
        mode: WriteMode::SkipExisting,
        retry: RetryPolicy::immediate(),
    }
}

fn writer(store: &Arc<MockStore>, options: WriterOptions) -> RecordWriter {
    let store: Arc<dyn RecordStore> = store.clone();
    RecordWriter::new(store, options)
}

/// Single-node clades, one per root id.
fn clades(roots: &[TaxonId]) -> Vec<Clade> {
    roots
        .iter()
        .map(|&root| Clade {
            root_id: root,
            nodes: vec![taxon(root, None)],
            child_clade_roots: Vec::new(),
        })
        .collect()
}

fn throttled() -> RemoteError {
    RemoteError::Throttled { retry_after: None }
}

fn rejected() -> RemoteError {
    RemoteError::Rejected {
        status: 400,
        message: "batch refused".to_string(),
    }
}

// ============================================================
// Batching and fallback
// ============================================================

#[test]
fn given_new_clades_when_writing_then_batches_by_size() {
    init_test_setup();
    let store = Arc::new(MockStore::new());

    let report = writer(&store, options(2))
        .write(&clades(&[1, 2, 3]), CREATED_AT)
        .unwrap();

    assert_eq!(report.written, vec!["1", "2", "3"]);
    assert!(report.is_complete());
    assert_eq!(store.calls(), vec!["list:-", "batch:2", "batch:1"]);
}

#[test]
fn given_throttled_batch_when_writing_then_retries_same_batch() {
    let store = Arc::new(MockStore::new());
    store.state().batch_failures.push_back(throttled());

    let report = writer(&store, options(2))
        .write(&clades(&[1, 2, 3]), CREATED_AT)
        .unwrap();

    assert_eq!(report.written, vec!["1", "2", "3"]);
    assert_eq!(
        store.calls(),
        vec!["list:-", "batch:2", "batch:2", "batch:1"]
    );
}

#[test]
fn given_rejected_batch_when_writing_then_falls_back_to_individual_creates() {
    let store = Arc::new(MockStore::new());
    store.state().batch_failures.push_back(rejected());

    let report = writer(&store, options(2))
        .write(&clades(&[1, 2, 3]), CREATED_AT)
        .unwrap();

    assert_eq!(report.written, vec!["1", "2", "3"]);
    assert!(report.is_complete());
    assert_eq!(
        store.calls(),
        vec!["list:-", "batch:2", "create:1", "create:2", "batch:1"]
    );
    assert_eq!(store.keys(), vec!["1", "2", "3"]);
}

#[test]
fn given_throttling_never_ends_when_writing_then_record_fails_and_run_continues() {
    let store = Arc::new(MockStore::new());
    let attempts = RetryPolicy::immediate().max_attempts;
    for _ in 0..attempts {
        store.state().create_failures.push_back(throttled());
    }

    let report = writer(&store, options(1))
        .write(&clades(&[1, 2]), CREATED_AT)
        .unwrap();

    assert_eq!(report.written, vec!["2"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].key, "1");
    assert!(!report.is_complete());
    let creates_of_1 = store.calls().iter().filter(|c| *c == "create:1").count();
    assert_eq!(creates_of_1, attempts);
}

#[test]
fn given_no_batch_when_writing_then_never_calls_batch() {
    let store = Arc::new(MockStore::new());

    let report = writer(&store, options(10).with_no_batch(true))
        .write(&clades(&[1, 2, 3]), CREATED_AT)
        .unwrap();

    assert_eq!(report.written.len(), 3);
    assert!(store.calls().iter().all(|c| !c.starts_with("batch")));
}

// ============================================================
// Existing records
// ============================================================

#[test]
fn given_existing_keys_when_skipping_then_only_new_clades_are_written() {
    let store = Arc::new(MockStore::with_records(&[2]));

    let report = writer(&store, options(10))
        .write(&clades(&[1, 2, 3]), CREATED_AT)
        .unwrap();

    assert_eq!(report.written, vec!["1", "3"]);
    assert_eq!(report.skipped, vec!["2"]);
    assert!(report.deleted.is_empty());
    // the stored record is untouched
    assert_eq!(store.state().records["2"], json!({ "stale": true }));
}

#[test]
fn given_replace_mode_when_writing_then_overwrites_only_planned_keys() {
    // 9 belongs to some other tree in the same collection
    let store = Arc::new(MockStore::with_records(&[2, 9]));

    let report = writer(&store, options(10).with_mode(WriteMode::Replace))
        .write(&clades(&[1, 2]), CREATED_AT)
        .unwrap();

    assert_eq!(report.replaced, vec!["2"]);
    assert_eq!(report.written, vec!["1"]);
    assert!(report.deleted.is_empty());
    assert_eq!(store.calls(), vec!["list:-", "put:2", "batch:1"]);
    assert_eq!(store.keys(), vec!["1", "2", "9"]);
    assert_eq!(store.state().records["2"]["rootOttId"], json!(2));
    assert_eq!(store.state().records["9"], json!({ "stale": true }));
}

#[test]
fn given_throttled_overwrite_when_replacing_then_retries_in_place() {
    let store = Arc::new(MockStore::with_records(&[2]));
    store.state().put_failures.push_back(throttled());

    let report = writer(&store, options(10).with_mode(WriteMode::Replace))
        .write(&clades(&[2]), CREATED_AT)
        .unwrap();

    assert_eq!(report.replaced, vec!["2"]);
    assert!(report.is_complete());
    assert_eq!(store.calls(), vec!["list:-", "put:2", "put:2"]);
}

#[test]
fn given_overwrite_keeps_failing_when_replacing_then_old_record_survives() {
    let store = Arc::new(MockStore::with_records(&[2]));
    for _ in 0..RetryPolicy::immediate().max_attempts {
        store.state().put_failures.push_back(throttled());
    }

    let report = writer(&store, options(10).with_mode(WriteMode::Replace))
        .write(&clades(&[1, 2]), CREATED_AT)
        .unwrap();

    assert_eq!(report.written, vec!["1"]);
    assert!(report.replaced.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].key, "2");
    assert!(report.failed[0].reason.starts_with("put"));
    // nothing was removed, so the previous record is still there
    assert!(store.calls().iter().all(|c| !c.starts_with("delete")));
    assert_eq!(store.state().records["2"], json!({ "stale": true }));
}

#[test]
fn given_stale_keys_when_pruning_then_deletes_each_and_reports_refusals() {
    let store = Arc::new(MockStore::with_records(&[1, 2, 3]));
    store.state().undeletable.insert("3".to_string());

    let report = writer(&store, options(10)).prune(&["2".to_string(), "3".to_string()]);

    assert_eq!(report.deleted, vec!["2"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].key, "3");
    assert!(report.failed[0].reason.starts_with("delete"));
    assert_eq!(store.keys(), vec!["1", "3"]);
}

#[test]
fn given_many_records_when_listing_then_follows_cursor_to_end() {
    let store = Arc::new(MockStore::with_records(&[1, 2, 3, 4, 5]));
    store.state().page_size = 2;

    let keys = writer(&store, options(10)).list_existing_keys().unwrap();

    assert_eq!(keys.len(), 5);
    assert_eq!(store.calls(), vec!["list:-", "list:2", "list:4"]);
}

#[test]
fn given_listing_fails_when_writing_then_aborts_before_writing() {
    let store = Arc::new(MockStore::new());
    store.state().list_failures.push_back(rejected());

    let result = writer(&store, options(10)).write(&clades(&[1]), CREATED_AT);

    assert!(matches!(result, Err(ApplicationError::Remote { .. })));
    assert_eq!(store.calls(), vec!["list:-"]);
    assert!(store.keys().is_empty());
}

// ============================================================
// Encoding
// ============================================================

#[test]
fn given_oversized_clade_when_writing_then_fails_that_record_only() {
    let store = Arc::new(MockStore::new());
    let mut big = clades(&[1]);
    big[0].nodes[0].name = "x".repeat(500);
    let mut input = clades(&[2]);
    input.append(&mut big);
    let mut opts = options(10);
    opts.max_record_bytes = 400;

    let report = writer(&store, opts).write(&input, CREATED_AT).unwrap();

    assert_eq!(report.written, vec!["2"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].key, "1");
    assert!(report.failed[0].reason.contains("limit is 400"));
}

#[test]
fn given_written_clade_when_reading_back_then_record_layout_matches() {
    let store = Arc::new(MockStore::new());
    let clade = Clade {
        root_id: 10,
        nodes: vec![taxon(10, Some(1)), taxon(11, Some(10))],
        child_clade_roots: vec![12],
    };

    writer(&store, options(10))
        .write(std::slice::from_ref(&clade), CREATED_AT)
        .unwrap();

    let value = store.state().records["10"].clone();
    assert_eq!(value["$type"], json!(COLLECTION));
    assert_eq!(value["rootOttId"], json!(10));
    assert_eq!(value["refs"], json!([12]));
    assert_eq!(value["source"], json!("test-source"));
    assert_eq!(value["createdAt"], json!(CREATED_AT));
    assert_eq!(value["nodes"][1]["parentOttId"], json!(10));

    let record: CladeRecord = serde_json::from_value(value).unwrap();
    assert_eq!(record.into_clade(), clade);
}

#[test]
fn given_stored_clades_when_fetching_then_decodes_by_root() {
    let store = Arc::new(MockStore::new());
    let w = writer(&store, options(10));
    w.write(&clades(&[3, 4]), CREATED_AT).unwrap();

    let fetched = w.fetch_clades().unwrap();

    assert_eq!(fetched.keys().copied().collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(fetched[&3].nodes[0].id, 3);
}

#[test]
fn given_undecodable_record_when_fetching_then_reports_invalid_record() {
    let store = Arc::new(MockStore::with_records(&[7]));

    let result = writer(&store, options(10)).fetch_clades();

    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::InvalidRecord { ref key, .. })) if key == "7"
    ));
}
