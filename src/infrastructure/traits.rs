//! I/O boundary traits for testability
//!
//! These traits abstract the remote collaborators, allowing services
//! to be tested with mock implementations.

use serde_json::Value;

use crate::domain::{ArgusonNode, NamePass, TaxonId};
use crate::infrastructure::error::RemoteResult;

/// Source of nested taxonomy trees.
pub trait TreeSource: Send + Sync {
    /// Fetch the subtree rooted at `root`.
    ///
    /// `height_limit` bounds the depth returned by the service (None = unlimited).
    /// Returns `Ok(None)` when the service answers without a tree.
    fn fetch_subtree(
        &self,
        root: TaxonId,
        height_limit: Option<u32>,
    ) -> RemoteResult<Option<ArgusonNode>>;
}

/// Common name returned by a name lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameHit {
    pub id: TaxonId,
    pub name: String,
}

/// Best-effort common-name lookup keyed by taxon id.
pub trait NameSource: Send + Sync {
    /// Look up one batch of ids. Ids without a match are simply absent;
    /// an id may appear more than once.
    fn lookup(&self, pass: NamePass, ids: &[TaxonId]) -> RemoteResult<Vec<NameHit>>;
}

/// One record read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub key: String,
    pub value: Value,
}

/// One page of a collection listing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordPage {
    pub records: Vec<StoredRecord>,
    /// Cursor for the next page; None when the listing is exhausted
    pub cursor: Option<String>,
}

/// Keyed record store with batched creates.
pub trait RecordStore: Send + Sync {
    /// List one page of a collection.
    fn list_page(&self, collection: &str, cursor: Option<&str>) -> RemoteResult<RecordPage>;

    /// Create a single record under `key`.
    fn create(&self, collection: &str, key: &str, value: &Value) -> RemoteResult<()>;

    /// Create or overwrite the record under `key` in one call.
    fn put(&self, collection: &str, key: &str, value: &Value) -> RemoteResult<()>;

    /// Create several records in one call. All-or-nothing.
    fn apply_creates(&self, collection: &str, records: &[(String, Value)]) -> RemoteResult<()>;

    /// Delete the record under `key`.
    fn delete(&self, collection: &str, key: &str) -> RemoteResult<()>;
}
