//! Backend-agnostic ordered key-value storage abstraction.
//!
//! `strata-db` and `strata-index` depend only on [`OrderedKv`] and
//! [`KvTransaction`]; [`crate::surreal::SurrealKv`] and
//! [`crate::fakes::InMemoryKv`] are its two implementations.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// One mutation in a [`OrderedKv::write_batch`] call.
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// An inclusive/exclusive/unbounded key range for [`OrderedKv::iter_range`],
/// evaluated over the raw (already index-key-encoded) byte strings.
#[derive(Debug, Clone)]
pub struct KeyRange {
    pub lower: Bound<Vec<u8>>,
    pub upper: Bound<Vec<u8>>,
}

impl KeyRange {
    /// The range containing every key in the column family.
    pub fn full() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// `[lower, upper)` — the shape produced by index-key prefix/plus-separator
    /// construction.
    pub fn half_open(lower: Vec<u8>, upper: Vec<u8>) -> Self {
        Self {
            lower: Bound::Included(lower),
            upper: Bound::Excluded(upper),
        }
    }
}

/// A predicate evaluated against an entry's current value during compaction,
/// used to purge TTL-expired rows. Returns `true` when the
/// entry should be dropped.
pub type CompactionFilter = Arc<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>;

/// A point-in-time, read-only view of one column family. Reads against a
/// snapshot never observe writes committed after it was taken.
pub trait KvSnapshot: Send + Sync {
    /// Point read against the captured state.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Range scan against the captured state, ascending unless
    /// `descending`.
    fn iter_range(&self, range: KeyRange, descending: bool) -> Vec<(Vec<u8>, Vec<u8>)>;
}

/// A [`KvSnapshot`] backed by an owned, materialized copy of the column
/// family's rows at capture time. Backends without a native snapshot
/// primitive take one by reading the column family in a single consistent
/// pass.
pub struct OwnedSnapshot {
    rows: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl OwnedSnapshot {
    pub fn new(rows: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        Self { rows }
    }
}

impl KvSnapshot for OwnedSnapshot {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.rows.get(key).cloned()
    }

    fn iter_range(&self, range: KeyRange, descending: bool) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out: Vec<(Vec<u8>, Vec<u8>)> = self
            .rows
            .range((range.lower, range.upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if descending {
            out.reverse();
        }
        out
    }
}

/// A live transaction against an [`OrderedKv`] backend.
///
/// Implementations must provide snapshot isolation for reads taken through
/// [`KvTransaction::get`] and serialize concurrent writers through
/// [`KvTransaction::for_update_get`], matching the document store's need to
/// read-then-conditionally-write under a single commit.
#[async_trait]
pub trait KvTransaction: Send + Sync {
    /// Read a key as it stood at the start of this transaction.
    async fn get(&mut self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Read a key and mark it so concurrent transactions touching the same
    /// key block (or conflict) until this transaction commits or rolls back.
    async fn for_update_get(&mut self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Stage a write, visible to later reads within this transaction but not
    /// to other transactions until commit.
    async fn put(&mut self, cf: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Stage a delete.
    async fn delete(&mut self, cf: &str, key: &[u8]) -> Result<()>;

    /// Commit all staged writes atomically.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard all staged writes.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// An ordered key-value backend: keys within a column family iterate in
/// byte-lexicographic order, which is the property the index-key engine
/// relies on for range queries.
#[async_trait]
pub trait OrderedKv: Send + Sync {
    /// Create `cf` if it doesn't already exist. Idempotent.
    async fn open_cf(&self, cf: &str) -> Result<()>;

    /// Point read.
    async fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Point write (upsert).
    async fn put(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<()>;

    /// Point delete. No-op if the key is absent.
    async fn delete(&self, cf: &str, key: &[u8]) -> Result<()>;

    /// Iterate `range` within `cf`, in ascending order unless `descending`.
    async fn iter_range(
        &self,
        cf: &str,
        range: KeyRange,
        descending: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply a batch of writes atomically.
    async fn write_batch(&self, cf: &str, ops: Vec<BatchOp>) -> Result<()>;

    /// Capture a point-in-time view of `cf`, scoping a multi-read operation
    /// (e.g. one query execution) to a single consistent state.
    async fn snapshot(&self, cf: &str) -> Result<Box<dyn KvSnapshot>>;

    /// Start a transaction spanning (potentially) multiple column families.
    async fn transaction(&self) -> Result<Box<dyn KvTransaction>>;

    /// Whether `err` represents a write-write conflict that the caller
    /// should retry rather than surface.
    fn is_conflict(&self, err: &crate::error::KvError) -> bool {
        matches!(err, crate::error::KvError::Conflict { .. })
    }

    /// Register a filter invoked during background compaction of `cf`;
    /// entries for which it returns `true` are dropped. Used to purge
    /// TTL-expired documents and their index entries without an explicit
    /// scan.
    fn register_compaction_filter(&self, cf: &str, filter: CompactionFilter) -> Result<()>;
}
