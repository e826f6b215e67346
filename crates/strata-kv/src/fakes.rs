//! In-memory [`OrderedKv`] fake for fast, deterministic tests with no
//! server process.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::{
    BatchOp, CompactionFilter, KeyRange, KvSnapshot, KvTransaction, OrderedKv, OwnedSnapshot,
};

type Cf = BTreeMap<Vec<u8>, Vec<u8>>;

#[derive(Default)]
struct State {
    cfs: HashMap<String, Cf>,
    compaction_filters: HashMap<String, CompactionFilter>,
}

/// A `BTreeMap`-backed [`OrderedKv`], one map per column family.
#[derive(Clone, Default)]
pub struct InMemoryKv {
    state: Arc<Mutex<State>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every registered compaction filter over every column family now,
    /// dropping entries the filter rejects. Production backends do this in
    /// the background; tests call it explicitly to assert TTL purge
    /// behavior deterministically.
    pub fn run_compaction(&self) {
        let mut state = self.state.lock().unwrap();
        let filters = state.compaction_filters.clone();
        for (cf, map) in state.cfs.iter_mut() {
            if let Some(filter) = filters.get(cf) {
                map.retain(|k, v| !filter(k, v));
            }
        }
    }
}

#[async_trait]
impl OrderedKv for InMemoryKv {
    async fn open_cf(&self, cf: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .cfs
            .entry(cf.to_string())
            .or_default();
        Ok(())
    }

    async fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .cfs
            .get(cf)
            .and_then(|m| m.get(key).cloned()))
    }

    async fn put(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .cfs
            .entry(cf.to_string())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, cf: &str, key: &[u8]) -> Result<()> {
        if let Some(map) = self.state.lock().unwrap().cfs.get_mut(cf) {
            map.remove(key);
        }
        Ok(())
    }

    async fn iter_range(
        &self,
        cf: &str,
        range: KeyRange,
        descending: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let state = self.state.lock().unwrap();
        let Some(map) = state.cfs.get(cf) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<(Vec<u8>, Vec<u8>)> = map
            .range((range.lower, range.upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if descending {
            rows.reverse();
        }
        Ok(rows)
    }

    async fn write_batch(&self, cf: &str, ops: Vec<BatchOp>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let map = state.cfs.entry(cf.to_string()).or_default();
        for op in ops {
            match op {
                BatchOp::Put(k, v) => {
                    map.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }

    async fn snapshot(&self, cf: &str) -> Result<Box<dyn KvSnapshot>> {
        let rows = self
            .state
            .lock()
            .unwrap()
            .cfs
            .get(cf)
            .cloned()
            .unwrap_or_default();
        Ok(Box::new(OwnedSnapshot::new(rows)))
    }

    async fn transaction(&self) -> Result<Box<dyn KvTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            state: self.state.clone(),
            staged: Vec::new(),
        }))
    }

    fn register_compaction_filter(&self, cf: &str, filter: CompactionFilter) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .compaction_filters
            .insert(cf.to_string(), filter);
        Ok(())
    }
}

enum StagedOp {
    Put(String, Vec<u8>, Vec<u8>),
    Delete(String, Vec<u8>),
}

/// An in-memory transaction: writes are buffered until [`commit`], at which
/// point they're applied as a single critical section (global lock, so
/// there's nothing for [`is_conflict`] to ever report for this backend).
///
/// [`commit`]: InMemoryTransaction::commit
/// [`is_conflict`]: OrderedKv::is_conflict
struct InMemoryTransaction {
    state: Arc<Mutex<State>>,
    staged: Vec<StagedOp>,
}

impl InMemoryTransaction {
    fn staged_value(&self, cf: &str, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.staged.iter().rev().find_map(|op| match op {
            StagedOp::Put(c, k, v) if c == cf && k == key => Some(Some(v.clone())),
            StagedOp::Delete(c, k) if c == cf && k == key => Some(None),
            _ => None,
        })
    }
}

#[async_trait]
impl KvTransaction for InMemoryTransaction {
    async fn get(&mut self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.staged_value(cf, key) {
            return Ok(staged);
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .cfs
            .get(cf)
            .and_then(|m| m.get(key).cloned()))
    }

    async fn for_update_get(&mut self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get(cf, key).await
    }

    async fn put(&mut self, cf: &str, key: &[u8], value: &[u8]) -> Result<()> {
        self.staged
            .push(StagedOp::Put(cf.to_string(), key.to_vec(), value.to_vec()));
        Ok(())
    }

    async fn delete(&mut self, cf: &str, key: &[u8]) -> Result<()> {
        self.staged.push(StagedOp::Delete(cf.to_string(), key.to_vec()));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        for op in self.staged {
            match op {
                StagedOp::Put(cf, k, v) => {
                    state.cfs.entry(cf).or_default().insert(k, v);
                }
                StagedOp::Delete(cf, k) => {
                    if let Some(map) = state.cfs.get_mut(&cf) {
                        map.remove(&k);
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
