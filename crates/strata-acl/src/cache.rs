//! Optional result cache keyed by `(object-model, object-id, subject-id,
//! operation-name)`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use strata_unit::ObjectId;

/// What a cache lookup (or a resolution step) settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Grant,
    Deny,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub object_model: &'static str,
    pub object_id: ObjectId,
    pub subject_id: ObjectId,
    pub operation: &'static str,
}

#[async_trait]
pub trait AclCache: Send + Sync {
    /// `Unknown` (or no entry at all) means the caller must resolve fresh.
    async fn get(&self, key: &CacheKey) -> CacheState;

    async fn put(&self, key: CacheKey, state: CacheState);

    /// Drops every cached entry for `(object_id, subject_id)` regardless of
    /// operation, so the next check bypasses the cache.
    async fn invalidate(&self, object_id: ObjectId, subject_id: ObjectId);
}

/// A cache backend is optional; this is what "not configured" looks like.
pub struct NoCache;

#[async_trait]
impl AclCache for NoCache {
    async fn get(&self, _key: &CacheKey) -> CacheState {
        CacheState::Unknown
    }

    async fn put(&self, _key: CacheKey, _state: CacheState) {}

    async fn invalidate(&self, _object_id: ObjectId, _subject_id: ObjectId) {}
}

#[derive(Default)]
pub struct InMemoryAclCache {
    entries: Mutex<HashMap<CacheKey, CacheState>>,
}

impl InMemoryAclCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AclCache for InMemoryAclCache {
    async fn get(&self, key: &CacheKey) -> CacheState {
        self.entries.lock().unwrap().get(key).copied().unwrap_or(CacheState::Unknown)
    }

    async fn put(&self, key: CacheKey, state: CacheState) {
        self.entries.lock().unwrap().insert(key, state);
    }

    async fn invalidate(&self, object_id: ObjectId, subject_id: ObjectId) {
        self.entries.lock().unwrap().retain(|key, _| key.object_id != object_id || key.subject_id != subject_id);
    }
}
