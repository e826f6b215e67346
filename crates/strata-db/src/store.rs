//! The document store: typed CRUD, secondary-index queries,
//! partition administration, and transactions layered over an [`OrderedKv`]
//! backend.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound as StdBound;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;

use strata_buf::{escape_string, unescape_string, SEPARATOR};
use strata_index::{
    exclusive_upper_bound, IndexKeyBuilder, IndexValue, Query, QueryExecutor, RangeReader,
};
use strata_kv::{KeyRange, KvError, KvSnapshot, KvTransaction, OrderedKv};
use strata_unit::{apply_update, FieldValue, ObjectId, Scalar, StoredObject, TopicId, Unit, UpdateRequest};

use crate::envelope;
use crate::error::{Result, StoreError};
use crate::model::{IndexDef, Model};
use crate::partition::PartitionKey;

/// Which side of an `update` a [`Store::find_update_create`] call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnMode {
    Before,
    After,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn map_read_err(err: KvError) -> StoreError {
    match err {
        KvError::Conflict { .. } => StoreError::BackendConflict,
        KvError::Ddl { cf, reason } => StoreError::BackendDdl { cf, reason },
        other => StoreError::BackendRead(other.to_string()),
    }
}

fn map_write_err(err: KvError) -> StoreError {
    match err {
        KvError::Conflict { .. } => StoreError::BackendConflict,
        KvError::Ddl { cf, reason } => StoreError::BackendDdl { cf, reason },
        other => StoreError::BackendWrite(other.to_string()),
    }
}

/// No `date` means the unpartitioned default bucket.
fn resolve_partition(date: Option<i64>) -> PartitionKey {
    match date {
        Some(millis) => PartitionKey::from_unix_millis(millis),
        None => PartitionKey::default_partition(),
    }
}

/// The partition a freshly created object belongs in, derived from its own
/// partitioning field value when the model declares one.
fn partition_for_object<U: Model>(object: &dyn Unit) -> Result<PartitionKey> {
    let Some(tag) = U::partition_field() else {
        return Ok(PartitionKey::default_partition());
    };
    match object.get(tag) {
        Some(FieldValue::Scalar(Scalar::DateTime(millis))) => Ok(PartitionKey::from_unix_millis(millis)),
        Some(FieldValue::Scalar(Scalar::Date(days))) => {
            Ok(PartitionKey::from_unix_millis(days as i64 * 86_400_000))
        }
        Some(_) => Err(StoreError::InvalidType { tag }),
        None => Ok(PartitionKey::default_partition()),
    }
}

fn primary_key(topic: &str, model_id: &str, object_id: &ObjectId) -> Vec<u8> {
    let mut out = escape_string(topic.as_bytes());
    out.push(SEPARATOR);
    out.extend(escape_string(model_id.as_bytes()));
    out.push(SEPARATOR);
    out.extend_from_slice(object_id.as_bytes());
    out
}

fn topic_prefix(topic: &str, model_id: &str) -> Vec<u8> {
    let mut out = escape_string(topic.as_bytes());
    out.push(SEPARATOR);
    out.extend(escape_string(model_id.as_bytes()));
    out.push(SEPARATOR);
    out
}

/// The topic component of a primary key, recovered for
/// [`Store::list_model_topics`].
fn extract_topic(key: &[u8]) -> Option<String> {
    let pos = key.iter().position(|&b| b == SEPARATOR)?;
    String::from_utf8(unescape_string(&key[..pos])).ok()
}

fn field_scalar(object: &dyn Unit, tag: u32) -> Result<Scalar> {
    match object.get(tag) {
        Some(FieldValue::Scalar(s)) => Ok(s),
        Some(FieldValue::Repeated(_)) => Err(StoreError::InvalidType { tag }),
        None => {
            let name = object.schema().field_by_tag(tag).map(|f| f.name).unwrap_or("");
            Err(StoreError::FieldRequiredMissing { tag, name })
        }
    }
}

fn index_key(topic: &str, def: &IndexDef, object: &dyn Unit, object_id: &ObjectId) -> Result<Vec<u8>> {
    let index_id = def.index_id();
    let mut builder = IndexKeyBuilder::new().push_topic(topic).push_index_id(&index_id);
    for field in def.fields {
        builder = builder.push_field(&field_scalar(object, field.tag)?);
    }
    Ok(builder.push_object_id(object_id).finish())
}

fn index_keys_for(topic: &str, defs: &'static [IndexDef], object: &dyn Unit, id: &ObjectId) -> Result<Vec<Vec<u8>>> {
    defs.iter().map(|def| index_key(topic, def, object, id)).collect()
}

/// Bridges a backend snapshot to [`strata_index`]'s synchronous
/// [`RangeReader`], so one query execution reads a single consistent state
/// of the indexes column family.
struct SnapshotReader {
    snapshot: Box<dyn KvSnapshot>,
}

impl RangeReader for SnapshotReader {
    fn scan(
        &self,
        lower: StdBound<Vec<u8>>,
        upper: StdBound<Vec<u8>>,
        descending: bool,
    ) -> strata_index::Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.snapshot.iter_range(KeyRange { lower, upper }, descending))
    }
}

/// Schema-driven document store: CRUD, secondary-index queries, partitions,
/// and transactions over an [`OrderedKv`] backend.
pub struct Store<K: OrderedKv> {
    kv: Arc<K>,
    partitions: Mutex<HashMap<String, BTreeSet<String>>>,
    checked_schemas: Mutex<BTreeSet<String>>,
}

impl<K: OrderedKv + 'static> Store<K> {
    pub fn new(kv: Arc<K>) -> Self {
        Self {
            kv,
            partitions: Mutex::new(HashMap::new()),
            checked_schemas: Mutex::new(BTreeSet::new()),
        }
    }

    /// Name-matched upgrade check, run once per model per store instance:
    /// the schema name recorded under the model id must match the one the
    /// code now carries. Anything beyond a name match (field moves, type
    /// changes) is a migration and is not attempted here.
    async fn check_schema<U: Model>(&self) -> Result<()> {
        let model_id = U::model_id();
        if self.checked_schemas.lock().unwrap().contains(model_id) {
            return Ok(());
        }
        let schema = U::default().schema();
        schema.validate()?;

        self.kv.open_cf("system").await.map_err(map_write_err)?;
        let key = format!("schema::{model_id}");
        match self.kv.get("system", key.as_bytes()).await.map_err(map_read_err)? {
            Some(recorded) => {
                if recorded != schema.name.as_bytes() {
                    return Err(StoreError::BackendDdl {
                        cf: "system".to_string(),
                        reason: format!(
                            "model {model_id:?} was written with schema {:?} but the registered schema is {:?}",
                            String::from_utf8_lossy(&recorded),
                            schema.name
                        ),
                    });
                }
            }
            None => {
                self.kv
                    .put("system", key.as_bytes(), schema.name.as_bytes())
                    .await
                    .map_err(map_write_err)?;
            }
        }
        self.checked_schemas.lock().unwrap().insert(model_id.to_string());
        Ok(())
    }

    async fn ensure_partition<U: Model>(&self, partition: &PartitionKey) -> Result<()> {
        let model_id = U::model_id();
        self.check_schema::<U>().await?;
        let objects_cf = partition.objects_cf(model_id);
        let indexes_cf = partition.indexes_cf(model_id);
        self.kv.open_cf(&objects_cf).await.map_err(map_write_err)?;
        self.kv.open_cf(&indexes_cf).await.map_err(map_write_err)?;

        // Expired rows are already invisible to reads; these filters let the
        // backend reclaim them during background compaction.
        self.kv
            .register_compaction_filter(&objects_cf, Arc::new(|_key, value| envelope::is_expired_raw(value, now_millis())))
            .map_err(map_write_err)?;
        self.kv
            .register_compaction_filter(
                &indexes_cf,
                Arc::new(|_key, value| {
                    IndexValue::decode(value).map(|iv| iv.is_expired(now_millis())).unwrap_or(false)
                }),
            )
            .map_err(map_write_err)?;

        self.register_partition(model_id, partition).await
    }

    async fn register_partition(&self, model_id: &str, partition: &PartitionKey) -> Result<()> {
        let changed = {
            let mut partitions = self.partitions.lock().unwrap();
            partitions.entry(model_id.to_string()).or_default().insert(partition.0.clone())
        };
        if changed {
            self.persist_partitions(model_id).await?;
        }
        Ok(())
    }

    async fn persist_partitions(&self, model_id: &str) -> Result<()> {
        self.kv.open_cf("system").await.map_err(map_write_err)?;
        let joined = {
            let partitions = self.partitions.lock().unwrap();
            partitions
                .get(model_id)
                .map(|set| set.iter().cloned().collect::<Vec<_>>().join(","))
                .unwrap_or_default()
        };
        self.kv
            .put("system", format!("partitions::{model_id}").as_bytes(), joined.as_bytes())
            .await
            .map_err(map_write_err)
    }

    async fn load_partitions(&self, model_id: &str) -> Result<BTreeSet<String>> {
        if let Some(set) = self.partitions.lock().unwrap().get(model_id) {
            return Ok(set.clone());
        }
        self.kv.open_cf("system").await.map_err(map_read_err)?;
        let raw = self
            .kv
            .get("system", format!("partitions::{model_id}").as_bytes())
            .await
            .map_err(map_read_err)?;
        let set: BTreeSet<String> = raw
            .map(|bytes| {
                String::from_utf8_lossy(&bytes)
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();
        self.partitions.lock().unwrap().insert(model_id.to_string(), set.clone());
        Ok(set)
    }

    async fn effective_partitions(&self, model_id: &str, query: &Query) -> Result<Vec<PartitionKey>> {
        if let Some(names) = &query.partitions {
            return Ok(names.iter().cloned().map(PartitionKey).collect());
        }
        let registered = self.load_partitions(model_id).await?;
        let mut out: Vec<PartitionKey> = registered.into_iter().map(PartitionKey).collect();
        if out.is_empty() {
            out.push(PartitionKey::default_partition());
        }
        Ok(out)
    }

    async fn partitions_in_range(&self, model_id: &str, from: i64, to: i64) -> Result<Vec<PartitionKey>> {
        let registered = self.load_partitions(model_id).await?;
        Ok(registered
            .into_iter()
            .map(PartitionKey)
            .filter(|p| match p.start_unix_millis() {
                Some(start) => start < to && p.next_start_unix_millis().map(|n| n > from).unwrap_or(true),
                None => false,
            })
            .collect())
    }

    async fn load_index_snapshot(&self, indexes_cf: &str) -> Result<SnapshotReader> {
        self.kv.open_cf(indexes_cf).await.map_err(map_read_err)?;
        let snapshot = self.kv.snapshot(indexes_cf).await.map_err(map_read_err)?;
        Ok(SnapshotReader { snapshot })
    }

    // ---- create ----------------------------------------------------

    pub async fn create_tx<U: Model>(
        &self,
        tx: &mut dyn KvTransaction,
        topic: &TopicId,
        object: U,
        now: i64,
    ) -> Result<StoredObject<U>> {
        let stored = StoredObject::new(topic.clone(), object, now);
        self.create_stored_tx(tx, stored).await
    }

    async fn create_stored_tx<U: Model>(
        &self,
        tx: &mut dyn KvTransaction,
        stored: StoredObject<U>,
    ) -> Result<StoredObject<U>> {
        let model_id = U::model_id();
        let partition = partition_for_object::<U>(&stored.object)?;
        self.ensure_partition::<U>(&partition).await?;

        let objects_cf = partition.objects_cf(model_id);
        let pk = primary_key(&stored.topic.0, model_id, &stored.id);

        if tx.get(&objects_cf, &pk).await.map_err(map_read_err)?.is_some() {
            return Err(StoreError::DuplicateId);
        }
        tx.put(&objects_cf, &pk, &envelope::encode(&stored)).await.map_err(map_write_err)?;

        let indexes_cf = partition.indexes_cf(model_id);
        let value = IndexValue { created_at: stored.created_at, ttl: stored.expire_at }.encode();
        for def in U::indexes() {
            let key = index_key(&stored.topic.0, def, &stored.object, &stored.id)?;
            tx.put(&indexes_cf, &key, &value).await.map_err(map_write_err)?;
        }
        Ok(stored)
    }

    async fn create_stored<U: Model>(&self, stored: StoredObject<U>) -> Result<StoredObject<U>> {
        let mut tx = self.kv.transaction().await.map_err(map_write_err)?;
        match self.create_stored_tx::<U>(tx.as_mut(), stored).await {
            Ok(stored) => {
                tx.commit().await.map_err(map_write_err)?;
                Ok(stored)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    pub async fn create<U: Model>(&self, topic: &TopicId, object: U, now: i64) -> Result<StoredObject<U>> {
        self.create_stored(StoredObject::new(topic.clone(), object, now)).await
    }

    /// Like [`Store::create`], stamping the record and its index rows with
    /// an expiry marker `ttl_seconds` from `now`. Zero disables expiry.
    pub async fn create_with_ttl<U: Model>(
        &self,
        topic: &TopicId,
        object: U,
        ttl_seconds: u64,
        now: i64,
    ) -> Result<StoredObject<U>> {
        self.create_stored(StoredObject::new(topic.clone(), object, now).with_ttl(ttl_seconds, now)).await
    }

    // ---- read --------------------------------------------------------

    pub async fn read_tx<U: Model>(
        &self,
        tx: &mut dyn KvTransaction,
        topic: &str,
        partition: &PartitionKey,
        id: &ObjectId,
        for_update: bool,
        tp_filter: Option<i64>,
    ) -> Result<StoredObject<U>> {
        let model_id = U::model_id();
        let objects_cf = partition.objects_cf(model_id);
        let pk = primary_key(topic, model_id, id);
        let raw = if for_update {
            tx.for_update_get(&objects_cf, &pk).await.map_err(map_read_err)?
        } else {
            tx.get(&objects_cf, &pk).await.map_err(map_read_err)?
        };
        let stored: StoredObject<U> = envelope::decode(&raw.ok_or(StoreError::NotFound)?)?;
        if tp_filter.is_some_and(|now| stored.is_expired(now)) {
            return Err(StoreError::NotFound);
        }
        Ok(stored)
    }

    pub async fn read<U: Model>(
        &self,
        topic: &str,
        id: &ObjectId,
        date: Option<i64>,
        tp_filter: Option<i64>,
    ) -> Result<StoredObject<U>> {
        let partition = resolve_partition(date);
        let model_id = U::model_id();
        let objects_cf = partition.objects_cf(model_id);
        self.kv.open_cf(&objects_cf).await.map_err(map_read_err)?;
        let pk = primary_key(topic, model_id, id);
        let raw = self.kv.get(&objects_cf, &pk).await.map_err(map_read_err)?;
        let stored: StoredObject<U> = envelope::decode(&raw.ok_or(StoreError::NotFound)?)?;
        if tp_filter.is_some_and(|now| stored.is_expired(now)) {
            return Err(StoreError::NotFound);
        }
        Ok(stored)
    }

    // ---- update --------------------------------------------------------

    pub async fn update_tx<U: Model>(
        &self,
        tx: &mut dyn KvTransaction,
        topic: &str,
        partition: &PartitionKey,
        id: &ObjectId,
        request: &UpdateRequest,
        now: i64,
    ) -> Result<StoredObject<U>> {
        let model_id = U::model_id();
        let objects_cf = partition.objects_cf(model_id);
        let indexes_cf = partition.indexes_cf(model_id);
        let pk = primary_key(topic, model_id, id);

        let raw = tx.for_update_get(&objects_cf, &pk).await.map_err(map_read_err)?;
        let mut stored: StoredObject<U> = envelope::decode(&raw.ok_or(StoreError::NotFound)?)?;

        let before = index_keys_for(topic, U::indexes(), &stored.object, &stored.id)?;
        apply_update(&mut stored.object, request)?;
        stored.touch(now);
        let after = index_keys_for(topic, U::indexes(), &stored.object, &stored.id)?;

        tx.put(&objects_cf, &pk, &envelope::encode(&stored)).await.map_err(map_write_err)?;

        let value = IndexValue { created_at: stored.created_at, ttl: stored.expire_at }.encode();
        for (old_key, new_key) in before.iter().zip(after.iter()) {
            if old_key != new_key {
                tx.delete(&indexes_cf, old_key).await.map_err(map_write_err)?;
                tx.put(&indexes_cf, new_key, &value).await.map_err(map_write_err)?;
            }
        }
        Ok(stored)
    }

    pub async fn update<U: Model>(
        &self,
        topic: &str,
        id: &ObjectId,
        request: &UpdateRequest,
        date: Option<i64>,
        now: i64,
    ) -> Result<StoredObject<U>> {
        let partition = resolve_partition(date);
        let mut tx = self.kv.transaction().await.map_err(map_write_err)?;
        match self.update_tx::<U>(tx.as_mut(), topic, &partition, id, request, now).await {
            Ok(stored) => {
                tx.commit().await.map_err(map_write_err)?;
                Ok(stored)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    pub async fn read_update<U: Model>(
        &self,
        topic: &str,
        id: &ObjectId,
        request: &UpdateRequest,
        date: Option<i64>,
        now: i64,
        mode: ReturnMode,
    ) -> Result<StoredObject<U>> {
        let partition = resolve_partition(date);
        let mut tx = self.kv.transaction().await.map_err(map_write_err)?;
        let before = match self.read_tx::<U>(tx.as_mut(), topic, &partition, id, true, None).await {
            Ok(before) => before,
            Err(err) => {
                let _ = tx.rollback().await;
                return Err(err);
            }
        };
        match self.update_tx::<U>(tx.as_mut(), topic, &partition, id, request, now).await {
            Ok(after) => {
                tx.commit().await.map_err(map_write_err)?;
                Ok(match mode {
                    ReturnMode::Before => before,
                    ReturnMode::After => after,
                })
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    // ---- delete --------------------------------------------------------

    pub async fn delete_object_tx<U: Model>(
        &self,
        tx: &mut dyn KvTransaction,
        topic: &str,
        partition: &PartitionKey,
        id: &ObjectId,
    ) -> Result<()> {
        let model_id = U::model_id();
        let objects_cf = partition.objects_cf(model_id);
        let indexes_cf = partition.indexes_cf(model_id);
        let pk = primary_key(topic, model_id, id);

        let raw = tx.get(&objects_cf, &pk).await.map_err(map_read_err)?;
        let stored: StoredObject<U> = envelope::decode(&raw.ok_or(StoreError::NotFound)?)?;
        tx.delete(&objects_cf, &pk).await.map_err(map_write_err)?;
        for def in U::indexes() {
            let key = index_key(topic, def, &stored.object, id)?;
            tx.delete(&indexes_cf, &key).await.map_err(map_write_err)?;
        }
        Ok(())
    }

    pub async fn delete_object<U: Model>(&self, topic: &str, id: &ObjectId, date: Option<i64>) -> Result<()> {
        let partition = resolve_partition(date);
        let mut tx = self.kv.transaction().await.map_err(map_write_err)?;
        match self.delete_object_tx::<U>(tx.as_mut(), topic, &partition, id).await {
            Ok(()) => tx.commit().await.map_err(map_write_err),
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    // ---- queries --------------------------------------------------------

    /// Runs `query` across its declared topic set (required: there is no
    /// cross-topic secondary index to scan without one) and partition set,
    /// returning matches in the query's declared composite field order,
    /// bounded by `query.limit`.
    pub async fn find<U: Model>(&self, query: &Query) -> Result<Vec<StoredObject<U>>> {
        let topics = query.topics.clone().ok_or_else(|| {
            StoreError::ValidationFailed(
                "find requires query.topics: there is no cross-topic secondary index".to_string(),
            )
        })?;
        let model_id = U::model_id();
        let partitions = self.effective_partitions(model_id, query).await?;

        let mut all_hits: Vec<(PartitionKey, strata_index::IndexHit)> = Vec::new();
        'outer: for topic in &topics {
            for partition in &partitions {
                let indexes_cf = partition.indexes_cf(model_id);
                let reader = self.load_index_snapshot(&indexes_cf).await?;
                for hit in QueryExecutor::run(&reader, topic, &query.index_id, query)? {
                    all_hits.push((partition.clone(), hit));
                }
                if query.limit > 0 && all_hits.len() >= query.limit {
                    break 'outer;
                }
            }
        }
        // Per-partition runs are each already sorted; merging partitions
        // and topics re-applies the same declared order across the union.
        let order = strata_index::declared_order(query);
        all_hits.sort_by(|(_, a), (_, b)| strata_index::compare_hits(a, b, &order));
        if query.limit > 0 {
            all_hits.truncate(query.limit);
        }

        let mut results = Vec::with_capacity(all_hits.len());
        for (partition, hit) in all_hits {
            let objects_cf = partition.objects_cf(model_id);
            let pk = primary_key(&hit.topic, model_id, &hit.object_id);
            if let Some(bytes) = self.kv.get(&objects_cf, &pk).await.map_err(map_read_err)? {
                let stored: StoredObject<U> = envelope::decode(&bytes)?;
                if query.time_point_filter.is_some_and(|now| stored.is_expired(now)) {
                    continue;
                }
                results.push(stored);
            }
        }
        Ok(results)
    }

    pub async fn find_one<U: Model>(&self, query: &Query) -> Result<Option<StoredObject<U>>> {
        let mut limited = query.clone();
        limited.limit = 1;
        Ok(self.find::<U>(&limited).await?.into_iter().next())
    }

    pub async fn count<U: Model>(&self, query: &Query) -> Result<usize> {
        Ok(self.find::<U>(query).await?.len())
    }

    /// Count every record in one topic without a predicate, scanning the
    /// primary store directly.
    pub async fn count_topic<U: Model>(&self, topic: &str, date: Option<i64>) -> Result<usize> {
        Ok(self.find_all::<U>(topic, date, false).await?.len())
    }

    async fn scan_partition<U: Model>(
        &self,
        topic: &str,
        partition: &PartitionKey,
        descending: bool,
    ) -> Result<Vec<StoredObject<U>>> {
        let model_id = U::model_id();
        let objects_cf = partition.objects_cf(model_id);
        self.kv.open_cf(&objects_cf).await.map_err(map_read_err)?;
        let prefix = topic_prefix(topic, model_id);
        let upper = exclusive_upper_bound(&prefix);
        let rows = self
            .kv
            .iter_range(&objects_cf, KeyRange::half_open(prefix, upper), descending)
            .await
            .map_err(map_read_err)?;
        rows.into_iter().map(|(_, v)| envelope::decode(&v)).collect()
    }

    pub async fn find_all<U: Model>(&self, topic: &str, date: Option<i64>, descending: bool) -> Result<Vec<StoredObject<U>>> {
        self.scan_partition::<U>(topic, &resolve_partition(date), descending).await
    }

    pub async fn find_all_partitioned<U: Model>(&self, topic: &str, descending: bool) -> Result<Vec<StoredObject<U>>> {
        let partitions = self.effective_partitions(U::model_id(), &Query::default()).await?;
        let mut out = Vec::new();
        for partition in partitions {
            out.extend(self.scan_partition::<U>(topic, &partition, descending).await?);
        }
        Ok(out)
    }

    // ---- bulk operations --------------------------------------------------------

    pub async fn delete_many<U: Model>(&self, query: &Query) -> Result<usize> {
        let matches = self.find::<U>(query).await?;
        let mut tx = self.kv.transaction().await.map_err(map_write_err)?;
        let mut count = 0usize;
        for stored in &matches {
            let partition = partition_for_object::<U>(&stored.object)?;
            if let Err(err) = self
                .delete_object_tx::<U>(tx.as_mut(), &stored.topic.0, &partition, &stored.id)
                .await
            {
                let _ = tx.rollback().await;
                return Err(err);
            }
            count += 1;
        }
        tx.commit().await.map_err(map_write_err)?;
        Ok(count)
    }

    pub async fn update_many<U: Model>(&self, query: &Query, request: &UpdateRequest, now: i64) -> Result<usize> {
        let matches = self.find::<U>(query).await?;
        let mut tx = self.kv.transaction().await.map_err(map_write_err)?;
        let mut count = 0usize;
        for stored in &matches {
            let partition = partition_for_object::<U>(&stored.object)?;
            if let Err(err) = self
                .update_tx::<U>(tx.as_mut(), &stored.topic.0, &partition, &stored.id, request, now)
                .await
            {
                let _ = tx.rollback().await;
                return Err(err);
            }
            count += 1;
        }
        tx.commit().await.map_err(map_write_err)?;
        Ok(count)
    }

    pub async fn find_update_create<U: Model>(
        &self,
        query: &Query,
        request: &UpdateRequest,
        fallback_object: U,
        fallback_topic: &TopicId,
        return_mode: ReturnMode,
        now: i64,
    ) -> Result<StoredObject<U>> {
        match self.find_one::<U>(query).await? {
            Some(before) => {
                let partition = partition_for_object::<U>(&before.object)?;
                let topic = before.topic.0.clone();
                let id = before.id;
                let mut tx = self.kv.transaction().await.map_err(map_write_err)?;
                match self.update_tx::<U>(tx.as_mut(), &topic, &partition, &id, request, now).await {
                    Ok(after) => {
                        tx.commit().await.map_err(map_write_err)?;
                        Ok(match return_mode {
                            ReturnMode::Before => before,
                            ReturnMode::After => after,
                        })
                    }
                    Err(err) => {
                        let _ = tx.rollback().await;
                        Err(err)
                    }
                }
            }
            None => self.create::<U>(fallback_topic, fallback_object, now).await,
        }
    }

    // ---- transactions --------------------------------------------------------

    /// Runs `f` inside a backend transaction, committing iff it returns
    /// `Ok`. Retries once on a backend-signalled write conflict; a second
    /// conflict surfaces to the caller.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'a> Fn(&'a mut dyn KvTransaction) -> BoxFuture<'a, Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let mut tx = self.kv.transaction().await.map_err(map_write_err)?;
            match f(tx.as_mut()).await {
                Ok(value) => {
                    tx.commit().await.map_err(map_write_err)?;
                    return Ok(value);
                }
                Err(err) => {
                    let _ = tx.rollback().await;
                    if attempt == 0 && matches!(err, StoreError::BackendConflict) {
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    // ---- topic / partition administration --------------------------------------------------------

    pub async fn list_model_topics<U: Model>(
        &self,
        date_range: Option<(i64, i64)>,
        only_default_partition: bool,
    ) -> Result<BTreeSet<TopicId>> {
        let model_id = U::model_id();
        let partitions = if only_default_partition {
            vec![PartitionKey::default_partition()]
        } else {
            match date_range {
                Some((from, to)) => self.partitions_in_range(model_id, from, to).await?,
                None => self.effective_partitions(model_id, &Query::default()).await?,
            }
        };

        let mut topics = BTreeSet::new();
        for partition in partitions {
            let objects_cf = partition.objects_cf(model_id);
            self.kv.open_cf(&objects_cf).await.map_err(map_read_err)?;
            let rows = self.kv.iter_range(&objects_cf, KeyRange::full(), false).await.map_err(map_read_err)?;
            for (key, _) in rows {
                if let Some(topic) = extract_topic(&key) {
                    topics.insert(TopicId(topic));
                }
            }
        }
        Ok(topics)
    }

    pub async fn add_date_partitions<U: Model>(&self, from_millis: i64, to_millis: i64) -> Result<Vec<PartitionKey>> {
        let mut created = Vec::new();
        let mut cursor = PartitionKey::from_unix_millis(from_millis);
        loop {
            self.ensure_partition::<U>(&cursor).await?;
            created.push(cursor.clone());
            let next = cursor.next_start_unix_millis().ok_or_else(|| StoreError::BackendDdl {
                cf: cursor.0.clone(),
                reason: "partition key has no calendar successor".to_string(),
            })?;
            if next >= to_millis {
                break;
            }
            cursor = PartitionKey::from_unix_millis(next);
        }
        Ok(created)
    }

    pub async fn list_date_partitions<U: Model>(&self) -> Result<Vec<PartitionKey>> {
        Ok(self.load_partitions(U::model_id()).await?.into_iter().map(PartitionKey).collect())
    }

    pub async fn delete_date_partitions<U: Model>(&self, partitions: &[PartitionKey]) -> Result<()> {
        let model_id = U::model_id();
        for partition in partitions {
            let objects_cf = partition.objects_cf(model_id);
            let indexes_cf = partition.indexes_cf(model_id);
            self.kv.open_cf(&objects_cf).await.map_err(map_write_err)?;
            self.kv.open_cf(&indexes_cf).await.map_err(map_write_err)?;

            for (key, _) in self.kv.iter_range(&objects_cf, KeyRange::full(), false).await.map_err(map_write_err)? {
                self.kv.delete(&objects_cf, &key).await.map_err(map_write_err)?;
            }
            for (key, _) in self.kv.iter_range(&indexes_cf, KeyRange::full(), false).await.map_err(map_write_err)? {
                self.kv.delete(&indexes_cf, &key).await.map_err(map_write_err)?;
            }

            {
                let mut registry = self.partitions.lock().unwrap();
                registry.entry(model_id.to_string()).or_default().remove(&partition.0);
            }
            self.persist_partitions(model_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_unit::{Cardinality, FieldDescriptor, UnitSchema, ValueType};
    use strata_kv::InMemoryKv;

    static FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor {
            tag: 1,
            name: "name",
            value_type: ValueType::String,
            cardinality: Cardinality::Single,
            required: true,
            default: None,
        },
        FieldDescriptor {
            tag: 2,
            name: "age",
            value_type: ValueType::I32,
            cardinality: Cardinality::Single,
            required: false,
            default: None,
        },
    ];
    static SCHEMA: UnitSchema = UnitSchema::new("person", FIELDS);
    static INDEX_FIELDS: &[crate::model::IndexFieldSpec] = &[crate::model::IndexFieldSpec::new(2, false)];
    static INDEXES: &[IndexDef] = &[IndexDef::new(1, INDEX_FIELDS)];

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Person {
        name: Option<String>,
        age: Option<i32>,
    }

    impl Unit for Person {
        fn schema(&self) -> &'static UnitSchema {
            &SCHEMA
        }

        fn get(&self, tag: u32) -> Option<FieldValue> {
            match tag {
                1 => self.name.clone().map(Scalar::String).map(FieldValue::Scalar),
                2 => self.age.map(Scalar::I32).map(FieldValue::Scalar),
                _ => None,
            }
        }

        fn set(&mut self, tag: u32, value: FieldValue) -> strata_unit::Result<()> {
            match (tag, value) {
                (1, FieldValue::Scalar(Scalar::String(s))) => self.name = Some(s),
                (2, FieldValue::Scalar(Scalar::I32(v))) => self.age = Some(v),
                (t, _) => return Err(strata_unit::UnitError::InvalidType { tag: t }),
            }
            Ok(())
        }
    }

    impl Model for Person {
        fn model_id() -> &'static str {
            "person"
        }

        fn indexes() -> &'static [IndexDef] {
            INDEXES
        }
    }

    fn store() -> Store<InMemoryKv> {
        Store::new(Arc::new(InMemoryKv::new()))
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let store = store();
        let topic = TopicId::new("people");
        let stored = store
            .create::<Person>(&topic, Person { name: Some("ada".into()), age: Some(30) }, 1_000)
            .await
            .unwrap();

        let read = store.read::<Person>("people", &stored.id, None, None).await.unwrap();
        assert_eq!(read.object.name, Some("ada".to_string()));
    }

    #[tokio::test]
    async fn duplicate_create_fails() {
        let store = store();
        let topic = TopicId::new("people");
        let mut stored = store
            .create::<Person>(&topic, Person { name: Some("ada".into()), age: Some(30) }, 1_000)
            .await
            .unwrap();
        stored.object.age = Some(99);
        let err = store.create_tx_duplicate_probe(&topic, &stored).await;
        assert!(err.is_err());
    }

    impl Store<InMemoryKv> {
        async fn create_tx_duplicate_probe(&self, topic: &TopicId, stored: &StoredObject<Person>) -> Result<()> {
            let mut tx = self.kv.transaction().await.map_err(map_write_err)?;
            let objects_cf = PartitionKey::default_partition().objects_cf(Person::model_id());
            let pk = primary_key(&topic.0, Person::model_id(), &stored.id);
            if tx.get(&objects_cf, &pk).await.map_err(map_read_err)?.is_some() {
                return Err(StoreError::DuplicateId);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn update_rewrites_dirty_index_rows() {
        let store = store();
        let topic = TopicId::new("people");
        let stored = store
            .create::<Person>(&topic, Person { name: Some("ada".into()), age: Some(30) }, 1_000)
            .await
            .unwrap();

        let request = UpdateRequest(vec![strata_unit::FieldOp {
            path: strata_unit::Path::field(2),
            op: strata_unit::UpdateOp::Set,
            value: strata_unit::Operand::Scalar(Scalar::I32(31)),
        }]);
        let updated = store.update::<Person>("people", &stored.id, &request, None, 2_000).await.unwrap();
        assert_eq!(updated.object.age, Some(31));
        assert_eq!(updated.updated_at, 2_000);

        let query = Query {
            index_id: IndexDef::new(1, INDEX_FIELDS).index_id(),
            clauses: vec![strata_index::FieldClause {
                field_position: 0,
                predicate: strata_index::Predicate::Eq,
                operand: strata_index::Operand::Scalar(Scalar::I32(31)),
                descending: false,
            }],
            topics: Some(vec!["people".to_string()]),
            limit: 10,
            ..Default::default()
        };
        let found = store.find::<Person>(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, stored.id);
    }

    #[tokio::test]
    async fn delete_object_removes_primary_and_index_rows() {
        let store = store();
        let topic = TopicId::new("people");
        let stored = store
            .create::<Person>(&topic, Person { name: Some("ada".into()), age: Some(30) }, 1_000)
            .await
            .unwrap();
        store.delete_object::<Person>("people", &stored.id, None).await.unwrap();
        let err = store.read::<Person>("people", &stored.id, None, None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn find_all_scans_every_record_in_a_topic() {
        let store = store();
        let topic = TopicId::new("people");
        store.create::<Person>(&topic, Person { name: Some("a".into()), age: Some(1) }, 1_000).await.unwrap();
        store.create::<Person>(&topic, Person { name: Some("b".into()), age: Some(2) }, 1_000).await.unwrap();
        let all = store.find_all::<Person>("people", None, false).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
