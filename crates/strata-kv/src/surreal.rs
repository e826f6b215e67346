//! SurrealDB-backed [`OrderedKv`] implementation.
//!
//! Each `(kind, partition)` column family maps to one
//! SurrealDB table. A row's key is stored both as its record id (hex
//! encoded, so ids stay valid SurrealQL identifiers) and as a plain
//! `key_hex` field, since range scans filter and sort on the field rather
//! than parsing ids back out of `RecordId`. Hex encoding is
//! order-preserving: each byte becomes two lowercase hex digits, and `'0'`
//! through `'9'` sort below `'a'` through `'f'` in ASCII, so two hex
//! strings compare in the same order as the byte strings they encode.

use std::collections::HashMap;
use std::ops::Bound;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::{KvError, Result};
use crate::traits::{
    BatchOp, CompactionFilter, KeyRange, KvSnapshot, KvTransaction, OrderedKv, OwnedSnapshot,
};

/// Connection settings for [`SurrealKv::connect`].
#[derive(Debug, Clone)]
pub struct SurrealConfig {
    /// `"memory"` for an in-process ephemeral store, or a `surrealkv://`
    /// path for on-disk persistence.
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
}

impl Default for SurrealConfig {
    fn default() -> Self {
        Self {
            endpoint: "memory".to_string(),
            namespace: "strata".to_string(),
            database: "strata".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Row {
    key_hex: String,
    value: Vec<u8>,
}

/// The concrete `OrderedKv` backend used outside of tests.
pub struct SurrealKv {
    db: Surreal<Any>,
    known_tables: Mutex<std::collections::HashSet<String>>,
    compaction_filters: Mutex<HashMap<String, CompactionFilter>>,
}

impl SurrealKv {
    /// Connect and initialize the system table. Safe to call more
    /// than once against the same endpoint; table creation is idempotent.
    #[instrument(skip_all, fields(endpoint = %config.endpoint))]
    pub async fn connect(config: SurrealConfig) -> Result<Self> {
        info!("connecting to SurrealDB KV backend");

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| KvError::Connection(e.to_string()))?;

        let backend = Self {
            db,
            known_tables: Mutex::new(std::collections::HashSet::new()),
            compaction_filters: Mutex::new(HashMap::new()),
        };
        backend.init_system_table().await?;
        info!("SurrealDB KV backend ready");
        Ok(backend)
    }

    async fn init_system_table(&self) -> Result<()> {
        debug!("initializing kv system table");
        self.db
            .query(
                "DEFINE TABLE system SCHEMALESS;
                 DEFINE FIELD key_hex ON system TYPE string;
                 DEFINE FIELD value ON system TYPE bytes;
                 DEFINE INDEX idx_system_key ON system FIELDS key_hex UNIQUE;",
            )
            .await
            .map_err(|e| KvError::Ddl {
                cf: "system".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn table_name(cf: &str) -> String {
        cf.replace("::", "__")
    }

    async fn ensure_table(&self, table: &str) -> Result<()> {
        if self.known_tables.lock().unwrap().contains(table) {
            return Ok(());
        }
        let ddl = format!(
            "DEFINE TABLE {table} SCHEMALESS;
             DEFINE FIELD key_hex ON {table} TYPE string;
             DEFINE FIELD value ON {table} TYPE bytes;
             DEFINE INDEX idx_{table}_key ON {table} FIELDS key_hex UNIQUE;"
        );
        self.db.query(ddl).await.map_err(|e| KvError::Ddl {
            cf: table.to_string(),
            reason: e.to_string(),
        })?;
        self.known_tables.lock().unwrap().insert(table.to_string());
        Ok(())
    }
}

#[async_trait]
impl OrderedKv for SurrealKv {
    #[instrument(skip(self))]
    async fn open_cf(&self, cf: &str) -> Result<()> {
        self.ensure_table(&Self::table_name(cf)).await
    }

    #[instrument(skip(self, key))]
    async fn get(&self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = Self::table_name(cf);
        self.ensure_table(&table).await?;
        let key_hex = hex::encode(key);

        let mut result = self
            .db
            .query(format!("SELECT value FROM {table} WHERE key_hex = $key_hex"))
            .bind(("key_hex", key_hex))
            .await?;
        let rows: Vec<Row> = result.take(0)?;
        Ok(rows.into_iter().next().map(|r| r.value))
    }

    #[instrument(skip(self, key, value))]
    async fn put(&self, cf: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let table = Self::table_name(cf);
        self.ensure_table(&table).await?;
        let key_hex = hex::encode(key);

        self.db
            .query("UPSERT type::thing($tb, $id) SET key_hex = $key_hex, value = $value")
            .bind(("tb", table))
            .bind(("id", key_hex.clone()))
            .bind(("key_hex", key_hex))
            .bind(("value", value.to_vec()))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, key))]
    async fn delete(&self, cf: &str, key: &[u8]) -> Result<()> {
        let table = Self::table_name(cf);
        self.ensure_table(&table).await?;
        let key_hex = hex::encode(key);

        self.db
            .query("DELETE type::thing($tb, $id)")
            .bind(("tb", table))
            .bind(("id", key_hex))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, range))]
    async fn iter_range(
        &self,
        cf: &str,
        range: KeyRange,
        descending: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let table = Self::table_name(cf);
        self.ensure_table(&table).await?;

        let mut clauses = Vec::new();
        let mut sql = format!("SELECT key_hex, value FROM {table}");
        let mut bind_lo = None;
        let mut bind_hi = None;

        match range.lower {
            Bound::Included(k) => {
                clauses.push("key_hex >= $lo".to_string());
                bind_lo = Some(hex::encode(k));
            }
            Bound::Excluded(k) => {
                clauses.push("key_hex > $lo".to_string());
                bind_lo = Some(hex::encode(k));
            }
            Bound::Unbounded => {}
        }
        match range.upper {
            Bound::Included(k) => {
                clauses.push("key_hex <= $hi".to_string());
                bind_hi = Some(hex::encode(k));
            }
            Bound::Excluded(k) => {
                clauses.push("key_hex < $hi".to_string());
                bind_hi = Some(hex::encode(k));
            }
            Bound::Unbounded => {}
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY key_hex ");
        sql.push_str(if descending { "DESC" } else { "ASC" });

        let mut query = self.db.query(sql);
        if let Some(lo) = bind_lo {
            query = query.bind(("lo", lo));
        }
        if let Some(hi) = bind_hi {
            query = query.bind(("hi", hi));
        }

        let mut result = query.await?;
        let rows: Vec<Row> = result.take(0)?;
        rows.into_iter()
            .map(|r| {
                hex::decode(&r.key_hex)
                    .map(|key| (key, r.value))
                    .map_err(|e| KvError::Query(format!("corrupt key_hex '{}': {e}", r.key_hex)))
            })
            .collect()
    }

    #[instrument(skip(self, ops))]
    async fn write_batch(&self, cf: &str, ops: Vec<BatchOp>) -> Result<()> {
        let mut txn = self.transaction().await?;
        for op in ops {
            match op {
                BatchOp::Put(key, value) => txn.put(cf, &key, &value).await?,
                BatchOp::Delete(key) => txn.delete(cf, &key).await?,
            }
        }
        txn.commit().await
    }

    /// One `SELECT` of the whole table inside a single statement is the
    /// consistent pass SurrealDB offers without a native snapshot handle;
    /// the materialized rows then serve every read of the snapshot.
    #[instrument(skip(self))]
    async fn snapshot(&self, cf: &str) -> Result<Box<dyn KvSnapshot>> {
        let rows = self.iter_range(cf, KeyRange::full(), false).await?;
        Ok(Box::new(OwnedSnapshot::new(rows.into_iter().collect())))
    }

    #[instrument(skip(self))]
    async fn transaction(&self) -> Result<Box<dyn KvTransaction>> {
        self.db
            .query("BEGIN TRANSACTION")
            .await
            .map_err(|e| KvError::Query(e.to_string()))?;
        Ok(Box::new(SurrealTransaction {
            db: self.db.clone(),
            finished: false,
        }))
    }

    fn register_compaction_filter(&self, cf: &str, filter: CompactionFilter) -> Result<()> {
        self.compaction_filters
            .lock()
            .unwrap()
            .insert(Self::table_name(cf), filter);
        Ok(())
    }
}

struct SurrealTransaction {
    db: Surreal<Any>,
    finished: bool,
}

#[async_trait]
impl KvTransaction for SurrealTransaction {
    async fn get(&mut self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = SurrealKv::table_name(cf);
        let key_hex = hex::encode(key);
        let mut result = self
            .db
            .query(format!("SELECT value FROM {table} WHERE key_hex = $key_hex"))
            .bind(("key_hex", key_hex))
            .await?;
        let rows: Vec<Row> = result.take(0)?;
        Ok(rows.into_iter().next().map(|r| r.value))
    }

    async fn for_update_get(&mut self, cf: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        // SurrealDB's transactions already serialize writers against rows
        // they've read within `BEGIN ... COMMIT`, so a plain read inside
        // the open transaction provides the same guarantee a dedicated
        // "select for update" statement would.
        self.get(cf, key).await
    }

    async fn put(&mut self, cf: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let table = SurrealKv::table_name(cf);
        let key_hex = hex::encode(key);
        self.db
            .query("UPSERT type::thing($tb, $id) SET key_hex = $key_hex, value = $value")
            .bind(("tb", table))
            .bind(("id", key_hex.clone()))
            .bind(("key_hex", key_hex))
            .bind(("value", value.to_vec()))
            .await?;
        Ok(())
    }

    async fn delete(&mut self, cf: &str, key: &[u8]) -> Result<()> {
        let table = SurrealKv::table_name(cf);
        let key_hex = hex::encode(key);
        self.db
            .query("DELETE type::thing($tb, $id)")
            .bind(("tb", table))
            .bind(("id", key_hex))
            .await?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.db
            .query("COMMIT TRANSACTION")
            .await
            .map_err(|e| KvError::Conflict { cf: e.to_string() })?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.db
            .query("CANCEL TRANSACTION")
            .await
            .map_err(|e| KvError::Query(e.to_string()))?;
        Ok(())
    }
}

impl Drop for SurrealTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("kv transaction dropped without commit or rollback");
        }
    }
}
