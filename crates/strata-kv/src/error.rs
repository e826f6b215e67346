//! Error types for the KV backend adapter.

use thiserror::Error;

/// Errors raised by an [`crate::traits::OrderedKv`] implementation.
#[derive(Error, Debug)]
pub enum KvError {
    /// The backend could not be reached or authenticated against.
    #[error("kv connection failed: {0}")]
    Connection(String),

    /// A query or statement against the backend failed.
    #[error("kv query failed: {0}")]
    Query(String),

    /// A write lost a race with a concurrent writer to the same key.
    /// [`crate::traits::OrderedKv::is_conflict`] matches on this variant.
    #[error("write conflict on key in column family '{cf}'")]
    Conflict { cf: String },

    /// A column family or its backing schema could not be created.
    #[error("ddl failed for column family '{cf}': {reason}")]
    Ddl { cf: String, reason: String },

    /// The requested key does not exist.
    #[error("key not found in column family '{cf}'")]
    NotFound { cf: String },
}

/// Result type for KV backend operations.
pub type Result<T> = std::result::Result<T, KvError>;

impl From<surrealdb::Error> for KvError {
    fn from(err: surrealdb::Error) -> Self {
        KvError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for KvError {
    fn from(err: serde_json::Error) -> Self {
        KvError::Query(err.to_string())
    }
}
