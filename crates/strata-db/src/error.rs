//! The document store's error taxonomy.

use thiserror::Error;

use strata_unit::UnitError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("an object with this id already exists")]
    DuplicateId,

    #[error("no partition covers the requested date")]
    PartitionMissing,

    #[error("object not found")]
    NotFound,

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("required field {name} (tag {tag}) is missing")]
    FieldRequiredMissing { tag: u32, name: &'static str },

    #[error("field tag {tag} has an incompatible value type")]
    InvalidType { tag: u32 },

    #[error("failed to serialize field {tag}: {reason}")]
    SerializeFailed { tag: u32, reason: String },

    #[error("failed to parse stored bytes: {0}")]
    ParseFailed(String),

    #[error("backend read failed: {0}")]
    BackendRead(String),

    #[error("backend write failed: {0}")]
    BackendWrite(String),

    #[error("backend write conflict persisted after one retry")]
    BackendConflict,

    #[error("backend ddl failed for '{cf}': {reason}")]
    BackendDdl { cf: String, reason: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<UnitError> for StoreError {
    fn from(err: UnitError) -> Self {
        match err {
            UnitError::FieldRequiredMissing { tag, name } => StoreError::FieldRequiredMissing { tag, name },
            UnitError::InvalidType { tag } => StoreError::InvalidType { tag },
            UnitError::SerializeFailed { tag, reason } => StoreError::SerializeFailed { tag, reason },
            UnitError::ParseFailed(s) => StoreError::ParseFailed(s),
            other => StoreError::ValidationFailed(other.to_string()),
        }
    }
}

impl From<strata_index::IndexError> for StoreError {
    fn from(err: strata_index::IndexError) -> Self {
        StoreError::BackendRead(err.to_string())
    }
}
