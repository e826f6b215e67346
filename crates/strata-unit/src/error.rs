//! Error types for the data-unit model.

use thiserror::Error;

/// Errors raised while building, encoding, decoding, or path-addressing a
/// [`crate::unit::Unit`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UnitError {
    #[error("required field {name} (tag {tag}) is missing")]
    FieldRequiredMissing { tag: u32, name: &'static str },

    #[error("field {tag} has the wrong type for this operation")]
    InvalidType { tag: u32 },

    #[error("failed to serialize field {tag}: {reason}")]
    SerializeFailed { tag: u32, reason: String },

    #[error("failed to parse wire data: {0}")]
    ParseFailed(String),

    #[error("path does not resolve to an existing field: {0}")]
    PathNotFound(String),

    #[error("operator is not supported for this field's type")]
    UnsupportedOperator,

    #[error("cannot apply a default value to a nested-unit field")]
    DefaultOnNested,

    #[error("cannot apply a default value to a repeated field")]
    DefaultOnRepeated,

    #[error("schema is malformed: {0}")]
    SchemaInvalid(String),
}

/// Result type for strata-unit operations.
pub type Result<T> = std::result::Result<T, UnitError>;
