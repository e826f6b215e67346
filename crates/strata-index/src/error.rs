//! Errors for index-key construction and query execution.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("backend range read failed: {0}")]
    BackendRead(String),

    #[error("invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("unsupported ordering: {0}")]
    UnsupportedOrdering(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
