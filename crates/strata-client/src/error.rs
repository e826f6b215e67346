//! Errors crossing the worker-thread boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("store error: {0}")]
    Store(#[from] strata_db::StoreError),

    #[error("worker queue closed")]
    QueueClosed,

    #[error("operation cancelled before its continuation ran")]
    Cancelled,

    #[error("no backend registered for topic '{0}'")]
    UnroutedTopic(String),
}

impl From<strata_task::TaskError> for ClientError {
    fn from(_: strata_task::TaskError) -> Self {
        ClientError::QueueClosed
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
