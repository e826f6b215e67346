//! Producer-queue errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("a message for object id {0} is already queued for this producer")]
    DuplicateObjectId(String),

    #[error("store error: {0}")]
    Store(#[from] strata_db::StoreError),

    #[error("unit error: {0}")]
    Unit(#[from] strata_unit::UnitError),

    #[error("queue worker unavailable: {0}")]
    Task(#[from] strata_task::TaskError),
}

pub type Result<T> = std::result::Result<T, QueueError>;
