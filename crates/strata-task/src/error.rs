//! Error types for strata-task.

use thiserror::Error;

/// Errors raised by the task runtime.
#[derive(Error, Debug)]
pub enum TaskError {
    /// A task was posted to a queue whose worker thread has already shut
    /// down.
    #[error("task queue closed")]
    QueueClosed,

    /// A worker thread panicked while running a posted task.
    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// A topic has no mapped worker and the router has no default.
    #[error("no worker mapped for topic '{0}'")]
    UnmappedTopic(String),

    /// Configuration was invalid.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),
}

/// Result type for strata-task operations.
pub type Result<T> = std::result::Result<T, TaskError>;
