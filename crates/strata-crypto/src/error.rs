//! Errors a crypto plugin or its registry can surface. Algorithm failures
//! themselves belong to whatever plugin crate implements `CryptPlugin`; this
//! only names the shapes a caller needs to branch on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("no plugin registered implements cipher suite {0:?}")]
    UnsupportedSuite(String),

    #[error("key length mismatch for suite {suite}: expected {expected}, got {actual}")]
    KeyLength { suite: String, expected: usize, actual: usize },

    #[error("invalid crypto configuration: {0}")]
    InvalidConfig(String),

    #[error("no plugin registered under name {0:?}")]
    PluginNotFound(String),

    #[error("operation failed: {0}")]
    OperationFailed(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
