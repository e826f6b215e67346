//! Access-checker errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AclError {
    #[error("mandatory access control forbade this check: {0}")]
    MacForbidden(String),

    #[error("access denied")]
    AccessDenied,

    #[error("backend read error: {0}")]
    BackendRead(String),

    #[error("check cancelled")]
    Cancelled,
}

impl From<strata_client::ClientError> for AclError {
    fn from(err: strata_client::ClientError) -> Self {
        AclError::BackendRead(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AclError>;
