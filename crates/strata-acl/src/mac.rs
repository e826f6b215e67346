//! Mandatory access control pre-check, consulted before
//! any relation/role resolution when a MAC backend is configured.

use async_trait::async_trait;

use crate::operation::{AclObject, Operation, Subject};

/// What the MAC backend decided, short of a silent pass-through.
#[derive(Debug, Clone)]
pub enum MacError {
    /// MAC forbids this check outright; the call resolves to `Deny`.
    Forbidden(String),
    /// MAC could not decide; the call resolves to `Unknown` with this error.
    Other(String),
}

#[async_trait]
pub trait MacBackend: Send + Sync {
    async fn check(&self, subject: &Subject, object: &AclObject, operation: &Operation) -> Result<(), MacError>;
}
