//! Subject and object hierarchies, consulted as external interfaces
//! so traversal never hard-codes how a
//! deployment's org chart or object containment is shaped.

use async_trait::async_trait;

use crate::error::Result;
use crate::operation::{AclObject, Subject};

/// Supplies the parents of a subject for step 6 traversal.
#[async_trait]
pub trait SubjectHierarchy: Send + Sync {
    async fn parents(&self, subject: &Subject) -> Result<Vec<Subject>>;
}

/// Supplies the parents of an object for step 7 traversal.
#[async_trait]
pub trait ObjectHierarchy: Send + Sync {
    async fn parents(&self, object: &AclObject) -> Result<Vec<AclObject>>;
}

/// A subject or object with no parents; traversal steps 6/7 become no-ops.
pub struct NoHierarchy;

#[async_trait]
impl SubjectHierarchy for NoHierarchy {
    async fn parents(&self, _subject: &Subject) -> Result<Vec<Subject>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl ObjectHierarchy for NoHierarchy {
    async fn parents(&self, _object: &AclObject) -> Result<Vec<AclObject>> {
        Ok(Vec::new())
    }
}
