//! Asynchronous authorization engine: relation/role/family resolution with
//! subject- and object-hierarchy traversal and an optional cache.

mod cache;
mod checker;
mod error;
mod hierarchy;
mod mac;
mod operation;
mod tables;

pub use cache::{AclCache, CacheKey, CacheState, InMemoryAclCache, NoCache};
pub use checker::{AccessChecker, CheckResult};
pub use error::{AclError, Result};
pub use hierarchy::{NoHierarchy, ObjectHierarchy, SubjectHierarchy};
pub use mac::{MacBackend, MacError};
pub use operation::{AclObject, HierarchyItem, Operation, Subject};
pub use tables::{AclOpFamilyAccess, AclRelation, AclRoleOperation};
