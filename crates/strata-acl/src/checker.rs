//! The resolution algorithm itself: cache, MAC pre-check,
//! relation/role/family lookup, then subject- and object-hierarchy appeal.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use strata_client::AsyncClient;
use strata_db::Model;
use strata_index::{FieldClause, Operand as IndexOperand, Predicate, Query};
use strata_kv::OrderedKv;
use strata_unit::{Scalar, TopicId};

use crate::cache::{AclCache, CacheKey, CacheState};
use crate::error::{AclError, Result};
use crate::hierarchy::{ObjectHierarchy, SubjectHierarchy};
use crate::mac::MacBackend;
use crate::operation::{AclObject, Operation, Subject};
use crate::tables::{AclOpFamilyAccess, AclRelation, AclRoleOperation};

/// The tri-state a resolution step settles on, distinct from [`CacheState`]
/// in that `Unknown` carries the error that prevented a decision.
#[derive(Debug)]
pub enum CheckResult {
    Grant,
    Deny,
    Unknown(AclError),
}

impl CheckResult {
    pub fn into_result(self) -> Result<()> {
        match self {
            CheckResult::Grant => Ok(()),
            CheckResult::Deny => Err(AclError::AccessDenied),
            CheckResult::Unknown(err) => Err(err),
        }
    }

    fn cache_state(&self) -> Option<CacheState> {
        match self {
            CheckResult::Grant => Some(CacheState::Grant),
            CheckResult::Deny => Some(CacheState::Deny),
            CheckResult::Unknown(_) => None,
        }
    }
}

/// Resolves `check(subject, object, operation)`, dispatching every lookup
/// through the document store's async client so traversal runs on the
/// thread mapped to each object's topic.
pub struct AccessChecker<K: OrderedKv + 'static> {
    client: Arc<AsyncClient<K>>,
    acl_topic: TopicId,
    cache: Arc<dyn AclCache>,
    mac: Option<Arc<dyn MacBackend>>,
    subject_hierarchy: Arc<dyn SubjectHierarchy>,
    object_hierarchy: Arc<dyn ObjectHierarchy>,
    cancelled: Arc<AtomicBool>,
}

impl<K: OrderedKv + 'static> AccessChecker<K> {
    /// `acl_topic` is where the global `acl_role_operation` and
    /// `acl_op_family_access` tables live; `acl_relation` rows are looked up
    /// in the object's own topic.
    pub fn new(
        client: Arc<AsyncClient<K>>,
        acl_topic: TopicId,
        cache: Arc<dyn AclCache>,
        mac: Option<Arc<dyn MacBackend>>,
        subject_hierarchy: Arc<dyn SubjectHierarchy>,
        object_hierarchy: Arc<dyn ObjectHierarchy>,
    ) -> Self {
        Self {
            client,
            acl_topic,
            cache,
            mac,
            subject_hierarchy,
            object_hierarchy,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Terminates any in-flight traversal at its next recursion boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub async fn invalidate(&self, object_id: strata_unit::ObjectId, subject_id: strata_unit::ObjectId) {
        self.cache.invalidate(object_id, subject_id).await;
    }

    /// Entry point. `object` may be a topic descriptor: if it carries a
    /// `topic_parent`, resolution starts from that parent instead.
    pub fn check(&self, subject: Subject, object: AclObject, operation: Operation) -> BoxFuture<'_, CheckResult> {
        Box::pin(async move {
            if self.cancelled.load(Ordering::SeqCst) {
                return CheckResult::Unknown(AclError::Cancelled);
            }
            let object = match object.topic_parent {
                Some(parent) => AclObject { id: parent, topic_parent: None, ..object },
                None => object,
            };
            self.check_inner(subject, object, operation).await
        })
    }

    async fn check_inner(&self, subject: Subject, object: AclObject, operation: Operation) -> CheckResult {
        let cache_key = CacheKey {
            object_model: object.model_id,
            object_id: object.id,
            subject_id: subject.id,
            operation: operation.name,
        };

        match self.cache.get(&cache_key).await {
            CacheState::Grant => return CheckResult::Grant,
            CacheState::Deny => return CheckResult::Deny,
            CacheState::Unknown => {}
        }

        let result = self.resolve(subject, object, operation).await;
        if let Some(state) = result.cache_state() {
            self.cache.put(cache_key, state).await;
        }
        result
    }

    async fn resolve(&self, subject: Subject, object: AclObject, operation: Operation) -> CheckResult {
        if let Some(mac) = &self.mac {
            match mac.check(&subject, &object, &operation).await {
                Ok(()) => {}
                Err(crate::mac::MacError::Forbidden(reason)) => {
                    tracing::debug!(reason = %reason, "mac forbade check");
                    return CheckResult::Deny;
                }
                Err(crate::mac::MacError::Other(reason)) => {
                    return CheckResult::Unknown(AclError::BackendRead(reason));
                }
            }
        }

        let roles = match self.relation_roles(&object, &subject).await {
            Ok(roles) => roles,
            Err(err) => return CheckResult::Unknown(err),
        };

        if !roles.is_empty() {
            match self.role_operation_grant(&roles, operation).await {
                Ok(Some(true)) => return CheckResult::Grant,
                Ok(Some(false)) => {}
                Ok(None) => match self.op_family_grant(&roles, operation).await {
                    Ok(true) => return CheckResult::Grant,
                    Ok(false) => {}
                    Err(err) => return CheckResult::Unknown(err),
                },
                Err(err) => return CheckResult::Unknown(err),
            }
        }

        let parents = match self.subject_hierarchy.parents(&subject).await {
            Ok(parents) => parents,
            Err(err) => return CheckResult::Unknown(err),
        };
        for parent in parents {
            if self.cancelled.load(Ordering::SeqCst) {
                return CheckResult::Unknown(AclError::Cancelled);
            }
            match self.check(parent, object.clone(), operation).await {
                CheckResult::Grant => return CheckResult::Grant,
                CheckResult::Unknown(err) => return CheckResult::Unknown(err),
                CheckResult::Deny => continue,
            }
        }

        let object_parents = match self.object_hierarchy.parents(&object).await {
            Ok(parents) => parents,
            Err(err) => return CheckResult::Unknown(err),
        };
        for parent in object_parents {
            if self.cancelled.load(Ordering::SeqCst) {
                return CheckResult::Unknown(AclError::Cancelled);
            }
            match self.check(subject, parent, operation).await {
                CheckResult::Grant => return CheckResult::Grant,
                CheckResult::Unknown(err) => return CheckResult::Unknown(err),
                CheckResult::Deny => break,
            }
        }

        CheckResult::Deny
    }

    async fn relation_roles(&self, object: &AclObject, subject: &Subject) -> Result<Vec<String>> {
        let index_id = AclRelation::indexes()[0].index_id();
        let query = Query {
            index_id,
            clauses: vec![
                FieldClause { field_position: 0, predicate: Predicate::Eq, operand: IndexOperand::Scalar(Scalar::ObjectId(object.id)), descending: false },
                FieldClause { field_position: 1, predicate: Predicate::Eq, operand: IndexOperand::Scalar(Scalar::ObjectId(subject.id)), descending: false },
            ],
            topics: Some(vec![object.topic.clone()]),
            ..Default::default()
        };
        let rows = self.client.find::<AclRelation>(query).await?;
        let roles: BTreeSet<String> = rows.into_iter().filter_map(|r| r.object.role).collect();
        Ok(roles.into_iter().collect())
    }

    /// `Ok(Some(true))` a grant was found, `Ok(Some(false))` every matching
    /// row denied, `Ok(None)` no row matched at all (fall through to the
    /// operation-family lookup).
    async fn role_operation_grant(&self, roles: &[String], operation: Operation) -> Result<Option<bool>> {
        let index_id = AclRoleOperation::indexes()[0].index_id();
        let query = Query {
            index_id,
            clauses: vec![
                FieldClause { field_position: 0, predicate: Predicate::In, operand: IndexOperand::Vector(roles.iter().cloned().map(Scalar::String).collect()), descending: false },
                FieldClause { field_position: 1, predicate: Predicate::Eq, operand: IndexOperand::Scalar(Scalar::String(operation.name.to_string())), descending: false },
            ],
            topics: Some(vec![self.acl_topic.0.clone()]),
            ..Default::default()
        };
        let rows = self.client.find::<AclRoleOperation>(query).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.iter().any(|r| r.object.grant)))
    }

    async fn op_family_grant(&self, roles: &[String], operation: Operation) -> Result<bool> {
        let index_id = AclOpFamilyAccess::indexes()[0].index_id();
        let query = Query {
            index_id,
            clauses: vec![
                FieldClause { field_position: 0, predicate: Predicate::In, operand: IndexOperand::Vector(roles.iter().cloned().map(Scalar::String).collect()), descending: false },
                FieldClause { field_position: 1, predicate: Predicate::Eq, operand: IndexOperand::Scalar(Scalar::String(operation.family.to_string())), descending: false },
            ],
            topics: Some(vec![self.acl_topic.0.clone()]),
            ..Default::default()
        };
        let rows = self.client.find::<AclOpFamilyAccess>(query).await?;
        Ok(rows.iter().any(|r| r.object.access_mask & operation.access_mask != 0))
    }
}
