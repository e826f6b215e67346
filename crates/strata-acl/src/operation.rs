//! The descriptors a `check` call is framed in terms of.

use strata_unit::ObjectId;

/// A named operation with a family pointer and an access bitmask, consulted
/// by the role-operation and operation-family resolution steps.
#[derive(Debug, Clone, Copy)]
pub struct Operation {
    pub name: &'static str,
    pub family: &'static str,
    pub access_mask: u32,
}

impl Operation {
    pub const fn new(name: &'static str, family: &'static str, access_mask: u32) -> Self {
        Self { name, family, access_mask }
    }
}

/// One node in a subject or object hierarchy: an id, its parent (if any),
/// and the model id of the topic it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyItem {
    pub id: ObjectId,
    pub parent_id: Option<ObjectId>,
    pub topic_model: &'static str,
}

/// The subject side of a check: who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub id: ObjectId,
}

impl Subject {
    pub fn new(id: ObjectId) -> Self {
        Self { id }
    }
}

/// The object side of a check: what is being accessed, plus the topic scope
/// relation rows are looked up in and this object model's id (part of the
/// cache key `(object-model, object-id, subject-id, operation-name)`).
#[derive(Debug, Clone)]
pub struct AclObject {
    pub id: ObjectId,
    pub model_id: &'static str,
    pub topic: String,
    /// Set when `id` is itself a topic descriptor with a parent topic; the
    /// checker starts resolution from the parent instead.
    pub topic_parent: Option<ObjectId>,
}

impl AclObject {
    pub fn new(id: ObjectId, model_id: &'static str, topic: impl Into<String>) -> Self {
        Self { id, model_id, topic: topic.into(), topic_parent: None }
    }

    pub fn with_topic_parent(mut self, parent: ObjectId) -> Self {
        self.topic_parent = Some(parent);
        self
    }
}
