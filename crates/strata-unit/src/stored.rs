//! A unit wrapped with the envelope fields every stored record carries:
//! identity, lifecycle timestamps, optional TTL, and the topic it lives
//! in.

use crate::object_id::ObjectId;
use crate::unit::Unit;

/// Identifies the logical stream/tenant a stored object belongs to. Topics
/// route both document-store partitioning and the producer queue's
/// per-topic worker assignment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicId(pub String);

impl TopicId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TopicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A [`Unit`] plus the envelope the document store and producer queue rely
/// on: identity, lifecycle timestamps (milliseconds since the Unix epoch),
/// optional expiry, and topic membership.
#[derive(Debug)]
pub struct StoredObject<U: Unit> {
    pub id: ObjectId,
    pub created_at: i64,
    pub updated_at: i64,
    pub expire_at: Option<i64>,
    pub topic: TopicId,
    pub object: U,
}

impl<U: Unit> StoredObject<U> {
    pub fn new(topic: TopicId, object: U, now_millis: i64) -> Self {
        Self {
            id: ObjectId::generate(),
            created_at: now_millis,
            updated_at: now_millis,
            expire_at: None,
            topic,
            object,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64, now_millis: i64) -> Self {
        if ttl_seconds > 0 {
            self.expire_at = Some(now_millis + ttl_seconds as i64 * 1000);
        }
        self
    }

    /// True when `now_millis` has passed this object's expiry marker.
    /// Expired rows never surface through `find`/`read`.
    pub fn is_expired(&self, now_millis: i64) -> bool {
        matches!(self.expire_at, Some(deadline) if now_millis >= deadline)
    }

    pub fn touch(&mut self, now_millis: i64) {
        self.updated_at = now_millis;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::schema::UnitSchema;
    use crate::unit::FieldValue;
    use crate::value::{Cardinality, FieldDescriptor, ValueType};

    static FIELDS: &[FieldDescriptor] = &[FieldDescriptor {
        tag: 1,
        name: "name",
        value_type: ValueType::String,
        cardinality: Cardinality::Single,
        required: false,
        default: None,
    }];
    static SCHEMA: UnitSchema = UnitSchema::new("note", FIELDS);

    #[derive(Debug, Default)]
    struct Note {
        name: Option<String>,
    }

    impl Unit for Note {
        fn schema(&self) -> &'static UnitSchema {
            &SCHEMA
        }

        fn get(&self, tag: u32) -> Option<FieldValue> {
            match tag {
                1 => self.name.clone().map(crate::value::Scalar::String).map(FieldValue::Scalar),
                _ => None,
            }
        }

        fn set(&mut self, _tag: u32, _value: FieldValue) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn ttl_of_zero_means_no_expiry() {
        let stored = StoredObject::new(TopicId::new("notes"), Note::default(), 1_000).with_ttl(0, 1_000);
        assert_eq!(stored.expire_at, None);
        assert!(!stored.is_expired(i64::MAX));
    }

    #[test]
    fn expiry_marker_is_checked_against_now() {
        let stored = StoredObject::new(TopicId::new("notes"), Note::default(), 1_000).with_ttl(10, 1_000);
        assert!(!stored.is_expired(10_999));
        assert!(stored.is_expired(11_000));
    }
}
