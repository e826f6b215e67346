//! End-to-end scenarios over [`strata_db::Store`] with the in-memory
//! backend: create/read round trips, range and set predicates against a
//! secondary index, TTL expiry, and partition scoping.

use std::sync::Arc;

use strata_db::{IndexDef, IndexFieldSpec, Model, Store, StoreError};
use strata_index::{Bound, FieldClause, Interval, Operand, Predicate, Query};
use strata_kv::InMemoryKv;
use strata_unit::{
    Cardinality, FieldDescriptor, FieldValue, ObjectId, Result as UnitResult, Scalar, TopicId,
    Unit, UnitError, UnitSchema, ValueType,
};

const CODE_TAG: u32 = 1;
const LABEL_TAG: u32 = 2;

static EVENT_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        tag: CODE_TAG,
        name: "code",
        value_type: ValueType::I32,
        cardinality: Cardinality::Single,
        required: true,
        default: None,
    },
    FieldDescriptor {
        tag: LABEL_TAG,
        name: "label",
        value_type: ValueType::String,
        cardinality: Cardinality::Single,
        required: false,
        default: None,
    },
];
static EVENT_SCHEMA: UnitSchema = UnitSchema::new("event", EVENT_FIELDS);

#[derive(Debug, Clone, Default, PartialEq)]
struct Event {
    code: Option<i32>,
    label: Option<String>,
}

impl Event {
    fn new(code: i32, label: &str) -> Self {
        Self { code: Some(code), label: Some(label.to_string()) }
    }
}

impl Unit for Event {
    fn schema(&self) -> &'static UnitSchema {
        &EVENT_SCHEMA
    }

    fn get(&self, tag: u32) -> Option<FieldValue> {
        match tag {
            CODE_TAG => self.code.map(Scalar::I32).map(FieldValue::Scalar),
            LABEL_TAG => self.label.clone().map(Scalar::String).map(FieldValue::Scalar),
            _ => None,
        }
    }

    fn set(&mut self, tag: u32, value: FieldValue) -> UnitResult<()> {
        match (tag, value) {
            (CODE_TAG, FieldValue::Scalar(Scalar::I32(v))) => self.code = Some(v),
            (LABEL_TAG, FieldValue::Scalar(Scalar::String(s))) => self.label = Some(s),
            (t, _) => return Err(UnitError::InvalidType { tag: t }),
        }
        Ok(())
    }
}

impl Model for Event {
    fn model_id() -> &'static str {
        "event"
    }

    fn indexes() -> &'static [IndexDef] {
        static FIELDS: &[IndexFieldSpec] = &[IndexFieldSpec::new(CODE_TAG, false)];
        static INDEXES: &[IndexDef] = &[IndexDef::new(1, FIELDS)];
        INDEXES
    }
}

const OCCURRED_AT_TAG: u32 = 1;
const SENSOR_TAG: u32 = 2;

static READING_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        tag: OCCURRED_AT_TAG,
        name: "occurred_at",
        value_type: ValueType::DateTime,
        cardinality: Cardinality::Single,
        required: true,
        default: None,
    },
    FieldDescriptor {
        tag: SENSOR_TAG,
        name: "sensor",
        value_type: ValueType::String,
        cardinality: Cardinality::Single,
        required: true,
        default: None,
    },
];
static READING_SCHEMA: UnitSchema = UnitSchema::new("reading", READING_FIELDS);

#[derive(Debug, Clone, Default, PartialEq)]
struct Reading {
    occurred_at: Option<i64>,
    sensor: Option<String>,
}

impl Unit for Reading {
    fn schema(&self) -> &'static UnitSchema {
        &READING_SCHEMA
    }

    fn get(&self, tag: u32) -> Option<FieldValue> {
        match tag {
            OCCURRED_AT_TAG => self.occurred_at.map(Scalar::DateTime).map(FieldValue::Scalar),
            SENSOR_TAG => self.sensor.clone().map(Scalar::String).map(FieldValue::Scalar),
            _ => None,
        }
    }

    fn set(&mut self, tag: u32, value: FieldValue) -> UnitResult<()> {
        match (tag, value) {
            (OCCURRED_AT_TAG, FieldValue::Scalar(Scalar::DateTime(v))) => self.occurred_at = Some(v),
            (SENSOR_TAG, FieldValue::Scalar(Scalar::String(s))) => self.sensor = Some(s),
            (t, _) => return Err(UnitError::InvalidType { tag: t }),
        }
        Ok(())
    }
}

impl Model for Reading {
    fn model_id() -> &'static str {
        "reading"
    }

    fn indexes() -> &'static [IndexDef] {
        static FIELDS: &[IndexFieldSpec] = &[IndexFieldSpec::new(SENSOR_TAG, false)];
        static INDEXES: &[IndexDef] = &[IndexDef::new(1, FIELDS)];
        INDEXES
    }

    fn partition_field() -> Option<u32> {
        Some(OCCURRED_AT_TAG)
    }
}

fn store() -> (InMemoryKv, Arc<Store<InMemoryKv>>) {
    let kv = InMemoryKv::new();
    (kv.clone(), Arc::new(Store::new(Arc::new(kv))))
}

fn code_clause(predicate: Predicate, operand: Operand) -> FieldClause {
    FieldClause { field_position: 0, predicate, operand, descending: false }
}

fn code_query(topic: &str, clauses: Vec<FieldClause>) -> Query {
    Query {
        index_id: Event::indexes()[0].index_id(),
        clauses,
        topics: Some(vec![topic.to_string()]),
        limit: 100,
        ..Default::default()
    }
}

async fn seed_codes(store: &Store<InMemoryKv>, topic: &TopicId, codes: &[i32]) {
    for (i, code) in codes.iter().enumerate() {
        store
            .create::<Event>(topic, Event::new(*code, &format!("e{code}")), 1_000 + i as i64)
            .await
            .unwrap();
    }
}

fn codes_of(found: &[strata_unit::StoredObject<Event>]) -> Vec<i32> {
    found.iter().map(|s| s.object.code.unwrap()).collect()
}

#[tokio::test]
async fn create_then_read_returns_the_payload_and_assigns_system_fields() {
    let (_, store) = store();
    let topic = TopicId::new("t");
    let stored = store.create::<Event>(&topic, Event::new(7, "hi"), 5_000).await.unwrap();

    assert_ne!(stored.id, ObjectId::from_bytes([0u8; 12]));
    assert_eq!(stored.created_at, 5_000);
    assert_eq!(stored.updated_at, 5_000);

    let read = store.read::<Event>("t", &stored.id, None, None).await.unwrap();
    assert_eq!(read.object.code, Some(7));
    assert_eq!(read.object.label.as_deref(), Some("hi"));
    assert_eq!(read.created_at, 5_000);
}

#[tokio::test]
async fn open_open_interval_returns_only_strictly_interior_codes() {
    let (_, store) = store();
    let topic = TopicId::new("t");
    seed_codes(&store, &topic, &[1, 3, 5, 7, 9]).await;

    let interval = Interval {
        lo: Bound::Value(Scalar::I32(1)),
        hi: Bound::Value(Scalar::I32(7)),
        lo_open: true,
        hi_open: true,
    };
    let query = code_query("t", vec![code_clause(Predicate::In, Operand::Interval(interval))]);
    let found = store.find::<Event>(&query).await.unwrap();
    assert_eq!(codes_of(&found), vec![3, 5]);
}

#[tokio::test]
async fn nin_vector_returns_the_complement() {
    let (_, store) = store();
    let topic = TopicId::new("t");
    seed_codes(&store, &topic, &[1, 3, 5, 7, 9]).await;

    let query = code_query(
        "t",
        vec![code_clause(Predicate::Nin, Operand::Vector(vec![Scalar::I32(3), Scalar::I32(5)]))],
    );
    let found = store.find::<Event>(&query).await.unwrap();
    assert_eq!(codes_of(&found), vec![1, 7, 9]);
}

#[tokio::test]
async fn results_follow_field_order_and_repeat_identically() {
    let (_, store) = store();
    let topic = TopicId::new("t");
    // Insertion order disagrees with field order, so a sort by creation
    // time would be visibly wrong here.
    seed_codes(&store, &topic, &[9, 1, 5, 3, 7]).await;

    let query = code_query("t", vec![code_clause(Predicate::Gte, Operand::Scalar(Scalar::I32(0)))]);
    let first = store.find::<Event>(&query).await.unwrap();
    assert_eq!(codes_of(&first), vec![1, 3, 5, 7, 9]);

    let first_ids: Vec<ObjectId> = first.iter().map(|s| s.id).collect();
    let second_ids: Vec<ObjectId> = store.find::<Event>(&query).await.unwrap().iter().map(|s| s.id).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn limit_truncates_the_result_set() {
    let (_, store) = store();
    let topic = TopicId::new("t");
    seed_codes(&store, &topic, &[1, 3, 5, 7, 9]).await;

    let mut query = code_query("t", vec![code_clause(Predicate::Gte, Operand::Scalar(Scalar::I32(0)))]);
    query.limit = 3;
    let found = store.find::<Event>(&query).await.unwrap();
    assert_eq!(codes_of(&found), vec![1, 3, 5]);
}

#[tokio::test]
async fn expired_records_are_hidden_from_read_and_find_and_purged_by_compaction() {
    let (kv, store) = store();
    let topic = TopicId::new("t");
    // Expiry lands at now + 1s = 2_000 (milliseconds since the epoch, so
    // long past for the real-time compaction clock).
    let stored = store.create_with_ttl::<Event>(&topic, Event::new(1, "short-lived"), 1, 1_000).await.unwrap();
    assert_eq!(stored.expire_at, Some(2_000));

    // Visible before the deadline, hidden after it.
    assert!(store.read::<Event>("t", &stored.id, None, Some(1_999)).await.is_ok());
    let err = store.read::<Event>("t", &stored.id, None, Some(2_000)).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound));

    let mut query = code_query("t", vec![code_clause(Predicate::Eq, Operand::Scalar(Scalar::I32(1)))]);
    query.time_point_filter = Some(2_000);
    assert!(store.find::<Event>(&query).await.unwrap().is_empty());

    // The compaction filter sees the marker in the past and drops the rows
    // for good.
    kv.run_compaction();
    let err = store.read::<Event>("t", &stored.id, None, None).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound));
}

#[tokio::test]
async fn update_many_patches_every_match_and_returns_the_count() {
    let (_, store) = store();
    let topic = TopicId::new("t");
    seed_codes(&store, &topic, &[2, 2, 8]).await;

    let request = strata_unit::UpdateRequest(vec![strata_unit::FieldOp {
        path: strata_unit::Path::field(LABEL_TAG),
        op: strata_unit::UpdateOp::Set,
        value: strata_unit::Operand::Scalar(Scalar::String("patched".to_string())),
    }]);
    let query = code_query("t", vec![code_clause(Predicate::Eq, Operand::Scalar(Scalar::I32(2)))]);
    let patched = store.update_many::<Event>(&query, &request, 9_000).await.unwrap();
    assert_eq!(patched, 2);

    let found = store.find::<Event>(&query).await.unwrap();
    assert!(found.iter().all(|s| s.object.label.as_deref() == Some("patched")));
}

#[tokio::test]
async fn delete_many_removes_every_match_and_returns_the_count() {
    let (_, store) = store();
    let topic = TopicId::new("t");
    seed_codes(&store, &topic, &[2, 2, 8]).await;

    let query = code_query("t", vec![code_clause(Predicate::Eq, Operand::Scalar(Scalar::I32(2)))]);
    let deleted = store.delete_many::<Event>(&query).await.unwrap();
    assert_eq!(deleted, 2);
    assert!(store.find::<Event>(&query).await.unwrap().is_empty());

    let rest = code_query("t", vec![code_clause(Predicate::Eq, Operand::Scalar(Scalar::I32(8)))]);
    assert_eq!(store.find::<Event>(&rest).await.unwrap().len(), 1);
}

#[tokio::test]
async fn find_update_create_updates_when_matched_and_creates_otherwise() {
    let (_, store) = store();
    let topic = TopicId::new("t");

    let request = strata_unit::UpdateRequest(vec![strata_unit::FieldOp {
        path: strata_unit::Path::field(LABEL_TAG),
        op: strata_unit::UpdateOp::Set,
        value: strata_unit::Operand::Scalar(Scalar::String("upserted".to_string())),
    }]);
    let query = code_query("t", vec![code_clause(Predicate::Eq, Operand::Scalar(Scalar::I32(4)))]);

    // No match yet: falls back to creating the given object.
    let created = store
        .find_update_create::<Event>(&query, &request, Event::new(4, "fresh"), &topic, strata_db::ReturnMode::After, 1_000)
        .await
        .unwrap();
    assert_eq!(created.object.label.as_deref(), Some("fresh"));

    // Second call matches and applies the patch instead.
    let updated = store
        .find_update_create::<Event>(&query, &request, Event::new(4, "ignored"), &topic, strata_db::ReturnMode::After, 2_000)
        .await
        .unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.object.label.as_deref(), Some("upserted"));
}

#[tokio::test]
async fn partition_set_restricts_results_and_its_absence_returns_the_union() {
    let (_, store) = store();
    let topic = TopicId::new("sensors");

    // 2026-01-15 and 2026-03-15, in milliseconds.
    let january = 1_768_435_200_000i64;
    let march = 1_773_532_800_000i64;
    store
        .create::<Reading>(&topic, Reading { occurred_at: Some(january), sensor: Some("s1".into()) }, 1_000)
        .await
        .unwrap();
    store
        .create::<Reading>(&topic, Reading { occurred_at: Some(march), sensor: Some("s1".into()) }, 2_000)
        .await
        .unwrap();

    let partitions = store.list_date_partitions::<Reading>().await.unwrap();
    assert_eq!(partitions.len(), 2);

    let base = Query {
        index_id: Reading::indexes()[0].index_id(),
        clauses: vec![FieldClause {
            field_position: 0,
            predicate: Predicate::Eq,
            operand: Operand::Scalar(Scalar::String("s1".to_string())),
            descending: false,
        }],
        topics: Some(vec!["sensors".to_string()]),
        limit: 10,
        ..Default::default()
    };

    let all = store.find::<Reading>(&base).await.unwrap();
    assert_eq!(all.len(), 2);

    let mut scoped = base.clone();
    scoped.partitions = Some(vec![partitions[0].0.clone()]);
    let restricted = store.find::<Reading>(&scoped).await.unwrap();
    assert_eq!(restricted.len(), 1);
}

#[tokio::test]
async fn list_model_topics_reports_every_topic_with_records() {
    let (_, store) = store();
    store.create::<Event>(&TopicId::new("alpha"), Event::new(1, "a"), 1_000).await.unwrap();
    store.create::<Event>(&TopicId::new("beta"), Event::new(2, "b"), 1_000).await.unwrap();

    let topics = store.list_model_topics::<Event>(None, true).await.unwrap();
    let names: Vec<String> = topics.into_iter().map(|t| t.0).collect();
    assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
}
