//! Composite index-key construction and the query executor that walks a
//! predicate tree against a byte-range-scanning backend.

mod cursor;
mod error;
mod executor;
mod key;
mod predicate;

pub use cursor::Cursor;
pub use error::{IndexError, Result};
pub use executor::{compare_hits, declared_order, IndexHit, IndexValue, QueryExecutor, RangeReader};
pub use key::{encode_component, exclusive_upper_bound, IndexKeyBuilder};
pub use predicate::{Bound, FieldClause, Interval, Operand, Predicate, Query};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::ops::Bound as StdBound;
    use std::sync::Mutex;

    use strata_unit::{ObjectId, Scalar};

    struct FakeReader {
        rows: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
    }

    impl RangeReader for FakeReader {
        fn scan(
            &self,
            lower: StdBound<Vec<u8>>,
            upper: StdBound<Vec<u8>>,
            descending: bool,
        ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
            let rows = self.rows.lock().unwrap();
            let mut out: Vec<(Vec<u8>, Vec<u8>)> = rows
                .range((lower, upper))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if descending {
                out.reverse();
            }
            Ok(out)
        }
    }

    fn insert(reader: &FakeReader, topic: &str, index_id: &str, field: Scalar, id: ObjectId, created_at: i64) {
        let key = IndexKeyBuilder::new()
            .push_topic(topic)
            .push_index_id(index_id)
            .push_field(&field)
            .push_object_id(&id)
            .finish();
        let value = IndexValue { created_at, ttl: None }.encode();
        reader.rows.lock().unwrap().insert(key, value);
    }

    #[test]
    fn eq_clause_matches_only_the_exact_value() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        let matching = ObjectId::generate();
        let other = ObjectId::generate();
        insert(&reader, "t1", "by_age", Scalar::I32(30), matching, 1);
        insert(&reader, "t1", "by_age", Scalar::I32(40), other, 2);

        let query = Query {
            index_id: "by_age".to_string(),
            clauses: vec![FieldClause {
                field_position: 0,
                predicate: Predicate::Eq,
                operand: Operand::Scalar(Scalar::I32(30)),
                descending: false,
            }],
            limit: 10,
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_age", &query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].object_id, matching);
    }

    #[test]
    fn gt_clause_excludes_the_boundary_value() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        let low = ObjectId::generate();
        let boundary = ObjectId::generate();
        let high = ObjectId::generate();
        insert(&reader, "t1", "by_age", Scalar::I32(10), low, 1);
        insert(&reader, "t1", "by_age", Scalar::I32(30), boundary, 2);
        insert(&reader, "t1", "by_age", Scalar::I32(50), high, 3);

        let query = Query {
            index_id: "by_age".to_string(),
            clauses: vec![FieldClause {
                field_position: 0,
                predicate: Predicate::Gt,
                operand: Operand::Scalar(Scalar::I32(30)),
                descending: false,
            }],
            limit: 10,
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_age", &query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].object_id, high);
    }

    #[test]
    fn in_vector_unions_matches_in_requested_order() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        let c = ObjectId::generate();
        insert(&reader, "t1", "by_age", Scalar::I32(10), a, 1);
        insert(&reader, "t1", "by_age", Scalar::I32(20), b, 2);
        insert(&reader, "t1", "by_age", Scalar::I32(30), c, 3);

        let query = Query {
            index_id: "by_age".to_string(),
            clauses: vec![FieldClause {
                field_position: 0,
                predicate: Predicate::In,
                operand: Operand::Vector(vec![Scalar::I32(30), Scalar::I32(10)]),
                descending: false,
            }],
            limit: 10,
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_age", &query).unwrap();
        let ids: Vec<ObjectId> = hits.iter().map(|h| h.object_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a));
        assert!(ids.contains(&c));
        assert!(!ids.contains(&b));
    }

    #[test]
    fn nin_vector_excludes_the_listed_values() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        let a = ObjectId::generate();
        let b = ObjectId::generate();
        let c = ObjectId::generate();
        insert(&reader, "t1", "by_age", Scalar::I32(10), a, 1);
        insert(&reader, "t1", "by_age", Scalar::I32(20), b, 2);
        insert(&reader, "t1", "by_age", Scalar::I32(30), c, 3);

        let query = Query {
            index_id: "by_age".to_string(),
            clauses: vec![FieldClause {
                field_position: 0,
                predicate: Predicate::Nin,
                operand: Operand::Vector(vec![Scalar::I32(20)]),
                descending: false,
            }],
            limit: 10,
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_age", &query).unwrap();
        let ids: Vec<ObjectId> = hits.iter().map(|h| h.object_id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a));
        assert!(ids.contains(&c));
        assert!(!ids.contains(&b));
    }

    fn insert2(
        reader: &FakeReader,
        topic: &str,
        index_id: &str,
        first: Scalar,
        second: Scalar,
        id: ObjectId,
        created_at: i64,
    ) {
        let key = IndexKeyBuilder::new()
            .push_topic(topic)
            .push_index_id(index_id)
            .push_field(&first)
            .push_field(&second)
            .push_object_id(&id)
            .finish();
        let value = IndexValue { created_at, ttl: None }.encode();
        reader.rows.lock().unwrap().insert(key, value);
    }

    #[test]
    fn two_eq_clauses_narrow_to_the_exact_composite_value() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        let matching = ObjectId::generate();
        insert2(&reader, "t1", "by_owner_kind", Scalar::String("ada".into()), Scalar::String("note".into()), matching, 1);
        insert2(&reader, "t1", "by_owner_kind", Scalar::String("ada".into()), Scalar::String("task".into()), ObjectId::generate(), 2);
        insert2(&reader, "t1", "by_owner_kind", Scalar::String("bob".into()), Scalar::String("note".into()), ObjectId::generate(), 3);

        let query = Query {
            index_id: "by_owner_kind".to_string(),
            clauses: vec![
                FieldClause {
                    field_position: 0,
                    predicate: Predicate::Eq,
                    operand: Operand::Scalar(Scalar::String("ada".into())),
                    descending: false,
                },
                FieldClause {
                    field_position: 1,
                    predicate: Predicate::Eq,
                    operand: Operand::Scalar(Scalar::String("note".into())),
                    descending: false,
                },
            ],
            limit: 10,
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_owner_kind", &query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].object_id, matching);
    }

    #[test]
    fn eq_then_range_walks_each_matching_prefix() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        let low = ObjectId::generate();
        let high = ObjectId::generate();
        insert2(&reader, "t1", "by_owner_age", Scalar::String("ada".into()), Scalar::I32(10), low, 1);
        insert2(&reader, "t1", "by_owner_age", Scalar::String("ada".into()), Scalar::I32(40), high, 2);
        insert2(&reader, "t1", "by_owner_age", Scalar::String("bob".into()), Scalar::I32(40), ObjectId::generate(), 3);

        let query = Query {
            index_id: "by_owner_age".to_string(),
            clauses: vec![
                FieldClause {
                    field_position: 0,
                    predicate: Predicate::Eq,
                    operand: Operand::Scalar(Scalar::String("ada".into())),
                    descending: false,
                },
                FieldClause {
                    field_position: 1,
                    predicate: Predicate::Gt,
                    operand: Operand::Scalar(Scalar::I32(20)),
                    descending: false,
                },
            ],
            limit: 10,
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_owner_age", &query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].object_id, high);
    }

    #[test]
    fn in_vector_of_intervals_merges_overlaps_before_scanning() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        for (code, created) in [(1, 1i64), (3, 2), (5, 3), (7, 4), (9, 5)] {
            insert(&reader, "t1", "by_code", Scalar::I32(code), ObjectId::generate(), created);
        }

        // [2, 6] and [4, 8] overlap; the merged scan must not double-count
        // codes in the overlap.
        let intervals = vec![
            Interval { lo: Bound::Value(Scalar::I32(4)), hi: Bound::Value(Scalar::I32(8)), lo_open: false, hi_open: false },
            Interval { lo: Bound::Value(Scalar::I32(2)), hi: Bound::Value(Scalar::I32(6)), lo_open: false, hi_open: false },
        ];
        let query = Query {
            index_id: "by_code".to_string(),
            clauses: vec![FieldClause {
                field_position: 0,
                predicate: Predicate::In,
                operand: Operand::VectorOfIntervals(intervals),
                descending: false,
            }],
            limit: 10,
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_code", &query).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn nin_vector_of_intervals_scans_only_the_gaps() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        for (code, created) in [(1, 1i64), (3, 2), (5, 3), (7, 4), (9, 5)] {
            insert(&reader, "t1", "by_code", Scalar::I32(code), ObjectId::generate(), created);
        }

        let intervals = vec![Interval {
            lo: Bound::Value(Scalar::I32(3)),
            hi: Bound::Value(Scalar::I32(7)),
            lo_open: false,
            hi_open: false,
        }];
        let query = Query {
            index_id: "by_code".to_string(),
            clauses: vec![FieldClause {
                field_position: 0,
                predicate: Predicate::Nin,
                operand: Operand::VectorOfIntervals(intervals),
                descending: false,
            }],
            limit: 10,
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_code", &query).unwrap();
        // 1 and 9 survive; 3, 5, 7 fall inside the excluded interval.
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn hits_sort_by_declared_field_order_not_creation_time() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        // Insertion order deliberately scrambles field order so creation
        // timestamps disagree with code values.
        for (i, code) in [9, 1, 5, 3, 7].iter().enumerate() {
            insert(&reader, "t1", "by_code", Scalar::I32(*code), ObjectId::generate(), 1_000 + i as i64);
        }

        let query = Query {
            index_id: "by_code".to_string(),
            clauses: vec![FieldClause {
                field_position: 0,
                predicate: Predicate::Gte,
                operand: Operand::Scalar(Scalar::I32(0)),
                descending: false,
            }],
            limit: 10,
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_code", &query).unwrap();
        // Ascending by code: 1, 3, 5, 7, 9 — i.e. created_at 1001, 1003,
        // 1002, 1004, 1000.
        let created: Vec<i64> = hits.iter().map(|h| h.created_at).collect();
        assert_eq!(created, vec![1_001, 1_003, 1_002, 1_004, 1_000]);
    }

    #[test]
    fn a_descending_clause_reverses_the_field_order() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        for (i, code) in [1, 3, 2].iter().enumerate() {
            insert(&reader, "t1", "by_code", Scalar::I32(*code), ObjectId::generate(), 1_000 + i as i64);
        }

        let query = Query {
            index_id: "by_code".to_string(),
            clauses: vec![FieldClause {
                field_position: 0,
                predicate: Predicate::Gte,
                operand: Operand::Scalar(Scalar::I32(0)),
                descending: true,
            }],
            limit: 10,
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_code", &query).unwrap();
        // Descending by code 3, 2, 1 — created_at 1001, 1002, 1000.
        let created: Vec<i64> = hits.iter().map(|h| h.created_at).collect();
        assert_eq!(created, vec![1_001, 1_002, 1_000]);
    }

    #[test]
    fn limit_stops_iteration_early() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        for code in 0..50 {
            insert(&reader, "t1", "by_code", Scalar::I32(code), ObjectId::generate(), code as i64);
        }

        let query = Query {
            index_id: "by_code".to_string(),
            clauses: vec![FieldClause {
                field_position: 0,
                predicate: Predicate::Gte,
                operand: Operand::Scalar(Scalar::I32(0)),
                descending: false,
            }],
            limit: 7,
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_code", &query).unwrap();
        assert_eq!(hits.len(), 7);
    }

    #[test]
    fn expired_rows_are_filtered_by_the_time_point_filter() {
        let reader = FakeReader { rows: Mutex::new(BTreeMap::new()) };
        let id = ObjectId::generate();
        let key = IndexKeyBuilder::new()
            .push_topic("t1")
            .push_index_id("by_age")
            .push_field(&Scalar::I32(30))
            .push_object_id(&id)
            .finish();
        let value = IndexValue { created_at: 1, ttl: Some(100) }.encode();
        reader.rows.lock().unwrap().insert(key, value);

        let query = Query {
            index_id: "by_age".to_string(),
            clauses: vec![FieldClause {
                field_position: 0,
                predicate: Predicate::Eq,
                operand: Operand::Scalar(Scalar::I32(30)),
                descending: false,
            }],
            limit: 10,
            time_point_filter: Some(200),
            ..Default::default()
        };
        let hits = QueryExecutor::run(&reader, "t1", "by_age", &query).unwrap();
        assert!(hits.is_empty());
    }
}
