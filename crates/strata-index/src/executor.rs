//! Query execution: clause-by-clause range narrowing, operator
//! decomposition, scalar-clause fusion, and limit-bounded result assembly.

use std::cmp::Ordering;
use std::ops::Bound as StdBound;

use strata_unit::{ObjectId, Scalar};

use crate::cursor::Cursor;
use crate::error::{IndexError, Result};
use crate::key::{encode_component, exclusive_upper_bound};
use crate::predicate::{Bound, FieldClause, Interval, Operand, Predicate, Query};

/// Backend abstraction the executor scans through — implemented by the
/// document store over its `OrderedKv` column family, kept out of this
/// crate so strata-index stays a pure algorithm over byte ranges.
pub trait RangeReader {
    fn scan(
        &self,
        lower: StdBound<Vec<u8>>,
        upper: StdBound<Vec<u8>>,
        descending: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// One matched index row: the object it points to, the creation timestamp
/// carried in the index value, and the key's field components (still in
/// their escaped, order-preserving encoding) for the final composite sort.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub topic: String,
    pub object_id: ObjectId,
    pub created_at: i64,
    pub components: Vec<Vec<u8>>,
}

/// The creation-timestamp-plus-TTL payload stored alongside an index key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexValue {
    pub created_at: i64,
    pub ttl: Option<i64>,
}

impl IndexValue {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(17);
        out.extend_from_slice(&self.created_at.to_be_bytes());
        match self.ttl {
            Some(ttl) => {
                out.push(1);
                out.extend_from_slice(&ttl.to_be_bytes());
            }
            None => out.push(0),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 9 {
            return Err(IndexError::InvalidPredicate("truncated index value".to_string()));
        }
        let created_at = i64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let ttl = match bytes[8] {
            0 => None,
            1 => {
                if bytes.len() < 17 {
                    return Err(IndexError::InvalidPredicate("truncated ttl marker".to_string()));
                }
                Some(i64::from_be_bytes(bytes[9..17].try_into().unwrap()))
            }
            other => return Err(IndexError::InvalidPredicate(format!("bad ttl tag {other}"))),
        };
        Ok(IndexValue { created_at, ttl })
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.ttl, Some(deadline) if now >= deadline)
    }
}

fn cmp_bound_lo(a: &Bound, b: &Bound) -> Ordering {
    match (a, b) {
        (Bound::First, Bound::First) => Ordering::Equal,
        (Bound::First, _) => Ordering::Less,
        (_, Bound::First) => Ordering::Greater,
        (Bound::Last, Bound::Last) => Ordering::Equal,
        (Bound::Last, _) => Ordering::Greater,
        (_, Bound::Last) => Ordering::Less,
        (Bound::Value(x), Bound::Value(y)) => encode_component(x).cmp(&encode_component(y)),
    }
}

/// Resolve one field clause's range(s) against `cursor`'s prefix, applying
/// the operator decomposition: `neq` splits into below/above, `nin` over
/// intervals iterates the gaps, `in` over a vector unions per-value exact
/// ranges, `in` over intervals sorts and merges them first.
fn resolve_ranges(cursor: &Cursor, clause: &FieldClause) -> Result<Vec<(Vec<u8>, Vec<u8>, bool)>> {
    let prefix = cursor.prefix().to_vec();
    let domain_lower = prefix.clone();
    let domain_upper = exclusive_upper_bound(&prefix);

    let field_bound = |v: &Scalar| {
        let mut out = prefix.clone();
        out.extend(encode_component(v));
        out
    };
    let field_bound_sep = |v: &Scalar| {
        let mut out = field_bound(v);
        out.push(strata_buf::SEPARATOR);
        out
    };

    match (&clause.predicate, &clause.operand) {
        (Predicate::Eq, Operand::Scalar(v)) => {
            let lower = field_bound_sep(v);
            let upper = exclusive_upper_bound(&lower);
            Ok(vec![(lower, upper, true)])
        }
        (Predicate::Neq, Operand::Scalar(v)) => {
            let lt_upper = field_bound(v);
            let gt_lower = exclusive_upper_bound(&field_bound_sep(v));
            Ok(vec![
                (domain_lower.clone(), lt_upper, false),
                (gt_lower, domain_upper.clone(), false),
            ])
        }
        (Predicate::Gt, Operand::Scalar(v)) => {
            Ok(vec![(exclusive_upper_bound(&field_bound_sep(v)), domain_upper, false)])
        }
        (Predicate::Gte, Operand::Scalar(v)) => Ok(vec![(field_bound(v), domain_upper, false)]),
        (Predicate::Lt, Operand::Scalar(v)) => Ok(vec![(domain_lower, field_bound(v), false)]),
        (Predicate::Lte, Operand::Scalar(v)) => {
            Ok(vec![(domain_lower, exclusive_upper_bound(&field_bound_sep(v)), false)])
        }
        (Predicate::In, Operand::Vector(values)) => {
            // Pre-sorting is unconditional so iteration order always matches
            // the key order the backend delivers.
            let mut sorted = values.clone();
            sorted.sort_by(|a, b| encode_component(a).cmp(&encode_component(b)));
            sorted.dedup();
            Ok(sorted
                .iter()
                .map(|v| {
                    let lower = field_bound_sep(v);
                    let upper = exclusive_upper_bound(&lower);
                    (lower, upper, true)
                })
                .collect())
        }
        (Predicate::Nin, Operand::Vector(_)) => Ok(vec![(domain_lower, domain_upper, false)]),
        (Predicate::In, Operand::VectorOfIntervals(intervals)) => {
            let merged = merge_intervals(intervals);
            Ok(merged
                .iter()
                .map(|iv| {
                    let (lo, hi) = interval_range(&domain_lower, &domain_upper, iv, &field_bound, &field_bound_sep);
                    (lo, hi, false)
                })
                .collect())
        }
        (Predicate::Nin, Operand::VectorOfIntervals(intervals)) => {
            let merged = merge_intervals(intervals);
            Ok(gaps(&merged)
                .iter()
                .map(|iv| {
                    let (lo, hi) = interval_range(&domain_lower, &domain_upper, iv, &field_bound, &field_bound_sep);
                    (lo, hi, false)
                })
                .collect())
        }
        (_, Operand::Interval(iv)) => {
            let (lo, hi) = interval_range(&domain_lower, &domain_upper, iv, &field_bound, &field_bound_sep);
            Ok(vec![(lo, hi, false)])
        }
        _ => Err(IndexError::InvalidPredicate(format!(
            "operator {:?} is not compatible with the given operand",
            clause.predicate
        ))),
    }
}

fn interval_range(
    domain_lower: &[u8],
    domain_upper: &[u8],
    interval: &Interval,
    field_bound: &dyn Fn(&Scalar) -> Vec<u8>,
    field_bound_sep: &dyn Fn(&Scalar) -> Vec<u8>,
) -> (Vec<u8>, Vec<u8>) {
    let lower = match &interval.lo {
        Bound::First => domain_lower.to_vec(),
        Bound::Last => domain_upper.to_vec(),
        Bound::Value(v) => {
            if interval.lo_open {
                exclusive_upper_bound(&field_bound_sep(v))
            } else {
                field_bound(v)
            }
        }
    };
    let upper = match &interval.hi {
        Bound::Last => domain_upper.to_vec(),
        Bound::First => domain_lower.to_vec(),
        Bound::Value(v) => {
            if interval.hi_open {
                field_bound(v)
            } else {
                exclusive_upper_bound(&field_bound_sep(v))
            }
        }
    };
    (lower, upper)
}

/// Sort, then merge overlapping or adjacent intervals.
fn merge_intervals(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.to_vec();
    sorted.sort_by(|a, b| cmp_bound_lo(&a.lo, &b.lo));
    let mut merged: Vec<Interval> = Vec::new();
    for iv in sorted {
        match merged.last_mut() {
            Some(last) if cmp_bound_lo(&iv.lo, &last.hi) != Ordering::Greater => {
                if cmp_bound_lo(&last.hi, &iv.hi) == Ordering::Less {
                    last.hi = iv.hi;
                    last.hi_open = iv.hi_open;
                }
            }
            _ => merged.push(iv),
        }
    }
    merged
}

/// The complement of a sorted, merged interval list within the full domain.
fn gaps(merged: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    let mut cursor = Bound::First;
    let mut cursor_open = false;
    for iv in merged {
        if cmp_bound_lo(&cursor, &iv.lo) == Ordering::Less {
            out.push(Interval {
                lo: cursor.clone(),
                hi: iv.lo.clone(),
                lo_open: cursor_open,
                hi_open: !iv.lo_open,
            });
        }
        cursor = iv.hi.clone();
        cursor_open = !iv.hi_open;
    }
    if !matches!(cursor, Bound::Last) {
        out.push(Interval {
            lo: cursor,
            hi: Bound::Last,
            lo_open: cursor_open,
            hi_open: false,
        });
    }
    out
}

/// The bytes of the field component starting at `base_len` in `key`, up to
/// but excluding the separator that terminates it. Component encodings are
/// escaped, so the first separator byte past `base_len` is always a real
/// component boundary.
fn field_component_bytes(key: &[u8], base_len: usize) -> Option<&[u8]> {
    if key.len() <= base_len {
        return None;
    }
    let end = key[base_len..]
        .iter()
        .position(|&b| b == strata_buf::SEPARATOR)
        .map(|p| base_len + p)
        .unwrap_or(key.len());
    Some(&key[base_len..end])
}

/// Split out every field component between the root (topic, index-id)
/// prefix and the trailing object id. Components stay escaped; the escape
/// encoding is order-preserving, so they compare the way the raw values do.
fn key_components(key: &[u8], root_len: usize) -> Vec<Vec<u8>> {
    let end = key.len().saturating_sub(12);
    let mut out = Vec::new();
    let mut start = root_len;
    for i in root_len..end {
        if key[i] == strata_buf::SEPARATOR {
            out.push(key[start..i].to_vec());
            start = i + 1;
        }
    }
    out
}

/// Decode the `ObjectId` trailing an index key (its final, fixed-width,
/// unescaped component).
fn object_id_from_key(key: &[u8]) -> Result<ObjectId> {
    if key.len() < 12 {
        return Err(IndexError::InvalidPredicate("index key too short for an object id".to_string()));
    }
    let tail = &key[key.len() - 12..];
    let array: [u8; 12] = tail.try_into().unwrap();
    Ok(ObjectId::from_bytes(array))
}

pub struct QueryExecutor;

impl QueryExecutor {
    /// Run `query` against one (topic, partition)-scoped reader, returning
    /// up to `query.limit` hits. Iteration across multiple partitions, in
    /// the order of the first partitioning clause, is the caller's
    /// responsibility.
    pub fn run(reader: &dyn RangeReader, topic: &str, index_id: &str, query: &Query) -> Result<Vec<IndexHit>> {
        let mut hits = Vec::new();
        let root = crate::key::IndexKeyBuilder::new()
            .push_topic(topic)
            .push_index_id(index_id);
        let root_len = root.as_prefix().len();
        let cursor = Cursor::new(root.as_prefix());
        let descending = query.clauses.last().map(|c| c.descending).unwrap_or(false);
        let clauses = fuse(&query.clauses);
        if clauses.is_empty() {
            // No predicate at all: every row under the index prefix matches.
            scan_all(reader, &cursor, root_len, topic, query, descending, &mut hits)?;
        } else {
            walk(reader, &cursor, root_len, &clauses, 0, topic, query, descending, &mut hits)?;
        }

        let order = declared_order(query);
        sort_hits(&mut hits, &order);
        if query.limit > 0 {
            hits.truncate(query.limit);
        }
        Ok(hits)
    }
}

/// The composite sort order a query declares: `order_override` when given,
/// the clause list's `(field position, direction)` pairs otherwise.
pub fn declared_order(query: &Query) -> Vec<(usize, bool)> {
    query
        .order_override
        .clone()
        .unwrap_or_else(|| query.clauses.iter().map(|c| (c.field_position, c.descending)).collect())
}

/// Merge adjacent clauses sharing the same field, predicate, and order into
/// one key segment to avoid redundant iterator construction.
fn fuse(clauses: &[FieldClause]) -> Vec<FieldClause> {
    let mut out: Vec<FieldClause> = Vec::new();
    for clause in clauses {
        if let Some(last) = out.last_mut() {
            if last.field_position == clause.field_position
                && last.predicate == clause.predicate
                && last.descending == clause.descending
            {
                if let (Operand::Vector(a), Operand::Vector(b)) = (&mut last.operand, &clause.operand) {
                    a.extend(b.clone());
                    continue;
                }
            }
        }
        out.push(clause.clone());
    }
    out
}

fn scan_all(
    reader: &dyn RangeReader,
    cursor: &Cursor,
    root_len: usize,
    topic: &str,
    query: &Query,
    descending: bool,
    hits: &mut Vec<IndexHit>,
) -> Result<()> {
    let lower = cursor.prefix().to_vec();
    let upper = exclusive_upper_bound(&lower);
    let rows = reader.scan(StdBound::Included(lower), StdBound::Excluded(upper), descending)?;
    for (key, value) in rows {
        if query.limit > 0 && hits.len() >= query.limit {
            return Ok(());
        }
        let decoded = IndexValue::decode(&value)?;
        if let Some(now) = query.time_point_filter {
            if decoded.is_expired(now) {
                continue;
            }
        }
        hits.push(IndexHit {
            topic: topic.to_string(),
            object_id: object_id_from_key(&key)?,
            created_at: decoded.created_at,
            components: key_components(&key, root_len),
        });
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn walk(
    reader: &dyn RangeReader,
    cursor: &Cursor,
    root_len: usize,
    clauses: &[FieldClause],
    idx: usize,
    topic: &str,
    query: &Query,
    descending: bool,
    hits: &mut Vec<IndexHit>,
) -> Result<()> {
    if query.limit > 0 && hits.len() >= query.limit {
        return Ok(());
    }
    let Some(clause) = clauses.get(idx) else {
        return Ok(());
    };
    let prefix_len = cursor.prefix().len();
    let ranges = resolve_ranges(cursor, clause)?;
    let is_last = idx + 1 == clauses.len();

    let excluded: Option<Vec<Vec<u8>>> = match (&clause.predicate, &clause.operand) {
        (Predicate::Nin, Operand::Vector(values)) => Some(values.iter().map(encode_component).collect()),
        _ => None,
    };
    let is_excluded = |key: &[u8]| {
        excluded.as_ref().is_some_and(|excluded| {
            field_component_bytes(key, prefix_len)
                .is_some_and(|component| excluded.iter().any(|e| e.as_slice() == component))
        })
    };

    for (lower, upper, exact_prefix) in ranges {
        let rows = reader.scan(StdBound::Included(lower.clone()), StdBound::Excluded(upper), descending)?;
        if is_last {
            for (key, value) in rows {
                if query.limit > 0 && hits.len() >= query.limit {
                    return Ok(());
                }
                if is_excluded(&key) {
                    continue;
                }
                let decoded = IndexValue::decode(&value)?;
                if let Some(now) = query.time_point_filter {
                    if decoded.is_expired(now) {
                        continue;
                    }
                }
                let object_id = object_id_from_key(&key)?;
                hits.push(IndexHit {
                    topic: topic.to_string(),
                    object_id,
                    created_at: decoded.created_at,
                    components: key_components(&key, root_len),
                });
            }
        } else if exact_prefix {
            // The range pins one exact component value, so every row shares
            // `lower` (prefix + component + separator) as its extension.
            if !rows.is_empty() {
                walk(reader, &Cursor::new(lower), root_len, clauses, idx + 1, topic, query, descending, hits)?;
                if query.limit > 0 && hits.len() >= query.limit {
                    return Ok(());
                }
            }
        } else {
            for extended in distinct_component_prefixes(&rows, prefix_len) {
                if is_excluded(&extended) {
                    continue;
                }
                walk(reader, &Cursor::new(extended), root_len, clauses, idx + 1, topic, query, descending, hits)?;
                if query.limit > 0 && hits.len() >= query.limit {
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

/// Group scanned rows by the distinct field-component prefix (through the
/// next separator byte) each key carries past `base_len`, preserving scan
/// order.
fn distinct_component_prefixes(rows: &[(Vec<u8>, Vec<u8>)], base_len: usize) -> Vec<Vec<u8>> {
    let mut out: Vec<Vec<u8>> = Vec::new();
    for (key, _) in rows {
        if key.len() <= base_len {
            continue;
        }
        let end = match key[base_len..].iter().position(|&b| b == strata_buf::SEPARATOR) {
            Some(p) => base_len + p + 1,
            None => key.len(),
        };
        let prefix = key[..end].to_vec();
        if out.last() != Some(&prefix) {
            out.push(prefix);
        }
    }
    out
}

/// Composite comparison in the query's declared field order, each field
/// honoring its own direction flag. Exactly-equal keys tie-break on
/// creation time, then object id, so the order is total and repeat
/// executions return the same sequence.
pub fn compare_hits(a: &IndexHit, b: &IndexHit, order: &[(usize, bool)]) -> Ordering {
    for &(position, descending) in order {
        let ord = a.components.get(position).cmp(&b.components.get(position));
        let ord = if descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.created_at.cmp(&b.created_at).then_with(|| a.object_id.cmp(&b.object_id))
}

fn sort_hits(hits: &mut [IndexHit], order: &[(usize, bool)]) {
    hits.sort_by(|a, b| compare_hits(a, b, order));
}
