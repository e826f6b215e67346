//! The predicate tree a query is built from: per-field
//! clauses of `(field position, operator, operand, order)`.

use strata_unit::Scalar;

/// A bound usable in an [`Interval`]: a concrete value or a sentinel
/// selecting the natural minimum/maximum of the field's domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Value(Scalar),
    First,
    Last,
}

/// A half- or fully-bounded range over a field's domain.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub lo: Bound,
    pub hi: Bound,
    pub lo_open: bool,
    pub hi_open: bool,
}

/// The value side of a clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(Scalar),
    Interval(Interval),
    Vector(Vec<Scalar>),
    VectorOfIntervals(Vec<Interval>),
}

/// The comparison a clause performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
}

/// One per-field clause in a query's predicate tree.
#[derive(Debug, Clone)]
pub struct FieldClause {
    pub field_position: usize,
    pub predicate: Predicate,
    pub operand: Operand,
    pub descending: bool,
}

/// The full predicate tree plus the scope and shape a query runs with.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub index_id: String,
    pub clauses: Vec<FieldClause>,
    pub topics: Option<Vec<String>>,
    pub partitions: Option<Vec<String>>,
    pub limit: usize,
    /// Composite sort order applied to the collected result set: one
    /// `(field_position, descending)` pair per sorted field, defaulting to
    /// the clause order when absent.
    pub order_override: Option<Vec<(usize, bool)>>,
    /// Unix-seconds deadline; rows whose index-value timestamp is in the
    /// past are dropped.
    pub time_point_filter: Option<i64>,
}
