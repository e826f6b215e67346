//! Scalar values and the field descriptors that type them.

use serde::{Deserialize, Serialize};

use crate::object_id::ObjectId;

/// Every scalar type a unit field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    Bytes,
    FixedString(usize),
    /// An enum's discriminant, carried as `i32` on the wire.
    Enum,
    ObjectId,
    /// Days since the epoch.
    Date,
    /// Nanoseconds since midnight.
    Time,
    /// Milliseconds since the Unix epoch.
    DateTime,
    /// An inclusive `(start_day, end_day)` pair.
    DateRange,
    /// A nested unit, owned by this field.
    NestedOwned,
    /// A nested unit, shared and addressed by [`ObjectId`] elsewhere.
    NestedShared,
}

/// How many values a field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    Single,
    /// A repeated field whose elements are inlined in this unit's own wire
    /// form.
    RepeatedEmbedded,
    /// A repeated field of nested units. Repeated nested-unit fields are
    /// always external (never inlined), so their elements are only ever
    /// addressed, not embedded.
    RepeatedExternal,
}

/// A scalar value, tagged by which [`ValueType`] variant it holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Enum(i32),
    ObjectId(ObjectId),
    Date(i32),
    Time(i64),
    DateTime(i64),
    DateRange(i32, i32),
}

impl Scalar {
    /// The [`ValueType`] this scalar was constructed as.
    pub fn value_type(&self) -> ValueType {
        match self {
            Scalar::Bool(_) => ValueType::Bool,
            Scalar::I8(_) => ValueType::I8,
            Scalar::I16(_) => ValueType::I16,
            Scalar::I32(_) => ValueType::I32,
            Scalar::I64(_) => ValueType::I64,
            Scalar::U8(_) => ValueType::U8,
            Scalar::U16(_) => ValueType::U16,
            Scalar::U32(_) => ValueType::U32,
            Scalar::U64(_) => ValueType::U64,
            Scalar::F32(_) => ValueType::F32,
            Scalar::F64(_) => ValueType::F64,
            Scalar::String(_) => ValueType::String,
            Scalar::Bytes(_) => ValueType::Bytes,
            Scalar::Enum(_) => ValueType::Enum,
            Scalar::ObjectId(_) => ValueType::ObjectId,
            Scalar::Date(_) => ValueType::Date,
            Scalar::Time(_) => ValueType::Time,
            Scalar::DateTime(_) => ValueType::DateTime,
            Scalar::DateRange(_, _) => ValueType::DateRange,
        }
    }
}

/// A statically-known default for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultValue(pub Scalar);

/// Describes one field of a [`crate::schema::UnitSchema`].
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub tag: u32,
    pub name: &'static str,
    pub value_type: ValueType,
    pub cardinality: Cardinality,
    pub required: bool,
    pub default: Option<DefaultValue>,
}
