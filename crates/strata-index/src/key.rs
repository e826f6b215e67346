//! Composite index-key construction: `(topic, index-id, field-value-1, …,
//! field-value-n, object-id)`, laid out so byte-wise lexicographic order
//! matches the declared order of each field component.

use strata_buf::{encode_fixed_u64, escape_string, PLUS_SEPARATOR, SEPARATOR};
use strata_unit::{ObjectId, Scalar};

/// Encode one field value as an index-key component: a fixed-width
/// order-preserving form for numerics, raw bytes for strings, the whole
/// thing escaped so the output never contains a separator or plus-separator
/// byte (the structural bytes a range scan splits components on).
pub fn encode_component(value: &Scalar) -> Vec<u8> {
    let raw = match value {
        Scalar::Bool(v) => vec![*v as u8],
        Scalar::I8(v) => fixed_signed(*v as i64),
        Scalar::I16(v) => fixed_signed(*v as i64),
        Scalar::I32(v) => fixed_signed(*v as i64),
        Scalar::I64(v) => fixed_signed(*v),
        Scalar::U8(v) => fixed_unsigned(*v as u64),
        Scalar::U16(v) => fixed_unsigned(*v as u64),
        Scalar::U32(v) => fixed_unsigned(*v as u64),
        Scalar::U64(v) => fixed_unsigned(*v),
        Scalar::Enum(v) => fixed_signed(*v as i64),
        Scalar::F32(v) => fixed_unsigned(f64_sortable_bits(*v as f64)),
        Scalar::F64(v) => fixed_unsigned(f64_sortable_bits(*v)),
        Scalar::Date(v) => fixed_signed(*v as i64),
        Scalar::Time(v) => fixed_signed(*v),
        Scalar::DateTime(v) => fixed_signed(*v),
        Scalar::DateRange(start, end) => {
            let mut out = fixed_signed(*start as i64);
            out.extend(fixed_signed(*end as i64));
            out
        }
        Scalar::String(v) => v.as_bytes().to_vec(),
        Scalar::Bytes(v) => v.clone(),
        Scalar::ObjectId(v) => v.as_bytes().to_vec(),
    };
    escape_string(&raw)
}

fn fixed_signed(v: i64) -> Vec<u8> {
    // Flipping the sign bit makes negative values sort below positive ones
    // under an unsigned big-endian byte comparison.
    let flipped = (v as u64) ^ (1u64 << 63);
    let mut out = Vec::with_capacity(8);
    encode_fixed_u64(flipped, &mut out);
    out
}

fn fixed_unsigned(v: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    encode_fixed_u64(v, &mut out);
    out
}

/// Map an IEEE-754 bit pattern to an unsigned integer that sorts the same
/// way the float does: flip the sign bit for non-negative values (so they
/// sort above all negatives), flip every bit for negative values (so more
/// negative magnitudes sort lower).
fn f64_sortable_bits(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1u64 << 63)
    }
}

/// Incrementally builds one composite index key.
#[derive(Debug, Default)]
pub struct IndexKeyBuilder {
    buf: Vec<u8>,
}

impl IndexKeyBuilder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn push_topic(mut self, topic: &str) -> Self {
        self.buf.extend(escape_string(topic.as_bytes()));
        self.buf.push(SEPARATOR);
        self
    }

    pub fn push_index_id(mut self, index_id: &str) -> Self {
        self.buf.extend(escape_string(index_id.as_bytes()));
        self.buf.push(SEPARATOR);
        self
    }

    /// Append one field-value component, terminated by the separator.
    pub fn push_field(mut self, value: &Scalar) -> Self {
        self.buf.extend(encode_component(value));
        self.buf.push(SEPARATOR);
        self
    }

    /// Append the trailing object-id component. Always the final component,
    /// guaranteeing key uniqueness; left raw since nothing ever scans past
    /// it for a separator.
    pub fn push_object_id(mut self, id: &ObjectId) -> Self {
        self.buf.extend_from_slice(id.as_bytes());
        self
    }

    /// The key built so far, consuming the builder.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// The key built so far without consuming the builder — used by the
    /// executor to snapshot a cursor's prefix.
    pub fn as_prefix(&self) -> Vec<u8> {
        self.buf.clone()
    }
}

/// Synthesize an exclusive upper bound matching every key sharing `prefix`:
/// replace the trailing separator with the plus-separator, which sorts
/// strictly above it but below every component-start byte.
pub fn exclusive_upper_bound(prefix: &[u8]) -> Vec<u8> {
    let mut bound = prefix.to_vec();
    if let Some(last) = bound.last_mut() {
        if *last == SEPARATOR {
            *last = PLUS_SEPARATOR;
            return bound;
        }
    }
    bound.push(PLUS_SEPARATOR);
    bound
}
