//! The `Unit` trait and its tag-prefixed wire form: a `(tag, wire-type)` varint header, then a length-delimited
//! or fixed-width payload, with repeated fields emitted element-by-element.

use strata_buf::{
    decode_fixed_i64, decode_len_prefixed, decode_varint, encode_fixed_i64, encode_len_prefixed,
    encode_varint, BufferError, ByteBuffer,
};

use crate::error::{Result, UnitError};
use crate::object_id::ObjectId;
use crate::schema::UnitSchema;
use crate::value::{Cardinality, Scalar, ValueType};

/// A value read out of or written into a unit field by tag.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(Scalar),
    Repeated(Vec<Scalar>),
}

/// A schema-described record that can be addressed by field tag and
/// serialized to the shared wire form.
///
/// `decode` takes `Self: Sized` so the trait stays object-safe for the
/// other methods — callers that only hold a `Box<dyn Unit>` (nested-unit
/// fields, `Operand::SubUnit`) never need to decode into an unknown
/// concrete type, only to read/write/encode it.
pub trait Unit: std::fmt::Debug + Send + Sync {
    fn schema(&self) -> &'static UnitSchema;
    fn get(&self, tag: u32) -> Option<FieldValue>;
    fn set(&mut self, tag: u32, value: FieldValue) -> Result<()>;

    /// Encode every present field into `buf` in schema order.
    fn encode(&self, buf: &mut ByteBuffer) {
        for field in self.schema().fields {
            if let Some(value) = self.get(field.tag) {
                encode_field(buf, field.tag, field.value_type, &value);
            }
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized + Default,
    {
        let mut unit = Self::default();
        let mut pos = 0usize;
        while pos < bytes.len() {
            let (tag, wire_type, consumed) = decode_field_header(&bytes[pos..])?;
            pos += consumed;
            let descriptor = unit
                .schema()
                .field_by_tag(tag)
                .ok_or_else(|| UnitError::ParseFailed(format!("unknown field tag {tag}")))?;
            let (scalar, consumed) =
                decode_scalar_payload(&bytes[pos..], descriptor.value_type, wire_type)?;
            pos += consumed;
            match descriptor.cardinality {
                Cardinality::Single => unit.set(tag, FieldValue::Scalar(scalar))?,
                Cardinality::RepeatedEmbedded => {
                    let mut existing = match unit.get(tag) {
                        Some(FieldValue::Repeated(v)) => v,
                        _ => Vec::new(),
                    };
                    existing.push(scalar);
                    unit.set(tag, FieldValue::Repeated(existing))?;
                }
                Cardinality::RepeatedExternal => {
                    return Err(UnitError::ParseFailed(format!(
                        "field {tag} is externally-addressed and cannot be inlined on the wire"
                    )));
                }
            }
        }
        for field in unit.schema().required_fields() {
            if unit.get(field.tag).is_none() {
                return Err(UnitError::FieldRequiredMissing {
                    tag: field.tag,
                    name: field.name,
                });
            }
        }
        Ok(unit)
    }
}

const WIRE_VARINT: u32 = 0;
const WIRE_FIXED64: u32 = 1;
const WIRE_LEN: u32 = 2;
const WIRE_FIXED32: u32 = 5;

fn wire_type_for(value_type: ValueType) -> u32 {
    match value_type {
        ValueType::Bool
        | ValueType::I8
        | ValueType::I16
        | ValueType::I32
        | ValueType::I64
        | ValueType::U8
        | ValueType::U16
        | ValueType::U32
        | ValueType::U64
        | ValueType::Enum => WIRE_VARINT,
        ValueType::F64 | ValueType::DateTime | ValueType::Time => WIRE_FIXED64,
        ValueType::F32 | ValueType::Date => WIRE_FIXED32,
        ValueType::String
        | ValueType::Bytes
        | ValueType::FixedString(_)
        | ValueType::ObjectId
        | ValueType::DateRange
        | ValueType::NestedOwned
        | ValueType::NestedShared => WIRE_LEN,
    }
}

fn encode_field(buf: &mut ByteBuffer, tag: u32, value_type: ValueType, value: &FieldValue) {
    match value {
        FieldValue::Scalar(scalar) => encode_one(buf, tag, value_type, scalar),
        FieldValue::Repeated(items) => {
            for scalar in items {
                encode_one(buf, tag, value_type, scalar);
            }
        }
    }
}

fn encode_one(buf: &mut ByteBuffer, tag: u32, value_type: ValueType, scalar: &Scalar) {
    let wire_type = wire_type_for(value_type);
    let header = ((tag as u64) << 3) | wire_type as u64;
    let mut out = Vec::new();
    encode_varint(header, &mut out);

    match scalar {
        Scalar::Bool(v) => encode_varint(*v as u64, &mut out),
        Scalar::I8(v) => encode_varint(zigzag(*v as i64), &mut out),
        Scalar::I16(v) => encode_varint(zigzag(*v as i64), &mut out),
        Scalar::I32(v) => encode_varint(zigzag(*v as i64), &mut out),
        Scalar::I64(v) => encode_varint(zigzag(*v), &mut out),
        Scalar::U8(v) => encode_varint(*v as u64, &mut out),
        Scalar::U16(v) => encode_varint(*v as u64, &mut out),
        Scalar::U32(v) => encode_varint(*v as u64, &mut out),
        Scalar::U64(v) => encode_varint(*v, &mut out),
        Scalar::Enum(v) => encode_varint(zigzag(*v as i64), &mut out),
        Scalar::F64(v) => encode_fixed_i64(v.to_bits() as i64, &mut out),
        Scalar::DateTime(v) | Scalar::Time(v) => encode_fixed_i64(*v, &mut out),
        Scalar::F32(v) => out.extend_from_slice(&v.to_be_bytes()),
        Scalar::Date(v) => out.extend_from_slice(&v.to_be_bytes()),
        Scalar::String(v) => encode_len_prefixed(v.as_bytes(), &mut out),
        Scalar::Bytes(v) => encode_len_prefixed(v, &mut out),
        Scalar::ObjectId(v) => encode_len_prefixed(v.as_bytes(), &mut out),
        Scalar::DateRange(start, end) => {
            let mut payload = Vec::with_capacity(8);
            payload.extend_from_slice(&start.to_be_bytes());
            payload.extend_from_slice(&end.to_be_bytes());
            encode_len_prefixed(&payload, &mut out);
        }
    }
    buf.extend(&out);
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

fn map_buf_err(e: BufferError) -> UnitError {
    UnitError::ParseFailed(e.to_string())
}

fn decode_field_header(bytes: &[u8]) -> Result<(u32, u32, usize)> {
    let (header, consumed) = decode_varint(bytes).map_err(map_buf_err)?;
    Ok(((header >> 3) as u32, (header & 0x7) as u32, consumed))
}

fn decode_scalar_payload(
    bytes: &[u8],
    value_type: ValueType,
    wire_type: u32,
) -> Result<(Scalar, usize)> {
    match (value_type, wire_type) {
        (ValueType::Bool, WIRE_VARINT) => {
            let (v, c) = decode_varint(bytes).map_err(map_buf_err)?;
            Ok((Scalar::Bool(v != 0), c))
        }
        (ValueType::I8, WIRE_VARINT) => {
            let (v, c) = decode_varint(bytes).map_err(map_buf_err)?;
            Ok((Scalar::I8(unzigzag(v) as i8), c))
        }
        (ValueType::I16, WIRE_VARINT) => {
            let (v, c) = decode_varint(bytes).map_err(map_buf_err)?;
            Ok((Scalar::I16(unzigzag(v) as i16), c))
        }
        (ValueType::I32, WIRE_VARINT) => {
            let (v, c) = decode_varint(bytes).map_err(map_buf_err)?;
            Ok((Scalar::I32(unzigzag(v) as i32), c))
        }
        (ValueType::I64, WIRE_VARINT) => {
            let (v, c) = decode_varint(bytes).map_err(map_buf_err)?;
            Ok((Scalar::I64(unzigzag(v)), c))
        }
        (ValueType::U8, WIRE_VARINT) => {
            let (v, c) = decode_varint(bytes).map_err(map_buf_err)?;
            Ok((Scalar::U8(v as u8), c))
        }
        (ValueType::U16, WIRE_VARINT) => {
            let (v, c) = decode_varint(bytes).map_err(map_buf_err)?;
            Ok((Scalar::U16(v as u16), c))
        }
        (ValueType::U32, WIRE_VARINT) => {
            let (v, c) = decode_varint(bytes).map_err(map_buf_err)?;
            Ok((Scalar::U32(v as u32), c))
        }
        (ValueType::U64, WIRE_VARINT) => {
            let (v, c) = decode_varint(bytes).map_err(map_buf_err)?;
            Ok((Scalar::U64(v), c))
        }
        (ValueType::Enum, WIRE_VARINT) => {
            let (v, c) = decode_varint(bytes).map_err(map_buf_err)?;
            Ok((Scalar::Enum(unzigzag(v) as i32), c))
        }
        (ValueType::F64, WIRE_FIXED64) => {
            let (raw, c) = decode_fixed_i64(bytes).map_err(map_buf_err)?;
            Ok((Scalar::F64(f64::from_bits(raw as u64)), c))
        }
        (ValueType::DateTime, WIRE_FIXED64) => {
            let (raw, c) = decode_fixed_i64(bytes).map_err(map_buf_err)?;
            Ok((Scalar::DateTime(raw), c))
        }
        (ValueType::Time, WIRE_FIXED64) => {
            let (raw, c) = decode_fixed_i64(bytes).map_err(map_buf_err)?;
            Ok((Scalar::Time(raw), c))
        }
        (ValueType::F32, WIRE_FIXED32) => {
            let raw = take(bytes, 4)?;
            Ok((Scalar::F32(f32::from_be_bytes(raw.try_into().unwrap())), 4))
        }
        (ValueType::Date, WIRE_FIXED32) => {
            let raw = take(bytes, 4)?;
            Ok((Scalar::Date(i32::from_be_bytes(raw.try_into().unwrap())), 4))
        }
        (ValueType::String, WIRE_LEN) => {
            let (raw, c) = decode_len_prefixed(bytes).map_err(map_buf_err)?;
            let s = String::from_utf8(raw.to_vec()).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
            Ok((Scalar::String(s), c))
        }
        (ValueType::FixedString(n), WIRE_LEN) => {
            let (raw, c) = decode_len_prefixed(bytes).map_err(map_buf_err)?;
            if raw.len() != n {
                return Err(UnitError::ParseFailed(format!(
                    "fixed string expected {n} bytes, got {}",
                    raw.len()
                )));
            }
            let s = String::from_utf8(raw.to_vec()).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
            Ok((Scalar::String(s), c))
        }
        (ValueType::Bytes, WIRE_LEN) => {
            let (raw, c) = decode_len_prefixed(bytes).map_err(map_buf_err)?;
            Ok((Scalar::Bytes(raw.to_vec()), c))
        }
        (ValueType::ObjectId, WIRE_LEN) => {
            let (raw, c) = decode_len_prefixed(bytes).map_err(map_buf_err)?;
            let array: [u8; 12] = raw
                .try_into()
                .map_err(|_| UnitError::ParseFailed("object id must be 12 bytes".to_string()))?;
            Ok((Scalar::ObjectId(ObjectId::from_bytes(array)), c))
        }
        (ValueType::DateRange, WIRE_LEN) => {
            let (raw, c) = decode_len_prefixed(bytes).map_err(map_buf_err)?;
            if raw.len() != 8 {
                return Err(UnitError::ParseFailed("date range must be 8 bytes".to_string()));
            }
            let start = i32::from_be_bytes(raw[0..4].try_into().unwrap());
            let end = i32::from_be_bytes(raw[4..8].try_into().unwrap());
            Ok((Scalar::DateRange(start, end), c))
        }
        (other, wt) => Err(UnitError::ParseFailed(format!(
            "wire type {wt} does not match declared field type {other:?}"
        ))),
    }
}

fn take(bytes: &[u8], len: usize) -> Result<&[u8]> {
    if bytes.len() < len {
        return Err(UnitError::ParseFailed("unexpected end of buffer".to_string()));
    }
    Ok(&bytes[..len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Cardinality, FieldDescriptor, ValueType};

    static FIELDS: &[FieldDescriptor] = &[
        FieldDescriptor {
            tag: 1,
            name: "name",
            value_type: ValueType::String,
            cardinality: Cardinality::Single,
            required: true,
            default: None,
        },
        FieldDescriptor {
            tag: 2,
            name: "age",
            value_type: ValueType::I32,
            cardinality: Cardinality::Single,
            required: false,
            default: None,
        },
        FieldDescriptor {
            tag: 3,
            name: "tags",
            value_type: ValueType::String,
            cardinality: Cardinality::RepeatedEmbedded,
            required: false,
            default: None,
        },
    ];
    static SCHEMA: UnitSchema = UnitSchema::new("person", FIELDS);

    #[derive(Debug, Default)]
    struct Person {
        name: Option<String>,
        age: Option<i32>,
        tags: Vec<String>,
    }

    impl Unit for Person {
        fn schema(&self) -> &'static UnitSchema {
            &SCHEMA
        }

        fn get(&self, tag: u32) -> Option<FieldValue> {
            match tag {
                1 => self.name.clone().map(Scalar::String).map(FieldValue::Scalar),
                2 => self.age.map(Scalar::I32).map(FieldValue::Scalar),
                3 if !self.tags.is_empty() => Some(FieldValue::Repeated(
                    self.tags.iter().cloned().map(Scalar::String).collect(),
                )),
                _ => None,
            }
        }

        fn set(&mut self, tag: u32, value: FieldValue) -> Result<()> {
            match (tag, value) {
                (1, FieldValue::Scalar(Scalar::String(s))) => self.name = Some(s),
                (2, FieldValue::Scalar(Scalar::I32(v))) => self.age = Some(v),
                (3, FieldValue::Repeated(items)) => {
                    self.tags = items
                        .into_iter()
                        .map(|s| match s {
                            Scalar::String(s) => Ok(s),
                            _ => Err(UnitError::InvalidType { tag: 3 }),
                        })
                        .collect::<Result<Vec<_>>>()?;
                }
                (t, _) => return Err(UnitError::InvalidType { tag: t }),
            }
            Ok(())
        }
    }

    #[test]
    fn round_trips_scalar_and_repeated_fields() {
        let mut person = Person::default();
        person.set(1, FieldValue::Scalar(Scalar::String("ada".into()))).unwrap();
        person.set(2, FieldValue::Scalar(Scalar::I32(36))).unwrap();
        person
            .set(
                3,
                FieldValue::Repeated(vec![Scalar::String("math".into()), Scalar::String("cs".into())]),
            )
            .unwrap();

        let mut buf = ByteBuffer::new();
        person.encode(&mut buf);

        let decoded = Person::decode(buf.as_slice()).unwrap();
        assert_eq!(decoded.name, Some("ada".to_string()));
        assert_eq!(decoded.age, Some(36));
        assert_eq!(decoded.tags, vec!["math".to_string(), "cs".to_string()]);
    }

    #[test]
    fn missing_required_field_fails_decode() {
        let person = Person {
            name: None,
            age: Some(1),
            tags: vec![],
        };
        let mut buf = ByteBuffer::new();
        person.encode(&mut buf);
        let err = Person::decode(buf.as_slice()).unwrap_err();
        assert!(matches!(err, UnitError::FieldRequiredMissing { tag: 1, .. }));
    }
}
