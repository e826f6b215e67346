//! Update requests: a list of field operations addressed by [`Path`], serialized with the same tag-prefixed wire primitives as
//! [`crate::unit::Unit`] so they can cross process boundaries (consumed
//! as-is by the producer queue's coalescing step).

use strata_buf::{decode_len_prefixed, decode_varint, encode_len_prefixed, encode_varint, ByteBuffer};

use crate::error::{Result, UnitError};
use crate::path::{self, Path, PathSegment};
use crate::unit::Unit;
use crate::value::Scalar;

/// The mutation an update operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Set,
    Unset,
    Inc,
    Push,
    Pop,
    AppendTo,
    PrependTo,
    EraseElement,
}

/// The value an operation carries: a single scalar, a vector of scalars
/// (for `append_to`/`prepend_to`), or a nested unit.
pub enum Operand {
    Scalar(Scalar),
    Vector(Vec<Scalar>),
    SubUnit(Box<dyn Unit>),
}

impl std::fmt::Debug for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Scalar(s) => f.debug_tuple("Scalar").field(s).finish(),
            Operand::Vector(v) => f.debug_tuple("Vector").field(v).finish(),
            Operand::SubUnit(u) => f.debug_tuple("SubUnit").field(u).finish(),
        }
    }
}

/// One field operation within an [`UpdateRequest`].
#[derive(Debug)]
pub struct FieldOp {
    pub path: Path,
    pub op: UpdateOp,
    pub value: Operand,
}

/// An ordered batch of field operations, applied left-to-right.
#[derive(Debug, Default)]
pub struct UpdateRequest(pub Vec<FieldOp>);

/// Apply every operation in `request` to `unit` in order, validating each
/// path/operator/type combination before mutating.
pub fn apply(unit: &mut dyn Unit, request: &UpdateRequest) -> Result<()> {
    for field_op in &request.0 {
        apply_one(unit, field_op)?;
    }
    Ok(())
}

fn apply_one(unit: &mut dyn Unit, field_op: &FieldOp) -> Result<()> {
    match (&field_op.op, &field_op.value) {
        (UpdateOp::Set, Operand::Scalar(s)) => path::set_at(unit, &field_op.path, s.clone()),
        (UpdateOp::Unset, _) => path::unset_at(unit, &field_op.path),
        (UpdateOp::Inc, Operand::Scalar(delta)) => {
            let current = path::get_at(unit, &field_op.path)?
                .ok_or_else(|| UnitError::PathNotFound("inc target is unset".to_string()))?;
            let incremented = add_scalar(&current, delta)?;
            path::set_at(unit, &field_op.path, incremented)
        }
        (UpdateOp::Push, Operand::Scalar(s)) => path::append_at(unit, &field_op.path, s.clone()),
        (UpdateOp::Pop, _) => pop_last(unit, &field_op.path),
        (UpdateOp::AppendTo, Operand::Vector(items)) => {
            for item in items {
                path::append_at(unit, &field_op.path, item.clone())?;
            }
            Ok(())
        }
        (UpdateOp::PrependTo, Operand::Vector(items)) => prepend(unit, &field_op.path, items),
        (UpdateOp::EraseElement, _) => path::unset_at(unit, &field_op.path),
        _ => Err(UnitError::UnsupportedOperator),
    }
}

fn add_scalar(a: &Scalar, b: &Scalar) -> Result<Scalar> {
    match (a, b) {
        (Scalar::I8(x), Scalar::I8(y)) => Ok(Scalar::I8(x.wrapping_add(*y))),
        (Scalar::I16(x), Scalar::I16(y)) => Ok(Scalar::I16(x.wrapping_add(*y))),
        (Scalar::I32(x), Scalar::I32(y)) => Ok(Scalar::I32(x.wrapping_add(*y))),
        (Scalar::I64(x), Scalar::I64(y)) => Ok(Scalar::I64(x.wrapping_add(*y))),
        (Scalar::U8(x), Scalar::U8(y)) => Ok(Scalar::U8(x.wrapping_add(*y))),
        (Scalar::U16(x), Scalar::U16(y)) => Ok(Scalar::U16(x.wrapping_add(*y))),
        (Scalar::U32(x), Scalar::U32(y)) => Ok(Scalar::U32(x.wrapping_add(*y))),
        (Scalar::U64(x), Scalar::U64(y)) => Ok(Scalar::U64(x.wrapping_add(*y))),
        (Scalar::F32(x), Scalar::F32(y)) => Ok(Scalar::F32(x + y)),
        (Scalar::F64(x), Scalar::F64(y)) => Ok(Scalar::F64(x + y)),
        _ => Err(UnitError::UnsupportedOperator),
    }
}

fn pop_last(unit: &mut dyn Unit, path: &Path) -> Result<()> {
    let tag = match path.0.first() {
        Some(PathSegment::Field(tag)) => *tag,
        _ => return Err(UnitError::PathNotFound("empty path".to_string())),
    };
    if let Some(crate::unit::FieldValue::Repeated(mut items)) = unit.get(tag) {
        items.pop();
        unit.set(tag, crate::unit::FieldValue::Repeated(items))?;
    }
    Ok(())
}

fn prepend(unit: &mut dyn Unit, path: &Path, items: &[Scalar]) -> Result<()> {
    let tag = match path.0.first() {
        Some(PathSegment::Field(tag)) => *tag,
        _ => return Err(UnitError::PathNotFound("empty path".to_string())),
    };
    let existing = match unit.get(tag) {
        Some(crate::unit::FieldValue::Repeated(v)) => v,
        _ => Vec::new(),
    };
    let mut combined = items.to_vec();
    combined.extend(existing);
    unit.set(tag, crate::unit::FieldValue::Repeated(combined))
}

fn op_code(op: UpdateOp) -> u64 {
    match op {
        UpdateOp::Set => 0,
        UpdateOp::Unset => 1,
        UpdateOp::Inc => 2,
        UpdateOp::Push => 3,
        UpdateOp::Pop => 4,
        UpdateOp::AppendTo => 5,
        UpdateOp::PrependTo => 6,
        UpdateOp::EraseElement => 7,
    }
}

fn op_from_code(code: u64) -> Result<UpdateOp> {
    Ok(match code {
        0 => UpdateOp::Set,
        1 => UpdateOp::Unset,
        2 => UpdateOp::Inc,
        3 => UpdateOp::Push,
        4 => UpdateOp::Pop,
        5 => UpdateOp::AppendTo,
        6 => UpdateOp::PrependTo,
        7 => UpdateOp::EraseElement,
        other => return Err(UnitError::ParseFailed(format!("unknown update op code {other}"))),
    })
}

impl UpdateRequest {
    /// Encode as a self-describing byte string: a varint count of field
    /// operations, then per operation a varint-prefixed path, an op code,
    /// and a tagged operand. `SubUnit` operands are encoded via the nested
    /// unit's own [`Unit::encode`].
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_varint(self.0.len() as u64, &mut out);
        for field_op in &self.0 {
            encode_path(&field_op.path, &mut out);
            encode_varint(op_code(field_op.op), &mut out);
            encode_operand(&field_op.value, &mut out);
        }
        out
    }

    /// Decode a byte string produced by [`Self::encode`]. `decode_sub_unit`
    /// is used to reconstruct `SubUnit` operands — the wire form alone
    /// cannot know which concrete [`Unit`] type a nested payload decodes
    /// to, so the caller supplies that mapping (keyed by the operation's
    /// field tag).
    pub fn decode(
        bytes: &[u8],
        decode_sub_unit: &dyn Fn(u32, &[u8]) -> Result<Box<dyn Unit>>,
    ) -> Result<Self> {
        let mut pos = 0usize;
        let (count, consumed) = decode_varint(&bytes[pos..]).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
        pos += consumed;
        let mut ops = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (path, consumed) = decode_path(&bytes[pos..])?;
            pos += consumed;
            let (code, consumed) = decode_varint(&bytes[pos..]).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
            pos += consumed;
            let op = op_from_code(code)?;
            let tag = match path.0.first() {
                Some(PathSegment::Field(tag)) => *tag,
                _ => 0,
            };
            let (value, consumed) = decode_operand(&bytes[pos..], tag, decode_sub_unit)?;
            pos += consumed;
            ops.push(FieldOp { path, op, value });
        }
        Ok(UpdateRequest(ops))
    }
}

fn encode_path(path: &Path, out: &mut Vec<u8>) {
    encode_varint(path.0.len() as u64, out);
    for segment in &path.0 {
        match segment {
            PathSegment::Field(tag) => {
                out.push(0);
                encode_varint(*tag as u64, out);
            }
            PathSegment::Index(i) => {
                out.push(1);
                encode_varint(*i as u64, out);
            }
            PathSegment::Name(name) => {
                out.push(2);
                encode_len_prefixed(name.as_bytes(), out);
            }
        }
    }
}

fn decode_path(bytes: &[u8]) -> Result<(Path, usize)> {
    let mut pos = 0usize;
    let (len, consumed) = decode_varint(&bytes[pos..]).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
    pos += consumed;
    let mut segments = Vec::with_capacity(len as usize);
    for _ in 0..len {
        let kind = bytes[pos];
        pos += 1;
        match kind {
            0 => {
                let (tag, c) = decode_varint(&bytes[pos..]).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
                pos += c;
                segments.push(PathSegment::Field(tag as u32));
            }
            1 => {
                let (i, c) = decode_varint(&bytes[pos..]).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
                pos += c;
                segments.push(PathSegment::Index(i as usize));
            }
            2 => {
                let (name, c) = decode_len_prefixed(&bytes[pos..]).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
                let name = String::from_utf8(name.to_vec()).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
                pos += c;
                segments.push(PathSegment::Name(name));
            }
            other => return Err(UnitError::ParseFailed(format!("unknown path segment kind {other}"))),
        }
    }
    Ok((Path(segments), pos))
}

const OPERAND_SCALAR: u8 = 0;
const OPERAND_VECTOR: u8 = 1;
const OPERAND_SUB_UNIT: u8 = 2;

fn encode_operand(operand: &Operand, out: &mut Vec<u8>) {
    match operand {
        Operand::Scalar(s) => {
            out.push(OPERAND_SCALAR);
            encode_scalar(s, out);
        }
        Operand::Vector(items) => {
            out.push(OPERAND_VECTOR);
            encode_varint(items.len() as u64, out);
            for item in items {
                encode_scalar(item, out);
            }
        }
        Operand::SubUnit(unit) => {
            out.push(OPERAND_SUB_UNIT);
            let mut buf = ByteBuffer::new();
            unit.encode(&mut buf);
            encode_len_prefixed(buf.as_slice(), out);
        }
    }
}

fn decode_operand(
    bytes: &[u8],
    tag: u32,
    decode_sub_unit: &dyn Fn(u32, &[u8]) -> Result<Box<dyn Unit>>,
) -> Result<(Operand, usize)> {
    let kind = bytes[0];
    let mut pos = 1usize;
    match kind {
        OPERAND_SCALAR => {
            let (scalar, consumed) = decode_scalar(&bytes[pos..])?;
            pos += consumed;
            Ok((Operand::Scalar(scalar), pos))
        }
        OPERAND_VECTOR => {
            let (len, consumed) = decode_varint(&bytes[pos..]).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
            pos += consumed;
            let mut items = Vec::with_capacity(len as usize);
            for _ in 0..len {
                let (scalar, consumed) = decode_scalar(&bytes[pos..])?;
                pos += consumed;
                items.push(scalar);
            }
            Ok((Operand::Vector(items), pos))
        }
        OPERAND_SUB_UNIT => {
            let (payload, consumed) = decode_len_prefixed(&bytes[pos..]).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
            pos += consumed;
            let sub_unit = decode_sub_unit(tag, payload)?;
            Ok((Operand::SubUnit(sub_unit), pos))
        }
        other => Err(UnitError::ParseFailed(format!("unknown operand kind {other}"))),
    }
}

// Scalars inside an update request use a self-describing
// (type-tag, payload) shape rather than the field-schema-driven dispatch
// `Unit::encode` uses, since an update request carries no schema of its
// own. Every variant is covered so a forwarded request decodes losslessly
// in another process.
fn encode_scalar(scalar: &Scalar, out: &mut Vec<u8>) {
    match scalar {
        Scalar::Bool(v) => {
            out.push(0);
            out.push(*v as u8);
        }
        Scalar::I8(v) => {
            out.push(1);
            encode_varint(zigzag(*v as i64), out);
        }
        Scalar::I16(v) => {
            out.push(2);
            encode_varint(zigzag(*v as i64), out);
        }
        Scalar::I32(v) => {
            out.push(3);
            encode_varint(zigzag(*v as i64), out);
        }
        Scalar::I64(v) => {
            out.push(4);
            encode_varint(zigzag(*v), out);
        }
        Scalar::U8(v) => {
            out.push(5);
            encode_varint(*v as u64, out);
        }
        Scalar::U16(v) => {
            out.push(6);
            encode_varint(*v as u64, out);
        }
        Scalar::U32(v) => {
            out.push(7);
            encode_varint(*v as u64, out);
        }
        Scalar::U64(v) => {
            out.push(8);
            encode_varint(*v, out);
        }
        Scalar::F32(v) => {
            out.push(9);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Scalar::F64(v) => {
            out.push(10);
            out.extend_from_slice(&v.to_be_bytes());
        }
        Scalar::String(v) => {
            out.push(11);
            encode_len_prefixed(v.as_bytes(), out);
        }
        Scalar::Bytes(v) => {
            out.push(12);
            encode_len_prefixed(v, out);
        }
        Scalar::Enum(v) => {
            out.push(13);
            encode_varint(zigzag(*v as i64), out);
        }
        Scalar::ObjectId(v) => {
            out.push(14);
            out.extend_from_slice(v.as_bytes());
        }
        Scalar::Date(v) => {
            out.push(15);
            encode_varint(zigzag(*v as i64), out);
        }
        Scalar::Time(v) => {
            out.push(16);
            encode_varint(zigzag(*v), out);
        }
        Scalar::DateTime(v) => {
            out.push(17);
            encode_varint(zigzag(*v), out);
        }
        Scalar::DateRange(start, end) => {
            out.push(18);
            encode_varint(zigzag(*start as i64), out);
            encode_varint(zigzag(*end as i64), out);
        }
    }
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

fn decode_scalar(bytes: &[u8]) -> Result<(Scalar, usize)> {
    let map_err = |e: strata_buf::BufferError| UnitError::ParseFailed(e.to_string());
    let kind = bytes[0];
    let mut pos = 1usize;
    let varint = |pos: &mut usize| -> Result<u64> {
        let (v, c) = decode_varint(&bytes[*pos..]).map_err(map_err)?;
        *pos += c;
        Ok(v)
    };
    match kind {
        0 => {
            if bytes.len() < 2 {
                return Err(UnitError::ParseFailed("truncated bool operand".to_string()));
            }
            Ok((Scalar::Bool(bytes[pos] != 0), pos + 1))
        }
        1 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::I8(unzigzag(v) as i8), pos))
        }
        2 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::I16(unzigzag(v) as i16), pos))
        }
        3 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::I32(unzigzag(v) as i32), pos))
        }
        4 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::I64(unzigzag(v)), pos))
        }
        5 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::U8(v as u8), pos))
        }
        6 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::U16(v as u16), pos))
        }
        7 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::U32(v as u32), pos))
        }
        8 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::U64(v), pos))
        }
        9 => {
            if bytes.len() < pos + 4 {
                return Err(UnitError::ParseFailed("truncated f32 operand".to_string()));
            }
            let raw: [u8; 4] = bytes[pos..pos + 4].try_into().unwrap();
            Ok((Scalar::F32(f32::from_be_bytes(raw)), pos + 4))
        }
        10 => {
            if bytes.len() < pos + 8 {
                return Err(UnitError::ParseFailed("truncated f64 operand".to_string()));
            }
            let raw: [u8; 8] = bytes[pos..pos + 8].try_into().unwrap();
            Ok((Scalar::F64(f64::from_be_bytes(raw)), pos + 8))
        }
        11 => {
            let (raw, c) = decode_len_prefixed(&bytes[pos..]).map_err(map_err)?;
            let s = String::from_utf8(raw.to_vec()).map_err(|e| UnitError::ParseFailed(e.to_string()))?;
            Ok((Scalar::String(s), pos + c))
        }
        12 => {
            let (raw, c) = decode_len_prefixed(&bytes[pos..]).map_err(map_err)?;
            Ok((Scalar::Bytes(raw.to_vec()), pos + c))
        }
        13 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::Enum(unzigzag(v) as i32), pos))
        }
        14 => {
            if bytes.len() < pos + 12 {
                return Err(UnitError::ParseFailed("truncated object id operand".to_string()));
            }
            let raw: [u8; 12] = bytes[pos..pos + 12].try_into().unwrap();
            Ok((Scalar::ObjectId(crate::object_id::ObjectId::from_bytes(raw)), pos + 12))
        }
        15 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::Date(unzigzag(v) as i32), pos))
        }
        16 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::Time(unzigzag(v)), pos))
        }
        17 => {
            let v = varint(&mut pos)?;
            Ok((Scalar::DateTime(unzigzag(v)), pos))
        }
        18 => {
            let start = varint(&mut pos)?;
            let end = varint(&mut pos)?;
            Ok((Scalar::DateRange(unzigzag(start) as i32, unzigzag(end) as i32), pos))
        }
        other => Err(UnitError::ParseFailed(format!("unsupported scalar kind {other} in update wire form"))),
    }
}
