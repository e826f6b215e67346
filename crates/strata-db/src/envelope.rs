//! Wire form for a stored object's envelope: the unit payload
//! plus identity, lifecycle timestamps, and an optional TTL marker, written
//! as the value half of a primary-key row.

use strata_buf::{decode_fixed_i64, decode_len_prefixed, encode_fixed_i64, encode_len_prefixed, ByteBuffer};
use strata_unit::{ObjectId, StoredObject, TopicId, Unit};

use crate::error::{Result, StoreError};

const TTL_ABSENT: u8 = 0;
const TTL_PRESENT: u8 = 1;

/// Serialize `stored`: `[len-prefixed unit bytes][12-byte id][8-byte
/// created_at][8-byte updated_at][ttl tag, +8 bytes if present][len-prefixed
/// topic]`.
pub fn encode<U: Unit>(stored: &StoredObject<U>) -> Vec<u8> {
    let mut unit_buf = ByteBuffer::new();
    stored.object.encode(&mut unit_buf);

    let mut out = Vec::new();
    encode_len_prefixed(unit_buf.as_slice(), &mut out);
    out.extend_from_slice(stored.id.as_bytes());
    encode_fixed_i64(stored.created_at, &mut out);
    encode_fixed_i64(stored.updated_at, &mut out);
    match stored.expire_at {
        Some(deadline) => {
            out.push(TTL_PRESENT);
            encode_fixed_i64(deadline, &mut out);
        }
        None => out.push(TTL_ABSENT),
    }
    encode_len_prefixed(stored.topic.0.as_bytes(), &mut out);
    out
}

/// TTL check against raw envelope bytes without decoding the unit payload,
/// for compaction filters that must stay cheap. Malformed bytes are treated
/// as unexpired; the read path surfaces the parse error instead.
pub fn is_expired_raw(bytes: &[u8], now_millis: i64) -> bool {
    let Ok((_, consumed)) = decode_len_prefixed(bytes) else {
        return false;
    };
    // Skip the 12-byte object id and the two fixed-width timestamps.
    let pos = consumed + 12 + 16;
    match bytes.get(pos) {
        Some(&TTL_PRESENT) => decode_fixed_i64(&bytes[pos + 1..])
            .map(|(deadline, _)| now_millis >= deadline)
            .unwrap_or(false),
        _ => false,
    }
}

/// Inverse of [`encode`].
pub fn decode<U: Unit + Default>(bytes: &[u8]) -> Result<StoredObject<U>> {
    let mut pos = 0usize;

    let (unit_bytes, consumed) =
        decode_len_prefixed(&bytes[pos..]).map_err(|e| StoreError::ParseFailed(e.to_string()))?;
    let object = U::decode(unit_bytes)?;
    pos += consumed;

    if bytes.len() < pos + 12 {
        return Err(StoreError::ParseFailed("envelope truncated before object id".to_string()));
    }
    let id = ObjectId::from_bytes(bytes[pos..pos + 12].try_into().unwrap());
    pos += 12;

    let (created_at, consumed) =
        decode_fixed_i64(&bytes[pos..]).map_err(|e| StoreError::ParseFailed(e.to_string()))?;
    pos += consumed;
    let (updated_at, consumed) =
        decode_fixed_i64(&bytes[pos..]).map_err(|e| StoreError::ParseFailed(e.to_string()))?;
    pos += consumed;

    if bytes.len() <= pos {
        return Err(StoreError::ParseFailed("envelope truncated before ttl tag".to_string()));
    }
    let ttl_tag = bytes[pos];
    pos += 1;
    let expire_at = match ttl_tag {
        TTL_ABSENT => None,
        TTL_PRESENT => {
            let (deadline, consumed) =
                decode_fixed_i64(&bytes[pos..]).map_err(|e| StoreError::ParseFailed(e.to_string()))?;
            pos += consumed;
            Some(deadline)
        }
        other => return Err(StoreError::ParseFailed(format!("bad ttl tag {other}"))),
    };

    let (topic_bytes, _) =
        decode_len_prefixed(&bytes[pos..]).map_err(|e| StoreError::ParseFailed(e.to_string()))?;
    let topic = String::from_utf8(topic_bytes.to_vec()).map_err(|e| StoreError::ParseFailed(e.to_string()))?;

    Ok(StoredObject {
        id,
        created_at,
        updated_at,
        expire_at,
        topic: TopicId(topic),
        object,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_unit::{Cardinality, FieldDescriptor, FieldValue, Result as UnitResult, Scalar, UnitSchema, ValueType};

    static FIELDS: &[FieldDescriptor] = &[FieldDescriptor {
        tag: 1,
        name: "name",
        value_type: ValueType::String,
        cardinality: Cardinality::Single,
        required: false,
        default: None,
    }];
    static SCHEMA: UnitSchema = UnitSchema::new("widget", FIELDS);

    #[derive(Debug, Default, PartialEq)]
    struct Widget {
        name: Option<String>,
    }

    impl Unit for Widget {
        fn schema(&self) -> &'static UnitSchema {
            &SCHEMA
        }

        fn get(&self, tag: u32) -> Option<FieldValue> {
            match tag {
                1 => self.name.clone().map(Scalar::String).map(FieldValue::Scalar),
                _ => None,
            }
        }

        fn set(&mut self, tag: u32, value: FieldValue) -> UnitResult<()> {
            match (tag, value) {
                (1, FieldValue::Scalar(Scalar::String(s))) => self.name = Some(s),
                _ => {}
            }
            Ok(())
        }
    }

    #[test]
    fn round_trips_envelope_without_ttl() {
        let stored = StoredObject::new(
            TopicId::new("orders"),
            Widget { name: Some("bolt".to_string()) },
            1_000,
        );
        let bytes = encode(&stored);
        let decoded: StoredObject<Widget> = decode(&bytes).unwrap();
        assert_eq!(decoded.id, stored.id);
        assert_eq!(decoded.created_at, 1_000);
        assert_eq!(decoded.expire_at, None);
        assert_eq!(decoded.topic.0, "orders");
        assert_eq!(decoded.object.name, Some("bolt".to_string()));
    }

    #[test]
    fn round_trips_envelope_with_ttl() {
        let stored = StoredObject::new(TopicId::new("sessions"), Widget::default(), 1_000).with_ttl(30, 1_000);
        let bytes = encode(&stored);
        let decoded: StoredObject<Widget> = decode(&bytes).unwrap();
        assert_eq!(decoded.expire_at, Some(31_000));
    }
}
