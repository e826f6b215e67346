//! The object model this daemon's producer queue drains. A stand-in for
//! whatever record type an embedding application actually posts through
//! [`strata_queue::ProducerQueue`] — same shape as `strata-cli`'s demo
//! document, kept separate since each binary's schema is its own.

use strata_unit::{
    Cardinality, DefaultValue, FieldDescriptor, FieldValue, Result as UnitResult, Scalar, Unit,
    UnitError, UnitSchema, ValueType,
};

const KEY_TAG: u32 = 1;
const DATA_TAG: u32 = 2;

static FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        tag: KEY_TAG,
        name: "key",
        value_type: ValueType::String,
        cardinality: Cardinality::Single,
        required: true,
        default: None,
    },
    FieldDescriptor {
        tag: DATA_TAG,
        name: "data",
        value_type: ValueType::Bytes,
        cardinality: Cardinality::Single,
        required: false,
        default: Some(DefaultValue(Scalar::Bytes(Vec::new()))),
    },
];

static SCHEMA: UnitSchema = UnitSchema::new("record", FIELDS);

#[derive(Debug, Clone, Default)]
pub struct Record {
    pub key: String,
    pub data: Vec<u8>,
}

impl Unit for Record {
    fn schema(&self) -> &'static UnitSchema {
        &SCHEMA
    }

    fn get(&self, tag: u32) -> Option<FieldValue> {
        match tag {
            KEY_TAG => Some(FieldValue::Scalar(Scalar::String(self.key.clone()))),
            DATA_TAG => Some(FieldValue::Scalar(Scalar::Bytes(self.data.clone()))),
            _ => None,
        }
    }

    fn set(&mut self, tag: u32, value: FieldValue) -> UnitResult<()> {
        match (tag, value) {
            (KEY_TAG, FieldValue::Scalar(Scalar::String(s))) => self.key = s,
            (DATA_TAG, FieldValue::Scalar(Scalar::Bytes(b))) => self.data = b,
            (t, _) => return Err(UnitError::InvalidType { tag: t }),
        }
        Ok(())
    }
}

impl strata_db::Model for Record {
    fn model_id() -> &'static str {
        "record"
    }

    fn indexes() -> &'static [strata_db::IndexDef] {
        static KEY_FIELDS: &[strata_db::IndexFieldSpec] = &[strata_db::IndexFieldSpec::new(KEY_TAG, false)];
        static INDEXES: &[strata_db::IndexDef] = &[strata_db::IndexDef::new(1, KEY_FIELDS)];
        INDEXES
    }
}
