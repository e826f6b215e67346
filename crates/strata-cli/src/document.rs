//! A minimal generic record the `put`/`get`/`find` subcommands operate on:
//! an opaque JSON payload addressed by a caller-chosen `key`, optionally
//! tagged for lookup. Demonstrates the document store's typed-record API
//! end to end without committing the CLI to any particular application
//! schema.

use strata_unit::{
    Cardinality, DefaultValue, FieldDescriptor, FieldValue, Result as UnitResult, Scalar, Unit,
    UnitError, UnitSchema, ValueType,
};

const KEY_TAG: u32 = 1;
const TAG_TAG: u32 = 2;
const DATA_TAG: u32 = 3;

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
        tag: TAG_TAG,
        name: "tag",
        value_type: ValueType::String,
        cardinality: Cardinality::Single,
        required: false,
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

static SCHEMA: UnitSchema = UnitSchema::new("document", FIELDS);

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub key: String,
    pub tag: Option<String>,
    pub data: Vec<u8>,
}

impl Unit for Document {
    fn schema(&self) -> &'static UnitSchema {
        &SCHEMA
    }

    fn get(&self, tag: u32) -> Option<FieldValue> {
        match tag {
            KEY_TAG => Some(FieldValue::Scalar(Scalar::String(self.key.clone()))),
            TAG_TAG => self.tag.clone().map(|s| FieldValue::Scalar(Scalar::String(s))),
            DATA_TAG => Some(FieldValue::Scalar(Scalar::Bytes(self.data.clone()))),
            _ => None,
        }
    }

    fn set(&mut self, tag: u32, value: FieldValue) -> UnitResult<()> {
        match (tag, value) {
            (KEY_TAG, FieldValue::Scalar(Scalar::String(s))) => self.key = s,
            (TAG_TAG, FieldValue::Scalar(Scalar::String(s))) => self.tag = Some(s),
            (DATA_TAG, FieldValue::Scalar(Scalar::Bytes(b))) => self.data = b,
            (t, _) => return Err(UnitError::InvalidType { tag: t }),
        }
        Ok(())
    }
}

impl strata_db::Model for Document {
    fn model_id() -> &'static str {
        "document"
    }

    fn indexes() -> &'static [strata_db::IndexDef] {
        static KEY_FIELDS: &[strata_db::IndexFieldSpec] = &[strata_db::IndexFieldSpec::new(KEY_TAG, false)];
        static TAG_FIELDS: &[strata_db::IndexFieldSpec] = &[strata_db::IndexFieldSpec::new(TAG_TAG, false)];
        static INDEXES: &[strata_db::IndexDef] = &[
            strata_db::IndexDef::new(1, KEY_FIELDS),
            strata_db::IndexDef::new(2, TAG_FIELDS),
        ];
        INDEXES
    }
}
