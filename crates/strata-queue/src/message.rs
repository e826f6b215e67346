//! An outbox record: what happened to one document-store object and
//! whatever payload a consumer needs to replay it, addressed by the
//! producer that posted it.

use strata_unit::{
    Cardinality, DefaultValue, FieldDescriptor, FieldValue, ObjectId, Result as UnitResult, Scalar,
    Unit, UnitError, UnitSchema, ValueType,
};

/// The change a queued message represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxOp {
    Create,
    Update,
    Delete,
}

impl OutboxOp {
    fn to_i32(self) -> i32 {
        match self {
            OutboxOp::Create => 0,
            OutboxOp::Update => 1,
            OutboxOp::Delete => 2,
        }
    }

    fn from_i32(v: i32) -> UnitResult<Self> {
        match v {
            0 => Ok(OutboxOp::Create),
            1 => Ok(OutboxOp::Update),
            2 => Ok(OutboxOp::Delete),
            _ => Err(UnitError::InvalidType { tag: OP_TAG }),
        }
    }
}

pub(crate) const PRODUCER_ID_TAG: u32 = 1;
pub(crate) const OBJECT_ID_TAG: u32 = 2;
pub(crate) const OBJECT_TYPE_TAG: u32 = 3;
const OP_TAG: u32 = 4;
pub(crate) const PAYLOAD_TAG: u32 = 5;
pub(crate) const FAILED_TAG: u32 = 6;
pub(crate) const ERROR_MESSAGE_TAG: u32 = 7;
const EXPIRE_AT_TAG: u32 = 8;
const NOTIFICATION_TAG: u32 = 9;

static FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        tag: PRODUCER_ID_TAG,
        name: "producer_id",
        value_type: ValueType::String,
        cardinality: Cardinality::Single,
        required: true,
        default: None,
    },
    FieldDescriptor {
        tag: OBJECT_ID_TAG,
        name: "object_id",
        value_type: ValueType::ObjectId,
        cardinality: Cardinality::Single,
        required: true,
        default: None,
    },
    FieldDescriptor {
        tag: OBJECT_TYPE_TAG,
        name: "object_type",
        value_type: ValueType::String,
        cardinality: Cardinality::Single,
        required: true,
        default: None,
    },
    FieldDescriptor {
        tag: OP_TAG,
        name: "op",
        value_type: ValueType::I32,
        cardinality: Cardinality::Single,
        required: true,
        default: None,
    },
    FieldDescriptor {
        tag: PAYLOAD_TAG,
        name: "payload",
        value_type: ValueType::Bytes,
        cardinality: Cardinality::Single,
        required: false,
        default: None,
    },
    FieldDescriptor {
        tag: FAILED_TAG,
        name: "failed",
        value_type: ValueType::Bool,
        cardinality: Cardinality::Single,
        required: true,
        default: Some(DefaultValue(Scalar::Bool(false))),
    },
    FieldDescriptor {
        tag: ERROR_MESSAGE_TAG,
        name: "error_message",
        value_type: ValueType::String,
        cardinality: Cardinality::Single,
        required: false,
        default: None,
    },
    FieldDescriptor {
        tag: EXPIRE_AT_TAG,
        name: "expire_at",
        value_type: ValueType::I64,
        cardinality: Cardinality::Single,
        required: false,
        default: None,
    },
    FieldDescriptor {
        tag: NOTIFICATION_TAG,
        name: "notification_payload",
        value_type: ValueType::Bytes,
        cardinality: Cardinality::Single,
        required: false,
        default: None,
    },
];

static SCHEMA: UnitSchema = UnitSchema::new("outbox_message", FIELDS);

/// One queued mutation. `payload` carries the object's encoded bytes for
/// `Create`, an encoded [`strata_unit::UpdateRequest`] for `Update`, and is
/// empty for `Delete` (the target object is fully identified by
/// `object_id`). `notification_payload` is opaque to the queue: it rides
/// along and is handed back verbatim with the message's lifecycle events.
///
/// `expire_at` is this record's own deadline — a message past it is marked
/// failed without a send attempt — distinct from the envelope TTL the
/// document store applies to stored objects. The message's own
/// store-assigned id doubles as the producer position the drain scan orders
/// by, since its timestamp prefix makes ids minted later sort higher.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub producer_id: String,
    pub object_id: ObjectId,
    pub object_type: String,
    pub op: Option<OutboxOp>,
    pub payload: Vec<u8>,
    pub notification_payload: Option<Vec<u8>>,
    pub failed: bool,
    pub error_message: Option<String>,
    pub expire_at: Option<i64>,
}

impl Default for OutboxMessage {
    fn default() -> Self {
        Self {
            producer_id: String::new(),
            object_id: ObjectId::generate(),
            object_type: String::new(),
            op: None,
            payload: Vec::new(),
            notification_payload: None,
            failed: false,
            error_message: None,
            expire_at: None,
        }
    }
}

impl Unit for OutboxMessage {
    fn schema(&self) -> &'static UnitSchema {
        &SCHEMA
    }

    fn get(&self, tag: u32) -> Option<FieldValue> {
        match tag {
            PRODUCER_ID_TAG => Some(FieldValue::Scalar(Scalar::String(self.producer_id.clone()))),
            OBJECT_ID_TAG => Some(FieldValue::Scalar(Scalar::ObjectId(self.object_id))),
            OBJECT_TYPE_TAG => Some(FieldValue::Scalar(Scalar::String(self.object_type.clone()))),
            OP_TAG => self.op.map(|op| FieldValue::Scalar(Scalar::I32(op.to_i32()))),
            PAYLOAD_TAG => Some(FieldValue::Scalar(Scalar::Bytes(self.payload.clone()))),
            NOTIFICATION_TAG => self.notification_payload.clone().map(|b| FieldValue::Scalar(Scalar::Bytes(b))),
            FAILED_TAG => Some(FieldValue::Scalar(Scalar::Bool(self.failed))),
            ERROR_MESSAGE_TAG => self.error_message.clone().map(|s| FieldValue::Scalar(Scalar::String(s))),
            EXPIRE_AT_TAG => self.expire_at.map(|v| FieldValue::Scalar(Scalar::I64(v))),
            _ => None,
        }
    }

    fn set(&mut self, tag: u32, value: FieldValue) -> UnitResult<()> {
        match (tag, value) {
            (PRODUCER_ID_TAG, FieldValue::Scalar(Scalar::String(s))) => self.producer_id = s,
            (OBJECT_ID_TAG, FieldValue::Scalar(Scalar::ObjectId(id))) => self.object_id = id,
            (OBJECT_TYPE_TAG, FieldValue::Scalar(Scalar::String(s))) => self.object_type = s,
            (OP_TAG, FieldValue::Scalar(Scalar::I32(v))) => self.op = Some(OutboxOp::from_i32(v)?),
            (PAYLOAD_TAG, FieldValue::Scalar(Scalar::Bytes(b))) => self.payload = b,
            (NOTIFICATION_TAG, FieldValue::Scalar(Scalar::Bytes(b))) => self.notification_payload = Some(b),
            (FAILED_TAG, FieldValue::Scalar(Scalar::Bool(b))) => self.failed = b,
            (ERROR_MESSAGE_TAG, FieldValue::Scalar(Scalar::String(s))) => self.error_message = Some(s),
            (EXPIRE_AT_TAG, FieldValue::Scalar(Scalar::I64(v))) => self.expire_at = Some(v),
            (t, _) => return Err(UnitError::InvalidType { tag: t }),
        }
        Ok(())
    }
}

impl strata_db::Model for OutboxMessage {
    fn model_id() -> &'static str {
        "outbox_message"
    }

    fn indexes() -> &'static [strata_db::IndexDef] {
        static FIELDS: &[strata_db::IndexFieldSpec] = &[
            strata_db::IndexFieldSpec::new(PRODUCER_ID_TAG, false),
            strata_db::IndexFieldSpec::new(OBJECT_TYPE_TAG, false),
            strata_db::IndexFieldSpec::new(OBJECT_ID_TAG, false),
        ];
        static INDEXES: &[strata_db::IndexDef] = &[strata_db::IndexDef::new(1, FIELDS)];
        INDEXES
    }
}
