//! The three ACL relation tables, each a [`strata_db::Model`]
//! in its own right so the checker reuses the document store's indexing
//! and transactions instead of a bespoke permissions backend.

use strata_db::{IndexDef, IndexFieldSpec, Model};
use strata_unit::{Cardinality, DefaultValue, FieldDescriptor, FieldValue, ObjectId, Result as UnitResult, Scalar, Unit, UnitError, UnitSchema, ValueType};

const RELATION_OBJECT_ID_TAG: u32 = 1;
const RELATION_SUBJECT_ID_TAG: u32 = 2;
const RELATION_ROLE_TAG: u32 = 3;

static RELATION_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor { tag: RELATION_OBJECT_ID_TAG, name: "object_id", value_type: ValueType::ObjectId, cardinality: Cardinality::Single, required: true, default: None },
    FieldDescriptor { tag: RELATION_SUBJECT_ID_TAG, name: "subject_id", value_type: ValueType::ObjectId, cardinality: Cardinality::Single, required: true, default: None },
    FieldDescriptor { tag: RELATION_ROLE_TAG, name: "role", value_type: ValueType::String, cardinality: Cardinality::Single, required: true, default: None },
];
static RELATION_SCHEMA: UnitSchema = UnitSchema::new("acl_relation", RELATION_FIELDS);

/// A subject holds `role` on an object, scoped to the topic the relation
/// row is stored under.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AclRelation {
    pub object_id: Option<ObjectId>,
    pub subject_id: Option<ObjectId>,
    pub role: Option<String>,
}

impl Unit for AclRelation {
    fn schema(&self) -> &'static UnitSchema {
        &RELATION_SCHEMA
    }

    fn get(&self, tag: u32) -> Option<FieldValue> {
        match tag {
            RELATION_OBJECT_ID_TAG => self.object_id.map(|v| FieldValue::Scalar(Scalar::ObjectId(v))),
            RELATION_SUBJECT_ID_TAG => self.subject_id.map(|v| FieldValue::Scalar(Scalar::ObjectId(v))),
            RELATION_ROLE_TAG => self.role.clone().map(|s| FieldValue::Scalar(Scalar::String(s))),
            _ => None,
        }
    }

    fn set(&mut self, tag: u32, value: FieldValue) -> UnitResult<()> {
        match (tag, value) {
            (RELATION_OBJECT_ID_TAG, FieldValue::Scalar(Scalar::ObjectId(v))) => self.object_id = Some(v),
            (RELATION_SUBJECT_ID_TAG, FieldValue::Scalar(Scalar::ObjectId(v))) => self.subject_id = Some(v),
            (RELATION_ROLE_TAG, FieldValue::Scalar(Scalar::String(s))) => self.role = Some(s),
            (t, _) => return Err(UnitError::InvalidType { tag: t }),
        }
        Ok(())
    }
}

impl Model for AclRelation {
    fn model_id() -> &'static str {
        "acl_relation"
    }

    fn indexes() -> &'static [IndexDef] {
        static FIELDS: &[IndexFieldSpec] = &[IndexFieldSpec::new(RELATION_OBJECT_ID_TAG, false), IndexFieldSpec::new(RELATION_SUBJECT_ID_TAG, false)];
        static INDEXES: &[IndexDef] = &[IndexDef::new(1, FIELDS)];
        INDEXES
    }
}

const ROLE_OP_ROLE_TAG: u32 = 1;
const ROLE_OP_OPERATION_TAG: u32 = 2;
const ROLE_OP_GRANT_TAG: u32 = 3;

static ROLE_OP_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor { tag: ROLE_OP_ROLE_TAG, name: "role", value_type: ValueType::String, cardinality: Cardinality::Single, required: true, default: None },
    FieldDescriptor { tag: ROLE_OP_OPERATION_TAG, name: "operation", value_type: ValueType::String, cardinality: Cardinality::Single, required: true, default: None },
    FieldDescriptor { tag: ROLE_OP_GRANT_TAG, name: "grant", value_type: ValueType::Bool, cardinality: Cardinality::Single, required: true, default: Some(DefaultValue(Scalar::Bool(false))) },
];
static ROLE_OP_SCHEMA: UnitSchema = UnitSchema::new("acl_role_operation", ROLE_OP_FIELDS);

/// A role either grants or denies one named operation outright.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AclRoleOperation {
    pub role: Option<String>,
    pub operation: Option<String>,
    pub grant: bool,
}

impl Unit for AclRoleOperation {
    fn schema(&self) -> &'static UnitSchema {
        &ROLE_OP_SCHEMA
    }

    fn get(&self, tag: u32) -> Option<FieldValue> {
        match tag {
            ROLE_OP_ROLE_TAG => self.role.clone().map(|s| FieldValue::Scalar(Scalar::String(s))),
            ROLE_OP_OPERATION_TAG => self.operation.clone().map(|s| FieldValue::Scalar(Scalar::String(s))),
            ROLE_OP_GRANT_TAG => Some(FieldValue::Scalar(Scalar::Bool(self.grant))),
            _ => None,
        }
    }

    fn set(&mut self, tag: u32, value: FieldValue) -> UnitResult<()> {
        match (tag, value) {
            (ROLE_OP_ROLE_TAG, FieldValue::Scalar(Scalar::String(s))) => self.role = Some(s),
            (ROLE_OP_OPERATION_TAG, FieldValue::Scalar(Scalar::String(s))) => self.operation = Some(s),
            (ROLE_OP_GRANT_TAG, FieldValue::Scalar(Scalar::Bool(b))) => self.grant = b,
            (t, _) => return Err(UnitError::InvalidType { tag: t }),
        }
        Ok(())
    }
}

impl Model for AclRoleOperation {
    fn model_id() -> &'static str {
        "acl_role_operation"
    }

    fn indexes() -> &'static [IndexDef] {
        static FIELDS: &[IndexFieldSpec] = &[IndexFieldSpec::new(ROLE_OP_ROLE_TAG, false), IndexFieldSpec::new(ROLE_OP_OPERATION_TAG, false)];
        static INDEXES: &[IndexDef] = &[IndexDef::new(1, FIELDS)];
        INDEXES
    }
}

const FAMILY_ROLE_TAG: u32 = 1;
const FAMILY_OP_FAMILY_TAG: u32 = 2;
const FAMILY_ACCESS_MASK_TAG: u32 = 3;

static FAMILY_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor { tag: FAMILY_ROLE_TAG, name: "role", value_type: ValueType::String, cardinality: Cardinality::Single, required: true, default: None },
    FieldDescriptor { tag: FAMILY_OP_FAMILY_TAG, name: "op_family", value_type: ValueType::String, cardinality: Cardinality::Single, required: true, default: None },
    FieldDescriptor { tag: FAMILY_ACCESS_MASK_TAG, name: "access_mask", value_type: ValueType::U32, cardinality: Cardinality::Single, required: true, default: None },
];
static FAMILY_SCHEMA: UnitSchema = UnitSchema::new("acl_op_family_access", FAMILY_FIELDS);

/// A role's coarse-grained access bitmask over an operation family, the
/// fallback consulted when no per-operation rule exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AclOpFamilyAccess {
    pub role: Option<String>,
    pub op_family: Option<String>,
    pub access_mask: u32,
}

impl Unit for AclOpFamilyAccess {
    fn schema(&self) -> &'static UnitSchema {
        &FAMILY_SCHEMA
    }

    fn get(&self, tag: u32) -> Option<FieldValue> {
        match tag {
            FAMILY_ROLE_TAG => self.role.clone().map(|s| FieldValue::Scalar(Scalar::String(s))),
            FAMILY_OP_FAMILY_TAG => self.op_family.clone().map(|s| FieldValue::Scalar(Scalar::String(s))),
            FAMILY_ACCESS_MASK_TAG => Some(FieldValue::Scalar(Scalar::U32(self.access_mask))),
            _ => None,
        }
    }

    fn set(&mut self, tag: u32, value: FieldValue) -> UnitResult<()> {
        match (tag, value) {
            (FAMILY_ROLE_TAG, FieldValue::Scalar(Scalar::String(s))) => self.role = Some(s),
            (FAMILY_OP_FAMILY_TAG, FieldValue::Scalar(Scalar::String(s))) => self.op_family = Some(s),
            (FAMILY_ACCESS_MASK_TAG, FieldValue::Scalar(Scalar::U32(v))) => self.access_mask = v,
            (t, _) => return Err(UnitError::InvalidType { tag: t }),
        }
        Ok(())
    }
}

impl Model for AclOpFamilyAccess {
    fn model_id() -> &'static str {
        "acl_op_family_access"
    }

    fn indexes() -> &'static [IndexDef] {
        static FIELDS: &[IndexFieldSpec] = &[IndexFieldSpec::new(FAMILY_ROLE_TAG, false), IndexFieldSpec::new(FAMILY_OP_FAMILY_TAG, false)];
        static INDEXES: &[IndexDef] = &[IndexDef::new(1, FIELDS)];
        INDEXES
    }
}
