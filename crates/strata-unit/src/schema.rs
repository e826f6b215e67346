//! `UnitSchema`: a static field table registered once per concrete unit
//! type.

use crate::error::{Result, UnitError};
use crate::value::{Cardinality, FieldDescriptor, ValueType};

/// The field table for one concrete [`crate::unit::Unit`] type.
#[derive(Debug)]
pub struct UnitSchema {
    pub name: &'static str,
    pub fields: &'static [FieldDescriptor],
}

impl UnitSchema {
    pub const fn new(name: &'static str, fields: &'static [FieldDescriptor]) -> Self {
        Self { name, fields }
    }

    /// Look up a field descriptor by its wire tag.
    pub fn field_by_tag(&self, tag: u32) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    /// Look up a field descriptor by name.
    pub fn field_by_name(&self, name: &str) -> Option<&'static FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All fields marked `required: true`.
    pub fn required_fields(&self) -> impl Iterator<Item = &'static FieldDescriptor> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Structural check run at registration time: tags and names must be
    /// unique, and defaults only make sense on single-cardinality fields
    /// that aren't nested units.
    pub fn validate(&self) -> Result<()> {
        let mut tags = std::collections::HashSet::new();
        let mut names = std::collections::HashSet::new();
        for field in self.fields {
            if !tags.insert(field.tag) {
                return Err(UnitError::SchemaInvalid(format!(
                    "duplicate field tag {} in schema {:?}",
                    field.tag, self.name
                )));
            }
            if !names.insert(field.name) {
                return Err(UnitError::SchemaInvalid(format!(
                    "duplicate field name {:?} in schema {:?}",
                    field.name, self.name
                )));
            }
            if field.default.is_some() {
                if matches!(field.value_type, ValueType::NestedOwned | ValueType::NestedShared) {
                    return Err(UnitError::DefaultOnNested);
                }
                if !matches!(field.cardinality, Cardinality::Single) {
                    return Err(UnitError::DefaultOnRepeated);
                }
            }
        }
        Ok(())
    }
}
