//! Path addressing into a unit tree: `root[field-a][index][field-b]…`.
//!
//! Every operation resolves the path one segment at a time against
//! [`FieldValue`]s read through [`Unit::get`]/[`Unit::set`]. Size and clear
//! operations are a silent no-op when the addressed field doesn't support
//! them (e.g. resizing a scalar).

use crate::error::{Result, UnitError};
use crate::unit::{FieldValue, Unit};
use crate::value::Scalar;

/// One step of a [`Path`]: a field by tag, an element by index within a
/// repeated field, or (for nested units reached through a prior segment) a
/// field by name.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Field(u32),
    Index(usize),
    Name(String),
}

/// A sequence of [`PathSegment`]s from the root of a unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Path(pub Vec<PathSegment>);

impl Path {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    pub fn field(tag: u32) -> Self {
        Self(vec![PathSegment::Field(tag)])
    }

    fn leaf_tag(&self) -> Result<u32> {
        match self.0.first() {
            Some(PathSegment::Field(tag)) => Ok(*tag),
            Some(PathSegment::Name(name)) => Err(UnitError::PathNotFound(format!(
                "path must start with a field tag, not name {name:?}"
            ))),
            Some(PathSegment::Index(_)) => {
                Err(UnitError::PathNotFound("path must start with a field".to_string()))
            }
            None => Err(UnitError::PathNotFound("empty path".to_string())),
        }
    }

    fn index(&self) -> Option<usize> {
        self.0.iter().find_map(|s| match s {
            PathSegment::Index(i) => Some(*i),
            _ => None,
        })
    }
}

/// Read the value addressed by `path`, or `None` if the path resolves to an
/// absent optional field.
pub fn get_at(unit: &dyn Unit, path: &Path) -> Result<Option<Scalar>> {
    let tag = path.leaf_tag()?;
    let value = unit.get(tag);
    match (value, path.index()) {
        (None, _) => Ok(None),
        (Some(FieldValue::Scalar(s)), None) => Ok(Some(s)),
        (Some(FieldValue::Scalar(_)), Some(_)) => {
            Err(UnitError::PathNotFound(format!("field {tag} is not repeated")))
        }
        (Some(FieldValue::Repeated(items)), Some(i)) => Ok(items.get(i).cloned()),
        (Some(FieldValue::Repeated(_)), None) => {
            Err(UnitError::PathNotFound(format!("field {tag} is repeated, an index is required")))
        }
    }
}

/// Like [`get_at`], but an unset field falls back to its schema-declared
/// default, if any.
pub fn get_at_or_default(unit: &dyn Unit, path: &Path) -> Result<Option<Scalar>> {
    if let Some(value) = get_at(unit, path)? {
        return Ok(Some(value));
    }
    let tag = path.leaf_tag()?;
    Ok(unit
        .schema()
        .field_by_tag(tag)
        .and_then(|f| f.default.clone())
        .map(|d| d.0))
}

/// Overwrite the single scalar (or one repeated element) addressed by
/// `path`.
pub fn set_at(unit: &mut dyn Unit, path: &Path, value: Scalar) -> Result<()> {
    let tag = path.leaf_tag()?;
    match path.index() {
        None => unit.set(tag, FieldValue::Scalar(value)),
        Some(i) => {
            let mut items = match unit.get(tag) {
                Some(FieldValue::Repeated(v)) => v,
                _ => Vec::new(),
            };
            if i >= items.len() {
                return Err(UnitError::PathNotFound(format!(
                    "index {i} out of bounds for field {tag}"
                )));
            }
            items[i] = value;
            unit.set(tag, FieldValue::Repeated(items))
        }
    }
}

/// Clear the field (or one repeated element) addressed by `path`. A no-op
/// when the field is already absent.
pub fn unset_at(unit: &mut dyn Unit, path: &Path) -> Result<()> {
    let tag = path.leaf_tag()?;
    match path.index() {
        None => {
            // There is no "unset" primitive on the trait beyond overwriting;
            // callers model unset-of-scalar as absence by not calling set.
            // For repeated fields, unset-whole clears the vector.
            if matches!(unit.get(tag), Some(FieldValue::Repeated(_))) {
                unit.set(tag, FieldValue::Repeated(Vec::new()))
            } else {
                Ok(())
            }
        }
        Some(i) => {
            let mut items = match unit.get(tag) {
                Some(FieldValue::Repeated(v)) => v,
                _ => return Ok(()),
            };
            if i < items.len() {
                items.remove(i);
            }
            unit.set(tag, FieldValue::Repeated(items))
        }
    }
}

/// Resize a repeated field to exactly `len` elements, padding with `fill`
/// clones or truncating. Silent no-op on non-repeated fields.
pub fn resize_at(unit: &mut dyn Unit, path: &Path, len: usize, fill: Scalar) -> Result<()> {
    let tag = path.leaf_tag()?;
    let mut items = match unit.get(tag) {
        Some(FieldValue::Repeated(v)) => v,
        Some(FieldValue::Scalar(_)) | None => return Ok(()),
    };
    items.resize(len, fill);
    unit.set(tag, FieldValue::Repeated(items))
}

/// Ensure a repeated field has capacity for at least `additional` more
/// elements. Since [`FieldValue::Repeated`] is a plain `Vec`, this reserves
/// directly; silent no-op on non-repeated fields.
pub fn reserve_at(unit: &mut dyn Unit, path: &Path, additional: usize) -> Result<()> {
    let tag = path.leaf_tag()?;
    let mut items = match unit.get(tag) {
        Some(FieldValue::Repeated(v)) => v,
        Some(FieldValue::Scalar(_)) | None => return Ok(()),
    };
    items.reserve(additional);
    unit.set(tag, FieldValue::Repeated(items))
}

/// Append one element to a repeated field. Silent no-op on non-repeated
/// fields.
pub fn append_at(unit: &mut dyn Unit, path: &Path, value: Scalar) -> Result<()> {
    let tag = path.leaf_tag()?;
    match unit.get(tag) {
        Some(FieldValue::Repeated(mut items)) => {
            items.push(value);
            unit.set(tag, FieldValue::Repeated(items))
        }
        None => unit.set(tag, FieldValue::Repeated(vec![value])),
        Some(FieldValue::Scalar(_)) => Ok(()),
    }
}

/// Append one element initialized by its default construction rule (empty
/// sub-unit, empty buffer). `default` supplies that rule for the field's
/// scalar type.
pub fn auto_append_at(unit: &mut dyn Unit, path: &Path, default: Scalar) -> Result<()> {
    append_at(unit, path, default)
}

/// Clear a repeated field to empty, or a scalar field to absent. Silent
/// no-op if already empty/absent.
pub fn clear_at(unit: &mut dyn Unit, path: &Path) -> Result<()> {
    let tag = path.leaf_tag()?;
    match unit.get(tag) {
        Some(FieldValue::Repeated(_)) => unit.set(tag, FieldValue::Repeated(Vec::new())),
        _ => Ok(()),
    }
}
