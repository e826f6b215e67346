//! Registers a concrete [`Unit`] type with the document store: its model
//! id, declared secondary indexes, and an optional partitioning field.

use strata_unit::Unit;

/// One field participating in a secondary index, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexFieldSpec {
    pub tag: u32,
    pub descending: bool,
}

impl IndexFieldSpec {
    pub const fn new(tag: u32, descending: bool) -> Self {
        Self { tag, descending }
    }
}

/// A declared secondary index: a numeric id that namespaces its key space,
/// plus the ordered fields it's keyed on.
#[derive(Debug, Clone, Copy)]
pub struct IndexDef {
    pub id: u16,
    pub fields: &'static [IndexFieldSpec],
}

impl IndexDef {
    pub const fn new(id: u16, fields: &'static [IndexFieldSpec]) -> Self {
        Self { id, fields }
    }

    /// The string form used as an index key's `index-id` component.
    pub fn index_id(&self) -> String {
        format!("idx{}", self.id)
    }
}

/// Associates a [`Unit`] type with everything the store needs to place it:
/// a stable model id (namespaces its column-family keys), its declared
/// indexes, and an optional partitioning field.
pub trait Model: Unit + Default {
    /// A short, stable identifier namespacing this model's column families.
    /// Never change it without a migration: it's baked into every key this
    /// model has ever written.
    fn model_id() -> &'static str;

    fn indexes() -> &'static [IndexDef];

    /// Field tag whose `DateTime`/`Date` value buckets this model's records
    /// into monthly partitions. `None` means every record lives
    /// in the default partition.
    fn partition_field() -> Option<u32> {
        None
    }
}
