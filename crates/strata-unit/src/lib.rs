//! Schema-described data units: the field model, tag-prefixed wire form,
//! path addressing, and update-request encoding shared by the document
//! store and producer queue.

mod error;
mod object_id;
mod path;
mod schema;
mod stored;
mod unit;
mod update;
mod value;

pub use error::{Result, UnitError};
pub use object_id::ObjectId;
pub use path::{
    append_at, auto_append_at, clear_at, get_at, get_at_or_default, reserve_at, resize_at, set_at,
    unset_at, Path, PathSegment,
};
pub use schema::UnitSchema;
pub use stored::{StoredObject, TopicId};
pub use unit::{FieldValue, Unit};
pub use update::{apply as apply_update, FieldOp, Operand, UpdateOp, UpdateRequest};
pub use value::{Cardinality, DefaultValue, FieldDescriptor, Scalar, ValueType};
