//! The document store: a schema-driven CRUD and secondary-index layer over
//! [`strata_kv`]'s ordered key-value backends, partitioned by calendar
//! month.

mod envelope;
mod error;
mod model;
mod partition;
mod store;

pub use error::{Result, StoreError};
pub use model::{IndexDef, IndexFieldSpec, Model};
pub use partition::{PartitionKey, DEFAULT_PARTITION};
pub use store::{ReturnMode, Store};
