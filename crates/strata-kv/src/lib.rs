//! Ordered key-value storage abstraction for the Strata document store.
//!
//! `strata-db` and `strata-index` address this crate only through
//! [`OrderedKv`]; [`SurrealKv`] and [`InMemoryKv`] are the two concrete
//! implementations, the former backed by `surrealdb` and the latter a
//! `BTreeMap`-based fake for unit tests.

mod error;
mod fakes;
mod surreal;
mod traits;

pub use error::{KvError, Result};
pub use fakes::InMemoryKv;
pub use surreal::{SurrealConfig, SurrealKv};
pub use traits::{
    BatchOp, CompactionFilter, KeyRange, KvSnapshot, KvTransaction, OrderedKv, OwnedSnapshot,
};
