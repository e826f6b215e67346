//! Async client facade: maps `(topic -> worker thread)` and routes every
//! document-store operation onto its destined worker.

mod client;
mod error;
mod registry;

pub use client::AsyncClient;
pub use error::{ClientError, Result};
pub use registry::MultipleAsyncClients;
