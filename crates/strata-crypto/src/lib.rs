//! Cryptographic plugin interface: cipher suites, the `CryptPlugin` trait a
//! backend implements, and a registry that preloads suites into a loaded
//! configuration. No algorithm is implemented here — this crate only
//! defines the interface other crates call through.

mod config;
mod error;
mod plugin;
mod registry;
mod suite;

pub use config::CryptoConfig;
pub use error::{CryptoError, Result};
pub use plugin::CryptPlugin;
pub use registry::PluginRegistry;
pub use suite::CipherSuite;
