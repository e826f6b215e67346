//! Error types for strata-buf.

use thiserror::Error;

/// Errors raised by buffer and encoding operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BufferError {
    /// A write would exceed a [`crate::FixedBuffer`]'s fixed capacity.
    #[error("buffer overflow: capacity {capacity}, attempted to write {attempted} more byte(s)")]
    Overflow { capacity: usize, attempted: usize },

    /// A read ran past the end of the input slice.
    #[error("unexpected end of buffer: needed {needed} byte(s), had {available}")]
    UnexpectedEof { needed: usize, available: usize },

    /// A decoded value did not respect its expected encoding (e.g. a varint
    /// that never terminates, or an escape sequence with no continuation).
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),
}
