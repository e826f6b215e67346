//! Strata-buf: byte buffers and wire-level primitives.
//!
//! This is the bottom of the Strata stack: everything else that needs to put
//! bytes on the wire or into a key builds on [`ByteBuffer`]/[`FixedBuffer`]
//! and the encoding helpers below.

mod buffer;
mod encoding;
mod error;
mod escape;
mod fingerprint;

pub use buffer::{ByteBuffer, FixedBuffer};
pub use encoding::{
    decode_fixed_i64, decode_fixed_u64, decode_len_prefixed, decode_varint, encode_fixed_i64,
    encode_fixed_u64, encode_len_prefixed, encode_varint,
};
pub use error::BufferError;
pub use escape::{escape_string, unescape_string};
pub use fingerprint::{
    fingerprint, fingerprint_bytes, short_fingerprint, SHORT_FINGERPRINT_LEN,
};

/// Result type for buffer/encoding operations.
pub type Result<T> = std::result::Result<T, BufferError>;

/// Byte that terminates every index-key field component.
///
/// Chosen so it sorts strictly below any byte produced by the escape
/// encoding in [`escape_string`] (see its doc comment for why `0x01`/`0x02`
/// are reserved there).
pub const SEPARATOR: u8 = 0x00;

/// Byte used in place of [`SEPARATOR`] to synthesize an exclusive upper
/// bound: appending `PLUS_SEPARATOR` to a key prefix produces a key that
/// sorts immediately above every key sharing that prefix.
pub const PLUS_SEPARATOR: u8 = 0x01;
