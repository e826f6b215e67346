//! 12-byte timestamp-prefixed object identifier, ordered well
//! enough by creation time to double as a producer-position cursor.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

static COUNTER: AtomicU32 = AtomicU32::new(0);

/// `[4-byte unix seconds][5 random bytes][3-byte counter]`, the same layout
/// Mongo-style object ids use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Build an id from its raw 12 bytes (e.g. when decoding the wire form).
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Generate a new id from the current time, a process-constant random
    /// component, and a wrapping counter. Holding the random component fixed
    /// per process means ids minted by one process sort by (second, counter)
    /// — i.e. in creation order, which producer-position draining depends
    /// on.
    pub fn generate() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32;

        let counter = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(process_random());
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    pub fn unix_seconds(&self) -> u32 {
        u32::from_be_bytes(self.0[0..4].try_into().unwrap())
    }

    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }

    /// Parses the 24-character lowercase or uppercase hex string produced
    /// by [`ObjectId::to_hex`].
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 24 {
            return None;
        }
        let mut bytes = [0u8; 12];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }
        Some(Self(bytes))
    }
}

fn process_random() -> &'static [u8; 5] {
    // No external RNG dependency in this crate: mix the address of a fresh
    // stack allocation with the current time's subsecond component, once
    // per process. Not cryptographically random, only distinct-enough
    // across processes; the counter provides uniqueness within one.
    static PROCESS_RANDOM: std::sync::OnceLock<[u8; 5]> = std::sync::OnceLock::new();
    PROCESS_RANDOM.get_or_init(|| {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        let stack_marker: u64 = &nanos as *const _ as u64;
        let mixed = nanos as u64 ^ stack_marker.rotate_left(17);
        let bytes = mixed.to_be_bytes();
        [bytes[2], bytes[3], bytes[4], bytes[5], bytes[6]]
    })
}

fn hex_encode(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}
