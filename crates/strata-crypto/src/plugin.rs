//! The plugin surface itself. A concrete plugin wraps a native or
//! pure-Rust crypto backend and advertises the suites it supports.

use strata_buf::ByteBuffer;

use crate::error::Result;
use crate::suite::CipherSuite;

/// Implemented by a crypto backend. Every operation takes the suite it was
/// negotiated under explicitly — plugins are expected to support several
/// suites at once, not to be specialized to one.
pub trait CryptPlugin: Send + Sync {
    /// A short, stable name this plugin registers under.
    fn name(&self) -> &str;

    /// The suites this plugin can service.
    fn suites(&self) -> &[CipherSuite];

    fn supports(&self, suite_name: &str) -> bool {
        self.suites().iter().any(|s| s.name == suite_name)
    }

    fn encrypt(&self, suite: &CipherSuite, key: &[u8], nonce: &[u8], plaintext: &[u8], out: &mut ByteBuffer) -> Result<()>;

    fn decrypt(&self, suite: &CipherSuite, key: &[u8], nonce: &[u8], ciphertext: &[u8], out: &mut ByteBuffer) -> Result<()>;

    fn sign(&self, suite: &CipherSuite, key: &[u8], data: &[u8], out: &mut ByteBuffer) -> Result<()>;

    fn verify(&self, suite: &CipherSuite, key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool>;

    fn digest(&self, suite: &CipherSuite, data: &[u8], out: &mut ByteBuffer) -> Result<()>;
}
