//! A cipher suite names an algorithm and the byte lengths its keys,
//! nonces, and authentication tags must satisfy. Names follow a compound
//! `"BASE_NAME/parameter1/.../parameterN"` convention so a parameterized
//! algorithm family registers once per parameter choice.

/// One cryptographic algorithm a plugin offers, identified by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherSuite {
    /// E.g. `"AES-256-GCM"`, `"Ed25519"`, `"SHA-256"`.
    pub name: String,
    pub key_len: usize,
    /// Zero for suites with no nonce (signature and digest algorithms).
    pub nonce_len: usize,
    /// Zero for suites with no authentication tag.
    pub tag_len: usize,
}

impl CipherSuite {
    pub fn new(name: impl Into<String>, key_len: usize, nonce_len: usize, tag_len: usize) -> Self {
        Self { name: name.into(), key_len, nonce_len, tag_len }
    }

    pub fn check_key_len(&self, key: &[u8]) -> Result<(), crate::error::CryptoError> {
        if key.len() != self.key_len {
            return Err(crate::error::CryptoError::KeyLength { suite: self.name.clone(), expected: self.key_len, actual: key.len() });
        }
        Ok(())
    }
}
