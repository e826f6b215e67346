//! Loaded crypto configuration: the suites a deployment is willing to use
//! and which one is preferred.

use crate::error::{CryptoError, Result};
use crate::suite::CipherSuite;

#[derive(Debug, Clone, Default)]
pub struct CryptoConfig {
    pub suites: Vec<CipherSuite>,
    pub preferred_suite: Option<String>,
}

impl CryptoConfig {
    pub fn new(suites: Vec<CipherSuite>, preferred_suite: Option<String>) -> Self {
        Self { suites, preferred_suite }
    }

    /// Checked after every load and after every merge: suite names are unique and the preferred suite, if
    /// set, is one of `suites`.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for suite in &self.suites {
            if !seen.insert(suite.name.as_str()) {
                return Err(CryptoError::InvalidConfig(format!("duplicate cipher suite {:?}", suite.name)));
            }
        }
        if let Some(preferred) = &self.preferred_suite {
            if !self.suites.iter().any(|s| &s.name == preferred) {
                return Err(CryptoError::InvalidConfig(format!("preferred suite {:?} is not among the configured suites", preferred)));
            }
        }
        Ok(())
    }

    pub fn suite(&self, name: &str) -> Option<&CipherSuite> {
        self.suites.iter().find(|s| s.name == name)
    }
}
