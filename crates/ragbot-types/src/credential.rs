//! API credential with a stable, loggable fingerprint.

use sha2::{Digest, Sha256};
use std::fmt;

/// An LLM provider API key.
///
/// `Debug` never prints the key. Use [`Credential::fingerprint`] wherever a
/// stable identifier is needed (cache directories, logs, equality checks).
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Lowercase hex SHA-256 of the key.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }

    /// First 8 hex chars of the fingerprint, for log lines.
    pub fn short_fingerprint(&self) -> String {
        self.fingerprint()[..8].to_string()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({}…)", self.short_fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_sha256() {
        let a = Credential::new("k1");
        let b = Credential::new("k1");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        assert_ne!(a.fingerprint(), Credential::new("k2").fingerprint());
    }

    #[test]
    fn debug_redacts_key() {
        let cred = Credential::new("sk-very-secret");
        let shown = format!("{cred:?}");
        assert!(!shown.contains("sk-very-secret"));
        assert!(shown.contains(&cred.short_fingerprint()));
    }
}
