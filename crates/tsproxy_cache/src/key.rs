use std::fmt;

use sha2::{Digest, Sha256};

/// Length in hex characters of a fingerprint (256-bit digest).
pub const FINGERPRINT_LEN: usize = 64;

/// Lowercase hex SHA-256 of the exact payload bytes.
///
/// No normalization happens: two JSON bodies that differ only in key order
/// get different fingerprints.
pub fn fingerprint(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Content-derived cache key.
#[derive(Hash, Eq, PartialEq, Debug, Clone)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_payload(payload: &[u8]) -> Self {
        Self(fingerprint(payload))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
