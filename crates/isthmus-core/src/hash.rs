//! Content fingerprints for emitted artifacts and descriptions.
//!
//! Fingerprints cover content only, so identical glue emitted by two runs
//! hashes identically.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 content hash.
pub type ContentHash = [u8; 32];

/// Hash the JSON serialization of any serializable value.
pub fn content_hash<T: Serialize>(value: &T) -> Result<ContentHash, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(bytes_hash(&json))
}

/// Hash raw bytes.
pub fn bytes_hash(bytes: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Format a content hash as a hex string.
pub fn hash_hex(hash: &ContentHash) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

/// Short hex fingerprint of a source text (first 16 hex digits).
pub fn fingerprint(source: &str) -> String {
    let mut hex = hash_hex(&bytes_hash(source.as_bytes()));
    hex.truncate(16);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_hash() {
        let h1 = content_hash(&"hello world").unwrap();
        let h2 = content_hash(&"hello world").unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_inputs_different_hash() {
        assert_ne!(bytes_hash(b"hello"), bytes_hash(b"world"));
    }

    #[test]
    fn fingerprint_length() {
        let fp = fingerprint("int32_t sum(void);");
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, fingerprint("int32_t sum(void);"));
        assert_eq!(hash_hex(&bytes_hash(b"")).len(), 64);
    }
}
