//! Content hashing for export documents.
//!
//! The value is serialized to JSON and hashed with SHA-256. Object keys
//! serialize in sorted order, so a document that is parsed and serialized
//! again hashes to the same value.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of a serializable value.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized to JSON.
pub fn content_hash<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_hash_deterministic() {
        let value = json!({"b": 1, "a": [1, 2]});
        let hash1 = content_hash(&value).unwrap();
        let hash2 = content_hash(&value).unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let one = content_hash(&json!({"amount": 42})).unwrap();
        let other = content_hash(&json!({"amount": 43})).unwrap();
        assert_ne!(one, other);
    }

    #[test]
    fn test_reparsed_document_hashes_the_same() {
        let original = json!({"title": "Rome", "amount": 12.5, "tags": ["x"]});
        let reparsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string_pretty(&original).unwrap()).unwrap();
        assert_eq!(content_hash(&original).unwrap(), content_hash(&reparsed).unwrap());
    }
}
