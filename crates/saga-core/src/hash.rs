use crate::canon::canonical_json_bytes;
use sha2::{Digest, Sha256};
use serde_json::Value;

/// Compute SHA-256 of bytes as a lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Content hash of a campaign-state snapshot: SHA-256 over canonical JSON.
///
/// Pure and deterministic; identical logical content hashes identically
/// across calls and processes regardless of key order.
pub fn content_hash(content: &Value) -> String {
    sha256_hex(&canonical_json_bytes(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha256_empty() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn content_hash_matches_sha_of_canonical_form() {
        let c = json!({"b": 2, "a": 1});
        assert_eq!(content_hash(&c), sha256_hex(br#"{"a":1,"b":2}"#));
    }

    #[test]
    fn content_hash_ignores_key_order() {
        let a: Value = serde_json::from_str(
            r#"{"theme":"fantasy","npcs":[],"chapters":[{"id":"ch1","title":"Intro"}]}"#,
        )
        .unwrap();
        let b: Value = serde_json::from_str(
            r#"{"chapters":[{"title":"Intro","id":"ch1"}],"npcs":[],"theme":"fantasy"}"#,
        )
        .unwrap();
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn content_hash_is_stable_and_sensitive() {
        let c = json!({"theme": "fantasy", "chapters": [{"id": "ch1"}]});
        assert_eq!(content_hash(&c), content_hash(&c.clone()));
        let d = json!({"theme": "fantasy", "chapters": [{"id": "ch2"}]});
        assert_ne!(content_hash(&c), content_hash(&d));
        let h = content_hash(&c);
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn array_order_changes_hash() {
        assert_ne!(
            content_hash(&json!({"a": [1, 2]})),
            content_hash(&json!({"a": [2, 1]}))
        );
    }
}
