//! Identifier and content-hash helpers

use sha2::{Digest, Sha256};

/// Mint a fresh repo-state id: 26-char, lexicographically time-ordered
pub fn new_repo_state_id() -> String {
    ulid::Ulid::new().to_string()
}

/// SHA-256 hex digest of file content (for `file_signatures`)
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_state_ids_are_26_chars_and_sortable() {
        let a = new_repo_state_id();
        let b = new_repo_state_id();
        assert_eq!(a.len(), 26);
        assert_eq!(b.len(), 26);
        // ULIDs minted later never sort before earlier ones
        assert!(a <= b);
    }

    #[test]
    fn content_hash_is_stable() {
        let content = "fn main() {}";
        assert_eq!(hash_content(content), hash_content(content));
        assert_ne!(hash_content(content), hash_content("fn main() { }"));
    }
}
