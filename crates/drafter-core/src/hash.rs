use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

/// SHA-256 of the raw UTF-8 bytes, as 64 lowercase hex characters.
///
/// Every stored `content_hash` in the system comes from this function, so
/// it must stay byte-stable across platforms and releases.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of a commit's file set.
///
/// Entries are `path -> content hash`; the map keeps them sorted, so two
/// commits with the same files always produce the same hash regardless of
/// insertion order.
pub fn commit_tree_hash(entries: &BTreeMap<String, String>) -> String {
    let lines: Vec<String> = entries
        .iter()
        .map(|(path, hash)| format!("{path}:{hash}"))
        .collect();
    hash_content(&lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(
            hash_content("test content"),
            "6ae8a75555209fd6c44157c0aed8016e763ff435a19cf186f76863140143ff72"
        );
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = hash_content("<definitions id=\"loan-approval\"/>");
        let b = hash_content("<definitions id=\"loan-approval\"/>");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_content("<definitions id=\"loan-approval\" />"));
    }

    #[test]
    fn test_empty_content_hashes() {
        // SHA-256 of the empty string.
        assert_eq!(
            hash_content(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_tree_hash_ignores_insertion_order() {
        let mut forward = BTreeMap::new();
        forward.insert("a.bpmn".to_string(), hash_content("a"));
        forward.insert("b/c.dmn".to_string(), hash_content("c"));

        let mut reversed = BTreeMap::new();
        reversed.insert("b/c.dmn".to_string(), hash_content("c"));
        reversed.insert("a.bpmn".to_string(), hash_content("a"));

        assert_eq!(commit_tree_hash(&forward), commit_tree_hash(&reversed));
    }

    #[test]
    fn test_tree_hash_changes_with_content() {
        let mut entries = BTreeMap::new();
        entries.insert("a.bpmn".to_string(), hash_content("one"));
        let before = commit_tree_hash(&entries);

        entries.insert("a.bpmn".to_string(), hash_content("two"));
        assert_ne!(before, commit_tree_hash(&entries));
    }
}
