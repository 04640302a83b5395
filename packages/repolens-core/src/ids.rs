//! Stable identifier construction.
//!
//! Entity ids must survive re-ingestion: the same source file parsed twice
//! (even on different hosts) yields byte-identical ids, which is what makes
//! graph and index upserts idempotent.

use sha2::{Digest, Sha256};

/// Maximum length of a persisted id (on-wire contract).
pub const MAX_ID_LEN: usize = 256;

/// Stable id for a code entity.
///
/// Hash of `(repository_id, file_path, language, qualified_name, kind)`,
/// hex-truncated. Field separator is `\x1f` so path/name content cannot
/// collide across field boundaries.
pub fn entity_id(
    repository_id: &str,
    file_path: &str,
    language: &str,
    qualified_name: &str,
    kind: &str,
) -> String {
    let mut hasher = Sha256::new();
    for part in [repository_id, file_path, language, qualified_name, kind] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    format!("ent_{}", hex_prefix(&digest, 20))
}

/// Stable id for an indexed file chunk.
pub fn chunk_id(repository_id: &str, file_path: &str, start_line: usize) -> String {
    let mut hasher = Sha256::new();
    for part in [repository_id, file_path, &start_line.to_string()] {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    format!("chk_{}", hex_prefix(&hasher.finalize(), 20))
}

/// Digest of a repository file inventory (sorted `path:size` lines).
///
/// Used by change detection: a differing digest means the tree changed even
/// when the head commit timestamp did not move.
pub fn inventory_digest<'a>(entries: impl IntoIterator<Item = (&'a str, u64)>) -> String {
    let mut lines: Vec<String> = entries
        .into_iter()
        .map(|(path, size)| format!("{}:{}", path, size))
        .collect();
    lines.sort();

    let mut hasher = Sha256::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hex_prefix(&hasher.finalize(), 32)
}

fn hex_prefix(digest: &[u8], bytes: usize) -> String {
    digest
        .iter()
        .take(bytes)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_deterministic() {
        let a = entity_id("acme/svc", "src/auth.py", "python", "auth.login", "function");
        let b = entity_id("acme/svc", "src/auth.py", "python", "auth.login", "function");
        assert_eq!(a, b);
        assert!(a.starts_with("ent_"));
        assert!(a.len() <= MAX_ID_LEN);
    }

    #[test]
    fn test_entity_id_sensitive_to_every_field() {
        let base = entity_id("r", "f", "l", "q", "k");
        assert_ne!(base, entity_id("r2", "f", "l", "q", "k"));
        assert_ne!(base, entity_id("r", "f2", "l", "q", "k"));
        assert_ne!(base, entity_id("r", "f", "l2", "q", "k"));
        assert_ne!(base, entity_id("r", "f", "l", "q2", "k"));
        assert_ne!(base, entity_id("r", "f", "l", "q", "k2"));
    }

    #[test]
    fn test_entity_id_no_field_boundary_collision() {
        // "ab" + "c" must not hash like "a" + "bc"
        assert_ne!(
            entity_id("r", "ab", "c", "q", "k"),
            entity_id("r", "a", "bc", "q", "k")
        );
    }

    #[test]
    fn test_inventory_digest_order_independent() {
        let a = inventory_digest([("src/main.rs", 100), ("README.md", 42)]);
        let b = inventory_digest([("README.md", 42), ("src/main.rs", 100)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_inventory_digest_detects_size_change() {
        let a = inventory_digest([("src/main.rs", 100)]);
        let b = inventory_digest([("src/main.rs", 101)]);
        assert_ne!(a, b);
    }
}
