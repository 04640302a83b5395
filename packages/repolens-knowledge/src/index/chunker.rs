//! File chunking for the content index.
//!
//! Large files split into bounded chunks on line boundaries with ~10%
//! overlap so a match near a boundary still carries its context.

use repolens_core::config::IndexingConfig;
use repolens_core::ids;

use super::{DocumentFamily, SearchDocument};

/// Chunk one file into index documents. Excluded extensions and ignored
/// directories yield nothing.
pub fn chunk_file(
    repository_id: &str,
    file_path: &str,
    language: Option<&str>,
    content: &str,
    config: &IndexingConfig,
) -> Vec<SearchDocument> {
    if config.is_extension_excluded(file_path) || config.is_directory_ignored(file_path) {
        return Vec::new();
    }
    if content.trim().is_empty() {
        return Vec::new();
    }

    let max_bytes = config.max_file_content_length.max(1024);
    let lines: Vec<&str> = content.lines().collect();

    let mut documents = Vec::new();
    let mut start = 0usize;
    while start < lines.len() {
        let mut end = start;
        let mut size = 0usize;
        while end < lines.len() && size + lines[end].len() + 1 <= max_bytes {
            size += lines[end].len() + 1;
            end += 1;
        }
        if end == start {
            // single line longer than the budget: hard-split it
            end = start + 1;
        }

        let chunk_content: String = lines[start..end].join("\n");
        let start_line = start + 1;
        let end_line = end;

        let mut document = SearchDocument::new(
            ids::chunk_id(repository_id, file_path, start_line),
            repository_id,
            DocumentFamily::CodeChunk,
            file_path,
            chunk_content,
        );
        document.path = Some(file_path.to_string());
        document.language = language.map(String::from);
        document.start_line = Some(start_line);
        document.end_line = Some(end_line);
        documents.push(document);

        if end >= lines.len() {
            break;
        }
        // back up by the overlap ratio for the next window
        let window = end - start;
        let overlap = ((window as f32) * config.chunk_overlap_ratio).round() as usize;
        start = (end - overlap.min(window.saturating_sub(1))).max(start + 1);
    }

    documents
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IndexingConfig {
        IndexingConfig::default()
    }

    #[test]
    fn test_small_file_single_chunk() {
        let docs = chunk_file("r", "src/a.rs", Some("rust"), "fn a() {}\n", &config());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].start_line, Some(1));
        assert_eq!(docs[0].family, DocumentFamily::CodeChunk);
    }

    #[test]
    fn test_large_file_chunks_with_overlap() {
        let mut cfg = config();
        cfg.max_file_content_length = 1024; // force small windows
        let line = "let value = compute_something_interesting(42);";
        let content = vec![line; 200].join("\n");

        let docs = chunk_file("r", "src/big.rs", Some("rust"), &content, &cfg);
        assert!(docs.len() > 1);
        for doc in &docs {
            assert!(doc.content.len() <= 1024 + line.len());
        }
        // consecutive chunks overlap
        for pair in docs.windows(2) {
            assert!(pair[1].start_line.unwrap() <= pair[0].end_line.unwrap());
        }
        // chunk ids are distinct and deterministic
        let again = chunk_file("r", "src/big.rs", Some("rust"), &content, &cfg);
        let ids_a: Vec<_> = docs.iter().map(|d| d.id.clone()).collect();
        let ids_b: Vec<_> = again.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids_a, ids_b);
        let unique: std::collections::HashSet<_> = ids_a.iter().collect();
        assert_eq!(unique.len(), ids_a.len());
    }

    #[test]
    fn test_excluded_extension_skipped() {
        let docs = chunk_file("r", "logo.png", None, "binary", &config());
        assert!(docs.is_empty());
    }

    #[test]
    fn test_ignored_directory_skipped() {
        let docs = chunk_file(
            "r",
            "node_modules/pkg/index.js",
            Some("javascript"),
            "x",
            &config(),
        );
        assert!(docs.is_empty());
    }

    #[test]
    fn test_empty_file_skipped() {
        assert!(chunk_file("r", "src/empty.rs", Some("rust"), "  \n", &config()).is_empty());
    }
}
