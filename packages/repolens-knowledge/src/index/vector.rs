//! In-memory vector leg: cosine similarity over stored embeddings.

use dashmap::DashMap;

use super::SearchFilter;

#[derive(Debug, Clone)]
struct VectorEntry {
    repository_id: String,
    family: super::DocumentFamily,
    vector: Vec<f32>,
}

/// Brute-force cosine store. Adequate for the in-process reference
/// implementation; a vendor ANN index slots in behind the same calls.
pub struct VectorStore {
    entries: DashMap<String, VectorEntry>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn upsert(&self, document: &super::SearchDocument) {
        match &document.vector {
            Some(vector) if !vector.is_empty() => {
                self.entries.insert(
                    document.id.clone(),
                    VectorEntry {
                        repository_id: document.repository_id.clone(),
                        family: document.family,
                        vector: vector.clone(),
                    },
                );
            }
            _ => {
                // an upsert without a vector clears any stale one
                self.entries.remove(&document.id);
            }
        }
    }

    pub fn delete(&self, id: &str) {
        self.entries.remove(id);
    }

    /// Top-k cosine scores as `(document_id, similarity ∈ [0, 1])`.
    pub fn search(
        &self,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
    ) -> Vec<(String, f64)> {
        let mut scored: Vec<(String, f64)> = self
            .entries
            .iter()
            .filter(|entry| {
                (filter.repository_ids.is_empty()
                    || filter.repository_ids.contains(&entry.repository_id))
                    && (filter.families.is_empty() || filter.families.contains(&entry.family))
            })
            .map(|entry| (entry.key().clone(), cosine(query, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);
        scored
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for VectorStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Cosine similarity mapped into `[0, 1]`; dimension mismatch scores 0.
pub fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64).powi(2);
        norm_b += (*y as f64).powi(2);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    (similarity + 1.0) / 2.0
}
