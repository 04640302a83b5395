//! Hybrid index: authoritative document table + lexical and vector legs.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use repolens_core::error::Result;

use super::lexical::LexicalIndex;
use super::vector::VectorStore;
use super::{SearchDocument, SearchHit, SearchIndex, SearchRequest};

/// Weight of the vector leg in the index's own fused score when both legs
/// produced a signal; callers rerank with their own weights on top.
const FUSION_VECTOR_WEIGHT: f64 = 0.6;

/// In-process hybrid search index.
///
/// The `DashMap` document table is authoritative; tantivy ranks the lexical
/// leg and the vector store ranks the semantic leg. Upserts are idempotent
/// by document id, and readers are never blocked by writers.
pub struct HybridIndex {
    documents: DashMap<String, SearchDocument>,
    lexical: LexicalIndex,
    vectors: VectorStore,
}

impl HybridIndex {
    pub fn new() -> Result<Self> {
        Ok(Self {
            documents: DashMap::new(),
            lexical: LexicalIndex::new()?,
            vectors: VectorStore::new(),
        })
    }
}

#[async_trait]
impl SearchIndex for HybridIndex {
    async fn upsert(&self, documents: Vec<SearchDocument>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        self.lexical.upsert_batch(&documents)?;
        for document in &documents {
            self.vectors.upsert(document);
            self.documents.insert(document.id.clone(), document.clone());
        }
        debug!(count = documents.len(), "index upsert committed");
        Ok(documents.len())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.lexical.delete_batch(ids)?;
        let mut removed = 0;
        for id in ids {
            self.vectors.delete(id);
            if self.documents.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<SearchHit>> {
        let fetch = (request.limit * 2).max(request.limit).max(10);

        let lexical = self
            .lexical
            .search(&request.query, &request.filter, fetch)?;
        let max_lexical = lexical
            .iter()
            .map(|(_, s)| *s)
            .fold(0.0f32, f32::max)
            .max(f32::EPSILON);

        let mut merged: HashMap<String, (f64, f64)> = HashMap::new();
        for (id, score) in lexical {
            merged.entry(id).or_default().0 = (score / max_lexical) as f64;
        }
        if let Some(query_vector) = &request.query_vector {
            for (id, score) in self.vectors.search(query_vector, &request.filter, fetch) {
                merged.entry(id).or_default().1 = score;
            }
        }

        let mut hits: Vec<SearchHit> = merged
            .into_iter()
            .filter_map(|(id, (lexical_score, vector_score))| {
                let document = self.documents.get(&id)?.clone();
                if !request.filter.matches(&document) {
                    return None;
                }
                let score = if vector_score > 0.0 {
                    FUSION_VECTOR_WEIGHT * vector_score
                        + (1.0 - FUSION_VECTOR_WEIGHT) * lexical_score
                } else {
                    lexical_score
                };
                Some(SearchHit {
                    document,
                    lexical_score,
                    vector_score,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        hits.truncate(request.limit);
        Ok(hits)
    }

    async fn document_count(&self) -> Result<usize> {
        Ok(self.documents.len())
    }

    async fn ids_for_repository(&self, repository_id: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .documents
            .iter()
            .filter(|d| d.repository_id == repository_id)
            .map(|d| d.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
