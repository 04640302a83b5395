//! Tantivy-backed lexical (BM25) leg of the hybrid index.

use std::sync::Mutex;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{doc, Index, IndexWriter, TantivyDocument, Term};

use repolens_core::error::{Error, Result};

use super::schema::SchemaFields;
use super::{SearchDocument, SearchFilter};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// In-RAM BM25 index. Writes are serialized behind the writer lock; readers
/// never block on writers.
pub struct LexicalIndex {
    index: Index,
    writer: Mutex<IndexWriter>,
    fields: SchemaFields,
}

impl LexicalIndex {
    pub fn new() -> Result<Self> {
        let fields = SchemaFields::new();
        let index = Index::create_in_ram(fields.schema.clone());
        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| Error::transient(format!("failed to create index writer: {e}")))?;
        Ok(Self {
            index,
            writer: Mutex::new(writer),
            fields,
        })
    }

    /// Delete-then-add upsert, committed once per batch.
    pub fn upsert_batch(&self, documents: &[SearchDocument]) -> Result<usize> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::transient("lexical writer poisoned"))?;

        for document in documents {
            let id_term = Term::from_field_text(self.fields.id, &document.id);
            writer.delete_term(id_term);

            let mut doc = doc!(
                self.fields.id => document.id.clone(),
                self.fields.repo_id => document.repository_id.clone(),
                self.fields.family => document.family.as_str().to_string(),
                self.fields.title => document.title.clone(),
                self.fields.content => document.content.clone(),
            );
            if !document.tags.is_empty() {
                doc.add_text(self.fields.tags, document.tags.join(" "));
            }
            writer
                .add_document(doc)
                .map_err(|e| Error::transient(format!("failed to add document: {e}")))?;
        }

        writer
            .commit()
            .map_err(|e| Error::transient(format!("lexical commit failed: {e}")))?;
        Ok(documents.len())
    }

    pub fn delete_batch(&self, ids: &[String]) -> Result<usize> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| Error::transient("lexical writer poisoned"))?;
        for id in ids {
            writer.delete_term(Term::from_field_text(self.fields.id, id));
        }
        writer
            .commit()
            .map_err(|e| Error::transient(format!("lexical delete commit failed: {e}")))?;
        Ok(ids.len())
    }

    /// BM25 scores for `query` under `filter`, as `(document_id, score)`.
    pub fn search(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<(String, f32)>> {
        let reader = self
            .index
            .reader()
            .map_err(|e| Error::transient(format!("failed to open reader: {e}")))?;
        let searcher = reader.searcher();

        let parser = QueryParser::for_index(
            &self.index,
            vec![self.fields.title, self.fields.content, self.fields.tags],
        );
        let (text_query, _errors) = parser.parse_query_lenient(query);

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, text_query)];
        if !filter.repository_ids.is_empty() {
            let repos: Vec<(Occur, Box<dyn Query>)> = filter
                .repository_ids
                .iter()
                .map(|repo| {
                    (
                        Occur::Should,
                        Box::new(TermQuery::new(
                            Term::from_field_text(self.fields.repo_id, repo),
                            IndexRecordOption::Basic,
                        )) as Box<dyn Query>,
                    )
                })
                .collect();
            clauses.push((Occur::Must, Box::new(BooleanQuery::new(repos))));
        }
        if !filter.families.is_empty() {
            let families: Vec<(Occur, Box<dyn Query>)> = filter
                .families
                .iter()
                .map(|family| {
                    (
                        Occur::Should,
                        Box::new(TermQuery::new(
                            Term::from_field_text(self.fields.family, family.as_str()),
                            IndexRecordOption::Basic,
                        )) as Box<dyn Query>,
                    )
                })
                .collect();
            clauses.push((Occur::Must, Box::new(BooleanQuery::new(families))));
        }
        let query = BooleanQuery::new(clauses);

        let top = searcher
            .search(&query, &TopDocs::with_limit(limit.max(1)))
            .map_err(|e| Error::transient(format!("lexical search failed: {e}")))?;

        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| Error::transient(format!("doc fetch failed: {e}")))?;
            if let Some(id) = doc.get_first(self.fields.id).and_then(|v| v.as_str()) {
                hits.push((id.to_string(), score));
            }
        }
        Ok(hits)
    }
}
