//! Grounded retrieval: hybrid search + graph lookups + prompt assembly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use repolens_core::config::{AssistantConfig, EmbeddingConfig};
use repolens_core::error::{Error, Result};
use repolens_core::llm::{approximate_tokens, ChatMessage, CompletionRequest, EmbeddingClient, LlmClient};
use repolens_core::models::{ConversationContext, ConversationMessage};

use repolens_knowledge::index::masking;
use repolens_knowledge::{
    DocumentFamily, GraphStore, SearchDocument, SearchFilter, SearchIndex, SearchRequest,
};

use crate::intent::{classify_heuristically, IntentClassification};

/// Where a retrieved item came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Index(DocumentFamily),
    GraphEntity,
    GraphPattern,
}

#[derive(Debug, Clone)]
pub struct RetrievedItem {
    pub title: String,
    pub repository_id: String,
    pub provenance: Provenance,
    pub path: Option<String>,
    pub line: Option<usize>,
    pub snippet: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CrossRepositoryContext {
    pub groups: BTreeMap<String, Vec<RetrievedItem>>,
    pub common_patterns: Vec<String>,
    pub differences: Vec<String>,
}

/// Rerank weights over the index's two legs plus the intent boost.
const W_VECTOR: f64 = 0.6;
const W_LEXICAL: f64 = 0.3;
const W_BOOST: f64 = 0.1;

const SNIPPET_LEN: usize = 400;
const CROSS_REPO_PARALLELISM: usize = 4;

pub struct RetrievalService {
    index: Arc<dyn SearchIndex>,
    graph: Arc<dyn GraphStore>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    llm: Arc<dyn LlmClient>,
    config: AssistantConfig,
    embedding: EmbeddingConfig,
}

impl RetrievalService {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        graph: Arc<dyn GraphStore>,
        embedder: Option<Arc<dyn EmbeddingClient>>,
        llm: Arc<dyn LlmClient>,
        config: AssistantConfig,
        embedding: EmbeddingConfig,
    ) -> Self {
        Self {
            index,
            graph,
            embedder,
            llm,
            config,
            embedding,
        }
    }

    /// Hybrid retrieval restricted to the conversation's repositories,
    /// reranked by `0.6·vector + 0.3·lexical + 0.1·intent boost`, merged
    /// with graph results for architecture/implementation intents.
    pub async fn retrieve_relevant_context(
        &self,
        query: &str,
        context: &ConversationContext,
        classification: &IntentClassification,
        history_summary: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<RetrievedItem>> {
        let expanded = expand_query(query, classification, history_summary);
        let fetch = (max_results * 2).min(50).max(1);

        let query_vector = match &self.embedder {
            Some(embedder) => {
                match embedder
                    .embed_batch(&self.embedding.deployment, &[expanded.clone()])
                    .await
                {
                    Ok(mut vectors) if !vectors.is_empty() => Some(vectors.remove(0)),
                    Ok(_) => None,
                    Err(err) => {
                        warn!(error = %err, "query embedding failed, lexical-only retrieval");
                        None
                    }
                }
            }
            None => None,
        };

        let hits = self
            .index
            .search(SearchRequest {
                query: expanded,
                query_vector,
                filter: SearchFilter::repositories(&context.repository_ids),
                limit: fetch,
            })
            .await?;

        let mut items: Vec<RetrievedItem> = hits
            .into_iter()
            .map(|hit| {
                let boost = classification
                    .intent
                    .section_boost(hit.document.section_type.as_deref());
                let score =
                    W_VECTOR * hit.vector_score + W_LEXICAL * hit.lexical_score + W_BOOST * boost;
                RetrievedItem {
                    title: hit.document.title.clone(),
                    repository_id: hit.document.repository_id.clone(),
                    provenance: Provenance::Index(hit.document.family),
                    path: hit.document.path.clone(),
                    line: hit.document.start_line,
                    snippet: truncate(&hit.document.content, SNIPPET_LEN),
                    relevance_score: score,
                }
            })
            .collect();

        if classification.intent.wants_graph() {
            items.extend(
                self.graph_context(query, classification, &context.repository_ids)
                    .await?,
            );
        }

        items.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.title.cmp(&b.title))
        });
        items.truncate(max_results);
        debug!(results = items.len(), "retrieval complete");
        Ok(items)
    }

    async fn graph_context(
        &self,
        query: &str,
        classification: &IntentClassification,
        repository_ids: &[String],
    ) -> Result<Vec<RetrievedItem>> {
        let mut items = Vec::new();

        let mut terms = classification.entities.clone();
        if terms.is_empty() {
            terms.extend(
                query
                    .split_whitespace()
                    .filter(|t| t.len() > 3)
                    .take(3)
                    .map(String::from),
            );
        }

        let mut seen = BTreeSet::new();
        for term in terms.iter().take(5) {
            for entity in self
                .graph
                .search_entities(repository_ids, term, 5)
                .await?
            {
                if !seen.insert(entity.entity_id.clone()) {
                    continue;
                }
                items.push(RetrievedItem {
                    title: entity.full_name.clone(),
                    repository_id: entity.repository_id.clone(),
                    provenance: Provenance::GraphEntity,
                    path: Some(entity.file_path.clone()),
                    line: Some(entity.location.start_line),
                    snippet: truncate(&entity.content, SNIPPET_LEN),
                    relevance_score: 0.5,
                });
            }
        }

        for repository_id in repository_ids {
            for pattern in self.graph.patterns_by_repository(repository_id).await? {
                items.push(RetrievedItem {
                    title: pattern.name.clone(),
                    repository_id: repository_id.clone(),
                    provenance: Provenance::GraphPattern,
                    path: None,
                    line: None,
                    snippet: pattern.characteristics.join("; "),
                    relevance_score: 0.45 + pattern.confidence * 0.1,
                });
            }
        }
        Ok(items)
    }

    /// Make chat messages searchable, applying the privacy masks before
    /// anything reaches the index. Conversations without a repository
    /// scope are not indexed.
    pub async fn index_conversation_messages(
        &self,
        conversation_id: &str,
        repository_ids: &[String],
        messages: &[ConversationMessage],
    ) -> Result<usize> {
        let Some(repository_id) = repository_ids.first() else {
            return Ok(0);
        };
        let documents: Vec<SearchDocument> = messages
            .iter()
            .map(|message| {
                let mut document = SearchDocument::new(
                    message.id.clone(),
                    repository_id,
                    DocumentFamily::Message,
                    conversation_id,
                    masking::mask_sensitive(&message.content),
                );
                document.tags = vec![message.kind.as_str().to_string()];
                document
            })
            .collect();
        self.index.upsert(documents).await
    }

    /// Compose the grounded prompt. Oldest history drops first, then the
    /// lowest-scored evidence, until the whole prompt fits the budget.
    pub fn build_context_prompt(
        &self,
        query: &str,
        results: &[RetrievedItem],
        history: &[ConversationMessage],
        context: &ConversationContext,
    ) -> String {
        let mut evidence: Vec<&RetrievedItem> = results.iter().collect();
        let window = history.len().min(self.config.max_conversation_history);
        let mut turns: Vec<&ConversationMessage> =
            history[history.len() - window..].iter().collect();

        loop {
            let prompt = compose_prompt(query, &evidence, &turns, context);
            if approximate_tokens(&prompt) <= self.config.max_prompt_tokens {
                return prompt;
            }
            if !turns.is_empty() {
                turns.remove(0); // oldest turn first
            } else if !evidence.is_empty() {
                evidence.pop(); // evidence is score-descending
            } else {
                return prompt;
            }
        }
    }

    /// One retrieval per repository under bounded parallelism, plus a
    /// comparative summary. Total results are capped at `3 × per_repo`.
    pub async fn build_cross_repository_context(
        &self,
        query: &str,
        repository_ids: &[String],
        per_repo: usize,
    ) -> Result<CrossRepositoryContext> {
        if repository_ids.is_empty() {
            return Err(Error::validation("cross-repository query needs repositories"));
        }

        let classification = classify_heuristically(query);
        let pool = Arc::new(Semaphore::new(CROSS_REPO_PARALLELISM));

        let retrievals = join_all(repository_ids.iter().map(|repository_id| {
            let pool = Arc::clone(&pool);
            let classification = classification.clone();
            async move {
                let _permit = pool
                    .acquire()
                    .await
                    .map_err(|_| Error::transient("cross-repo pool closed"))?;
                let scoped = ConversationContext {
                    repository_ids: vec![repository_id.clone()],
                    ..Default::default()
                };
                let items = self
                    .retrieve_relevant_context(query, &scoped, &classification, None, per_repo)
                    .await?;
                Ok::<_, Error>((repository_id.clone(), items))
            }
        }))
        .await;

        let mut cross = CrossRepositoryContext::default();
        for outcome in retrievals {
            let (repository_id, items) = outcome?;
            cross.groups.insert(repository_id, items);
        }

        // cap at 3×per_repo, trimming the lowest scores first
        let cap = per_repo * 3;
        let mut total: usize = cross.groups.values().map(Vec::len).sum();
        while total > cap {
            let worst_repo = cross
                .groups
                .iter()
                .filter(|(_, items)| !items.is_empty())
                .min_by(|a, b| {
                    let score = |items: &Vec<RetrievedItem>| {
                        items.last().map(|i| i.relevance_score).unwrap_or(0.0)
                    };
                    score(a.1)
                        .partial_cmp(&score(b.1))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(repo, _)| repo.clone());
            match worst_repo {
                Some(repo) => {
                    if let Some(items) = cross.groups.get_mut(&repo) {
                        items.pop();
                    }
                    total -= 1;
                }
                None => break,
            }
        }

        self.summarize_commonalities(query, &mut cross).await;
        Ok(cross)
    }

    /// Common patterns from the graph (shared entity and pattern names)
    /// plus an LLM comparative summary when available.
    async fn summarize_commonalities(&self, query: &str, cross: &mut CrossRepositoryContext) {
        let mut name_sets: Vec<BTreeSet<String>> = Vec::new();
        for repository_id in cross.groups.keys() {
            let mut names = BTreeSet::new();
            if let Ok(entities) = self.graph.entities_by_repository(repository_id).await {
                names.extend(
                    entities
                        .iter()
                        .filter(|e| e.name.len() >= 4)
                        .map(|e| e.name.to_lowercase()),
                );
            }
            if let Ok(patterns) = self.graph.patterns_by_repository(repository_id).await {
                names.extend(patterns.iter().map(|p| p.name.to_lowercase()));
            }
            name_sets.push(names);
        }

        if let Some((first, rest)) = name_sets.split_first() {
            let mut shared: Vec<String> = first
                .iter()
                .filter(|name| rest.iter().all(|set| set.contains(*name)))
                .cloned()
                .collect();
            shared.truncate(10);
            cross.common_patterns = shared;
        }

        let digest: String = cross
            .groups
            .iter()
            .map(|(repo, items)| {
                let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
                format!("{repo}: {}\n", titles.join(", "))
            })
            .collect();
        let request = CompletionRequest::new(
            &self.config.deployment,
            vec![
                ChatMessage::system(
                    "Compare retrieval results across repositories. Answer with lines starting \
with 'COMMON: ' or 'DIFF: '.",
                ),
                ChatMessage::user(format!("Question: {query}\n\nResults per repository:\n{digest}")),
            ],
        )
        .with_max_tokens(400)
        .with_temperature(0.2);

        match self.llm.complete(request).await {
            Ok(response) => {
                for line in response.content.lines() {
                    if let Some(common) = line.trim().strip_prefix("COMMON: ") {
                        cross.common_patterns.push(common.to_string());
                    } else if let Some(diff) = line.trim().strip_prefix("DIFF: ") {
                        cross.differences.push(diff.to_string());
                    }
                }
            }
            Err(err) => warn!(error = %err, "comparative summary skipped"),
        }
    }
}

fn expand_query(
    query: &str,
    classification: &IntentClassification,
    history_summary: Option<&str>,
) -> String {
    let mut expanded = query.to_string();
    for entity in classification.entities.iter().take(5) {
        if !expanded.contains(entity.as_str()) {
            expanded.push(' ');
            expanded.push_str(entity);
        }
    }
    if let Some(summary) = history_summary {
        expanded.push(' ');
        expanded.push_str(summary);
    }
    expanded
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}

fn compose_prompt(
    query: &str,
    evidence: &[&RetrievedItem],
    turns: &[&ConversationMessage],
    context: &ConversationContext,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a repository-aware assistant. Ground every statement in the evidence below; \
say so when the evidence is insufficient.\n\n",
    );

    prompt.push_str("[Repository context]\n");
    if context.repository_ids.is_empty() {
        prompt.push_str("(no repositories selected)\n");
    } else {
        prompt.push_str(&format!("Repositories: {}\n", context.repository_ids.join(", ")));
    }
    if let Some(domain) = &context.domain {
        prompt.push_str(&format!("Domain: {domain}\n"));
    }

    prompt.push_str("\n[Evidence]\n");
    for (i, item) in evidence.iter().enumerate() {
        let location = match (&item.path, item.line) {
            (Some(path), Some(line)) => format!("{path}:{line}"),
            (Some(path), None) => path.clone(),
            _ => item.repository_id.clone(),
        };
        prompt.push_str(&format!(
            "{}. {} [{}] ({:.2})\n{}\n",
            i + 1,
            item.title,
            location,
            item.relevance_score,
            item.snippet
        ));
    }

    if !turns.is_empty() {
        prompt.push_str("\n[Recent turns]\n");
        for message in turns {
            prompt.push_str(&format!("{}: {}\n", message.kind.as_str(), message.content));
        }
    }

    prompt.push_str(&format!("\n[User query]\n{query}\n"));
    prompt
}
