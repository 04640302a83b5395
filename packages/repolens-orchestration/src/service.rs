//! Service facade: wires the capability implementations into the engine.
//!
//! The host constructs this once at startup with its source host, LLM and
//! embedding clients; everything downstream receives its dependencies
//! explicitly (no service locator, no global state).

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use repolens_core::config::EngineConfig;
use repolens_core::error::{Error, Result};
use repolens_core::events::EventBus;
use repolens_core::llm::{EmbeddingClient, LlmClient};
use repolens_core::models::{Conversation, ConversationContext, Documentation};
use repolens_core::quota::RequestQuota;
use repolens_conversation::{
    ConversationStore, ConversationalAssistant, CrossRepositoryContext, InMemoryConversationStore,
    QueryResponse, RetrievalService,
};
use repolens_docgen::{DocumentationGenerator, GenerationReport};
use repolens_ingest::host::{Credential, SourceHost};
use repolens_knowledge::{GraphStore, HybridIndex, InMemoryGraphStore, SearchIndex};

use crate::ingest::{IngestReport, IngestionOrchestrator};
use crate::sweeper::MaintenanceSweeper;

/// One handle over the whole engine.
pub struct KnowledgeService {
    pub events: Arc<EventBus>,
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub generator: Arc<DocumentationGenerator>,
    pub assistant: Arc<ConversationalAssistant>,
    pub retrieval: Arc<RetrievalService>,
    pub conversations: Arc<dyn ConversationStore>,
    pub graph_store: Arc<dyn GraphStore>,
    pub index: Arc<dyn SearchIndex>,
    pub sweeper: Arc<MaintenanceSweeper>,

    documentation: DashMap<String, Documentation>,
    config: EngineConfig,
}

impl KnowledgeService {
    pub fn new(
        host: Arc<dyn SourceHost>,
        llm: Arc<dyn LlmClient>,
        embedder: Option<Arc<dyn EmbeddingClient>>,
        config: EngineConfig,
    ) -> Result<Self> {
        let events = Arc::new(EventBus::new());
        let graph_store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let index: Arc<dyn SearchIndex> = Arc::new(HybridIndex::new()?);
        let conversations: Arc<dyn ConversationStore> = Arc::new(
            InMemoryConversationStore::new(config.conversation.clone()),
        );

        let orchestrator = Arc::new(IngestionOrchestrator::new(
            host,
            Arc::clone(&graph_store),
            Arc::clone(&index),
            embedder.clone(),
            Arc::clone(&events),
            config.ingestion.clone(),
            config.indexing.clone(),
            config.embedding.clone(),
            config.graph.clone(),
        ));

        let quota = Arc::new(RequestQuota::new(
            config.documentation.requests_per_minute,
            config.documentation.max_tokens_per_day,
        ));
        let generator = Arc::new(DocumentationGenerator::new(
            Arc::clone(&llm),
            Arc::clone(&index),
            Arc::clone(&events),
            quota,
            config.documentation.clone(),
        ));

        let retrieval = Arc::new(RetrievalService::new(
            Arc::clone(&index),
            Arc::clone(&graph_store),
            embedder,
            Arc::clone(&llm),
            config.assistant.clone(),
            config.embedding.clone(),
        ));
        let assistant = Arc::new(ConversationalAssistant::new(
            llm,
            Arc::clone(&conversations),
            Arc::clone(&retrieval),
            Arc::clone(&events),
            config.assistant.clone(),
        ));

        let sweeper = Arc::new(MaintenanceSweeper::new(
            Arc::clone(&conversations),
            config.conversation.clone(),
        ));

        Ok(Self {
            events,
            orchestrator,
            generator,
            assistant,
            retrieval,
            conversations,
            graph_store,
            index,
            sweeper,
            documentation: DashMap::new(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ingest a repository by URL; see [`IngestionOrchestrator::ingest`].
    pub async fn ingest_repository(
        &self,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<IngestReport> {
        self.orchestrator
            .ingest(url, credential, &CancellationToken::new())
            .await
    }

    /// Generate documentation for an ingested repository, persisting the
    /// resulting aggregate (including failed runs, which stay recoverable
    /// via regeneration).
    pub async fn generate_documentation(
        &self,
        repository_id: &str,
    ) -> Result<(Documentation, GenerationReport)> {
        let analysis = self.orchestrator.analysis(repository_id).ok_or_else(|| {
            Error::not_found(format!("no analysis for repository {repository_id}"))
        })?;

        let outcome = match self.documentation.get(repository_id).map(|d| d.clone()) {
            Some(existing)
                if existing.status
                    == repolens_core::models::DocumentationStatus::UpdateRequired =>
            {
                self.generator.regenerate(existing, &analysis).await?
            }
            _ => self.generator.generate(&analysis).await?,
        };

        self.documentation
            .insert(repository_id.to_string(), outcome.0.clone());
        Ok(outcome)
    }

    /// Mark a repository's documentation for regeneration.
    pub fn mark_documentation_for_regeneration(&self, repository_id: &str) -> Result<()> {
        let mut doc = self
            .documentation
            .get_mut(repository_id)
            .ok_or_else(|| Error::not_found(format!("no documentation for {repository_id}")))?;
        doc.mark_for_regeneration()
    }

    pub fn documentation(&self, repository_id: &str) -> Option<Documentation> {
        self.documentation.get(repository_id).map(|d| d.clone())
    }

    /// Open a conversation scoped to the given repositories.
    pub async fn start_conversation(
        &self,
        user_id: &str,
        title: &str,
        repository_ids: Vec<String>,
    ) -> Result<Conversation> {
        let context = ConversationContext {
            repository_ids,
            ..Default::default()
        };
        let conversation = Conversation::new(user_id, title, context)?;
        self.conversations.save(&conversation).await?;
        Ok(conversation)
    }

    /// One chat turn; see [`ConversationalAssistant::process_query`].
    pub async fn ask(&self, conversation_id: &str, query: &str) -> Result<QueryResponse> {
        self.assistant.process_query(conversation_id, query).await
    }

    /// Cross-repository comparison retrieval.
    pub async fn compare_repositories(
        &self,
        query: &str,
        repository_ids: &[String],
        per_repo: usize,
    ) -> Result<CrossRepositoryContext> {
        self.retrieval
            .build_cross_repository_context(query, repository_ids, per_repo)
            .await
    }

    /// Cascade delete of a repository and everything derived from it.
    pub async fn delete_repository(&self, repository_id: &str) -> Result<()> {
        self.orchestrator.delete_repository(repository_id).await?;
        self.documentation.remove(repository_id);
        Ok(())
    }
}
