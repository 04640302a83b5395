//! Ingestion orchestrator: the per-repository lifecycle state machine.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use repolens_core::config::{EmbeddingConfig, GraphConfig, IndexingConfig, IngestionConfig};
use repolens_core::error::{Error, Result};
use repolens_core::events::{DomainEventKind, EventBus};
use repolens_core::ids;
use repolens_core::llm::EmbeddingClient;
use repolens_core::models::{
    GraphStatus, KnowledgeGraph, Repository, RepositoryAnalysisContext, RepositoryStatus,
};
use repolens_core::retry::{with_retries, RetryPolicy};
use repolens_ingest::analyzer::RepositoryAnalyzer;
use repolens_ingest::embed::EntityEmbedder;
use repolens_ingest::host::{Credential, SourceHost};
use repolens_ingest::languages;
use repolens_knowledge::graph::builder::{GraphBuildReport, GraphBuilder, RepositorySource};
use repolens_knowledge::index::chunker;
use repolens_knowledge::{GraphStore, SearchDocument, SearchIndex};

use crate::checkpoint::{Checkpoint, CheckpointManager};
use crate::phases::IngestPhase;

/// Outcome of one `ingest` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub repository_id: String,
    /// False when an unchanged repository was re-ingested (full no-op).
    pub changed: bool,
    pub entity_count: usize,
    pub relationship_count: usize,
    pub pattern_count: usize,
    pub indexed_chunks: usize,
    pub tombstoned_chunks: usize,
    /// Phases skipped because a checkpoint for the same snapshot existed.
    pub resumed_phases: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexPhaseOutput {
    indexed: usize,
    tombstoned: usize,
}

/// Binds source host, analyzer, graph builder and content index into the
/// repository lifecycle `Connecting → Connected → Analyzing → Ready`, with
/// `Error` and `Disconnected` handled per the edge table on
/// [`RepositoryStatus`]. Every sub-step checkpoints, so a crashed or
/// cancelled run resumes at the last completed sub-step.
pub struct IngestionOrchestrator {
    host: Arc<dyn SourceHost>,
    analyzer: RepositoryAnalyzer,
    graph_builder: Arc<GraphBuilder>,
    graph_store: Arc<dyn GraphStore>,
    index: Arc<dyn SearchIndex>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
    events: Arc<EventBus>,
    checkpoints: CheckpointManager,

    repositories: DashMap<String, Repository>,
    analyses: DashMap<String, RepositoryAnalysisContext>,
    digests: DashMap<String, String>,

    ingest_pool: Arc<Semaphore>,
    analysis_pool: Arc<Semaphore>,
    policy: RetryPolicy,
    indexing: IndexingConfig,
    embedding: EmbeddingConfig,
}

impl IngestionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: Arc<dyn SourceHost>,
        graph_store: Arc<dyn GraphStore>,
        index: Arc<dyn SearchIndex>,
        embedder: Option<Arc<dyn EmbeddingClient>>,
        events: Arc<EventBus>,
        ingestion: IngestionConfig,
        indexing: IndexingConfig,
        embedding: EmbeddingConfig,
        graph: GraphConfig,
    ) -> Self {
        let mut graph_builder = GraphBuilder::new(
            Arc::clone(&graph_store),
            Arc::clone(&events),
            graph,
            ingestion.max_concurrent_analysis,
        );
        if let Some(client) = &embedder {
            graph_builder = graph_builder.with_embedder(Arc::new(EntityEmbedder::new(
                Arc::clone(client),
                embedding.clone(),
            )));
        }
        let graph_builder = Arc::new(graph_builder);
        Self {
            host,
            analyzer: RepositoryAnalyzer::new(),
            graph_builder,
            graph_store,
            index,
            embedder,
            events,
            checkpoints: CheckpointManager::new_in_memory(),
            repositories: DashMap::new(),
            analyses: DashMap::new(),
            digests: DashMap::new(),
            ingest_pool: Arc::new(Semaphore::new(ingestion.max_concurrent_ingestions.max(1))),
            analysis_pool: Arc::new(Semaphore::new(ingestion.max_concurrent_analysis.max(1))),
            policy: RetryPolicy::new(ingestion.retry_attempts),
            indexing,
            embedding,
        }
    }

    pub fn repository(&self, repository_id: &str) -> Option<Repository> {
        self.repositories.get(repository_id).map(|r| r.clone())
    }

    pub fn repositories(&self) -> Vec<Repository> {
        let mut all: Vec<Repository> = self.repositories.iter().map(|r| r.clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn analysis(&self, repository_id: &str) -> Option<RepositoryAnalysisContext> {
        self.analyses.get(repository_id).map(|a| a.clone())
    }

    /// Ingest (or re-ingest) the repository at `url`.
    pub async fn ingest(
        &self,
        url: &str,
        credential: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let _permit = self
            .ingest_pool
            .acquire()
            .await
            .map_err(|_| Error::transient("ingestion pool closed"))?;

        let host = self.host.as_ref();

        // ── Connecting ─────────────────────────────────────────────────
        let accessible = self
            .step(None, url, "connecting", {
                with_retries(&self.policy, "validate_access", || async move {
                    host.validate_access(url, credential).await
                })
                .await
            })
            .await?;
        if !accessible {
            let err = Error::SourceAuth(format!("access validation failed for {url}"));
            self.fail_ingest(None, url, "connecting", &err).await;
            return Err(err);
        }

        let connected = self
            .step(None, url, "connecting", {
                with_retries(&self.policy, "connect_repository", || async move {
                    host.connect_repository(url, credential).await
                })
                .await
            })
            .await?;
        let repository_id = connected.id.clone();

        let mut repo = match self.repositories.get(&repository_id) {
            Some(existing) => existing.clone(),
            None => {
                self.repositories
                    .insert(repository_id.clone(), connected.clone());
                connected
            }
        };

        // ── Re-ingest of a Ready repository: no-op when unchanged ──────
        if repo.status == RepositoryStatus::Ready {
            let previous_digest = self.digests.get(&repository_id).map(|d| d.clone());
            let changed = self
                .step(Some(&repository_id), &repository_id, "change_detection", {
                    self.analyzer
                        .has_repository_changed(
                            &repo,
                            None,
                            previous_digest.as_deref(),
                            host,
                            credential,
                        )
                        .await
                })
                .await?;
            if !changed {
                info!(repository = %repository_id, "repository unchanged, ingest is a no-op");
                return Ok(IngestReport {
                    repository_id,
                    changed: false,
                    ..Default::default()
                });
            }
            self.set_status(&mut repo, RepositoryStatus::Analyzing)?;
        } else {
            if repo.status == RepositoryStatus::Disconnected {
                self.set_status(&mut repo, RepositoryStatus::Connecting)?;
            }

            // ── Connected: branches + structure statistics ─────────────
            self.set_status(&mut repo, RepositoryStatus::Connected)?;

            let branches = {
                let repo_ref = &repo;
                self.step(Some(&repository_id), &repository_id, "connected", {
                    with_retries(&self.policy, "list_branches", || async move {
                        host.list_branches(repo_ref, credential).await
                    })
                    .await
                })
                .await?
            };
            let branch_result = repo.set_branches(branches);
            self.step(Some(&repository_id), &repository_id, "connected", branch_result)
                .await?;

            let statistics = {
                let repo_ref = &repo;
                self.step(Some(&repository_id), &repository_id, "connected", {
                    with_retries(&self.policy, "analyze_structure", || async move {
                        host.analyze_structure(repo_ref, &repo_ref.default_branch, credential)
                            .await
                    })
                    .await
                })
                .await?
            };
            repo.statistics = statistics;
            self.repositories.insert(repository_id.clone(), repo.clone());
            self.set_status(&mut repo, RepositoryStatus::Analyzing)?;
        }

        // ── Analyzing: checkpointed sub-steps ──────────────────────────
        let report = self.run_analysis_phases(&repo, credential, cancel).await?;

        // ── Ready ──────────────────────────────────────────────────────
        self.set_status(&mut repo, RepositoryStatus::Ready)?;
        self.events.publish(DomainEventKind::RepositoryReady {
            repository_id: repository_id.clone(),
        });
        self.checkpoints.delete_for_repository(&repository_id).await?;
        info!(
            repository = %repository_id,
            entities = report.entity_count,
            chunks = report.indexed_chunks,
            "ingestion complete"
        );
        Ok(report)
    }

    async fn run_analysis_phases(
        &self,
        repo: &Repository,
        credential: Option<&Credential>,
        cancel: &CancellationToken,
    ) -> Result<IngestReport> {
        let repository_id = repo.id.clone();
        let host = self.host.as_ref();
        let mut report = IngestReport {
            repository_id: repository_id.clone(),
            changed: true,
            ..Default::default()
        };

        let tree = self
            .step(Some(&repository_id), &repository_id, "analyzing", {
                with_retries(&self.policy, "list_tree", || async move {
                    host.list_tree(repo, &repo.default_branch, credential).await
                })
                .await
            })
            .await?;
        let digest = ids::inventory_digest(tree.iter().map(|e| (e.path.as_str(), e.size)));
        let completed = self
            .checkpoints
            .completed_phases(&repository_id, &digest)
            .await?;
        report.resumed_phases = completed.len();
        if !completed.is_empty() {
            info!(
                repository = %repository_id,
                resumed = completed.len(),
                "resuming ingestion from checkpoint"
            );
        }

        // Sub-step 1: structural analysis
        self.check_cancelled(cancel)?;
        let analysis = self
            .phase_structure(repo, credential, &digest, &completed)
            .await?;
        self.analyses.insert(repository_id.clone(), analysis.clone());

        // Sub-step 2: important-file contents
        self.check_cancelled(cancel)?;
        let files = self
            .phase_entities(repo, credential, &analysis, &digest, &completed)
            .await?;

        // Sub-step 3: knowledge graph
        self.check_cancelled(cancel)?;
        let graph_report = self
            .phase_graph(&repository_id, &files, &digest, &completed)
            .await?;
        report.entity_count = graph_report.entity_count;
        report.relationship_count = graph_report.relationship_count;
        report.pattern_count = graph_report.pattern_count;

        // Sub-step 4: content index
        self.check_cancelled(cancel)?;
        let index_output = self
            .phase_index(&repository_id, &files, &digest, &completed)
            .await?;
        report.indexed_chunks = index_output.indexed;
        report.tombstoned_chunks = index_output.tombstoned;

        self.digests.insert(repository_id, digest);
        Ok(report)
    }

    async fn phase_structure(
        &self,
        repo: &Repository,
        credential: Option<&Credential>,
        digest: &str,
        completed: &HashSet<IngestPhase>,
    ) -> Result<RepositoryAnalysisContext> {
        let key = IngestPhase::Structure.cache_key(&repo.id, digest);
        if completed.contains(&IngestPhase::Structure) {
            if let Some(data) = self.checkpoints.load(&key).await? {
                if let Ok(analysis) = bincode::deserialize(&data) {
                    return Ok(analysis);
                }
                warn!(repository = %repo.id, "structure checkpoint unreadable, recomputing");
            }
        }

        let analyzer = &self.analyzer;
        let host = self.host.as_ref();
        let analysis = self
            .step(Some(&repo.id), &repo.id, IngestPhase::Structure.as_str(), {
                with_retries(&self.policy, "analyze_repository", || async move {
                    analyzer.analyze(repo, host, credential).await
                })
                .await
            })
            .await?;

        let data = bincode::serialize(&analysis)
            .map_err(|e| Error::permanent(format!("structure checkpoint encode: {e}")))?;
        self.checkpoints
            .save(Checkpoint::new(&repo.id, IngestPhase::Structure, key, data))
            .await?;
        Ok(analysis)
    }

    async fn phase_entities(
        &self,
        repo: &Repository,
        credential: Option<&Credential>,
        analysis: &RepositoryAnalysisContext,
        digest: &str,
        completed: &HashSet<IngestPhase>,
    ) -> Result<Vec<(String, String)>> {
        let key = IngestPhase::Entities.cache_key(&repo.id, digest);
        if completed.contains(&IngestPhase::Entities) {
            if let Some(data) = self.checkpoints.load(&key).await? {
                if let Ok(files) = bincode::deserialize(&data) {
                    return Ok(files);
                }
            }
        }

        // bounded-parallel blob fetch; join_all preserves input order
        let host = self.host.as_ref();
        let policy = &self.policy;
        let fetches = join_all(analysis.important_files.iter().map(|file| {
            let pool = Arc::clone(&self.analysis_pool);
            let path = file.path.clone();
            async move {
                let _permit = pool
                    .acquire()
                    .await
                    .map_err(|_| Error::transient("analysis pool closed"))?;
                let path_ref = path.as_str();
                let bytes = with_retries(policy, "read_file", || async move {
                    host.read_file(repo, &repo.default_branch, path_ref, credential)
                        .await
                })
                .await?;
                Ok::<_, Error>((path, String::from_utf8_lossy(&bytes).into_owned()))
            }
        }))
        .await;

        let mut files = Vec::with_capacity(fetches.len());
        for fetch in fetches {
            let file = self
                .step(Some(&repo.id), &repo.id, IngestPhase::Entities.as_str(), fetch)
                .await?;
            files.push(file);
        }

        let data = bincode::serialize(&files)
            .map_err(|e| Error::permanent(format!("entities checkpoint encode: {e}")))?;
        self.checkpoints
            .save(Checkpoint::new(&repo.id, IngestPhase::Entities, key, data))
            .await?;
        Ok(files)
    }

    async fn phase_graph(
        &self,
        repository_id: &str,
        files: &[(String, String)],
        digest: &str,
        completed: &HashSet<IngestPhase>,
    ) -> Result<GraphBuildReport> {
        let key = IngestPhase::Graph.cache_key(repository_id, digest);
        if completed.contains(&IngestPhase::Graph) {
            if let Some(data) = self.checkpoints.load(&key).await? {
                if let Ok(graph_report) = bincode::deserialize(&data) {
                    return Ok(graph_report);
                }
            }
        }

        let mut graph = match self.graph_store.graph_for_repository(repository_id).await? {
            Some(graph) => graph,
            None => KnowledgeGraph::new(vec![repository_id.to_string()])?,
        };
        if graph.status == GraphStatus::Complete {
            self.graph_builder.mark_update_required(&mut graph).await?;
        }

        let source = RepositorySource {
            repository_id: repository_id.to_string(),
            files: files.to_vec(),
        };
        let build = self.graph_builder.build(&mut graph, vec![source]).await;
        let graph_report = self
            .step(
                Some(repository_id),
                repository_id,
                IngestPhase::Graph.as_str(),
                build,
            )
            .await?;

        let data = bincode::serialize(&graph_report)
            .map_err(|e| Error::permanent(format!("graph checkpoint encode: {e}")))?;
        self.checkpoints
            .save(Checkpoint::new(repository_id, IngestPhase::Graph, key, data))
            .await?;
        Ok(graph_report)
    }

    async fn phase_index(
        &self,
        repository_id: &str,
        files: &[(String, String)],
        digest: &str,
        completed: &HashSet<IngestPhase>,
    ) -> Result<IndexPhaseOutput> {
        let key = IngestPhase::Index.cache_key(repository_id, digest);
        if completed.contains(&IngestPhase::Index) {
            if let Some(data) = self.checkpoints.load(&key).await? {
                if let Ok(output) = bincode::deserialize(&data) {
                    return Ok(output);
                }
            }
        }

        let mut documents: Vec<SearchDocument> = Vec::new();
        for (path, content) in files {
            documents.extend(chunker::chunk_file(
                repository_id,
                path,
                languages::language_for_path(path),
                content,
                &self.indexing,
            ));
        }

        if let Some(embedder) = &self.embedder {
            let embedder = embedder.as_ref();
            let deployment = self.embedding.deployment.as_str();
            for batch in documents.chunks_mut(self.embedding.max_batch_size.max(1)) {
                let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
                let texts_ref = &texts;
                let vectors = self
                    .step(
                        Some(repository_id),
                        repository_id,
                        IngestPhase::Index.as_str(),
                        with_retries(&self.policy, "embed_chunks", || async move {
                            embedder.embed_batch(deployment, texts_ref).await
                        })
                        .await,
                    )
                    .await?;
                for (document, vector) in batch.iter_mut().zip(vectors) {
                    document.vector = Some(vector);
                }
            }
        }

        // tombstone chunks that no longer exist in this snapshot
        let new_ids: HashSet<String> = documents.iter().map(|d| d.id.clone()).collect();
        let stale: Vec<String> = self
            .index
            .ids_for_repository(repository_id)
            .await?
            .into_iter()
            .filter(|id| id.starts_with("chk_") && !new_ids.contains(id))
            .collect();
        let tombstoned = if stale.is_empty() {
            0
        } else {
            self.index.delete(&stale).await?
        };

        // batched writes under the indexing pool; readers never blocked
        let indexing_pool = Arc::new(Semaphore::new(
            self.indexing.max_concurrent_indexing_operations.max(1),
        ));
        let upserts = join_all(documents.chunks(100).map(|batch| {
            let pool = Arc::clone(&indexing_pool);
            let batch = batch.to_vec();
            async move {
                let _permit = pool
                    .acquire()
                    .await
                    .map_err(|_| Error::transient("indexing pool closed"))?;
                self.index.upsert(batch).await
            }
        }))
        .await;
        let mut indexed = 0usize;
        for upsert in upserts {
            indexed += self
                .step(
                    Some(repository_id),
                    repository_id,
                    IngestPhase::Index.as_str(),
                    upsert,
                )
                .await?;
        }

        let output = IndexPhaseOutput {
            indexed,
            tombstoned,
        };
        let data = bincode::serialize(&output)
            .map_err(|e| Error::permanent(format!("index checkpoint encode: {e}")))?;
        self.checkpoints
            .save(Checkpoint::new(repository_id, IngestPhase::Index, key, data))
            .await?;
        Ok(output)
    }

    /// Cascade delete: graph, index documents, repository entry.
    pub async fn delete_repository(&self, repository_id: &str) -> Result<()> {
        self.graph_store.delete_repository(repository_id).await?;
        let doc_ids = self.index.ids_for_repository(repository_id).await?;
        if !doc_ids.is_empty() {
            self.index.delete(&doc_ids).await?;
        }
        self.repositories.remove(repository_id);
        self.analyses.remove(repository_id);
        self.digests.remove(repository_id);
        self.checkpoints.delete_for_repository(repository_id).await?;
        self.events.publish(DomainEventKind::RepositoryDeleted {
            repository_id: repository_id.to_string(),
        });
        Ok(())
    }

    /// Detach a repository without deleting its derived data.
    pub fn disconnect(&self, repository_id: &str) -> Result<()> {
        let mut repo = self
            .repositories
            .get_mut(repository_id)
            .ok_or_else(|| Error::not_found(format!("repository {repository_id}")))?;
        let from = repo.status;
        repo.transition(RepositoryStatus::Disconnected)?;
        self.events
            .publish(DomainEventKind::RepositoryStatusChanged {
                repository_id: repository_id.to_string(),
                from: from.as_str().to_string(),
                to: RepositoryStatus::Disconnected.as_str().to_string(),
            });
        Ok(())
    }

    fn check_cancelled(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            // work up to the last checkpoint is preserved for resume
            return Err(Error::Timeout("ingestion cancelled".to_string()));
        }
        Ok(())
    }

    fn set_status(&self, repo: &mut Repository, to: RepositoryStatus) -> Result<()> {
        let from = repo.status;
        repo.transition(to)?;
        self.repositories.insert(repo.id.clone(), repo.clone());
        self.events
            .publish(DomainEventKind::RepositoryStatusChanged {
                repository_id: repo.id.clone(),
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        Ok(())
    }

    /// Pass a sub-step result through, recording failure bookkeeping
    /// (repository → `Error`, diagnostic event) on the way out.
    async fn step<T>(
        &self,
        repository_id: Option<&str>,
        subject: &str,
        phase: &str,
        result: Result<T>,
    ) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                self.fail_ingest(repository_id, subject, phase, &err).await;
                Err(err)
            }
        }
    }

    async fn fail_ingest(
        &self,
        repository_id: Option<&str>,
        subject: &str,
        phase: &str,
        err: &Error,
    ) {
        warn!(repository = subject, phase, error = %err, "ingestion step failed");
        if let Some(id) = repository_id {
            if let Some(mut repo) = self.repositories.get_mut(id) {
                let from = repo.status;
                if repo.transition(RepositoryStatus::Error).is_ok() {
                    self.events
                        .publish(DomainEventKind::RepositoryStatusChanged {
                            repository_id: id.to_string(),
                            from: from.as_str().to_string(),
                            to: RepositoryStatus::Error.as_str().to_string(),
                        });
                }
            }
        }
        self.events.publish(DomainEventKind::IngestionFailed {
            repository_id: subject.to_string(),
            phase: phase.to_string(),
            error_kind: err.kind().to_string(),
            message: err.to_string(),
        });
    }
}
