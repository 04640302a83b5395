//! Knowledge-graph build pipeline: extract → analyze → detect → persist.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use repolens_core::config::GraphConfig;
use repolens_core::error::{Error, Result};
use repolens_core::events::{DomainEventKind, EventBus};
use repolens_core::models::{
    ArchitecturalPattern, CodeEntity, CodeRelationship, GraphStatistics, GraphStatus,
    KnowledgeGraph,
};
use repolens_ingest::embed::EntityEmbedder;
use repolens_ingest::extract::{linkage, EntityExtractor, SymbolReference};

use super::patterns::{default_detectors, PatternDetector};
use super::store::GraphStore;

/// Files of one repository to extract from.
#[derive(Debug, Clone)]
pub struct RepositorySource {
    pub repository_id: String,
    /// `(path, content)` pairs.
    pub files: Vec<(String, String)>,
}

#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphBuildReport {
    pub entity_count: usize,
    pub relationship_count: usize,
    pub pattern_count: usize,
    pub tombstoned: usize,
    pub dropped_low_confidence: usize,
}

/// Builds and persists a [`KnowledgeGraph`] over one or more repositories.
///
/// File extraction runs per repository under bounded parallelism; the
/// multi-repository build is a barrier that awaits every extraction before
/// relationship analysis starts.
pub struct GraphBuilder {
    store: Arc<dyn GraphStore>,
    events: Arc<EventBus>,
    config: GraphConfig,
    detectors: Vec<Box<dyn PatternDetector>>,
    embedder: Option<Arc<EntityEmbedder>>,
    analysis_pool: Arc<Semaphore>,
    max_concurrent_analysis: usize,
}

impl GraphBuilder {
    pub fn new(
        store: Arc<dyn GraphStore>,
        events: Arc<EventBus>,
        config: GraphConfig,
        max_concurrent_analysis: usize,
    ) -> Self {
        let permits = max_concurrent_analysis.max(1);
        Self {
            store,
            events,
            config,
            detectors: default_detectors(),
            embedder: None,
            analysis_pool: Arc::new(Semaphore::new(permits)),
            max_concurrent_analysis: permits,
        }
    }

    /// Attach an embedder; extracted entities then carry `content_vector`.
    pub fn with_embedder(mut self, embedder: Arc<EntityEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Run the full build for `graph`, mutating its status through the
    /// lifecycle and persisting the result. On failure the graph lands in
    /// `Error` and the cause is returned.
    pub async fn build(
        &self,
        graph: &mut KnowledgeGraph,
        sources: Vec<RepositorySource>,
    ) -> Result<GraphBuildReport> {
        self.transition(graph, GraphStatus::Building).await?;

        match self.run_build(graph, sources).await {
            Ok(report) => Ok(report),
            Err(err) => {
                // Building/Analyzing → Error are both legal edges
                if graph.transition(GraphStatus::Error).is_ok() {
                    self.store.save_graph(graph).await.ok();
                }
                Err(err)
            }
        }
    }

    async fn run_build(
        &self,
        graph: &mut KnowledgeGraph,
        sources: Vec<RepositorySource>,
    ) -> Result<GraphBuildReport> {
        let mut report = GraphBuildReport::default();

        // Phase 1: extraction, bounded, barrier at the end.
        let mut tasks = Vec::new();
        for source in sources {
            let pool = Arc::clone(&self.analysis_pool);
            let max_entities = self.config.max_entities_per_repository;
            tasks.push(tokio::spawn(async move {
                let _permit = pool
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::transient("analysis pool closed"))?;
                tokio::task::spawn_blocking(move || extract_repository(source, max_entities))
                    .await
                    .map_err(|e| Error::permanent(format!("extraction task panicked: {e}")))?
            }));
        }

        let mut entities: Vec<CodeEntity> = Vec::new();
        let mut relationships: Vec<CodeRelationship> = Vec::new();
        let mut pending: Vec<SymbolReference> = Vec::new();
        let mut keep_ids: BTreeMap<String, HashSet<String>> = BTreeMap::new();

        for task in tasks {
            let extraction = task
                .await
                .map_err(|e| Error::permanent(format!("extraction join failed: {e}")))??;
            keep_ids
                .entry(extraction.repository_id.clone())
                .or_default()
                .extend(extraction.entities.iter().map(|e| e.entity_id.clone()));
            entities.extend(extraction.entities);
            relationships.extend(extraction.relationships);
            pending.extend(extraction.references);
        }

        if let Some(embedder) = &self.embedder {
            embedder.embed_entities(&mut entities).await?;
        }

        // Phase 2: relationship analysis.
        self.transition(graph, GraphStatus::Analyzing).await?;
        relationships.extend(linkage::link_cross_file(&entities, &pending));
        let before = relationships.len();
        let mut relationships = linkage::dedupe_relationships(relationships);
        let confidence_floor = self.config.min_relationship_confidence as f64 * 100.0;
        relationships.retain(|r| r.metadata.confidence >= confidence_floor);
        report.dropped_low_confidence = before.saturating_sub(relationships.len());

        // Phase 3: pattern detection, pure over the merged view.
        let mut patterns: BTreeMap<String, Vec<ArchitecturalPattern>> = BTreeMap::new();
        for repository_id in &graph.repository_ids {
            let mut detected: Vec<ArchitecturalPattern> = self
                .detectors
                .iter()
                .flat_map(|d| d.detect(repository_id, &entities, &relationships))
                .filter(|p| p.confidence >= self.config.min_pattern_confidence)
                .collect();
            detected.sort_by(|a, b| a.name.cmp(&b.name));
            report.pattern_count += detected.len();
            patterns.insert(repository_id.clone(), detected);
        }

        // Phase 4: persist with stable ordering; stale ids tombstoned.
        entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        self.store.upsert_entities(&entities).await?;
        self.store.upsert_relationships(&relationships).await?;
        for (repository_id, detected) in &patterns {
            self.store.replace_patterns(repository_id, detected).await?;
            if let Some(keep) = keep_ids.get(repository_id) {
                report.tombstoned += self
                    .store
                    .remove_missing_entities(repository_id, keep)
                    .await?;
            }
        }

        report.entity_count = entities.len();
        report.relationship_count = relationships.len();

        graph.statistics = compute_statistics(&entities, &relationships, report.pattern_count);
        self.transition(graph, GraphStatus::Complete).await?;
        self.store.save_graph(graph).await?;

        info!(
            graph = %graph.id,
            entities = report.entity_count,
            relationships = report.relationship_count,
            patterns = report.pattern_count,
            workers = self.max_concurrent_analysis,
            "knowledge graph build complete"
        );
        Ok(report)
    }

    /// Mark a complete graph as needing a rebuild (repository changed).
    pub async fn mark_update_required(&self, graph: &mut KnowledgeGraph) -> Result<()> {
        self.transition(graph, GraphStatus::UpdateRequired).await?;
        self.store.save_graph(graph).await
    }

    async fn transition(&self, graph: &mut KnowledgeGraph, to: GraphStatus) -> Result<()> {
        let from = graph.status;
        graph.transition(to)?;
        self.events.publish(DomainEventKind::GraphStatusChanged {
            graph_id: graph.id.clone(),
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        });
        Ok(())
    }
}

struct Extraction {
    repository_id: String,
    entities: Vec<CodeEntity>,
    relationships: Vec<CodeRelationship>,
    references: Vec<SymbolReference>,
}

fn extract_repository(source: RepositorySource, max_entities: usize) -> Result<Extraction> {
    use rayon::prelude::*;

    // Per-file parses are order-independent; collect preserves input order
    // so the merged output stays deterministic.
    let parsed_files = source
        .files
        .par_iter()
        .map(|(path, content)| {
            EntityExtractor::new().parse_file(&source.repository_id, path, content)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut entities = Vec::new();
    let mut relationships = Vec::new();
    let mut references = Vec::new();
    for parsed in parsed_files {
        entities.extend(parsed.entities);
        relationships.extend(parsed.relationships);
        references.extend(parsed.references);
    }

    if entities.len() > max_entities {
        warn!(
            repository = %source.repository_id,
            extracted = entities.len(),
            max_entities,
            "entity cap exceeded, truncating"
        );
        entities.truncate(max_entities);
        let kept: HashSet<&str> = entities.iter().map(|e| e.entity_id.as_str()).collect();
        relationships.retain(|r| {
            kept.contains(r.source_entity_id.as_str()) && kept.contains(r.target_entity_id.as_str())
        });
        references.retain(|r| kept.contains(r.from_entity_id.as_str()));
    }

    Ok(Extraction {
        repository_id: source.repository_id,
        entities,
        relationships,
        references,
    })
}

fn compute_statistics(
    entities: &[CodeEntity],
    relationships: &[CodeRelationship],
    pattern_count: usize,
) -> GraphStatistics {
    let mut entities_by_kind: BTreeMap<String, usize> = BTreeMap::new();
    for entity in entities {
        *entities_by_kind
            .entry(entity.kind.as_str().to_string())
            .or_default() += 1;
    }
    let mut relationships_by_kind: BTreeMap<String, usize> = BTreeMap::new();
    for rel in relationships {
        *relationships_by_kind
            .entry(rel.kind.as_str().to_string())
            .or_default() += 1;
    }
    let density = if entities.is_empty() {
        0.0
    } else {
        relationships.len() as f64 / entities.len() as f64
    };

    GraphStatistics {
        entity_count: entities.len(),
        relationship_count: relationships.len(),
        pattern_count,
        entities_by_kind,
        relationships_by_kind,
        density,
    }
}
