//! End-to-end scenarios over the full engine with fixture capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

use repolens_core::config::EngineConfig;
use repolens_core::error::{Error, Result};
use repolens_core::events::DomainEventKind;
use repolens_core::llm::{
    CompletionRequest, CompletionResponse, EmbeddingClient, LlmClient, TokenUsage,
};
use repolens_core::models::{
    ConversationStatus, DocumentationStatus, GraphStatus, RepositoryStatus, SectionType,
};
use repolens_conversation::ConversationStore;
use repolens_ingest::fixture::{FixtureHost, RepoFixture};
use repolens_knowledge::{GraphStore, SearchIndex};
use repolens_orchestration::KnowledgeService;

/// Deterministic LLM double for every prompt family the engine issues.
struct ScriptedLlm {
    fail_first: Mutex<Vec<Error>>,
}

impl ScriptedLlm {
    fn healthy() -> Self {
        Self {
            fail_first: Mutex::new(vec![]),
        }
    }

    fn failing(errors: Vec<Error>) -> Self {
        Self {
            fail_first: Mutex::new(errors),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        if let Some(err) = self.fail_first.lock().pop() {
            return Err(err);
        }

        let system = request
            .messages
            .first()
            .filter(|m| matches!(m.role, repolens_core::llm::ChatRole::System))
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let content = if request.max_tokens <= 8 {
            "9".to_string() // quality self-check rating
        } else if system.contains("Classify") {
            r#"{"intent": "architectural_query", "confidence": 0.9, "entities": ["AuthMiddleware"]}"#
                .to_string()
        } else if system.contains("follow-up") {
            "What about token refresh?\nWhere are sessions stored?\nHow is logout handled?"
                .to_string()
        } else if system.contains("Summarize") {
            "earlier turns discussed authentication".to_string()
        } else if system.contains("Compare retrieval results") {
            "COMMON: both gate requests through auth middleware\nDIFF: session storage differs"
                .to_string()
        } else if system.contains("documentation") {
            // section body: long enough for the quality gate, mentions a real file
            format!(
                "This service handles authentication. The entry point is main.go. {}",
                "It wires the middleware into the router and validates bearer tokens. ".repeat(4)
            )
        } else {
            "Authentication is enforced by AuthMiddleware in auth/middleware.go.".to_string()
        };

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 300,
                completion_tokens: 120,
            },
        })
    }
}

/// Embeds auth-related text near one pole so semantic retrieval has signal.
struct ScriptedEmbedder;

#[async_trait]
impl EmbeddingClient for ScriptedEmbedder {
    async fn embed_batch(&self, _deployment: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                if lower.contains("auth") {
                    vec![1.0, 0.1]
                } else {
                    vec![0.1, 1.0]
                }
            })
            .collect())
    }
}

fn go_repo(owner: &str, name: &str) -> RepoFixture {
    RepoFixture::new(owner, name)
        .with_file(
            "go.mod",
            "module example.com/svc\n\ngo 1.22\n\nrequire github.com/gin-gonic/gin v1.9.1\n",
        )
        .with_file(
            "main.go",
            "package main\n\nimport \"example.com/svc/auth\"\n\nfunc main() {\n\tauth.Install()\n}\n",
        )
        .with_file(
            "auth/middleware.go",
            "package auth\n\n// AuthMiddleware enforces authentication on every request.\nfunc AuthMiddleware(next Handler) Handler {\n\treturn next\n}\n\nfunc Install() {\n\tAuthMiddleware(nil)\n}\n",
        )
        .with_file("README.md", "# svc\nAuthentication service.\n")
        .with_commit("c1", "initial import", Utc::now())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn service_with(host: Arc<FixtureHost>, llm: ScriptedLlm) -> KnowledgeService {
    KnowledgeService::new(
        host,
        Arc::new(llm),
        Some(Arc::new(ScriptedEmbedder)),
        EngineConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn happy_path_ingestion_walks_lifecycle() {
    init_tracing();
    let host = Arc::new(FixtureHost::new());
    let fixture = go_repo("acme", "svc");
    let url = fixture.url().to_string();
    host.add_repository(fixture);
    let service = service_with(host, ScriptedLlm::healthy());

    let mut events = service.events.subscribe();
    let report = service.ingest_repository(&url, None).await.unwrap();

    assert_eq!(report.repository_id, "acme/svc");
    assert!(report.changed);
    assert!(report.entity_count > 0);
    assert!(report.indexed_chunks > 0);

    let repo = service.orchestrator.repository("acme/svc").unwrap();
    assert_eq!(repo.status, RepositoryStatus::Ready);
    assert_eq!(repo.full_name, "acme/svc");
    assert!(repo.clone_url.ends_with(".git"));

    let graph = service
        .graph_store
        .graph_for_repository("acme/svc")
        .await
        .unwrap()
        .expect("graph persisted");
    assert_eq!(graph.status, GraphStatus::Complete);
    assert!(graph.statistics.entity_count > 0);

    // status walk and exactly one RepositoryReady
    let mut transitions = Vec::new();
    let mut ready_count = 0;
    while let Ok(event) = events.try_recv() {
        match event.kind {
            DomainEventKind::RepositoryStatusChanged { from, to, .. } => {
                transitions.push((from, to));
            }
            DomainEventKind::RepositoryReady { .. } => ready_count += 1,
            _ => {}
        }
    }
    assert_eq!(ready_count, 1);
    let walk: Vec<(String, String)> = [
        ("connecting", "connected"),
        ("connected", "analyzing"),
        ("analyzing", "ready"),
    ]
    .iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect();
    for edge in &walk {
        assert!(transitions.contains(edge), "missing transition {edge:?}");
    }
}

#[tokio::test]
async fn reingest_unchanged_is_a_noop() {
    let host = Arc::new(FixtureHost::new());
    let fixture = go_repo("acme", "svc");
    let url = fixture.url().to_string();
    host.add_repository(fixture);
    let service = service_with(host, ScriptedLlm::healthy());

    service.ingest_repository(&url, None).await.unwrap();
    let entities_before: Vec<String> = service
        .graph_store
        .entities_by_repository("acme/svc")
        .await
        .unwrap()
        .iter()
        .map(|e| e.entity_id.clone())
        .collect();
    let docs_before = service.index.document_count().await.unwrap();

    let report = service.ingest_repository(&url, None).await.unwrap();
    assert!(!report.changed);

    let entities_after: Vec<String> = service
        .graph_store
        .entities_by_repository("acme/svc")
        .await
        .unwrap()
        .iter()
        .map(|e| e.entity_id.clone())
        .collect();
    assert_eq!(entities_before, entities_after);
    assert_eq!(service.index.document_count().await.unwrap(), docs_before);
}

#[tokio::test]
async fn reingest_changed_repository_tombstones_stale_data() {
    let host = Arc::new(FixtureHost::new());
    let fixture = go_repo("acme", "svc");
    let url = fixture.url().to_string();
    host.add_repository(fixture);
    let service = service_with(Arc::clone(&host), ScriptedLlm::healthy());

    service.ingest_repository(&url, None).await.unwrap();
    let entities_before = service
        .graph_store
        .entities_by_repository("acme/svc")
        .await
        .unwrap();
    assert!(entities_before
        .iter()
        .any(|e| e.file_path == "auth/middleware.go"));

    // delete a file upstream and re-ingest
    host.remove_file(&url, "auth/middleware.go");
    host.add_commit(&url, "c2", "drop middleware", Utc::now());
    let report = service.ingest_repository(&url, None).await.unwrap();
    assert!(report.changed);
    assert!(report.tombstoned_chunks > 0);

    let entities_after = service
        .graph_store
        .entities_by_repository("acme/svc")
        .await
        .unwrap();
    assert!(entities_after
        .iter()
        .all(|e| e.file_path != "auth/middleware.go"));
    // remaining ids are the stable subset of the originals
    let before_ids: std::collections::HashSet<String> = entities_before
        .iter()
        .map(|e| e.entity_id.clone())
        .collect();
    assert!(entities_after
        .iter()
        .all(|e| before_ids.contains(&e.entity_id)));
}

#[tokio::test]
async fn documentation_happy_path() {
    let host = Arc::new(FixtureHost::new());
    let fixture = go_repo("acme", "svc");
    let url = fixture.url().to_string();
    host.add_repository(fixture);
    let service = service_with(host, ScriptedLlm::healthy());

    service.ingest_repository(&url, None).await.unwrap();
    let (doc, report) = service.generate_documentation("acme/svc").await.unwrap();

    assert_eq!(doc.status, DocumentationStatus::Completed);
    assert_eq!(doc.version.to_string(), "1.0.1");
    assert!(report.quality_score >= 0.7);
    for required in [
        SectionType::Overview,
        SectionType::GettingStarted,
        SectionType::Installation,
        SectionType::Usage,
        SectionType::Configuration,
        SectionType::ApiReference,
    ] {
        assert!(doc.section(&required).is_some(), "missing {required:?}");
    }

    // rendered order is canonical: Overview first
    let rendered = doc.render_sections();
    assert_eq!(rendered[0].section_type, SectionType::Overview);
}

#[tokio::test]
async fn rate_limited_documentation_errors_then_recovers() {
    let host = Arc::new(FixtureHost::new());
    let fixture = go_repo("acme", "svc");
    let url = fixture.url().to_string();
    host.add_repository(fixture);

    let quota_errors = (0..5)
        .map(|_| Error::QuotaExceeded("request budget of 20/minute exhausted".into()))
        .collect();
    let service = service_with(host, ScriptedLlm::failing(quota_errors));

    service.ingest_repository(&url, None).await.unwrap();
    let (doc, report) = service.generate_documentation("acme/svc").await.unwrap();

    assert_eq!(doc.status, DocumentationStatus::Error);
    assert!(doc.error_message.as_deref().unwrap().contains("quota"));
    assert_eq!(report.failed.len(), 5);

    service
        .mark_documentation_for_regeneration("acme/svc")
        .unwrap();
    assert_eq!(
        service.documentation("acme/svc").unwrap().status,
        DocumentationStatus::UpdateRequired
    );

    // the re-run generates only the missing sections and completes
    let (doc, report) = service.generate_documentation("acme/svc").await.unwrap();
    assert_eq!(doc.status, DocumentationStatus::Completed);
    assert_eq!(report.generated.len(), 5);
    assert_eq!(doc.version.to_string(), "1.0.1");
}

#[tokio::test]
async fn cross_repository_chat_groups_results() {
    let host = Arc::new(FixtureHost::new());
    let r1 = go_repo("acme", "svc-one");
    let r2 = go_repo("acme", "svc-two");
    let (url1, url2) = (r1.url().to_string(), r2.url().to_string());
    host.add_repository(r1);
    host.add_repository(r2);
    let service = service_with(host, ScriptedLlm::healthy());

    service.ingest_repository(&url1, None).await.unwrap();
    service.ingest_repository(&url2, None).await.unwrap();

    let cross = service
        .compare_repositories(
            "how is authentication handled?",
            &["acme/svc-one".to_string(), "acme/svc-two".to_string()],
            5,
        )
        .await
        .unwrap();

    assert_eq!(cross.groups.len(), 2);
    assert!(!cross.groups["acme/svc-one"].is_empty());
    assert!(!cross.groups["acme/svc-two"].is_empty());
    // both repositories carry the auth middleware entity
    assert!(!cross.common_patterns.is_empty());

    // a chat turn over both repositories works end to end
    let conversation = service
        .start_conversation(
            "user-1",
            "auth across services",
            vec!["acme/svc-one".to_string(), "acme/svc-two".to_string()],
        )
        .await
        .unwrap();
    let mut stream = service.events.subscribe_stream(&conversation.id);
    let response = service
        .ask(&conversation.id, "how is authentication handled?")
        .await
        .unwrap();
    assert!(response.content.contains("AuthMiddleware"));
    assert_eq!(response.follow_up_questions.len(), 3);

    // streamed deltas arrived with a terminal completion
    let mut saw_complete = false;
    while let Ok(event) = stream.try_recv() {
        if matches!(
            event.payload,
            repolens_core::events::StreamPayload::MessageComplete { .. }
        ) {
            saw_complete = true;
        }
    }
    assert!(saw_complete);

    let stored = service
        .conversations
        .get_by_id(&conversation.id)
        .await
        .unwrap();
    assert_eq!(stored.messages.len(), 2);
}

#[tokio::test]
async fn conversation_retention_and_bulk_archive() {
    let host = Arc::new(FixtureHost::new());
    let service = service_with(host, ScriptedLlm::healthy());
    let now = Utc::now();

    for i in 0..3 {
        let mut conversation = service
            .start_conversation("user-1", &format!("old {i}"), vec![])
            .await
            .unwrap();
        conversation
            .transition(ConversationStatus::Archived)
            .unwrap();
        conversation.last_activity_at = now - Duration::days(100);
        service.conversations.save(&conversation).await.unwrap();
    }

    let expired = service
        .conversations
        .get_for_cleanup(90, now, 100)
        .await
        .unwrap();
    assert_eq!(expired.len(), 3);

    // an active conversation idle for > 7 days is bulk-archived
    let mut idle = service
        .start_conversation("user-1", "idle", vec![])
        .await
        .unwrap();
    idle.last_activity_at = now - Duration::days(8);
    service.conversations.save(&idle).await.unwrap();

    let archived = service
        .conversations
        .bulk_archive("user-1", 7, now)
        .await
        .unwrap();
    assert_eq!(archived, 1);

    // full sweep removes the expired ones
    let report = service.sweeper.sweep(now).await.unwrap();
    assert_eq!(report.cleaned_up, 3);
}

#[tokio::test]
async fn source_failures_surface_and_retry() {
    let host = Arc::new(FixtureHost::new());
    let fixture = go_repo("acme", "svc");
    let url = fixture.url().to_string();
    host.add_repository(fixture);

    // two transient outages: retries absorb them
    host.inject_fault(repolens_ingest::Fault::Unavailable);
    host.inject_fault(repolens_ingest::Fault::RateLimited(
        std::time::Duration::from_millis(5),
    ));
    let service = service_with(host, ScriptedLlm::healthy());

    let report = service.ingest_repository(&url, None).await.unwrap();
    assert!(report.changed);
    assert_eq!(
        service.orchestrator.repository("acme/svc").unwrap().status,
        RepositoryStatus::Ready
    );
}

#[tokio::test]
async fn permanent_source_failure_moves_repository_to_error() {
    let host = Arc::new(FixtureHost::new());
    let service = service_with(host, ScriptedLlm::healthy());
    let mut events = service.events.subscribe();

    let err = service
        .ingest_repository("https://host.example/no/such", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SourceAuth(_) | Error::SourceNotFound(_)));

    let mut saw_failure_event = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event.kind, DomainEventKind::IngestionFailed { .. }) {
            saw_failure_event = true;
        }
    }
    assert!(saw_failure_event);
}

#[tokio::test]
async fn delete_repository_cascades() {
    let host = Arc::new(FixtureHost::new());
    let fixture = go_repo("acme", "svc");
    let url = fixture.url().to_string();
    host.add_repository(fixture);
    let service = service_with(host, ScriptedLlm::healthy());

    service.ingest_repository(&url, None).await.unwrap();
    assert!(service.index.document_count().await.unwrap() > 0);

    service.delete_repository("acme/svc").await.unwrap();
    assert!(service
        .graph_store
        .entities_by_repository("acme/svc")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        service
            .index
            .ids_for_repository("acme/svc")
            .await
            .unwrap()
            .len(),
        0
    );
    assert!(service.orchestrator.repository("acme/svc").is_none());
}

#[tokio::test]
async fn chat_message_ordering_under_concurrent_turns() {
    let host = Arc::new(FixtureHost::new());
    let fixture = go_repo("acme", "svc");
    let url = fixture.url().to_string();
    host.add_repository(fixture);
    let service = Arc::new(service_with(host, ScriptedLlm::healthy()));
    service.ingest_repository(&url, None).await.unwrap();

    let conversation = service
        .start_conversation("user-1", "ordering", vec!["acme/svc".to_string()])
        .await
        .unwrap();

    let mut turns = Vec::new();
    for i in 0..4 {
        let service = Arc::clone(&service);
        let id = conversation.id.clone();
        turns.push(tokio::spawn(async move {
            service.ask(&id, &format!("question {i}?")).await
        }));
    }
    for turn in turns {
        turn.await.unwrap().unwrap();
    }

    let stored = service
        .conversations
        .get_by_id(&conversation.id)
        .await
        .unwrap();
    assert_eq!(stored.messages.len(), 8);
    for pair in stored.messages.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
    let max_ts = stored.messages.iter().map(|m| m.timestamp).max().unwrap();
    assert!(stored.last_activity_at >= max_ts);
}
