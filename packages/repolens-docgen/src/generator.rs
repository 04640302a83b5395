//! Section-by-section documentation generation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use repolens_core::config::DocumentationConfig;
use repolens_core::error::{Error, Result};
use repolens_core::events::{DomainEventKind, EventBus};
use repolens_core::llm::{ChatMessage, CompletionRequest, LlmClient};
use repolens_core::models::{
    CodeReference, Documentation, DocumentationSection, DocumentationStatus,
    RepositoryAnalysisContext, SectionType,
};
use repolens_core::quota::RequestQuota;
use repolens_core::retry::{with_retries, with_timeout, RetryPolicy};

use repolens_knowledge::{DocumentFamily, SearchDocument, SearchIndex};

use crate::prompts;
use crate::quality;

/// Outcome of one generation run.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub generated: Vec<SectionType>,
    pub failed: BTreeMap<String, String>,
    pub quality_score: f64,
    pub indexed: usize,
}

/// Drives a [`Documentation`] through its lifecycle: analyze, generate,
/// optionally enrich, index, quality-gate.
///
/// All LLM traffic goes through the shared [`RequestQuota`]; per-section
/// calls retry transient failures and run under `max_concurrent_generations`.
pub struct DocumentationGenerator {
    llm: Arc<dyn LlmClient>,
    index: Arc<dyn SearchIndex>,
    events: Arc<EventBus>,
    quota: Arc<RequestQuota>,
    config: DocumentationConfig,
    policy: RetryPolicy,
    generation_pool: Arc<Semaphore>,
}

impl DocumentationGenerator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        index: Arc<dyn SearchIndex>,
        events: Arc<EventBus>,
        quota: Arc<RequestQuota>,
        config: DocumentationConfig,
    ) -> Self {
        let policy = RetryPolicy::new(config.retry_attempts);
        let generation_pool = Arc::new(Semaphore::new(config.max_concurrent_generations.max(1)));
        Self {
            llm,
            index,
            events,
            quota,
            config,
            policy,
            generation_pool,
        }
    }

    /// Generate documentation from scratch.
    pub async fn generate(
        &self,
        analysis: &RepositoryAnalysisContext,
    ) -> Result<(Documentation, GenerationReport)> {
        let doc = Documentation::new(
            &analysis.repository_id,
            format!("{} documentation", analysis.repository_id),
        )?;
        self.run(doc, analysis).await
    }

    /// Re-run a documentation previously marked `UpdateRequired`; only
    /// missing sections are regenerated.
    pub async fn regenerate(
        &self,
        doc: Documentation,
        analysis: &RepositoryAnalysisContext,
    ) -> Result<(Documentation, GenerationReport)> {
        if doc.status != DocumentationStatus::UpdateRequired {
            return Err(Error::invalid_transition(
                doc.status.as_str(),
                "regenerate",
            ));
        }
        self.run(doc, analysis).await
    }

    async fn run(
        &self,
        mut doc: Documentation,
        analysis: &RepositoryAnalysisContext,
    ) -> Result<(Documentation, GenerationReport)> {
        doc.transition(DocumentationStatus::Analyzing)?;
        let requested = prompts::default_sections(analysis);
        let missing: Vec<SectionType> = requested
            .iter()
            .filter(|t| doc.section(t).is_none())
            .cloned()
            .collect();

        doc.transition(DocumentationStatus::GeneratingContent)?;
        info!(
            repository = %analysis.repository_id,
            sections = missing.len(),
            "generating documentation sections"
        );

        let results = join_all(missing.iter().enumerate().map(|(order, section_type)| {
            self.generate_section(section_type.clone(), order, analysis)
        }))
        .await;

        let mut report = GenerationReport {
            generated: Vec::new(),
            failed: BTreeMap::new(),
            quality_score: 0.0,
            indexed: 0,
        };

        for (section_type, outcome) in missing.iter().cloned().zip(results) {
            match outcome {
                Ok(section) => {
                    doc.upsert_section(section);
                    report.generated.push(section_type);
                }
                Err(err) => {
                    warn!(section = %section_type.display_name(), error = %err, "section generation failed");
                    report
                        .failed
                        .insert(section_type.display_name(), err.to_string());
                }
            }
        }

        // Partial failure: keep the successful sections, mark Error with a
        // summary; the doc can be re-run via UpdateRequired.
        if !report.failed.is_empty() {
            let summary = format!(
                "failed sections [{}]: {}",
                report.failed.keys().cloned().collect::<Vec<_>>().join(", "),
                report.failed.values().next().cloned().unwrap_or_default()
            );
            doc.fail(&summary)?;
            self.events.publish(DomainEventKind::DocumentationFailed {
                repository_id: doc.repository_id.clone(),
                message: summary,
            });
            return Ok((doc, report));
        }

        if self.config.enrich_sections {
            doc.transition(DocumentationStatus::Enriching)?;
            self.enrich(&mut doc).await;
        }

        doc.transition(DocumentationStatus::Indexing)?;
        report.indexed = self.index_sections(&doc).await?;

        let breakdown = quality::score(&doc, &requested, &self.llm, &self.config).await;
        report.quality_score = breakdown.score;

        if breakdown.score < self.config.min_quality_score {
            let message = format!(
                "quality gate failed: score {:.2} < {:.2} (coverage {:.2}, length {:.2}, refs {:.2}, self-check {:.2})",
                breakdown.score,
                self.config.min_quality_score,
                breakdown.coverage,
                breakdown.length,
                breakdown.references,
                breakdown.self_check
            );
            doc.fail(&message)?;
            self.events.publish(DomainEventKind::DocumentationFailed {
                repository_id: doc.repository_id.clone(),
                message,
            });
            return Ok((doc, report));
        }

        doc.complete(breakdown.score)?;
        self.events.publish(DomainEventKind::DocumentationCompleted {
            repository_id: doc.repository_id.clone(),
            version: doc.version.to_string(),
            quality_score: breakdown.score,
        });
        info!(
            repository = %doc.repository_id,
            version = %doc.version,
            quality = breakdown.score,
            "documentation completed"
        );
        Ok((doc, report))
    }

    async fn generate_section(
        &self,
        section_type: SectionType,
        order: usize,
        analysis: &RepositoryAnalysisContext,
    ) -> Result<DocumentationSection> {
        let _permit = self
            .generation_pool
            .acquire()
            .await
            .map_err(|_| Error::transient("generation pool closed"))?;

        self.quota.acquire(Utc::now())?;

        let request = CompletionRequest::new(
            &self.config.deployment,
            vec![
                ChatMessage::system(prompts::SYSTEM_GUIDANCE),
                ChatMessage::user(prompts::section_prompt(&section_type, analysis)),
            ],
        )
        .with_max_tokens(self.config.max_tokens_per_section)
        .with_temperature(self.config.temperature);

        let llm = Arc::clone(&self.llm);
        let budget = std::time::Duration::from_secs(self.config.request_timeout_seconds);
        let response = with_retries(&self.policy, "generate_section", move || {
            let request = request.clone();
            let llm = Arc::clone(&llm);
            with_timeout(budget, "generate_section", async move {
                llm.complete(request).await
            })
        })
        .await?;
        self.quota.record_tokens(response.usage.total(), Utc::now());

        let mut content = response.content.trim().to_string();
        if content.len() > self.config.max_content_length {
            content.truncate(self.config.max_content_length);
        }

        let mut section = DocumentationSection::new(
            section_type.display_name(),
            content,
            section_type.clone(),
            order,
        )?;
        section.add_tag(&analysis.primary_language);
        section.add_tag(section_type.display_name().replace(' ', "-"));
        for reference in extract_references(&section.content, analysis) {
            section.add_code_reference(reference);
        }
        Ok(section)
    }

    /// Best-effort example enrichment; failures leave the section as-is.
    async fn enrich(&self, doc: &mut Documentation) {
        for section in doc.sections.iter_mut() {
            if section.content.contains("```") {
                continue;
            }
            if self.quota.acquire(Utc::now()).is_err() {
                return;
            }
            let request = CompletionRequest::new(
                &self.config.deployment,
                vec![
                    ChatMessage::system(prompts::SYSTEM_GUIDANCE),
                    ChatMessage::user(prompts::enrich_prompt(&section.section_type, &section.content)),
                ],
            )
            .with_max_tokens(self.config.max_tokens_per_section)
            .with_temperature(self.config.temperature);

            match self.llm.complete(request).await {
                Ok(response) => {
                    self.quota.record_tokens(response.usage.total(), Utc::now());
                    let _ = section.update_content(response.content.trim());
                }
                Err(err) => {
                    warn!(section = %section.title, error = %err, "enrichment skipped");
                }
            }
        }
    }

    async fn index_sections(&self, doc: &Documentation) -> Result<usize> {
        let documents: Vec<SearchDocument> = doc
            .sections
            .iter()
            .map(|section| {
                let mut document = SearchDocument::new(
                    format!("{}::{}", doc.repository_id, section.id),
                    &doc.repository_id,
                    DocumentFamily::DocSection,
                    &section.title,
                    &section.content,
                );
                document.section_type = Some(section.section_type.display_name());
                document.tags = section.tags.clone();
                document
            })
            .collect();
        self.index.upsert(documents).await
    }
}

fn extract_references(
    content: &str,
    analysis: &RepositoryAnalysisContext,
) -> Vec<CodeReference> {
    analysis
        .important_files
        .iter()
        .filter(|file| content.contains(&file.path))
        .map(|file| CodeReference {
            file_path: file.path.clone(),
            code_snippet: String::new(),
            description: "referenced in section".to_string(),
            reference_type: "mention".to_string(),
            start_line: None,
            end_line: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use repolens_core::llm::{CompletionResponse, TokenUsage};
    use repolens_core::models::{FileRole, ImportantFile, ProjectKind};
    use repolens_knowledge::HybridIndex;

    /// LLM double: scripted failures first, then canned section bodies.
    struct ScriptedLlm {
        failures: Mutex<Vec<Error>>,
        body: String,
    }

    impl ScriptedLlm {
        fn healthy() -> Self {
            Self {
                failures: Mutex::new(vec![]),
                body: format!(
                    "This project builds a service. See main.go for the entry point. {}",
                    "More detail. ".repeat(20)
                ),
            }
        }

        fn with_failures(failures: Vec<Error>) -> Self {
            let mut s = Self::healthy();
            s.failures = Mutex::new(failures);
            s
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            if let Some(err) = self.failures.lock().pop() {
                return Err(err);
            }
            let content = if request.max_tokens <= 8 {
                "9".to_string() // self-check rating
            } else {
                self.body.clone()
            };
            Ok(CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 200,
                    completion_tokens: 150,
                },
            })
        }
    }

    fn analysis() -> RepositoryAnalysisContext {
        RepositoryAnalysisContext {
            repository_id: "acme/svc".into(),
            primary_language: "go".into(),
            languages: vec!["go".into()],
            project_kind: ProjectKind::Application,
            important_files: vec![ImportantFile {
                path: "main.go".into(),
                language: "go".into(),
                role: FileRole::EntryPoint,
                size_bytes: 100,
                score: 4.0,
            }],
            ..Default::default()
        }
    }

    fn generator(llm: ScriptedLlm) -> (DocumentationGenerator, Arc<HybridIndex>) {
        let index = Arc::new(HybridIndex::new().unwrap());
        let config = DocumentationConfig::default();
        let quota = Arc::new(RequestQuota::new(
            config.requests_per_minute,
            config.max_tokens_per_day,
        ));
        (
            DocumentationGenerator::new(
                Arc::new(llm),
                index.clone(),
                Arc::new(EventBus::new()),
                quota,
                config,
            ),
            index,
        )
    }

    #[tokio::test]
    async fn test_happy_path_completes_with_version_bump() {
        let (generator, index) = generator(ScriptedLlm::healthy());
        let (doc, report) = generator.generate(&analysis()).await.unwrap();

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
        // sections were pushed to the index
        assert!(index.document_count().await.unwrap() >= 6);
        // mention-based references attached
        let overview = doc.section(&SectionType::Overview).unwrap();
        assert!(!overview.code_references.is_empty());
    }

    #[tokio::test]
    async fn test_quota_exhaustion_marks_error_and_regeneration_recovers() {
        // five consecutive quota rejections
        let failures = (0..5)
            .map(|_| Error::QuotaExceeded("request budget of 20/minute exhausted".into()))
            .collect();
        let (generator, _) = generator(ScriptedLlm::with_failures(failures));

        let (mut doc, report) = generator.generate(&analysis()).await.unwrap();
        assert_eq!(doc.status, DocumentationStatus::Error);
        assert!(doc.error_message.as_deref().unwrap().contains("quota"));
        assert_eq!(report.failed.len(), 5);
        assert!(!report.generated.is_empty());

        doc.mark_for_regeneration().unwrap();
        assert_eq!(doc.status, DocumentationStatus::UpdateRequired);

        // second run regenerates only the missing sections
        let (generator, _) = generator2();
        let (doc, report) = generator.regenerate(doc, &analysis()).await.unwrap();
        assert_eq!(doc.status, DocumentationStatus::Completed);
        assert_eq!(report.generated.len(), 5);
    }

    fn generator2() -> (DocumentationGenerator, Arc<HybridIndex>) {
        generator(ScriptedLlm::healthy())
    }

    #[tokio::test]
    async fn test_transient_llm_errors_retried() {
        let (generator, _) = generator(ScriptedLlm::with_failures(vec![
            Error::transient("llm blip"),
            Error::Timeout("llm slow".into()),
        ]));
        let (doc, _) = generator.generate(&analysis()).await.unwrap();
        assert_eq!(doc.status, DocumentationStatus::Completed);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_partial() {
        let (generator, _) = generator(ScriptedLlm::with_failures(vec![Error::permanent(
            "deployment missing",
        )]));
        let (doc, report) = generator.generate(&analysis()).await.unwrap();
        assert_eq!(doc.status, DocumentationStatus::Error);
        assert_eq!(report.failed.len(), 1);
        assert!(doc.sections.len() >= 5);
    }

    #[tokio::test]
    async fn test_regenerate_requires_update_required() {
        let (generator, _) = generator(ScriptedLlm::healthy());
        let doc = Documentation::new("acme/svc", "docs").unwrap();
        assert!(generator.regenerate(doc, &analysis()).await.is_err());
    }
}
