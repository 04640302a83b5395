//! Conversational AI service: intent analysis, grounded completion,
//! streaming, follow-ups.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use repolens_core::config::AssistantConfig;
use repolens_core::error::{Error, Result};
use repolens_core::events::EventBus;
use repolens_core::llm::{ChatMessage, CompletionRequest, LlmClient};
use repolens_core::models::{CodeReference, ConversationMessage, MessageKind};
use repolens_core::retry::{with_retries, with_timeout, RetryPolicy};

use crate::intent::{classify_heuristically, IntentClassification, QueryIntent};
use crate::retrieval::{Provenance, RetrievalService, RetrievedItem};
use crate::store::ConversationStore;

#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub message_id: String,
    pub content: String,
    pub intent: QueryIntent,
    pub code_references: Vec<CodeReference>,
    pub follow_up_questions: Vec<String>,
    pub response_time_seconds: f64,
}

/// Shape the classifier asks the model to produce.
#[derive(Debug, Deserialize)]
struct IntentReply {
    intent: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    entities: Vec<String>,
}

pub struct ConversationalAssistant {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn ConversationStore>,
    retrieval: Arc<RetrievalService>,
    events: Arc<EventBus>,
    config: AssistantConfig,
    policy: RetryPolicy,
}

impl ConversationalAssistant {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn ConversationStore>,
        retrieval: Arc<RetrievalService>,
        events: Arc<EventBus>,
        config: AssistantConfig,
    ) -> Self {
        let policy = RetryPolicy::new(config.retry_attempts);
        Self {
            llm,
            store,
            retrieval,
            events,
            config,
            policy,
        }
    }

    /// Classify a query into the fixed intent enum. Confidence below the
    /// configured threshold falls back to `ExplainConcept`; a failing or
    /// unparsable model falls back to the keyword heuristic.
    pub async fn analyze_query_intent(&self, query: &str) -> IntentClassification {
        let request = CompletionRequest::new(
            &self.config.deployment,
            vec![
                ChatMessage::system(
                    "Classify the developer query. Respond with JSON only: {\"intent\": one of \
[explain_concept, find_implementation, compare_approaches, troubleshoot, provide_example, \
architectural_query, code_review, documentation, testing], \"confidence\": 0..1, \
\"entities\": [technical terms]}",
                ),
                ChatMessage::user(query.to_string()),
            ],
        )
        .with_max_tokens(200)
        .with_temperature(0.0);

        let classification = match self.llm.complete(request).await {
            Ok(response) => parse_intent_reply(&response.content),
            Err(err) => {
                warn!(error = %err, "intent classification failed, using heuristic");
                None
            }
        };

        let mut classification = classification.unwrap_or_else(|| classify_heuristically(query));
        if classification.confidence < self.config.min_confidence_threshold {
            classification.intent = QueryIntent::ExplainConcept;
        }
        classification
    }

    /// Extract domain/technical terms from a query.
    pub async fn extract_entities(&self, query: &str) -> Vec<String> {
        let request = CompletionRequest::new(
            &self.config.deployment,
            vec![
                ChatMessage::system(
                    "List the technical terms and identifiers in the query, one per line, \
nothing else.",
                ),
                ChatMessage::user(query.to_string()),
            ],
        )
        .with_max_tokens(120)
        .with_temperature(0.0);

        match self.llm.complete(request).await {
            Ok(response) => {
                let terms: Vec<String> = response
                    .content
                    .lines()
                    .map(|l| l.trim_start_matches(['-', '*', ' ']).trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                if terms.is_empty() {
                    crate::intent::extract_entity_terms(query)
                } else {
                    terms
                }
            }
            Err(_) => crate::intent::extract_entity_terms(query),
        }
    }

    /// Summarize a message window to fit the context budget.
    pub async fn summarize_conversation(
        &self,
        messages: &[ConversationMessage],
        max_len: usize,
    ) -> String {
        let transcript: String = messages
            .iter()
            .map(|m| format!("{}: {}\n", m.kind.as_str(), m.content))
            .collect();

        let request = CompletionRequest::new(
            &self.config.deployment,
            vec![
                ChatMessage::system(format!(
                    "Summarize this conversation in at most {max_len} characters, keeping \
technical specifics."
                )),
                ChatMessage::user(transcript.clone()),
            ],
        )
        .with_max_tokens(400)
        .with_temperature(0.2);

        match self.llm.complete(request).await {
            Ok(response) => truncate_chars(response.content.trim(), max_len),
            Err(_) => truncate_chars(&transcript, max_len),
        }
    }

    /// One full chat turn: persist the user query, retrieve grounded
    /// context, stream the completion, persist the answer.
    ///
    /// Failures surface to the user as a persisted `SystemMessage` with a
    /// correlation id; the underlying error is returned to the caller.
    pub async fn process_query(&self, conversation_id: &str, query: &str) -> Result<QueryResponse> {
        let started = Instant::now();

        match self.run_turn(conversation_id, query, started).await {
            Ok(response) => Ok(response),
            Err(err) => {
                let correlation_id = Uuid::new_v4();
                warn!(conversation = conversation_id, %correlation_id, error = %err, "chat turn failed");
                let user_safe = format!(
                    "Something went wrong while answering. Please try again. (ref: {correlation_id})"
                );
                if let Ok(message) = self
                    .store
                    .append_message(conversation_id, MessageKind::SystemMessage, &user_safe)
                    .await
                {
                    self.events.publish_complete(conversation_id, &message.id);
                }
                Err(err)
            }
        }
    }

    async fn run_turn(
        &self,
        conversation_id: &str,
        query: &str,
        started: Instant,
    ) -> Result<QueryResponse> {
        let conversation = self.store.get_by_id(conversation_id).await?;
        let user_message = self
            .store
            .append_message(conversation_id, MessageKind::UserQuery, query)
            .await?;

        let classification = self.analyze_query_intent(query).await;

        // summarize only when the history is bigger than the window
        let history = conversation.messages.clone();
        let summary = if history.len() > self.config.max_conversation_history {
            Some(
                self.summarize_conversation(&history, self.config.max_context_tokens / 4)
                    .await,
            )
        } else {
            None
        };

        let results = self
            .retrieval
            .retrieve_relevant_context(
                query,
                &conversation.context,
                &classification,
                summary.as_deref(),
                self.config.max_context_items,
            )
            .await?;

        let prompt = self.retrieval.build_context_prompt(
            query,
            &results,
            &history,
            &conversation.context,
        );

        let request = CompletionRequest {
            deployment: self.config.deployment.clone(),
            messages: vec![ChatMessage::user(prompt)],
            max_tokens: self.config.max_tokens_per_response,
            temperature: self.config.temperature,
            top_p: Some(self.config.top_p),
        };

        // stream deltas while the completion runs
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let events = Arc::clone(&self.events);
        let stream_conversation = conversation_id.to_string();
        let forwarder = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                events.publish_delta(&stream_conversation, chunk);
            }
        });

        let llm = Arc::clone(&self.llm);
        let budget = std::time::Duration::from_secs(self.config.request_timeout_seconds);
        let response = with_retries(&self.policy, "chat_completion", || {
            let request = request.clone();
            let llm = Arc::clone(&llm);
            let tx = tx.clone();
            with_timeout(budget, "chat_completion", async move {
                llm.complete_streaming(request, tx).await
            })
        })
        .await;
        drop(tx);
        forwarder.await.ok();
        let response = response?;

        let answer = self
            .store
            .append_message(conversation_id, MessageKind::AiResponse, &response.content)
            .await?;
        self.events.publish_complete(conversation_id, &answer.id);

        // searchable (masked) copies; failure never breaks the turn
        if let Err(err) = self
            .retrieval
            .index_conversation_messages(
                conversation_id,
                &conversation.context.repository_ids,
                &[user_message, answer.clone()],
            )
            .await
        {
            warn!(error = %err, "message indexing skipped");
        }

        let follow_up_questions = self.generate_follow_up_questions(query, &response.content).await;
        let code_references = references_from_evidence(&results);
        let response_time_seconds = started.elapsed().as_secs_f64();

        info!(
            conversation = conversation_id,
            intent = classification.intent.as_str(),
            evidence = results.len(),
            response_time_seconds,
            "chat turn complete"
        );

        Ok(QueryResponse {
            message_id: answer.id,
            content: response.content,
            intent: classification.intent,
            code_references,
            follow_up_questions,
            response_time_seconds,
        })
    }

    /// Suggest follow-up questions; canned suggestions on model failure.
    pub async fn generate_follow_up_questions(&self, query: &str, answer: &str) -> Vec<String> {
        let request = CompletionRequest::new(
            &self.config.deployment,
            vec![
                ChatMessage::system(
                    "Suggest exactly 3 short follow-up questions a developer might ask next, one \
per line, no numbering.",
                ),
                ChatMessage::user(format!("Q: {query}\nA: {answer}")),
            ],
        )
        .with_max_tokens(150)
        .with_temperature(0.7);

        match self.llm.complete(request).await {
            Ok(response) => {
                let questions: Vec<String> = response
                    .content
                    .lines()
                    .map(|l| l.trim_start_matches(['-', '*', ' ']).trim().to_string())
                    .filter(|l| !l.is_empty())
                    .take(3)
                    .collect();
                if questions.is_empty() {
                    default_follow_ups()
                } else {
                    questions
                }
            }
            Err(_) => default_follow_ups(),
        }
    }
}

fn truncate_chars(text: &str, max_len: usize) -> String {
    let mut cut = max_len.min(text.len());
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text[..cut].to_string()
}

fn default_follow_ups() -> Vec<String> {
    vec![
        "Can you show the relevant code?".to_string(),
        "How is this tested?".to_string(),
        "Are there related components I should know about?".to_string(),
    ]
}

fn parse_intent_reply(reply: &str) -> Option<IntentClassification> {
    // tolerate fenced or prefixed JSON
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    let parsed: IntentReply = serde_json::from_str(&reply[start..=end]).ok()?;
    let intent = QueryIntent::parse(&parsed.intent)?;
    Some(IntentClassification {
        intent,
        confidence: parsed.confidence.clamp(0.0, 1.0),
        entities: parsed.entities,
    })
}

fn references_from_evidence(results: &[RetrievedItem]) -> Vec<CodeReference> {
    let mut seen = std::collections::HashSet::new();
    let mut references = Vec::new();
    for item in results {
        let Some(path) = &item.path else {
            continue;
        };
        if !matches!(item.provenance, Provenance::Index(_) | Provenance::GraphEntity) {
            continue;
        }
        if seen.insert((path.clone(), item.line)) {
            references.push(CodeReference {
                file_path: path.clone(),
                code_snippet: item.snippet.clone(),
                description: item.title.clone(),
                reference_type: "evidence".to_string(),
                start_line: item.line,
                end_line: None,
            });
        }
    }
    references
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use repolens_core::config::EmbeddingConfig;
    use repolens_core::llm::{CompletionResponse, TokenUsage};
    use repolens_core::models::{Conversation, ConversationContext};
    use repolens_knowledge::{
        DocumentFamily, HybridIndex, InMemoryGraphStore, SearchDocument, SearchIndex,
    };

    use crate::store::InMemoryConversationStore;

    struct ScriptedLlm {
        fail_next: Mutex<usize>,
    }

    impl ScriptedLlm {
        fn healthy() -> Self {
            Self {
                fail_next: Mutex::new(0),
            }
        }

        fn failing(n: usize) -> Self {
            Self {
                fail_next: Mutex::new(n),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            {
                let mut fail = self.fail_next.lock();
                if *fail > 0 {
                    *fail -= 1;
                    return Err(Error::transient("llm down"));
                }
            }
            let system = request
                .messages
                .first()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            let content = if system.contains("Classify") {
                r#"{"intent": "find_implementation", "confidence": 0.9, "entities": ["AuthMiddleware"]}"#
                    .to_string()
            } else if system.contains("follow-up") {
                "What about token refresh?\nWhere are sessions stored?\nHow is logout handled?"
                    .to_string()
            } else if system.contains("Summarize") {
                "earlier: user asked about auth".to_string()
            } else {
                "Authentication is handled by AuthMiddleware in src/auth/middleware.go.".to_string()
            };
            Ok(CompletionResponse {
                content,
                usage: TokenUsage::default(),
            })
        }
    }

    async fn harness(llm: ScriptedLlm) -> (ConversationalAssistant, Arc<InMemoryConversationStore>, Arc<EventBus>, String)
    {
        let llm: Arc<dyn LlmClient> = Arc::new(llm);
        let index = Arc::new(HybridIndex::new().unwrap());
        let mut doc = SearchDocument::new(
            "d1",
            "r1",
            DocumentFamily::CodeChunk,
            "src/auth/middleware.go",
            "func AuthMiddleware(next http.Handler) validates bearer tokens",
        );
        doc.path = Some("src/auth/middleware.go".into());
        doc.start_line = Some(5);
        index.upsert(vec![doc]).await.unwrap();

        let retrieval = Arc::new(RetrievalService::new(
            index,
            Arc::new(InMemoryGraphStore::new()),
            None,
            Arc::clone(&llm),
            AssistantConfig::default(),
            EmbeddingConfig::default(),
        ));
        let store = Arc::new(InMemoryConversationStore::new(Default::default()));
        let events = Arc::new(EventBus::new());

        let mut context = ConversationContext::default();
        context.repository_ids = vec!["r1".to_string()];
        let conversation = Conversation::new("u1", "auth chat", context).unwrap();
        store.save(&conversation).await.unwrap();

        let assistant = ConversationalAssistant::new(
            llm,
            store.clone(),
            retrieval,
            events.clone(),
            AssistantConfig::default(),
        );
        (assistant, store, events, conversation.id)
    }

    #[tokio::test]
    async fn test_process_query_persists_and_streams() {
        let (assistant, store, events, conversation_id) = harness(ScriptedLlm::healthy()).await;
        let mut stream = events.subscribe_stream(&conversation_id);

        let response = assistant
            .process_query(&conversation_id, "where is authentication implemented?")
            .await
            .unwrap();

        assert_eq!(response.intent, QueryIntent::FindImplementation);
        assert!(response.content.contains("AuthMiddleware"));
        assert_eq!(response.follow_up_questions.len(), 3);
        assert!(!response.code_references.is_empty());
        assert!(response.response_time_seconds >= 0.0);

        // user query + assistant answer persisted in order
        let conversation = store.get_by_id(&conversation_id).await.unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].kind, MessageKind::UserQuery);
        assert_eq!(conversation.messages[1].kind, MessageKind::AiResponse);

        // deltas then a terminal complete with increasing sequences
        let mut sequences = Vec::new();
        let mut saw_complete = false;
        while let Ok(event) = stream.try_recv() {
            sequences.push(event.sequence);
            if matches!(
                event.payload,
                repolens_core::events::StreamPayload::MessageComplete { .. }
            ) {
                saw_complete = true;
            }
        }
        assert!(saw_complete);
        for pair in sequences.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[tokio::test]
    async fn test_failure_appends_system_message_with_correlation_id() {
        // enough failures to exhaust completion retries after
        // classification/extraction fall back to heuristics
        let (assistant, store, _events, conversation_id) = harness(ScriptedLlm::failing(99)).await;

        let err = assistant
            .process_query(&conversation_id, "where is auth?")
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let conversation = store.get_by_id(&conversation_id).await.unwrap();
        let system = conversation
            .messages
            .iter()
            .find(|m| m.kind == MessageKind::SystemMessage)
            .expect("system message persisted");
        assert!(system.content.contains("ref: "));
    }

    #[tokio::test]
    async fn test_low_confidence_falls_back_to_explain() {
        struct LowConfidence;
        #[async_trait]
        impl LlmClient for LowConfidence {
            async fn complete(&self, _r: CompletionRequest) -> Result<CompletionResponse> {
                Ok(CompletionResponse {
                    content: r#"{"intent": "testing", "confidence": 0.1, "entities": []}"#.into(),
                    usage: TokenUsage::default(),
                })
            }
        }

        let llm: Arc<dyn LlmClient> = Arc::new(LowConfidence);
        let retrieval = Arc::new(RetrievalService::new(
            Arc::new(HybridIndex::new().unwrap()),
            Arc::new(InMemoryGraphStore::new()),
            None,
            Arc::clone(&llm),
            AssistantConfig::default(),
            EmbeddingConfig::default(),
        ));
        let assistant = ConversationalAssistant::new(
            llm,
            Arc::new(InMemoryConversationStore::new(Default::default())),
            retrieval,
            Arc::new(EventBus::new()),
            AssistantConfig::default(),
        );

        let classification = assistant.analyze_query_intent("anything").await;
        assert_eq!(classification.intent, QueryIntent::ExplainConcept);
    }

    #[tokio::test]
    async fn test_extract_entities_falls_back_to_heuristic() {
        let (assistant, _store, _events, _id) = harness(ScriptedLlm::failing(99)).await;
        let terms = assistant
            .extract_entities("where does AuthService call issue_token?")
            .await;
        assert!(terms.contains(&"AuthService".to_string()));
        assert!(terms.contains(&"issue_token".to_string()));
    }

    #[tokio::test]
    async fn test_summarize_fallback_truncates() {
        let (assistant, _store, _events, _id) = harness(ScriptedLlm::failing(99)).await;
        let messages: Vec<ConversationMessage> = (0..5)
            .map(|i| {
                ConversationMessage::new("c", MessageKind::UserQuery, format!("message {i}"))
                    .unwrap()
            })
            .collect();
        let summary = assistant.summarize_conversation(&messages, 40).await;
        assert!(summary.len() <= 40);
    }
}
