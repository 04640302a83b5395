//! LLM and embedding capability contracts.
//!
//! The engine never talks to a vendor directly; it is handed `Arc<dyn
//! LlmClient>` / `Arc<dyn EmbeddingClient>` at construction. Tests inject
//! scripted implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Deployment name identifying the model on the provider side.
    pub deployment: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
}

impl CompletionRequest {
    pub fn new(deployment: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            deployment: deployment.into(),
            messages,
            max_tokens: 1024,
            temperature: 0.7,
            top_p: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Chat completion capability.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Streaming variant: forward partial content through `sink` and return
    /// the final response. The default forwards the completed content in
    /// word-sized chunks, which lets non-streaming providers participate.
    async fn complete_streaming(
        &self,
        request: CompletionRequest,
        sink: mpsc::Sender<String>,
    ) -> Result<CompletionResponse> {
        let response = self.complete(request).await?;
        for chunk in split_stream_chunks(&response.content) {
            if sink.send(chunk).await.is_err() {
                break; // receiver dropped, keep the final response
            }
        }
        Ok(response)
    }
}

/// Batch embedding capability. Callers keep batches within the configured
/// `max_batch_size`; implementations may reject larger ones.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed_batch(&self, deployment: &str, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Rough token estimate (4 bytes/token) used for prompt budgeting. The
/// budget is a soft bound, so precision is not required.
pub fn approximate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

fn split_stream_chunks(content: &str) -> Vec<String> {
    content
        .split_inclusive(' ')
        .map(|s| s.to_string())
        .collect()
}
