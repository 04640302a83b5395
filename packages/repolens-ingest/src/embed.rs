//! Batched entity embedding through the `EmbeddingClient` capability.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info};

use repolens_core::config::EmbeddingConfig;
use repolens_core::error::{Error, Result};
use repolens_core::llm::EmbeddingClient;
use repolens_core::models::CodeEntity;
use repolens_core::retry::{with_retries, RetryPolicy};

/// Populates `content_vector` on extracted entities, batching calls at
/// `max_batch_size` and retrying transient embedding failures.
pub struct EntityEmbedder {
    client: Arc<dyn EmbeddingClient>,
    config: EmbeddingConfig,
    policy: RetryPolicy,
    batches: Arc<Semaphore>,
}

impl EntityEmbedder {
    pub fn new(client: Arc<dyn EmbeddingClient>, config: EmbeddingConfig) -> Self {
        let policy = RetryPolicy::new(config.retry_attempts);
        let batches = Arc::new(Semaphore::new(config.max_batch_size.max(1)));
        Self {
            client,
            config,
            policy,
            batches,
        }
    }

    /// Embed every entity that has content; returns the number embedded.
    pub async fn embed_entities(&self, entities: &mut [CodeEntity]) -> Result<usize> {
        let targets: Vec<usize> = entities
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.content.trim().is_empty())
            .map(|(i, _)| i)
            .collect();

        if targets.is_empty() {
            return Ok(0);
        }

        let mut embedded = 0usize;
        for batch in targets.chunks(self.config.max_batch_size.max(1)) {
            let texts: Vec<String> = batch
                .iter()
                .map(|&i| entities[i].content.clone())
                .collect();

            let _permit = self
                .batches
                .acquire()
                .await
                .map_err(|_| Error::transient("embedding pool closed"))?;

            let deployment = self.config.deployment.clone();
            let client = Arc::clone(&self.client);
            let vectors = with_retries(&self.policy, "embed_batch", || {
                let texts = texts.clone();
                let deployment = deployment.clone();
                let client = Arc::clone(&client);
                async move { client.embed_batch(&deployment, &texts).await }
            })
            .await?;

            if vectors.len() != batch.len() {
                return Err(Error::permanent(format!(
                    "embedding batch size mismatch: sent {}, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            for (&entity_idx, vector) in batch.iter().zip(vectors) {
                entities[entity_idx].content_vector = Some(vector);
                embedded += 1;
            }
            debug!(batch = batch.len(), "embedded entity batch");
        }

        info!(embedded, total = entities.len(), "entity embedding complete");
        Ok(embedded)
    }
}
