//! Background maintenance sweeps: conversation retention cleanup and
//! auto-archive.
//!
//! Sweeps are explicit calls driven by the host's scheduler; units under
//! test invoke them with a fixed `now`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use repolens_core::config::ConversationConfig;
use repolens_core::error::Result;
use repolens_conversation::ConversationStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cleaned_up: usize,
    pub auto_archived: usize,
}

pub struct MaintenanceSweeper {
    store: Arc<dyn ConversationStore>,
    config: ConversationConfig,
}

impl MaintenanceSweeper {
    pub fn new(store: Arc<dyn ConversationStore>, config: ConversationConfig) -> Self {
        Self { store, config }
    }

    /// One full sweep: archive idle conversations, then hard-delete the
    /// ones past retention.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let auto_archived = self
            .store
            .auto_archive_idle(self.config.auto_archive_after_hours, now)
            .await?;

        let expired = self
            .store
            .get_for_cleanup(self.config.retention_days, now, self.config.cleanup_batch_size)
            .await?;
        let mut cleaned_up = 0usize;
        for conversation in expired {
            self.store.delete(&conversation.id).await?;
            cleaned_up += 1;
        }

        if cleaned_up > 0 || auto_archived > 0 {
            info!(cleaned_up, auto_archived, "maintenance sweep complete");
        }
        Ok(SweepReport {
            cleaned_up,
            auto_archived,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use repolens_core::models::{Conversation, ConversationContext, ConversationStatus};
    use repolens_conversation::InMemoryConversationStore;

    #[tokio::test]
    async fn test_sweep_archives_idle_and_deletes_expired() {
        let store = Arc::new(InMemoryConversationStore::new(ConversationConfig::default()));
        let now = Utc::now();

        // idle active conversation: archived by the sweep
        let mut idle = Conversation::new("u1", "idle", ConversationContext::default()).unwrap();
        idle.last_activity_at = now - Duration::hours(200);
        store.save(&idle).await.unwrap();

        // archived conversation past retention: deleted
        let mut expired =
            Conversation::new("u1", "expired", ConversationContext::default()).unwrap();
        expired.transition(ConversationStatus::Archived).unwrap();
        expired.last_activity_at = now - Duration::days(120);
        store.save(&expired).await.unwrap();

        // fresh conversation untouched
        let fresh = Conversation::new("u1", "fresh", ConversationContext::default()).unwrap();
        store.save(&fresh).await.unwrap();

        let sweeper = MaintenanceSweeper::new(store.clone(), ConversationConfig::default());
        let report = sweeper.sweep(now).await.unwrap();

        assert_eq!(report.auto_archived, 1);
        assert_eq!(report.cleaned_up, 1);
        assert!(store.get_by_id(&expired.id).await.is_err());
        assert_eq!(
            store.get_by_id(&idle.id).await.unwrap().status,
            ConversationStatus::Archived
        );
        assert_eq!(
            store.get_by_id(&fresh.id).await.unwrap().status,
            ConversationStatus::Active
        );
    }

    #[tokio::test]
    async fn test_sweep_on_empty_store() {
        let store = Arc::new(InMemoryConversationStore::new(ConversationConfig::default()));
        let sweeper = MaintenanceSweeper::new(store, ConversationConfig::default());
        let report = sweeper.sweep(Utc::now()).await.unwrap();
        assert_eq!(report, SweepReport::default());
    }
}
