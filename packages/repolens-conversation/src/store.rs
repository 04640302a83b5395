//! Conversation store capability and the in-memory reference
//! implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use repolens_core::config::ConversationConfig;
use repolens_core::error::{Error, Result};
use repolens_core::models::{
    Conversation, ConversationMessage, ConversationStatus, MessageKind,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationStatistics {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub total_messages: usize,
    pub average_messages: f64,
}

/// Persistence for conversation aggregates.
///
/// The aggregate is the consistency boundary: `append_message` serializes
/// appends per conversation, so concurrent turns never interleave message
/// lists.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save(&self, conversation: &Conversation) -> Result<()>;
    async fn get_by_id(&self, id: &str) -> Result<Conversation>;

    /// Serialized append; returns the stored message.
    async fn append_message(
        &self,
        conversation_id: &str,
        kind: MessageKind,
        content: &str,
    ) -> Result<ConversationMessage>;

    async fn update_status(&self, conversation_id: &str, to: ConversationStatus) -> Result<()>;

    async fn get_by_user(
        &self,
        user_id: &str,
        status: Option<ConversationStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Conversation>>;

    async fn get_by_repository_ids(
        &self,
        repository_ids: &[String],
        user_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Conversation>>;

    /// Hard delete.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Case-insensitive search over titles and message contents.
    async fn search(
        &self,
        term: &str,
        user_id: &str,
        status: Option<ConversationStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Conversation>>;

    /// Archived/Deleted conversations idle beyond the retention window.
    async fn get_for_cleanup(
        &self,
        retention_days: i64,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Conversation>>;

    async fn statistics(
        &self,
        user_id: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<ConversationStatistics>;

    /// Archive `Active` conversations of a user idle for more than
    /// `older_than_days`; returns how many were archived.
    async fn bulk_archive(
        &self,
        user_id: &str,
        older_than_days: i64,
        now: DateTime<Utc>,
    ) -> Result<usize>;

    /// Scheduled sweep: archive every `Active` conversation idle beyond
    /// `idle_hours`, regardless of user.
    async fn auto_archive_idle(&self, idle_hours: i64, now: DateTime<Utc>) -> Result<usize>;
}

/// Process-scoped store; lifetime bound to the service process, injected
/// everywhere it is needed.
pub struct InMemoryConversationStore {
    conversations: DashMap<String, Conversation>,
    config: ConversationConfig,
}

impl InMemoryConversationStore {
    pub fn new(config: ConversationConfig) -> Self {
        Self {
            conversations: DashMap::new(),
            config,
        }
    }

    fn sorted_page(
        mut matches: Vec<Conversation>,
        limit: usize,
        offset: usize,
    ) -> Vec<Conversation> {
        matches.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        matches.into_iter().skip(offset).take(limit).collect()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn save(&self, conversation: &Conversation) -> Result<()> {
        if !self.conversations.contains_key(&conversation.id) {
            let user_active = self
                .conversations
                .iter()
                .filter(|c| c.user_id == conversation.user_id)
                .count();
            if user_active >= self.config.max_conversations_per_user {
                return Err(Error::conflict(format!(
                    "user {} reached the limit of {} conversations",
                    conversation.user_id, self.config.max_conversations_per_user
                )));
            }
        }
        self.conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Conversation> {
        self.conversations
            .get(id)
            .map(|c| c.clone())
            .ok_or_else(|| Error::not_found(format!("conversation {id}")))
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        kind: MessageKind,
        content: &str,
    ) -> Result<ConversationMessage> {
        // get_mut holds the shard lock for this key, serializing appends
        let mut entry = self
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| Error::not_found(format!("conversation {conversation_id}")))?;

        if entry.messages.len() >= self.config.max_messages_per_conversation {
            return Err(Error::conflict(format!(
                "conversation {} reached the limit of {} messages",
                conversation_id, self.config.max_messages_per_conversation
            )));
        }
        let message = entry.add_message(kind, content)?.clone();
        Ok(message)
    }

    async fn update_status(&self, conversation_id: &str, to: ConversationStatus) -> Result<()> {
        let mut entry = self
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| Error::not_found(format!("conversation {conversation_id}")))?;
        entry.transition(to)
    }

    async fn get_by_user(
        &self,
        user_id: &str,
        status: Option<ConversationStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Conversation>> {
        let matches: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| {
                c.user_id == user_id && status.map_or(true, |s| c.status == s)
            })
            .map(|c| c.clone())
            .collect();
        Ok(Self::sorted_page(matches, limit, offset))
    }

    async fn get_by_repository_ids(
        &self,
        repository_ids: &[String],
        user_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Conversation>> {
        let matches: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| {
                c.context
                    .repository_ids
                    .iter()
                    .any(|r| repository_ids.contains(r))
                    && user_id.map_or(true, |u| c.user_id == u)
            })
            .map(|c| c.clone())
            .collect();
        Ok(Self::sorted_page(matches, limit, offset))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.conversations
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("conversation {id}")))
    }

    async fn search(
        &self,
        term: &str,
        user_id: &str,
        status: Option<ConversationStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Conversation>> {
        let needle = term.to_lowercase();
        let matches: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| {
                c.user_id == user_id
                    && status.map_or(true, |s| c.status == s)
                    && (c.title.to_lowercase().contains(&needle)
                        || c.messages
                            .iter()
                            .any(|m| m.content.to_lowercase().contains(&needle)))
            })
            .map(|c| c.clone())
            .collect();
        Ok(Self::sorted_page(matches, limit, offset))
    }

    async fn get_for_cleanup(
        &self,
        retention_days: i64,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        let cutoff = now - Duration::days(retention_days);
        let matches: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| {
                matches!(
                    c.status,
                    ConversationStatus::Archived | ConversationStatus::Deleted
                ) && c.last_activity_at < cutoff
            })
            .map(|c| c.clone())
            .collect();
        Ok(Self::sorted_page(matches, limit, 0))
    }

    async fn statistics(
        &self,
        user_id: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<ConversationStatistics> {
        let mut stats = ConversationStatistics::default();
        for conversation in self.conversations.iter() {
            if user_id.map_or(false, |u| conversation.user_id != u) {
                continue;
            }
            if from.map_or(false, |f| conversation.created_at < f) {
                continue;
            }
            if to.map_or(false, |t| conversation.created_at > t) {
                continue;
            }
            stats.total += 1;
            *stats
                .by_status
                .entry(conversation.status.as_str().to_string())
                .or_default() += 1;
            stats.total_messages += conversation.messages.len();
        }
        stats.average_messages = if stats.total == 0 {
            0.0
        } else {
            stats.total_messages as f64 / stats.total as f64
        };
        Ok(stats)
    }

    async fn bulk_archive(
        &self,
        user_id: &str,
        older_than_days: i64,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut archived = 0usize;
        for mut entry in self.conversations.iter_mut() {
            if entry.user_id == user_id
                && entry.status == ConversationStatus::Active
                && entry.is_idle_longer_than(older_than_days * 24, now)
            {
                entry.transition(ConversationStatus::Archived)?;
                archived += 1;
            }
        }
        Ok(archived)
    }

    async fn auto_archive_idle(&self, idle_hours: i64, now: DateTime<Utc>) -> Result<usize> {
        let mut archived = 0usize;
        for mut entry in self.conversations.iter_mut() {
            if entry.status == ConversationStatus::Active
                && entry.is_idle_longer_than(idle_hours, now)
            {
                entry.transition(ConversationStatus::Archived)?;
                archived += 1;
            }
        }
        Ok(archived)
    }
}
