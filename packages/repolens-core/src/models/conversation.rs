//! Conversation aggregate: ordered message history with archive lifecycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Archived,
    Deleted,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Archived => "archived",
            ConversationStatus::Deleted => "deleted",
        }
    }

    pub fn can_transition(from: ConversationStatus, to: ConversationStatus) -> bool {
        use ConversationStatus::*;
        matches!(
            (from, to),
            (Active, Archived) | (Archived, Active) | (Active, Deleted) | (Archived, Deleted)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    UserQuery,
    AiResponse,
    SystemMessage,
    CodeReference,
    SearchResult,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::UserQuery => "user_query",
            MessageKind::AiResponse => "ai_response",
            MessageKind::SystemMessage => "system_message",
            MessageKind::CodeReference => "code_reference",
            MessageKind::SearchResult => "search_result",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub edited: bool,
    pub attachment_count: usize,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: String,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<String>,
    pub parent_message_id: Option<String>,
    pub metadata: MessageMetadata,
}

impl ConversationMessage {
    pub fn new(
        conversation_id: impl Into<String>,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::validation("message content must not be empty"));
        }
        Ok(Self {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            conversation_id: conversation_id.into(),
            kind,
            content,
            timestamp: Utc::now(),
            attachments: Vec::new(),
            parent_message_id: None,
            metadata: MessageMetadata::default(),
        })
    }
}

/// Retrieval scope and preferences for a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub repository_ids: Vec<String>,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
    pub domain: Option<String>,
    pub intent_hint: Option<String>,
}

/// Conversation aggregate. The aggregate is the consistency boundary:
/// appends are serialized by the store, and `last_activity_at` never moves
/// backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub status: ConversationStatus,
    pub messages: Vec<ConversationMessage>,
    pub context: ConversationContext,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Conversation {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        context: ConversationContext,
    ) -> Result<Self> {
        let user_id = user_id.into();
        let title = title.into();
        if user_id.trim().is_empty() {
            return Err(Error::validation("conversation user id is required"));
        }
        if title.trim().is_empty() {
            return Err(Error::validation("conversation title must not be empty"));
        }
        let now = Utc::now();
        Ok(Self {
            id: format!("conv_{}", Uuid::new_v4().simple()),
            user_id,
            title,
            status: ConversationStatus::Active,
            messages: Vec::new(),
            context,
            created_at: now,
            last_activity_at: now,
            metadata: BTreeMap::new(),
        })
    }

    pub fn transition(&mut self, to: ConversationStatus) -> Result<()> {
        if !ConversationStatus::can_transition(self.status, to) {
            return Err(Error::invalid_transition(self.status.as_str(), to.as_str()));
        }
        self.status = to;
        Ok(())
    }

    /// Append a message. Only legal while `Active`; the message timestamp is
    /// assigned here so messages are totally ordered by arrival.
    pub fn add_message(
        &mut self,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Result<&ConversationMessage> {
        if self.status != ConversationStatus::Active {
            return Err(Error::invalid_transition(
                self.status.as_str(),
                "add_message",
            ));
        }
        let mut message = ConversationMessage::new(&self.id, kind, content)?;
        // Arrival order must match timestamp order even at clock resolution.
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        if message.timestamp > self.last_activity_at {
            self.last_activity_at = message.timestamp;
        }
        self.messages.push(message);
        Ok(self.messages.last().expect("just pushed"))
    }

    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_activity_at {
            self.last_activity_at = at;
        }
    }

    pub fn is_idle_longer_than(&self, hours: i64, now: DateTime<Utc>) -> bool {
        now - self.last_activity_at > chrono::Duration::hours(hours)
    }

    /// Messages ordered by timestamp (already the storage order).
    pub fn recent_messages(&self, limit: usize) -> &[ConversationMessage] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv() -> Conversation {
        Conversation::new("user-1", "auth questions", ConversationContext::default()).unwrap()
    }

    #[test]
    fn test_add_message_requires_active() {
        let mut c = conv();
        c.add_message(MessageKind::UserQuery, "hello").unwrap();
        c.transition(ConversationStatus::Archived).unwrap();
        assert!(c.add_message(MessageKind::UserQuery, "again").is_err());
    }

    #[test]
    fn test_message_content_must_be_nonempty() {
        let mut c = conv();
        assert!(c.add_message(MessageKind::UserQuery, "  ").is_err());
    }

    #[test]
    fn test_timestamps_non_decreasing_and_activity_tracks_max() {
        let mut c = conv();
        for i in 0..10 {
            c.add_message(MessageKind::UserQuery, format!("m{i}")).unwrap();
        }
        for pair in c.messages.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        let max_ts = c.messages.iter().map(|m| m.timestamp).max().unwrap();
        assert!(c.last_activity_at >= max_ts);
    }

    #[test]
    fn test_status_edges() {
        let mut c = conv();
        c.transition(ConversationStatus::Archived).unwrap();
        c.transition(ConversationStatus::Active).unwrap();
        c.transition(ConversationStatus::Deleted).unwrap();
        assert!(c.transition(ConversationStatus::Active).is_err());
        assert!(c.transition(ConversationStatus::Archived).is_err());
    }

    #[test]
    fn test_recent_messages_window() {
        let mut c = conv();
        for i in 0..25 {
            c.add_message(MessageKind::UserQuery, format!("m{i}")).unwrap();
        }
        let recent = c.recent_messages(20);
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].content, "m5");
    }

    #[test]
    fn test_idle_detection() {
        let mut c = conv();
        let now = c.last_activity_at + chrono::Duration::hours(200);
        assert!(c.is_idle_longer_than(168, now));
        c.touch(now);
        assert!(!c.is_idle_longer_than(168, now));
    }
}
