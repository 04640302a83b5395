//! Intra-process event bus.
//!
//! Two channel families:
//! - a broadcast channel for domain events (repository lifecycle, graph,
//!   documentation), and
//! - per-conversation bounded channels for streamed message deltas, each
//!   carrying a monotonically increasing sequence number.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const STREAM_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEventKind {
    RepositoryStatusChanged {
        repository_id: String,
        from: String,
        to: String,
    },
    RepositoryReady {
        repository_id: String,
    },
    IngestionFailed {
        repository_id: String,
        phase: String,
        error_kind: String,
        message: String,
    },
    GraphStatusChanged {
        graph_id: String,
        from: String,
        to: String,
    },
    DocumentationCompleted {
        repository_id: String,
        version: String,
        quality_score: f64,
    },
    DocumentationFailed {
        repository_id: String,
        message: String,
    },
    RepositoryDeleted {
        repository_id: String,
    },
}

/// Envelope published on the bus; serializes as a flat JSON object with
/// `id`, `occurred_on` and the payload's `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub occurred_on: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: DomainEventKind,
}

/// One element of a streamed assistant response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamPayload {
    MessageDelta { content: String },
    MessageComplete { message_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub conversation_id: String,
    /// Monotonically increasing per conversation.
    pub sequence: u64,
    #[serde(flatten)]
    pub payload: StreamPayload,
}

struct ConversationChannel {
    tx: broadcast::Sender<StreamEvent>,
    next_sequence: AtomicU64,
}

/// Process-scoped publish/subscribe hub. Cheap to clone via `Arc`.
pub struct EventBus {
    events: broadcast::Sender<DomainEvent>,
    streams: DashMap<String, Arc<ConversationChannel>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            events,
            streams: DashMap::new(),
        }
    }

    /// Publish a domain event; returns the envelope for callers that need
    /// the assigned id. Delivery to zero subscribers is not an error.
    pub fn publish(&self, kind: DomainEventKind) -> DomainEvent {
        let event = DomainEvent {
            id: Uuid::new_v4(),
            occurred_on: Utc::now(),
            kind,
        };
        let _ = self.events.send(event.clone());
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    fn channel(&self, conversation_id: &str) -> Arc<ConversationChannel> {
        self.streams
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(STREAM_CHANNEL_CAPACITY);
                Arc::new(ConversationChannel {
                    tx,
                    next_sequence: AtomicU64::new(0),
                })
            })
            .clone()
    }

    /// Subscribe to the delta stream of one conversation.
    pub fn subscribe_stream(&self, conversation_id: &str) -> broadcast::Receiver<StreamEvent> {
        self.channel(conversation_id).tx.subscribe()
    }

    /// Publish one partial-token delta; returns the assigned sequence.
    pub fn publish_delta(&self, conversation_id: &str, content: impl Into<String>) -> u64 {
        self.publish_stream(
            conversation_id,
            StreamPayload::MessageDelta {
                content: content.into(),
            },
        )
    }

    /// Terminal stream element carrying the persisted message id.
    pub fn publish_complete(&self, conversation_id: &str, message_id: impl Into<String>) -> u64 {
        self.publish_stream(
            conversation_id,
            StreamPayload::MessageComplete {
                message_id: message_id.into(),
            },
        )
    }

    fn publish_stream(&self, conversation_id: &str, payload: StreamPayload) -> u64 {
        let channel = self.channel(conversation_id);
        let sequence = channel.next_sequence.fetch_add(1, Ordering::SeqCst);
        let _ = channel.tx.send(StreamEvent {
            conversation_id: conversation_id.to_string(),
            sequence,
            payload,
        });
        sequence
    }

    /// Drop the stream channel once a conversation is closed.
    pub fn close_stream(&self, conversation_id: &str) {
        self.streams.remove(conversation_id);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_receive() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(DomainEventKind::RepositoryReady {
            repository_id: "acme/svc".into(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.kind,
            DomainEventKind::RepositoryReady { ref repository_id } if repository_id == "acme/svc"
        ));
    }

    #[tokio::test]
    async fn test_stream_sequences_are_monotonic_per_conversation() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_stream("conv-1");

        for i in 0..5 {
            bus.publish_delta("conv-1", format!("tok{i}"));
        }
        bus.publish_complete("conv-1", "msg-1");

        let mut last = None;
        for _ in 0..6 {
            let event = rx.recv().await.unwrap();
            if let Some(prev) = last {
                assert_eq!(event.sequence, prev + 1);
            }
            last = Some(event.sequence);
        }
        assert_eq!(last, Some(5));
    }

    #[tokio::test]
    async fn test_streams_are_isolated_by_conversation() {
        let bus = EventBus::new();
        let mut rx_a = bus.subscribe_stream("a");
        let _rx_b = bus.subscribe_stream("b");

        bus.publish_delta("b", "for b");
        bus.publish_delta("a", "for a");

        let event = rx_a.recv().await.unwrap();
        assert_eq!(event.conversation_id, "a");
        assert_eq!(event.sequence, 0);
    }

    #[test]
    fn test_event_json_shape() {
        let bus = EventBus::new();
        let event = bus.publish(DomainEventKind::DocumentationCompleted {
            repository_id: "acme/svc".into(),
            version: "1.0.1".into(),
            quality_score: 0.9,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("id").is_some());
        assert!(json.get("occurred_on").is_some());
        assert_eq!(json["type"], "documentation_completed");
        assert_eq!(json["version"], "1.0.1");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.publish_delta("nobody", "listening");
        bus.publish(DomainEventKind::RepositoryDeleted {
            repository_id: "gone".into(),
        });
    }
}
