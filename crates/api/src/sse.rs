//! Server-Sent Events (SSE) for real-time updates.
//!
//! Each signed-in user can hold a stream of their own mention notifications.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::stream::{self, Stream};
use parley_common::AppResult;
use parley_core::{EventPublisher, MentionNotification};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::{extractors::AuthUser, middleware::AppState};

/// SSE event types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SseEvent {
    /// The user was mentioned in a comment.
    Mention(MentionNotification),
    /// Connection established.
    Connected,
}

/// Per-user SSE broadcast channels.
#[derive(Clone, Default)]
pub struct SseBroadcaster {
    user_channels: Arc<RwLock<HashMap<String, broadcast::Sender<SseEvent>>>>,
}

impl SseBroadcaster {
    /// Create a new SSE broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a user-specific channel.
    pub async fn user_channel(&self, user_id: &str) -> broadcast::Sender<SseEvent> {
        let mut channels = self.user_channels.write().await;

        if let Some(sender) = channels.get(user_id)
            && sender.receiver_count() > 0
        {
            return sender.clone();
        }

        let (sender, _) = broadcast::channel(100);
        channels.insert(user_id.to_string(), sender.clone());
        sender
    }

    /// Broadcast an event to a specific user. Returns how many streams got it.
    pub async fn broadcast_to_user(&self, user_id: &str, event: SseEvent) -> usize {
        let channels = self.user_channels.read().await;
        channels
            .get(user_id)
            .and_then(|sender| sender.send(event).ok())
            .unwrap_or(0)
    }

    /// Clean up inactive user channels.
    pub async fn cleanup(&self) {
        let mut channels = self.user_channels.write().await;
        channels.retain(|_, sender| sender.receiver_count() > 0);
    }
}

#[async_trait]
impl EventPublisher for SseBroadcaster {
    async fn publish_mention(
        &self,
        recipient_id: &str,
        payload: &MentionNotification,
    ) -> AppResult<()> {
        let received = self
            .broadcast_to_user(recipient_id, SseEvent::Mention(payload.clone()))
            .await;
        tracing::debug!(recipient_id = %recipient_id, received, "Broadcast mention");
        Ok(())
    }
}

/// User-specific SSE stream.
async fn user_stream(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let sender = state.sse_broadcaster.user_channel(&user.id).await;
    let rx = sender.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| {
        result.ok().map(|event| {
            Ok(Event::default()
                .json_data(&event)
                .unwrap_or_else(|_| Event::default().data("error")))
        })
    });

    let initial = stream::once(async {
        Ok(Event::default()
            .json_data(&SseEvent::Connected)
            .unwrap_or_else(|_| Event::default().data("connected")))
    });

    Sse::new(initial.chain(stream)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// Create SSE router.
pub fn router() -> Router<AppState> {
    Router::new().route("/user", get(user_stream))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use parley_core::MentionAuthor;

    fn payload() -> MentionNotification {
        MentionNotification {
            comment_id: "c1".to_string(),
            body: "hi @bob".to_string(),
            user: MentionAuthor {
                id: "user1".to_string(),
                username: "alice".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_user_channel_reused_while_subscribed() {
        let broadcaster = SseBroadcaster::new();

        let sender1 = broadcaster.user_channel("user1").await;
        let _rx = sender1.subscribe();
        let sender2 = broadcaster.user_channel("user1").await;

        assert!(sender1.same_channel(&sender2));
    }

    #[tokio::test]
    async fn test_publish_mention_reaches_only_recipient() {
        let broadcaster = SseBroadcaster::new();
        let mut bob = broadcaster.user_channel("user2").await.subscribe();
        let mut carol = broadcaster.user_channel("user3").await.subscribe();

        broadcaster.publish_mention("user2", &payload()).await.unwrap();

        let event = bob.recv().await.unwrap();
        assert!(matches!(event, SseEvent::Mention(ref n) if n.comment_id == "c1"));
        assert!(carol.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_listeners_succeeds() {
        let broadcaster = SseBroadcaster::new();
        assert!(broadcaster.publish_mention("nobody", &payload()).await.is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_drops_idle_channels() {
        let broadcaster = SseBroadcaster::new();
        drop(broadcaster.user_channel("user1").await.subscribe());

        broadcaster.cleanup().await;
        assert_eq!(
            broadcaster
                .broadcast_to_user("user1", SseEvent::Connected)
                .await,
            0
        );
    }

    #[test]
    fn test_sse_event_serialization() {
        let json = serde_json::to_value(SseEvent::Mention(payload())).unwrap();
        assert_eq!(json["type"], "mention");
        assert_eq!(json["comment_id"], "c1");
        assert_eq!(json["user"]["username"], "alice");

        let json = serde_json::to_value(SseEvent::Connected).unwrap();
        assert_eq!(json["type"], "connected");
    }
}
