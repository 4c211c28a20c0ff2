//! Notification dispatch.
//!
//! Mention notifications leave the request path through a
//! [`NotificationDispatcher`]. Whatever sits behind it (the in-process queue
//! or the Redis job queue) eventually calls a [`NotificationDeliverer`] once
//! per enabled [`NotificationChannel`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parley_common::{AppResult, config::NotificationConfig};
use parley_db::entities::user;
use serde::{Deserialize, Serialize};

use crate::services::event_publisher::EventPublisherService;
use crate::services::notification::NotificationService;

/// Where a notification is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationChannel {
    /// Persisted into the recipient's inbox.
    Database,
    /// Pushed to the recipient's live connections.
    Broadcast,
}

impl NotificationChannel {
    /// Channels enabled by configuration, in delivery order.
    #[must_use]
    pub fn enabled(config: &NotificationConfig) -> Vec<Self> {
        let mut channels = Vec::with_capacity(2);
        if config.database {
            channels.push(Self::Database);
        }
        if config.broadcast {
            channels.push(Self::Broadcast);
        }
        channels
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user who wrote the mentioning comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionAuthor {
    pub id: String,
    pub username: String,
}

impl From<&user::Model> for MentionAuthor {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
        }
    }
}

/// Payload of a "you were mentioned in a comment" notification.
///
/// `body` is a snapshot taken when the comment was processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionNotification {
    pub comment_id: String,
    pub body: String,
    pub user: MentionAuthor,
}

/// Hands mention notifications off for asynchronous delivery.
///
/// Implementations must not block: `dispatch` returns once the notification
/// is enqueued (or dropped), never after delivery.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Enqueue a notification for one recipient.
    async fn dispatch(&self, recipient_id: &str, payload: MentionNotification) -> AppResult<()>;
}

/// A dispatcher that discards everything.
#[derive(Clone, Default)]
pub struct NoOpDispatcher;

#[async_trait]
impl NotificationDispatcher for NoOpDispatcher {
    async fn dispatch(&self, _recipient_id: &str, _payload: MentionNotification) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed NotificationDispatcher trait object.
pub type NotificationDispatcherService = Arc<dyn NotificationDispatcher>;

/// Performs the actual delivery of one notification on one channel.
#[async_trait]
pub trait NotificationDeliverer: Send + Sync {
    async fn deliver(
        &self,
        channel: NotificationChannel,
        recipient_id: &str,
        payload: &MentionNotification,
    ) -> AppResult<()>;
}

/// Wrapper for boxed NotificationDeliverer trait object.
pub type NotificationDelivererService = Arc<dyn NotificationDeliverer>;

/// Delivers to the inbox table and to the event publisher.
#[derive(Clone)]
pub struct ChannelDeliverer {
    notification_service: NotificationService,
    event_publisher: EventPublisherService,
}

impl ChannelDeliverer {
    #[must_use]
    pub fn new(
        notification_service: NotificationService,
        event_publisher: EventPublisherService,
    ) -> Self {
        Self {
            notification_service,
            event_publisher,
        }
    }
}

#[async_trait]
impl NotificationDeliverer for ChannelDeliverer {
    async fn deliver(
        &self,
        channel: NotificationChannel,
        recipient_id: &str,
        payload: &MentionNotification,
    ) -> AppResult<()> {
        match channel {
            NotificationChannel::Database => {
                let notification = self
                    .notification_service
                    .create_mention(recipient_id, payload)
                    .await?;
                tracing::debug!(
                    notification_id = %notification.id,
                    recipient_id = %recipient_id,
                    comment_id = %payload.comment_id,
                    "Stored mention notification"
                );
            }
            NotificationChannel::Broadcast => {
                self.event_publisher
                    .publish_mention(recipient_id, payload)
                    .await?;
            }
        }
        Ok(())
    }
}
