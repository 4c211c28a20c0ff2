//! Redis Pub/Sub for cross-instance notification fan-out.
//!
//! Live mention notifications are published to Redis so that every server
//! instance can forward them to the SSE connections it holds.

#![allow(missing_docs)]

use std::sync::Arc;

use async_trait::async_trait;
use fred::clients::{Client, SubscriberClient};
use fred::error::{Error as RedisError, ErrorKind as RedisErrorKind};
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::config::Config as RedisConfig;
use parley_common::{AppError, AppResult};
use parley_core::{EventPublisher, MentionNotification};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Pub/Sub channel name suffixes, joined to the configured key prefix.
pub mod channels {
    /// All notification events.
    pub const NOTIFICATIONS: &str = "notifications";
    /// User-specific events (suffix with user ID).
    pub const USER_PREFIX: &str = "user:";
}

/// Pub/Sub event types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PubSubEvent {
    /// A user was mentioned in a comment.
    Mention {
        recipient_id: String,
        notification: MentionNotification,
    },
}

impl PubSubEvent {
    /// The user this event is addressed to.
    #[must_use]
    pub fn recipient_id(&self) -> &str {
        match self {
            Self::Mention { recipient_id, .. } => recipient_id,
        }
    }
}

/// Redis Pub/Sub manager for event distribution.
#[derive(Clone)]
pub struct RedisPubSub {
    publisher: Client,
    subscriber: SubscriberClient,
    prefix: String,
    /// Local broadcast channel for events received from Redis.
    local_tx: broadcast::Sender<PubSubEvent>,
}

impl RedisPubSub {
    /// Create a new Redis Pub/Sub manager.
    pub async fn new(redis_url: &str, prefix: &str) -> Result<Self, RedisError> {
        let config = RedisConfig::from_url(redis_url)?;

        let publisher = Client::new(config.clone(), None, None, None);
        publisher.init().await?;

        let subscriber = SubscriberClient::new(config, None, None, None);
        subscriber.init().await?;

        let (local_tx, _) = broadcast::channel(1000);

        info!(prefix, "Redis Pub/Sub initialized");

        Ok(Self {
            publisher,
            subscriber,
            prefix: prefix.to_string(),
            local_tx,
        })
    }

    /// Channel carrying every notification event.
    #[must_use]
    pub fn notifications_channel(&self) -> String {
        format!("{}:{}", self.prefix, channels::NOTIFICATIONS)
    }

    /// Channel carrying one user's events.
    #[must_use]
    pub fn user_channel(&self, user_id: &str) -> String {
        format!("{}:{}{}", self.prefix, channels::USER_PREFIX, user_id)
    }

    /// Subscribe to the notifications channel and start the event loop.
    pub async fn start(&self) -> Result<(), RedisError> {
        self.subscriber
            .subscribe(self.notifications_channel())
            .await?;

        info!("Subscribed to Redis Pub/Sub channels");

        let local_tx = self.local_tx.clone();
        let mut message_stream = self.subscriber.message_rx();

        tokio::spawn(async move {
            while let Ok(message) = message_stream.recv().await {
                if let Some(payload) = message.value.as_string() {
                    match serde_json::from_str::<PubSubEvent>(&payload) {
                        Ok(event) => {
                            debug!(?event, "Received Pub/Sub event");
                            if local_tx.send(event).is_err() {
                                debug!("No local subscribers for Pub/Sub event");
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse Pub/Sub message: {}", e);
                        }
                    }
                }
            }
            info!("Pub/Sub message stream ended");
        });

        Ok(())
    }

    /// Publish an event to a channel.
    pub async fn publish(&self, channel: &str, event: &PubSubEvent) -> Result<(), RedisError> {
        let payload = serde_json::to_string(event).map_err(|e| {
            RedisError::new(
                RedisErrorKind::InvalidArgument,
                format!("Serialization error: {e}"),
            )
        })?;
        let _: () = self.publisher.publish(channel, payload).await?;
        debug!(channel, "Published Pub/Sub event");
        Ok(())
    }

    /// Publish a mention to the global and the recipient's channel.
    pub async fn publish_mention(
        &self,
        recipient_id: &str,
        notification: &MentionNotification,
    ) -> Result<(), RedisError> {
        let event = PubSubEvent::Mention {
            recipient_id: recipient_id.to_string(),
            notification: notification.clone(),
        };

        self.publish(&self.notifications_channel(), &event).await?;
        self.publish(&self.user_channel(recipient_id), &event)
            .await?;

        Ok(())
    }

    /// Get a receiver for local broadcast events.
    #[must_use]
    pub fn subscribe_local(&self) -> broadcast::Receiver<PubSubEvent> {
        self.local_tx.subscribe()
    }

    /// Shutdown the Pub/Sub manager.
    pub async fn shutdown(&self) -> Result<(), RedisError> {
        self.subscriber.quit().await?;
        self.publisher.quit().await?;
        info!("Redis Pub/Sub shutdown");
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RedisPubSub {
    async fn publish_mention(
        &self,
        recipient_id: &str,
        payload: &MentionNotification,
    ) -> AppResult<()> {
        Self::publish_mention(self, recipient_id, payload)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))
    }
}

/// Bridge between Redis Pub/Sub and the local SSE broadcaster.
pub struct PubSubSseBridge {
    pubsub: Arc<RedisPubSub>,
}

impl PubSubSseBridge {
    /// Create a new bridge.
    #[must_use]
    pub const fn new(pubsub: Arc<RedisPubSub>) -> Self {
        Self { pubsub }
    }

    /// Start forwarding events received from Redis to `on_event`.
    pub fn start<F>(&self, on_event: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn(PubSubEvent) + Send + Sync + 'static,
    {
        forward(self.pubsub.subscribe_local(), on_event)
    }
}

fn forward<F>(mut rx: broadcast::Receiver<PubSubEvent>, on_event: F) -> tokio::task::JoinHandle<()>
where
    F: Fn(PubSubEvent) + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => on_event(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("SSE bridge lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("SSE bridge channel closed");
                    break;
                }
            }
        }
    })
}
