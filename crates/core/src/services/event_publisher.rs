//! Event publisher service.
//!
//! Provides an abstraction for publishing real-time events.
//! Implementations live in the API crate (in-process SSE) and the queue
//! crate (Redis Pub/Sub).

use async_trait::async_trait;
use parley_common::AppResult;
use std::sync::Arc;

use crate::services::dispatch::MentionNotification;

/// Trait for publishing real-time events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Push a mention notification to the recipient's live connections.
    async fn publish_mention(
        &self,
        recipient_id: &str,
        payload: &MentionNotification,
    ) -> AppResult<()>;
}

/// A no-op implementation of EventPublisher for testing or when real-time events are disabled.
#[derive(Clone, Default)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish_mention(
        &self,
        _recipient_id: &str,
        _payload: &MentionNotification,
    ) -> AppResult<()> {
        Ok(())
    }
}

/// Wrapper for boxed EventPublisher trait object.
pub type EventPublisherService = Arc<dyn EventPublisher>;
