//! Redis-backed notification dispatcher.
//!
//! Each dispatched notification becomes one [`NotifyJob`] per enabled
//! channel, stored with apalis-redis and picked up by [`notify_worker`].
//!
//! [`notify_worker`]: crate::workers::notify_worker

use std::sync::Arc;

use apalis::prelude::*;
use apalis_redis::RedisStorage;
use async_trait::async_trait;
use parley_common::{AppError, AppResult, config::NotificationConfig};
use parley_core::{MentionNotification, NotificationChannel, NotificationDispatcher};

use crate::jobs::NotifyJob;

/// Redis-backed notification dispatcher.
#[derive(Clone)]
pub struct RedisNotificationDispatcher {
    storage: RedisStorage<NotifyJob>,
    channels: Arc<[NotificationChannel]>,
}

impl RedisNotificationDispatcher {
    /// Create a dispatcher pushing to `storage` for the configured channels.
    #[must_use]
    pub fn new(storage: RedisStorage<NotifyJob>, config: &NotificationConfig) -> Self {
        Self {
            storage,
            channels: NotificationChannel::enabled(config).into(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for RedisNotificationDispatcher {
    async fn dispatch(&self, recipient_id: &str, payload: MentionNotification) -> AppResult<()> {
        let mut failed = None;

        for &channel in self.channels.iter() {
            let job = NotifyJob::new(recipient_id.to_string(), channel, payload.clone());

            match self.storage.clone().push(job).await {
                Ok(_) => {
                    tracing::debug!(recipient_id = %recipient_id, channel = %channel, "Queued notify job");
                }
                Err(e) => {
                    tracing::warn!(
                        recipient_id = %recipient_id,
                        channel = %channel,
                        error = %e,
                        "Failed to queue notify job"
                    );
                    failed = Some(AppError::Queue(format!("Failed to queue job: {e}")));
                }
            }
        }

        failed.map_or(Ok(()), Err)
    }
}
