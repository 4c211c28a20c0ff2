//! Notification delivery job.

use parley_core::{MentionNotification, NotificationChannel};
use serde::{Deserialize, Serialize};

/// Job to deliver one mention notification on one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyJob {
    /// The mentioned user.
    pub recipient_id: String,

    /// Delivery channel.
    pub channel: NotificationChannel,

    /// Notification payload, snapshotted at dispatch time.
    pub payload: MentionNotification,
}

impl NotifyJob {
    /// Create a new notify job.
    #[must_use]
    pub const fn new(
        recipient_id: String,
        channel: NotificationChannel,
        payload: MentionNotification,
    ) -> Self {
        Self {
            recipient_id,
            channel,
            payload,
        }
    }
}
