//! Notification service.

use parley_common::{AppError, AppResult, IdGenerator};
use parley_db::{
    entities::notification::{self, NotificationType},
    repositories::NotificationRepository,
};
use sea_orm::Set;

use crate::services::dispatch::MentionNotification;

/// Notification service for business logic.
#[derive(Clone)]
pub struct NotificationService {
    notification_repo: NotificationRepository,
    id_gen: IdGenerator,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub const fn new(notification_repo: NotificationRepository) -> Self {
        Self {
            notification_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Store a mention notification in the recipient's inbox.
    pub async fn create_mention(
        &self,
        recipient_id: &str,
        payload: &MentionNotification,
    ) -> AppResult<notification::Model> {
        let data =
            serde_json::to_value(payload).map_err(|e| AppError::Internal(e.to_string()))?;

        let model = notification::ActiveModel {
            id: Set(self.id_gen.generate()),
            notifiee_id: Set(recipient_id.to_string()),
            notifier_id: Set(Some(payload.user.id.clone())),
            notification_type: Set(NotificationType::Mention),
            comment_id: Set(Some(payload.comment_id.clone())),
            data: Set(data),
            is_read: Set(false),
            created_at: Set(chrono::Utc::now().into()),
        };

        self.notification_repo.create(model).await
    }

    /// Get notifications for a user.
    pub async fn get_notifications(
        &self,
        user_id: &str,
        limit: u64,
        until_id: Option<&str>,
        unread_only: bool,
    ) -> AppResult<Vec<notification::Model>> {
        self.notification_repo
            .find_by_user(user_id, limit, until_id, unread_only)
            .await
    }

    /// Mark a notification as read.
    pub async fn mark_as_read(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        self.get_owned(user_id, notification_id).await?;
        self.notification_repo.mark_as_read(notification_id).await
    }

    /// Mark all notifications as read for a user.
    pub async fn mark_all_as_read(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.mark_all_as_read(user_id).await
    }

    /// Count unread notifications for a user.
    pub async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.count_unread(user_id).await
    }

    /// Delete a notification.
    pub async fn delete(&self, user_id: &str, notification_id: &str) -> AppResult<()> {
        self.get_owned(user_id, notification_id).await?;
        self.notification_repo.delete(notification_id).await
    }

    /// Delete all notifications for a user.
    pub async fn delete_all(&self, user_id: &str) -> AppResult<u64> {
        self.notification_repo.delete_all_for_user(user_id).await
    }

    // Someone else's notification is reported as missing, not forbidden.
    async fn get_owned(
        &self,
        user_id: &str,
        notification_id: &str,
    ) -> AppResult<notification::Model> {
        match self.notification_repo.find_by_id(notification_id).await? {
            Some(n) if n.notifiee_id == user_id => Ok(n),
            _ => Err(AppError::NotFound(format!(
                "Notification not found: {notification_id}"
            ))),
        }
    }
}
