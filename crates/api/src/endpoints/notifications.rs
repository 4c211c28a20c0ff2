//! Notifications endpoints.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post},
};
use parley_common::AppResult;
use parley_db::entities::notification::{Model as NotificationModel, NotificationType};
use serde::{Deserialize, Serialize};

use crate::{
    extractors::AuthUser,
    middleware::AppState,
    response::{self, ApiResponse},
};

/// List notifications request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
    /// Maximum results (default: 10, max: 100)
    pub limit: Option<u64>,
    /// Cursor for pagination (before this ID)
    pub until_id: Option<String>,
    /// Only unread notifications
    #[serde(default)]
    pub unread_only: bool,
}

/// Notification response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: String,
    pub created_at: String,
    pub is_read: bool,
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
    pub data: serde_json::Value,
}

impl From<NotificationModel> for NotificationResponse {
    fn from(n: NotificationModel) -> Self {
        Self {
            id: n.id,
            created_at: n.created_at.to_rfc3339(),
            is_read: n.is_read,
            notification_type: notification_type_to_string(&n.notification_type),
            user_id: n.notifier_id,
            comment_id: n.comment_id,
            data: n.data,
        }
    }
}

fn notification_type_to_string(t: &NotificationType) -> String {
    match t {
        NotificationType::Mention => "mention".to_string(),
    }
}

/// Unread count response.
#[derive(Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Get notifications for the authenticated user, newest first.
async fn list(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
) -> AppResult<ApiResponse<Vec<NotificationResponse>>> {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let notifications = state
        .notification_service
        .get_notifications(&user.id, limit, query.until_id.as_deref(), query.unread_only)
        .await?;

    Ok(ApiResponse::ok(
        notifications.into_iter().map(Into::into).collect(),
    ))
}

/// Count unread notifications.
async fn unread_count(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.count_unread(&user.id).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Mark one notification as read.
async fn mark_read(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.notification_service.mark_as_read(&user.id, &id).await?;
    Ok(response::ok())
}

/// Mark all notifications as read.
async fn mark_all_read(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.mark_all_as_read(&user.id).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Delete one notification.
async fn remove(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.notification_service.delete(&user.id, &id).await?;
    Ok(response::ok())
}

/// Delete all notifications.
async fn remove_all(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<CountResponse>> {
    let count = state.notification_service.delete_all(&user.id).await?;
    Ok(ApiResponse::ok(CountResponse { count }))
}

/// Create notifications router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).delete(remove_all))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/{id}/read", post(mark_read))
        .route("/{id}", delete(remove))
}
