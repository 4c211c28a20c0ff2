//! Comments endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};
use parley_common::{AppResult, config::ServerConfig};
use parley_core::{CommentView, MentionedUser, UpdateCommentInput};
use serde::Serialize;

use crate::{
    endpoints::users::UserResponse,
    extractors::{AuthUser, MaybeAuthUser},
    middleware::AppState,
    response::{self, ApiResponse},
};

/// A mentioned user as shown on a comment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MentionResponse {
    pub id: String,
    pub username: String,
    pub profile_url: String,
}

impl MentionResponse {
    pub fn new(user: MentionedUser, server: &ServerConfig) -> Self {
        Self {
            profile_url: server.profile_url(&user.username),
            id: user.id,
            username: user.username,
        }
    }
}

/// Comment response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: String,
    pub post_id: String,
    pub body: String,
    pub user: UserResponse,
    pub mentions: Vec<MentionResponse>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CommentResponse {
    pub fn new(view: CommentView, server: &ServerConfig) -> Self {
        let CommentView {
            comment,
            author,
            mentions,
        } = view;

        Self {
            id: comment.id,
            post_id: comment.post_id,
            body: comment.body,
            user: UserResponse::new(author, server),
            mentions: mentions
                .into_iter()
                .map(|m| MentionResponse::new(m, server))
                .collect(),
            created_at: comment.created_at.to_rfc3339(),
            updated_at: comment.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Show a comment.
async fn show(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<CommentResponse>> {
    let view = state.comment_service.get(&id, viewer.id()).await?;
    Ok(ApiResponse::ok(CommentResponse::new(view, &state.server)))
}

/// Edit a comment. Mentions are detected again.
async fn update(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateCommentInput>,
) -> AppResult<ApiResponse<CommentResponse>> {
    let view = state.comment_service.update(&user, &id, input).await?;
    Ok(ApiResponse::ok(CommentResponse::new(view, &state.server)))
}

/// Delete a comment.
async fn delete(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.comment_service.delete(&user.id, &id).await?;
    Ok(response::ok())
}

/// Create comments router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(show).put(update).delete(delete))
}
