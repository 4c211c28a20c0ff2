//! Posts endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
};
use parley_common::AppResult;
use parley_core::{CreateCommentInput, CreatePostInput, UpdatePostInput};
use parley_db::entities::post;
use serde::Serialize;

use crate::{
    endpoints::comments::CommentResponse,
    extractors::{AuthUser, MaybeAuthUser},
    middleware::AppState,
    response::{self, ApiResponse, ListQuery},
};

/// Post response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub body: String,
    pub is_published: bool,
    pub comments_count: i32,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl From<post::Model> for PostResponse {
    fn from(post: post::Model) -> Self {
        Self {
            id: post.id,
            user_id: post.user_id,
            title: post.title,
            body: post.body,
            is_published: post.is_published,
            comments_count: post.comments_count,
            created_at: post.created_at.to_rfc3339(),
            updated_at: post.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Latest published posts.
async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<ApiResponse<Vec<PostResponse>>> {
    let posts = state
        .post_service
        .list(query.limit(), query.until_id.as_deref())
        .await?;

    Ok(ApiResponse::ok(posts.into_iter().map(Into::into).collect()))
}

/// Create a post.
async fn create(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreatePostInput>,
) -> AppResult<impl IntoResponse> {
    let post = state.post_service.create(&user.id, input).await?;
    Ok(ApiResponse::created(PostResponse::from(post)))
}

/// Show a post.
async fn show(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<ApiResponse<PostResponse>> {
    let post = state.post_service.get(&id, viewer.id()).await?;
    Ok(ApiResponse::ok(post.into()))
}

/// Update a post.
async fn update(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdatePostInput>,
) -> AppResult<ApiResponse<PostResponse>> {
    let post = state.post_service.update(&user.id, &id, input).await?;
    Ok(ApiResponse::ok(post.into()))
}

/// Delete a post.
async fn delete(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state.post_service.delete(&user.id, &id).await?;
    Ok(response::ok())
}

/// Comments on a post, newest first.
async fn list_comments(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> AppResult<ApiResponse<Vec<CommentResponse>>> {
    let comments = state
        .comment_service
        .list_for_post(&id, viewer.id(), query.limit(), query.until_id.as_deref())
        .await?;

    Ok(ApiResponse::ok(
        comments
            .into_iter()
            .map(|c| CommentResponse::new(c, &state.server))
            .collect(),
    ))
}

/// Comment on a post.
async fn create_comment(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<CreateCommentInput>,
) -> AppResult<impl IntoResponse> {
    let view = state.comment_service.create(&user, &id, input).await?;
    Ok(ApiResponse::created(CommentResponse::new(view, &state.server)))
}

/// Create posts router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(show).put(update).delete(delete))
        .route("/{id}/comments", get(list_comments).post(create_comment))
}
