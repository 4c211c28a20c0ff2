//! Users endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use parley_common::{AppResult, config::ServerConfig};
use parley_core::UpdateUserInput;
use parley_db::entities::user;
use serde::Serialize;

use crate::{
    endpoints::posts::PostResponse,
    extractors::{AuthUser, MaybeAuthUser},
    middleware::AppState,
    response::ApiResponse,
};

/// Number of posts shown on a profile.
const PROFILE_POSTS: u64 = 10;

/// Public user response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub name: String,
    pub profile_url: String,
    pub created_at: String,
}

impl UserResponse {
    pub fn new(user: user::Model, server: &ServerConfig) -> Self {
        Self {
            profile_url: server.profile_url(&user.username),
            id: user.id,
            username: user.username,
            name: user.name,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// The signed-in user, including private fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub email: String,
}

impl MeResponse {
    pub fn new(user: user::Model, server: &ServerConfig) -> Self {
        let email = user.email.clone();
        Self {
            user: UserResponse::new(user, server),
            email,
        }
    }
}

/// Profile with the user's latest posts.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub posts: Vec<PostResponse>,
}

/// Show a user by username.
async fn show(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<ApiResponse<ProfileResponse>> {
    let user = state.user_service.get_by_username(&username).await?;
    let posts = state
        .post_service
        .user_posts(&user.id, viewer.id(), PROFILE_POSTS, None)
        .await?;

    Ok(ApiResponse::ok(ProfileResponse {
        user: UserResponse::new(user, &state.server),
        posts: posts.into_iter().map(PostResponse::from).collect(),
    }))
}

/// Get current user.
async fn me(AuthUser(user): AuthUser, State(state): State<AppState>) -> ApiResponse<MeResponse> {
    ApiResponse::ok(MeResponse::new(user, &state.server))
}

/// Update current user.
async fn update_me(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<UpdateUserInput>,
) -> AppResult<ApiResponse<MeResponse>> {
    let updated = state.user_service.update_profile(&user.id, input).await?;
    Ok(ApiResponse::ok(MeResponse::new(updated, &state.server)))
}

/// Routes under `/users`.
pub fn router() -> Router<AppState> {
    Router::new().route("/{username}", get(show))
}

/// Routes for the signed-in user.
pub fn me_router() -> Router<AppState> {
    Router::new().route("/i", get(me).patch(update_me))
}
