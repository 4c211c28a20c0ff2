//! Authentication endpoints.

use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use parley_common::AppResult;
use parley_core::CreateUserInput;
use serde::Serialize;

use crate::{
    extractors::AuthUser,
    middleware::AppState,
    response::{self, ApiResponse},
};

/// Signup response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub id: String,
    pub username: String,
    pub token: String,
}

/// Token response.
#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Create a new user account.
async fn signup(
    State(state): State<AppState>,
    Json(input): Json<CreateUserInput>,
) -> AppResult<impl IntoResponse> {
    let user = state.user_service.create(input).await?;

    Ok(ApiResponse::created(SignupResponse {
        id: user.id,
        username: user.username,
        token: user.token.unwrap_or_default(),
    }))
}

/// Invalidate the current token.
async fn signout(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    state.user_service.revoke_token(&user.id).await?;
    Ok(response::ok())
}

/// Replace the current token with a fresh one.
async fn regenerate_token(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<TokenResponse>> {
    let token = state.user_service.regenerate_token(&user.id).await?;
    Ok(ApiResponse::ok(TokenResponse { token }))
}

/// Create auth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signout", post(signout))
        .route("/regenerate-token", post(regenerate_token))
}
