//! API middleware.

#![allow(missing_docs)]

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use parley_common::config::ServerConfig;
use parley_core::{CommentService, NotificationService, PostService, UserService};

use crate::sse::SseBroadcaster;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub server: ServerConfig,
    pub user_service: UserService,
    pub post_service: PostService,
    pub comment_service: CommentService,
    pub notification_service: NotificationService,
    pub sse_broadcaster: SseBroadcaster,
}

/// Authentication middleware.
///
/// A valid `Authorization: Bearer <token>` header puts the user into the
/// request extensions. Anything else passes through unauthenticated.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        match state.user_service.authenticate_by_token(token).await {
            Ok(user) => {
                req.extensions_mut().insert(user);
            }
            Err(e) => {
                tracing::debug!(error = %e, "Rejected bearer token");
            }
        }
    }

    next.run(req).await
}
