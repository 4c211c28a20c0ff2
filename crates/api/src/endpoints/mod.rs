//! API endpoints.

mod auth;
mod comments;
mod notifications;
mod posts;
mod users;

use axum::Router;

use crate::middleware::AppState;
use crate::sse;

pub use comments::{CommentResponse, MentionResponse};
pub use notifications::NotificationResponse;
pub use posts::PostResponse;
pub use users::{MeResponse, UserResponse};

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(users::me_router())
        .nest("/users", users::router())
        .nest("/posts", posts::router())
        .nest("/comments", comments::router())
        .nest("/notifications", notifications::router())
        .nest("/streaming/sse", sse::router())
}
