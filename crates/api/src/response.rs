//! API response types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Standard API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response.
    pub const fn ok(data: T) -> Self {
        Self { data }
    }

    /// Create a `201 Created` response.
    pub const fn created(data: T) -> (StatusCode, Self) {
        (StatusCode::CREATED, Self { data })
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Empty success response.
#[must_use]
pub fn ok() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

/// Query parameters shared by list endpoints.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    /// Maximum results (default: 10, max: 100)
    pub limit: Option<u64>,
    /// Cursor: only items with a smaller ID
    pub until_id: Option<String>,
}

impl ListQuery {
    /// Effective page size.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit.unwrap_or(10).clamp(1, 100)
    }
}
