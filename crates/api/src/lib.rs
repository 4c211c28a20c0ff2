//! HTTP API layer for Parley.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: accounts, posts, comments, notifications
//! - **Extractors**: token authentication
//! - **Streaming**: per-user Server-Sent Events
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod sse;

pub use endpoints::router;
pub use middleware::AppState;
pub use sse::{SseBroadcaster, SseEvent};
