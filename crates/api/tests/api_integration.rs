//! API integration tests.
//!
//! These tests drive the full router, auth middleware included, against a
//! mock database whose results are queued in query order.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::redundant_clone)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    middleware,
    response::Response,
};
use chrono::Utc;
use parley_api::{AppState, SseBroadcaster, middleware::auth_middleware, router as api_router};
use parley_common::config::ServerConfig;
use parley_core::{
    CommentService, NoOpDispatcher, NotificationService, PostService, UserService,
};
use parley_db::entities::{comment, comment_mention, notification, post, user};
use parley_db::repositories::{
    CommentMentionRepository, CommentRepository, NotificationRepository, PostRepository,
    UserRepository,
};
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
use tower::ServiceExt;

const TOKEN: &str = "alice_token";

fn create_test_server() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 3000,
        url: "https://example.com".to_string(),
    }
}

/// Build the router over a prepared mock database.
fn create_test_router(db: MockDatabase) -> Router {
    let db = Arc::new(db.into_connection());

    let user_repo = UserRepository::new(Arc::clone(&db));
    let post_repo = PostRepository::new(Arc::clone(&db));
    let comment_repo = CommentRepository::new(Arc::clone(&db));
    let mention_repo = CommentMentionRepository::new(Arc::clone(&db));
    let notification_repo = NotificationRepository::new(Arc::clone(&db));

    let state = AppState {
        server: create_test_server(),
        user_service: UserService::new(user_repo.clone()),
        post_service: PostService::new(post_repo.clone()),
        comment_service: CommentService::new(
            comment_repo,
            post_repo,
            user_repo,
            mention_repo,
            Arc::new(NoOpDispatcher),
        ),
        notification_service: NotificationService::new(notification_repo),
        sse_broadcaster: SseBroadcaster::new(),
    };

    api_router()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}

fn mock_db() -> MockDatabase {
    MockDatabase::new(DatabaseBackend::Postgres)
}

fn exec_ok() -> MockExecResult {
    MockExecResult {
        last_insert_id: 0,
        rows_affected: 1,
    }
}

fn test_user(id: &str, username: &str) -> user::Model {
    user::Model {
        id: id.to_string(),
        username: username.to_string(),
        name: username.to_string(),
        email: format!("{username}@example.com"),
        token: Some(format!("{username}_token")),
        created_at: Utc::now().into(),
        updated_at: None,
    }
}

fn test_post(id: &str, user_id: &str) -> post::Model {
    post::Model {
        id: id.to_string(),
        user_id: user_id.to_string(),
        title: "Hello".to_string(),
        body: "World".to_string(),
        is_published: true,
        comments_count: 0,
        created_at: Utc::now().into(),
        updated_at: None,
    }
}

fn test_comment(id: &str, user_id: &str, body: &str) -> comment::Model {
    comment::Model {
        id: id.to_string(),
        post_id: "post1".to_string(),
        user_id: user_id.to_string(),
        body: body.to_string(),
        created_at: Utc::now().into(),
        updated_at: None,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("GET")
        .body(Body::empty())
        .unwrap()
}

fn authed(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(method)
        .header("Authorization", format!("Bearer {TOKEN}"))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unknown_endpoint_returns_404() {
    let app = create_test_router(mock_db());

    let response = app.oneshot(get("/nonexistent/endpoint")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_me_requires_auth() {
    let app = create_test_router(mock_db());

    let response = app.oneshot(get("/i")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_me_with_unknown_token_is_unauthorized() {
    let db = mock_db().append_query_results([Vec::<user::Model>::new()]);
    let app = create_test_router(db);

    let response = app.oneshot(authed("GET", "/i", "")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_current_user() {
    let db = mock_db().append_query_results([[test_user("user1", "alice")]]);
    let app = create_test_router(db);

    let response = app.oneshot(authed("GET", "/i", "")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["email"], "alice@example.com");
    assert_eq!(
        body["data"]["profileUrl"],
        "https://example.com/api/users/alice"
    );
    assert!(body["data"].get("token").is_none());
}

#[tokio::test]
async fn test_signup_with_invalid_json_returns_error() {
    let app = create_test_router(mock_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/signup")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from("invalid json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_signup_rejects_bad_username() {
    let app = create_test_router(mock_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/signup")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"username":"bad name","name":"Bad","email":"bad@example.com"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_signup_issues_token() {
    let db = mock_db()
        .append_query_results([Vec::<user::Model>::new()])
        .append_query_results([Vec::<user::Model>::new()])
        .append_query_results([[test_user("user1", "alice")]]);
    let app = create_test_router(db);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/signup")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"username":"alice","name":"Alice","email":"alice@example.com"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["data"]["username"], "alice");
    assert!(body["data"]["token"].is_string());
}

#[tokio::test]
async fn test_create_comment_returns_mentions() {
    let db = mock_db()
        // auth
        .append_query_results([[test_user("user1", "alice")]])
        // post lookup, comment insert, count bump
        .append_query_results([[test_post("post1", "user1")]])
        .append_query_results([[test_comment("c1", "user1", "cc @bob @ghost")]])
        .append_exec_results([exec_ok()])
        // mention resolution and replace
        .append_query_results([[test_user("user2", "bob")]])
        .append_query_results([Vec::<comment_mention::Model>::new()])
        .append_exec_results([exec_ok()]);
    let app = create_test_router(db);

    let response = app
        .oneshot(authed(
            "POST",
            "/posts/post1/comments",
            r#"{"body":"cc @bob @ghost"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let mentions = body["data"]["mentions"].as_array().unwrap();
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0]["username"], "bob");
    assert_eq!(
        mentions[0]["profileUrl"],
        "https://example.com/api/users/bob"
    );
    assert_eq!(body["data"]["user"]["username"], "alice");
}

#[tokio::test]
async fn test_create_comment_requires_auth() {
    let app = create_test_router(mock_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/posts/post1/comments")
                .method("POST")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"body":"hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_comments_includes_mentions() {
    let mention = comment_mention::Model {
        id: "m1".to_string(),
        comment_id: "c1".to_string(),
        user_id: "user2".to_string(),
        created_at: Utc::now().into(),
    };

    let db = mock_db()
        .append_query_results([[test_post("post1", "user1")]])
        .append_query_results([[test_comment("c1", "user1", "hey @bob")]])
        .append_query_results([[mention]])
        .append_query_results([vec![test_user("user1", "alice"), test_user("user2", "bob")]]);
    let app = create_test_router(db);

    let response = app.oneshot(get("/posts/post1/comments")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let comments = body["data"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["mentions"][0]["id"], "user2");
}

#[tokio::test]
async fn test_missing_post_returns_404() {
    let db = mock_db().append_query_results([Vec::<post::Model>::new()]);
    let app = create_test_router(db);

    let response = app.oneshot(get("/posts/nope")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "POST_NOT_FOUND");
}

#[tokio::test]
async fn test_list_notifications() {
    let n = notification::Model {
        id: "n1".to_string(),
        notifiee_id: "user1".to_string(),
        notifier_id: Some("user2".to_string()),
        notification_type: notification::NotificationType::Mention,
        comment_id: Some("c1".to_string()),
        data: serde_json::json!({
            "comment_id": "c1",
            "body": "hi @alice",
            "user": { "id": "user2", "username": "bob" }
        }),
        is_read: false,
        created_at: Utc::now().into(),
    };

    let db = mock_db()
        .append_query_results([[test_user("user1", "alice")]])
        .append_query_results([[n]]);
    let app = create_test_router(db);

    let response = app
        .oneshot(authed("GET", "/notifications?limit=5&unreadOnly=true", ""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"][0]["type"], "mention");
    assert_eq!(body["data"][0]["data"]["user"]["username"], "bob");
}

#[tokio::test]
async fn test_read_other_users_notification_returns_404() {
    let n = notification::Model {
        id: "n1".to_string(),
        notifiee_id: "user9".to_string(),
        notifier_id: None,
        notification_type: notification::NotificationType::Mention,
        comment_id: None,
        data: serde_json::json!({}),
        is_read: false,
        created_at: Utc::now().into(),
    };

    let db = mock_db()
        .append_query_results([[test_user("user1", "alice")]])
        .append_query_results([[n]]);
    let app = create_test_router(db);

    let response = app
        .oneshot(authed("POST", "/notifications/n1/read", ""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sse_user_stream_requires_auth() {
    let app = create_test_router(mock_db());

    let response = app.oneshot(get("/streaming/sse/user")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sse_user_stream_returns_event_stream() {
    let db = mock_db().append_query_results([[test_user("user1", "alice")]]);
    let app = create_test_router(db);

    let response = app
        .oneshot(authed("GET", "/streaming/sse/user", ""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap_or(""));
    assert!(content_type.unwrap().contains("text/event-stream"));
}
