//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `parley_test`)
//!   `TEST_DB_PASSWORD` (default: `parley_test`)
//!   `TEST_DB_NAME` (default: `parley_test`)

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::Utc;
use parley_db::entities::{comment, post, user};
use parley_db::repositories::{
    CommentMentionRepository, CommentRepository, PostRepository, UserRepository,
};
use parley_db::test_utils::{TestDatabase, TestDbConfig};
use sea_orm::Set;

async fn seed_user(repo: &UserRepository, id: &str, username: &str) -> user::Model {
    repo.create(user::ActiveModel {
        id: Set(id.to_string()),
        username: Set(username.to_string()),
        name: Set(username.to_string()),
        email: Set(format!("{username}@example.com")),
        token: Set(Some(format!("token-{id}"))),
        created_at: Set(Utc::now().into()),
        updated_at: Set(None),
    })
    .await
    .unwrap()
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_database_connection() {
    let result = TestDatabase::with_config(TestDbConfig::default()).await;
    assert!(result.is_ok(), "Failed to connect: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_mention_replace_round_trip() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();
    let conn = Arc::clone(&db.conn);

    let users = UserRepository::new(Arc::clone(&conn));
    let posts = PostRepository::new(Arc::clone(&conn));
    let comments = CommentRepository::new(Arc::clone(&conn));
    let mentions = CommentMentionRepository::new(Arc::clone(&conn));

    let author = seed_user(&users, "u-author", "author").await;
    let alice = seed_user(&users, "u-alice", "alice").await;
    let bob = seed_user(&users, "u-bob", "bob").await;

    posts
        .create(post::ActiveModel {
            id: Set("p1".to_string()),
            user_id: Set(author.id.clone()),
            title: Set("Hello".to_string()),
            body: Set("World".to_string()),
            is_published: Set(true),
            comments_count: Set(0),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        })
        .await
        .unwrap();

    comments
        .create(comment::ActiveModel {
            id: Set("c1".to_string()),
            post_id: Set("p1".to_string()),
            user_id: Set(author.id.clone()),
            body: Set("hi @alice".to_string()),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        })
        .await
        .unwrap();

    let diff = mentions
        .replace_for_comment("c1", &[alice.id.clone()])
        .await
        .unwrap();
    assert_eq!(diff.added, vec![alice.id.clone()]);

    let diff = mentions
        .replace_for_comment("c1", &[bob.id.clone()])
        .await
        .unwrap();
    assert_eq!(diff.added, vec![bob.id.clone()]);
    assert_eq!(diff.removed, vec![alice.id.clone()]);

    let ids = mentions.find_user_ids_by_comment("c1").await.unwrap();
    assert_eq!(ids, vec![bob.id.clone()]);

    comments.delete("c1").await.unwrap();
    assert!(mentions.find_user_ids_by_comment("c1").await.unwrap().is_empty());

    db.cleanup().await.unwrap();
}

#[test]
fn test_config_from_env() {
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(!config.username.is_empty());
    assert!(!config.database.is_empty());
}
