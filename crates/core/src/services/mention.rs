//! Mention detection for comments.
//!
//! A comment body is scanned for `@username` tokens. The tokens are resolved
//! against the user store, the comment's mention relation is replaced with
//! exactly the resolved set, and every resolved user gets one notification.
//!
//! The processor runs synchronously inside the request that saved the
//! comment. Notification delivery does not: it is handed to a
//! [`NotificationDispatcher`](crate::services::dispatch::NotificationDispatcher)
//! and may fail independently.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use parley_common::AppResult;
use parley_db::{
    entities::comment,
    repositories::{CommentMentionRepository, MentionDiff, UserRepository},
};
use regex::Regex;
use tracing::{debug, warn};

use crate::services::dispatch::{MentionAuthor, MentionNotification, NotificationDispatcherService};

#[allow(clippy::expect_used)]
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z0-9_-]+)").expect("valid mention regex"));

/// Extract candidate usernames from text, in order of appearance.
///
/// Matching is case-sensitive and duplicates are kept.
#[must_use]
pub fn extract_mentions(text: &str) -> Vec<String> {
    MENTION_RE
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// A user resolved from a mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionedUser {
    pub id: String,
    pub username: String,
}

/// Store operations needed by [`MentionProcessor`].
#[async_trait]
pub trait MentionStore: Send + Sync {
    /// Users whose username is exactly one of `usernames`. Unknown names are omitted.
    async fn find_users_by_usernames(&self, usernames: &[String])
    -> AppResult<Vec<MentionedUser>>;

    /// Make the comment's mention set exactly `user_ids`, atomically.
    async fn replace_mentions(&self, comment_id: &str, user_ids: &[String])
    -> AppResult<MentionDiff>;
}

/// [`MentionStore`] backed by the database repositories.
#[derive(Clone)]
pub struct RepositoryMentionStore {
    user_repo: UserRepository,
    mention_repo: CommentMentionRepository,
}

impl RepositoryMentionStore {
    #[must_use]
    pub const fn new(user_repo: UserRepository, mention_repo: CommentMentionRepository) -> Self {
        Self {
            user_repo,
            mention_repo,
        }
    }
}

#[async_trait]
impl MentionStore for RepositoryMentionStore {
    async fn find_users_by_usernames(
        &self,
        usernames: &[String],
    ) -> AppResult<Vec<MentionedUser>> {
        let users = self.user_repo.find_by_usernames(usernames).await?;
        Ok(users
            .into_iter()
            .map(|u| MentionedUser {
                id: u.id,
                username: u.username,
            })
            .collect())
    }

    async fn replace_mentions(
        &self,
        comment_id: &str,
        user_ids: &[String],
    ) -> AppResult<MentionDiff> {
        self.mention_repo
            .replace_for_comment(comment_id, user_ids)
            .await
    }
}

/// Result of processing one comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionOutcome {
    /// Resolved users, in order of first mention.
    pub mentioned: Vec<MentionedUser>,
    /// How the stored relation changed.
    pub diff: MentionDiff,
    /// Notifications handed to the dispatcher.
    pub dispatched: usize,
    /// Notifications the dispatcher refused.
    pub dispatch_failures: usize,
}

/// Detects mentions in a comment and notifies the mentioned users.
#[derive(Clone)]
pub struct MentionProcessor {
    store: Arc<dyn MentionStore>,
    dispatcher: NotificationDispatcherService,
}

impl MentionProcessor {
    #[must_use]
    pub fn new(store: Arc<dyn MentionStore>, dispatcher: NotificationDispatcherService) -> Self {
        Self { store, dispatcher }
    }

    /// Process a freshly created or edited comment written by `author`.
    ///
    /// Store failures are returned; the comment itself is already saved and
    /// stays saved. Dispatch failures are logged and counted, never returned.
    /// Every resolved user is notified on every call, including users who
    /// were already mentioned before an edit.
    pub async fn process(
        &self,
        comment: &comment::Model,
        author: &MentionAuthor,
    ) -> AppResult<MentionOutcome> {
        let candidates = extract_mentions(&comment.body);

        if candidates.is_empty() {
            let diff = self.store.replace_mentions(&comment.id, &[]).await?;
            return Ok(MentionOutcome {
                diff,
                ..MentionOutcome::default()
            });
        }

        let mut seen = HashSet::new();
        let usernames: Vec<String> = candidates
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect();

        let mut mentioned = self.store.find_users_by_usernames(&usernames).await?;
        mentioned.sort_by_key(|u| usernames.iter().position(|name| *name == u.username));

        let user_ids: Vec<String> = mentioned.iter().map(|u| u.id.clone()).collect();
        let diff = self.store.replace_mentions(&comment.id, &user_ids).await?;

        debug!(
            comment_id = %comment.id,
            candidates = usernames.len(),
            resolved = mentioned.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Synced comment mentions"
        );

        let mut outcome = MentionOutcome {
            mentioned,
            diff,
            ..MentionOutcome::default()
        };

        for user in &outcome.mentioned {
            let payload = MentionNotification {
                comment_id: comment.id.clone(),
                body: comment.body.clone(),
                user: author.clone(),
            };

            match self.dispatcher.dispatch(&user.id, payload).await {
                Ok(()) => outcome.dispatched += 1,
                Err(e) => {
                    outcome.dispatch_failures += 1;
                    warn!(
                        error = %e,
                        comment_id = %comment.id,
                        recipient_id = %user.id,
                        "Failed to dispatch mention notification"
                    );
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::dispatch::NotificationDispatcher;
    use chrono::Utc;
    use maplit::hashset;
    use parley_common::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory user table and mention relation.
    #[derive(Default)]
    struct MemoryStore {
        users: Vec<MentionedUser>,
        relation: Mutex<HashMap<String, HashSet<String>>>,
        fail_lookup: bool,
    }

    impl MemoryStore {
        fn with_users(names: &[&str]) -> Self {
            Self {
                users: names
                    .iter()
                    .map(|n| MentionedUser {
                        id: format!("id-{n}"),
                        username: (*n).to_string(),
                    })
                    .collect(),
                ..Self::default()
            }
        }

        fn mentions_of(&self, comment_id: &str) -> HashSet<String> {
            self.relation
                .lock()
                .unwrap()
                .get(comment_id)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl MentionStore for MemoryStore {
        async fn find_users_by_usernames(
            &self,
            usernames: &[String],
        ) -> AppResult<Vec<MentionedUser>> {
            if self.fail_lookup {
                return Err(AppError::Database("connection reset".to_string()));
            }
            Ok(self
                .users
                .iter()
                .filter(|u| usernames.contains(&u.username))
                .cloned()
                .collect())
        }

        async fn replace_mentions(
            &self,
            comment_id: &str,
            user_ids: &[String],
        ) -> AppResult<MentionDiff> {
            let mut relation = self.relation.lock().unwrap();
            let existing = relation.remove(comment_id).unwrap_or_default();
            let wanted: HashSet<String> = user_ids.iter().cloned().collect();

            let mut added: Vec<String> = wanted.difference(&existing).cloned().collect();
            let mut removed: Vec<String> = existing.difference(&wanted).cloned().collect();
            added.sort();
            removed.sort();

            relation.insert(comment_id.to_string(), wanted);
            Ok(MentionDiff { added, removed })
        }
    }

    /// Records every dispatched notification.
    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<(String, MentionNotification)>>,
        fail_for: Option<String>,
    }

    impl RecordingDispatcher {
        fn sent(&self) -> Vec<(String, MentionNotification)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationDispatcher for RecordingDispatcher {
        async fn dispatch(
            &self,
            recipient_id: &str,
            payload: MentionNotification,
        ) -> AppResult<()> {
            if self.fail_for.as_deref() == Some(recipient_id) {
                return Err(AppError::Queue("queue full".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((recipient_id.to_string(), payload));
            Ok(())
        }
    }

    fn comment(id: &str, body: &str) -> comment::Model {
        comment::Model {
            id: id.to_string(),
            post_id: "post1".to_string(),
            user_id: "id-author".to_string(),
            body: body.to_string(),
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    fn author() -> MentionAuthor {
        MentionAuthor {
            id: "id-author".to_string(),
            username: "author".to_string(),
        }
    }

    fn processor(
        store: Arc<MemoryStore>,
        dispatcher: Arc<RecordingDispatcher>,
    ) -> MentionProcessor {
        MentionProcessor::new(store, dispatcher)
    }

    #[test]
    fn test_extract_mentions_order_and_duplicates() {
        assert_eq!(
            extract_mentions("@alice @bob @alice"),
            vec!["alice", "bob", "alice"]
        );
    }

    #[test]
    fn test_extract_mentions_charset() {
        assert_eq!(
            extract_mentions("Great post @charlie! cc @dash-user_2, @"),
            vec!["charlie", "dash-user_2"]
        );
        assert!(extract_mentions("").is_empty());
        assert!(extract_mentions("no mentions here").is_empty());
    }

    #[test]
    fn test_extract_mentions_is_case_sensitive() {
        assert_eq!(extract_mentions("@Alice"), vec!["Alice"]);
    }

    #[tokio::test]
    async fn test_duplicate_mentions_collapse() {
        let store = Arc::new(MemoryStore::with_users(&["alice", "bob"]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let processor = processor(Arc::clone(&store), Arc::clone(&dispatcher));

        let outcome = processor
            .process(&comment("c1", "@alice @bob @alice"), &author())
            .await
            .unwrap();

        assert_eq!(
            store.mentions_of("c1"),
            hashset! {"id-alice".to_string(), "id-bob".to_string()}
        );
        assert_eq!(outcome.dispatched, 2);
        let recipients: Vec<String> = dispatcher.sent().into_iter().map(|(r, _)| r).collect();
        assert_eq!(recipients, vec!["id-alice", "id-bob"]);
    }

    #[tokio::test]
    async fn test_unknown_user_is_ignored() {
        let store = Arc::new(MemoryStore::with_users(&["alice"]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let processor = processor(Arc::clone(&store), Arc::clone(&dispatcher));

        let outcome = processor
            .process(&comment("c1", "@nosuchuser"), &author())
            .await
            .unwrap();

        assert!(outcome.mentioned.is_empty());
        assert!(store.mentions_of("c1").is_empty());
        assert!(dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_edit_replaces_mentions() {
        let store = Arc::new(MemoryStore::with_users(&["alice", "bob"]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let processor = processor(Arc::clone(&store), Arc::clone(&dispatcher));

        processor
            .process(&comment("c1", "hi @alice"), &author())
            .await
            .unwrap();
        let outcome = processor
            .process(&comment("c1", "hi @bob"), &author())
            .await
            .unwrap();

        assert_eq!(store.mentions_of("c1"), hashset! {"id-bob".to_string()});
        assert_eq!(outcome.diff.added, vec!["id-bob".to_string()]);
        assert_eq!(outcome.diff.removed, vec!["id-alice".to_string()]);
    }

    #[tokio::test]
    async fn test_edit_removing_all_mentions_clears_relation() {
        let store = Arc::new(MemoryStore::with_users(&["alice"]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let processor = processor(Arc::clone(&store), Arc::clone(&dispatcher));

        processor
            .process(&comment("c1", "hi @alice"), &author())
            .await
            .unwrap();
        let outcome = processor
            .process(&comment("c1", "hi everyone"), &author())
            .await
            .unwrap();

        assert!(store.mentions_of("c1").is_empty());
        assert_eq!(outcome.diff.removed, vec!["id-alice".to_string()]);
        assert_eq!(dispatcher.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_reprocessing_renotifies() {
        let store = Arc::new(MemoryStore::with_users(&["alice"]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let processor = processor(Arc::clone(&store), Arc::clone(&dispatcher));

        let c = comment("c1", "hi @alice");
        processor.process(&c, &author()).await.unwrap();
        let outcome = processor.process(&c, &author()).await.unwrap();

        assert!(outcome.diff.is_unchanged());
        assert_eq!(store.mentions_of("c1"), hashset! {"id-alice".to_string()});
        assert_eq!(dispatcher.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_notification_payload() {
        let store = Arc::new(MemoryStore::with_users(&["charlie"]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let processor = processor(Arc::clone(&store), Arc::clone(&dispatcher));

        processor
            .process(&comment("c42", "Great post @charlie!"), &author())
            .await
            .unwrap();

        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 1);
        let (recipient, payload) = &sent[0];
        assert_eq!(recipient, "id-charlie");
        assert_eq!(payload.comment_id, "c42");
        assert_eq!(payload.body, "Great post @charlie!");
        assert_eq!(payload.user.username, "author");
    }

    #[tokio::test]
    async fn test_empty_body() {
        let store = Arc::new(MemoryStore::with_users(&["alice"]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let processor = processor(Arc::clone(&store), Arc::clone(&dispatcher));

        let outcome = processor
            .process(&comment("c1", ""), &author())
            .await
            .unwrap();

        assert_eq!(outcome, MentionOutcome::default());
        assert!(dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_lookup_failure_propagates() {
        let store = Arc::new(MemoryStore {
            fail_lookup: true,
            ..MemoryStore::with_users(&["alice"])
        });
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let processor = processor(Arc::clone(&store), Arc::clone(&dispatcher));

        let result = processor
            .process(&comment("c1", "hi @alice"), &author())
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert!(dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_does_not_affect_relation() {
        let store = Arc::new(MemoryStore::with_users(&["alice", "bob"]));
        let dispatcher = Arc::new(RecordingDispatcher {
            fail_for: Some("id-alice".to_string()),
            ..RecordingDispatcher::default()
        });
        let processor = processor(Arc::clone(&store), Arc::clone(&dispatcher));

        let outcome = processor
            .process(&comment("c1", "@alice @bob"), &author())
            .await
            .unwrap();

        assert_eq!(outcome.dispatched, 1);
        assert_eq!(outcome.dispatch_failures, 1);
        assert_eq!(
            store.mentions_of("c1"),
            hashset! {"id-alice".to_string(), "id-bob".to_string()}
        );
    }
}
