//! Comment service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parley_common::{AppError, AppResult, IdGenerator};
use parley_db::{
    entities::{comment, post, user},
    repositories::{CommentMentionRepository, CommentRepository, PostRepository, UserRepository},
};
use sea_orm::Set;
use serde::Deserialize;
use tracing::warn;
use validator::Validate;

use crate::services::dispatch::{MentionAuthor, NotificationDispatcherService};
use crate::services::mention::{MentionProcessor, MentionedUser, RepositoryMentionStore};

/// Input for creating a comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentInput {
    #[validate(length(min = 1, max = 10000))]
    pub body: String,
}

/// Input for editing a comment.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentInput {
    #[validate(length(min = 1, max = 10000))]
    pub body: String,
}

/// A comment with its author and mentioned users.
#[derive(Debug, Clone)]
pub struct CommentView {
    pub comment: comment::Model,
    pub author: user::Model,
    pub mentions: Vec<MentionedUser>,
}

/// Comment service for business logic.
#[derive(Clone)]
pub struct CommentService {
    comment_repo: CommentRepository,
    post_repo: PostRepository,
    user_repo: UserRepository,
    mention_repo: CommentMentionRepository,
    mentions: MentionProcessor,
    id_gen: IdGenerator,
}

impl CommentService {
    /// Create a new comment service.
    #[must_use]
    pub fn new(
        comment_repo: CommentRepository,
        post_repo: PostRepository,
        user_repo: UserRepository,
        mention_repo: CommentMentionRepository,
        dispatcher: NotificationDispatcherService,
    ) -> Self {
        let store = Arc::new(RepositoryMentionStore::new(
            user_repo.clone(),
            mention_repo.clone(),
        ));

        Self {
            comment_repo,
            post_repo,
            user_repo,
            mention_repo,
            mentions: MentionProcessor::new(store, dispatcher),
            id_gen: IdGenerator::new(),
        }
    }

    /// Comment on a post the author can see.
    pub async fn create(
        &self,
        author: &user::Model,
        post_id: &str,
        input: CreateCommentInput,
    ) -> AppResult<CommentView> {
        input.validate()?;

        self.visible_post(post_id, Some(&author.id)).await?;

        let model = comment::ActiveModel {
            id: Set(self.id_gen.generate()),
            post_id: Set(post_id.to_string()),
            user_id: Set(author.id.clone()),
            body: Set(input.body),
            created_at: Set(chrono::Utc::now().into()),
            updated_at: Set(None),
        };

        let comment = self.comment_repo.create(model).await?;
        let mentions = self
            .sync_mentions(&comment, author)
            .await
            .unwrap_or_default();

        if let Err(e) = self.post_repo.increment_comments_count(post_id).await {
            warn!(error = %e, post_id = %post_id, "Failed to bump comments count");
        }

        Ok(CommentView {
            comment,
            author: author.clone(),
            mentions,
        })
    }

    /// Edit a comment. Only its author may; mentions are re-processed.
    pub async fn update(
        &self,
        author: &user::Model,
        comment_id: &str,
        input: UpdateCommentInput,
    ) -> AppResult<CommentView> {
        input.validate()?;

        let comment = self.get_owned(&author.id, comment_id).await?;

        let mut active: comment::ActiveModel = comment.into();
        active.body = Set(input.body);
        active.updated_at = Set(Some(chrono::Utc::now().into()));

        let comment = self.comment_repo.update(active).await?;
        let mentions = match self.sync_mentions(&comment, author).await {
            Some(mentions) => mentions,
            None => self
                .stored_mentions(&comment.id)
                .await
                .unwrap_or_else(|e| {
                    warn!(error = %e, comment_id = %comment.id, "Failed to load stored mentions");
                    vec![]
                }),
        };

        Ok(CommentView {
            comment,
            author: author.clone(),
            mentions,
        })
    }

    /// Delete a comment. Only its author may.
    pub async fn delete(&self, user_id: &str, comment_id: &str) -> AppResult<()> {
        let comment = self.get_owned(user_id, comment_id).await?;

        self.comment_repo.delete(comment_id).await?;
        self.post_repo
            .decrement_comments_count(&comment.post_id)
            .await?;

        Ok(())
    }

    /// Get one comment.
    pub async fn get(&self, comment_id: &str, viewer_id: Option<&str>) -> AppResult<CommentView> {
        let comment = self.comment_repo.get_by_id(comment_id).await?;
        self.visible_post(&comment.post_id, viewer_id).await?;

        let author = self.user_repo.get_by_id(&comment.user_id).await?;
        let mentions = self.stored_mentions(&comment.id).await?;

        Ok(CommentView {
            comment,
            author,
            mentions,
        })
    }

    /// Comments on a post, newest first.
    pub async fn list_for_post(
        &self,
        post_id: &str,
        viewer_id: Option<&str>,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<CommentView>> {
        self.visible_post(post_id, viewer_id).await?;

        let comments = self
            .comment_repo
            .find_by_post(post_id, limit, until_id)
            .await?;
        if comments.is_empty() {
            return Ok(vec![]);
        }

        let comment_ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();
        let mention_rows = self.mention_repo.find_by_comments(&comment_ids).await?;

        let user_ids: Vec<String> = comments
            .iter()
            .map(|c| c.user_id.clone())
            .chain(mention_rows.iter().map(|m| m.user_id.clone()))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let users: HashMap<String, user::Model> = self
            .user_repo
            .find_by_ids(&user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let mut mentions_by_comment: HashMap<String, Vec<MentionedUser>> = HashMap::new();
        for row in mention_rows {
            if let Some(u) = users.get(&row.user_id) {
                mentions_by_comment
                    .entry(row.comment_id)
                    .or_default()
                    .push(MentionedUser {
                        id: u.id.clone(),
                        username: u.username.clone(),
                    });
            }
        }

        Ok(comments
            .into_iter()
            .filter_map(|comment| {
                let author = users.get(&comment.user_id)?.clone();
                let mentions = mentions_by_comment.remove(&comment.id).unwrap_or_default();
                Some(CommentView {
                    comment,
                    author,
                    mentions,
                })
            })
            .collect())
    }

    /// Run mention processing. A failure here never fails the save; it
    /// yields `None` and the stored relation is left as it was.
    async fn sync_mentions(
        &self,
        comment: &comment::Model,
        author: &user::Model,
    ) -> Option<Vec<MentionedUser>> {
        match self
            .mentions
            .process(comment, &MentionAuthor::from(author))
            .await
        {
            Ok(outcome) => Some(outcome.mentioned),
            Err(e) => {
                warn!(error = %e, comment_id = %comment.id, "Mention processing failed");
                None
            }
        }
    }

    /// Users currently in a comment's mention relation.
    async fn stored_mentions(&self, comment_id: &str) -> AppResult<Vec<MentionedUser>> {
        let mentioned_ids = self.mention_repo.find_user_ids_by_comment(comment_id).await?;

        Ok(self
            .user_repo
            .find_by_ids(&mentioned_ids)
            .await?
            .into_iter()
            .map(|u| MentionedUser {
                id: u.id,
                username: u.username,
            })
            .collect())
    }

    async fn visible_post(&self, post_id: &str, viewer_id: Option<&str>) -> AppResult<post::Model> {
        let post = self.post_repo.get_by_id(post_id).await?;
        if !post.is_published && viewer_id != Some(post.user_id.as_str()) {
            return Err(AppError::PostNotFound(post_id.to_string()));
        }
        Ok(post)
    }

    async fn get_owned(&self, user_id: &str, comment_id: &str) -> AppResult<comment::Model> {
        let comment = self.comment_repo.get_by_id(comment_id).await?;
        if comment.user_id != user_id {
            return Err(AppError::Forbidden(
                "Not the author of this comment".to_string(),
            ));
        }
        Ok(comment)
    }
}
