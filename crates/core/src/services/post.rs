//! Post service.

use parley_common::{AppError, AppResult, IdGenerator};
use parley_db::{entities::post, repositories::PostRepository};
use sea_orm::Set;
use serde::Deserialize;
use validator::Validate;

/// Input for creating a post.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    #[validate(length(min = 1, max = 256))]
    pub title: String,

    #[validate(length(min = 1, max = 65536))]
    pub body: String,

    #[serde(default = "default_published")]
    pub is_published: bool,
}

const fn default_published() -> bool {
    true
}

/// Input for updating a post.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostInput {
    #[validate(length(min = 1, max = 256))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 65536))]
    pub body: Option<String>,

    pub is_published: Option<bool>,
}

/// Post service for business logic.
#[derive(Clone)]
pub struct PostService {
    post_repo: PostRepository,
    id_gen: IdGenerator,
}

impl PostService {
    /// Create a new post service.
    #[must_use]
    pub const fn new(post_repo: PostRepository) -> Self {
        Self {
            post_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a post.
    pub async fn create(&self, user_id: &str, input: CreatePostInput) -> AppResult<post::Model> {
        input.validate()?;

        let model = post::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(user_id.to_string()),
            title: Set(input.title),
            body: Set(input.body),
            is_published: Set(input.is_published),
            comments_count: Set(0),
            created_at: Set(chrono::Utc::now().into()),
            updated_at: Set(None),
        };

        self.post_repo.create(model).await
    }

    /// Get a post. Unpublished posts are only visible to their author.
    pub async fn get(&self, id: &str, viewer_id: Option<&str>) -> AppResult<post::Model> {
        let post = self.post_repo.get_by_id(id).await?;

        if !post.is_published && viewer_id != Some(post.user_id.as_str()) {
            return Err(AppError::PostNotFound(id.to_string()));
        }

        Ok(post)
    }

    /// Latest published posts.
    pub async fn list(&self, limit: u64, until_id: Option<&str>) -> AppResult<Vec<post::Model>> {
        self.post_repo.find_latest(limit, until_id, true).await
    }

    /// A user's posts; the author also sees their unpublished ones.
    pub async fn user_posts(
        &self,
        user_id: &str,
        viewer_id: Option<&str>,
        limit: u64,
        until_id: Option<&str>,
    ) -> AppResult<Vec<post::Model>> {
        let is_owner = viewer_id == Some(user_id);
        self.post_repo
            .find_by_user(user_id, limit, until_id, is_owner)
            .await
    }

    /// Update a post. Only the author may.
    pub async fn update(
        &self,
        user_id: &str,
        post_id: &str,
        input: UpdatePostInput,
    ) -> AppResult<post::Model> {
        input.validate()?;

        let post = self.get_owned(user_id, post_id).await?;
        let mut active: post::ActiveModel = post.into();

        if let Some(title) = input.title {
            active.title = Set(title);
        }
        if let Some(body) = input.body {
            active.body = Set(body);
        }
        if let Some(is_published) = input.is_published {
            active.is_published = Set(is_published);
        }
        active.updated_at = Set(Some(chrono::Utc::now().into()));

        self.post_repo.update(active).await
    }

    /// Delete a post. Only the author may.
    pub async fn delete(&self, user_id: &str, post_id: &str) -> AppResult<()> {
        self.get_owned(user_id, post_id).await?;
        self.post_repo.delete(post_id).await?;
        tracing::debug!(post_id = %post_id, "Post deleted");
        Ok(())
    }

    async fn get_owned(&self, user_id: &str, post_id: &str) -> AppResult<post::Model> {
        let post = self.post_repo.get_by_id(post_id).await?;
        if post.user_id != user_id {
            return Err(AppError::Forbidden("Not the author of this post".to_string()));
        }
        Ok(post)
    }
}
