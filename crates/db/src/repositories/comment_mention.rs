//! Comment mention repository.

use std::collections::HashSet;
use std::sync::Arc;

use crate::entities::{CommentMention, comment_mention};
use chrono::Utc;
use parley_common::{AppError, AppResult, IdGenerator};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};

/// Result of replacing a comment's mention set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionDiff {
    /// Users that were not mentioned before.
    pub added: Vec<String>,
    /// Users no longer mentioned.
    pub removed: Vec<String>,
}

impl MentionDiff {
    /// Whether the stored set changed.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Comment mention repository for database operations.
#[derive(Clone)]
pub struct CommentMentionRepository {
    db: Arc<DatabaseConnection>,
    id_gen: IdGenerator,
}

impl CommentMentionRepository {
    /// Create a new comment mention repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            id_gen: IdGenerator::new(),
        }
    }

    /// IDs of the users currently mentioned in a comment.
    pub async fn find_user_ids_by_comment(&self, comment_id: &str) -> AppResult<Vec<String>> {
        let rows = CommentMention::find()
            .filter(comment_mention::Column::CommentId.eq(comment_id))
            .order_by_asc(comment_mention::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(|m| m.user_id).collect())
    }

    /// Mention rows for several comments at once.
    pub async fn find_by_comments(
        &self,
        comment_ids: &[String],
    ) -> AppResult<Vec<comment_mention::Model>> {
        if comment_ids.is_empty() {
            return Ok(vec![]);
        }

        CommentMention::find()
            .filter(comment_mention::Column::CommentId.is_in(comment_ids.to_vec()))
            .order_by_asc(comment_mention::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Replace the mention set of a comment with exactly `user_ids`.
    ///
    /// Runs in one transaction: rows no longer referenced are deleted, new
    /// ones inserted, unchanged ones left alone. Duplicate IDs collapse.
    pub async fn replace_for_comment(
        &self,
        comment_id: &str,
        user_ids: &[String],
    ) -> AppResult<MentionDiff> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let existing: HashSet<String> = CommentMention::find()
            .filter(comment_mention::Column::CommentId.eq(comment_id))
            .all(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .into_iter()
            .map(|m| m.user_id)
            .collect();

        let mut seen: HashSet<&str> = HashSet::new();
        let mut wanted = Vec::with_capacity(user_ids.len());
        for id in user_ids {
            if seen.insert(id.as_str()) {
                wanted.push(id.clone());
            }
        }

        let added: Vec<String> = wanted
            .iter()
            .filter(|id| !existing.contains(*id))
            .cloned()
            .collect();
        let mut removed: Vec<String> = existing
            .into_iter()
            .filter(|id| !seen.contains(id.as_str()))
            .collect();
        removed.sort();

        if !removed.is_empty() {
            CommentMention::delete_many()
                .filter(comment_mention::Column::CommentId.eq(comment_id))
                .filter(comment_mention::Column::UserId.is_in(removed.clone()))
                .exec(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        if !added.is_empty() {
            let now = Utc::now();
            let rows = added.iter().map(|user_id| comment_mention::ActiveModel {
                id: Set(self.id_gen.generate()),
                comment_id: Set(comment_id.to_string()),
                user_id: Set(user_id.clone()),
                created_at: Set(now.into()),
            });

            CommentMention::insert_many(rows)
                .exec_without_returning(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(MentionDiff { added, removed })
    }
}
