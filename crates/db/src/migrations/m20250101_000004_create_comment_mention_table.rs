//! Create comment_mention table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CommentMention::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CommentMention::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CommentMention::CommentId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CommentMention::UserId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CommentMention::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comment_mention_comment")
                            .from(CommentMention::Table, CommentMention::CommentId)
                            .to(Comment::Table, Comment::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_comment_mention_user")
                            .from(CommentMention::Table, CommentMention::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (comment_id, user_id) - a user is mentioned at most once per comment
        manager
            .create_index(
                Index::create()
                    .name("idx_comment_mention_comment_user")
                    .table(CommentMention::Table)
                    .col(CommentMention::CommentId)
                    .col(CommentMention::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: user_id (for "where was I mentioned")
        manager
            .create_index(
                Index::create()
                    .name("idx_comment_mention_user_id")
                    .table(CommentMention::Table)
                    .col(CommentMention::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CommentMention::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum CommentMention {
    Table,
    Id,
    CommentId,
    UserId,
    CreatedAt,
}

#[derive(Iden)]
enum Comment {
    Table,
    Id,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
