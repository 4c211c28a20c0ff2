//! Notification entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Notification types.
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "camelCase")]
pub enum NotificationType {
    #[sea_orm(string_value = "mention")]
    Mention,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// The user receiving the notification
    pub notifiee_id: String,

    /// The user who triggered the notification
    #[sea_orm(nullable)]
    pub notifier_id: Option<String>,

    pub notification_type: NotificationType,

    #[sea_orm(nullable)]
    pub comment_id: Option<String>,

    /// Payload snapshot taken when the notification was raised
    #[sea_orm(column_type = "JsonBinary")]
    pub data: Json,

    #[sea_orm(default_value = false)]
    pub is_read: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::NotifieeId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Notifiee,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::NotifierId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    Notifier,

    #[sea_orm(
        belongs_to = "super::comment::Entity",
        from = "Column::CommentId",
        to = "super::comment::Column::Id",
        on_delete = "Cascade"
    )]
    Comment,
}

impl ActiveModelBehavior for ActiveModel {}
