//! Database repositories.

mod comment;
mod comment_mention;
mod notification;
mod post;
mod user;

pub use comment::CommentRepository;
pub use comment_mention::{CommentMentionRepository, MentionDiff};
pub use notification::NotificationRepository;
pub use post::PostRepository;
pub use user::UserRepository;
