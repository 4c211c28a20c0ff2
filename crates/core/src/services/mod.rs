//! Business logic services.

#![allow(missing_docs)]

pub mod comment;
pub mod dispatch;
pub mod event_publisher;
pub mod jobs;
pub mod mention;
pub mod notification;
pub mod post;
pub mod user;

pub use comment::{CommentService, CommentView, CreateCommentInput, UpdateCommentInput};
pub use dispatch::{
    ChannelDeliverer, MentionAuthor, MentionNotification, NoOpDispatcher, NotificationChannel,
    NotificationDeliverer, NotificationDelivererService, NotificationDispatcher,
    NotificationDispatcherService,
};
pub use event_publisher::{EventPublisher, EventPublisherService, NoOpEventPublisher};
pub use jobs::{NotificationQueue, NotificationSender, NotifyTask, RetryConfig};
pub use mention::{
    MentionOutcome, MentionProcessor, MentionStore, MentionedUser, RepositoryMentionStore,
    extract_mentions,
};
pub use notification::NotificationService;
pub use post::{CreatePostInput, PostService, UpdatePostInput};
pub use user::{CreateUserInput, UpdateUserInput, UserService};
