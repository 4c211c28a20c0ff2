//! Redis-backed notification delivery for Parley.
//!
//! This crate moves mention notifications out of the request path when a
//! Redis server is configured:
//!
//! - **Jobs**: one [`NotifyJob`] per recipient and channel
//! - **Workers**: apalis workers that run the deliverer for each job
//! - **Pub/Sub**: fan-out of live notifications across server instances

pub mod dispatcher;
pub mod jobs;
pub mod pubsub;
pub mod workers;

pub use dispatcher::RedisNotificationDispatcher;
pub use jobs::*;
pub use pubsub::{PubSubEvent, PubSubSseBridge, RedisPubSub};
pub use workers::*;
