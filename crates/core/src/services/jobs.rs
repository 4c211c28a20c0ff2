//! In-process notification queue.
//!
//! Used when no Redis is configured. Notifications are pushed onto a bounded
//! channel without waiting; a fixed pool of workers delivers them, retrying
//! each channel with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parley_common::{AppError, AppResult, config::NotificationConfig};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::services::dispatch::{
    MentionNotification, NotificationChannel, NotificationDeliverer,
    NotificationDelivererService, NotificationDispatcher,
};

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total delivery attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-indexed).
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(retry as i32);
        let delay = Duration::from_secs_f64(delay_secs);

        if delay > self.max_delay {
            self.max_delay
        } else {
            delay
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

/// One notification on one channel.
#[derive(Debug, Clone)]
pub struct NotifyTask {
    pub recipient_id: String,
    pub channel: NotificationChannel,
    pub payload: MentionNotification,
}

/// Cloneable handle for enqueueing notifications.
#[derive(Clone)]
pub struct NotificationSender {
    sender: mpsc::Sender<NotifyTask>,
    channels: Arc<[NotificationChannel]>,
}

impl NotificationSender {
    /// Enqueue without waiting. A full queue drops the task.
    pub fn enqueue(&self, task: NotifyTask) -> AppResult<()> {
        self.sender.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(task) => {
                warn!(
                    recipient_id = %task.recipient_id,
                    channel = %task.channel,
                    comment_id = %task.payload.comment_id,
                    "Notification queue is full, dropping notification"
                );
                AppError::Queue("Notification queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                error!("Notification queue is closed");
                AppError::Queue("Notification queue is closed".to_string())
            }
        })
    }
}

#[async_trait]
impl NotificationDispatcher for NotificationSender {
    async fn dispatch(&self, recipient_id: &str, payload: MentionNotification) -> AppResult<()> {
        let mut result = Ok(());

        for &channel in self.channels.iter() {
            let task = NotifyTask {
                recipient_id: recipient_id.to_string(),
                channel,
                payload: payload.clone(),
            };
            // Channels are independent: a drop on one does not skip the other
            if let Err(e) = self.enqueue(task) {
                result = Err(e);
            }
        }

        result
    }
}

/// Bounded in-process notification queue.
pub struct NotificationQueue {
    sender: mpsc::Sender<NotifyTask>,
    receiver: mpsc::Receiver<NotifyTask>,
    channels: Arc<[NotificationChannel]>,
    workers: usize,
    retry: RetryConfig,
}

impl NotificationQueue {
    /// Create a new queue from configuration.
    #[must_use]
    pub fn new(config: &NotificationConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            sender,
            receiver,
            channels: NotificationChannel::enabled(config).into(),
            workers: config.workers.max(1),
            retry: RetryConfig::from_config(config),
        }
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Get a sender for enqueueing notifications.
    #[must_use]
    pub fn sender(&self) -> NotificationSender {
        NotificationSender {
            sender: self.sender.clone(),
            channels: Arc::clone(&self.channels),
        }
    }

    /// Start the workers. The queue stops once every sender is dropped.
    pub fn start(self, deliverer: NotificationDelivererService) -> JoinHandle<()> {
        let Self {
            sender,
            receiver,
            workers,
            retry,
            ..
        } = self;
        // Only external senders keep the queue alive
        drop(sender);

        tokio::spawn(async move {
            info!(workers, "Notification queue starting");
            run_processor(receiver, deliverer, Arc::new(retry), workers).await;
            info!("Notification queue stopped");
        })
    }
}

async fn run_processor(
    mut receiver: mpsc::Receiver<NotifyTask>,
    deliverer: NotificationDelivererService,
    retry: Arc<RetryConfig>,
    workers: usize,
) {
    let semaphore = Arc::new(Semaphore::new(workers));

    while let Some(task) = receiver.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let deliverer = Arc::clone(&deliverer);
        let retry = Arc::clone(&retry);

        tokio::spawn(async move {
            let _permit = permit;
            deliver_with_retry(&task, deliverer.as_ref(), &retry).await;
        });
    }

    // Wait for in-flight deliveries
    let _ = semaphore.acquire_many(workers as u32).await;
}

async fn deliver_with_retry(
    task: &NotifyTask,
    deliverer: &dyn NotificationDeliverer,
    retry: &RetryConfig,
) {
    let mut attempts = 0;

    loop {
        attempts += 1;
        match deliverer
            .deliver(task.channel, &task.recipient_id, &task.payload)
            .await
        {
            Ok(()) => {
                debug!(
                    recipient_id = %task.recipient_id,
                    channel = %task.channel,
                    attempts,
                    "Notification delivered"
                );
                return;
            }
            Err(e) if retry.should_retry(attempts) => {
                let delay = retry.delay_for_retry(attempts - 1);
                warn!(
                    error = %e,
                    recipient_id = %task.recipient_id,
                    channel = %task.channel,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Notification delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(
                    error = %e,
                    recipient_id = %task.recipient_id,
                    channel = %task.channel,
                    comment_id = %task.payload.comment_id,
                    attempts,
                    "Notification delivery failed, giving up"
                );
                return;
            }
        }
    }
}
