//! Notify worker.

use apalis::prelude::*;
use parley_common::AppResult;
use parley_core::NotificationDelivererService;
use tracing::{debug, error};

use crate::jobs::NotifyJob;

/// Context for the notify worker.
#[derive(Clone)]
pub struct NotifyContext {
    pub deliverer: NotificationDelivererService,
}

impl NotifyContext {
    /// Create a new notify context.
    #[must_use]
    pub fn new(deliverer: NotificationDelivererService) -> Self {
        Self { deliverer }
    }

    /// Deliver a single job.
    pub async fn handle(&self, job: &NotifyJob) -> AppResult<()> {
        self.deliverer
            .deliver(job.channel, &job.recipient_id, &job.payload)
            .await
    }
}

/// Worker function for delivering mention notifications.
///
/// # Errors
/// Returns an error if delivery fails, so the job is retried.
pub async fn notify_worker(job: NotifyJob, ctx: Data<NotifyContext>) -> Result<(), Error> {
    debug!(
        recipient_id = %job.recipient_id,
        channel = %job.channel,
        comment_id = %job.payload.comment_id,
        "Delivering notification"
    );

    match ctx.handle(&job).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(
                recipient_id = %job.recipient_id,
                channel = %job.channel,
                error = %e,
                "Failed to deliver notification"
            );
            let err: Box<dyn std::error::Error + Send + Sync> = Box::new(e);
            Err(Error::Failed(err.into()))
        }
    }
}
