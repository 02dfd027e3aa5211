//! Enqueue contract for the rest of the application.
//!
//! Enqueueing only persists a `pending` row. Delivery happens later in the
//! worker, so callers never wait on the push service.

use campo_core::error::CoreError;
use campo_core::notification::{validate_targets, EnqueueOptions, NotificationKind};
use campo_core::types::DbId;
use campo_db::models::notification_job::{NewNotificationJob, NotificationJob, QueueStats};
use campo_db::repositories::NotificationJobRepo;
use campo_db::DbPool;
use validator::Validate;

/// Errors surfaced to enqueue callers.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable notification queue backed by `notification_jobs`.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    pool: DbPool,
}

impl NotificationQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Persist a new `pending` job and return its id.
    ///
    /// Only the options and recipient list are checked here; the payload
    /// is validated when the job is delivered.
    pub async fn enqueue(
        &self,
        kind: NotificationKind,
        target_ids: Vec<DbId>,
        payload: serde_json::Value,
        options: &EnqueueOptions,
    ) -> Result<DbId, QueueError> {
        options.validate().map_err(CoreError::from)?;
        validate_targets(kind, &target_ids)?;

        let input = NewNotificationJob {
            kind,
            target_ids,
            payload,
            priority: options.priority(),
            max_attempts: options.max_attempts(),
            send_after: options.send_after,
        };
        let job = NotificationJobRepo::enqueue(&self.pool, &input).await?;

        tracing::debug!(
            job_id = job.id,
            kind = %kind,
            priority = job.priority,
            targets = job.target_ids.len(),
            "Notification job enqueued",
        );
        Ok(job.id)
    }

    /// Enqueue a notification for every admin subscription.
    pub async fn enqueue_for_admins(
        &self,
        payload: serde_json::Value,
        options: &EnqueueOptions,
    ) -> Result<DbId, QueueError> {
        self.enqueue(NotificationKind::Admin, Vec::new(), payload, options)
            .await
    }

    /// Enqueue a notification for the subscriptions owned by `user_ids`.
    pub async fn enqueue_for_users(
        &self,
        user_ids: Vec<DbId>,
        payload: serde_json::Value,
        options: &EnqueueOptions,
    ) -> Result<DbId, QueueError> {
        self.enqueue(NotificationKind::User, user_ids, payload, options)
            .await
    }

    /// Enqueue a notification for every subscription.
    pub async fn enqueue_broadcast(
        &self,
        payload: serde_json::Value,
        options: &EnqueueOptions,
    ) -> Result<DbId, QueueError> {
        self.enqueue(NotificationKind::Broadcast, Vec::new(), payload, options)
            .await
    }

    /// Fetch a job by id.
    pub async fn job(&self, id: DbId) -> Result<NotificationJob, QueueError> {
        NotificationJobRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or(QueueError::Core(CoreError::NotFound {
                entity: "NotificationJob",
                id,
            }))
    }

    /// Job counts per status.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(NotificationJobRepo::stats(&self.pool).await?)
    }
}
