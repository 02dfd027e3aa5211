//! Claim loop.
//!
//! Polls `notification_jobs` for due work, claiming batches with
//! `SELECT FOR UPDATE SKIP LOCKED` via [`NotificationJobRepo::claim_batch`]
//! so that any number of worker processes can share one queue.

use std::sync::Arc;
use std::time::Duration;

use campo_core::backoff::RetryPolicy;
use campo_core::delivery::JobFailure;
use campo_db::models::notification_job::NotificationJob;
use campo_db::repositories::NotificationJobRepo;
use campo_db::DbPool;
use campo_push::Subscription;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use super::delivery::DeliveryEngine;
use super::outcome;
use crate::stats::WorkerStats;

/// Polling and retry settings of the [`Dispatcher`].
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub poll_interval: Duration,
    pub poll_jitter: Duration,
    pub batch_size: u32,
    pub processing_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

/// Long-lived task that claims due jobs and hands them to the engine.
pub struct Dispatcher {
    pool: DbPool,
    engine: Arc<DeliveryEngine>,
    stats: Arc<WorkerStats>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        pool: DbPool,
        engine: Arc<DeliveryEngine>,
        stats: Arc<WorkerStats>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            pool,
            engine,
            stats,
            settings,
        }
    }

    /// Run the claim loop until `cancel` is triggered.
    ///
    /// A batch in hand is always finished before the loop observes
    /// cancellation. After a full batch the next poll happens immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            batch_size = self.settings.batch_size,
            "Notification dispatcher started",
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let saturated = match self.poll_once().await {
                Ok(claimed) => claimed >= self.settings.batch_size as usize,
                Err(e) => {
                    tracing::error!(error = %e, "Notification poll failed");
                    false
                }
            };
            if saturated {
                continue;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.sleep_duration_with_jitter()) => {}
            }
        }

        tracing::info!("Notification dispatcher shutting down");
    }

    /// Claim one batch and process every job in it.
    ///
    /// Returns the number of jobs claimed. If the subscription directory
    /// cannot be read, the batch is released untouched and the error returned.
    pub async fn poll_once(&self) -> Result<usize, sqlx::Error> {
        let jobs = NotificationJobRepo::claim_batch(&self.pool, i64::from(self.settings.batch_size)).await?;
        if jobs.is_empty() {
            return Ok(0);
        }
        tracing::debug!(claimed = jobs.len(), "Claimed notification jobs");

        // Without a directory nothing was attempted; hand the batch back as is.
        let subscriptions = match self.engine.snapshot().await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load push subscriptions");
                match NotificationJobRepo::release(&self.pool, &jobs).await {
                    Ok(released) => tracing::warn!(released, "Returned claimed jobs to pending"),
                    Err(release_err) => tracing::error!(
                        error = %release_err,
                        "Failed to release claimed jobs; stuck recovery will return them",
                    ),
                }
                return Err(e);
            }
        };

        futures::future::join_all(jobs.iter().map(|job| self.process(job, &subscriptions))).await;
        Ok(jobs.len())
    }

    async fn process(&self, job: &NotificationJob, subscriptions: &[Subscription]) {
        let result = match tokio::time::timeout(
            self.settings.processing_timeout,
            self.engine.deliver(job, subscriptions),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(JobFailure::Transient(format!(
                "processing timed out after {} ms",
                self.settings.processing_timeout.as_millis()
            ))),
        };

        if let Err(e) =
            outcome::apply(&self.pool, &self.settings.retry_policy, &self.stats, job, result).await
        {
            tracing::error!(job_id = job.id, error = %e, "Failed to record notification job outcome");
        }
    }

    fn sleep_duration_with_jitter(&self) -> Duration {
        if self.settings.poll_jitter.is_zero() {
            return self.settings.poll_interval;
        }
        let jitter_ms = u64::try_from(self.settings.poll_jitter.as_millis()).unwrap_or(u64::MAX);
        self.settings.poll_interval + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}
