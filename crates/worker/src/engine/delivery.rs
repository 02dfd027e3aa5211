//! Delivery of one claimed job to its recipients.
//!
//! The engine resolves recipients from a per-batch directory snapshot,
//! fans the serialized payload out to them through the [`PushTransport`]
//! and folds the per-subscription outcomes into a job verdict. Directory
//! maintenance (removing gone endpoints, counting errors) happens inline
//! and never fails the job.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use campo_core::delivery::{job_verdict, DeliveryTally, JobFailure};
use campo_core::error::CoreError;
use campo_core::notification::{payload_topic, validate_payload, NotificationKind};
use campo_core::types::DbId;
use campo_db::models::notification_job::NotificationJob;
use campo_push::{PushError, PushTransport, SendOptions, Subscription, SubscriptionDirectory, Urgency};
use futures::StreamExt;
use tokio::sync::Semaphore;

use crate::stats::WorkerStats;

/// Characters of an endpoint kept in log lines.
const ENDPOINT_LOG_CHARS: usize = 48;

/// Fan-out limits applied by the [`DeliveryEngine`].
#[derive(Debug, Clone, Copy)]
pub struct DeliveryLimits {
    /// Maximum sends in flight across every job of the process.
    pub concurrency: usize,
    pub send_timeout: Duration,
    pub push_ttl: Duration,
}

/// Sends claimed jobs to their subscriptions.
pub struct DeliveryEngine {
    transport: Arc<dyn PushTransport>,
    directory: Arc<dyn SubscriptionDirectory>,
    permits: Arc<Semaphore>,
    limits: DeliveryLimits,
    stats: Arc<WorkerStats>,
}

impl DeliveryEngine {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        directory: Arc<dyn SubscriptionDirectory>,
        limits: DeliveryLimits,
        stats: Arc<WorkerStats>,
    ) -> Self {
        Self {
            transport,
            directory,
            permits: Arc::new(Semaphore::new(limits.concurrency)),
            limits,
            stats,
        }
    }

    /// Load the subscriptions every job of a batch resolves against.
    pub async fn snapshot(&self) -> Result<Vec<Subscription>, sqlx::Error> {
        self.directory.list_subscriptions().await
    }

    /// Deliver one job and decide its job-level outcome.
    pub async fn deliver(&self, job: &NotificationJob, subscriptions: &[Subscription]) -> Result<(), JobFailure> {
        let tally = self.fan_out(job, subscriptions).await?;

        tracing::debug!(
            job_id = job.id,
            delivered = tally.delivered,
            gone = tally.gone,
            failed = tally.job_failures(),
            "Job fan-out finished",
        );
        job_verdict(&tally)
    }

    async fn fan_out(&self, job: &NotificationJob, subscriptions: &[Subscription]) -> Result<DeliveryTally, JobFailure> {
        let kind: NotificationKind = job
            .kind
            .parse()
            .map_err(|e: CoreError| JobFailure::Permanent(e.to_string()))?;
        validate_payload(&job.payload).map_err(|e| JobFailure::Permanent(e.to_string()))?;

        let recipients = resolve_recipients(kind, &job.target_ids, subscriptions)?;
        let mut tally = DeliveryTally::default();
        if recipients.is_empty() {
            tracing::info!(job_id = job.id, kind = %kind, "No subscriptions for job");
            return Ok(tally);
        }

        let payload =
            serde_json::to_vec(&job.payload).map_err(|e| JobFailure::Permanent(e.to_string()))?;
        let options = SendOptions::new(payload_topic(&job.payload, kind))
            .with_ttl(self.limits.push_ttl)
            .with_urgency(Urgency::for_kind(kind));

        let sends: Vec<Pin<Box<dyn Future<Output = Result<(), PushError>> + Send + '_>>> = recipients
            .into_iter()
            .map(|subscription| {
                Box::pin(self.send_one(job.id, subscription, &payload, &options))
                    as Pin<Box<dyn Future<Output = Result<(), PushError>> + Send + '_>>
            })
            .collect();
        let outcomes: Vec<Result<(), PushError>> = futures::stream::iter(sends)
            .buffer_unordered(self.limits.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(()) => tally.record_success(),
                Err(e) => tally.record_failure(e.class(), e.to_string()),
            }
        }
        Ok(tally)
    }

    /// Send to one subscription under the process-wide permit budget and
    /// apply the directory side effect of the result.
    async fn send_one(
        &self,
        job_id: DbId,
        subscription: &Subscription,
        payload: &[u8],
        options: &SendOptions,
    ) -> Result<(), PushError> {
        let result = match self.permits.acquire().await {
            Ok(_permit) => {
                match tokio::time::timeout(
                    self.limits.send_timeout,
                    self.transport.send(subscription, payload, options),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(PushError::Transient(format!(
                        "send timed out after {} ms",
                        self.limits.send_timeout.as_millis()
                    ))),
                }
            }
            Err(_) => Err(PushError::Transient("delivery permits closed".to_string())),
        };

        self.record_outcome(job_id, subscription, &result).await;
        result
    }

    async fn record_outcome(&self, job_id: DbId, subscription: &Subscription, result: &Result<(), PushError>) {
        let endpoint = short_endpoint(&subscription.endpoint);
        let write = match result {
            Ok(()) => {
                self.directory
                    .record_delivery_outcome(&subscription.endpoint, true)
                    .await
            }
            Err(PushError::Gone { status }) => {
                tracing::info!(job_id, endpoint, status, "Removing expired subscription");
                match self.directory.remove_subscription(&subscription.endpoint).await {
                    Ok(true) => {
                        self.stats.record_subscription_removed();
                        Ok(())
                    }
                    Ok(false) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            Err(e) => {
                tracing::warn!(job_id, endpoint, class = %e.class(), error = %e, "Push send failed");
                self.directory
                    .record_delivery_outcome(&subscription.endpoint, false)
                    .await
            }
        };

        if let Err(e) = write {
            tracing::warn!(job_id, endpoint, error = %e, "Failed to update subscription after send");
        }
    }
}

/// Pick the subscriptions a job is addressed to.
pub fn resolve_recipients<'a>(
    kind: NotificationKind,
    target_ids: &[DbId],
    subscriptions: &'a [Subscription],
) -> Result<Vec<&'a Subscription>, JobFailure> {
    let recipients = match kind {
        NotificationKind::Admin => subscriptions.iter().filter(|s| s.is_admin).collect(),
        NotificationKind::User => {
            if target_ids.is_empty() {
                return Err(JobFailure::Permanent(
                    "User notification has no target ids".to_string(),
                ));
            }
            subscriptions
                .iter()
                .filter(|s| s.owner_id.is_some_and(|owner| target_ids.contains(&owner)))
                .collect()
        }
        NotificationKind::Broadcast => subscriptions.iter().collect(),
    };
    Ok(recipients)
}

fn short_endpoint(endpoint: &str) -> &str {
    match endpoint.char_indices().nth(ENDPOINT_LOG_CHARS) {
        Some((idx, _)) => &endpoint[..idx],
        None => endpoint,
    }
}
