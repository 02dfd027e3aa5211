//! Persisting the result of a delivery attempt.
//!
//! Every write is guarded by `status = in_flight` and by the `updated_at`
//! stamped when this worker claimed the row. A write that matches no row
//! means the job was recovered (and possibly reclaimed) meanwhile; the late
//! result is dropped.

use campo_core::backoff::{RetryDecision, RetryPolicy};
use campo_core::delivery::JobFailure;
use campo_core::notification::truncate_error;
use campo_db::models::notification_job::NotificationJob;
use campo_db::repositories::NotificationJobRepo;
use campo_db::DbPool;
use std::time::Duration;

use crate::stats::WorkerStats;

/// Which transition a delivery attempt produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    Rescheduled { delay: Duration },
    Failed,
    /// The row was no longer in flight; nothing was written.
    Superseded,
}

/// Record the result of one attempt on the job row.
pub async fn apply(
    pool: &DbPool,
    policy: &RetryPolicy,
    stats: &WorkerStats,
    job: &NotificationJob,
    result: Result<(), JobFailure>,
) -> Result<Outcome, sqlx::Error> {
    let attempts = job.attempts.saturating_add(1);

    let failure = match result {
        Ok(()) => {
            if !NotificationJobRepo::mark_sent(pool, job.id, job.updated_at, attempts).await? {
                return Ok(superseded(job));
            }
            stats.record_delivered();
            tracing::info!(job_id = job.id, attempts, "Notification job sent");
            return Ok(Outcome::Sent);
        }
        Err(failure) => failure,
    };

    let last_error = truncate_error(&failure.to_string());
    match policy.decide(job.attempts, job.max_attempts, failure.is_retryable()) {
        RetryDecision::Reschedule { attempts, delay } => {
            if !NotificationJobRepo::reschedule(pool, job.id, job.updated_at, attempts, delay, &last_error).await? {
                return Ok(superseded(job));
            }
            stats.record_retried();
            tracing::warn!(
                job_id = job.id,
                attempts,
                max_attempts = job.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Notification job rescheduled",
            );
            Ok(Outcome::Rescheduled { delay })
        }
        RetryDecision::Fail { attempts } => {
            if !NotificationJobRepo::mark_failed(pool, job.id, job.updated_at, attempts, &last_error).await? {
                return Ok(superseded(job));
            }
            stats.record_failed();
            tracing::error!(
                job_id = job.id,
                attempts,
                max_attempts = job.max_attempts,
                error = %failure,
                "Notification job failed",
            );
            Ok(Outcome::Failed)
        }
    }
}

fn superseded(job: &NotificationJob) -> Outcome {
    tracing::warn!(job_id = job.id, "Job no longer in flight; dropping late result");
    Outcome::Superseded
}
