//! Repository for the `notification_jobs` table.
//!
//! Every status transition goes through [`NotificationStatus`]; no status
//! literal appears in SQL. Outcome writes are guarded by
//! `status_id = in_flight` and by the `updated_at` stamped at claim time, so
//! a row already recovered by the stuck sweep, and possibly reclaimed by
//! another worker, is never overwritten by a late worker.

use std::time::Duration;

use sqlx::PgPool;
use campo_core::types::{DbId, Timestamp};

use crate::models::notification_job::{NewNotificationJob, NotificationJob, QueueStats};
use crate::models::status::{NotificationStatus, StatusId};

/// Column list for `notification_jobs` queries.
const COLUMNS: &str = "\
    id, kind, target_ids, payload, status_id, priority, \
    attempts, max_attempts, send_after, last_error, \
    sent_at, created_at, updated_at";

/// Provides queue operations for notification jobs.
pub struct NotificationJobRepo;

impl NotificationJobRepo {
    /// Insert a new pending job and return the full row.
    pub async fn enqueue(
        pool: &PgPool,
        input: &NewNotificationJob,
    ) -> Result<NotificationJob, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_jobs \
                 (kind, target_ids, payload, status_id, priority, max_attempts, send_after) \
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, NOW())) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationJob>(&query)
            .bind(input.kind.as_str())
            .bind(&input.target_ids)
            .bind(&input.payload)
            .bind(NotificationStatus::Pending.id())
            .bind(input.priority)
            .bind(input.max_attempts)
            .bind(input.send_after)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<NotificationJob>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notification_jobs WHERE id = $1");
        sqlx::query_as::<_, NotificationJob>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim up to `limit` due jobs and mark them in flight.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` inside one transaction, so
    /// concurrent claimers never block on each other and never return the
    /// same job. Rows come back ordered by `priority DESC, created_at ASC`.
    pub async fn claim_batch(pool: &PgPool, limit: i64) -> Result<Vec<NotificationJob>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let ids: Vec<DbId> = sqlx::query_scalar(
            "SELECT id FROM notification_jobs \
             WHERE status_id = $1 AND send_after <= NOW() \
             ORDER BY priority DESC, created_at ASC, id ASC \
             LIMIT $2 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(NotificationStatus::Pending.id())
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let query = format!(
            "UPDATE notification_jobs \
             SET status_id = $1, updated_at = NOW() \
             WHERE id = ANY($2) \
             RETURNING {COLUMNS}"
        );
        let mut jobs = sqlx::query_as::<_, NotificationJob>(&query)
            .bind(NotificationStatus::InFlight.id())
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        // RETURNING order is unspecified; restore claim order.
        jobs.sort_by_key(|job| ids.iter().position(|id| *id == job.id));
        Ok(jobs)
    }

    /// Mark an in-flight job as delivered.
    ///
    /// `claimed_at` is the `updated_at` returned by [`Self::claim_batch`].
    /// Returns `false` if the job is no longer held by that claim.
    pub async fn mark_sent(
        pool: &PgPool,
        job_id: DbId,
        claimed_at: Timestamp,
        attempts: i32,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_jobs \
             SET status_id = $2, attempts = $3, sent_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $4 AND updated_at = $5",
        )
        .bind(job_id)
        .bind(NotificationStatus::Sent.id())
        .bind(attempts)
        .bind(NotificationStatus::InFlight.id())
        .bind(claimed_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return an in-flight job to `pending`, eligible again after `delay`.
    pub async fn reschedule(
        pool: &PgPool,
        job_id: DbId,
        claimed_at: Timestamp,
        attempts: i32,
        delay: Duration,
        last_error: &str,
    ) -> Result<bool, sqlx::Error> {
        let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
        let result = sqlx::query(
            "UPDATE notification_jobs \
             SET status_id = $2, attempts = $3, last_error = $4, \
                 send_after = NOW() + ($5::BIGINT * INTERVAL '1 millisecond'), \
                 updated_at = NOW() \
             WHERE id = $1 AND status_id = $6 AND updated_at = $7",
        )
        .bind(job_id)
        .bind(NotificationStatus::Pending.id())
        .bind(attempts)
        .bind(last_error)
        .bind(delay_ms)
        .bind(NotificationStatus::InFlight.id())
        .bind(claimed_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark an in-flight job as permanently failed.
    pub async fn mark_failed(
        pool: &PgPool,
        job_id: DbId,
        claimed_at: Timestamp,
        attempts: i32,
        last_error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_jobs \
             SET status_id = $2, attempts = $3, last_error = $4, updated_at = NOW() \
             WHERE id = $1 AND status_id = $5 AND updated_at = $6",
        )
        .bind(job_id)
        .bind(NotificationStatus::Failed.id())
        .bind(attempts)
        .bind(last_error)
        .bind(NotificationStatus::InFlight.id())
        .bind(claimed_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Return freshly claimed jobs to `pending` without charging an attempt.
    ///
    /// Used when a batch cannot be processed for reasons unrelated to the
    /// jobs themselves. `attempts`, `last_error` and `send_after` are left
    /// as they were. Returns the number of rows released.
    pub async fn release(pool: &PgPool, jobs: &[NotificationJob]) -> Result<u64, sqlx::Error> {
        let ids: Vec<DbId> = jobs.iter().map(|job| job.id).collect();
        let claimed_at: Vec<Timestamp> = jobs.iter().map(|job| job.updated_at).collect();
        let result = sqlx::query(
            "UPDATE notification_jobs AS j \
             SET status_id = $1, updated_at = NOW() \
             FROM UNNEST($2::BIGINT[], $3::TIMESTAMPTZ[]) AS c(id, claimed_at) \
             WHERE j.id = c.id AND j.updated_at = c.claimed_at AND j.status_id = $4",
        )
        .bind(NotificationStatus::Pending.id())
        .bind(&ids)
        .bind(&claimed_at)
        .bind(NotificationStatus::InFlight.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Reset jobs left in flight longer than `older_than` back to `pending`.
    ///
    /// `attempts` is left untouched. Returns the recovered IDs.
    pub async fn requeue_stuck(pool: &PgPool, older_than: Duration) -> Result<Vec<DbId>, sqlx::Error> {
        let secs = i64::try_from(older_than.as_secs()).unwrap_or(i64::MAX);
        sqlx::query_scalar(
            "UPDATE notification_jobs \
             SET status_id = $1, updated_at = NOW() \
             WHERE status_id = $2 \
               AND updated_at < NOW() - ($3::BIGINT * INTERVAL '1 second') \
             RETURNING id",
        )
        .bind(NotificationStatus::Pending.id())
        .bind(NotificationStatus::InFlight.id())
        .bind(secs)
        .fetch_all(pool)
        .await
    }

    /// Delete `sent` and `failed` jobs created more than `days` days ago.
    ///
    /// Returns the number of rows deleted.
    pub async fn delete_terminal_older_than(pool: &PgPool, days: i32) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM notification_jobs \
             WHERE status_id IN ($1, $2) \
               AND created_at < NOW() - ($3::INTEGER * INTERVAL '1 day')",
        )
        .bind(NotificationStatus::Sent.id())
        .bind(NotificationStatus::Failed.id())
        .bind(days)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Count jobs per status.
    pub async fn stats(pool: &PgPool) -> Result<QueueStats, sqlx::Error> {
        let rows: Vec<(StatusId, i64)> = sqlx::query_as(
            "SELECT status_id, COUNT(*) FROM notification_jobs GROUP BY status_id",
        )
        .fetch_all(pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status_id, count) in rows {
            match NotificationStatus::from_id(status_id) {
                Some(NotificationStatus::Pending) => stats.pending = count,
                Some(NotificationStatus::InFlight) => stats.in_flight = count,
                Some(NotificationStatus::Sent) => stats.sent = count,
                Some(NotificationStatus::Failed) => stats.failed = count,
                None => tracing::warn!(status_id, count, "Unknown notification status id"),
            }
        }
        Ok(stats)
    }
}
