//! Integration tests for the notification queue repository.
//!
//! Exercises the claim path, outcome writes, stuck recovery, retention and
//! statistics against a real database.

use std::collections::HashSet;
use std::time::Duration;

use campo_core::notification::NotificationKind;
use campo_db::models::notification_job::{NewNotificationJob, NotificationJob};
use campo_db::models::status::NotificationStatus;
use campo_db::repositories::NotificationJobRepo;
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_job(kind: NotificationKind, priority: i32) -> NewNotificationJob {
    NewNotificationJob {
        kind,
        target_ids: Vec::new(),
        payload: json!({"title": "Court booked", "body": "Court 1 at 18:00"}),
        priority,
        max_attempts: 3,
        send_after: None,
    }
}

async fn enqueue(pool: &PgPool, priority: i32) -> NotificationJob {
    NotificationJobRepo::enqueue(pool, &new_job(NotificationKind::Broadcast, priority))
        .await
        .unwrap()
}

async fn status_of(pool: &PgPool, id: i64) -> NotificationStatus {
    NotificationJobRepo::find_by_id(pool, id)
        .await
        .unwrap()
        .unwrap()
        .status()
        .unwrap()
}

/// Force a job into a given status with `updated_at`/`created_at` in the past.
async fn backdate(pool: &PgPool, id: i64, status: NotificationStatus, minutes_ago: i64) {
    sqlx::query(
        "UPDATE notification_jobs \
         SET status_id = $2, \
             updated_at = NOW() - ($3::BIGINT * INTERVAL '1 minute'), \
             created_at = NOW() - ($3::BIGINT * INTERVAL '1 minute') \
         WHERE id = $1",
    )
    .bind(id)
    .bind(status.id())
    .bind(minutes_ago)
    .execute(pool)
    .await
    .unwrap();
}

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_creates_pending_job(pool: PgPool) {
    let mut input = new_job(NotificationKind::User, 1);
    input.target_ids = vec![5, 7];
    let job = NotificationJobRepo::enqueue(&pool, &input).await.unwrap();

    assert_eq!(job.status(), Some(NotificationStatus::Pending));
    assert_eq!(job.kind, "user");
    assert_eq!(job.target_ids, vec![5, 7]);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_attempts, 3);
    assert_eq!(job.priority, 1);
    assert!(job.sent_at.is_none());
    assert!(job.last_error.is_none());
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_orders_by_priority_then_fifo(pool: PgPool) {
    let low = enqueue(&pool, 0).await;
    let high_first = enqueue(&pool, 2).await;
    let high_second = enqueue(&pool, 2).await;
    let mid = enqueue(&pool, 1).await;

    let claimed = NotificationJobRepo::claim_batch(&pool, 10).await.unwrap();
    let ids: Vec<i64> = claimed.iter().map(|j| j.id).collect();

    assert_eq!(ids, vec![high_first.id, high_second.id, mid.id, low.id]);
    assert!(claimed
        .iter()
        .all(|j| j.status() == Some(NotificationStatus::InFlight)));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_respects_batch_size(pool: PgPool) {
    for _ in 0..5 {
        enqueue(&pool, 0).await;
    }
    let first = NotificationJobRepo::claim_batch(&pool, 3).await.unwrap();
    let second = NotificationJobRepo::claim_batch(&pool, 3).await.unwrap();
    let third = NotificationJobRepo::claim_batch(&pool, 3).await.unwrap();

    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 2);
    assert!(third.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_skips_jobs_scheduled_in_the_future(pool: PgPool) {
    let mut input = new_job(NotificationKind::Admin, 0);
    input.send_after = Some(chrono::Utc::now() + chrono::Duration::hours(1));
    let later = NotificationJobRepo::enqueue(&pool, &input).await.unwrap();
    let now = enqueue(&pool, 0).await;

    let claimed = NotificationJobRepo::claim_batch(&pool, 10).await.unwrap();

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, now.id);
    assert_eq!(status_of(&pool, later.id).await, NotificationStatus::Pending);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_ignores_non_pending_jobs(pool: PgPool) {
    let sent = enqueue(&pool, 0).await;
    let failed = enqueue(&pool, 0).await;
    let in_flight = enqueue(&pool, 0).await;
    backdate(&pool, sent.id, NotificationStatus::Sent, 1).await;
    backdate(&pool, failed.id, NotificationStatus::Failed, 1).await;
    backdate(&pool, in_flight.id, NotificationStatus::InFlight, 1).await;

    assert!(NotificationJobRepo::claim_batch(&pool, 10).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_skips_rows_locked_by_another_transaction(pool: PgPool) {
    let locked = enqueue(&pool, 5).await;
    let free = enqueue(&pool, 0).await;

    let mut holder = pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM notification_jobs WHERE id = $1 FOR UPDATE")
        .bind(locked.id)
        .fetch_one(&mut *holder)
        .await
        .unwrap();

    // Must not block on the locked row.
    let claimed = tokio::time::timeout(
        Duration::from_secs(5),
        NotificationJobRepo::claim_batch(&pool, 10),
    )
    .await
    .expect("claim blocked on a locked row")
    .unwrap();

    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, free.id);

    holder.rollback().await.unwrap();
    assert_eq!(status_of(&pool, locked.id).await, NotificationStatus::Pending);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_claims_never_return_the_same_job(pool: PgPool) {
    const JOBS: usize = 60;
    for i in 0..JOBS {
        enqueue(&pool, (i % 3) as i32).await;
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let mut ids = Vec::new();
            loop {
                let batch = NotificationJobRepo::claim_batch(&pool, 4).await.unwrap();
                if batch.is_empty() {
                    break;
                }
                ids.extend(batch.into_iter().map(|j| j.id));
            }
            ids
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let unique: HashSet<i64> = all.iter().copied().collect();

    assert_eq!(unique.len(), all.len(), "a job was claimed twice");
    assert_eq!(all.len(), JOBS);
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn mark_sent_records_attempts_and_timestamp(pool: PgPool) {
    let job = enqueue(&pool, 0).await;
    let claimed = NotificationJobRepo::claim_batch(&pool, 1).await.unwrap().remove(0);

    assert!(NotificationJobRepo::mark_sent(&pool, job.id, claimed.updated_at, 1).await.unwrap());

    let row = NotificationJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(NotificationStatus::Sent));
    assert_eq!(row.attempts, 1);
    assert!(row.sent_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn reschedule_pushes_send_after_forward(pool: PgPool) {
    let job = enqueue(&pool, 0).await;
    let claimed = NotificationJobRepo::claim_batch(&pool, 1).await.unwrap().remove(0);

    let updated = NotificationJobRepo::reschedule(
        &pool,
        job.id,
        claimed.updated_at,
        1,
        Duration::from_secs(60),
        "[transient] push service returned HTTP 503",
    )
    .await
    .unwrap();
    assert!(updated);

    let row = NotificationJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(NotificationStatus::Pending));
    assert_eq!(row.attempts, 1);
    assert!(row.send_after > row.updated_at + chrono::Duration::seconds(50));
    assert_eq!(
        row.last_error.as_deref(),
        Some("[transient] push service returned HTTP 503")
    );

    // Not yet due.
    assert!(NotificationJobRepo::claim_batch(&pool, 1).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn mark_failed_is_terminal(pool: PgPool) {
    let job = enqueue(&pool, 0).await;
    let claimed = NotificationJobRepo::claim_batch(&pool, 1).await.unwrap().remove(0);

    assert!(NotificationJobRepo::mark_failed(&pool, job.id, claimed.updated_at, 1, "[validation] bad payload")
        .await
        .unwrap());

    let row = NotificationJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(NotificationStatus::Failed));
    assert_eq!(row.last_error.as_deref(), Some("[validation] bad payload"));
    assert!(NotificationJobRepo::claim_batch(&pool, 1).await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn outcome_writes_ignore_jobs_no_longer_in_flight(pool: PgPool) {
    let job = enqueue(&pool, 0).await;

    // Still pending: a late writer must not touch it.
    let stamp = job.updated_at;
    assert!(!NotificationJobRepo::mark_sent(&pool, job.id, stamp, 1).await.unwrap());
    assert!(!NotificationJobRepo::mark_failed(&pool, job.id, stamp, 1, "late").await.unwrap());
    assert!(!NotificationJobRepo::reschedule(&pool, job.id, stamp, 1, Duration::from_secs(1), "late")
        .await
        .unwrap());
    assert_eq!(status_of(&pool, job.id).await, NotificationStatus::Pending);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn outcome_writes_ignore_jobs_reclaimed_by_another_worker(pool: PgPool) {
    let job = enqueue(&pool, 0).await;
    let first = NotificationJobRepo::claim_batch(&pool, 1).await.unwrap().remove(0);
    backdate(&pool, job.id, NotificationStatus::InFlight, 30).await;
    NotificationJobRepo::requeue_stuck(&pool, Duration::from_secs(600))
        .await
        .unwrap();
    let second = NotificationJobRepo::claim_batch(&pool, 1).await.unwrap().remove(0);
    assert_ne!(first.updated_at, second.updated_at);

    // The first claim is stale even though the row is in flight again.
    assert!(!NotificationJobRepo::mark_failed(&pool, job.id, first.updated_at, 1, "[validation] stale")
        .await
        .unwrap());
    assert!(!NotificationJobRepo::mark_sent(&pool, job.id, first.updated_at, 1).await.unwrap());
    assert!(!NotificationJobRepo::reschedule(&pool, job.id, first.updated_at, 1, Duration::ZERO, "stale")
        .await
        .unwrap());

    let row = NotificationJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(NotificationStatus::InFlight));
    assert_eq!(row.last_error, None);

    assert!(NotificationJobRepo::mark_sent(&pool, job.id, second.updated_at, 1).await.unwrap());
    assert_eq!(status_of(&pool, job.id).await, NotificationStatus::Sent);
}

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn release_returns_claimed_jobs_untouched(pool: PgPool) {
    let job = enqueue(&pool, 0).await;
    sqlx::query("UPDATE notification_jobs SET attempts = 1, last_error = 'earlier' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();
    let claimed = NotificationJobRepo::claim_batch(&pool, 10).await.unwrap();

    let released = NotificationJobRepo::release(&pool, &claimed).await.unwrap();

    assert_eq!(released, 1);
    let row = NotificationJobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(NotificationStatus::Pending));
    assert_eq!(row.attempts, 1);
    assert_eq!(row.last_error.as_deref(), Some("earlier"));
    assert_eq!(NotificationJobRepo::claim_batch(&pool, 10).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn release_skips_stale_claims(pool: PgPool) {
    enqueue(&pool, 0).await;
    let stale = NotificationJobRepo::claim_batch(&pool, 10).await.unwrap();
    let job_id = stale[0].id;
    backdate(&pool, job_id, NotificationStatus::InFlight, 30).await;
    NotificationJobRepo::requeue_stuck(&pool, Duration::from_secs(600))
        .await
        .unwrap();
    NotificationJobRepo::claim_batch(&pool, 10).await.unwrap();

    assert_eq!(NotificationJobRepo::release(&pool, &stale).await.unwrap(), 0);
    assert_eq!(status_of(&pool, job_id).await, NotificationStatus::InFlight);
}

// ---------------------------------------------------------------------------
// Stuck recovery
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn requeue_stuck_resets_old_in_flight_jobs(pool: PgPool) {
    let stuck = enqueue(&pool, 0).await;
    let fresh = enqueue(&pool, 0).await;
    sqlx::query("UPDATE notification_jobs SET attempts = 2 WHERE id = $1")
        .bind(stuck.id)
        .execute(&pool)
        .await
        .unwrap();
    backdate(&pool, stuck.id, NotificationStatus::InFlight, 11).await;
    backdate(&pool, fresh.id, NotificationStatus::InFlight, 2).await;

    let recovered = NotificationJobRepo::requeue_stuck(&pool, Duration::from_secs(600))
        .await
        .unwrap();

    assert_eq!(recovered, vec![stuck.id]);
    let row = NotificationJobRepo::find_by_id(&pool, stuck.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(NotificationStatus::Pending));
    assert_eq!(row.attempts, 2);
    assert_eq!(status_of(&pool, fresh.id).await, NotificationStatus::InFlight);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn requeue_stuck_is_idempotent(pool: PgPool) {
    let stuck = enqueue(&pool, 0).await;
    let done = enqueue(&pool, 0).await;
    backdate(&pool, stuck.id, NotificationStatus::InFlight, 30).await;
    backdate(&pool, done.id, NotificationStatus::Sent, 30).await;

    let first = NotificationJobRepo::requeue_stuck(&pool, Duration::from_secs(600))
        .await
        .unwrap();
    let second = NotificationJobRepo::requeue_stuck(&pool, Duration::from_secs(600))
        .await
        .unwrap();

    assert_eq!(first, vec![stuck.id]);
    assert!(second.is_empty());
    assert_eq!(status_of(&pool, done.id).await, NotificationStatus::Sent);
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn retention_deletes_only_old_terminal_jobs(pool: PgPool) {
    const EIGHT_DAYS: i64 = 8 * 24 * 60;
    let old_sent = enqueue(&pool, 0).await;
    let old_failed = enqueue(&pool, 0).await;
    let old_pending = enqueue(&pool, 0).await;
    let old_in_flight = enqueue(&pool, 0).await;
    let recent_sent = enqueue(&pool, 0).await;
    backdate(&pool, old_sent.id, NotificationStatus::Sent, EIGHT_DAYS).await;
    backdate(&pool, old_failed.id, NotificationStatus::Failed, EIGHT_DAYS).await;
    backdate(&pool, old_pending.id, NotificationStatus::Pending, EIGHT_DAYS).await;
    backdate(&pool, old_in_flight.id, NotificationStatus::InFlight, EIGHT_DAYS).await;
    backdate(&pool, recent_sent.id, NotificationStatus::Sent, 60).await;

    let deleted = NotificationJobRepo::delete_terminal_older_than(&pool, 7).await.unwrap();

    assert_eq!(deleted, 2);
    for gone in [old_sent.id, old_failed.id] {
        assert!(NotificationJobRepo::find_by_id(&pool, gone).await.unwrap().is_none());
    }
    for kept in [old_pending.id, old_in_flight.id, recent_sent.id] {
        assert!(NotificationJobRepo::find_by_id(&pool, kept).await.unwrap().is_some());
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn stats_counts_per_status(pool: PgPool) {
    let a = enqueue(&pool, 0).await;
    let b = enqueue(&pool, 0).await;
    enqueue(&pool, 0).await;
    backdate(&pool, a.id, NotificationStatus::Sent, 1).await;
    backdate(&pool, b.id, NotificationStatus::Failed, 1).await;

    let stats = NotificationJobRepo::stats(&pool).await.unwrap();

    assert_eq!(stats.pending, 1);
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.failed, 1);
}
