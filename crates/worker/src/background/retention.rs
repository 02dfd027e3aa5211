//! Periodic cleanup of finished jobs and dead subscriptions.

use std::time::Duration;

use campo_db::repositories::{NotificationJobRepo, PushSubscriptionRepo};
use campo_db::DbPool;
use tokio_util::sync::CancellationToken;

/// Retention thresholds.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// `sent` and `failed` jobs older than this many days are deleted.
    pub retention_days: i32,
    /// Subscriptions with more consecutive errors than this are deleted.
    pub subscription_error_ceiling: i32,
}

/// Rows removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub jobs_deleted: u64,
    pub subscriptions_pruned: u64,
}

/// One cleanup pass. Never touches `pending` or `in_flight` jobs.
pub async fn cleanup(pool: &DbPool, policy: RetentionPolicy) -> Result<CleanupReport, sqlx::Error> {
    let jobs_deleted = NotificationJobRepo::delete_terminal_older_than(pool, policy.retention_days).await?;
    let subscriptions_pruned =
        PushSubscriptionRepo::prune_failing(pool, policy.subscription_error_ceiling).await?;
    Ok(CleanupReport {
        jobs_deleted,
        subscriptions_pruned,
    })
}

/// Run the retention cleanup loop until `cancel` is triggered.
pub async fn run(pool: DbPool, policy: RetentionPolicy, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        retention_days = policy.retention_days,
        subscription_error_ceiling = policy.subscription_error_ceiling,
        interval_secs = interval.as_secs(),
        "Notification retention job started",
    );

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; cleanup waits a full period.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Notification retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                match cleanup(&pool, policy).await {
                    Ok(report) if report == CleanupReport::default() => {
                        tracing::debug!("Notification retention: nothing to purge");
                    }
                    Ok(report) => {
                        tracing::info!(
                            jobs_deleted = report.jobs_deleted,
                            subscriptions_pruned = report.subscriptions_pruned,
                            "Notification retention: purged old rows",
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Notification retention: cleanup failed");
                    }
                }
            }
        }
    }
}
