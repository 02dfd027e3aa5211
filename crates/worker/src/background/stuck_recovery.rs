//! Recovery of jobs left in flight by a worker that died mid-delivery.
//!
//! Runs once at startup and then every cleanup interval. Recovered jobs go
//! back to `pending` with their attempt counter untouched.

use std::time::Duration;

use campo_core::types::DbId;
use campo_db::repositories::NotificationJobRepo;
use campo_db::DbPool;
use tokio_util::sync::CancellationToken;

/// One recovery sweep. Returns the recovered job IDs.
pub async fn sweep(pool: &DbPool, stuck_timeout: Duration) -> Result<Vec<DbId>, sqlx::Error> {
    let recovered = NotificationJobRepo::requeue_stuck(pool, stuck_timeout).await?;
    if recovered.is_empty() {
        tracing::debug!("Stuck recovery: nothing to recover");
    } else {
        tracing::warn!(count = recovered.len(), job_ids = ?recovered, "Stuck recovery: jobs returned to pending");
    }
    Ok(recovered)
}

/// Run stuck recovery until `cancel` is triggered.
///
/// The first sweep happens immediately.
pub async fn run(pool: DbPool, stuck_timeout: Duration, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        stuck_timeout_secs = stuck_timeout.as_secs(),
        interval_secs = interval.as_secs(),
        "Stuck recovery started",
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Stuck recovery stopping");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = sweep(&pool, stuck_timeout).await {
                    tracing::error!(error = %e, "Stuck recovery: sweep failed");
                }
            }
        }
    }
}
