//! Bounded wait for background tasks after cancellation.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Wait for every task under one shared `grace` deadline.
///
/// Returns `false` if some task was still running when the deadline
/// passed. In-flight jobs of an abandoned task are returned to the queue
/// later by stuck recovery.
pub async fn join_with_grace(tasks: Vec<(&'static str, JoinHandle<()>)>, grace: Duration) -> bool {
    let joins = tasks.into_iter().map(|(name, handle)| async move {
        match handle.await {
            Ok(()) => tracing::info!(task = name, "Task stopped"),
            Err(e) => tracing::error!(task = name, error = %e, "Task panicked"),
        }
    });

    match tokio::time::timeout(grace, futures::future::join_all(joins)).await {
        Ok(_) => true,
        Err(_) => {
            tracing::warn!(grace_ms = grace.as_millis() as u64, "Tasks did not stop in time");
            false
        }
    }
}
