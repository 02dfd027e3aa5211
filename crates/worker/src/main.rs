use std::sync::Arc;

use anyhow::Context;
use campo_push::{GatewayConfig, HttpPushTransport, PgSubscriptionDirectory};
use campo_worker::background::retention::{self, RetentionPolicy};
use campo_worker::background::stuck_recovery;
use campo_worker::config::WorkerConfig;
use campo_worker::engine::{DeliveryEngine, DeliveryLimits, DispatchSettings, Dispatcher};
use campo_worker::shutdown;
use campo_worker::stats::WorkerStats;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        batch_size = config.batch_size,
        concurrency = config.concurrency,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = campo_db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    campo_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    campo_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Delivery ---
    let stats = Arc::new(WorkerStats::default());
    let transport = build_transport(&config.gateway)?;
    let directory = Arc::new(PgSubscriptionDirectory::new(
        pool.clone(),
        config.subscription_error_ceiling,
    ));
    let engine = Arc::new(DeliveryEngine::new(
        transport,
        directory,
        DeliveryLimits {
            concurrency: config.concurrency,
            send_timeout: config.send_timeout,
            push_ttl: config.push_ttl,
        },
        Arc::clone(&stats),
    ));
    let dispatcher = Dispatcher::new(
        pool.clone(),
        engine,
        Arc::clone(&stats),
        DispatchSettings {
            poll_interval: config.poll_interval,
            poll_jitter: config.poll_jitter,
            batch_size: config.batch_size,
            processing_timeout: config.processing_timeout,
            retry_policy: config.retry_policy,
        },
    );

    // --- Tasks ---
    let cancel = CancellationToken::new();

    let dispatcher_cancel = cancel.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatcher_cancel).await;
    });

    let recovery_handle = tokio::spawn(stuck_recovery::run(
        pool.clone(),
        config.stuck_timeout,
        config.cleanup_interval,
        cancel.clone(),
    ));

    let retention_handle = tokio::spawn(retention::run(
        pool.clone(),
        RetentionPolicy {
            retention_days: config.retention_days,
            subscription_error_ceiling: config.subscription_error_ceiling,
        },
        config.cleanup_interval,
        cancel.clone(),
    ));

    tracing::info!("Notification worker started");

    // --- Shutdown ---
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping tasks");
    cancel.cancel();

    shutdown::join_with_grace(
        vec![
            ("dispatcher", dispatcher_handle),
            ("stuck recovery", recovery_handle),
            ("retention", retention_handle),
        ],
        config.shutdown_grace,
    )
    .await;

    let snapshot = stats.snapshot();
    tracing::info!(
        delivered = snapshot.delivered,
        retried = snapshot.retried,
        failed = snapshot.failed,
        subscriptions_removed = snapshot.subscriptions_removed,
        "Graceful shutdown complete",
    );

    pool.close().await;
    Ok(())
}

/// Install the global subscriber. `LOG_FORMAT=json` selects JSON output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campo_worker=info,campo_push=info,campo_db=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_transport(gateway: &GatewayConfig) -> anyhow::Result<Arc<HttpPushTransport>> {
    let transport = HttpPushTransport::new(gateway.clone()).context("Failed to build push gateway client")?;
    tracing::info!(gateway = %gateway.url, "Push gateway transport ready");
    Ok(Arc::new(transport))
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
