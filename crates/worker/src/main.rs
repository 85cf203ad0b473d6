use std::sync::Arc;

use anyhow::Context;
use edquest_core::clock::SystemClock;
use edquest_events::{EventBus, EventPersistence};
use edquest_gamification::activity::PgCourseActivity;
use edquest_gamification::store::PgProgressStore;
use edquest_gamification::GamificationEngine;
use edquest_worker::background::reconciliation;
use edquest_worker::config::WorkerConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "edquest_worker=debug,edquest_gamification=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        daily_xp_cap = config.engine.default_daily_xp_cap,
        utc_offset_secs = config.engine.reference_utc_offset_secs,
        gate_chains = config.engine.gate_chained_achievements,
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = edquest_db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    edquest_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    edquest_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let cancel = CancellationToken::new();

    // --- Event bus ---
    // Persistence stops when the bus closes, after draining what was sent.
    let persistence_cancel = CancellationToken::new();
    let event_bus = Arc::new(EventBus::default());
    let persistence_handle = tokio::spawn(
        EventPersistence::new(pool.clone()).run(event_bus.subscribe(), persistence_cancel.clone()),
    );

    // --- Engine ---
    let engine = GamificationEngine::new(
        Arc::new(PgProgressStore::new(pool.clone())),
        Arc::new(PgCourseActivity::new(pool.clone())),
        Arc::new(SystemClock),
        config.engine.clone(),
    )
    .with_event_bus(Arc::clone(&event_bus));
    let engine = Arc::new(engine);

    // --- Reconciliation ---
    let reconcile_handle = tokio::spawn(reconciliation::run(
        Arc::clone(&engine),
        config.reconcile_interval,
        config.reconcile_batch_size,
        cancel.clone(),
    ));

    tracing::info!("Worker started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl-C handler")?;
    tracing::info!("Shutdown signal received");

    cancel.cancel();
    if tokio::time::timeout(config.shutdown_timeout, reconcile_handle)
        .await
        .is_err()
    {
        tracing::warn!("Reconciliation job did not stop in time");
    }

    drop(engine);
    drop(event_bus);
    if tokio::time::timeout(config.shutdown_timeout, persistence_handle)
        .await
        .is_err()
    {
        tracing::warn!("Event persistence did not stop in time, abandoning queued events");
        persistence_cancel.cancel();
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}
