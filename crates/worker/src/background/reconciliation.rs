//! Periodic re-evaluation of users whose achievement evaluation failed.
//!
//! Drains `gamification_reevaluation_queue` in batches on a fixed interval
//! and runs a full evaluation for every user taken.

use std::sync::Arc;
use std::time::Duration;

use edquest_gamification::GamificationEngine;
use tokio_util::sync::CancellationToken;

/// Run the reconciliation loop until `cancel` is triggered.
///
/// A full batch is followed immediately by another drain so a backlog
/// clears without waiting for the next tick.
pub async fn run(
    engine: Arc<GamificationEngine>,
    every: Duration,
    batch_size: i64,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = every.as_secs(),
        batch_size,
        "Reconciliation job started"
    );

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconciliation job stopping");
                break;
            }
            _ = interval.tick() => {
                drain(&engine, batch_size, &cancel).await;
            }
        }
    }
}

async fn drain(engine: &GamificationEngine, batch_size: i64, cancel: &CancellationToken) {
    loop {
        match engine.reconcile(batch_size).await {
            Ok(stats) if stats.processed as i64 >= batch_size && !cancel.is_cancelled() => {
                tracing::debug!(processed = stats.processed, "Reconciliation: full batch, draining again");
            }
            Ok(stats) => {
                if stats.processed == 0 {
                    tracing::debug!("Reconciliation: queue empty");
                }
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Reconciliation: batch failed");
                return;
            }
        }
    }
}
