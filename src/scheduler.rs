//! Periodic auto-loss detection.

use std::time::Duration;

use chrono::Utc;
use salesline_core::models::RunTrigger;
use salesline_core::AutoLossDetector;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs the detector every `interval` until the task is aborted. The first
/// scan happens one interval after startup.
pub fn spawn_auto_loss_scheduler(detector: AutoLossDetector, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let detector = detector.clone();
            // The scan is synchronous SQLite work.
            let result =
                tokio::task::spawn_blocking(move || detector.run(RunTrigger::Scheduled, Utc::now()))
                    .await;

            match result {
                Ok(Ok(report)) if !report.failures.is_empty() => {
                    tracing::warn!(
                        failed = report.failures.len(),
                        "Scheduled auto-loss scan left pipelines unmarked"
                    );
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Scheduled auto-loss scan failed"),
                Err(e) => tracing::error!(error = %e, "Auto-loss scan task panicked"),
            }
        }
    })
}
