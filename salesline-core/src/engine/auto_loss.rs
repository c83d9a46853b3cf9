use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::EngineSettings;
use crate::db::Database;
use crate::error::{CoreError, Result};
use crate::models::*;

/// Marks pipelines without activity for the inactivity window as lost.
#[derive(Clone)]
pub struct AutoLossDetector {
    db: Database,
    settings: EngineSettings,
}

impl AutoLossDetector {
    pub fn new(db: Database, settings: EngineSettings) -> Self {
        Self { db, settings }
    }

    /// Scans non-terminal pipelines whose last activity is at or before
    /// `as_of - window` and marks each one lost in its own transaction.
    ///
    /// A pipeline touched by another writer after the scan read it is skipped.
    /// Any other write failure is recorded in the report and the scan moves on.
    pub fn detect_and_mark_losses(&self, as_of: DateTime<Utc>) -> Result<AutoLossReport> {
        let cutoff = as_of - self.settings.inactivity_window();
        let candidates = self.db.stale_pipelines(cutoff)?;

        let mut report = AutoLossReport {
            scanned: candidates.len() as u32,
            ..AutoLossReport::default()
        };

        for pipeline in candidates {
            let transition = mark_lost(&pipeline, as_of);
            match self.db.commit_transition(&transition, pipeline.revision) {
                Ok(_) => {
                    tracing::info!(
                        pipeline = %pipeline.pipeline_number,
                        from = pipeline.current_stage.as_str(),
                        inactive_since = %pipeline.last_activity_at,
                        "Marked pipeline lost after inactivity"
                    );
                    report.marked_ids.push(pipeline.id);
                }
                Err(CoreError::Conflict { .. }) => {
                    tracing::debug!(
                        pipeline = %pipeline.pipeline_number,
                        "Pipeline changed during auto-loss scan, skipping"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        pipeline = %pipeline.pipeline_number,
                        error = %e,
                        "Failed to mark pipeline lost"
                    );
                    report.failures.push(AutoLossFailure {
                        pipeline_id: pipeline.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Runs a scan and records it in the run history.
    pub fn run(&self, trigger: RunTrigger, as_of: DateTime<Utc>) -> Result<AutoLossReport> {
        let started_at = Utc::now();
        let report = self.detect_and_mark_losses(as_of)?;

        let run = AutoLossRun {
            id: Uuid::new_v4(),
            trigger,
            as_of,
            started_at,
            finished_at: Utc::now(),
            scanned: report.scanned,
            marked: report.marked(),
            skipped: report.skipped,
            failed: report.failures.len() as u32,
        };
        // The marks are already committed; losing the history row must not
        // lose the report.
        if let Err(e) = self.db.record_auto_loss_run(&run) {
            tracing::error!(run_id = %run.id, error = %e, "Failed to record auto-loss run");
        }

        tracing::info!(
            trigger = trigger.as_str(),
            scanned = run.scanned,
            marked = run.marked,
            skipped = run.skipped,
            failed = run.failed,
            "Auto-loss detection finished"
        );
        Ok(report)
    }
}

fn mark_lost(pipeline: &Pipeline, as_of: DateTime<Utc>) -> Transition {
    let mut next = pipeline.clone();
    next.enter_stage(Stage::Lost, as_of);
    Transition {
        event: StageTransitionEvent::new(
            pipeline.id,
            pipeline.current_stage,
            Stage::Lost,
            TriggerReason::AutoLossInactivity,
            Actor::System,
            as_of,
        ),
        pipeline: next,
    }
}
