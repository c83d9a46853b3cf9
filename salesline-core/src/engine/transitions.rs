use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::EngineSettings;
use crate::db::Database;
use crate::error::{CoreError, Result};
use crate::models::*;

/// The automatic transition table. Returns the target stage and the reason
/// recorded on the event, or `None` when `signal` means nothing in `from`.
pub fn rule_for(
    from: Stage,
    signal: &Signal,
    settings: &EngineSettings,
) -> Option<(Stage, TriggerReason)> {
    match (from, signal) {
        (Stage::Lead, Signal::ScoreUpdated { score }) if *score >= settings.qualification_threshold => {
            Some((Stage::Qualified, TriggerReason::ScoreThreshold))
        }
        (Stage::Qualified, Signal::QuoteGenerated { .. }) => {
            Some((Stage::QuoteSent, TriggerReason::QuoteGenerated))
        }
        (Stage::TestDriveScheduled | Stage::TestDriveCompleted, Signal::ReservationCreated) => {
            Some((Stage::ReservationMade, TriggerReason::ReservationCreated))
        }
        _ => None,
    }
}

/// Evaluates one signal against one pipeline. Terminal pipelines never move.
pub fn evaluate(
    pipeline: &Pipeline,
    signal: &Signal,
    settings: &EngineSettings,
    now: DateTime<Utc>,
) -> Option<Transition> {
    if pipeline.is_terminal() {
        return None;
    }

    let (to, reason) = rule_for(pipeline.current_stage, signal, settings)?;
    let mut next = pipeline.clone();
    next.enter_stage(to, now);

    let event = StageTransitionEvent::new(
        pipeline.id,
        pipeline.current_stage,
        to,
        reason,
        Actor::System,
        now,
    );
    Some(Transition {
        pipeline: next,
        event,
    })
}

/// Applies signals and manual stage moves to stored pipelines.
#[derive(Clone)]
pub struct StageEngine {
    db: Database,
    settings: EngineSettings,
}

impl StageEngine {
    pub fn new(db: Database, settings: EngineSettings) -> Self {
        Self { db, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Loads the pipeline, evaluates `signal` and persists the outcome.
    ///
    /// The write is conditional on the revision that was read, so a concurrent
    /// writer makes this return [`CoreError::Conflict`] rather than clobbering it.
    pub fn apply_signal(&self, id: Uuid, signal: &Signal, now: DateTime<Utc>) -> Result<SignalOutcome> {
        if let Signal::ScoreUpdated { score } = signal {
            if *score > 100 {
                return Err(CoreError::InvalidInput(format!(
                    "lead score must be between 0 and 100, got {score}"
                )));
            }
        }

        let pipeline = self.db.get_pipeline(id)?.ok_or(CoreError::NotFound(id))?;
        if pipeline.is_terminal() {
            tracing::debug!(
                pipeline = %pipeline.pipeline_number,
                stage = pipeline.current_stage.as_str(),
                signal = signal.name(),
                "Ignoring signal for terminal pipeline"
            );
            return Ok(unchanged(pipeline));
        }

        let quoted = match signal {
            Signal::QuoteGenerated { amount } => *amount,
            _ => None,
        };

        match evaluate(&pipeline, signal, &self.settings, now) {
            Some(mut transition) => {
                if quoted.is_some() {
                    transition.pipeline.quote_amount = quoted;
                }
                let stored = self.db.commit_transition(&transition, pipeline.revision)?;
                tracing::info!(
                    pipeline = %stored.pipeline_number,
                    from = transition.event.from_stage.as_str(),
                    to = transition.event.to_stage.as_str(),
                    reason = transition.event.trigger_reason.as_str(),
                    "Pipeline advanced"
                );
                Ok(SignalOutcome {
                    pipeline: stored,
                    transitioned: true,
                    event: Some(transition.event),
                })
            }
            None if quoted.is_some() => {
                let mut updated = pipeline.clone();
                updated.quote_amount = quoted;
                updated.touch(now);
                let stored = self.db.commit_activity(&updated, pipeline.revision)?;
                Ok(unchanged(stored))
            }
            None => {
                tracing::debug!(
                    pipeline = %pipeline.pipeline_number,
                    stage = pipeline.current_stage.as_str(),
                    signal = signal.name(),
                    "No transition rule matched"
                );
                Ok(unchanged(pipeline))
            }
        }
    }

    /// Manual stage change by a user. Any stage may be targeted, including
    /// reopening a terminal pipeline; the move is logged with the user as actor.
    pub fn move_stage(&self, id: Uuid, input: MoveStageInput, now: DateTime<Utc>) -> Result<SignalOutcome> {
        if input.actor.trim().is_empty() {
            return Err(CoreError::InvalidInput("actor must not be empty".into()));
        }

        let pipeline = self.db.get_pipeline(id)?.ok_or(CoreError::NotFound(id))?;
        let expected = input.expected_revision.unwrap_or(pipeline.revision);
        if expected != pipeline.revision {
            return Err(CoreError::Conflict { id, expected });
        }
        if pipeline.current_stage == input.to_stage {
            return Ok(unchanged(pipeline));
        }

        let mut next = pipeline.clone();
        next.enter_stage(input.to_stage, now);
        let transition = Transition {
            event: StageTransitionEvent::new(
                id,
                pipeline.current_stage,
                input.to_stage,
                TriggerReason::Manual,
                Actor::User(input.actor),
                now,
            ),
            pipeline: next,
        };

        let stored = self.db.commit_transition(&transition, expected)?;
        tracing::info!(
            pipeline = %stored.pipeline_number,
            from = pipeline.current_stage.as_str(),
            to = input.to_stage.as_str(),
            "Pipeline moved manually"
        );
        Ok(SignalOutcome {
            pipeline: stored,
            transitioned: true,
            event: Some(transition.event),
        })
    }
}

fn unchanged(pipeline: Pipeline) -> SignalOutcome {
    SignalOutcome {
        pipeline,
        transitioned: false,
        event: None,
    }
}
