use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::IntoDeserializer;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::{Priority, ProbabilityBand, Stage, StageTransitionEvent};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pipeline {
    pub id: Uuid,
    pub pipeline_number: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub current_stage: Stage,
    pub previous_stage: Option<Stage>,
    pub stage_entered_at: DateTime<Utc>,
    pub sales_rep_id: Option<Uuid>,
    pub vehicle_interest: String,
    pub quote_amount: Option<Decimal>,
    pub probability: u8,
    pub priority: Priority,
    pub next_action: Option<String>,
    pub next_action_due: Option<DateTime<Utc>>,
    pub auto_logged_events_count: u32,
    pub manual_notes_count: u32,
    pub attachments_count: u32,
    pub branch_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub last_activity_at: DateTime<Utc>,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pipeline {
    /// Whole hours spent in the current stage as of `now`.
    pub fn stage_duration_hours(&self, now: DateTime<Utc>) -> i64 {
        (now - self.stage_entered_at).num_hours().max(0)
    }

    pub fn is_terminal(&self) -> bool {
        self.current_stage.is_terminal()
    }

    /// Moves the pipeline into `to`, resetting the stage clock.
    pub(crate) fn enter_stage(&mut self, to: Stage, now: DateTime<Utc>) {
        self.previous_stage = Some(self.current_stage);
        self.current_stage = to;
        self.stage_entered_at = now;
        self.probability = to.default_probability();
        self.touch(now);
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
        self.updated_at = now;
    }
}

/// Pipeline as returned to clients, with its derived stage duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineView {
    #[serde(flatten)]
    pub pipeline: Pipeline,
    pub stage_duration_hours: i64,
}

impl PipelineView {
    pub fn new(pipeline: Pipeline, now: DateTime<Utc>) -> Self {
        let stage_duration_hours = pipeline.stage_duration_hours(now);
        Self {
            pipeline,
            stage_duration_hours,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineWithEvents {
    #[serde(flatten)]
    pub pipeline: PipelineView,
    pub events: Vec<StageTransitionEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipelineInput {
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub vehicle_interest: String,
    pub branch_id: Uuid,
    pub sales_rep_id: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub stage: Option<Stage>,
    pub quote_amount: Option<Decimal>,
    pub probability: Option<u8>,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub next_action: Option<String>,
    pub next_action_due: Option<DateTime<Utc>>,
}

impl CreatePipelineInput {
    pub fn new(
        customer_name: impl Into<String>,
        vehicle_interest: impl Into<String>,
        branch_id: Uuid,
    ) -> Self {
        Self {
            customer_name: customer_name.into(),
            customer_phone: None,
            customer_email: None,
            vehicle_interest: vehicle_interest.into(),
            branch_id,
            sales_rep_id: None,
            lead_id: None,
            stage: None,
            quote_amount: None,
            probability: None,
            priority: None,
            next_action: None,
            next_action_due: None,
        }
    }
}

/// Manual edit of the user-owned fields. Stage changes go through signals or
/// explicit stage moves so they are always logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePipelineInput {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub sales_rep_id: Option<Uuid>,
    pub vehicle_interest: Option<String>,
    pub quote_amount: Option<Decimal>,
    pub probability: Option<u8>,
    pub priority: Option<Priority>,
    pub next_action: Option<String>,
    pub next_action_due: Option<DateTime<Utc>>,
    pub expected_revision: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveStageInput {
    pub to_stage: Stage,
    pub actor: String,
    pub expected_revision: Option<i64>,
}

/// List filter. An empty value (`?current_stage=`) means "any".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineFilter {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub search: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub current_stage: Option<Stage>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub sales_rep_id: Option<Uuid>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub branch_id: Option<Uuid>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub probability: Option<ProbabilityBand>,
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => {
            T::deserialize(IntoDeserializer::<D::Error>::into_deserializer(value)).map(Some)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCount {
    pub stage: Stage,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total: u32,
    pub by_stage: Vec<StageCount>,
    pub auto_logged_events: u64,
    pub manual_notes: u64,
    pub due_for_auto_loss: u32,
}

/// A stage change computed by the engine and not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub pipeline: Pipeline,
    pub event: StageTransitionEvent,
}
