use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Stage;

/// Append-only record of one stage change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTransitionEvent {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub trigger_reason: TriggerReason,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

impl StageTransitionEvent {
    pub fn new(
        pipeline_id: Uuid,
        from_stage: Stage,
        to_stage: Stage,
        trigger_reason: TriggerReason,
        actor: Actor,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id,
            from_stage,
            to_stage,
            trigger_reason,
            actor,
            occurred_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    ScoreThreshold,
    QuoteGenerated,
    ReservationCreated,
    AutoLossInactivity,
    Manual,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScoreThreshold => "score_threshold",
            Self::QuoteGenerated => "quote_generated",
            Self::ReservationCreated => "reservation_created",
            Self::AutoLossInactivity => "auto_loss_inactivity",
            Self::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "score_threshold" => Some(Self::ScoreThreshold),
            "quote_generated" => Some(Self::QuoteGenerated),
            "reservation_created" => Some(Self::ReservationCreated),
            "auto_loss_inactivity" => Some(Self::AutoLossInactivity),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Who caused a transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Actor {
    System,
    User(String),
}

impl Actor {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User(_) => "user",
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::System => None,
            Self::User(name) => Some(name),
        }
    }

    pub fn from_parts(kind: &str, name: Option<String>) -> Option<Self> {
        match (kind, name) {
            ("system", _) => Some(Self::System),
            ("user", Some(name)) => Some(Self::User(name)),
            _ => None,
        }
    }
}
