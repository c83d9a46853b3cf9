use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Pipeline, StageTransitionEvent};

/// External occurrence that may advance a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// The external lead scorer produced a new score (0-100).
    ScoreUpdated { score: u8 },
    QuoteGenerated {
        #[serde(default)]
        amount: Option<Decimal>,
    },
    ReservationCreated,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ScoreUpdated { .. } => "score_updated",
            Self::QuoteGenerated { .. } => "quote_generated",
            Self::ReservationCreated => "reservation_created",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub pipeline: Pipeline,
    pub transitioned: bool,
    pub event: Option<StageTransitionEvent>,
}
