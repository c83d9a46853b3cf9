//! Stage transition engine and auto-loss detector.

mod auto_loss;
mod transitions;

use chrono::Duration;
use serde::{Deserialize, Serialize};

pub use auto_loss::AutoLossDetector;
pub use transitions::{evaluate, rule_for, StageEngine};

pub const DEFAULT_QUALIFICATION_THRESHOLD: u8 = 70;
pub const DEFAULT_INACTIVITY_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineSettings {
    /// Minimum lead score that qualifies a lead.
    pub qualification_threshold: u8,
    /// Inactivity after which a pipeline is marked lost. Inclusive.
    pub inactivity_days: i64,
}

impl EngineSettings {
    pub fn inactivity_window(&self) -> Duration {
        Duration::days(self.inactivity_days)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            qualification_threshold: DEFAULT_QUALIFICATION_THRESHOLD,
            inactivity_days: DEFAULT_INACTIVITY_DAYS,
        }
    }
}
