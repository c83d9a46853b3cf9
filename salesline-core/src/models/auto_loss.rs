use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Scheduled,
    Manual,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// A pipeline the detector could not persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoLossFailure {
    pub pipeline_id: Uuid,
    pub error: String,
}

/// Outcome of one detector pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoLossReport {
    pub scanned: u32,
    pub marked_ids: Vec<Uuid>,
    /// Pipelines modified by another writer between the scan and the update.
    pub skipped: u32,
    pub failures: Vec<AutoLossFailure>,
}

impl AutoLossReport {
    pub fn marked(&self) -> u32 {
        self.marked_ids.len() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoLossRun {
    pub id: Uuid,
    pub trigger: RunTrigger,
    pub as_of: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scanned: u32,
    pub marked: u32,
    pub skipped: u32,
    pub failed: u32,
}
