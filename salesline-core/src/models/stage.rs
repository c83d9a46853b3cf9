use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Lead,
    Qualified,
    QuoteSent,
    TestDriveScheduled,
    TestDriveCompleted,
    ReservationMade,
    Lost,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Self::Lead,
        Self::Qualified,
        Self::QuoteSent,
        Self::TestDriveScheduled,
        Self::TestDriveCompleted,
        Self::ReservationMade,
        Self::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Qualified => "qualified",
            Self::QuoteSent => "quote_sent",
            Self::TestDriveScheduled => "test_drive_scheduled",
            Self::TestDriveCompleted => "test_drive_completed",
            Self::ReservationMade => "reservation_made",
            Self::Lost => "lost",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "lead" => Some(Self::Lead),
            "qualified" => Some(Self::Qualified),
            "quote_sent" => Some(Self::QuoteSent),
            "test_drive_scheduled" => Some(Self::TestDriveScheduled),
            "test_drive_completed" => Some(Self::TestDriveCompleted),
            "reservation_made" => Some(Self::ReservationMade),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }

    /// No automatic transition applies once a pipeline reaches a terminal stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Lost | Self::ReservationMade)
    }

    /// Win probability assigned when a pipeline enters this stage.
    pub fn default_probability(&self) -> u8 {
        match self {
            Self::Lead => 10,
            Self::Qualified => 30,
            Self::QuoteSent => 50,
            Self::TestDriveScheduled => 60,
            Self::TestDriveCompleted => 75,
            Self::ReservationMade => 100,
            Self::Lost => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Probability band used by the list filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbabilityBand {
    Low,
    Medium,
    High,
}

impl ProbabilityBand {
    /// Inclusive probability range covered by the band.
    pub fn range(&self) -> (u8, u8) {
        match self {
            Self::Low => (0, 29),
            Self::Medium => (30, 69),
            Self::High => (70, 100),
        }
    }
}
