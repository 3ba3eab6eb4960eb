//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Corrupt JSON column: {0}")]
    Json(#[from] serde_json::Error),
}

/// Energy required to work on a task (or reported by the user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

impl EnergyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// AI-assigned qualitative effort tier for a whole task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CognitiveLoad {
    Light,
    Moderate,
    Heavy,
}

impl CognitiveLoad {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Moderate => "moderate",
            Self::Heavy => "heavy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Self::Light),
            "moderate" => Some(Self::Moderate),
            "heavy" => Some(Self::Heavy),
            _ => None,
        }
    }

    /// Fixed load→energy mapping. Unknown loads are handled at the call
    /// site by defaulting the load itself to `Moderate`.
    pub fn energy_level(&self) -> EnergyLevel {
        match self {
            Self::Light => EnergyLevel::Low,
            Self::Moderate => EnergyLevel::Medium,
            Self::Heavy => EnergyLevel::High,
        }
    }
}

/// Eisenhower matrix quadrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quadrant {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quadrant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Q1 => "Q1",
            Self::Q2 => "Q2",
            Self::Q3 => "Q3",
            Self::Q4 => "Q4",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Q1" => Some(Self::Q1),
            "Q2" => Some(Self::Q2),
            "Q3" => Some(Self::Q3),
            "Q4" => Some(Self::Q4),
            _ => None,
        }
    }
}

/// Coarse daypart bucket for energy samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "morning" => Some(Self::Morning),
            "afternoon" => Some(Self::Afternoon),
            "evening" => Some(Self::Evening),
            "night" => Some(Self::Night),
            _ => None,
        }
    }

    /// Bucket an hour-of-day: 05–12 morning, 12–17 afternoon,
    /// 17–21 evening, everything else night.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=16 => Self::Afternoon,
            17..=20 => Self::Evening,
            _ => Self::Night,
        }
    }
}

/// Which mailbox a task originated from, when created via email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailSource {
    Gmail,
    Outlook,
}

impl EmailSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Outlook => "outlook",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gmail" => Some(Self::Gmail),
            "outlook" => Some(Self::Outlook),
            _ => None,
        }
    }
}

/// Self-reported focus quality attached to an energy sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusQuality {
    Scattered,
    Moderate,
    Focused,
}

impl FocusQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scattered => "scattered",
            Self::Moderate => "moderate",
            Self::Focused => "focused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scattered" => Some(Self::Scattered),
            "moderate" => Some(Self::Moderate),
            "focused" => Some(Self::Focused),
            _ => None,
        }
    }
}

/// A row from the `users` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbUser {
    pub id: i64,
    pub ticktick_user_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,

    pub gmail_access_token: Option<String>,
    pub gmail_refresh_token: Option<String>,
    pub gmail_token_expiry: Option<String>,
    pub gmail_email: Option<String>,

    pub outlook_access_token: Option<String>,
    pub outlook_refresh_token: Option<String>,
    pub outlook_token_expiry: Option<String>,
    pub outlook_email: Option<String>,
}

/// A row from the `task_insights` table.
///
/// Timestamps are RFC 3339 TEXT; JSON columns are deserialized into their
/// typed form on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTaskInsight {
    pub id: i64,
    pub user_id: i64,
    pub external_task_id: String,
    pub project_ref: Option<String>,

    pub title: String,
    pub description: Option<String>,

    pub ai_breakdown: Option<crate::ai::TaskBreakdown>,
    pub clarifying_questions: Option<Vec<String>>,
    pub clarifying_answers: Option<std::collections::BTreeMap<String, String>>,

    pub energy_level: Option<EnergyLevel>,
    pub cognitive_load: Option<CognitiveLoad>,
    pub estimated_duration_minutes: Option<i64>,
    pub actual_duration_minutes: Option<i64>,

    pub priority_score: Option<f64>,
    pub urgency_score: Option<f64>,
    pub importance_score: Option<f64>,
    pub eisenhower_quadrant: Option<Quadrant>,

    pub first_seen_at: String,
    pub last_updated_at: String,
    pub days_since_created: i64,
    pub times_deferred: i64,
    pub blockers_identified: Option<Vec<String>>,

    pub completed: bool,
    pub completed_at: Option<String>,

    pub email_source: Option<EmailSource>,
    pub email_message_id: Option<String>,
    pub email_link: Option<String>,
    pub email_has_attachments: bool,
    pub email_attachment_count: Option<i64>,
    pub email_subject: Option<String>,
    pub email_from: Option<String>,
    pub email_received_at: Option<String>,
}

/// A row from the `energy_samples` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbEnergySample {
    pub id: i64,
    pub user_id: i64,
    pub timestamp: String,
    pub energy_level: EnergyLevel,
    pub focus_quality: Option<FocusQuality>,
    pub time_of_day: TimeOfDay,
    pub day_of_week: String,
    pub tasks_completed: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cognitive_load_energy_mapping() {
        assert_eq!(CognitiveLoad::Light.energy_level(), EnergyLevel::Low);
        assert_eq!(CognitiveLoad::Moderate.energy_level(), EnergyLevel::Medium);
        assert_eq!(CognitiveLoad::Heavy.energy_level(), EnergyLevel::High);
    }

    #[test]
    fn test_time_of_day_buckets() {
        assert_eq!(TimeOfDay::from_hour(5), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(11), TimeOfDay::Morning);
        assert_eq!(TimeOfDay::from_hour(12), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(16), TimeOfDay::Afternoon);
        assert_eq!(TimeOfDay::from_hour(17), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(20), TimeOfDay::Evening);
        assert_eq!(TimeOfDay::from_hour(21), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(4), TimeOfDay::Night);
        assert_eq!(TimeOfDay::from_hour(0), TimeOfDay::Night);
    }

    #[test]
    fn test_enum_round_trips() {
        for level in [EnergyLevel::Low, EnergyLevel::Medium, EnergyLevel::High] {
            assert_eq!(EnergyLevel::parse(level.as_str()), Some(level));
        }
        for q in [Quadrant::Q1, Quadrant::Q2, Quadrant::Q3, Quadrant::Q4] {
            assert_eq!(Quadrant::parse(q.as_str()), Some(q));
        }
        assert_eq!(EnergyLevel::parse("extreme"), None);
        assert_eq!(Quadrant::parse("Q5"), None);
    }
}
