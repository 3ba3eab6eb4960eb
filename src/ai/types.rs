//! Typed response records for each insight operation.
//!
//! The completion model is prompted to answer with one fixed JSON shape per
//! operation. Each shape has a typed record here plus a documented literal
//! fallback used when the response cannot be parsed — malformed model output
//! is never surfaced to callers as an error.

use serde::{Deserialize, Serialize};

use crate::db::{CognitiveLoad, EnergyLevel, Quadrant};

/// One suggested subtask inside a breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskSuggestion {
    pub title: String,
    #[serde(default = "default_energy", deserialize_with = "lenient_energy")]
    pub energy: EnergyLevel,
    #[serde(default = "default_subtask_minutes")]
    pub estimated_minutes: i64,
}

/// Structured breakdown of a task into actionable steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBreakdown {
    #[serde(default)]
    pub subtasks: Vec<SubtaskSuggestion>,
    #[serde(default)]
    pub first_step: String,
    #[serde(default = "default_total_minutes")]
    pub total_estimated_minutes: i64,
    #[serde(default = "default_load", deserialize_with = "lenient_load")]
    pub cognitive_load: CognitiveLoad,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<String>,
}

impl TaskBreakdown {
    /// Conservative default when the model response fails to parse: a single
    /// subtask echoing the task title, medium energy, 30 minutes, moderate
    /// load.
    pub fn fallback(title: &str) -> Self {
        Self {
            subtasks: vec![SubtaskSuggestion {
                title: title.to_string(),
                energy: EnergyLevel::Medium,
                estimated_minutes: 30,
            }],
            first_step: title.to_string(),
            total_estimated_minutes: 30,
            cognitive_load: CognitiveLoad::Moderate,
            tips: None,
        }
    }
}

/// Procrastination coaching for a task that has been sitting too long.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UnstuckHelp {
    #[serde(default)]
    pub likely_blockers: Vec<String>,
    #[serde(default)]
    pub unstuck_questions: Vec<String>,
    #[serde(default)]
    pub tiny_first_step: String,
    #[serde(default)]
    pub reframe: String,
    #[serde(default)]
    pub encouragement: String,
}

impl UnstuckHelp {
    pub fn fallback() -> Self {
        Self {
            likely_blockers: vec![
                "Task feels overwhelming".to_string(),
                "Unclear where to start".to_string(),
            ],
            unstuck_questions: vec!["What's the easiest part of this?".to_string()],
            tiny_first_step: "Spend 5 minutes researching the first step".to_string(),
            reframe: "You don't have to finish it all today".to_string(),
            encouragement: "Starting is the hardest part. You've got this!".to_string(),
        }
    }
}

/// One task's prioritization scores, matched to input tasks by `task_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskScore {
    pub task_id: String,
    #[serde(default)]
    pub urgency_score: f64,
    #[serde(default)]
    pub importance_score: f64,
    #[serde(default = "default_quadrant")]
    pub eisenhower_quadrant: Quadrant,
    #[serde(default)]
    pub priority_score: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl TaskScore {
    /// Neutral score assigned to every task when the whole prioritization
    /// response is unusable.
    pub fn fallback(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            urgency_score: 5.0,
            importance_score: 5.0,
            eisenhower_quadrant: Quadrant::Q2,
            priority_score: 50.0,
            reasoning: "Unable to analyze".to_string(),
        }
    }
}

/// Minimal task view handed to the prioritization prompt.
#[derive(Debug, Clone)]
pub struct TaskForScoring {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
}

/// Suggested priority for a task extracted from an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedPriority {
    High,
    Medium,
    Low,
}

impl SuggestedPriority {
    /// TickTick numeric priority: high=5, medium=3, low=1.
    pub fn ticktick_value(&self) -> i64 {
        match self {
            Self::High => 5,
            Self::Medium => 3,
            Self::Low => 1,
        }
    }
}

/// Task fields extracted from an email body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ParsedEmailTask {
    pub task_title: String,
    #[serde(default)]
    pub task_description: String,
    #[serde(default = "default_priority", deserialize_with = "lenient_priority")]
    pub suggested_priority: SuggestedPriority,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarifying_questions: Vec<String>,
    #[serde(default)]
    pub suggested_project: Option<String>,
    #[serde(default = "default_true")]
    pub is_actionable: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl ParsedEmailTask {
    pub fn fallback(subject: &str, body: &str) -> Self {
        Self {
            task_title: subject.to_string(),
            task_description: truncate_chars(body, 500),
            suggested_priority: SuggestedPriority::Medium,
            needs_clarification: true,
            clarifying_questions: vec![
                "What is the desired outcome?".to_string(),
                "When does this need to be done?".to_string(),
            ],
            suggested_project: None,
            is_actionable: true,
            reasoning: "Fallback parsing due to AI response error".to_string(),
        }
    }
}

/// Default clarifying questions when the model response fails to parse.
pub fn fallback_clarifying_questions() -> Vec<String> {
    vec![
        "What does success look like for this task?".to_string(),
        "What's the first concrete step?".to_string(),
        "What might block progress on this?".to_string(),
    ]
}

/// Truncate to at most `max` characters on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn default_energy() -> EnergyLevel {
    EnergyLevel::Medium
}

fn default_subtask_minutes() -> i64 {
    15
}

fn default_total_minutes() -> i64 {
    30
}

fn default_load() -> CognitiveLoad {
    CognitiveLoad::Moderate
}

fn default_quadrant() -> Quadrant {
    Quadrant::Q2
}

fn default_priority() -> SuggestedPriority {
    SuggestedPriority::Medium
}

fn default_true() -> bool {
    true
}

/// Accept any string for an energy level; unknown values become medium.
fn lenient_energy<'de, D>(deserializer: D) -> Result<EnergyLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(EnergyLevel::parse(&raw).unwrap_or(EnergyLevel::Medium))
}

/// Accept any string for a cognitive load; unknown values become moderate.
fn lenient_load<'de, D>(deserializer: D) -> Result<CognitiveLoad, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(CognitiveLoad::parse(&raw).unwrap_or(CognitiveLoad::Moderate))
}

/// Accept any string for a suggested priority; unknown values become medium.
fn lenient_priority<'de, D>(deserializer: D) -> Result<SuggestedPriority, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(match raw.to_lowercase().as_str() {
        "high" => SuggestedPriority::High,
        "low" => SuggestedPriority::Low,
        _ => SuggestedPriority::Medium,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakdown_fallback_shape() {
        let fb = TaskBreakdown::fallback("Write report");
        assert_eq!(fb.subtasks.len(), 1);
        assert_eq!(fb.subtasks[0].title, "Write report");
        assert_eq!(fb.subtasks[0].energy, EnergyLevel::Medium);
        assert_eq!(fb.total_estimated_minutes, 30);
        assert_eq!(fb.cognitive_load, CognitiveLoad::Moderate);
    }

    #[test]
    fn test_breakdown_lenient_load() {
        let json = r#"{"subtasks": [], "cognitive_load": "enormous"}"#;
        let parsed: TaskBreakdown = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.cognitive_load, CognitiveLoad::Moderate);

        let json = r#"{"subtasks": [], "cognitive_load": "heavy"}"#;
        let parsed: TaskBreakdown = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.cognitive_load, CognitiveLoad::Heavy);
    }

    #[test]
    fn test_task_score_defaults() {
        let json = r#"{"task_id": "t1", "priority_score": 80}"#;
        let score: TaskScore = serde_json::from_str(json).unwrap();
        assert_eq!(score.task_id, "t1");
        assert_eq!(score.priority_score, 80.0);
        assert_eq!(score.eisenhower_quadrant, Quadrant::Q2);
    }

    #[test]
    fn test_suggested_priority_ticktick_values() {
        assert_eq!(SuggestedPriority::High.ticktick_value(), 5);
        assert_eq!(SuggestedPriority::Medium.ticktick_value(), 3);
        assert_eq!(SuggestedPriority::Low.ticktick_value(), 1);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 500), "short");
    }
}
