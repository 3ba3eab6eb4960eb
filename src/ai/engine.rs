//! The insight engine: one typed operation per insight kind.
//!
//! Each operation sends one chat completion and parses the reply into its
//! typed record. Replies are allowed to be messy — wrapped in code fences or
//! prose — so parsing scans from the first `{`/`[` to the last `}`/`]`.
//! A reply that still fails to parse becomes the operation's documented
//! fallback value, never an error; only transport and credential failures
//! surface as `AiError`.

use async_trait::async_trait;

use crate::db::EnergyLevel;

use super::client::OpenRouterClient;
use super::prompts;
use super::types::{
    fallback_clarifying_questions, ParsedEmailTask, TaskBreakdown, TaskForScoring, TaskScore,
    UnstuckHelp,
};
use super::{AiError, InsightModel};

pub struct AiEngine {
    client: OpenRouterClient,
}

impl AiEngine {
    pub fn new(client: OpenRouterClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InsightModel for AiEngine {
    async fn breakdown(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<TaskBreakdown, AiError> {
        let reply = self
            .client
            .chat_completion(
                prompts::BREAKDOWN_SYSTEM,
                &prompts::breakdown_user(title, description),
                None,
            )
            .await?;
        Ok(parse_breakdown(&reply, title))
    }

    async fn clarifying_questions(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Vec<String>, AiError> {
        let reply = self
            .client
            .chat_completion(
                prompts::CLARIFY_SYSTEM,
                &prompts::clarify_user(title, description),
                None,
            )
            .await?;
        Ok(parse_questions(&reply))
    }

    async fn procrastination_help(
        &self,
        title: &str,
        description: Option<&str>,
        days_stale: i64,
    ) -> Result<UnstuckHelp, AiError> {
        let reply = self
            .client
            .chat_completion(
                prompts::UNSTUCK_SYSTEM,
                &prompts::unstuck_user(title, description, days_stale),
                None,
            )
            .await?;
        Ok(parse_unstuck(&reply))
    }

    async fn prioritize(
        &self,
        tasks: &[TaskForScoring],
        current_energy: Option<EnergyLevel>,
    ) -> Result<Vec<TaskScore>, AiError> {
        let reply = self
            .client
            .chat_completion(
                prompts::PRIORITIZE_SYSTEM,
                &prompts::prioritize_user(tasks, current_energy),
                None,
            )
            .await?;
        Ok(parse_scores(&reply, tasks))
    }

    async fn parse_email(
        &self,
        subject: &str,
        body: &str,
        from: Option<&str>,
    ) -> Result<ParsedEmailTask, AiError> {
        let reply = self
            .client
            .chat_completion(
                prompts::EMAIL_PARSE_SYSTEM,
                &prompts::email_parse_user(subject, body, from),
                None,
            )
            .await?;
        Ok(parse_email_task(&reply, subject, body))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Reply parsing
// ─────────────────────────────────────────────────────────────────────

/// Slice from the first `{` to the last `}`. Tolerates code fences and
/// surrounding prose.
fn extract_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Slice from the first `[` to the last `]`.
fn extract_array(reply: &str) -> Option<&str> {
    let start = reply.find('[')?;
    let end = reply.rfind(']')?;
    (end > start).then(|| &reply[start..=end])
}

fn parse_breakdown(reply: &str, title: &str) -> TaskBreakdown {
    extract_object(reply)
        .and_then(|json| match serde_json::from_str(json) {
            Ok(b) => Some(b),
            Err(e) => {
                log::debug!("Breakdown reply did not parse: {}", e);
                None
            }
        })
        .unwrap_or_else(|| TaskBreakdown::fallback(title))
}

fn parse_questions(reply: &str) -> Vec<String> {
    #[derive(serde::Deserialize)]
    struct QuestionsReply {
        #[serde(default)]
        questions: Vec<String>,
    }

    match extract_object(reply).map(serde_json::from_str::<QuestionsReply>) {
        Some(Ok(parsed)) => parsed.questions,
        _ => fallback_clarifying_questions(),
    }
}

fn parse_unstuck(reply: &str) -> UnstuckHelp {
    extract_object(reply)
        .and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_else(UnstuckHelp::fallback)
}

/// Parse the prioritization array element by element: a malformed element is
/// dropped (narrowing the result set), while a reply with no usable array at
/// all falls back to neutral scores for every input task.
fn parse_scores(reply: &str, tasks: &[TaskForScoring]) -> Vec<TaskScore> {
    let elements: Option<Vec<serde_json::Value>> =
        extract_array(reply).and_then(|json| serde_json::from_str(json).ok());

    match elements {
        Some(values) => values
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<TaskScore>(value) {
                Ok(score) => Some(score),
                Err(e) => {
                    log::debug!("Dropping unparseable score element: {}", e);
                    None
                }
            })
            .collect(),
        None => {
            log::warn!(
                "Prioritization reply unusable; defaulting {} tasks to neutral scores",
                tasks.len()
            );
            tasks.iter().map(|t| TaskScore::fallback(&t.id)).collect()
        }
    }
}

fn parse_email_task(reply: &str, subject: &str, body: &str) -> ParsedEmailTask {
    extract_object(reply)
        .and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_else(|| ParsedEmailTask::fallback(subject, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CognitiveLoad, Quadrant};

    #[test]
    fn test_parse_breakdown_from_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"subtasks\":[{\"title\":\"Outline\",\"energy\":\"low\",\"estimated_minutes\":10}],\"first_step\":\"Outline\",\"total_estimated_minutes\":45,\"cognitive_load\":\"heavy\"}\n```\nGood luck!";
        let breakdown = parse_breakdown(reply, "Write report");
        assert_eq!(breakdown.subtasks.len(), 1);
        assert_eq!(breakdown.cognitive_load, CognitiveLoad::Heavy);
        assert_eq!(breakdown.total_estimated_minutes, 45);
    }

    #[test]
    fn test_parse_breakdown_garbage_falls_back() {
        let breakdown = parse_breakdown("I can't help with that.", "Write report");
        assert_eq!(breakdown.subtasks.len(), 1);
        assert_eq!(breakdown.subtasks[0].title, "Write report");
        assert_eq!(breakdown.cognitive_load, CognitiveLoad::Moderate);
        assert_eq!(breakdown.total_estimated_minutes, 30);
    }

    #[test]
    fn test_parse_questions_missing_key_is_empty_not_fallback() {
        assert!(parse_questions("{\"notes\": []}").is_empty());
        // But an unparseable reply gets the canned questions.
        let fallback = parse_questions("no json here");
        assert_eq!(fallback.len(), 3);
    }

    #[test]
    fn test_parse_scores_drops_malformed_elements() {
        let tasks = vec![
            TaskForScoring { id: "t1".into(), title: "A".into(), description: None },
            TaskForScoring { id: "t2".into(), title: "B".into(), description: None },
            TaskForScoring { id: "t3".into(), title: "C".into(), description: None },
        ];
        let reply = r#"[
            {"task_id": "t1", "urgency_score": 8, "importance_score": 9,
             "eisenhower_quadrant": "Q1", "priority_score": 95, "reasoning": "due"},
            {"urgency_score": 1},
            {"task_id": "t3", "priority_score": 40}
        ]"#;
        let scores = parse_scores(reply, &tasks);
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].task_id, "t1");
        assert_eq!(scores[0].eisenhower_quadrant, Quadrant::Q1);
        assert_eq!(scores[1].task_id, "t3");
    }

    #[test]
    fn test_parse_scores_total_failure_defaults_all() {
        let tasks = vec![
            TaskForScoring { id: "t1".into(), title: "A".into(), description: None },
            TaskForScoring { id: "t2".into(), title: "B".into(), description: None },
        ];
        let scores = parse_scores("sorry, I cannot rank these", &tasks);
        assert_eq!(scores.len(), 2);
        for score in &scores {
            assert_eq!(score.priority_score, 50.0);
            assert_eq!(score.urgency_score, 5.0);
            assert_eq!(score.eisenhower_quadrant, Quadrant::Q2);
            assert_eq!(score.reasoning, "Unable to analyze");
        }
    }

    #[test]
    fn test_parse_email_task_fallback_truncates_body() {
        let body = "b".repeat(900);
        let parsed = parse_email_task("not json", "Invoice overdue", &body);
        assert_eq!(parsed.task_title, "Invoice overdue");
        assert_eq!(parsed.task_description.len(), 500);
        assert!(parsed.needs_clarification);
    }
}
