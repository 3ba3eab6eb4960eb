//! Prompt builders for each insight operation.
//!
//! Every prompt instructs the model to answer with one fixed JSON shape; the
//! matching typed record and fallback live in `ai::types`.

use crate::db::EnergyLevel;

use super::types::TaskForScoring;

pub const BREAKDOWN_SYSTEM: &str = r#"You are an ADHD-friendly task breakdown assistant. Your goal is to:
1. Break down tasks into 3-7 specific, actionable subtasks
2. Make each subtask concrete and achievable in one sitting
3. Order subtasks logically
4. Identify the energy level needed (low/medium/high)
5. Estimate time for each subtask in minutes
6. Suggest the first "quick win" step to build momentum

Respond ONLY with valid JSON in this exact format:
{
    "subtasks": [
        {"title": "...", "energy": "low|medium|high", "estimated_minutes": 15}
    ],
    "first_step": "The easiest first action to build momentum",
    "total_estimated_minutes": 90,
    "cognitive_load": "light|moderate|heavy",
    "tips": "Optional ADHD-friendly tips for completing this task"
}"#;

pub const CLARIFY_SYSTEM: &str = r#"You are an ADHD-friendly task clarification assistant.
Generate 2-4 specific clarifying questions that will help make a vague task more actionable.
Focus on: desired outcome, success criteria, first steps, potential blockers.

Respond ONLY with valid JSON in this format:
{
    "questions": ["Question 1?", "Question 2?", "Question 3?"]
}"#;

pub const UNSTUCK_SYSTEM: &str = r#"You are an ADHD-friendly productivity coach helping someone unstuck.
Be empathetic, specific, and action-oriented. Avoid guilt or pressure.

Respond ONLY with valid JSON in this format:
{
    "likely_blockers": ["Blocker 1", "Blocker 2"],
    "unstuck_questions": ["Question to identify the real issue?"],
    "tiny_first_step": "The smallest possible action to start",
    "reframe": "A less overwhelming way to think about this task",
    "encouragement": "Brief, genuine encouragement"
}"#;

pub const PRIORITIZE_SYSTEM: &str = r#"You are a task prioritization expert using the Eisenhower Matrix.
For each task, provide:
- urgency_score (0-10): How time-sensitive is this?
- importance_score (0-10): How much does this matter for goals?
- eisenhower_quadrant: Q1 (urgent+important), Q2 (important, not urgent), Q3 (urgent, not important), Q4 (neither)
- priority_score (0-100): Overall priority
- reasoning: Brief explanation

Respond ONLY with valid JSON array:
[
    {
        "task_id": "id",
        "urgency_score": 8,
        "importance_score": 9,
        "eisenhower_quadrant": "Q1",
        "priority_score": 95,
        "reasoning": "..."
    }
]"#;

pub const EMAIL_PARSE_SYSTEM: &str = r#"You are an email-to-task parser for an ADHD-friendly task manager.
Extract actionable task information from emails. Focus on:
1. Clear, concise task title (what needs to be done)
2. Relevant description (remove email signatures, headers, irrelevant content)
3. Suggested priority based on urgency indicators
4. Whether the task needs clarification

Respond ONLY with valid JSON:
{
    "task_title": "Clean, action-oriented title",
    "task_description": "Concise description with key details",
    "suggested_priority": "high|medium|low",
    "needs_clarification": true/false,
    "clarifying_questions": ["Question 1?", "Question 2?"],
    "suggested_project": "Work|Personal|null",
    "is_actionable": true/false,
    "reasoning": "Brief explanation of parsing decisions"
}"#;

/// User prompt for the breakdown operation.
pub fn breakdown_user(title: &str, description: Option<&str>) -> String {
    format!(
        "Task: {}\n{}\nBreak this down into actionable subtasks.",
        title,
        description
            .filter(|d| !d.is_empty())
            .map(|d| format!("Description: {}\n", d))
            .unwrap_or_default(),
    )
}

/// User prompt for the clarifying-questions operation.
pub fn clarify_user(title: &str, description: Option<&str>) -> String {
    format!(
        "Task: {}\n{}\nThis task seems vague. What questions should I ask to make it more actionable?",
        title,
        description
            .filter(|d| !d.is_empty())
            .map(|d| format!("Description: {}\n", d))
            .unwrap_or_default(),
    )
}

/// User prompt for the procrastination-help operation.
pub fn unstuck_user(title: &str, description: Option<&str>, days_stale: i64) -> String {
    format!(
        "Task: {}\n{}Days sitting: {}\n\nHelp me figure out why I'm stuck and how to move forward.",
        title,
        description
            .filter(|d| !d.is_empty())
            .map(|d| format!("Description: {}\n", d))
            .unwrap_or_default(),
        days_stale,
    )
}

/// User prompt for the batch prioritization operation: one summary line per
/// task, descriptions clipped to 100 characters.
pub fn prioritize_user(tasks: &[TaskForScoring], current_energy: Option<EnergyLevel>) -> String {
    let summary = tasks
        .iter()
        .map(|t| {
            let mut line = format!("- [{}] {}", t.id, t.title);
            if let Some(desc) = t.description.as_deref().filter(|d| !d.is_empty()) {
                line.push_str(": ");
                line.push_str(&super::types::truncate_chars(desc, 100));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Tasks to prioritize:\n{}\n\n{}Prioritize these tasks.",
        summary,
        current_energy
            .map(|e| format!("Current energy level: {}\n\n", e.as_str()))
            .unwrap_or_default(),
    )
}

/// User prompt for the email-parse operation. The body is clipped to 2000
/// characters.
pub fn email_parse_user(subject: &str, body: &str, from: Option<&str>) -> String {
    format!(
        "Email Subject: {}\n{}\nEmail Body:\n{}\n\nParse this email into a task.",
        subject,
        from.filter(|f| !f.is_empty())
            .map(|f| format!("From: {}\n", f))
            .unwrap_or_default(),
        super::types::truncate_chars(body, 2000),
    )
}
