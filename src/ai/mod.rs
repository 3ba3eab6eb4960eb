//! AI insight generation.
//!
//! One typed operation per insight kind (breakdown, clarifying questions,
//! procrastination help, prioritization, email parsing), all backed by a
//! single chat-completion endpoint. The [`InsightModel`] trait is the seam
//! services depend on; [`AiEngine`] is the OpenRouter-backed implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::db::EnergyLevel;

mod client;
mod engine;
pub mod prompts;
mod types;

pub use client::OpenRouterClient;
pub use engine::AiEngine;
pub use types::{
    fallback_clarifying_questions, ParsedEmailTask, SubtaskSuggestion, SuggestedPriority,
    TaskBreakdown, TaskForScoring, TaskScore, UnstuckHelp,
};

/// Transport-level failures of the completion call. Malformed model output is
/// NOT an error — each operation substitutes its documented fallback instead.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("Completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Completion API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("{0}")]
    Auth(String),

    #[error("Completion API returned no message content")]
    EmptyResponse,
}

/// The five insight operations, each returning one fixed typed shape.
#[async_trait]
pub trait InsightModel: Send + Sync {
    /// Break a task into subtasks with energy and time estimates.
    async fn breakdown(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<TaskBreakdown, AiError>;

    /// Generate clarifying questions for a vague task.
    async fn clarifying_questions(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<Vec<String>, AiError>;

    /// Coaching output for a task that has been sitting `days_stale` days.
    async fn procrastination_help(
        &self,
        title: &str,
        description: Option<&str>,
        days_stale: i64,
    ) -> Result<UnstuckHelp, AiError>;

    /// Score a batch of tasks. One element per input task, matched by id;
    /// partial replies narrow the result set.
    async fn prioritize(
        &self,
        tasks: &[TaskForScoring],
        current_energy: Option<EnergyLevel>,
    ) -> Result<Vec<TaskScore>, AiError>;

    /// Extract task fields from an email.
    async fn parse_email(
        &self,
        subject: &str,
        body: &str,
        from: Option<&str>,
    ) -> Result<ParsedEmailTask, AiError>;
}
