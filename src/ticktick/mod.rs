//! TickTick integration: the external task service.
//!
//! [`TaskService`] is the seam the analyzer, prioritizer, and email bridge
//! depend on; [`TickTickClient`] is the live implementation. OAuth token glue
//! lives in [`oauth`].

use async_trait::async_trait;
use thiserror::Error;

mod client;
pub mod oauth;
mod types;

pub use client::TickTickClient;
pub use oauth::TickTickOAuth;
pub use types::{NewTask, TickProject, TickTask, TokenResponse};

/// Errors from the external task service.
#[derive(Debug, Error)]
pub enum TaskServiceError {
    #[error("Task service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Task service error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("{0}")]
    Auth(String),

    #[error("Failed to encode request: {0}")]
    Encode(String),
}

/// Operations the rest of the system needs from the task service.
#[async_trait]
pub trait TaskService: Send + Sync {
    /// List tasks across all projects, optionally filtered by completion.
    async fn list_tasks(&self, completed: Option<bool>) -> Result<Vec<TickTask>, TaskServiceError>;

    /// Fetch one task by id.
    async fn get_task(&self, task_id: &str) -> Result<TickTask, TaskServiceError>;

    /// Create a new task.
    async fn create_task(&self, new_task: &NewTask) -> Result<TickTask, TaskServiceError>;

    /// Create a subtask under an existing task.
    async fn add_subtask(
        &self,
        parent_task_id: &str,
        title: &str,
        content: Option<&str>,
    ) -> Result<TickTask, TaskServiceError>;

    /// Mark a task completed.
    async fn complete_task(&self, task_id: &str) -> Result<(), TaskServiceError>;

    /// Replace a task's description text.
    async fn update_content(&self, task_id: &str, content: &str) -> Result<(), TaskServiceError>;
}
