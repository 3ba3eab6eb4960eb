//! Wire types for the TickTick open API.

use serde::{Deserialize, Serialize};

/// Task status values used by the API: 0 = active, 2 = completed.
pub const STATUS_ACTIVE: i64 = 0;
pub const STATUS_COMPLETED: i64 = 2;

/// A task as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl TickTask {
    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }
}

/// A project (list/folder) a task belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickProject {
    pub id: String,
    pub name: String,
}

/// Fields for creating a task.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// OAuth token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_deserializes_camel_case() {
        let json = r#"{"id":"t1","title":"Write report","content":"Q3 summary",
                       "projectId":"p1","status":0,"dueDate":"2026-08-09T00:00:00.000+0000"}"#;
        let task: TickTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.project_id.as_deref(), Some("p1"));
        assert_eq!(task.due_date.as_deref(), Some("2026-08-09T00:00:00.000+0000"));
        assert!(!task.is_completed());
    }

    #[test]
    fn test_new_task_skips_absent_fields() {
        let new = NewTask {
            title: "Reply to Sam".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&new).unwrap();
        assert_eq!(json, r#"{"title":"Reply to Sam"}"#);
    }
}
