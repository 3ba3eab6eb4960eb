//! HTTP client for the TickTick open API.
//!
//! Bearer-token auth against `https://api.ticktick.com/open/v1`. The API has
//! no flat task listing — tasks are fetched project by project via
//! `/project/{id}/data`, and a single project failing does not abort the
//! sweep.

use async_trait::async_trait;
use serde::Deserialize;

use super::{NewTask, TaskService, TaskServiceError, TickProject, TickTask};
use super::types::{STATUS_ACTIVE, STATUS_COMPLETED};

const TICKTICK_API_BASE: &str = "https://api.ticktick.com/open/v1";

pub struct TickTickClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

/// Payload of `/project/{id}/data`.
#[derive(Deserialize)]
struct ProjectData {
    #[serde(default)]
    tasks: Vec<TickTask>,
}

impl TickTickClient {
    pub fn new(access_token: &str) -> Self {
        Self::with_base_url(TICKTICK_API_BASE, access_token)
    }

    /// Point the client at a different API base. Used by tests.
    pub fn with_base_url(base_url: &str, access_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, TaskServiceError> {
        let url = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let mut req = self
            .client
            .request(method, url)
            .bearer_auth(&self.access_token);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TaskServiceError::Auth(format!(
                "TickTick rejected credentials ({})",
                status
            )));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TaskServiceError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(resp.json().await?)
    }

    /// All projects the user can see.
    pub async fn list_projects(&self) -> Result<Vec<TickProject>, TaskServiceError> {
        self.request(reqwest::Method::GET, "/project", None).await
    }

    /// Replace a task wholesale. The API wants the full task object back, so
    /// callers go through read-modify-write (`update_content`).
    async fn post_task_object(
        &self,
        task_id: &str,
        task: &serde_json::Value,
    ) -> Result<TickTask, TaskServiceError> {
        self.request(reqwest::Method::POST, &format!("/task/{}", task_id), Some(task))
            .await
    }

    async fn get_task_raw(&self, task_id: &str) -> Result<serde_json::Value, TaskServiceError> {
        self.request(reqwest::Method::GET, &format!("/task/{}", task_id), None)
            .await
    }
}

#[async_trait]
impl TaskService for TickTickClient {
    /// Aggregate tasks across every project, optionally filtered by
    /// completion status. A project whose data fetch fails is skipped with a
    /// warning rather than failing the whole listing.
    async fn list_tasks(&self, completed: Option<bool>) -> Result<Vec<TickTask>, TaskServiceError> {
        let projects = self.list_projects().await?;

        let mut all_tasks = Vec::new();
        for project in &projects {
            let data: Result<ProjectData, _> = self
                .request(
                    reqwest::Method::GET,
                    &format!("/project/{}/data", project.id),
                    None,
                )
                .await;
            match data {
                Ok(data) => all_tasks.extend(data.tasks),
                Err(TaskServiceError::Auth(e)) => return Err(TaskServiceError::Auth(e)),
                Err(e) => {
                    log::warn!("Skipping project {} ({}): {}", project.id, project.name, e);
                }
            }
        }

        if let Some(completed) = completed {
            let wanted = if completed { STATUS_COMPLETED } else { STATUS_ACTIVE };
            all_tasks.retain(|t| t.status == wanted);
        }

        Ok(all_tasks)
    }

    async fn get_task(&self, task_id: &str) -> Result<TickTask, TaskServiceError> {
        self.request(reqwest::Method::GET, &format!("/task/{}", task_id), None)
            .await
    }

    async fn create_task(&self, new_task: &NewTask) -> Result<TickTask, TaskServiceError> {
        let body = serde_json::to_value(new_task)
            .map_err(|e| TaskServiceError::Encode(e.to_string()))?;
        self.request(reqwest::Method::POST, "/task", Some(&body)).await
    }

    async fn add_subtask(
        &self,
        parent_task_id: &str,
        title: &str,
        content: Option<&str>,
    ) -> Result<TickTask, TaskServiceError> {
        let mut body = serde_json::json!({
            "title": title,
            "parentId": parent_task_id,
        });
        if let Some(content) = content {
            body["content"] = serde_json::Value::String(content.to_string());
        }
        self.request(reqwest::Method::POST, "/task", Some(&body)).await
    }

    async fn complete_task(&self, task_id: &str) -> Result<(), TaskServiceError> {
        let mut task = self.get_task_raw(task_id).await?;
        task["status"] = serde_json::json!(STATUS_COMPLETED);
        self.post_task_object(task_id, &task).await?;
        Ok(())
    }

    async fn update_content(&self, task_id: &str, content: &str) -> Result<(), TaskServiceError> {
        let mut task = self.get_task_raw(task_id).await?;
        task["content"] = serde_json::Value::String(content.to_string());
        self.post_task_object(task_id, &task).await?;
        Ok(())
    }
}
