//! Shared in-crate fakes for the two external collaborator seams.
//!
//! `FakeTaskService` and `FakeModel` let service tests script remote
//! behavior (failures included) without any network. Compiled for tests only.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::ai::{
    AiError, InsightModel, ParsedEmailTask, TaskBreakdown, TaskForScoring, TaskScore, UnstuckHelp,
};
use crate::db::{EnergyLevel, InsightDb};
use crate::ticktick::{NewTask, TaskService, TaskServiceError, TickTask};

/// A fresh on-disk store in a tempdir, plus a default user id.
pub fn test_store() -> (tempfile::TempDir, Arc<Mutex<InsightDb>>, i64) {
    let dir = tempfile::tempdir().unwrap();
    let db = InsightDb::open_at(dir.path().join("test.db")).unwrap();
    let user = db.ensure_user(Some("tt-user")).unwrap();
    (dir, Arc::new(Mutex::new(db)), user)
}

pub fn task(id: &str, title: &str, content: Option<&str>, project: Option<&str>) -> TickTask {
    TickTask {
        id: id.to_string(),
        title: title.to_string(),
        content: content.map(String::from),
        project_id: project.map(String::from),
        status: 0,
        priority: None,
        due_date: None,
        parent_id: None,
    }
}

// ─────────────────────────────────────────────────────────────────────
// Fake task service
// ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeTaskService {
    pub tasks: Mutex<Vec<TickTask>>,
    pub fail_get: AtomicBool,
    pub fail_list: AtomicBool,
    pub auth_fail: AtomicBool,
    pub fail_subtasks_titled: Mutex<HashSet<String>>,
    pub created: Mutex<Vec<TickTask>>,
    pub created_subtasks: Mutex<Vec<(String, String)>>,
    pub completed: Mutex<Vec<String>>,
    pub updated_content: Mutex<Vec<(String, String)>>,
    create_counter: AtomicUsize,
}

impl FakeTaskService {
    pub fn with_tasks(tasks: Vec<TickTask>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            ..Default::default()
        }
    }

    fn check_auth(&self) -> Result<(), TaskServiceError> {
        if self.auth_fail.load(Ordering::Relaxed) {
            Err(TaskServiceError::Auth("token expired".into()))
        } else {
            Ok(())
        }
    }

    fn server_error() -> TaskServiceError {
        TaskServiceError::Api {
            status: 500,
            body: "remote unavailable".into(),
        }
    }
}

#[async_trait]
impl TaskService for FakeTaskService {
    async fn list_tasks(&self, completed: Option<bool>) -> Result<Vec<TickTask>, TaskServiceError> {
        self.check_auth()?;
        if self.fail_list.load(Ordering::Relaxed) {
            return Err(Self::server_error());
        }
        let tasks = self.tasks.lock().unwrap().clone();
        Ok(match completed {
            Some(true) => tasks.into_iter().filter(|t| t.status == 2).collect(),
            Some(false) => tasks.into_iter().filter(|t| t.status == 0).collect(),
            None => tasks,
        })
    }

    async fn get_task(&self, task_id: &str) -> Result<TickTask, TaskServiceError> {
        self.check_auth()?;
        if self.fail_get.load(Ordering::Relaxed) {
            return Err(Self::server_error());
        }
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
            .ok_or(TaskServiceError::Api {
                status: 404,
                body: format!("task {} not found", task_id),
            })
    }

    async fn create_task(&self, new_task: &NewTask) -> Result<TickTask, TaskServiceError> {
        self.check_auth()?;
        let n = self.create_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let created = TickTask {
            id: format!("created-{}", n),
            title: new_task.title.clone(),
            content: new_task.content.clone(),
            project_id: new_task.project_id.clone(),
            status: 0,
            priority: new_task.priority,
            due_date: new_task.due_date.clone(),
            parent_id: new_task.parent_id.clone(),
        };
        self.created.lock().unwrap().push(created.clone());
        self.tasks.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn add_subtask(
        &self,
        parent_task_id: &str,
        title: &str,
        content: Option<&str>,
    ) -> Result<TickTask, TaskServiceError> {
        self.check_auth()?;
        if self.fail_subtasks_titled.lock().unwrap().contains(title) {
            return Err(Self::server_error());
        }
        self.created_subtasks
            .lock()
            .unwrap()
            .push((parent_task_id.to_string(), title.to_string()));
        Ok(TickTask {
            id: format!("sub-{}", title),
            title: title.to_string(),
            content: content.map(String::from),
            project_id: None,
            status: 0,
            priority: None,
            due_date: None,
            parent_id: Some(parent_task_id.to_string()),
        })
    }

    async fn complete_task(&self, task_id: &str) -> Result<(), TaskServiceError> {
        self.check_auth()?;
        self.completed.lock().unwrap().push(task_id.to_string());
        Ok(())
    }

    async fn update_content(&self, task_id: &str, content: &str) -> Result<(), TaskServiceError> {
        self.check_auth()?;
        self.updated_content
            .lock()
            .unwrap()
            .push((task_id.to_string(), content.to_string()));
        if let Some(task) = self.tasks.lock().unwrap().iter_mut().find(|t| t.id == task_id) {
            task.content = Some(content.to_string());
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Fake insight model
// ─────────────────────────────────────────────────────────────────────

pub struct FakeModel {
    pub breakdown: Mutex<TaskBreakdown>,
    pub fail_breakdown_titles: Mutex<HashSet<String>>,
    pub questions: Mutex<Vec<String>>,
    pub clarify_calls: AtomicUsize,
    pub unstuck: Mutex<UnstuckHelp>,
    pub scores: Mutex<Vec<TaskScore>>,
    pub prioritize_fail: AtomicBool,
    pub prioritize_auth_fail: AtomicBool,
    pub parsed_email: Mutex<Option<ParsedEmailTask>>,
}

impl Default for FakeModel {
    fn default() -> Self {
        Self {
            breakdown: Mutex::new(TaskBreakdown::fallback("placeholder")),
            fail_breakdown_titles: Mutex::new(HashSet::new()),
            questions: Mutex::new(vec![
                "What does done look like?".to_string(),
                "What is step one?".to_string(),
            ]),
            clarify_calls: AtomicUsize::new(0),
            unstuck: Mutex::new(UnstuckHelp::fallback()),
            scores: Mutex::new(Vec::new()),
            prioritize_fail: AtomicBool::new(false),
            prioritize_auth_fail: AtomicBool::new(false),
            parsed_email: Mutex::new(None),
        }
    }
}

impl FakeModel {
    pub fn with_breakdown(breakdown: TaskBreakdown) -> Self {
        Self {
            breakdown: Mutex::new(breakdown),
            ..Default::default()
        }
    }
}

#[async_trait]
impl InsightModel for FakeModel {
    async fn breakdown(
        &self,
        title: &str,
        _description: Option<&str>,
    ) -> Result<TaskBreakdown, AiError> {
        if self.fail_breakdown_titles.lock().unwrap().contains(title) {
            return Err(AiError::Api {
                status: 500,
                body: "model unavailable".into(),
            });
        }
        Ok(self.breakdown.lock().unwrap().clone())
    }

    async fn clarifying_questions(
        &self,
        _title: &str,
        _description: Option<&str>,
    ) -> Result<Vec<String>, AiError> {
        self.clarify_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.questions.lock().unwrap().clone())
    }

    async fn procrastination_help(
        &self,
        _title: &str,
        _description: Option<&str>,
        _days_stale: i64,
    ) -> Result<UnstuckHelp, AiError> {
        Ok(self.unstuck.lock().unwrap().clone())
    }

    async fn prioritize(
        &self,
        tasks: &[TaskForScoring],
        _current_energy: Option<EnergyLevel>,
    ) -> Result<Vec<TaskScore>, AiError> {
        if self.prioritize_auth_fail.load(Ordering::Relaxed) {
            return Err(AiError::Auth("bad key".into()));
        }
        if self.prioritize_fail.load(Ordering::Relaxed) {
            return Err(AiError::Api {
                status: 500,
                body: "model unavailable".into(),
            });
        }
        let scores = self.scores.lock().unwrap().clone();
        if scores.is_empty() {
            Ok(tasks.iter().map(|t| TaskScore::fallback(&t.id)).collect())
        } else {
            Ok(scores)
        }
    }

    async fn parse_email(
        &self,
        subject: &str,
        body: &str,
        _from: Option<&str>,
    ) -> Result<ParsedEmailTask, AiError> {
        Ok(self
            .parsed_email
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| ParsedEmailTask::fallback(subject, body)))
    }
}
