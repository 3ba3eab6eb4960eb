//! Email-to-task bridge.
//!
//! Turns one incoming email into a TickTick task with an analyzed insight
//! row carrying full provenance (source mailbox, message id, deep link,
//! attachment info) so the task can always link back to the original mail.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;

use crate::ai::{InsightModel, ParsedEmailTask};
use crate::analyzer::{AnalysisResult, TaskAnalyzer};
use crate::db::{EmailProvenance, EmailSource, InsightDb, InsightPatch};
use crate::error::AppError;
use crate::ticktick::{NewTask, TaskService, TickTask};

use super::parser::IncomingEmail;
use super::providers::message_link;

/// Everything produced while turning an email into a task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTaskResult {
    pub task: TickTask,
    pub analysis: AnalysisResult,
    pub parsing: ParsedEmailTask,
    pub link: String,
}

pub struct EmailReceiver {
    db: Arc<Mutex<InsightDb>>,
    tasks: Arc<dyn TaskService>,
    model: Arc<dyn InsightModel>,
    analyzer: Arc<TaskAnalyzer>,
}

impl EmailReceiver {
    pub fn new(
        db: Arc<Mutex<InsightDb>>,
        tasks: Arc<dyn TaskService>,
        model: Arc<dyn InsightModel>,
        analyzer: Arc<TaskAnalyzer>,
    ) -> Self {
        Self {
            db,
            tasks,
            model,
            analyzer,
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, InsightDb>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal("insight store lock poisoned".into()))
    }

    /// Create a task from one email and analyze it.
    ///
    /// Subtasks are not auto-created for email tasks; the user hasn't seen
    /// the task yet. Clarifying questions flagged by the parse are stored so
    /// the first review can resolve them.
    pub async fn process_email(
        &self,
        user_id: i64,
        email: &IncomingEmail,
        source: EmailSource,
    ) -> Result<EmailTaskResult, AppError> {
        let parsing = self
            .model
            .parse_email(&email.subject, &email.body, Some(&email.from))
            .await?;

        let title = if parsing.task_title.is_empty() {
            email.subject.clone()
        } else {
            parsing.task_title.clone()
        };
        let new_task = NewTask {
            title,
            content: Some(parsing.task_description.clone()).filter(|d| !d.is_empty()),
            priority: Some(parsing.suggested_priority.ticktick_value()),
            ..Default::default()
        };
        let task = self.tasks.create_task(&new_task).await?;

        let link = message_link(source, &email.message_id);

        let analysis = self
            .analyzer
            .analyze(user_id, &task.id, &task.title, task.content.as_deref(), false)
            .await?;

        let provenance = EmailProvenance {
            source,
            message_id: email.message_id.clone(),
            link: link.clone(),
            has_attachments: email.has_attachments,
            attachment_count: email.attachment_count,
            subject: email.subject.clone(),
            from: email.from.clone(),
            received_at: Utc::now().to_rfc3339(),
        };
        self.store()?.set_email_metadata(user_id, &task.id, &provenance)?;

        if parsing.needs_clarification && !parsing.clarifying_questions.is_empty() {
            let patch = InsightPatch {
                clarifying_questions: Some(parsing.clarifying_questions.clone()),
                ..Default::default()
            };
            self.store()?.upsert_insight(user_id, &task.id, &patch)?;
        }

        log::info!(
            "Created task {} from {} email {:?}",
            task.id,
            source.as_str(),
            email.subject
        );

        Ok(EmailTaskResult {
            task,
            analysis,
            parsing,
            link,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::SuggestedPriority;
    use crate::analyzer::AnalyzerSettings;
    use crate::testsupport::{test_store, FakeModel, FakeTaskService};

    fn incoming() -> IncomingEmail {
        IncomingEmail {
            subject: "Invoice overdue".into(),
            from: "billing@example.com".into(),
            message_id: "msg-42".into(),
            body: "Please pay invoice #42 before Friday.".into(),
            has_attachments: true,
            attachment_count: 2,
        }
    }

    fn receiver(
        db: Arc<Mutex<InsightDb>>,
        tasks: Arc<FakeTaskService>,
        model: Arc<FakeModel>,
    ) -> EmailReceiver {
        let analyzer = Arc::new(TaskAnalyzer::new(
            db.clone(),
            tasks.clone(),
            model.clone(),
            AnalyzerSettings {
                vague_title_max_words: 3,
                vague_markers: Vec::new(),
                analysis_batch_size: 5,
            },
        ));
        EmailReceiver::new(db, tasks, model, analyzer)
    }

    #[tokio::test]
    async fn test_process_email_creates_task_with_provenance() {
        let (_dir, db, user) = test_store();
        let tasks = Arc::new(FakeTaskService::default());
        let model = Arc::new(FakeModel::default());
        *model.parsed_email.lock().unwrap() = Some(ParsedEmailTask {
            task_title: "Pay invoice #42".into(),
            task_description: "Due Friday".into(),
            suggested_priority: SuggestedPriority::High,
            needs_clarification: true,
            clarifying_questions: vec!["Which account pays this?".into()],
            suggested_project: None,
            is_actionable: true,
            reasoning: "clear deadline".into(),
        });
        let receiver = receiver(db.clone(), tasks.clone(), model);

        let result = receiver
            .process_email(user, &incoming(), EmailSource::Gmail)
            .await
            .unwrap();

        assert_eq!(result.task.title, "Pay invoice #42");
        assert_eq!(result.link, "https://mail.google.com/mail/u/0/#inbox/msg-42");
        // High priority maps to TickTick's 5.
        assert_eq!(tasks.created.lock().unwrap()[0].priority, Some(5));
        // No subtasks auto-created from email.
        assert!(tasks.created_subtasks.lock().unwrap().is_empty());

        let insight = db
            .lock()
            .unwrap()
            .get_insight(user, &result.task.id)
            .unwrap()
            .unwrap();
        assert_eq!(insight.email_source, Some(EmailSource::Gmail));
        assert_eq!(insight.email_message_id.as_deref(), Some("msg-42"));
        assert_eq!(
            insight.email_link.as_deref(),
            Some("https://mail.google.com/mail/u/0/#inbox/msg-42")
        );
        assert!(insight.email_has_attachments);
        assert_eq!(insight.email_attachment_count, Some(2));
        assert_eq!(insight.email_subject.as_deref(), Some("Invoice overdue"));
        assert_eq!(insight.email_from.as_deref(), Some("billing@example.com"));
        assert_eq!(
            insight.clarifying_questions.as_deref(),
            Some(&["Which account pays this?".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_process_email_fallback_parse_still_creates_task() {
        let (_dir, db, user) = test_store();
        let tasks = Arc::new(FakeTaskService::default());
        // Default FakeModel returns the documented fallback parse.
        let model = Arc::new(FakeModel::default());
        let receiver = receiver(db.clone(), tasks.clone(), model);

        let result = receiver
            .process_email(user, &incoming(), EmailSource::Outlook)
            .await
            .unwrap();

        assert_eq!(result.task.title, "Invoice overdue");
        assert_eq!(tasks.created.lock().unwrap()[0].priority, Some(3));
        assert!(result.link.starts_with("https://outlook.office.com/mail/"));
        let insight = db
            .lock()
            .unwrap()
            .get_insight(user, &result.task.id)
            .unwrap()
            .unwrap();
        assert_eq!(insight.email_source, Some(EmailSource::Outlook));
    }
}
