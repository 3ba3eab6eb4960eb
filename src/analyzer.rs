//! Task analysis: breakdowns, vagueness scanning, staleness detection.
//!
//! This is where cached insight rows and the remote task service get
//! reconciled. The rules, applied at every remote call site:
//!
//! - insight creation is more valuable than complete metadata — a failed
//!   project-ref fetch during analysis logs a warning and proceeds with null;
//! - a stored non-null `project_ref` is never clobbered by a failed refresh
//!   (stale-but-present outranks absent);
//! - staleness views distinguish three outcomes — fresh remote data, cached
//!   fallback, cached fallback with no project ref at all — and each logs
//!   differently so degradation is visible, never silent.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::ai::{InsightModel, TaskBreakdown, UnstuckHelp};
use crate::config::Config;
use crate::db::{DbTaskInsight, EnergyLevel, InsightDb, InsightPatch};
use crate::error::AppError;
use crate::ticktick::{TaskService, TaskServiceError, TickTask};

const CLARIFICATIONS_HEADER: &str = "--- Clarifications ---";

/// Tunable heuristics, lifted from [`Config`].
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub vague_title_max_words: usize,
    pub vague_markers: Vec<String>,
    pub analysis_batch_size: usize,
}

impl From<&Config> for AnalyzerSettings {
    fn from(config: &Config) -> Self {
        Self {
            vague_title_max_words: config.vague_title_max_words,
            vague_markers: config.vague_markers.clone(),
            analysis_batch_size: config.analysis_batch_size,
        }
    }
}

/// What `analyze` hands back to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub breakdown: TaskBreakdown,
    pub energy_level: EnergyLevel,
    pub estimated_minutes: i64,
    pub created_subtasks: Vec<TickTask>,
}

/// A task flagged as vague, with its generated questions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VagueTask {
    pub task: TickTask,
    pub questions: Vec<String>,
}

/// Where a stale task view's metadata came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Remote fetch succeeded; view carries fresh metadata.
    Fresh,
    /// Remote fetch failed; view carries the cached row, project ref included.
    StaleFallback,
    /// Remote fetch failed and the cached row has no project ref either.
    NoProjectRef,
}

/// One stale task with coaching output and best-available metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaleTaskView {
    pub task_id: String,
    pub title: String,
    pub description: Option<String>,
    pub project_ref: Option<String>,
    pub days_stale: i64,
    pub unstuck_help: UnstuckHelp,
    pub refresh: RefreshOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Per-task failure inside a bulk run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkError {
    pub task_id: String,
    pub error: String,
}

/// Outcome of a bulk re-analysis sweep.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAnalysisReport {
    pub analyzed: usize,
    pub skipped: usize,
    pub errors: Vec<BulkError>,
    pub total: usize,
}

/// Outcome of a project-ref backfill sweep.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub updated: usize,
    pub already_had_project_ref: usize,
    pub no_project_ref: usize,
    pub errors: usize,
    pub total: usize,
}

pub struct TaskAnalyzer {
    db: Arc<Mutex<InsightDb>>,
    tasks: Arc<dyn TaskService>,
    model: Arc<dyn InsightModel>,
    settings: AnalyzerSettings,
}

impl TaskAnalyzer {
    pub fn new(
        db: Arc<Mutex<InsightDb>>,
        tasks: Arc<dyn TaskService>,
        model: Arc<dyn InsightModel>,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            db,
            tasks,
            model,
            settings,
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, InsightDb>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal("insight store lock poisoned".into()))
    }

    /// Analyze one task: breakdown, energy mapping, insight upsert, optional
    /// subtask creation.
    ///
    /// The project-ref fetch only happens when no insight row exists yet; an
    /// existing row keeps whatever ref it has. All network happens before the
    /// local write, so a remote failure never leaves a half-written row.
    pub async fn analyze(
        &self,
        user_id: i64,
        external_task_id: &str,
        title: &str,
        description: Option<&str>,
        create_subtasks: bool,
    ) -> Result<AnalysisResult, AppError> {
        let breakdown = self.model.breakdown(title, description).await?;
        let energy_level = breakdown.cognitive_load.energy_level();
        let estimated_minutes = breakdown.total_estimated_minutes;

        let existing = self.store()?.get_insight(user_id, external_task_id)?;
        let project_ref = if existing.is_none() {
            match self.tasks.get_task(external_task_id).await {
                Ok(task) => task.project_id,
                Err(e) => {
                    log::warn!(
                        "Could not fetch projectId for task {}: {} — creating insight without it",
                        external_task_id,
                        e
                    );
                    None
                }
            }
        } else {
            // Existing rows keep their stored project ref untouched.
            None
        };

        let patch = InsightPatch {
            title: Some(title.to_string()),
            description: description.map(String::from),
            project_ref,
            ai_breakdown: Some(breakdown.clone()),
            cognitive_load: Some(breakdown.cognitive_load),
            energy_level: Some(energy_level),
            estimated_duration_minutes: Some(estimated_minutes),
            ..Default::default()
        };
        self.store()?.upsert_insight(user_id, external_task_id, &patch)?;

        let mut created_subtasks = Vec::new();
        if create_subtasks {
            for subtask in &breakdown.subtasks {
                let content = format!(
                    "Energy: {}, Est: {}min",
                    subtask.energy.as_str(),
                    subtask.estimated_minutes
                );
                // Subtask failures are independent: the insight write above is
                // already committed and the remaining subtasks still go out.
                match self
                    .tasks
                    .add_subtask(external_task_id, &subtask.title, Some(&content))
                    .await
                {
                    Ok(created) => created_subtasks.push(created),
                    Err(e) => log::warn!(
                        "Subtask \"{}\" creation failed for {}: {}",
                        subtask.title,
                        external_task_id,
                        e
                    ),
                }
            }
        }

        Ok(AnalysisResult {
            breakdown,
            energy_level,
            estimated_minutes,
            created_subtasks,
        })
    }

    /// Scan active tasks for vagueness and generate clarifying questions for
    /// candidates that don't already have them.
    ///
    /// Detection is a cheap local heuristic; the model is only consulted for
    /// question generation. Tasks already carrying questions are skipped, so
    /// repeated scans never regenerate.
    pub async fn identify_vague(&self, user_id: i64) -> Result<Vec<VagueTask>, AppError> {
        let tasks = self.tasks.list_tasks(Some(false)).await?;

        let mut vague_tasks = Vec::new();
        for task in tasks {
            if !is_vague(&task.title, task.content.as_deref(), &self.settings) {
                continue;
            }

            let existing = self.store()?.get_insight(user_id, &task.id)?;
            let has_questions = existing
                .as_ref()
                .and_then(|i| i.clarifying_questions.as_ref())
                .is_some_and(|q| !q.is_empty());
            if has_questions {
                continue;
            }

            let questions = self
                .model
                .clarifying_questions(&task.title, task.content.as_deref())
                .await?;

            // The listing already embeds the project ref — no second fetch.
            let patch = InsightPatch {
                title: Some(task.title.clone()),
                description: task.content.clone(),
                project_ref: task.project_id.clone(),
                clarifying_questions: Some(questions.clone()),
                ..Default::default()
            };
            self.store()?.upsert_insight(user_id, &task.id, &patch)?;

            vague_tasks.push(VagueTask { task, questions });
        }

        Ok(vague_tasks)
    }

    /// Find uncompleted insights older than `threshold_days`, generate
    /// unstuck coaching for each, and refresh metadata from the remote
    /// service — falling back to the cached row when the refresh fails.
    pub async fn detect_stale(
        &self,
        user_id: i64,
        threshold_days: i64,
    ) -> Result<Vec<StaleTaskView>, AppError> {
        let cutoff = (Utc::now() - Duration::days(threshold_days)).to_rfc3339();
        let stale = self.store()?.stale_insights(user_id, &cutoff)?;

        let mut views = Vec::with_capacity(stale.len());
        for insight in stale {
            let days_stale = days_since(&insight.first_seen_at);
            let help = self
                .model
                .procrastination_help(&insight.title, insight.description.as_deref(), days_stale)
                .await?;

            self.store()?.touch_staleness(
                user_id,
                &insight.external_task_id,
                days_stale,
                &help.likely_blockers,
            )?;

            let view = match self.tasks.get_task(&insight.external_task_id).await {
                Ok(task) => StaleTaskView {
                    task_id: insight.external_task_id.clone(),
                    title: task.title,
                    description: task.content,
                    project_ref: task.project_id,
                    days_stale,
                    unstuck_help: help,
                    refresh: RefreshOutcome::Fresh,
                    warning: None,
                },
                Err(e) => {
                    log::warn!(
                        "Error refreshing task {} from remote: {}",
                        insight.external_task_id,
                        e
                    );
                    self.stale_fallback_view(insight, days_stale, help)
                }
            };
            views.push(view);
        }

        Ok(views)
    }

    /// Build the cached-row view for a failed refresh, distinguishing the
    /// stored-project-ref case from the nothing-available one.
    fn stale_fallback_view(
        &self,
        insight: DbTaskInsight,
        days_stale: i64,
        help: UnstuckHelp,
    ) -> StaleTaskView {
        let (refresh, warning) = match insight.project_ref {
            Some(ref project) => {
                log::info!(
                    "Using stored projectId {} for task {}",
                    project,
                    insight.external_task_id
                );
                (
                    RefreshOutcome::StaleFallback,
                    "Remote refresh failed; using cached task metadata".to_string(),
                )
            }
            None => {
                log::warn!(
                    "No projectId available for task {} — task link may not work",
                    insight.external_task_id
                );
                (
                    RefreshOutcome::NoProjectRef,
                    "Remote refresh failed and no projectId is available — task link may not work"
                        .to_string(),
                )
            }
        };

        StaleTaskView {
            task_id: insight.external_task_id,
            title: insight.title,
            description: insight.description,
            project_ref: insight.project_ref,
            days_stale,
            unstuck_help: help,
            refresh,
            warning: Some(warning),
        }
    }

    /// Mark a task completed in the insight store. Missing rows are a no-op,
    /// not an error — the task may never have been analyzed.
    pub fn update_completion(
        &self,
        user_id: i64,
        external_task_id: &str,
        actual_duration_minutes: Option<i64>,
    ) -> Result<bool, AppError> {
        Ok(self
            .store()?
            .set_completion(user_id, external_task_id, actual_duration_minutes)?)
    }

    /// Read-only insight view for one task.
    pub fn get_task_details(
        &self,
        user_id: i64,
        external_task_id: &str,
    ) -> Result<Option<DbTaskInsight>, AppError> {
        Ok(self.store()?.get_insight(user_id, external_task_id)?)
    }

    /// Analyze every active remote task that has no insight row yet.
    ///
    /// Tasks are deduplicated by id and processed in sequential batches of
    /// `analysis_batch_size` concurrent workers; one batch finishes before the
    /// next starts. A worker failing is recorded (task id + error) without
    /// cancelling its siblings or later batches.
    pub async fn analyze_all(self: &Arc<Self>, user_id: i64) -> Result<BulkAnalysisReport, AppError> {
        let all_tasks = self.tasks.list_tasks(Some(false)).await?;
        let total = all_tasks.len();

        let mut seen = HashSet::new();
        let mut skipped = 0usize;
        let mut to_analyze = Vec::new();
        for task in all_tasks {
            if !seen.insert(task.id.clone()) {
                continue;
            }
            if self.store()?.has_insight(user_id, &task.id)? {
                skipped += 1;
            } else {
                to_analyze.push(task);
            }
        }

        let batch_size = self.settings.analysis_batch_size.max(1);
        let total_batches = to_analyze.len().div_ceil(batch_size);
        let mut analyzed = 0usize;
        let mut errors = Vec::new();

        for (batch_index, batch) in to_analyze.chunks(batch_size).enumerate() {
            log::info!(
                "Analyzing batch {}/{} ({} tasks)",
                batch_index + 1,
                total_batches,
                batch.len()
            );

            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|task| {
                    let analyzer = Arc::clone(self);
                    tokio::spawn(async move {
                        let result = analyzer
                            .analyze(user_id, &task.id, &task.title, task.content.as_deref(), false)
                            .await;
                        (task.id, result)
                    })
                })
                .collect();

            for outcome in join_all(handles).await {
                match outcome {
                    Ok((_, Ok(_))) => analyzed += 1,
                    Ok((task_id, Err(e))) => {
                        log::warn!("Analysis failed for task {}: {}", task_id, e);
                        errors.push(BulkError {
                            task_id,
                            error: e.to_string(),
                        });
                    }
                    Err(join_err) => {
                        errors.push(BulkError {
                            task_id: "<unknown>".into(),
                            error: format!("analysis worker panicked: {}", join_err),
                        });
                    }
                }
            }
        }

        Ok(BulkAnalysisReport {
            analyzed,
            skipped,
            errors,
            total,
        })
    }

    /// Fill project refs for rows created before that column existed. Only
    /// null refs are touched. Expired credentials abort the sweep — every
    /// fetch would fail the same way.
    pub async fn backfill_project_refs(&self, user_id: i64) -> Result<BackfillReport, AppError> {
        let insights = self.store()?.all_insights(user_id)?;
        let total = insights.len();

        let mut updated = 0usize;
        let mut already_had = 0usize;
        let mut no_project = 0usize;
        let mut errors = 0usize;

        for insight in insights {
            if insight.project_ref.is_some() {
                already_had += 1;
                continue;
            }

            match self.tasks.get_task(&insight.external_task_id).await {
                Ok(task) => match task.project_id {
                    Some(project) => {
                        if self.store()?.set_project_ref_if_missing(
                            user_id,
                            &insight.external_task_id,
                            &project,
                        )? {
                            log::info!(
                                "Backfilled projectId {} for task {}",
                                project,
                                insight.external_task_id
                            );
                            updated += 1;
                        } else {
                            already_had += 1;
                        }
                    }
                    None => {
                        log::warn!(
                            "Task {} has no projectId (might be in the inbox)",
                            insight.external_task_id
                        );
                        no_project += 1;
                    }
                },
                Err(TaskServiceError::Auth(msg)) => return Err(AppError::Auth(msg)),
                Err(e) => {
                    log::warn!(
                        "Error fetching task {} during backfill: {}",
                        insight.external_task_id,
                        e
                    );
                    errors += 1;
                }
            }
        }

        Ok(BackfillReport {
            updated,
            already_had_project_ref: already_had,
            no_project_ref: no_project,
            errors,
            total,
        })
    }

    /// Store the user's answers to clarifying questions, then best-effort
    /// append them to the remote task description. The remote write failing
    /// only logs — the answers themselves are already persisted.
    pub async fn save_clarifying_answers(
        &self,
        user_id: i64,
        external_task_id: &str,
        answers: BTreeMap<String, String>,
    ) -> Result<(), AppError> {
        let existing = self.store()?.get_insight(user_id, external_task_id)?;

        let patch = if existing.is_some() {
            InsightPatch {
                clarifying_answers: Some(answers.clone()),
                ..Default::default()
            }
        } else {
            let task = self.tasks.get_task(external_task_id).await?;
            InsightPatch {
                title: Some(task.title),
                description: task.content,
                project_ref: task.project_id,
                clarifying_answers: Some(answers.clone()),
                ..Default::default()
            }
        };
        self.store()?.upsert_insight(user_id, external_task_id, &patch)?;

        let answered: Vec<(&String, &String)> = answers
            .iter()
            .filter(|(_, answer)| !answer.trim().is_empty())
            .collect();
        if answered.is_empty() {
            return Ok(());
        }

        let current = self
            .store()?
            .get_insight(user_id, external_task_id)?
            .and_then(|i| i.description)
            .unwrap_or_default();
        if current.contains(CLARIFICATIONS_HEADER) {
            return Ok(());
        }

        let mut text = format!("{}\n\n{}\n", current, CLARIFICATIONS_HEADER);
        for (question, answer) in answered {
            text.push_str(&format!("• {}\n  → {}\n", question, answer));
        }

        match self.tasks.update_content(external_task_id, &text).await {
            Ok(()) => {
                self.store()?
                    .set_description(user_id, external_task_id, &text)?;
            }
            Err(e) => {
                log::warn!(
                    "Could not append clarifications to task {}: {}",
                    external_task_id,
                    e
                );
            }
        }

        Ok(())
    }
}

/// Cheap vagueness heuristic: short title, missing description, or a marker
/// word in the title. No model call involved.
pub fn is_vague(title: &str, description: Option<&str>, settings: &AnalyzerSettings) -> bool {
    let word_count = title.split_whitespace().count();
    if word_count <= settings.vague_title_max_words {
        return true;
    }
    if description.map_or(true, |d| d.trim().is_empty()) {
        return true;
    }
    let lower = title.to_lowercase();
    settings.vague_markers.iter().any(|m| lower.contains(m))
}

/// Whole days elapsed since an RFC 3339 timestamp, floored at zero.
fn days_since(rfc3339: &str) -> i64 {
    match DateTime::parse_from_rfc3339(rfc3339) {
        Ok(dt) => (Utc::now() - dt.with_timezone(&Utc)).num_days().max(0),
        Err(e) => {
            log::warn!("Unparseable first_seen_at {:?}: {}", rfc3339, e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::SubtaskSuggestion;
    use crate::db::CognitiveLoad;
    use crate::testsupport::{task, test_store, FakeModel, FakeTaskService};
    use std::sync::atomic::Ordering;

    fn settings() -> AnalyzerSettings {
        AnalyzerSettings {
            vague_title_max_words: 3,
            vague_markers: ["research", "plan", "think about", "look into"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            analysis_batch_size: 5,
        }
    }

    fn heavy_breakdown() -> TaskBreakdown {
        TaskBreakdown {
            subtasks: vec![
                SubtaskSuggestion {
                    title: "Outline".into(),
                    energy: EnergyLevel::Low,
                    estimated_minutes: 10,
                },
                SubtaskSuggestion {
                    title: "Draft".into(),
                    energy: EnergyLevel::High,
                    estimated_minutes: 50,
                },
            ],
            first_step: "Outline".into(),
            total_estimated_minutes: 60,
            cognitive_load: CognitiveLoad::Heavy,
            tips: None,
        }
    }

    fn analyzer(
        db: Arc<Mutex<InsightDb>>,
        tasks: Arc<FakeTaskService>,
        model: Arc<FakeModel>,
    ) -> Arc<TaskAnalyzer> {
        Arc::new(TaskAnalyzer::new(db, tasks, model, settings()))
    }

    #[test]
    fn test_is_vague_heuristic() {
        let s = settings();
        // Three words or fewer
        assert!(is_vague("Research", Some("details here"), &s));
        assert!(is_vague("Fix the thing", Some("details"), &s));
        // No description
        assert!(is_vague("Write the quarterly report draft", None, &s));
        assert!(is_vague("Write the quarterly report draft", Some("  "), &s));
        // Marker word
        assert!(is_vague(
            "Look into the database migration options",
            Some("notes"),
            &s
        ));
        // Specific enough
        assert!(!is_vague(
            "Send invoice #42 to Acme Corp",
            Some("use the new template"),
            &s
        ));
    }

    #[tokio::test]
    async fn test_analyze_is_idempotent_upsert() {
        let (_dir, db, user) = test_store();
        let tasks = Arc::new(FakeTaskService::with_tasks(vec![task(
            "t1",
            "Write report",
            Some("Q3 summary"),
            Some("p1"),
        )]));
        let model = Arc::new(FakeModel::with_breakdown(heavy_breakdown()));
        let analyzer = analyzer(db.clone(), tasks, model);

        analyzer
            .analyze(user, "t1", "Write report", Some("Q3 summary"), false)
            .await
            .unwrap();
        analyzer
            .analyze(user, "t1", "Write report", Some("Q3 summary"), false)
            .await
            .unwrap();

        let store = db.lock().unwrap();
        let count: i64 = store
            .conn_ref()
            .query_row(
                "SELECT COUNT(*) FROM task_insights WHERE external_task_id = 't1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        let insight = store.get_insight(user, "t1").unwrap().unwrap();
        assert_eq!(insight.project_ref.as_deref(), Some("p1"));
        assert_eq!(insight.energy_level, Some(EnergyLevel::High));
        assert_eq!(insight.cognitive_load, Some(CognitiveLoad::Heavy));
        assert_eq!(insight.estimated_duration_minutes, Some(60));
    }

    #[tokio::test]
    async fn test_analyze_proceeds_without_project_when_fetch_fails() {
        let (_dir, db, user) = test_store();
        let tasks = Arc::new(FakeTaskService::default());
        tasks.fail_get.store(true, Ordering::Relaxed);
        let model = Arc::new(FakeModel::with_breakdown(heavy_breakdown()));
        let analyzer = analyzer(db.clone(), tasks, model);

        let result = analyzer
            .analyze(user, "t1", "Write report", None, false)
            .await
            .unwrap();
        assert_eq!(result.energy_level, EnergyLevel::High);

        let insight = db.lock().unwrap().get_insight(user, "t1").unwrap().unwrap();
        assert!(insight.project_ref.is_none());
    }

    #[tokio::test]
    async fn test_project_ref_survives_failing_refetch() {
        let (_dir, db, user) = test_store();
        let tasks = Arc::new(FakeTaskService::with_tasks(vec![task(
            "t1",
            "Write report",
            Some("Q3 summary"),
            Some("p1"),
        )]));
        let model = Arc::new(FakeModel::with_breakdown(heavy_breakdown()));
        let analyzer = analyzer(db.clone(), tasks.clone(), model);

        analyzer
            .analyze(user, "t1", "Write report", Some("Q3 summary"), false)
            .await
            .unwrap();

        // Remote starts failing; re-analysis must keep the stored ref.
        tasks.fail_get.store(true, Ordering::Relaxed);
        analyzer
            .analyze(user, "t1", "Write report", Some("Q3 summary"), false)
            .await
            .unwrap();

        let insight = db.lock().unwrap().get_insight(user, "t1").unwrap().unwrap();
        assert_eq!(insight.project_ref.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_analyze_creates_subtasks_independently() {
        let (_dir, db, user) = test_store();
        let tasks = Arc::new(FakeTaskService::with_tasks(vec![task(
            "t1",
            "Write report",
            None,
            Some("p1"),
        )]));
        tasks
            .fail_subtasks_titled
            .lock()
            .unwrap()
            .insert("Outline".into());
        let model = Arc::new(FakeModel::with_breakdown(heavy_breakdown()));
        let analyzer = analyzer(db.clone(), tasks.clone(), model);

        let result = analyzer
            .analyze(user, "t1", "Write report", None, true)
            .await
            .unwrap();

        // "Outline" failed, "Draft" still went out; the insight row committed.
        assert_eq!(result.created_subtasks.len(), 1);
        assert_eq!(result.created_subtasks[0].title, "Draft");
        assert!(db.lock().unwrap().get_insight(user, "t1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_identify_vague_creates_questions_once() {
        let (_dir, db, user) = test_store();
        let tasks = Arc::new(FakeTaskService::with_tasks(vec![
            task("t2", "Research", None, None),
            task("t9", "Send invoice #42 to Acme Corp", Some("template"), Some("p1")),
        ]));
        let model = Arc::new(FakeModel::default());
        let analyzer = analyzer(db.clone(), tasks, model.clone());

        let vague = analyzer.identify_vague(user).await.unwrap();
        assert_eq!(vague.len(), 1);
        assert_eq!(vague[0].task.id, "t2");
        assert!(!vague[0].questions.is_empty());
        assert_eq!(model.clarify_calls.load(Ordering::Relaxed), 1);

        let insight = db.lock().unwrap().get_insight(user, "t2").unwrap().unwrap();
        assert!(insight.project_ref.is_none());
        assert!(insight.clarifying_questions.is_some());

        // Second pass: cached questions mean no new model call, no new entry.
        let vague = analyzer.identify_vague(user).await.unwrap();
        assert!(vague.is_empty());
        assert_eq!(model.clarify_calls.load(Ordering::Relaxed), 1);
    }

    fn seed_stale_insight(
        db: &Arc<Mutex<InsightDb>>,
        user: i64,
        task_id: &str,
        project_ref: Option<&str>,
    ) {
        let patch = InsightPatch {
            title: Some(format!("Stale {}", task_id)),
            description: Some("old description".into()),
            project_ref: project_ref.map(String::from),
            ..Default::default()
        };
        let store = db.lock().unwrap();
        store.upsert_insight(user, task_id, &patch).unwrap();
        store
            .conn_ref()
            .execute(
                "UPDATE task_insights SET first_seen_at = ?1 WHERE external_task_id = ?2",
                rusqlite::params![
                    (Utc::now() - Duration::days(10)).to_rfc3339(),
                    task_id
                ],
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_detect_stale_fresh_data_wins() {
        let (_dir, db, user) = test_store();
        seed_stale_insight(&db, user, "t3", Some("p1"));
        let tasks = Arc::new(FakeTaskService::with_tasks(vec![task(
            "t3",
            "Renamed remotely",
            Some("new description"),
            Some("p-new"),
        )]));
        let analyzer = analyzer(db.clone(), tasks, Arc::new(FakeModel::default()));

        let stale = analyzer.detect_stale(user, 3).await.unwrap();
        assert_eq!(stale.len(), 1);
        let view = &stale[0];
        assert_eq!(view.refresh, RefreshOutcome::Fresh);
        assert_eq!(view.title, "Renamed remotely");
        assert_eq!(view.project_ref.as_deref(), Some("p-new"));
        assert_eq!(view.days_stale, 10);
        assert!(view.warning.is_none());

        // The stored ref stays what it was — fresh data feeds the view only.
        let insight = db.lock().unwrap().get_insight(user, "t3").unwrap().unwrap();
        assert_eq!(insight.project_ref.as_deref(), Some("p1"));
        assert_eq!(insight.days_since_created, 10);
        assert!(insight.blockers_identified.is_some());
    }

    #[tokio::test]
    async fn test_detect_stale_falls_back_to_stored_metadata() {
        let (_dir, db, user) = test_store();
        seed_stale_insight(&db, user, "t3", Some("p1"));
        let tasks = Arc::new(FakeTaskService::default());
        tasks.fail_get.store(true, Ordering::Relaxed);
        let analyzer = analyzer(db.clone(), tasks, Arc::new(FakeModel::default()));

        let stale = analyzer.detect_stale(user, 3).await.unwrap();
        let view = &stale[0];
        assert_eq!(view.refresh, RefreshOutcome::StaleFallback);
        assert_eq!(view.project_ref.as_deref(), Some("p1"));
        assert_eq!(view.title, "Stale t3");
        assert!(view.warning.is_some());
    }

    #[tokio::test]
    async fn test_detect_stale_flags_missing_project_ref_distinctly() {
        let (_dir, db, user) = test_store();
        seed_stale_insight(&db, user, "t3", None);
        let tasks = Arc::new(FakeTaskService::default());
        tasks.fail_get.store(true, Ordering::Relaxed);
        let analyzer = analyzer(db.clone(), tasks, Arc::new(FakeModel::default()));

        let stale = analyzer.detect_stale(user, 3).await.unwrap();
        let view = &stale[0];
        assert_eq!(view.refresh, RefreshOutcome::NoProjectRef);
        assert!(view.project_ref.is_none());
        let warning = view.warning.as_deref().unwrap();
        assert!(warning.contains("no projectId"), "got: {}", warning);
    }

    #[tokio::test]
    async fn test_update_completion_noop_without_row() {
        let (_dir, db, user) = test_store();
        let analyzer = analyzer(
            db.clone(),
            Arc::new(FakeTaskService::default()),
            Arc::new(FakeModel::default()),
        );

        assert!(!analyzer.update_completion(user, "missing", Some(20)).unwrap());

        db.lock()
            .unwrap()
            .upsert_insight(
                user,
                "t1",
                &InsightPatch {
                    title: Some("Done soon".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(analyzer.update_completion(user, "t1", Some(20)).unwrap());
    }

    #[tokio::test]
    async fn test_analyze_all_reports_partial_failure() {
        let (_dir, db, user) = test_store();
        let remote_tasks: Vec<TickTask> = (1..=7)
            .map(|i| task(&format!("t{}", i), &format!("Task number {}", i), Some("d"), Some("p1")))
            .collect();
        let tasks = Arc::new(FakeTaskService::with_tasks(remote_tasks));
        let model = Arc::new(FakeModel::with_breakdown(heavy_breakdown()));
        model
            .fail_breakdown_titles
            .lock()
            .unwrap()
            .insert("Task number 4".into());
        let analyzer = analyzer(db.clone(), tasks, model);

        let report = analyzer.analyze_all(user).await.unwrap();
        assert_eq!(report.total, 7);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.analyzed, 6);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].task_id, "t4");

        let store = db.lock().unwrap();
        let count: i64 = store
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM task_insights", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 6);
    }

    #[tokio::test]
    async fn test_analyze_all_skips_existing_and_dedupes() {
        let (_dir, db, user) = test_store();
        let mut remote = vec![
            task("t1", "Task one here", Some("d"), Some("p1")),
            task("t2", "Task two here", Some("d"), Some("p1")),
        ];
        // Same id twice — must analyze once.
        remote.push(task("t2", "Task two here", Some("d"), Some("p1")));
        let tasks = Arc::new(FakeTaskService::with_tasks(remote));
        let model = Arc::new(FakeModel::with_breakdown(heavy_breakdown()));
        let analyzer = analyzer(db.clone(), tasks, model);

        db.lock()
            .unwrap()
            .upsert_insight(
                user,
                "t1",
                &InsightPatch {
                    title: Some("Task one here".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let report = analyzer.analyze_all(user).await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.analyzed, 1);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_all_fails_fast_on_expired_credentials() {
        let (_dir, db, user) = test_store();
        let tasks = Arc::new(FakeTaskService::default());
        tasks.auth_fail.store(true, Ordering::Relaxed);
        let analyzer = analyzer(db, tasks, Arc::new(FakeModel::default()));

        let err = analyzer.analyze_all(user).await.unwrap_err();
        assert!(err.requires_reauth());
    }

    #[tokio::test]
    async fn test_backfill_project_refs() {
        let (_dir, db, user) = test_store();
        {
            let store = db.lock().unwrap();
            for (id, project) in [("t1", Some("p1")), ("t2", None), ("t3", None), ("t4", None)] {
                store
                    .upsert_insight(
                        user,
                        id,
                        &InsightPatch {
                            title: Some(id.to_string()),
                            project_ref: project.map(String::from),
                            ..Default::default()
                        },
                    )
                    .unwrap();
            }
        }
        // t2 resolves to a project, t3 is an inbox task, t4 is unknown remotely.
        let tasks = Arc::new(FakeTaskService::with_tasks(vec![
            task("t2", "Two", None, Some("p2")),
            task("t3", "Three", None, None),
        ]));
        let analyzer = analyzer(db.clone(), tasks, Arc::new(FakeModel::default()));

        let report = analyzer.backfill_project_refs(user).await.unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.updated, 1);
        assert_eq!(report.already_had_project_ref, 1);
        assert_eq!(report.no_project_ref, 1);
        assert_eq!(report.errors, 1);

        let insight = db.lock().unwrap().get_insight(user, "t2").unwrap().unwrap();
        assert_eq!(insight.project_ref.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_save_clarifying_answers_appends_once() {
        let (_dir, db, user) = test_store();
        let tasks = Arc::new(FakeTaskService::with_tasks(vec![task(
            "t1",
            "Vague thing",
            Some("original text"),
            Some("p1"),
        )]));
        let analyzer = analyzer(db.clone(), tasks.clone(), Arc::new(FakeModel::default()));

        let mut answers = BTreeMap::new();
        answers.insert("What is done?".to_string(), "A shipped report".to_string());
        answers.insert("Skipped?".to_string(), "  ".to_string());

        analyzer
            .save_clarifying_answers(user, "t1", answers.clone())
            .await
            .unwrap();

        let insight = db.lock().unwrap().get_insight(user, "t1").unwrap().unwrap();
        assert_eq!(insight.project_ref.as_deref(), Some("p1"));
        assert_eq!(
            insight
                .clarifying_answers
                .as_ref()
                .and_then(|a| a.get("What is done?"))
                .map(String::as_str),
            Some("A shipped report")
        );
        let description = insight.description.unwrap();
        assert!(description.contains(CLARIFICATIONS_HEADER));
        assert!(description.contains("A shipped report"));
        assert!(!description.contains("Skipped?"));

        // Saving again must not duplicate the appended section.
        analyzer
            .save_clarifying_answers(user, "t1", answers)
            .await
            .unwrap();
        assert_eq!(tasks.updated_content.lock().unwrap().len(), 1);
    }
}
