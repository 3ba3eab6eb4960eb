//! Batch prioritization and the persisted-score queries.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::ai::{InsightModel, TaskForScoring, TaskScore};
use crate::db::{DbTaskInsight, EnergyLevel, InsightDb, Quadrant};
use crate::error::AppError;
use crate::ticktick::TickTask;

/// A task merged with its prioritization scores.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizedTask {
    #[serde(flatten)]
    pub task: TickTask,
    pub priority_data: TaskScore,
}

/// Compact insight view for focus lists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: String,
    pub title: String,
    pub priority_score: Option<f64>,
    pub eisenhower_quadrant: Option<Quadrant>,
    pub energy_level: Option<EnergyLevel>,
    pub estimated_minutes: Option<i64>,
    pub project_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_step: Option<String>,
}

impl TaskSummary {
    pub fn from_insight(insight: &DbTaskInsight) -> Self {
        Self {
            task_id: insight.external_task_id.clone(),
            title: insight.title.clone(),
            priority_score: insight.priority_score,
            eisenhower_quadrant: insight.eisenhower_quadrant,
            energy_level: insight.energy_level,
            estimated_minutes: insight.estimated_duration_minutes,
            project_ref: insight.project_ref.clone(),
            first_step: insight
                .ai_breakdown
                .as_ref()
                .map(|b| b.first_step.clone())
                .filter(|s| !s.is_empty()),
        }
    }
}

pub struct Prioritizer {
    db: Arc<Mutex<InsightDb>>,
    model: Arc<dyn InsightModel>,
}

impl Prioritizer {
    pub fn new(db: Arc<Mutex<InsightDb>>, model: Arc<dyn InsightModel>) -> Self {
        Self { db, model }
    }

    fn store(&self) -> Result<MutexGuard<'_, InsightDb>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal("insight store lock poisoned".into()))
    }

    /// Score a task batch in one model call and persist the scores.
    ///
    /// Scores land only on existing insight rows — prioritization never
    /// creates rows. The returned list contains exactly the tasks the model
    /// responded about (matched by id), sorted by descending priority; tasks
    /// it skipped are excluded rather than guessed at. A model outage (other
    /// than bad credentials) degrades to neutral scores for every task.
    pub async fn prioritize(
        &self,
        user_id: i64,
        tasks: &[TickTask],
        current_energy: Option<EnergyLevel>,
    ) -> Result<Vec<PrioritizedTask>, AppError> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }

        let scoring_inputs: Vec<TaskForScoring> = tasks
            .iter()
            .map(|t| TaskForScoring {
                id: t.id.clone(),
                title: t.title.clone(),
                description: t.content.clone(),
            })
            .collect();

        let scores = match self.model.prioritize(&scoring_inputs, current_energy).await {
            Ok(scores) => scores,
            Err(crate::ai::AiError::Auth(msg)) => return Err(AppError::Auth(msg)),
            Err(e) => {
                log::warn!("Prioritization call failed, defaulting all scores: {}", e);
                scoring_inputs
                    .iter()
                    .map(|t| TaskScore::fallback(&t.id))
                    .collect()
            }
        };

        {
            let store = self.store()?;
            for score in &scores {
                if !store.apply_scores(user_id, &score.task_id, score)? {
                    log::debug!("No insight row for scored task {}; skipping", score.task_id);
                }
            }
        }

        let mut merged: Vec<PrioritizedTask> = tasks
            .iter()
            .filter_map(|task| {
                scores
                    .iter()
                    .find(|s| s.task_id == task.id)
                    .map(|score| PrioritizedTask {
                        task: task.clone(),
                        priority_data: score.clone(),
                    })
            })
            .collect();

        merged.sort_by(|a, b| {
            b.priority_data
                .priority_score
                .total_cmp(&a.priority_data.priority_score)
        });

        Ok(merged)
    }

    /// Top uncompleted tasks by persisted priority score. Local query only.
    pub fn get_top(
        &self,
        user_id: i64,
        limit: i64,
        energy_level: Option<EnergyLevel>,
    ) -> Result<Vec<TaskSummary>, AppError> {
        let insights = self.store()?.top_by_priority(user_id, limit, energy_level)?;
        Ok(insights.iter().map(TaskSummary::from_insight).collect())
    }

    /// Uncompleted tasks in one Eisenhower quadrant.
    pub fn by_quadrant(&self, user_id: i64, quadrant: Quadrant) -> Result<Vec<TaskSummary>, AppError> {
        let insights = self.store()?.by_quadrant(user_id, quadrant)?;
        Ok(insights.iter().map(TaskSummary::from_insight).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InsightPatch;
    use crate::testsupport::{task, test_store, FakeModel};
    use std::sync::atomic::Ordering;

    fn score(task_id: &str, priority: f64) -> TaskScore {
        TaskScore {
            task_id: task_id.into(),
            urgency_score: 7.0,
            importance_score: 6.0,
            eisenhower_quadrant: Quadrant::Q1,
            priority_score: priority,
            reasoning: "scripted".into(),
        }
    }

    fn seed_insight(db: &Arc<Mutex<InsightDb>>, user: i64, task_id: &str) {
        db.lock()
            .unwrap()
            .upsert_insight(
                user,
                task_id,
                &InsightPatch {
                    title: Some(task_id.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_partial_scores_narrow_the_output() {
        let (_dir, db, user) = test_store();
        let model = Arc::new(FakeModel::default());
        *model.scores.lock().unwrap() = vec![score("t1", 40.0), score("t3", 90.0)];
        seed_insight(&db, user, "t1");
        seed_insight(&db, user, "t3");
        let prioritizer = Prioritizer::new(db.clone(), model);

        let tasks = vec![
            task("t1", "One", None, None),
            task("t2", "Two", None, None),
            task("t3", "Three", None, None),
        ];
        let merged = prioritizer.prioritize(user, &tasks, None).await.unwrap();

        // t2 got no score — excluded; the rest sort by descending priority.
        let ids: Vec<_> = merged.iter().map(|p| p.task.id.as_str()).collect();
        assert_eq!(ids, ["t3", "t1"]);
    }

    #[tokio::test]
    async fn test_scores_persist_only_on_existing_rows() {
        let (_dir, db, user) = test_store();
        let model = Arc::new(FakeModel::default());
        *model.scores.lock().unwrap() = vec![score("t1", 40.0), score("ghost", 99.0)];
        seed_insight(&db, user, "t1");
        let prioritizer = Prioritizer::new(db.clone(), model);

        let tasks = vec![task("t1", "One", None, None)];
        prioritizer.prioritize(user, &tasks, None).await.unwrap();

        let store = db.lock().unwrap();
        let insight = store.get_insight(user, "t1").unwrap().unwrap();
        assert_eq!(insight.priority_score, Some(40.0));
        assert!(store.get_insight(user, "ghost").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_model_outage_defaults_every_task() {
        let (_dir, db, user) = test_store();
        let model = Arc::new(FakeModel::default());
        model.prioritize_fail.store(true, Ordering::Relaxed);
        let prioritizer = Prioritizer::new(db, model);

        let tasks = vec![task("t1", "One", None, None), task("t2", "Two", None, None)];
        let merged = prioritizer.prioritize(user, &tasks, None).await.unwrap();
        assert_eq!(merged.len(), 2);
        for p in &merged {
            assert_eq!(p.priority_data.priority_score, 50.0);
            assert_eq!(p.priority_data.reasoning, "Unable to analyze");
        }
    }

    #[tokio::test]
    async fn test_bad_model_credentials_surface() {
        let (_dir, db, user) = test_store();
        let model = Arc::new(FakeModel::default());
        model.prioritize_auth_fail.store(true, Ordering::Relaxed);
        let prioritizer = Prioritizer::new(db, model);

        let tasks = vec![task("t1", "One", None, None)];
        let err = prioritizer.prioritize(user, &tasks, None).await.unwrap_err();
        assert!(err.requires_reauth());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_model_call() {
        let (_dir, db, user) = test_store();
        let prioritizer = Prioritizer::new(db, Arc::new(FakeModel::default()));
        let merged = prioritizer.prioritize(user, &[], None).await.unwrap();
        assert!(merged.is_empty());
    }
}
