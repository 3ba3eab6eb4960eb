use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::ai::{TaskBreakdown, TaskScore};

use super::*;

/// Field set applied by [`InsightDb::upsert_insight`].
///
/// `None` leaves the stored value untouched on update (and NULL on insert),
/// so each caller writes only the fields its operation produced.
/// `project_ref` is special: a stored non-null value is never overwritten —
/// stale-but-present data outranks absent data.
#[derive(Debug, Clone, Default)]
pub struct InsightPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub project_ref: Option<String>,
    pub ai_breakdown: Option<TaskBreakdown>,
    pub cognitive_load: Option<CognitiveLoad>,
    pub energy_level: Option<EnergyLevel>,
    pub estimated_duration_minutes: Option<i64>,
    pub clarifying_questions: Option<Vec<String>>,
    pub clarifying_answers: Option<BTreeMap<String, String>>,
}

/// Email provenance attached to an insight created from a forwarded message.
#[derive(Debug, Clone)]
pub struct EmailProvenance {
    pub source: EmailSource,
    pub message_id: String,
    pub link: String,
    pub has_attachments: bool,
    pub attachment_count: i64,
    pub subject: String,
    pub from: String,
    pub received_at: String,
}

const INSIGHT_COLUMNS: &str = "id, user_id, external_task_id, project_ref, title, description,
        ai_breakdown, clarifying_questions, clarifying_answers,
        energy_level, cognitive_load, estimated_duration_minutes, actual_duration_minutes,
        priority_score, urgency_score, importance_score, eisenhower_quadrant,
        first_seen_at, last_updated_at, days_since_created, times_deferred,
        blockers_identified, completed, completed_at,
        email_source, email_message_id, email_link, email_has_attachments,
        email_attachment_count, email_subject, email_from, email_received_at";

impl InsightDb {
    // =========================================================================
    // Task insights
    // =========================================================================

    /// Insert-or-update the insight row for `(user_id, external_task_id)`.
    ///
    /// The single write primitive behind analysis, vagueness scanning, and
    /// clarification answers. Uses SQLite `ON CONFLICT` so two callers racing
    /// on the same key can never produce a duplicate row.
    pub fn upsert_insight(
        &self,
        user_id: i64,
        external_task_id: &str,
        patch: &InsightPatch,
    ) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        let breakdown_json = patch
            .ai_breakdown
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let questions_json = patch
            .clarifying_questions
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let answers_json = patch
            .clarifying_answers
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            "INSERT INTO task_insights (
                user_id, external_task_id, project_ref, title, description,
                ai_breakdown, clarifying_questions, clarifying_answers,
                energy_level, cognitive_load, estimated_duration_minutes,
                first_seen_at, last_updated_at
             ) VALUES (?1, ?2, ?3, COALESCE(?4, ''), ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
             ON CONFLICT(user_id, external_task_id) DO UPDATE SET
                project_ref = COALESCE(task_insights.project_ref, excluded.project_ref),
                title = COALESCE(?4, title),
                description = COALESCE(excluded.description, description),
                ai_breakdown = COALESCE(excluded.ai_breakdown, ai_breakdown),
                clarifying_questions =
                    COALESCE(excluded.clarifying_questions, clarifying_questions),
                clarifying_answers = COALESCE(excluded.clarifying_answers, clarifying_answers),
                energy_level = COALESCE(excluded.energy_level, energy_level),
                cognitive_load = COALESCE(excluded.cognitive_load, cognitive_load),
                estimated_duration_minutes =
                    COALESCE(excluded.estimated_duration_minutes, estimated_duration_minutes),
                last_updated_at = excluded.last_updated_at",
            params![
                user_id,
                external_task_id,
                patch.project_ref,
                patch.title,
                patch.description,
                breakdown_json,
                questions_json,
                answers_json,
                patch.energy_level.map(|e| e.as_str()),
                patch.cognitive_load.map(|c| c.as_str()),
                patch.estimated_duration_minutes,
                now,
            ],
        )?;
        Ok(())
    }

    /// Fetch the insight row for one external task.
    pub fn get_insight(
        &self,
        user_id: i64,
        external_task_id: &str,
    ) -> Result<Option<DbTaskInsight>, DbError> {
        let insight = self
            .conn
            .query_row(
                &format!(
                    "SELECT {INSIGHT_COLUMNS} FROM task_insights
                     WHERE user_id = ?1 AND external_task_id = ?2"
                ),
                params![user_id, external_task_id],
                Self::map_insight_row,
            )
            .optional()?;
        Ok(insight)
    }

    /// Whether an insight row exists for this external task.
    pub fn has_insight(&self, user_id: i64, external_task_id: &str) -> Result<bool, DbError> {
        let exists = self
            .conn
            .prepare("SELECT 1 FROM task_insights WHERE user_id = ?1 AND external_task_id = ?2")?
            .exists(params![user_id, external_task_id])?;
        Ok(exists)
    }

    /// All insight rows for a user, oldest first. Used by the backfill sweep.
    pub fn all_insights(&self, user_id: i64) -> Result<Vec<DbTaskInsight>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM task_insights
             WHERE user_id = ?1 ORDER BY first_seen_at"
        ))?;
        let rows = stmt.query_map(params![user_id], Self::map_insight_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Uncompleted insights first seen before `cutoff` (RFC 3339), oldest first.
    pub fn stale_insights(&self, user_id: i64, cutoff: &str) -> Result<Vec<DbTaskInsight>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM task_insights
             WHERE user_id = ?1 AND completed = 0 AND first_seen_at < ?2
             ORDER BY first_seen_at"
        ))?;
        let rows = stmt.query_map(params![user_id, cutoff], Self::map_insight_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Uncompleted insights ordered by descending priority score, optionally
    /// filtered by energy level. Pure local query — no network.
    pub fn top_by_priority(
        &self,
        user_id: i64,
        limit: i64,
        energy_level: Option<EnergyLevel>,
    ) -> Result<Vec<DbTaskInsight>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM task_insights
             WHERE user_id = ?1 AND completed = 0
               AND (?2 IS NULL OR energy_level = ?2)
             ORDER BY priority_score DESC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![user_id, energy_level.map(|e| e.as_str()), limit],
            Self::map_insight_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Uncompleted insights in one Eisenhower quadrant, highest priority first.
    pub fn by_quadrant(
        &self,
        user_id: i64,
        quadrant: Quadrant,
    ) -> Result<Vec<DbTaskInsight>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM task_insights
             WHERE user_id = ?1 AND completed = 0 AND eisenhower_quadrant = ?2
             ORDER BY priority_score DESC"
        ))?;
        let rows = stmt.query_map(params![user_id, quadrant.as_str()], Self::map_insight_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Cached task view for when the remote service is unreachable.
    pub fn cached_tasks(&self, user_id: i64, completed: bool) -> Result<Vec<DbTaskInsight>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INSIGHT_COLUMNS} FROM task_insights
             WHERE user_id = ?1 AND completed = ?2
             ORDER BY last_updated_at DESC"
        ))?;
        let rows = stmt.query_map(params![user_id, completed], Self::map_insight_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Persist one prioritization score set. Returns false when no row exists
    /// for the task — prioritization never creates rows.
    pub fn apply_scores(
        &self,
        user_id: i64,
        external_task_id: &str,
        score: &TaskScore,
    ) -> Result<bool, DbError> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE task_insights
             SET urgency_score = ?1, importance_score = ?2,
                 eisenhower_quadrant = ?3, priority_score = ?4,
                 last_updated_at = ?5
             WHERE user_id = ?6 AND external_task_id = ?7",
            params![
                score.urgency_score,
                score.importance_score,
                score.eisenhower_quadrant.as_str(),
                score.priority_score,
                now,
                user_id,
                external_task_id,
            ],
        )?;
        Ok(updated > 0)
    }

    /// Mark a task completed, recording actual duration when provided.
    /// Returns false (not an error) when no insight row exists.
    pub fn set_completion(
        &self,
        user_id: i64,
        external_task_id: &str,
        actual_duration_minutes: Option<i64>,
    ) -> Result<bool, DbError> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE task_insights
             SET completed = 1, completed_at = ?1,
                 actual_duration_minutes = COALESCE(?2, actual_duration_minutes),
                 last_updated_at = ?1
             WHERE user_id = ?3 AND external_task_id = ?4",
            params![now, actual_duration_minutes, user_id, external_task_id],
        )?;
        Ok(updated > 0)
    }

    /// Refresh the staleness bookkeeping computed by the stale-task sweep.
    pub fn touch_staleness(
        &self,
        user_id: i64,
        external_task_id: &str,
        days_since_created: i64,
        blockers: &[String],
    ) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        let blockers_json = serde_json::to_string(blockers)?;
        self.conn.execute(
            "UPDATE task_insights
             SET days_since_created = ?1, blockers_identified = ?2, last_updated_at = ?3
             WHERE user_id = ?4 AND external_task_id = ?5",
            params![days_since_created, blockers_json, now, user_id, external_task_id],
        )?;
        Ok(())
    }

    /// Fill a missing project ref. Never overwrites a stored non-null value.
    /// Returns true when the row was actually updated.
    pub fn set_project_ref_if_missing(
        &self,
        user_id: i64,
        external_task_id: &str,
        project_ref: &str,
    ) -> Result<bool, DbError> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE task_insights
             SET project_ref = ?1, last_updated_at = ?2
             WHERE user_id = ?3 AND external_task_id = ?4 AND project_ref IS NULL",
            params![project_ref, now, user_id, external_task_id],
        )?;
        Ok(updated > 0)
    }

    /// Overwrite the cached description (clarification append-back).
    pub fn set_description(
        &self,
        user_id: i64,
        external_task_id: &str,
        description: &str,
    ) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE task_insights SET description = ?1, last_updated_at = ?2
             WHERE user_id = ?3 AND external_task_id = ?4",
            params![description, now, user_id, external_task_id],
        )?;
        Ok(())
    }

    /// Attach email provenance to an existing insight row.
    pub fn set_email_metadata(
        &self,
        user_id: i64,
        external_task_id: &str,
        meta: &EmailProvenance,
    ) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE task_insights
             SET email_source = ?1, email_message_id = ?2, email_link = ?3,
                 email_has_attachments = ?4, email_attachment_count = ?5,
                 email_subject = ?6, email_from = ?7, email_received_at = ?8,
                 last_updated_at = ?9
             WHERE user_id = ?10 AND external_task_id = ?11",
            params![
                meta.source.as_str(),
                meta.message_id,
                meta.link,
                meta.has_attachments,
                meta.attachment_count,
                meta.subject,
                meta.from,
                meta.received_at,
                now,
                user_id,
                external_task_id,
            ],
        )?;
        Ok(())
    }

    fn map_insight_row(row: &Row<'_>) -> rusqlite::Result<DbTaskInsight> {
        // JSON columns are written by this crate; a row that fails to decode
        // (manual edits, downgrades) degrades to None rather than failing the
        // whole query.
        fn json_col<T: serde::de::DeserializeOwned>(raw: Option<String>) -> Option<T> {
            raw.and_then(|s| match serde_json::from_str(&s) {
                Ok(v) => Some(v),
                Err(e) => {
                    log::warn!("Dropping undecodable JSON column: {}", e);
                    None
                }
            })
        }

        Ok(DbTaskInsight {
            id: row.get(0)?,
            user_id: row.get(1)?,
            external_task_id: row.get(2)?,
            project_ref: row.get(3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            ai_breakdown: json_col(row.get(6)?),
            clarifying_questions: json_col(row.get(7)?),
            clarifying_answers: json_col(row.get(8)?),
            energy_level: row
                .get::<_, Option<String>>(9)?
                .as_deref()
                .and_then(EnergyLevel::parse),
            cognitive_load: row
                .get::<_, Option<String>>(10)?
                .as_deref()
                .and_then(CognitiveLoad::parse),
            estimated_duration_minutes: row.get(11)?,
            actual_duration_minutes: row.get(12)?,
            priority_score: row.get(13)?,
            urgency_score: row.get(14)?,
            importance_score: row.get(15)?,
            eisenhower_quadrant: row
                .get::<_, Option<String>>(16)?
                .as_deref()
                .and_then(Quadrant::parse),
            first_seen_at: row.get(17)?,
            last_updated_at: row.get(18)?,
            days_since_created: row.get(19)?,
            times_deferred: row.get(20)?,
            blockers_identified: json_col(row.get(21)?),
            completed: row.get(22)?,
            completed_at: row.get(23)?,
            email_source: row
                .get::<_, Option<String>>(24)?
                .as_deref()
                .and_then(EmailSource::parse),
            email_message_id: row.get(25)?,
            email_link: row.get(26)?,
            email_has_attachments: row.get(27)?,
            email_attachment_count: row.get(28)?,
            email_subject: row.get(29)?,
            email_from: row.get(30)?,
            email_received_at: row.get(31)?,
        })
    }
}
