use rusqlite::{params, OptionalExtension, Row};

use super::*;

const SAMPLE_COLUMNS: &str =
    "id, user_id, timestamp, energy_level, focus_quality, time_of_day, day_of_week, tasks_completed";

impl InsightDb {
    // =========================================================================
    // Energy samples (append-only)
    // =========================================================================

    /// Append one energy sample, returning its row id.
    pub fn insert_energy_sample(
        &self,
        user_id: i64,
        timestamp: &str,
        energy_level: EnergyLevel,
        focus_quality: Option<FocusQuality>,
        time_of_day: TimeOfDay,
        day_of_week: &str,
    ) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO energy_samples
             (user_id, timestamp, energy_level, focus_quality, time_of_day, day_of_week)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user_id,
                timestamp,
                energy_level.as_str(),
                focus_quality.map(|f| f.as_str()),
                time_of_day.as_str(),
                day_of_week,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// The `limit` most recent samples sharing a time-of-day bucket and
    /// day-of-week, newest first. Backs the same-time-last-week recommendation.
    pub fn recent_matching_samples(
        &self,
        user_id: i64,
        time_of_day: TimeOfDay,
        day_of_week: &str,
        limit: i64,
    ) -> Result<Vec<DbEnergySample>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM energy_samples
             WHERE user_id = ?1 AND time_of_day = ?2 AND day_of_week = ?3
             ORDER BY timestamp DESC
             LIMIT ?4"
        ))?;
        let rows = stmt.query_map(
            params![user_id, time_of_day.as_str(), day_of_week, limit],
            Self::map_sample_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// All samples at or after `cutoff` (RFC 3339), oldest first.
    pub fn samples_since(&self, user_id: i64, cutoff: &str) -> Result<Vec<DbEnergySample>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SAMPLE_COLUMNS} FROM energy_samples
             WHERE user_id = ?1 AND timestamp >= ?2
             ORDER BY timestamp"
        ))?;
        let rows = stmt.query_map(params![user_id, cutoff], Self::map_sample_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Append a completed task id to the newest sample's `tasks_completed`
    /// list. No-op when the user has no samples yet.
    pub fn append_completed_task_to_latest_sample(
        &self,
        user_id: i64,
        external_task_id: &str,
    ) -> Result<bool, DbError> {
        let latest: Option<(i64, Option<String>)> = self
            .conn
            .query_row(
                "SELECT id, tasks_completed FROM energy_samples
                 WHERE user_id = ?1 ORDER BY timestamp DESC LIMIT 1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, raw)) = latest else {
            return Ok(false);
        };

        let mut tasks: Vec<String> = raw
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        tasks.push(external_task_id.to_string());

        self.conn.execute(
            "UPDATE energy_samples SET tasks_completed = ?1 WHERE id = ?2",
            params![serde_json::to_string(&tasks)?, id],
        )?;
        Ok(true)
    }

    fn map_sample_row(row: &Row<'_>) -> rusqlite::Result<DbEnergySample> {
        let level: String = row.get(3)?;
        let bucket: String = row.get(5)?;
        Ok(DbEnergySample {
            id: row.get(0)?,
            user_id: row.get(1)?,
            timestamp: row.get(2)?,
            energy_level: EnergyLevel::parse(&level).unwrap_or(EnergyLevel::Medium),
            focus_quality: row
                .get::<_, Option<String>>(4)?
                .as_deref()
                .and_then(FocusQuality::parse),
            time_of_day: TimeOfDay::parse(&bucket).unwrap_or(TimeOfDay::Night),
            day_of_week: row.get(6)?,
            tasks_completed: row
                .get::<_, Option<String>>(7)?
                .and_then(|s| serde_json::from_str(&s).ok()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, InsightDb, i64) {
        let dir = tempfile::tempdir().unwrap();
        let db = InsightDb::open_at(dir.path().join("test.db")).unwrap();
        let user = db.ensure_user(None).unwrap();
        (dir, db, user)
    }

    #[test]
    fn test_recent_matching_samples_filters_and_limits() {
        let (_dir, db, user) = test_db();
        for i in 0..12 {
            db.insert_energy_sample(
                user,
                &format!("2026-01-{:02}T09:00:00Z", i + 1),
                EnergyLevel::High,
                None,
                TimeOfDay::Morning,
                "Monday",
            )
            .unwrap();
        }
        db.insert_energy_sample(
            user,
            "2026-01-20T14:00:00Z",
            EnergyLevel::Low,
            None,
            TimeOfDay::Afternoon,
            "Monday",
        )
        .unwrap();

        let samples = db
            .recent_matching_samples(user, TimeOfDay::Morning, "Monday", 10)
            .unwrap();
        assert_eq!(samples.len(), 10);
        assert!(samples.iter().all(|s| s.time_of_day == TimeOfDay::Morning));
        // Newest first
        assert_eq!(samples[0].timestamp, "2026-01-12T09:00:00Z");
    }

    #[test]
    fn test_append_completed_task() {
        let (_dir, db, user) = test_db();
        assert!(!db.append_completed_task_to_latest_sample(user, "t1").unwrap());

        db.insert_energy_sample(
            user,
            "2026-01-01T09:00:00Z",
            EnergyLevel::Medium,
            Some(FocusQuality::Focused),
            TimeOfDay::Morning,
            "Thursday",
        )
        .unwrap();
        assert!(db.append_completed_task_to_latest_sample(user, "t1").unwrap());
        assert!(db.append_completed_task_to_latest_sample(user, "t2").unwrap());

        let samples = db.samples_since(user, "2026-01-01T00:00:00Z").unwrap();
        assert_eq!(
            samples[0].tasks_completed.as_deref(),
            Some(&["t1".to_string(), "t2".to_string()][..])
        );
    }
}
