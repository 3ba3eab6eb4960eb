//! Energy sample logging and same-time-of-week recommendations.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::{DbEnergySample, EnergyLevel, FocusQuality, InsightDb, TimeOfDay};
use crate::error::AppError;
use crate::prioritizer::TaskSummary;

/// How many recent matching samples feed a recommendation.
const RECOMMENDATION_SAMPLE_LIMIT: i64 = 10;

/// Per-bucket energy pattern over the analysis window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPattern {
    pub time_of_day: TimeOfDay,
    pub most_common_energy: EnergyLevel,
    /// Sample counts per energy level.
    pub distribution: BTreeMap<String, usize>,
}

/// Energy pattern summary over a lookback window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyPatterns {
    pub total_samples: usize,
    pub patterns: Vec<BucketPattern>,
    /// One human-readable line per bucket with data.
    pub insights: Vec<String>,
}

pub struct EnergyTracker {
    db: Arc<Mutex<InsightDb>>,
}

impl EnergyTracker {
    pub fn new(db: Arc<Mutex<InsightDb>>) -> Self {
        Self { db }
    }

    fn store(&self) -> Result<MutexGuard<'_, InsightDb>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal("insight store lock poisoned".into()))
    }

    /// Append a sample for "now", tagged with its daypart and weekday.
    pub fn log(
        &self,
        user_id: i64,
        energy_level: EnergyLevel,
        focus_quality: Option<FocusQuality>,
    ) -> Result<i64, AppError> {
        self.log_at(user_id, energy_level, focus_quality, Utc::now())
    }

    /// Append a sample at an explicit instant. Split out for tests.
    pub fn log_at(
        &self,
        user_id: i64,
        energy_level: EnergyLevel,
        focus_quality: Option<FocusQuality>,
        at: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        use chrono::Timelike;
        let time_of_day = TimeOfDay::from_hour(at.hour());
        let day_of_week = at.format("%A").to_string();
        let id = self.store()?.insert_energy_sample(
            user_id,
            &at.to_rfc3339(),
            energy_level,
            focus_quality,
            time_of_day,
            &day_of_week,
        )?;
        Ok(id)
    }

    /// Likely current energy, from the 10 most recent samples sharing the
    /// current daypart and weekday. With no matching history, a fixed
    /// default-by-daypart table applies.
    pub fn recommend_current(&self, user_id: i64) -> Result<EnergyLevel, AppError> {
        self.recommend_at(user_id, Utc::now())
    }

    /// Recommendation for an explicit instant. Split out for tests.
    pub fn recommend_at(&self, user_id: i64, at: DateTime<Utc>) -> Result<EnergyLevel, AppError> {
        use chrono::Timelike;
        let time_of_day = TimeOfDay::from_hour(at.hour());
        let day_of_week = at.format("%A").to_string();

        let samples = self.store()?.recent_matching_samples(
            user_id,
            time_of_day,
            &day_of_week,
            RECOMMENDATION_SAMPLE_LIMIT,
        )?;

        if samples.is_empty() {
            return Ok(default_for(time_of_day));
        }

        Ok(modal_energy(samples.iter().map(|s| s.energy_level)))
    }

    /// Task suggestions matching an energy level, highest priority first.
    pub fn suggest_tasks(
        &self,
        user_id: i64,
        energy_level: EnergyLevel,
        limit: i64,
    ) -> Result<Vec<TaskSummary>, AppError> {
        let insights = self
            .store()?
            .top_by_priority(user_id, limit, Some(energy_level))?;
        Ok(insights.iter().map(TaskSummary::from_insight).collect())
    }

    /// Group samples from the last `days_back` days by daypart and report the
    /// modal level plus the full distribution for each.
    pub fn patterns(&self, user_id: i64, days_back: i64) -> Result<EnergyPatterns, AppError> {
        let cutoff = (Utc::now() - Duration::days(days_back)).to_rfc3339();
        let samples = self.store()?.samples_since(user_id, &cutoff)?;
        Ok(build_patterns(&samples))
    }

    /// Record that a task was completed during the latest logged sample.
    pub fn mark_completed_at_energy(
        &self,
        user_id: i64,
        external_task_id: &str,
    ) -> Result<bool, AppError> {
        Ok(self
            .store()?
            .append_completed_task_to_latest_sample(user_id, external_task_id)?)
    }
}

/// Default recommendation when no history matches: mornings run high,
/// afternoons medium, evenings and nights low.
fn default_for(time_of_day: TimeOfDay) -> EnergyLevel {
    match time_of_day {
        TimeOfDay::Morning => EnergyLevel::High,
        TimeOfDay::Afternoon => EnergyLevel::Medium,
        TimeOfDay::Evening | TimeOfDay::Night => EnergyLevel::Low,
    }
}

/// Most frequent level in iteration order; ties go to the level that reached
/// the maximum count first, which keeps the result deterministic for a given
/// input order.
fn modal_energy(levels: impl Iterator<Item = EnergyLevel>) -> EnergyLevel {
    let mut counts: Vec<(EnergyLevel, usize)> = Vec::new();
    for level in levels {
        match counts.iter_mut().find(|(l, _)| *l == level) {
            Some((_, n)) => *n += 1,
            None => counts.push((level, 1)),
        }
    }

    let mut best = (EnergyLevel::Medium, 0usize);
    for (level, n) in counts {
        if n > best.1 {
            best = (level, n);
        }
    }
    best.0
}

fn build_patterns(samples: &[DbEnergySample]) -> EnergyPatterns {
    let mut patterns = Vec::new();
    let mut insights = Vec::new();

    for bucket in [
        TimeOfDay::Morning,
        TimeOfDay::Afternoon,
        TimeOfDay::Evening,
        TimeOfDay::Night,
    ] {
        let in_bucket: Vec<EnergyLevel> = samples
            .iter()
            .filter(|s| s.time_of_day == bucket)
            .map(|s| s.energy_level)
            .collect();
        if in_bucket.is_empty() {
            continue;
        }

        let mut distribution: BTreeMap<String, usize> = BTreeMap::new();
        for level in &in_bucket {
            *distribution.entry(level.as_str().to_string()).or_insert(0) += 1;
        }
        let most_common = modal_energy(in_bucket.iter().copied());

        insights.push(format!(
            "You're usually {} energy in the {}",
            most_common.as_str(),
            bucket.as_str()
        ));
        patterns.push(BucketPattern {
            time_of_day: bucket,
            most_common_energy: most_common,
            distribution,
        });
    }

    EnergyPatterns {
        total_samples: samples.len(),
        patterns,
        insights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::testsupport::test_store;

    /// A Monday. 09:00 UTC falls in the morning bucket.
    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 3, 9, 0, 0).unwrap()
    }

    fn tracker() -> (tempfile::TempDir, EnergyTracker, i64) {
        let (dir, db, user) = test_store();
        (dir, EnergyTracker::new(db), user)
    }

    #[test]
    fn test_recommend_defaults_without_history() {
        let (_dir, tracker, user) = tracker();
        let at = monday_morning();
        assert_eq!(tracker.recommend_at(user, at).unwrap(), EnergyLevel::High);

        let afternoon = at + Duration::hours(5);
        assert_eq!(
            tracker.recommend_at(user, afternoon).unwrap(),
            EnergyLevel::Medium
        );

        let night = at + Duration::hours(14);
        assert_eq!(tracker.recommend_at(user, night).unwrap(), EnergyLevel::Low);
    }

    #[test]
    fn test_recommend_uses_modal_matching_history() {
        let (_dir, tracker, user) = tracker();
        let base = monday_morning();

        // Three Monday mornings: two low, one high.
        for (weeks, level) in [(0, EnergyLevel::Low), (1, EnergyLevel::Low), (2, EnergyLevel::High)]
        {
            tracker
                .log_at(user, level, None, base - Duration::weeks(weeks))
                .unwrap();
        }
        // A Monday afternoon sample must not bleed into the morning bucket.
        tracker
            .log_at(user, EnergyLevel::High, None, base + Duration::hours(5))
            .unwrap();

        assert_eq!(tracker.recommend_at(user, base).unwrap(), EnergyLevel::Low);
    }

    #[test]
    fn test_recommend_tie_break_is_deterministic() {
        let (_dir, tracker, user) = tracker();
        let base = monday_morning();
        // Newest sample is high; one-all tie between high and low.
        tracker
            .log_at(user, EnergyLevel::Low, None, base - Duration::weeks(1))
            .unwrap();
        tracker.log_at(user, EnergyLevel::High, None, base).unwrap();

        // Samples iterate newest first, so high reaches the max count first.
        assert_eq!(tracker.recommend_at(user, base).unwrap(), EnergyLevel::High);
    }

    #[test]
    fn test_recommend_considers_only_ten_most_recent() {
        let (_dir, tracker, user) = tracker();
        let base = monday_morning();
        // 10 recent highs, then 5 older lows that must fall outside the window.
        for weeks in 0..10 {
            tracker
                .log_at(user, EnergyLevel::High, None, base - Duration::weeks(weeks))
                .unwrap();
        }
        for weeks in 10..15 {
            tracker
                .log_at(user, EnergyLevel::Low, None, base - Duration::weeks(weeks))
                .unwrap();
        }
        assert_eq!(tracker.recommend_at(user, base).unwrap(), EnergyLevel::High);
    }

    #[test]
    fn test_patterns_groups_by_bucket() {
        let (_dir, tracker, user) = tracker();
        let base = monday_morning();
        tracker.log_at(user, EnergyLevel::High, None, base).unwrap();
        tracker
            .log_at(user, EnergyLevel::High, None, base - Duration::days(1))
            .unwrap();
        tracker
            .log_at(user, EnergyLevel::Low, None, base - Duration::days(2))
            .unwrap();
        tracker
            .log_at(
                user,
                EnergyLevel::Medium,
                Some(FocusQuality::Focused),
                base + Duration::hours(6),
            )
            .unwrap();

        let patterns = tracker.patterns(user, 30).unwrap();
        assert_eq!(patterns.total_samples, 4);
        assert_eq!(patterns.patterns.len(), 2);

        let morning = &patterns.patterns[0];
        assert_eq!(morning.time_of_day, TimeOfDay::Morning);
        assert_eq!(morning.most_common_energy, EnergyLevel::High);
        assert_eq!(morning.distribution.get("high"), Some(&2));
        assert_eq!(morning.distribution.get("low"), Some(&1));

        assert!(patterns
            .insights
            .contains(&"You're usually high energy in the morning".to_string()));
        assert!(patterns
            .insights
            .contains(&"You're usually medium energy in the afternoon".to_string()));
    }

    #[test]
    fn test_patterns_empty_window() {
        let (_dir, tracker, user) = tracker();
        let patterns = tracker.patterns(user, 30).unwrap();
        assert_eq!(patterns.total_samples, 0);
        assert!(patterns.patterns.is_empty());
        assert!(patterns.insights.is_empty());
    }
}
