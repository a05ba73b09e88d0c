/// Time entry model: timers, manual entries and aggregates
///
/// # Schema
///
/// ```sql
/// CREATE TABLE time_entries (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
///     project_id UUID REFERENCES projects(id) ON DELETE SET NULL,
///     description TEXT,
///     start_time TIMESTAMPTZ NOT NULL,
///     end_time TIMESTAMPTZ,
///     paused_at TIMESTAMPTZ,
///     paused_seconds INTEGER NOT NULL DEFAULT 0,
///     duration_seconds INTEGER,
///     is_manual BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
///
/// CREATE UNIQUE INDEX uq_time_entries_active_timer
///     ON time_entries(user_id) WHERE end_time IS NULL;
/// ```
///
/// # Concurrency
///
/// Starting a timer relies on `uq_time_entries_active_timer`: two concurrent
/// starts cannot both insert, and the loser gets [`TimerError::AlreadyActive`].
/// Pause, resume and stop lock the row (`FOR UPDATE`) inside a transaction,
/// then apply the pure transition from [`crate::timer`].

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::timer::{TimerAction, TimerError, TimerUpdate};

/// Name of the partial unique index guarding the single active timer
pub const ACTIVE_TIMER_INDEX: &str = "uq_time_entries_active_timer";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimeEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub task_id: Uuid,
    pub project_id: Option<Uuid>,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    /// `None` while the timer is running or paused
    pub end_time: Option<DateTime<Utc>>,
    /// Set while paused
    pub paused_at: Option<DateTime<Utc>>,
    /// Accumulated length of completed pauses
    pub paused_seconds: i32,
    /// Tracked seconds, set once the entry is closed
    pub duration_seconds: Option<i32>,
    pub is_manual: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New bounds for an edited closed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i32,
}

impl TimeEntry {
    /// Bounds after moving the start or changing the duration
    ///
    /// `None` when neither is given, meaning the stored interval stands.
    pub fn rescheduled(&self, start_time: Option<DateTime<Utc>>, duration_seconds: Option<i32>) -> Option<Interval> {
        if start_time.is_none() && duration_seconds.is_none() {
            return None;
        }

        let start_time = start_time.unwrap_or(self.start_time);
        let duration_seconds = duration_seconds.or(self.duration_seconds).unwrap_or(0);
        Some(Interval {
            start_time,
            end_time: start_time + Duration::seconds(i64::from(duration_seconds)),
            duration_seconds,
        })
    }
}

/// Entry joined with task and project names for listings
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TimeEntryWithTask {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub entry: TimeEntry,
    pub task_title: String,
    pub project_name: Option<String>,
}

/// Errors from timer persistence
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct StartTimer {
    pub user_id: Uuid,
    pub task_id: Uuid,
    pub project_id: Option<Uuid>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateManualEntry {
    pub user_id: Uuid,
    pub task_id: Uuid,
    pub project_id: Option<Uuid>,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration_seconds: i32,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTimeEntry {
    pub task_id: Option<Uuid>,
    pub project_id: Option<Option<Uuid>>,
    pub description: Option<Option<String>>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct TimeEntryFilter {
    /// `None` lists every user's entries
    pub user_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    /// Inclusive calendar-day bounds on `start_time` (UTC)
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Aggregation bucket size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    #[default]
    Day,
    Week,
    Month,
}

impl StatsPeriod {
    /// The `date_trunc` field name
    pub fn as_str(&self) -> &'static str {
        match self {
            StatsPeriod::Day => "day",
            StatsPeriod::Week => "week",
            StatsPeriod::Month => "month",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "day" => Some(StatsPeriod::Day),
            "week" => Some(StatsPeriod::Week),
            "month" => Some(StatsPeriod::Month),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PeriodTotal {
    /// First day of the bucket
    pub period_start: NaiveDate,
    pub total_seconds: i64,
    pub entry_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TaskTotal {
    pub task_id: Uuid,
    pub task_title: String,
    pub total_seconds: i64,
    pub entry_count: i64,
}

/// Timestamp of a manual entry dated `date` with no explicit start time
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn is_active_timer_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.constraint() == Some(ACTIVE_TIMER_INDEX)
    )
}

const ENTRY_COLUMNS: &str = "e.id, e.user_id, e.task_id, e.project_id, e.description, e.start_time, \
                             e.end_time, e.paused_at, e.paused_seconds, e.duration_seconds, \
                             e.is_manual, e.created_at, e.updated_at";

impl TimeEntry {
    /// Opens a running timer at `now`
    ///
    /// # Errors
    ///
    /// [`TimerError::AlreadyActive`] if the user already has an open entry.
    pub async fn start(
        pool: &PgPool,
        data: StartTimer,
        now: DateTime<Utc>,
    ) -> Result<Self, TrackingError> {
        let query = format!(
            "INSERT INTO time_entries AS e (user_id, task_id, project_id, description, start_time, is_manual) \
             VALUES ($1, $2, $3, $4, $5, FALSE) RETURNING {ENTRY_COLUMNS}"
        );

        sqlx::query_as::<_, TimeEntry>(&query)
            .bind(data.user_id)
            .bind(data.task_id)
            .bind(data.project_id)
            .bind(data.description)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| {
                if is_active_timer_violation(&e) {
                    TrackingError::Timer(TimerError::AlreadyActive)
                } else {
                    TrackingError::Database(e)
                }
            })
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {ENTRY_COLUMNS} FROM time_entries e WHERE e.id = $1");

        sqlx::query_as::<_, TimeEntry>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The user's running or paused entry, if any
    pub async fn find_active(pool: &PgPool, user_id: Uuid) -> Result<Option<TimeEntryWithTask>, sqlx::Error> {
        let query = format!(
            "SELECT {ENTRY_COLUMNS}, t.title AS task_title, p.name AS project_name \
             FROM time_entries e \
             JOIN tasks t ON t.id = e.task_id \
             LEFT JOIN projects p ON p.id = e.project_id \
             WHERE e.user_id = $1 AND e.end_time IS NULL"
        );

        sqlx::query_as::<_, TimeEntryWithTask>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Pauses, resumes or stops the user's open entry
    ///
    /// # Errors
    ///
    /// [`TimerError::NoActiveTimer`] when nothing is open, otherwise the
    /// transition errors of [`TimeEntry::apply`].
    pub async fn apply_to_active(
        pool: &PgPool,
        user_id: Uuid,
        action: TimerAction,
        now: DateTime<Utc>,
    ) -> Result<Self, TrackingError> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM time_entries e \
             WHERE e.user_id = $1 AND e.end_time IS NULL FOR UPDATE"
        );
        let entry = sqlx::query_as::<_, TimeEntry>(&query)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(TimerError::NoActiveTimer)?;

        let update = entry.apply(action, now)?;
        let updated = write_update(&mut tx, entry.id, update).await?;

        tx.commit().await?;
        debug!(entry_id = %updated.id, ?action, "Timer transition applied");
        Ok(updated)
    }

    /// Stops a specific entry owned by `user_id`
    ///
    /// # Errors
    ///
    /// - [`TimerError::EntryNotFound`] when the id does not exist
    /// - [`TimerError::NotOwner`] when another user owns it
    /// - [`TimerError::AlreadyStopped`] when it is already closed
    pub async fn stop_entry(
        pool: &PgPool,
        user_id: Uuid,
        entry_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Self, TrackingError> {
        let mut tx = pool.begin().await?;

        let entry = lock_entry(&mut tx, entry_id)
            .await?
            .ok_or(TimerError::EntryNotFound)?;
        if entry.user_id != user_id {
            return Err(TimerError::NotOwner.into());
        }

        let update = entry.apply(TimerAction::Stop, now)?;
        let updated = write_update(&mut tx, entry.id, update).await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Records a closed, manual entry
    pub async fn create_manual(pool: &PgPool, data: CreateManualEntry) -> Result<Self, sqlx::Error> {
        let end_time = data.start_time + Duration::seconds(i64::from(data.duration_seconds));
        let query = format!(
            "INSERT INTO time_entries AS e (user_id, task_id, project_id, description, start_time, \
                                            end_time, duration_seconds, is_manual) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE) RETURNING {ENTRY_COLUMNS}"
        );

        sqlx::query_as::<_, TimeEntry>(&query)
            .bind(data.user_id)
            .bind(data.task_id)
            .bind(data.project_id)
            .bind(data.description)
            .bind(data.start_time)
            .bind(end_time)
            .bind(data.duration_seconds)
            .fetch_one(pool)
            .await
    }

    /// Edits a closed entry
    ///
    /// Changing `start_time` or `duration_seconds` re-derives
    /// `end_time = start_time + duration` and turns the entry into one
    /// continuous interval (`paused_seconds = 0`). Other edits leave the
    /// recorded interval alone.
    ///
    /// # Errors
    ///
    /// [`TimerError::EntryNotFound`] or [`TimerError::EntryRunning`].
    pub async fn update_closed(
        pool: &PgPool,
        id: Uuid,
        data: UpdateTimeEntry,
    ) -> Result<Self, TrackingError> {
        let mut tx = pool.begin().await?;

        let entry = lock_entry(&mut tx, id).await?.ok_or(TimerError::EntryNotFound)?;
        if entry.end_time.is_none() {
            return Err(TimerError::EntryRunning.into());
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE time_entries AS e SET updated_at = NOW()");
        if let Some(interval) = entry.rescheduled(data.start_time, data.duration_seconds) {
            qb.push(", start_time = ").push_bind(interval.start_time);
            qb.push(", end_time = ").push_bind(interval.end_time);
            qb.push(", duration_seconds = ").push_bind(interval.duration_seconds);
            qb.push(", paused_seconds = 0");
        }
        if let Some(task_id) = data.task_id {
            qb.push(", task_id = ").push_bind(task_id);
        }
        if let Some(project_id) = data.project_id {
            qb.push(", project_id = ").push_bind(project_id);
        }
        if let Some(description) = data.description {
            qb.push(", description = ").push_bind(description);
        }
        qb.push(" WHERE e.id = ").push_bind(id);
        qb.push(format!(" RETURNING {ENTRY_COLUMNS}"));

        let updated = qb.build_query_as::<TimeEntry>().fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Deletes a closed entry
    ///
    /// # Errors
    ///
    /// [`TimerError::EntryNotFound`] or [`TimerError::EntryRunning`].
    pub async fn delete_closed(pool: &PgPool, id: Uuid) -> Result<(), TrackingError> {
        let mut tx = pool.begin().await?;

        let entry = lock_entry(&mut tx, id).await?.ok_or(TimerError::EntryNotFound)?;
        if entry.end_time.is_none() {
            return Err(TimerError::EntryRunning.into());
        }

        sqlx::query("DELETE FROM time_entries WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Lists entries, newest first
    pub async fn list(
        pool: &PgPool,
        filter: &TimeEntryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TimeEntryWithTask>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {ENTRY_COLUMNS}, t.title AS task_title, p.name AS project_name \
             FROM time_entries e \
             JOIN tasks t ON t.id = e.task_id \
             LEFT JOIN projects p ON p.id = e.project_id \
             WHERE TRUE"
        ));
        push_entry_filter(&mut qb, filter);
        qb.push(" ORDER BY e.start_time DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<TimeEntryWithTask>().fetch_all(pool).await
    }

    pub async fn count(pool: &PgPool, filter: &TimeEntryFilter) -> Result<i64, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM time_entries e WHERE TRUE");
        push_entry_filter(&mut qb, filter);

        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }

    /// Closed-entry totals bucketed by `period` between two days (inclusive)
    pub async fn totals_by_period(
        pool: &PgPool,
        user_id: Option<Uuid>,
        period: StatsPeriod,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PeriodTotal>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT date_trunc(");
        qb.push_bind(period.as_str())
            .push(
                ", e.start_time AT TIME ZONE 'UTC')::date AS period_start, \
                 COALESCE(SUM(e.duration_seconds), 0)::BIGINT AS total_seconds, \
                 COUNT(*) AS entry_count \
                 FROM time_entries e WHERE e.end_time IS NOT NULL",
            );
        push_entry_filter(
            &mut qb,
            &TimeEntryFilter {
                user_id,
                from: Some(from),
                to: Some(to),
                ..Default::default()
            },
        );
        qb.push(" GROUP BY 1 ORDER BY 1");

        qb.build_query_as::<PeriodTotal>().fetch_all(pool).await
    }

    /// Closed-entry totals per task, largest first
    pub async fn totals_by_task(
        pool: &PgPool,
        user_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
        limit: i64,
    ) -> Result<Vec<TaskTotal>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT e.task_id, t.title AS task_title, \
                    COALESCE(SUM(e.duration_seconds), 0)::BIGINT AS total_seconds, \
                    COUNT(*) AS entry_count \
             FROM time_entries e JOIN tasks t ON t.id = e.task_id \
             WHERE e.end_time IS NOT NULL",
        );
        push_entry_filter(
            &mut qb,
            &TimeEntryFilter {
                user_id,
                from: Some(from),
                to: Some(to),
                ..Default::default()
            },
        );
        qb.push(" GROUP BY e.task_id, t.title ORDER BY total_seconds DESC LIMIT ")
            .push_bind(limit);

        qb.build_query_as::<TaskTotal>().fetch_all(pool).await
    }

    /// Sum of closed-entry durations between two days (inclusive)
    pub async fn total_seconds(
        pool: &PgPool,
        user_id: Option<Uuid>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i64, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT COALESCE(SUM(e.duration_seconds), 0)::BIGINT FROM time_entries e \
             WHERE e.end_time IS NOT NULL",
        );
        push_entry_filter(
            &mut qb,
            &TimeEntryFilter {
                user_id,
                from: Some(from),
                to: Some(to),
                ..Default::default()
            },
        );

        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }
}

async fn lock_entry(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<TimeEntry>, sqlx::Error> {
    let query = format!("SELECT {ENTRY_COLUMNS} FROM time_entries e WHERE e.id = $1 FOR UPDATE");

    sqlx::query_as::<_, TimeEntry>(&query)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
}

async fn write_update(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: Uuid,
    update: TimerUpdate,
) -> Result<TimeEntry, sqlx::Error> {
    let query = format!(
        "UPDATE time_entries AS e \
         SET end_time = $2, paused_at = $3, paused_seconds = $4, duration_seconds = $5, updated_at = NOW() \
         WHERE e.id = $1 RETURNING {ENTRY_COLUMNS}"
    );

    sqlx::query_as::<_, TimeEntry>(&query)
        .bind(id)
        .bind(update.end_time)
        .bind(update.paused_at)
        .bind(update.paused_seconds)
        .bind(update.duration_seconds)
        .fetch_one(&mut **tx)
        .await
}

fn push_entry_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &TimeEntryFilter) {
    if let Some(user_id) = filter.user_id {
        qb.push(" AND e.user_id = ").push_bind(user_id);
    }
    if let Some(task_id) = filter.task_id {
        qb.push(" AND e.task_id = ").push_bind(task_id);
    }
    if let Some(project_id) = filter.project_id {
        qb.push(" AND e.project_id = ").push_bind(project_id);
    }
    if let Some(from) = filter.from {
        qb.push(" AND e.start_time >= ").push_bind(start_of_day(from));
    }
    if let Some(to) = filter.to.and_then(|d| d.succ_opt()) {
        qb.push(" AND e.start_time < ").push_bind(start_of_day(to));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_period_parse() {
        assert_eq!(StatsPeriod::parse("week"), Some(StatsPeriod::Week));
        assert_eq!(StatsPeriod::parse("year"), None);
        assert_eq!(StatsPeriod::default(), StatsPeriod::Day);
        assert_eq!(StatsPeriod::Month.as_str(), "month");
    }

    #[test]
    fn test_start_of_day_is_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 14).unwrap();
        assert_eq!(start_of_day(date).to_rfc3339(), "2025-02-14T00:00:00+00:00");
    }

    #[test]
    fn test_tracking_error_wraps_timer_error() {
        let err: TrackingError = TimerError::AlreadyActive.into();
        assert!(matches!(err, TrackingError::Timer(TimerError::AlreadyActive)));
        assert_eq!(err.to_string(), "A timer is already running");
    }

    fn stopped_after_pause() -> TimeEntry {
        // 09:00 to 10:00 with a 10 minute pause
        let start = DateTime::parse_from_rfc3339("2025-03-10T09:00:00Z").unwrap().with_timezone(&Utc);
        TimeEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            project_id: None,
            description: None,
            start_time: start,
            end_time: Some(start + Duration::hours(1)),
            paused_at: None,
            paused_seconds: 600,
            duration_seconds: Some(3000),
            is_manual: false,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_interval_untouched_without_time_fields() {
        assert_eq!(stopped_after_pause().rescheduled(None, None), None);
    }

    #[test]
    fn test_rescheduled_derives_end_from_duration() {
        let entry = stopped_after_pause();

        let shorter = entry.rescheduled(None, Some(1800)).unwrap();
        assert_eq!(shorter.start_time, entry.start_time);
        assert_eq!(shorter.end_time, entry.start_time + Duration::minutes(30));

        let moved_start = entry.start_time + Duration::hours(2);
        let moved = entry.rescheduled(Some(moved_start), None).unwrap();
        assert_eq!(moved.duration_seconds, 3000);
        assert_eq!(moved.end_time, moved_start + Duration::seconds(3000));
    }

    #[test]
    fn test_non_database_error_is_not_active_timer_violation() {
        assert!(!is_active_timer_violation(&sqlx::Error::RowNotFound));
    }
}
