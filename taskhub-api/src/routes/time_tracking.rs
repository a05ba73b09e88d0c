/// Timer endpoints
///
/// # Endpoints
///
/// - `POST /api/time-tracking/start` - Start a timer on a task
/// - `POST /api/time-tracking/pause` - Pause the running timer
/// - `POST /api/time-tracking/resume` - Resume the paused timer
/// - `POST /api/time-tracking/stop` - Stop the open timer (or `entry_id`)
/// - `GET  /api/time-tracking/active` - The open timer with live elapsed seconds
/// - `GET  /api/time-tracking/stats` - Totals by day/week/month and by task
///
/// # State machine
///
/// ```text
/// idle --start--> running --pause--> paused --resume--> running
/// running | paused --stop--> idle
/// ```
///
/// Invalid transitions answer 409, a missing timer 404. One open timer per
/// user is guaranteed by the database.

use axum::{extract::State, Extension};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use taskhub_shared::{
    auth::{
        authorization::{require_task, Access},
        middleware::AuthContext,
    },
    models::{
        activity_log::ActivityLog,
        time_entry::{PeriodTotal, StartTimer, StatsPeriod, TaskTotal, TimeEntry, TimeEntryWithTask},
    },
    timer::{TimerAction, TimerState},
};
use uuid::Uuid;
use validator::Validate;

use super::load_task;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{OptionalJson, Query, ValidatedJson},
    response::ApiResponse,
    validation::parse_query,
};

/// Default stats window when `from` is omitted
const DEFAULT_STATS_DAYS: i64 = 30;

/// Longest stats window
const MAX_STATS_DAYS: i64 = 366;

/// Per-task rows returned by stats
const TOP_TASKS: i64 = 10;

#[derive(Debug, Deserialize, Validate)]
pub struct StartTimerRequest {
    pub task_id: Uuid,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct StopTimerRequest {
    /// Stop this entry instead of the caller's open one
    pub entry_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub period: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// An entry with its timer state and tracked seconds as of the response
#[derive(Debug, Serialize)]
pub struct TimerView {
    #[serde(flatten)]
    pub entry: TimeEntry,
    pub state: TimerState,
    pub elapsed_seconds: i64,
}

impl From<TimeEntry> for TimerView {
    fn from(entry: TimeEntry) -> Self {
        let state = entry.timer_state();
        let elapsed_seconds = entry.elapsed_seconds(Utc::now());
        Self {
            entry,
            state,
            elapsed_seconds,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ActiveTimer {
    #[serde(flatten)]
    pub entry: TimeEntryWithTask,
    pub state: TimerState,
    pub elapsed_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct TimeStats {
    pub period: StatsPeriod,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub total_seconds: i64,
    pub by_period: Vec<PeriodTotal>,
    pub by_task: Vec<TaskTotal>,
    /// Live seconds of the open timer, not included in the totals
    pub active_elapsed_seconds: Option<i64>,
}

/// Resolves the stats window, defaulting to the last 30 days
fn stats_window(from: Option<NaiveDate>, to: Option<NaiveDate>, today: NaiveDate) -> ApiResult<(NaiveDate, NaiveDate)> {
    let to = to.unwrap_or(today);
    let from = from.unwrap_or(to - Duration::days(DEFAULT_STATS_DAYS - 1));

    if to < from {
        return Err(ApiError::field("to", "End date must not be before start date"));
    }
    if (to - from).num_days() >= MAX_STATS_DAYS {
        return Err(ApiError::field("from", format!("Range cannot exceed {MAX_STATS_DAYS} days")));
    }
    Ok((from, to))
}

pub async fn start_timer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<StartTimerRequest>,
) -> ApiResult<ApiResponse<TimerView>> {
    let task = load_task(&state.db, req.task_id).await?;
    require_task(&state.db, &auth, &task, Access::Read).await?;

    let entry = TimeEntry::start(
        &state.db,
        StartTimer {
            user_id: auth.user_id,
            task_id: task.id,
            project_id: task.project_id,
            description: req.description,
        },
        Utc::now(),
    )
    .await?;

    tracing::info!(entry_id = %entry.id, user_id = %auth.user_id, task_id = %task.id, "Timer started");
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "start_timer",
        "task",
        task.id,
        Some(json!({ "entry_id": entry.id })),
    )
    .await;

    Ok(ApiResponse::created("Timer started", entry.into()))
}

pub async fn pause_timer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<TimerView>> {
    let entry = TimeEntry::apply_to_active(&state.db, auth.user_id, TimerAction::Pause, Utc::now()).await?;

    tracing::debug!(entry_id = %entry.id, user_id = %auth.user_id, "Timer paused");
    Ok(ApiResponse::ok("Timer paused", entry.into()))
}

pub async fn resume_timer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<TimerView>> {
    let entry = TimeEntry::apply_to_active(&state.db, auth.user_id, TimerAction::Resume, Utc::now()).await?;

    tracing::debug!(entry_id = %entry.id, user_id = %auth.user_id, "Timer resumed");
    Ok(ApiResponse::ok("Timer resumed", entry.into()))
}

/// Stop the caller's open timer, or a specific entry when `entry_id` is given
///
/// The body is optional; a body that is present must be valid.
pub async fn stop_timer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    OptionalJson(body): OptionalJson<StopTimerRequest>,
) -> ApiResult<ApiResponse<TimerView>> {
    let req = body.unwrap_or_default();
    let now = Utc::now();

    let entry = match req.entry_id {
        Some(entry_id) => TimeEntry::stop_entry(&state.db, auth.user_id, entry_id, now).await?,
        None => TimeEntry::apply_to_active(&state.db, auth.user_id, TimerAction::Stop, now).await?,
    };

    tracing::info!(
        entry_id = %entry.id,
        user_id = %auth.user_id,
        duration = entry.duration_seconds,
        "Timer stopped"
    );
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "stop_timer",
        "task",
        entry.task_id,
        Some(json!({ "entry_id": entry.id, "duration_seconds": entry.duration_seconds })),
    )
    .await;

    Ok(ApiResponse::ok("Timer stopped", entry.into()))
}

/// The open timer, or `data: null` when idle
pub async fn active_timer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<Option<ActiveTimer>>> {
    let now = Utc::now();
    let active = TimeEntry::find_active(&state.db, auth.user_id).await?.map(|entry| ActiveTimer {
        state: entry.entry.timer_state(),
        elapsed_seconds: entry.entry.elapsed_seconds(now),
        entry,
    });

    let message = if active.is_some() { "Active timer" } else { "No active timer" };
    Ok(ApiResponse::ok(message, active))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<ApiResponse<TimeStats>> {
    let period = parse_query("period", query.period.as_deref(), StatsPeriod::parse)?.unwrap_or_default();
    let now = Utc::now();
    let (from, to) = stats_window(query.from, query.to, now.date_naive())?;
    let user = Some(auth.user_id);

    let by_period = TimeEntry::totals_by_period(&state.db, user, period, from, to).await?;
    let by_task = TimeEntry::totals_by_task(&state.db, user, from, to, TOP_TASKS).await?;
    let total_seconds = TimeEntry::total_seconds(&state.db, user, from, to).await?;
    let active_elapsed_seconds = TimeEntry::find_active(&state.db, auth.user_id)
        .await?
        .map(|active| active.entry.elapsed_seconds(now));

    Ok(ApiResponse::ok(
        "Time tracking statistics",
        TimeStats {
            period,
            from,
            to,
            total_seconds,
            by_period,
            by_task,
            active_elapsed_seconds,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_stats_window_defaults_to_last_30_days() {
        let today = day(2025, 3, 31);
        assert_eq!(stats_window(None, None, today).unwrap(), (day(2025, 3, 2), today));
    }

    #[test]
    fn test_stats_window_rejects_inverted_and_long_ranges() {
        let today = day(2025, 3, 31);
        assert!(stats_window(Some(day(2025, 3, 10)), Some(day(2025, 3, 1)), today).is_err());
        assert!(stats_window(Some(day(2024, 1, 1)), Some(day(2025, 1, 1)), today).is_err());
        assert!(stats_window(Some(day(2024, 1, 1)), Some(day(2024, 12, 31)), today).is_ok());
    }
}
