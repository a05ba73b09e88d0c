/// `GET /api/dashboard`
///
/// One call for the landing page: task counters, upcoming deadlines, the
/// caller's tracked time, recent activity and unread notifications.
/// Managers and admins get workspace-wide task counts and activity.

use axum::{extract::State, Extension};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use taskhub_shared::{
    auth::middleware::AuthContext,
    models::{
        activity_log::{ActivityLog, ActivityWithUser},
        notification::Notification,
        task::{Task, TaskStatusCounts},
        time_entry::TimeEntry,
    },
};

use crate::{app::AppState, error::ApiResult, response::ApiResponse};

const UPCOMING_DAYS: i32 = 7;
const UPCOMING_LIMIT: i64 = 10;
const ACTIVITY_LIMIT: i64 = 15;

#[derive(Debug, Serialize)]
pub struct TaskSummary {
    #[serde(flatten)]
    pub counts: TaskStatusCounts,
    pub completion_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct TimeSummary {
    pub today_seconds: i64,
    pub week_seconds: i64,
    pub month_seconds: i64,
    pub active_elapsed_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub tasks: TaskSummary,
    pub upcoming_tasks: Vec<Task>,
    pub time: TimeSummary,
    pub recent_activity: Vec<ActivityWithUser>,
    pub unread_notifications: i64,
}

/// Monday of the ISO week containing `date`
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<Dashboard>> {
    let now = Utc::now();
    let today = now.date_naive();
    let scope = auth.visibility_scope();
    let me = Some(auth.user_id);

    let counts = Task::status_counts(&state.db, scope).await?;
    let upcoming_tasks = Task::upcoming(&state.db, scope, UPCOMING_DAYS, UPCOMING_LIMIT).await?;

    let time = TimeSummary {
        today_seconds: TimeEntry::total_seconds(&state.db, me, today, today).await?,
        week_seconds: TimeEntry::total_seconds(&state.db, me, week_start(today), today).await?,
        month_seconds: TimeEntry::total_seconds(&state.db, me, month_start(today), today).await?,
        active_elapsed_seconds: TimeEntry::find_active(&state.db, auth.user_id)
            .await?
            .map(|active| active.entry.elapsed_seconds(now)),
    };

    let recent_activity = ActivityLog::recent(&state.db, scope, ACTIVITY_LIMIT).await?;
    let unread_notifications = Notification::count_for_user(&state.db, auth.user_id, true).await?;

    Ok(ApiResponse::ok(
        "Dashboard",
        Dashboard {
            tasks: TaskSummary {
                completion_rate: counts.completion_rate(),
                counts,
            },
            upcoming_tasks,
            time,
            recent_activity,
            unread_notifications,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_and_month_start() {
        // 2025-03-13 is a Thursday
        let date = NaiveDate::from_ymd_opt(2025, 3, 13).unwrap();
        assert_eq!(week_start(date), NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());
        assert_eq!(month_start(date), NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());

        let monday = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(week_start(monday), monday);
    }
}
