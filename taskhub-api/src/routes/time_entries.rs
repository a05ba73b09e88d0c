/// Time entry endpoints
///
/// - `GET    /api/time` - The caller's entries (managers may pass `user_id`)
/// - `POST   /api/time` - Record a manual entry
/// - `PUT    /api/time/:id` - Edit a closed entry
/// - `DELETE /api/time/:id` - Delete a closed entry
///
/// Running and paused timers are driven through `/api/time-tracking`; the
/// edit and delete endpoints here answer 409 for them.

use axum::{extract::State, Extension};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use taskhub_shared::{
    auth::{
        authorization::{require_task, Access},
        middleware::AuthContext,
    },
    models::{
        activity_log::ActivityLog,
        double_option,
        time_entry::{
            start_of_day, CreateManualEntry, TimeEntry, TimeEntryFilter, TimeEntryWithTask, UpdateTimeEntry,
        },
    },
};
use uuid::Uuid;
use validator::Validate;

use super::load_task;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{PageQuery, Path, Query, ValidatedJson},
    response::ApiResponse,
};

#[derive(Debug, Default, Deserialize)]
pub struct TimeListQuery {
    pub user_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ManualEntryRequest {
    pub task_id: Uuid,

    /// Day the work happened; the entry starts at 00:00 UTC
    pub date: Option<NaiveDate>,

    /// Exact start, takes precedence over `date`
    pub start_time: Option<DateTime<Utc>>,

    #[validate(range(min = 1, max = 86400, message = "Duration must be between 1 and 86400 seconds"))]
    pub duration_seconds: i32,

    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEntryRequest {
    pub task_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<DateTime<Utc>>,

    #[validate(range(min = 1, max = 86400, message = "Duration must be between 1 and 86400 seconds"))]
    pub duration_seconds: Option<i32>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: Option<Option<String>>,
}

fn entry_start(date: Option<NaiveDate>, start_time: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    start_time.or_else(|| date.map(start_of_day))
}

pub async fn list_entries(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageQuery>,
    Query(query): Query<TimeListQuery>,
) -> ApiResult<ApiResponse<Vec<TimeEntryWithTask>>> {
    let user_id = match query.user_id {
        Some(other) if other != auth.user_id && !auth.can_view_all() => {
            return Err(ApiError::Forbidden("You can only view your own time entries".to_string()));
        }
        Some(other) => other,
        None => auth.user_id,
    };
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if to < from {
            return Err(ApiError::field("to", "End date must not be before start date"));
        }
    }

    let filter = TimeEntryFilter {
        user_id: Some(user_id),
        task_id: query.task_id,
        project_id: query.project_id,
        from: query.from,
        to: query.to,
    };
    let page = page.resolve(&state.limits());

    let entries = TimeEntry::list(&state.db, &filter, page.limit(), page.offset()).await?;
    let total = TimeEntry::count(&state.db, &filter).await?;

    Ok(ApiResponse::paginated("Time entries", entries, page.meta(total)))
}

/// Record time without a timer
///
/// # Errors
///
/// - `403`/`404`: The task is not visible to the caller
/// - `422`: Missing date, or duration outside 1..=86400 seconds
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<ManualEntryRequest>,
) -> ApiResult<ApiResponse<TimeEntry>> {
    let start_time = entry_start(req.date, req.start_time)
        .ok_or_else(|| ApiError::field("date", "A date or start_time is required"))?;

    let task = load_task(&state.db, req.task_id).await?;
    require_task(&state.db, &auth, &task, Access::Read).await?;

    let entry = TimeEntry::create_manual(
        &state.db,
        CreateManualEntry {
            user_id: auth.user_id,
            task_id: task.id,
            project_id: task.project_id,
            description: req.description,
            start_time,
            duration_seconds: req.duration_seconds,
        },
    )
    .await?;

    tracing::info!(
        entry_id = %entry.id,
        user_id = %auth.user_id,
        task_id = %task.id,
        duration = entry.duration_seconds,
        "Manual time entry recorded"
    );
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "log_time",
        "task",
        task.id,
        Some(json!({ "entry_id": entry.id, "duration_seconds": entry.duration_seconds })),
    )
    .await;

    Ok(ApiResponse::created("Time entry created", entry))
}

async fn load_owned_entry(state: &AppState, auth: &AuthContext, id: Uuid) -> ApiResult<TimeEntry> {
    let entry = TimeEntry::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Time entry not found".to_string()))?;

    if entry.user_id != auth.user_id && !auth.is_admin() {
        return Err(ApiError::Forbidden("You can only modify your own time entries".to_string()));
    }
    Ok(entry)
}

pub async fn update_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateEntryRequest>,
) -> ApiResult<ApiResponse<TimeEntry>> {
    load_owned_entry(&state, &auth, id).await?;

    let mut update = UpdateTimeEntry {
        start_time: entry_start(req.date, req.start_time),
        duration_seconds: req.duration_seconds,
        description: req.description,
        ..Default::default()
    };

    // Moving the entry to another task carries that task's project
    if let Some(task_id) = req.task_id {
        let task = load_task(&state.db, task_id).await?;
        require_task(&state.db, &auth, &task, Access::Read).await?;
        update.task_id = Some(task.id);
        update.project_id = Some(task.project_id);
    }

    let entry = TimeEntry::update_closed(&state.db, id, update).await?;

    ActivityLog::record(&state.db, auth.user_id, "update", "time_entry", id, None).await;
    Ok(ApiResponse::ok("Time entry updated", entry))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    let entry = load_owned_entry(&state, &auth, id).await?;

    TimeEntry::delete_closed(&state.db, id).await?;

    ActivityLog::record(
        &state.db,
        auth.user_id,
        "delete",
        "time_entry",
        id,
        Some(json!({ "task_id": entry.task_id })),
    )
    .await;

    Ok(ApiResponse::message("Time entry deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_time_wins_over_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let explicit = DateTime::parse_from_rfc3339("2025-03-09T14:30:00Z").unwrap().with_timezone(&Utc);

        assert_eq!(entry_start(Some(date), Some(explicit)), Some(explicit));
        assert_eq!(
            entry_start(Some(date), None).unwrap().to_rfc3339(),
            "2025-03-10T00:00:00+00:00"
        );
        assert_eq!(entry_start(None, None), None);
    }

    #[test]
    fn test_duration_bounds() {
        let task_id = Uuid::new_v4();
        for (duration, ok) in [(0, false), (1, true), (86_400, true), (86_401, false)] {
            let req: ManualEntryRequest = serde_json::from_value(json!({
                "task_id": task_id,
                "date": "2025-03-10",
                "duration_seconds": duration,
            }))
            .unwrap();
            assert_eq!(req.validate().is_ok(), ok, "duration {duration}");
        }
    }
}
