/// `GET /api/calendar?start=YYYY-MM-DD&end=YYYY-MM-DD`
///
/// Merges the due dates of visible tasks with the caller's time entries,
/// grouped by day. Days with neither are omitted.

use std::collections::BTreeMap;

use axum::{extract::State, Extension};
use chrono::{Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use taskhub_shared::{
    auth::middleware::AuthContext,
    models::{
        task::Task,
        time_entry::{TimeEntry, TimeEntryFilter, TimeEntryWithTask},
    },
};

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::Query,
    response::ApiResponse,
};

/// Widest range a single request may cover
pub const MAX_RANGE_DAYS: i64 = 366;

/// Cap on time entries returned for one range; `truncated` reports overflow
pub const MAX_ENTRIES: usize = 5000;

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub tasks_due: Vec<Task>,
    pub time_entries: Vec<TimeEntryWithTask>,
    pub tracked_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct CalendarView {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: Vec<CalendarDay>,
    /// More than `MAX_ENTRIES` entries fell in the range; narrow it to see all
    pub truncated: bool,
}

/// Last day of the month containing `date`
fn month_end(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first
        .checked_add_months(Months::new(1))
        .map(|next| next - Duration::days(1))
        .unwrap_or(first)
}

/// Defaults to the current month; rejects inverted or oversized ranges
///
/// A missing `end` is the last day of `start`'s month.
fn resolve_range(query: &CalendarQuery, today: NaiveDate) -> ApiResult<(NaiveDate, NaiveDate)> {
    let start = query.start.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
    let end = query.end.unwrap_or_else(|| month_end(start));

    if end < start {
        return Err(ApiError::field("end", "End date must not be before start date"));
    }
    if (end - start).num_days() >= MAX_RANGE_DAYS {
        return Err(ApiError::field("end", format!("Range cannot exceed {MAX_RANGE_DAYS} days")));
    }
    Ok((start, end))
}

fn day_cell(days: &mut BTreeMap<NaiveDate, CalendarDay>, date: NaiveDate) -> &mut CalendarDay {
    days.entry(date).or_insert_with(|| CalendarDay {
        date,
        tasks_due: Vec::new(),
        time_entries: Vec::new(),
        tracked_seconds: 0,
    })
}

/// Drops entries past the cap, reporting whether any were dropped
fn cap_entries(mut entries: Vec<TimeEntryWithTask>) -> (Vec<TimeEntryWithTask>, bool) {
    let truncated = entries.len() > MAX_ENTRIES;
    entries.truncate(MAX_ENTRIES);
    (entries, truncated)
}

fn group_by_day(tasks: Vec<Task>, entries: Vec<TimeEntryWithTask>) -> Vec<CalendarDay> {
    let mut days = BTreeMap::new();

    for task in tasks {
        if let Some(due) = task.due_date {
            day_cell(&mut days, due).tasks_due.push(task);
        }
    }
    for entry in entries {
        let cell = day_cell(&mut days, entry.entry.start_time.date_naive());
        cell.tracked_seconds += i64::from(entry.entry.duration_seconds.unwrap_or(0));
        cell.time_entries.push(entry);
    }

    days.into_values().collect()
}

pub async fn calendar(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<ApiResponse<CalendarView>> {
    let (start, end) = resolve_range(&query, Utc::now().date_naive())?;

    let tasks = Task::due_between(&state.db, auth.visibility_scope(), start, end).await?;
    let entries = TimeEntry::list(
        &state.db,
        &TimeEntryFilter {
            user_id: Some(auth.user_id),
            from: Some(start),
            to: Some(end),
            ..Default::default()
        },
        // One extra row tells a full range from a truncated one
        MAX_ENTRIES as i64 + 1,
        0,
    )
    .await?;
    let (entries, truncated) = cap_entries(entries);

    Ok(ApiResponse::ok(
        "Calendar",
        CalendarView {
            start,
            end,
            days: group_by_day(tasks, entries),
            truncated,
        },
    ))
}
