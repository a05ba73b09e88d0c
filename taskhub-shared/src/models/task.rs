/// Task model and database operations
///
/// # Status
///
/// ```text
/// pending ⇄ in_progress → completed
///      ↘         ↘            ↘
///     cancelled / archived (any status may move to any other)
/// ```
///
/// Status changes are unrestricted, with one side effect: entering
/// `completed` stamps `completed_at` and sets progress to 100, leaving it
/// clears `completed_at`.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE task_status AS ENUM ('pending', 'in_progress', 'completed', 'archived', 'cancelled');
///
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     title VARCHAR(255) NOT NULL,
///     description TEXT,
///     status task_status NOT NULL DEFAULT 'pending',
///     priority priority_level NOT NULL DEFAULT 'medium',
///     project_id UUID REFERENCES projects(id) ON DELETE CASCADE,
///     assignee_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     created_by UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     due_date DATE,
///     start_date DATE,
///     progress SMALLINT NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
///     estimated_hours DOUBLE PRECISION,
///     completed_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use taskhub_shared::models::task::{CreateTask, Task, TaskFilter, TaskStatus};
/// use taskhub_shared::models::Priority;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, user_id: Uuid) -> Result<(), sqlx::Error> {
/// let task = Task::create(&pool, CreateTask {
///     title: "Write release notes".to_string(),
///     description: None,
///     status: TaskStatus::Pending,
///     priority: Priority::High,
///     project_id: None,
///     assignee_id: Some(user_id),
///     created_by: user_id,
///     due_date: None,
///     start_date: None,
///     progress: 0,
///     estimated_hours: Some(2.5),
/// })
/// .await?;
///
/// let filter = TaskFilter { overdue: true, ..Default::default() };
/// let overdue = Task::list(&pool, &filter, 20, 0).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    attachment::{Attachment, AttachmentOwner},
    LabelCount, Priority,
};

/// Task workflow status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started yet
    Pending,

    /// Being worked on
    InProgress,

    /// Done; `completed_at` is set
    Completed,

    /// Kept for reference, hidden from active views
    Archived,

    /// Abandoned
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Archived,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Archived => "archived",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// Open tasks count toward "overdue" once their due date passes
    pub fn is_open(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::InProgress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub project_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub created_by: Uuid,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    /// Percent complete, 0-100
    pub progress: i16,
    pub estimated_hours: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Open and past its due date as of `today`
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status.is_open() && self.due_date.is_some_and(|due| due < today)
    }
}

/// Task row joined with display names, as returned by list endpoints
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TaskListItem {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub task: Task,
    pub project_name: Option<String>,
    pub assignee_username: Option<String>,
    /// Sum of closed time entries on this task
    pub tracked_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct CreateTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub project_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub created_by: Uuid,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub progress: i16,
    pub estimated_hours: Option<f64>,
}

/// Partial update; nested options clear nullable columns with `Some(None)`
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub project_id: Option<Option<Uuid>>,
    pub assignee_id: Option<Option<Uuid>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub start_date: Option<Option<NaiveDate>>,
    pub progress: Option<i16>,
    pub estimated_hours: Option<Option<f64>>,
}

/// Filters for [`Task::list`] and [`Task::count`]
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Restrict to tasks this user can see; `None` for managers and admins
    pub visible_to: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub project_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    /// Case-insensitive match on title or description
    pub search: Option<String>,
    /// Only open tasks whose due date has passed
    pub overdue: bool,
}

/// Task counts per status for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskStatusCounts {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub archived: i64,
    pub cancelled: i64,
    pub overdue: i64,
}

impl TaskStatusCounts {
    fn from_rows(rows: &[LabelCount], overdue: i64) -> Self {
        let mut counts = TaskStatusCounts {
            overdue,
            ..Default::default()
        };

        for row in rows {
            match TaskStatus::parse(&row.label) {
                Some(TaskStatus::Pending) => counts.pending = row.count,
                Some(TaskStatus::InProgress) => counts.in_progress = row.count,
                Some(TaskStatus::Completed) => counts.completed = row.count,
                Some(TaskStatus::Archived) => counts.archived = row.count,
                Some(TaskStatus::Cancelled) => counts.cancelled = row.count,
                None => continue,
            }
            counts.total += row.count;
        }

        counts
    }

    /// Completed share of non-archived, non-cancelled tasks, in percent
    pub fn completion_rate(&self) -> f64 {
        let active = self.pending + self.in_progress + self.completed;
        if active == 0 {
            0.0
        } else {
            (self.completed as f64 * 100.0 / active as f64 * 10.0).round() / 10.0
        }
    }
}

const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.status, t.priority, t.project_id, \
                            t.assignee_id, t.created_by, t.due_date, t.start_date, t.progress, \
                            t.estimated_hours, t.completed_at, t.created_at, t.updated_at";

const OPEN_AND_PAST_DUE: &str =
    "t.due_date < CURRENT_DATE AND t.status IN ('pending', 'in_progress')";

impl Task {
    /// Inserts a task; a `completed` status stamps `completed_at` and full progress
    pub async fn create(pool: &PgPool, data: CreateTask) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO tasks AS t (title, description, status, priority, project_id, assignee_id,
                                    created_by, due_date, start_date, progress, estimated_hours, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                    CASE WHEN $3 = 'completed'::task_status THEN 100 ELSE $10 END,
                    $11,
                    CASE WHEN $3 = 'completed'::task_status THEN NOW() ELSE NULL END)
            RETURNING {TASK_COLUMNS}
            "#
        );

        sqlx::query_as::<_, Task>(&query)
            .bind(data.title)
            .bind(data.description)
            .bind(data.status)
            .bind(data.priority)
            .bind(data.project_id)
            .bind(data.assignee_id)
            .bind(data.created_by)
            .bind(data.due_date)
            .bind(data.start_date)
            .bind(data.progress)
            .bind(data.estimated_hours)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = $1");

        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Applies a partial update
    ///
    /// Moving into `completed` keeps an existing `completed_at` and forces
    /// progress to 100; any other status clears `completed_at`.
    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateTask) -> Result<Option<Self>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE tasks AS t SET updated_at = NOW()");

        if let Some(title) = data.title {
            qb.push(", title = ").push_bind(title);
        }
        if let Some(description) = data.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(priority) = data.priority {
            qb.push(", priority = ").push_bind(priority);
        }
        if let Some(project_id) = data.project_id {
            qb.push(", project_id = ").push_bind(project_id);
        }
        if let Some(assignee_id) = data.assignee_id {
            qb.push(", assignee_id = ").push_bind(assignee_id);
        }
        if let Some(due_date) = data.due_date {
            qb.push(", due_date = ").push_bind(due_date);
        }
        if let Some(start_date) = data.start_date {
            qb.push(", start_date = ").push_bind(start_date);
        }
        if let Some(estimated_hours) = data.estimated_hours {
            qb.push(", estimated_hours = ").push_bind(estimated_hours);
        }

        match data.status {
            Some(TaskStatus::Completed) => {
                qb.push(", status = 'completed', progress = 100, completed_at = COALESCE(t.completed_at, NOW())");
            }
            Some(status) => {
                qb.push(", status = ").push_bind(status).push(", completed_at = NULL");
                if let Some(progress) = data.progress {
                    qb.push(", progress = ").push_bind(progress);
                }
            }
            None => {
                if let Some(progress) = data.progress {
                    qb.push(", progress = CASE WHEN t.status = 'completed' THEN 100 ELSE ")
                        .push_bind(progress)
                        .push(" END");
                }
            }
        }

        qb.push(" WHERE t.id = ").push_bind(id);
        qb.push(format!(" RETURNING {TASK_COLUMNS}"));

        qb.build_query_as::<Task>().fetch_optional(pool).await
    }

    /// Deletes a task and returns the attachments removed with it
    ///
    /// `None` when the task does not exist. The caller removes the files.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<Vec<Attachment>>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM tasks WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let attachments = Attachment::delete_owned(&mut tx, AttachmentOwner::Task(id)).await?;
        sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(attachments))
    }

    /// Lists tasks matching `filter`
    ///
    /// Ordered by due date (undated last), then newest first.
    pub async fn list(
        pool: &PgPool,
        filter: &TaskFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TaskListItem>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"
            SELECT {TASK_COLUMNS},
                   p.name AS project_name,
                   u.username AS assignee_username,
                   COALESCE((SELECT SUM(e.duration_seconds) FROM time_entries e
                             WHERE e.task_id = t.id AND e.end_time IS NOT NULL), 0)::BIGINT AS tracked_seconds
            FROM tasks t
            LEFT JOIN projects p ON p.id = t.project_id
            LEFT JOIN users u ON u.id = t.assignee_id
            WHERE TRUE
            "#
        ));
        push_task_filter(&mut qb, filter);
        qb.push(" ORDER BY t.due_date ASC NULLS LAST, t.created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<TaskListItem>().fetch_all(pool).await
    }

    pub async fn count(pool: &PgPool, filter: &TaskFilter) -> Result<i64, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM tasks t WHERE TRUE");
        push_task_filter(&mut qb, filter);

        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }

    /// Per-status counts plus the overdue count, scoped like [`TaskFilter::visible_to`]
    pub async fn status_counts(
        pool: &PgPool,
        visible_to: Option<Uuid>,
    ) -> Result<TaskStatusCounts, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT t.status::text AS label, COUNT(*) AS count FROM tasks t WHERE TRUE");
        if let Some(user_id) = visible_to {
            push_task_visibility(&mut qb, user_id);
        }
        qb.push(" GROUP BY t.status");
        let rows = qb.build_query_as::<LabelCount>().fetch_all(pool).await?;

        let overdue = Self::count(
            pool,
            &TaskFilter {
                visible_to,
                overdue: true,
                ..Default::default()
            },
        )
        .await?;

        Ok(TaskStatusCounts::from_rows(&rows, overdue))
    }

    /// Tasks due within `[start, end]`, for the calendar
    pub async fn due_between(
        pool: &PgPool,
        visible_to: Option<Uuid>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks t WHERE t.due_date BETWEEN "
        ));
        qb.push_bind(start).push(" AND ").push_bind(end);
        if let Some(user_id) = visible_to {
            push_task_visibility(&mut qb, user_id);
        }
        qb.push(" ORDER BY t.due_date ASC, t.priority DESC");

        qb.build_query_as::<Task>().fetch_all(pool).await
    }

    /// Open tasks due in the next `days` days (including today)
    pub async fn upcoming(
        pool: &PgPool,
        visible_to: Option<Uuid>,
        days: i32,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {TASK_COLUMNS} FROM tasks t \
             WHERE t.status IN ('pending', 'in_progress') \
             AND t.due_date >= CURRENT_DATE AND t.due_date <= CURRENT_DATE + "
        ));
        qb.push_bind(days);
        if let Some(user_id) = visible_to {
            push_task_visibility(&mut qb, user_id);
        }
        qb.push(" ORDER BY t.due_date ASC, t.priority DESC LIMIT ").push_bind(limit);

        qb.build_query_as::<Task>().fetch_all(pool).await
    }
}

/// Appends the "tasks this user may see" predicate
///
/// A user sees tasks they created or are assigned to, tasks in projects they
/// belong to, and tasks in public projects.
pub(crate) fn push_task_visibility(qb: &mut QueryBuilder<'_, Postgres>, user_id: Uuid) {
    qb.push(" AND (t.created_by = ")
        .push_bind(user_id)
        .push(" OR t.assignee_id = ")
        .push_bind(user_id)
        .push(" OR EXISTS (SELECT 1 FROM project_members m WHERE m.project_id = t.project_id AND m.user_id = ")
        .push_bind(user_id)
        .push(") OR EXISTS (SELECT 1 FROM projects vp WHERE vp.id = t.project_id AND vp.is_public))");
}

fn push_task_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &TaskFilter) {
    if let Some(user_id) = filter.visible_to {
        push_task_visibility(qb, user_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND t.status = ").push_bind(status);
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND t.priority = ").push_bind(priority);
    }
    if let Some(project_id) = filter.project_id {
        qb.push(" AND t.project_id = ").push_bind(project_id);
    }
    if let Some(assignee_id) = filter.assignee_id {
        qb.push(" AND t.assignee_id = ").push_bind(assignee_id);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        qb.push(" AND (t.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR t.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if filter.overdue {
        qb.push(" AND ").push(OPEN_AND_PAST_DUE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(status: TaskStatus, due: Option<NaiveDate>) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: "Ship it".to_string(),
            description: None,
            status,
            priority: Priority::Medium,
            project_id: None,
            assignee_id: None,
            created_by: Uuid::new_v4(),
            due_date: due,
            start_date: None,
            progress: 0,
            estimated_hours: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_task_status_wire_names() {
        assert_eq!(TaskStatus::parse("in_progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("done"), None);
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            serde_json::json!("in_progress")
        );
    }

    #[test]
    fn test_is_overdue() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();

        assert!(sample_task(TaskStatus::Pending, Some(yesterday)).is_overdue(today));
        assert!(!sample_task(TaskStatus::Pending, Some(today)).is_overdue(today));
        assert!(!sample_task(TaskStatus::Completed, Some(yesterday)).is_overdue(today));
        assert!(!sample_task(TaskStatus::InProgress, None).is_overdue(today));
    }

    #[test]
    fn test_status_counts_from_rows() {
        let rows = vec![
            LabelCount { label: "pending".to_string(), count: 3 },
            LabelCount { label: "completed".to_string(), count: 1 },
            LabelCount { label: "archived".to_string(), count: 2 },
        ];

        let counts = TaskStatusCounts::from_rows(&rows, 1);
        assert_eq!(counts.total, 6);
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.in_progress, 0);
        assert_eq!(counts.overdue, 1);
        assert_eq!(counts.completion_rate(), 25.0);
    }

    #[test]
    fn test_completion_rate_without_tasks() {
        assert_eq!(TaskStatusCounts::default().completion_rate(), 0.0);
    }
}
