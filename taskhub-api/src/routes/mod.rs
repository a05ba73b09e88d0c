/// API route handlers, one module per resource
///
/// - `health`: Liveness and diagnostics (public)
/// - `auth`: Register, login, refresh, current user, password
/// - `users`: User administration
/// - `projects`: Projects, members and project tasks
/// - `tasks`: Tasks and task tags
/// - `comments`: Task comments
/// - `attachments`: Task file uploads
/// - `tags`: Tag management
/// - `time_entries`: Time entry history and manual entries
/// - `time_tracking`: Live timer and statistics
/// - `calendar`: Due dates and time entries by day
/// - `dashboard`: Aggregated overview
/// - `notifications`: In-app notifications

pub mod attachments;
pub mod auth;
pub mod calendar;
pub mod comments;
pub mod dashboard;
pub mod health;
pub mod notifications;
pub mod projects;
pub mod tags;
pub mod tasks;
pub mod time_entries;
pub mod time_tracking;
pub mod users;

use sqlx::PgPool;
use taskhub_shared::models::{project::Project, task::Task};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

pub(crate) async fn load_project(db: &PgPool, id: Uuid) -> ApiResult<Project> {
    Project::find_by_id(db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))
}

pub(crate) async fn load_task(db: &PgPool, id: Uuid) -> ApiResult<Task> {
    Task::find_by_id(db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))
}
