/// Task endpoints
///
/// # Endpoints
///
/// - `GET    /api/tasks` - Filterable, paginated list of visible tasks
/// - `POST   /api/tasks` - Create
/// - `GET    /api/tasks/:id` - Task with its tags
/// - `PUT    /api/tasks/:id` - Partial update
/// - `DELETE /api/tasks/:id` - Delete (creator, project manager or admin)
/// - `GET    /api/tasks/:id/tags` - Tags on the task
/// - `POST   /api/tasks/:id/tags/:tag_id` - Attach a tag
/// - `DELETE /api/tasks/:id/tags/:tag_id` - Detach a tag
///
/// # Status side effects
///
/// Moving a task to `completed` stamps `completed_at` and sets progress to
/// 100. Moving it out of `completed` clears `completed_at`.

use axum::{extract::State, Extension};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use taskhub_shared::{
    auth::{
        authorization::{require_project, require_task, Access},
        middleware::AuthContext,
    },
    models::{
        activity_log::ActivityLog,
        double_option,
        notification::NotificationKind,
        project::Project,
        tag::{Tag, TagScope},
        task::{CreateTask, Task, TaskFilter, TaskListItem, TaskStatus, UpdateTask},
        user::User,
        Priority,
    },
};
use uuid::Uuid;
use validator::Validate;

use super::{load_task, notifications::notify};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{PageQuery, Path, Query, ValidatedJson},
    response::ApiResponse,
    upload,
    validation::{self, checked, date_order, parse_query},
};

#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub project_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub search: Option<String>,
    #[serde(default)]
    pub overdue: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,

    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: Option<String>,

    #[validate(custom(function = "validation::task_status"))]
    pub status: Option<String>,

    #[validate(custom(function = "validation::priority"))]
    pub priority: Option<String>,

    pub project_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,

    #[validate(range(min = 0, max = 100, message = "Progress must be between 0 and 100"))]
    pub progress: Option<i16>,

    #[validate(range(min = 0.0, max = 10000.0, message = "Estimated hours must be between 0 and 10000"))]
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 10000, message = "Description must be at most 10000 characters"))]
    pub description: Option<Option<String>>,

    #[validate(custom(function = "validation::task_status"))]
    pub status: Option<String>,

    #[validate(custom(function = "validation::priority"))]
    pub priority: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub project_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,

    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<NaiveDate>>,

    #[validate(range(min = 0, max = 100, message = "Progress must be between 0 and 100"))]
    pub progress: Option<i16>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(range(min = 0.0, max = 10000.0, message = "Estimated hours must be between 0 and 10000"))]
    pub estimated_hours: Option<Option<f64>>,
}

#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub tags: Vec<Tag>,
}

/// The assignee must be an existing, active account
async fn check_assignee(db: &PgPool, assignee_id: Uuid) -> ApiResult<User> {
    User::find_by_id(db, assignee_id)
        .await?
        .filter(User::is_active)
        .ok_or_else(|| ApiError::field("assignee_id", "Assignee does not exist or is inactive"))
}

/// Creating or moving a task into a project needs write access to it
async fn check_project_write(state: &AppState, auth: &AuthContext, project_id: Uuid) -> ApiResult<()> {
    let project = Project::find_by_id(&state.db, project_id)
        .await?
        .ok_or_else(|| ApiError::field("project_id", "Project does not exist"))?;
    require_project(&state.db, auth, &project, Access::Write).await?;
    Ok(())
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageQuery>,
    Query(query): Query<TaskListQuery>,
) -> ApiResult<ApiResponse<Vec<TaskListItem>>> {
    let filter = TaskFilter {
        visible_to: auth.visibility_scope(),
        status: parse_query("status", query.status.as_deref(), TaskStatus::parse)?,
        priority: parse_query("priority", query.priority.as_deref(), Priority::parse)?,
        project_id: query.project_id,
        assignee_id: query.assignee_id,
        search: query.search,
        overdue: query.overdue,
    };
    let page = page.resolve(&state.limits());

    let tasks = Task::list(&state.db, &filter, page.limit(), page.offset()).await?;
    let total = Task::count(&state.db, &filter).await?;

    Ok(ApiResponse::paginated("Tasks", tasks, page.meta(total)))
}

/// Create a task
///
/// # Errors
///
/// - `422`: Invalid field values (status, priority, progress, dates)
/// - `403`: No write access to the target project
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<CreateTaskRequest>,
) -> ApiResult<ApiResponse<Task>> {
    let status = match req.status.as_deref() {
        Some(s) => checked("status", s, TaskStatus::parse)?,
        None => TaskStatus::Pending,
    };
    let priority = match req.priority.as_deref() {
        Some(p) => checked("priority", p, Priority::parse)?,
        None => Priority::default(),
    };
    date_order(req.start_date, req.due_date)?;

    if let Some(project_id) = req.project_id {
        check_project_write(&state, &auth, project_id).await?;
    }
    if let Some(assignee_id) = req.assignee_id {
        check_assignee(&state.db, assignee_id).await?;
    }

    let task = Task::create(
        &state.db,
        CreateTask {
            title: req.title.trim().to_string(),
            description: req.description,
            status,
            priority,
            project_id: req.project_id,
            assignee_id: req.assignee_id,
            created_by: auth.user_id,
            due_date: req.due_date,
            start_date: req.start_date,
            progress: req.progress.unwrap_or(0),
            estimated_hours: req.estimated_hours,
        },
    )
    .await?;

    tracing::info!(task_id = %task.id, user_id = %auth.user_id, "Task created");
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "create",
        "task",
        task.id,
        Some(json!({ "title": task.title })),
    )
    .await;

    if let Some(assignee_id) = task.assignee_id {
        notify(
            &state.db,
            auth.user_id,
            assignee_id,
            NotificationKind::TaskAssigned,
            "New task assigned",
            format!("{} assigned you '{}'", auth.username, task.title),
            Some(task.id),
        )
        .await;
    }

    Ok(ApiResponse::created("Task created", task))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<TaskDetail>> {
    let task = load_task(&state.db, id).await?;
    require_task(&state.db, &auth, &task, Access::Read).await?;

    let tags = Tag::list_for_task(&state.db, task.id).await?;
    Ok(ApiResponse::ok("Task", TaskDetail { task, tags }))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateTaskRequest>,
) -> ApiResult<ApiResponse<Task>> {
    let status = req.status.as_deref().map(|s| checked("status", s, TaskStatus::parse)).transpose()?;
    let priority = req.priority.as_deref().map(|p| checked("priority", p, Priority::parse)).transpose()?;

    let task = load_task(&state.db, id).await?;
    require_task(&state.db, &auth, &task, Access::Write).await?;

    date_order(
        req.start_date.unwrap_or(task.start_date),
        req.due_date.unwrap_or(task.due_date),
    )?;

    if let Some(Some(project_id)) = req.project_id {
        if task.project_id != Some(project_id) {
            check_project_write(&state, &auth, project_id).await?;
        }
    }
    if let Some(Some(assignee_id)) = req.assignee_id {
        check_assignee(&state.db, assignee_id).await?;
    }

    let update = UpdateTask {
        title: req.title.map(|t| t.trim().to_string()),
        description: req.description,
        status,
        priority,
        project_id: req.project_id,
        assignee_id: req.assignee_id,
        due_date: req.due_date,
        start_date: req.start_date,
        progress: req.progress,
        estimated_hours: req.estimated_hours,
    };

    let updated = Task::update(&state.db, id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    ActivityLog::record(
        &state.db,
        auth.user_id,
        "update",
        "task",
        id,
        Some(json!({ "from_status": task.status, "to_status": updated.status })),
    )
    .await;

    let reassigned = updated.assignee_id.filter(|a| task.assignee_id != Some(*a));
    if let Some(assignee_id) = reassigned {
        notify(
            &state.db,
            auth.user_id,
            assignee_id,
            NotificationKind::TaskAssigned,
            "Task assigned",
            format!("{} assigned you '{}'", auth.username, updated.title),
            Some(id),
        )
        .await;
    } else if updated.status != task.status {
        // Tell the other party: the assignee, or the creator when the assignee moved it
        let watcher = match updated.assignee_id {
            Some(assignee_id) if assignee_id != auth.user_id => assignee_id,
            _ => updated.created_by,
        };
        notify(
            &state.db,
            auth.user_id,
            watcher,
            NotificationKind::TaskUpdated,
            "Task status changed",
            format!("'{}' is now {}", updated.title, updated.status.as_str()),
            Some(id),
        )
        .await;
    }

    Ok(ApiResponse::ok("Task updated", updated))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    let task = load_task(&state.db, id).await?;
    require_task(&state.db, &auth, &task, Access::Manage).await?;

    let attachments = Task::delete(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    upload::remove_all(&state.config.upload, &attachments).await;

    tracing::info!(task_id = %id, user_id = %auth.user_id, "Task deleted");
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "delete",
        "task",
        id,
        Some(json!({ "title": task.title })),
    )
    .await;

    Ok(ApiResponse::message("Task deleted"))
}

pub async fn list_task_tags(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<Vec<Tag>>> {
    let task = load_task(&state.db, id).await?;
    require_task(&state.db, &auth, &task, Access::Read).await?;

    let tags = Tag::list_for_task(&state.db, id).await?;
    Ok(ApiResponse::ok("Task tags", tags))
}

/// Whether `tag` may be put on `task`
///
/// Global tags fit anywhere, project tags only on tasks of that project,
/// personal tags only for their creator.
fn tag_fits(tag: &Tag, task: &Task, auth: &AuthContext) -> bool {
    match tag.scope() {
        TagScope::Global => true,
        TagScope::Project(project_id) => task.project_id == Some(project_id),
        TagScope::Personal => tag.created_by == Some(auth.user_id) || auth.is_admin(),
    }
}

pub async fn attach_tag(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, tag_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<Vec<Tag>>> {
    let task = load_task(&state.db, id).await?;
    require_task(&state.db, &auth, &task, Access::Write).await?;

    let tag = Tag::find_by_id(&state.db, tag_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Tag not found".to_string()))?;

    if !tag_fits(&tag, &task, &auth) {
        return Err(ApiError::Forbidden("This tag cannot be used on this task".to_string()));
    }

    let attached = Tag::attach(&state.db, id, tag_id).await?;
    let tags = Tag::list_for_task(&state.db, id).await?;

    if attached {
        Ok(ApiResponse::created("Tag attached", tags))
    } else {
        Ok(ApiResponse::ok("Tag already attached", tags))
    }
}

pub async fn detach_tag(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, tag_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<()>> {
    let task = load_task(&state.db, id).await?;
    require_task(&state.db, &auth, &task, Access::Write).await?;

    if !Tag::detach(&state.db, id, tag_id).await? {
        return Err(ApiError::NotFound("Tag is not attached to this task".to_string()));
    }

    Ok(ApiResponse::message("Tag detached"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskhub_shared::models::user::UserRole;

    fn auth() -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            role: UserRole::User,
        }
    }

    fn task(project_id: Option<Uuid>) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: "Write docs".to_string(),
            description: None,
            status: TaskStatus::Pending,
            priority: Priority::Low,
            project_id,
            assignee_id: None,
            created_by: Uuid::new_v4(),
            due_date: None,
            start_date: None,
            progress: 0,
            estimated_hours: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn tag(is_global: bool, project_id: Option<Uuid>, created_by: Option<Uuid>) -> Tag {
        Tag {
            id: Uuid::new_v4(),
            name: "docs".to_string(),
            color: "#00FF00".to_string(),
            project_id,
            is_global,
            created_by,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_tag_fits() {
        let me = auth();
        let project_id = Uuid::new_v4();

        assert!(tag_fits(&tag(true, None, None), &task(None), &me));
        assert!(tag_fits(&tag(false, Some(project_id), None), &task(Some(project_id)), &me));
        assert!(!tag_fits(&tag(false, Some(project_id), None), &task(None), &me));
        assert!(tag_fits(&tag(false, None, Some(me.user_id)), &task(None), &me));
        assert!(!tag_fits(&tag(false, None, Some(Uuid::new_v4())), &task(None), &me));
    }

    #[test]
    fn test_create_request_rejects_bad_enums() {
        let req: CreateTaskRequest =
            serde_json::from_str(r#"{"title": "x", "status": "done", "priority": "critical"}"#).unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();

        assert!(fields.contains_key("status"));
        assert!(fields.contains_key("priority"));
    }

    #[test]
    fn test_update_request_null_clears() {
        let req: UpdateTaskRequest = serde_json::from_str(r#"{"assignee_id": null}"#).unwrap();
        assert_eq!(req.assignee_id, Some(None));
        assert_eq!(req.due_date, None);
        assert!(req.validate().is_ok());
    }
}
