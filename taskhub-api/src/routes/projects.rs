/// Project endpoints
///
/// # Endpoints
///
/// - `GET    /api/projects` - Projects visible to the caller, with counters
/// - `POST   /api/projects` - Create (caller becomes owner)
/// - `GET    /api/projects/:id` - Project with members
/// - `PUT    /api/projects/:id` - Update (owner/project manager)
/// - `DELETE /api/projects/:id` - Delete (owner/admin)
/// - `GET    /api/projects/:id/members` - Members
/// - `POST   /api/projects/:id/members` - Add or change a member (owner/project manager)
/// - `DELETE /api/projects/:id/members/:user_id` - Remove a member
/// - `GET    /api/projects/:id/tasks` - Tasks of the project
///
/// # Visibility
///
/// Regular users see public projects and projects they own or belong to.
/// Managers and admins see every project.

use axum::{extract::State, Extension};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use taskhub_shared::{
    auth::{
        authorization::{require_project, Access},
        middleware::AuthContext,
    },
    models::{
        activity_log::ActivityLog,
        double_option,
        notification::NotificationKind,
        project::{CreateProject, Project, ProjectFilter, ProjectStatus, ProjectSummary, UpdateProject},
        project_member::{MemberWithUser, ProjectMember, ProjectRole},
        task::{Task, TaskFilter, TaskListItem, TaskStatus},
        user::User,
        Priority,
    },
};
use uuid::Uuid;
use validator::Validate;

use super::{load_project, notifications::notify};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{PageQuery, Path, Query, ValidatedJson},
    response::ApiResponse,
    upload,
    validation::{self, checked, date_order, parse_query},
};

#[derive(Debug, Default, Deserialize)]
pub struct ProjectListQuery {
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    #[validate(custom(function = "validation::project_status"))]
    pub status: Option<String>,

    #[validate(custom(function = "validation::priority"))]
    pub priority: Option<String>,

    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<Option<String>>,

    #[validate(custom(function = "validation::project_status"))]
    pub status: Option<String>,

    #[validate(custom(function = "validation::priority"))]
    pub priority: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<NaiveDate>>,

    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<NaiveDate>>,

    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    pub user_id: Uuid,

    #[validate(custom(function = "validation::project_role"))]
    pub role: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub members: Vec<MemberWithUser>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectTaskQuery {
    pub status: Option<String>,
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageQuery>,
    Query(query): Query<ProjectListQuery>,
) -> ApiResult<ApiResponse<Vec<ProjectSummary>>> {
    let filter = ProjectFilter {
        visible_to: auth.visibility_scope(),
        status: parse_query("status", query.status.as_deref(), ProjectStatus::parse)?,
        search: query.search,
    };
    let page = page.resolve(&state.limits());

    let projects = Project::list(&state.db, &filter, page.limit(), page.offset()).await?;
    let total = Project::count(&state.db, &filter).await?;

    Ok(ApiResponse::paginated("Projects", projects, page.meta(total)))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<CreateProjectRequest>,
) -> ApiResult<ApiResponse<Project>> {
    date_order(req.start_date, req.due_date)?;

    let status = match req.status.as_deref() {
        Some(s) => checked("status", s, ProjectStatus::parse)?,
        None => ProjectStatus::Planning,
    };
    let priority = match req.priority.as_deref() {
        Some(p) => checked("priority", p, Priority::parse)?,
        None => Priority::default(),
    };

    let project = Project::create(
        &state.db,
        CreateProject {
            name: req.name.trim().to_string(),
            description: req.description,
            status,
            priority,
            start_date: req.start_date,
            due_date: req.due_date,
            is_public: req.is_public,
            owner_id: auth.user_id,
        },
    )
    .await?;

    tracing::info!(project_id = %project.id, user_id = %auth.user_id, "Project created");
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "create",
        "project",
        project.id,
        Some(json!({ "name": project.name })),
    )
    .await;

    Ok(ApiResponse::created("Project created", project))
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<ProjectDetail>> {
    let project = load_project(&state.db, id).await?;
    require_project(&state.db, &auth, &project, Access::Read).await?;

    let members = ProjectMember::list_for_project(&state.db, project.id).await?;
    Ok(ApiResponse::ok("Project", ProjectDetail { project, members }))
}

pub async fn update_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateProjectRequest>,
) -> ApiResult<ApiResponse<Project>> {
    let project = load_project(&state.db, id).await?;
    require_project(&state.db, &auth, &project, Access::Manage).await?;

    // Check the resulting date pair, not just the submitted half
    let start = req.start_date.unwrap_or(project.start_date);
    let due = req.due_date.unwrap_or(project.due_date);
    date_order(start, due)?;

    let update = UpdateProject {
        name: req.name.map(|n| n.trim().to_string()),
        description: req.description,
        status: req.status.as_deref().map(|s| checked("status", s, ProjectStatus::parse)).transpose()?,
        priority: req.priority.as_deref().map(|p| checked("priority", p, Priority::parse)).transpose()?,
        start_date: req.start_date,
        due_date: req.due_date,
        is_public: req.is_public,
    };

    let updated = Project::update(&state.db, id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    ActivityLog::record(&state.db, auth.user_id, "update", "project", id, None).await;
    Ok(ApiResponse::ok("Project updated", updated))
}

/// Only the owner (or an admin) may delete; project managers may not
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    let project = load_project(&state.db, id).await?;

    if project.owner_id != auth.user_id && !auth.is_admin() {
        return Err(ApiError::Forbidden("Only the project owner can delete a project".to_string()));
    }

    let attachments = Project::delete(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;
    upload::remove_all(&state.config.upload, &attachments).await;

    tracing::info!(project_id = %id, user_id = %auth.user_id, "Project deleted");
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "delete",
        "project",
        id,
        Some(json!({ "name": project.name })),
    )
    .await;

    Ok(ApiResponse::message("Project deleted"))
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<Vec<MemberWithUser>>> {
    let project = load_project(&state.db, id).await?;
    require_project(&state.db, &auth, &project, Access::Read).await?;

    let members = ProjectMember::list_for_project(&state.db, id).await?;
    Ok(ApiResponse::ok("Project members", members))
}

/// Add a member or change an existing member's role
///
/// The owner's membership cannot be changed here.
pub async fn add_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<AddMemberRequest>,
) -> ApiResult<ApiResponse<ProjectMember>> {
    let project = load_project(&state.db, id).await?;
    require_project(&state.db, &auth, &project, Access::Manage).await?;

    if req.user_id == project.owner_id {
        return Err(ApiError::Conflict("The owner's membership cannot be changed".to_string()));
    }

    let user = User::find_by_id(&state.db, req.user_id)
        .await?
        .filter(User::is_active)
        .ok_or_else(|| ApiError::field("user_id", "User does not exist or is inactive"))?;

    let role = match req.role.as_deref() {
        Some(r) => checked("role", r, ProjectRole::parse)?,
        None => ProjectRole::Member,
    };

    let member = ProjectMember::upsert(&state.db, id, user.id, role).await?;

    notify(
        &state.db,
        auth.user_id,
        user.id,
        NotificationKind::ProjectInvite,
        "Added to project",
        format!("{} added you to '{}' as {}", auth.username, project.name, role.as_str()),
        None,
    )
    .await;
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "add_member",
        "project",
        id,
        Some(json!({ "user_id": user.id, "role": role })),
    )
    .await;

    Ok(ApiResponse::ok("Member saved", member))
}

/// Remove a member
///
/// Project managers remove others; any member may remove themselves.
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<()>> {
    let project = load_project(&state.db, id).await?;

    if user_id == project.owner_id {
        return Err(ApiError::Conflict("The project owner cannot be removed".to_string()));
    }
    if user_id != auth.user_id {
        require_project(&state.db, &auth, &project, Access::Manage).await?;
    }

    if !ProjectMember::remove(&state.db, id, user_id).await? {
        return Err(ApiError::NotFound("Member not found".to_string()));
    }

    ActivityLog::record(
        &state.db,
        auth.user_id,
        "remove_member",
        "project",
        id,
        Some(json!({ "user_id": user_id })),
    )
    .await;

    Ok(ApiResponse::message("Member removed"))
}

pub async fn project_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageQuery>,
    Query(query): Query<ProjectTaskQuery>,
) -> ApiResult<ApiResponse<Vec<TaskListItem>>> {
    let project = load_project(&state.db, id).await?;
    require_project(&state.db, &auth, &project, Access::Read).await?;

    // Project access covers every task in it
    let filter = TaskFilter {
        project_id: Some(id),
        status: parse_query("status", query.status.as_deref(), TaskStatus::parse)?,
        ..Default::default()
    };
    let page = page.resolve(&state.limits());

    let tasks = Task::list(&state.db, &filter, page.limit(), page.offset()).await?;
    let total = Task::count(&state.db, &filter).await?;

    Ok(ApiResponse::paginated("Project tasks", tasks, page.meta(total)))
}
