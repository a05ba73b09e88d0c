/// User administration endpoints
///
/// - `GET    /api/users` - List users (manager+)
/// - `GET    /api/users/:id` - Self, or any user for manager+
/// - `PUT    /api/users/:id` - Profile fields for self, role/status for admins
/// - `DELETE /api/users/:id` - Soft delete (admin, never self)

use axum::{extract::State, Extension};
use serde::Deserialize;
use serde_json::json;
use taskhub_shared::{
    auth::{authorization::require_role, middleware::AuthContext},
    models::{
        activity_log::ActivityLog,
        double_option,
        user::{UpdateUser, User, UserFilter, UserRole, UserStatus},
    },
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{PageQuery, Path, Query, ValidatedJson},
    response::ApiResponse,
    validation::{self, checked, parse_query},
};

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 100, message = "First name must be at most 100 characters"))]
    pub first_name: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(length(max = 100, message = "Last name must be at most 100 characters"))]
    pub last_name: Option<Option<String>>,

    #[serde(default, deserialize_with = "double_option")]
    #[validate(url(message = "Avatar must be a valid URL"))]
    pub avatar_url: Option<Option<String>>,

    #[validate(custom(function = "validation::user_role"))]
    pub role: Option<String>,

    #[validate(custom(function = "validation::user_status"))]
    pub status: Option<String>,
}

impl UpdateUserRequest {
    fn touches_admin_fields(&self) -> bool {
        self.role.is_some() || self.status.is_some()
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageQuery>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<ApiResponse<Vec<User>>> {
    require_role(&auth, UserRole::Manager)?;

    let filter = UserFilter {
        search: query.search,
        role: parse_query("role", query.role.as_deref(), UserRole::parse)?,
        status: parse_query("status", query.status.as_deref(), UserStatus::parse)?,
    };
    let page = page.resolve(&state.limits());

    let users = User::list(&state.db, &filter, page.limit(), page.offset()).await?;
    let total = User::count(&state.db, &filter).await?;

    Ok(ApiResponse::paginated("Users", users, page.meta(total)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<User>> {
    if id != auth.user_id && !auth.can_view_all() {
        return Err(ApiError::Forbidden("You can only view your own profile".to_string()));
    }

    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok("User", user))
}

/// Update a user
///
/// Users edit their own profile fields. Only admins may change `role` or
/// `status`, or edit another user. An admin cannot demote or deactivate
/// their own account.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> ApiResult<ApiResponse<User>> {
    let is_self = id == auth.user_id;

    if !auth.is_admin() {
        if !is_self {
            return Err(ApiError::Forbidden("You can only update your own profile".to_string()));
        }
        if req.touches_admin_fields() {
            return Err(ApiError::Forbidden("Only administrators can change role or status".to_string()));
        }
    }

    let role = req.role.as_deref().map(|r| checked("role", r, UserRole::parse)).transpose()?;
    let status = req
        .status
        .as_deref()
        .map(|s| checked("status", s, UserStatus::parse))
        .transpose()?;

    if is_self && (role.is_some_and(|r| r != UserRole::Admin) || status.is_some_and(|s| s != UserStatus::Active)) {
        return Err(ApiError::Forbidden("You cannot demote or deactivate your own account".to_string()));
    }

    let update = UpdateUser {
        email: req.email.map(|e| e.trim().to_string()),
        first_name: req.first_name,
        last_name: req.last_name,
        avatar_url: req.avatar_url,
        role,
        status,
        ..Default::default()
    };
    if update.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let user = User::update(&state.db, id, update)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %user.id, updated_by = %auth.user_id, "User updated");
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "update",
        "user",
        user.id,
        Some(json!({ "role": role, "status": status })),
    )
    .await;

    Ok(ApiResponse::ok("User updated", user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    require_role(&auth, UserRole::Admin)?;

    if id == auth.user_id {
        return Err(ApiError::BadRequest("You cannot delete your own account".to_string()));
    }

    if User::find_by_id(&state.db, id).await?.is_none() {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    User::deactivate(&state.db, id).await?;

    tracing::info!(user_id = %id, deleted_by = %auth.user_id, "User deactivated");
    ActivityLog::record(&state.db, auth.user_id, "deactivate", "user", id, None).await;

    Ok(ApiResponse::message("User deactivated"))
}
