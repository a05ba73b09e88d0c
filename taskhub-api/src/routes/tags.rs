/// Tag endpoints
///
/// - `GET    /api/tags` - Tags visible to the caller, with usage counts
/// - `POST   /api/tags` - Create a global, project or personal tag
/// - `PUT    /api/tags/:id` - Rename or recolor
/// - `DELETE /api/tags/:id` - Delete (detaches it from every task)
///
/// Global tags are admin-only. Project tags need owner/manager rights on the
/// project. Personal tags belong to their creator.

use axum::{extract::State, Extension};
use serde::Deserialize;
use serde_json::json;
use taskhub_shared::{
    auth::{
        authorization::{require_project, require_tag_modify, Access, AuthzError},
        middleware::AuthContext,
    },
    models::{
        activity_log::ActivityLog,
        tag::{CreateTag, Tag, TagFilter, TagWithUsage, UpdateTag, DEFAULT_TAG_COLOR},
    },
};
use uuid::Uuid;
use validator::Validate;

use super::load_project;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{Path, Query, ValidatedJson},
    response::ApiResponse,
    validation,
};

#[derive(Debug, Default, Deserialize)]
pub struct TagListQuery {
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTagRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: String,

    #[validate(custom(function = "validation::color"))]
    pub color: Option<String>,

    pub project_id: Option<Uuid>,

    #[serde(default)]
    pub is_global: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTagRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
    pub name: Option<String>,

    #[validate(custom(function = "validation::color"))]
    pub color: Option<String>,
}

async fn load_tag(state: &AppState, id: Uuid) -> ApiResult<Tag> {
    Tag::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Tag not found".to_string()))
}

fn trimmed_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::field("name", "Name cannot be blank"));
    }
    Ok(name.to_string())
}

pub async fn list_tags(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<TagListQuery>,
) -> ApiResult<ApiResponse<Vec<TagWithUsage>>> {
    let filter = TagFilter {
        visible_to: auth.visibility_scope(),
        project_id: query.project_id,
    };

    let tags = Tag::list(&state.db, &filter).await?;
    Ok(ApiResponse::ok("Tags", tags))
}

/// Create a tag
///
/// # Errors
///
/// - `403`: Non-admin creating a global tag, or a project tag without
///   management rights on the project
/// - `409`: Name already used in the same scope
/// - `422`: Invalid name or color, or both `is_global` and `project_id`
pub async fn create_tag(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<CreateTagRequest>,
) -> ApiResult<ApiResponse<Tag>> {
    if req.is_global && !auth.is_admin() {
        return Err(AuthzError::GlobalTagAdminOnly.into());
    }
    if req.is_global && req.project_id.is_some() {
        return Err(ApiError::field("project_id", "A global tag cannot belong to a project"));
    }
    let name = trimmed_name(&req.name)?;

    if let Some(project_id) = req.project_id {
        let project = load_project(&state.db, project_id).await?;
        require_project(&state.db, &auth, &project, Access::Manage).await?;
    }

    let tag = Tag::create(
        &state.db,
        CreateTag {
            name,
            color: req.color.unwrap_or_else(|| DEFAULT_TAG_COLOR.to_string()),
            project_id: req.project_id,
            is_global: req.is_global,
            created_by: auth.user_id,
        },
    )
    .await?;

    tracing::info!(tag_id = %tag.id, user_id = %auth.user_id, is_global = tag.is_global, "Tag created");
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "create",
        "tag",
        tag.id,
        Some(json!({ "name": tag.name })),
    )
    .await;

    Ok(ApiResponse::created("Tag created", tag))
}

pub async fn update_tag(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateTagRequest>,
) -> ApiResult<ApiResponse<Tag>> {
    let name = req.name.as_deref().map(trimmed_name).transpose()?;

    let tag = load_tag(&state, id).await?;
    require_tag_modify(&state.db, &auth, &tag).await?;

    let updated = Tag::update(&state.db, id, UpdateTag { name, color: req.color })
        .await?
        .ok_or_else(|| ApiError::NotFound("Tag not found".to_string()))?;

    ActivityLog::record(&state.db, auth.user_id, "update", "tag", id, None).await;
    Ok(ApiResponse::ok("Tag updated", updated))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    let tag = load_tag(&state, id).await?;
    require_tag_modify(&state.db, &auth, &tag).await?;

    Tag::delete(&state.db, id).await?;

    tracing::info!(tag_id = %id, user_id = %auth.user_id, "Tag deleted");
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "delete",
        "tag",
        id,
        Some(json!({ "name": tag.name })),
    )
    .await;

    Ok(ApiResponse::message("Tag deleted"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_color_checked() {
        let req: CreateTagRequest = serde_json::from_str(r##"{"name":"bug","color":"red"}"##).unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("color"));

        let req: CreateTagRequest = serde_json::from_str(r##"{"name":"bug","color":"#FF0000"}"##).unwrap();
        assert!(req.validate().is_ok());
        assert!(!req.is_global);
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(trimmed_name("   ").is_err());
        assert_eq!(trimmed_name("  backend ").unwrap(), "backend");
    }
}
