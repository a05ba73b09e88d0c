/// Task comments
///
/// - `GET    /api/tasks/:id/comments` - Oldest first, paginated
/// - `POST   /api/tasks/:id/comments` - Anyone who can see the task may comment
/// - `PUT    /api/comments/:id` - Author only
/// - `DELETE /api/comments/:id` - Author, task manager or admin

use axum::{extract::State, Extension};
use serde::Deserialize;
use taskhub_shared::{
    auth::{
        authorization::{require_task, task_access, Access},
        middleware::AuthContext,
    },
    models::{
        activity_log::ActivityLog,
        comment::{Comment, CommentWithAuthor},
        notification::NotificationKind,
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
};

#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(min = 1, max = 5000, message = "Comment must be 1-5000 characters"))]
    pub content: String,
}

async fn load_comment(state: &AppState, id: Uuid) -> ApiResult<Comment> {
    Comment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<ApiResponse<Vec<CommentWithAuthor>>> {
    let task = load_task(&state.db, task_id).await?;
    require_task(&state.db, &auth, &task, Access::Read).await?;

    let page = page.resolve(&state.limits());
    let comments = Comment::list_for_task(&state.db, task_id, page.limit(), page.offset()).await?;
    let total = Comment::count_for_task(&state.db, task_id).await?;

    Ok(ApiResponse::paginated("Comments", comments, page.meta(total)))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CommentRequest>,
) -> ApiResult<ApiResponse<Comment>> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::field("content", "Comment cannot be blank"));
    }

    let task = load_task(&state.db, task_id).await?;
    require_task(&state.db, &auth, &task, Access::Read).await?;

    let comment = Comment::create(&state.db, task_id, auth.user_id, content).await?;

    ActivityLog::record(&state.db, auth.user_id, "comment", "task", task_id, None).await;

    let mut recipients = vec![task.created_by];
    recipients.extend(task.assignee_id.filter(|a| *a != task.created_by));
    for user_id in recipients {
        notify(
            &state.db,
            auth.user_id,
            user_id,
            NotificationKind::CommentAdded,
            "New comment",
            format!("{} commented on '{}'", auth.username, task.title),
            Some(task_id),
        )
        .await;
    }

    Ok(ApiResponse::created("Comment added", comment))
}

pub async fn update_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CommentRequest>,
) -> ApiResult<ApiResponse<Comment>> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::field("content", "Comment cannot be blank"));
    }

    let comment = load_comment(&state, id).await?;
    if comment.user_id != auth.user_id {
        return Err(ApiError::Forbidden("You can only edit your own comments".to_string()));
    }

    let updated = Comment::update(&state.db, id, content)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

    Ok(ApiResponse::ok("Comment updated", updated))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    let comment = load_comment(&state, id).await?;

    if comment.user_id != auth.user_id && !auth.is_admin() {
        let task = load_task(&state.db, comment.task_id).await?;
        if !task_access(&state.db, &auth, &task).await?.allows(Access::Manage) {
            return Err(ApiError::Forbidden("You can only delete your own comments".to_string()));
        }
    }

    Comment::delete(&state.db, id).await?;
    ActivityLog::record(&state.db, auth.user_id, "delete_comment", "task", comment.task_id, None).await;

    Ok(ApiResponse::message("Comment deleted"))
}
