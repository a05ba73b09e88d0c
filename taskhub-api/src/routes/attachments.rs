/// Task attachments
///
/// - `GET    /api/tasks/:id/attachments` - Attachments with their download URLs
/// - `POST   /api/tasks/:id/attachments` - Multipart upload, field `file`
/// - `DELETE /api/attachments/:id` - Uploader, task manager or admin
///
/// Files are served statically under `/uploads/<relative_path>`.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Extension,
};
use serde::Serialize;
use serde_json::json;
use taskhub_shared::{
    auth::{
        authorization::{require_task, task_access, Access},
        middleware::AuthContext,
    },
    models::{
        activity_log::ActivityLog,
        attachment::{shard_dir, Attachment, CreateAttachment},
    },
};
use uuid::Uuid;

use super::load_task;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::Path,
    response::ApiResponse,
    upload,
};

/// URL prefix the uploads directory is mounted at
pub const UPLOADS_PREFIX: &str = "/uploads";

#[derive(Debug, Serialize)]
pub struct AttachmentView {
    #[serde(flatten)]
    pub attachment: Attachment,
    pub url: String,
}

impl From<Attachment> for AttachmentView {
    fn from(attachment: Attachment) -> Self {
        let url = format!("{}/{}", UPLOADS_PREFIX, attachment.relative_path());
        Self { attachment, url }
    }
}

pub async fn list_attachments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
) -> ApiResult<ApiResponse<Vec<AttachmentView>>> {
    let task = load_task(&state.db, task_id).await?;
    require_task(&state.db, &auth, &task, Access::Read).await?;

    let attachments = Attachment::list_for_task(&state.db, task_id)
        .await?
        .into_iter()
        .map(AttachmentView::from)
        .collect();

    Ok(ApiResponse::ok("Attachments", attachments))
}

/// Upload a file to a task
///
/// # Errors
///
/// - `413`: File larger than `UPLOAD_MAX_SIZE`
/// - `422`: Missing `file` field, disallowed extension, MIME or content mismatch
pub async fn upload_attachment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(task_id): Path<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<ApiResponse<AttachmentView>> {
    let mut multipart = multipart?;

    let task = load_task(&state.db, task_id).await?;
    require_task(&state.db, &auth, &task, Access::Write).await?;

    let (file_name, content_type, data) = upload::read_file_field(&mut multipart).await?;
    let file = upload::validate_upload(&state.config.upload, &file_name, content_type.as_deref(), data)?;
    let stored_name = upload::store(&state.config.upload, &file).await?;

    let created = Attachment::create(
        &state.db,
        CreateAttachment {
            task_id,
            user_id: auth.user_id,
            original_name: file.original_name.clone(),
            stored_name: stored_name.clone(),
            mime_type: file.mime_type.clone(),
            size_bytes: file.size() as i64,
            sha256: file.sha256.clone(),
        },
    )
    .await;

    let attachment = match created {
        Ok(attachment) => attachment,
        Err(e) => {
            // Don't leave an orphaned file behind
            let relative = format!("{}/{}", shard_dir(&file.sha256), stored_name);
            upload::remove(&state.config.upload, &relative).await;
            return Err(e.into());
        }
    };

    tracing::info!(
        attachment_id = %attachment.id,
        task_id = %task_id,
        size = attachment.size_bytes,
        "Attachment uploaded"
    );
    ActivityLog::record(
        &state.db,
        auth.user_id,
        "upload",
        "task",
        task_id,
        Some(json!({ "attachment_id": attachment.id, "name": attachment.original_name })),
    )
    .await;

    Ok(ApiResponse::created("File uploaded", attachment.into()))
}

pub async fn delete_attachment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<()>> {
    let attachment = Attachment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Attachment not found".to_string()))?;

    if attachment.user_id != auth.user_id && !auth.is_admin() {
        let task = load_task(&state.db, attachment.task_id).await?;
        if !task_access(&state.db, &auth, &task).await?.allows(Access::Manage) {
            return Err(ApiError::Forbidden("You can only delete your own attachments".to_string()));
        }
    }

    Attachment::delete(&state.db, id).await?;
    upload::remove(&state.config.upload, &attachment.relative_path()).await;

    ActivityLog::record(
        &state.db,
        auth.user_id,
        "delete_attachment",
        "task",
        attachment.task_id,
        Some(json!({ "attachment_id": id })),
    )
    .await;

    Ok(ApiResponse::message("Attachment deleted"))
}
