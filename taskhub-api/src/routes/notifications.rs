/// Notification endpoints
///
/// - `GET /api/notifications?unread_only=true` - Caller's notifications, newest first
/// - `PUT /api/notifications/:id/read` - Mark one as read
/// - `PUT /api/notifications/read-all` - Mark all as read

use axum::{extract::State, Extension};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use taskhub_shared::{
    auth::middleware::AuthContext,
    models::notification::{CreateNotification, Notification, NotificationKind},
};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{PageQuery, Path, Query},
    response::ApiResponse,
};

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

/// Creates a notification without failing the calling request
///
/// Nobody is notified about their own actions.
pub(crate) async fn notify(
    db: &PgPool,
    actor: Uuid,
    user_id: Uuid,
    kind: NotificationKind,
    title: impl Into<String>,
    message: impl Into<String>,
    task_id: Option<Uuid>,
) {
    if user_id == actor {
        return;
    }

    let data = CreateNotification {
        user_id,
        kind,
        title: title.into(),
        message: message.into(),
        task_id,
    };

    if let Err(e) = Notification::create(db, data).await {
        tracing::warn!(user_id = %user_id, kind = ?kind, error = %e, "Failed to create notification");
    }
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<PageQuery>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<ApiResponse<Vec<Notification>>> {
    let page = page.resolve(&state.limits());

    let notifications =
        Notification::list_for_user(&state.db, auth.user_id, query.unread_only, page.limit(), page.offset())
            .await?;
    let total = Notification::count_for_user(&state.db, auth.user_id, query.unread_only).await?;

    Ok(ApiResponse::paginated("Notifications", notifications, page.meta(total)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<ApiResponse<Notification>> {
    // Scoped to the caller, so someone else's notification is a 404
    let notification = Notification::mark_read(&state.db, id, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;

    Ok(ApiResponse::ok("Notification marked as read", notification))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<MarkedRead>> {
    let updated = Notification::mark_all_read(&state.db, auth.user_id).await?;
    Ok(ApiResponse::ok("All notifications marked as read", MarkedRead { updated }))
}
