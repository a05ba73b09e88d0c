/// Activity trail
///
/// Writes are best-effort: [`ActivityLog::record`] logs a warning on failure
/// and never returns an error, so a broken audit insert cannot fail the
/// request that triggered it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub details: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// Activity row with the acting user's name, for the dashboard feed
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActivityWithUser {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub activity: ActivityLog,
    pub username: Option<String>,
}

impl ActivityLog {
    /// Inserts an activity row, swallowing (and logging) any failure
    pub async fn record(
        pool: &PgPool,
        user_id: Uuid,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        details: Option<JsonValue>,
    ) {
        let result = sqlx::query(
            "INSERT INTO activity_logs (user_id, action, entity_type, entity_id, details) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind(action)
        .bind(entity_type)
        .bind(entity_id)
        .bind(details)
        .execute(pool)
        .await;

        if let Err(e) = result {
            warn!(
                error = %e,
                %user_id,
                action,
                entity_type,
                %entity_id,
                "Failed to record activity"
            );
        }
    }

    /// Most recent activity; `user_id = None` returns everyone's
    pub async fn recent(
        pool: &PgPool,
        user_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<ActivityWithUser>, sqlx::Error> {
        sqlx::query_as::<_, ActivityWithUser>(
            r#"
            SELECT a.id, a.user_id, a.action, a.entity_type, a.entity_id, a.details, a.created_at,
                   u.username
            FROM activity_logs a
            LEFT JOIN users u ON u.id = a.user_id
            WHERE ($1::uuid IS NULL OR a.user_id = $1)
            ORDER BY a.created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}
