/// Uploaded file metadata
///
/// The file itself lives on disk under the uploads directory at
/// `<sha256[..2]>/<stored_name>`; see [`Attachment::relative_path`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

const ATTACHMENT_COLUMNS: &str = "a.id, a.task_id, a.user_id, a.original_name, a.stored_name, a.mime_type, \
                                  a.size_bytes, a.sha256::text AS sha256, a.created_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    /// Client-supplied file name, for display only
    pub original_name: String,
    /// `<uuid>.<ext>`, unique
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    /// Hex SHA-256 of the content
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAttachment {
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub sha256: String,
}

/// Parent whose deletion takes attachments with it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentOwner {
    Task(Uuid),
    Project(Uuid),
}

/// Directory fan-out for stored files
pub fn shard_dir(sha256: &str) -> &str {
    sha256.get(..2).unwrap_or("00")
}

impl Attachment {
    /// Path relative to the uploads directory (and the `/uploads` URL prefix)
    pub fn relative_path(&self) -> String {
        format!("{}/{}", shard_dir(&self.sha256), self.stored_name)
    }

    pub async fn create(pool: &PgPool, data: CreateAttachment) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(
            r#"
            INSERT INTO attachments (task_id, user_id, original_name, stored_name, mime_type, size_bytes, sha256)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, task_id, user_id, original_name, stored_name, mime_type, size_bytes,
                      sha256::text AS sha256, created_at
            "#,
        )
        .bind(data.task_id)
        .bind(data.user_id)
        .bind(data.original_name)
        .bind(data.stored_name)
        .bind(data.mime_type)
        .bind(data.size_bytes)
        .bind(data.sha256)
        .fetch_one(pool)
        .await
    }

    /// Deletes every row under `owner` and returns them so their files can be removed
    ///
    /// Runs in the caller's transaction; the owning rows must already be locked
    /// so no upload can slip in before the cascade.
    pub async fn delete_owned(
        tx: &mut Transaction<'_, Postgres>,
        owner: AttachmentOwner,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let (query, id) = match owner {
            AttachmentOwner::Task(id) => (
                format!("DELETE FROM attachments a WHERE a.task_id = $1 RETURNING {ATTACHMENT_COLUMNS}"),
                id,
            ),
            AttachmentOwner::Project(id) => (
                format!(
                    "DELETE FROM attachments a USING tasks t \
                     WHERE a.task_id = t.id AND t.project_id = $1 RETURNING {ATTACHMENT_COLUMNS}"
                ),
                id,
            ),
        };

        sqlx::query_as::<_, Attachment>(&query)
            .bind(id)
            .fetch_all(&mut **tx)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(
            "SELECT id, task_id, user_id, original_name, stored_name, mime_type, size_bytes, \
                    sha256::text AS sha256, created_at \
             FROM attachments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn list_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Attachment>(
            "SELECT id, task_id, user_id, original_name, stored_name, mime_type, size_bytes, \
                    sha256::text AS sha256, created_at \
             FROM attachments WHERE task_id = $1 ORDER BY created_at DESC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM attachments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_uses_hash_prefix() {
        let attachment = Attachment {
            id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            original_name: "spec.pdf".to_string(),
            stored_name: "0b9c6a4e.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes: 1024,
            sha256: "ab".repeat(32),
            created_at: Utc::now(),
        };

        assert_eq!(attachment.relative_path(), "ab/0b9c6a4e.pdf");
        assert_eq!(shard_dir(""), "00");
    }
}
