/// Tags and task/tag links
///
/// A tag is one of three kinds:
///
/// - **global** (`is_global = true`): visible everywhere, admin-managed
/// - **project** (`project_id` set): visible to project members
/// - **personal** (neither): visible to its creator
///
/// Names are unique case-insensitively within a scope
/// (`uq_tags_name_scope`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Default color for tags created without one
pub const DEFAULT_TAG_COLOR: &str = "#6B7280";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    /// `#RRGGBB`
    pub color: String,
    pub project_id: Option<Uuid>,
    pub is_global: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// The tag's scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScope {
    Global,
    Project(Uuid),
    Personal,
}

impl Tag {
    pub fn scope(&self) -> TagScope {
        if self.is_global {
            TagScope::Global
        } else if let Some(project_id) = self.project_id {
            TagScope::Project(project_id)
        } else {
            TagScope::Personal
        }
    }
}

/// Tag row with the number of tasks carrying it
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TagWithUsage {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub tag: Tag,
    pub task_count: i64,
}

#[derive(Debug, Clone)]
pub struct CreateTag {
    pub name: String,
    pub color: String,
    pub project_id: Option<Uuid>,
    pub is_global: bool,
    pub created_by: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTag {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// Tags a listing should include
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    /// Only global tags plus this user's personal and project tags.
    /// `None` returns every tag.
    pub visible_to: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

/// True for `#RRGGBB` hex colors
pub fn is_valid_color(color: &str) -> bool {
    let bytes = color.as_bytes();
    bytes.len() == 7 && bytes[0] == b'#' && bytes[1..].iter().all(u8::is_ascii_hexdigit)
}

const TAG_COLUMNS: &str = "g.id, g.name, g.color, g.project_id, g.is_global, g.created_by, g.created_at";

impl Tag {
    pub async fn create(pool: &PgPool, data: CreateTag) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO tags AS g (name, color, project_id, is_global, created_by) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {TAG_COLUMNS}"
        );

        sqlx::query_as::<_, Tag>(&query)
            .bind(data.name)
            .bind(data.color)
            .bind(data.project_id)
            .bind(data.is_global)
            .bind(data.created_by)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {TAG_COLUMNS} FROM tags g WHERE g.id = $1");

        sqlx::query_as::<_, Tag>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn update(pool: &PgPool, id: Uuid, data: UpdateTag) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE tags AS g SET name = COALESCE($2, g.name), color = COALESCE($3, g.color) \
             WHERE g.id = $1 RETURNING {TAG_COLUMNS}"
        );

        sqlx::query_as::<_, Tag>(&query)
            .bind(id)
            .bind(data.name)
            .bind(data.color)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists tags with usage counts, global tags first, then by name
    pub async fn list(pool: &PgPool, filter: &TagFilter) -> Result<Vec<TagWithUsage>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {TAG_COLUMNS}, \
                    (SELECT COUNT(*) FROM task_tags tt WHERE tt.tag_id = g.id) AS task_count \
             FROM tags g WHERE TRUE"
        ));

        if let Some(user_id) = filter.visible_to {
            qb.push(" AND (g.is_global OR g.created_by = ")
                .push_bind(user_id)
                .push(" OR EXISTS (SELECT 1 FROM project_members m WHERE m.project_id = g.project_id AND m.user_id = ")
                .push_bind(user_id)
                .push("))");
        }
        if let Some(project_id) = filter.project_id {
            qb.push(" AND (g.is_global OR g.project_id = ").push_bind(project_id).push(")");
        }
        qb.push(" ORDER BY g.is_global DESC, LOWER(g.name) ASC");

        qb.build_query_as::<TagWithUsage>().fetch_all(pool).await
    }

    /// Tags attached to a task
    pub async fn list_for_task(pool: &PgPool, task_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {TAG_COLUMNS} FROM tags g \
             JOIN task_tags tt ON tt.tag_id = g.id \
             WHERE tt.task_id = $1 ORDER BY LOWER(g.name)"
        );

        sqlx::query_as::<_, Tag>(&query)
            .bind(task_id)
            .fetch_all(pool)
            .await
    }

    /// Links a tag to a task; returns false if it was already linked
    pub async fn attach(pool: &PgPool, task_id: Uuid, tag_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO task_tags (task_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(task_id)
        .bind(tag_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Unlinks a tag; returns false if it was not linked
    pub async fn detach(pool: &PgPool, task_id: Uuid, tag_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM task_tags WHERE task_id = $1 AND tag_id = $2")
            .bind(task_id)
            .bind(tag_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(is_global: bool, project_id: Option<Uuid>) -> Tag {
        Tag {
            id: Uuid::new_v4(),
            name: "bug".to_string(),
            color: DEFAULT_TAG_COLOR.to_string(),
            project_id,
            is_global,
            created_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_color_validation() {
        assert!(is_valid_color("#FF00aa"));
        assert!(is_valid_color(DEFAULT_TAG_COLOR));
        assert!(!is_valid_color("FF00AA"));
        assert!(!is_valid_color("#FF00A"));
        assert!(!is_valid_color("#GG0000"));
        assert!(!is_valid_color("#FF00AA00"));
    }

    #[test]
    fn test_scope() {
        let project = Uuid::new_v4();
        assert_eq!(tag(true, None).scope(), TagScope::Global);
        assert_eq!(tag(true, Some(project)).scope(), TagScope::Global);
        assert_eq!(tag(false, Some(project)).scope(), TagScope::Project(project));
        assert_eq!(tag(false, None).scope(), TagScope::Personal);
    }
}
