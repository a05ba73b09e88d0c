/// Project model and database operations
///
/// # Schema
///
/// ```sql
/// CREATE TYPE project_status AS ENUM ('planning', 'active', 'on_hold', 'completed', 'cancelled');
///
/// CREATE TABLE projects (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     description TEXT,
///     status project_status NOT NULL DEFAULT 'active',
///     priority priority_level NOT NULL DEFAULT 'medium',
///     start_date DATE,
///     due_date DATE,
///     is_public BOOLEAN NOT NULL DEFAULT FALSE,
///     owner_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Creating a project also inserts the owner into `project_members` with the
/// `owner` role, inside one transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    attachment::{Attachment, AttachmentOwner},
    Priority,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 5] = [
        ProjectStatus::Planning,
        ProjectStatus::Active,
        ProjectStatus::OnHold,
        ProjectStatus::Completed,
        ProjectStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Visible (read-only) to every user when true
    pub is_public: bool,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project with task progress counters, used by list endpoints
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectSummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub project: Project,
    pub task_count: i64,
    pub completed_task_count: i64,
    pub member_count: i64,
}

#[derive(Debug, Clone)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub priority: Priority,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub is_public: bool,
    pub owner_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    pub priority: Option<Priority>,
    pub start_date: Option<Option<NaiveDate>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub is_public: Option<bool>,
}

/// Which projects a listing should include
#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    /// Restrict to projects this user owns, belongs to, or that are public.
    /// `None` lists everything (managers and admins).
    pub visible_to: Option<Uuid>,
    pub status: Option<ProjectStatus>,
    pub search: Option<String>,
}

const PROJECT_COLUMNS: &str = "p.id, p.name, p.description, p.status, p.priority, p.start_date, \
                               p.due_date, p.is_public, p.owner_id, p.created_at, p.updated_at";

impl Project {
    /// Creates the project and its owner membership atomically
    pub async fn create(pool: &PgPool, data: CreateProject) -> Result<Self, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects AS p (name, description, status, priority, start_date, due_date, is_public, owner_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING p.id, p.name, p.description, p.status, p.priority, p.start_date,
                      p.due_date, p.is_public, p.owner_id, p.created_at, p.updated_at
            "#,
        )
        .bind(data.name)
        .bind(data.description)
        .bind(data.status)
        .bind(data.priority)
        .bind(data.start_date)
        .bind(data.due_date)
        .bind(data.is_public)
        .bind(data.owner_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO project_members (project_id, user_id, role) VALUES ($1, $2, 'owner')")
            .bind(project.id)
            .bind(project.owner_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(project)
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {PROJECT_COLUMNS} FROM projects p WHERE p.id = $1");

        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateProject,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE projects AS p SET updated_at = NOW()");

        if let Some(name) = data.name {
            qb.push(", name = ").push_bind(name);
        }
        if let Some(description) = data.description {
            qb.push(", description = ").push_bind(description);
        }
        if let Some(status) = data.status {
            qb.push(", status = ").push_bind(status);
        }
        if let Some(priority) = data.priority {
            qb.push(", priority = ").push_bind(priority);
        }
        if let Some(start_date) = data.start_date {
            qb.push(", start_date = ").push_bind(start_date);
        }
        if let Some(due_date) = data.due_date {
            qb.push(", due_date = ").push_bind(due_date);
        }
        if let Some(is_public) = data.is_public {
            qb.push(", is_public = ").push_bind(is_public);
        }

        qb.push(" WHERE p.id = ").push_bind(id);
        qb.push(format!(" RETURNING {PROJECT_COLUMNS}"));

        qb.build_query_as::<Project>().fetch_optional(pool).await
    }

    /// Deletes the project; tasks, memberships and scoped tags cascade
    /// Deletes a project with its tasks and returns the attachments removed
    ///
    /// `None` when the project does not exist. Locks the project and its tasks
    /// first so concurrent uploads fail their foreign key instead of leaving
    /// files behind.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<Option<Vec<Attachment>>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM projects WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }
        sqlx::query("SELECT id FROM tasks WHERE project_id = $1 FOR UPDATE")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let attachments = Attachment::delete_owned(&mut tx, AttachmentOwner::Project(id)).await?;
        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(attachments))
    }

    /// Lists projects with task and member counters, newest first
    pub async fn list(
        pool: &PgPool,
        filter: &ProjectFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ProjectSummary>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            r#"
            SELECT {PROJECT_COLUMNS},
                   (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id) AS task_count,
                   (SELECT COUNT(*) FROM tasks t WHERE t.project_id = p.id AND t.status = 'completed') AS completed_task_count,
                   (SELECT COUNT(*) FROM project_members m WHERE m.project_id = p.id) AS member_count
            FROM projects p
            WHERE TRUE
            "#
        ));
        push_project_filter(&mut qb, filter);
        qb.push(" ORDER BY p.created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        qb.build_query_as::<ProjectSummary>().fetch_all(pool).await
    }

    pub async fn count(pool: &PgPool, filter: &ProjectFilter) -> Result<i64, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM projects p WHERE TRUE");
        push_project_filter(&mut qb, filter);

        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }
}

fn push_project_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProjectFilter) {
    if let Some(user_id) = filter.visible_to {
        qb.push(" AND (p.is_public OR p.owner_id = ")
            .push_bind(user_id)
            .push(" OR EXISTS (SELECT 1 FROM project_members m WHERE m.project_id = p.id AND m.user_id = ")
            .push_bind(user_id)
            .push("))");
    }
    if let Some(status) = filter.status {
        qb.push(" AND p.status = ").push_bind(status);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.push(" AND p.name ILIKE ")
            .push_bind(format!("%{}%", search.trim()));
    }
}
