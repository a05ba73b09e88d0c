/// Authorization rules
///
/// # Permission Model
///
/// 1. **Application role** ([`UserRole`]): admins can do everything, managers
///    read everything and may list users.
/// 2. **Project role** ([`ProjectRole`]): owners and managers administer a
///    project, members work on its tasks, viewers read.
/// 3. **Resource ownership**: creators and assignees of a task, authors of
///    comments, owners of time entries.
///
/// The `*_level` functions are pure and take everything they need as
/// arguments; the async `require_*` helpers load memberships and then apply
/// them.
///
/// # Example
///
/// ```no_run
/// use taskhub_shared::auth::authorization::{require_task, Access};
/// use taskhub_shared::auth::middleware::AuthContext;
/// use taskhub_shared::models::task::Task;
/// use sqlx::PgPool;
///
/// async fn can_edit(pool: &PgPool, auth: &AuthContext, task: &Task) -> bool {
///     require_task(pool, auth, task, Access::Write).await.is_ok()
/// }
/// ```

use sqlx::PgPool;

use super::middleware::AuthContext;
use crate::models::project::Project;
use crate::models::project_member::{ProjectMember, ProjectRole};
use crate::models::tag::{Tag, TagScope};
use crate::models::task::Task;
use crate::models::user::UserRole;

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Insufficient permissions: requires {required:?} role")]
    InsufficientRole { required: UserRole, actual: UserRole },

    #[error("Only administrators can manage global tags")]
    GlobalTagAdminOnly,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Access level on a project or task, ordered from least to most
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Access {
    None,
    Read,
    Write,
    Manage,
}

impl Access {
    pub fn allows(&self, needed: Access) -> bool {
        *self >= needed
    }
}

pub fn require_role(auth: &AuthContext, required: UserRole) -> Result<(), AuthzError> {
    if auth.role.has_permission(required) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRole {
            required,
            actual: auth.role,
        })
    }
}

/// The caller's access to `project` given their membership role
pub fn project_access_level(
    auth: &AuthContext,
    project: &Project,
    membership: Option<ProjectRole>,
) -> Access {
    if auth.is_admin() || project.owner_id == auth.user_id {
        return Access::Manage;
    }

    let from_membership = match membership {
        Some(role) if role.can_manage_project() => Access::Manage,
        Some(role) if role.can_edit_tasks() => Access::Write,
        Some(_) => Access::Read,
        None => Access::None,
    };

    let from_visibility = if project.is_public || auth.can_view_all() {
        Access::Read
    } else {
        Access::None
    };

    from_membership.max(from_visibility)
}

/// The caller's access to `task`, given their access to its project (if any)
///
/// Creators manage their tasks, assignees may edit them and managers may
/// edit any task.
pub fn task_access_level(auth: &AuthContext, task: &Task, project_access: Option<Access>) -> Access {
    if auth.is_admin() || task.created_by == auth.user_id {
        return Access::Manage;
    }

    let mut access = project_access.unwrap_or(Access::None);
    if task.assignee_id == Some(auth.user_id) || auth.can_view_all() {
        access = access.max(Access::Write);
    }

    access
}

/// Whether the caller may modify or delete `tag`
///
/// Global tags are admin-only, project tags need project management rights,
/// personal tags belong to their creator.
pub fn tag_modify_allowed(
    auth: &AuthContext,
    tag: &Tag,
    project_access: Option<Access>,
) -> Result<(), AuthzError> {
    if auth.is_admin() {
        return Ok(());
    }

    match tag.scope() {
        TagScope::Global => Err(AuthzError::GlobalTagAdminOnly),
        TagScope::Project(_) if project_access.is_some_and(|a| a.allows(Access::Manage)) => Ok(()),
        TagScope::Project(_) => Err(AuthzError::Forbidden(
            "Only project owners and managers can modify project tags",
        )),
        TagScope::Personal if tag.created_by == Some(auth.user_id) => Ok(()),
        TagScope::Personal => Err(AuthzError::Forbidden("You can only modify your own tags")),
    }
}

pub async fn project_access(
    pool: &PgPool,
    auth: &AuthContext,
    project: &Project,
) -> Result<Access, AuthzError> {
    let membership = ProjectMember::role_of(pool, project.id, auth.user_id).await?;
    Ok(project_access_level(auth, project, membership))
}

/// Fails with 403 unless the caller has at least `needed` on the project
pub async fn require_project(
    pool: &PgPool,
    auth: &AuthContext,
    project: &Project,
    needed: Access,
) -> Result<Access, AuthzError> {
    let access = project_access(pool, auth, project).await?;

    if access.allows(needed) {
        Ok(access)
    } else {
        Err(AuthzError::Forbidden(match needed {
            Access::Manage => "Only project owners and managers can do this",
            Access::Write => "You cannot modify this project",
            _ => "You do not have access to this project",
        }))
    }
}

pub async fn task_access(pool: &PgPool, auth: &AuthContext, task: &Task) -> Result<Access, AuthzError> {
    // Short-circuit before touching the database
    if auth.is_admin() || task.created_by == auth.user_id {
        return Ok(Access::Manage);
    }

    let project_access = match task.project_id {
        Some(project_id) => match Project::find_by_id(pool, project_id).await? {
            Some(project) => Some(project_access(pool, auth, &project).await?),
            None => None,
        },
        None => None,
    };

    Ok(task_access_level(auth, task, project_access))
}

/// Fails with 403 unless the caller has at least `needed` on the task
pub async fn require_task(
    pool: &PgPool,
    auth: &AuthContext,
    task: &Task,
    needed: Access,
) -> Result<Access, AuthzError> {
    let access = task_access(pool, auth, task).await?;

    if access.allows(needed) {
        Ok(access)
    } else {
        Err(AuthzError::Forbidden(match needed {
            Access::Manage => "Only the task creator or a project manager can do this",
            Access::Write => "You cannot modify this task",
            _ => "You do not have access to this task",
        }))
    }
}

/// Loads the tag's project access if needed and applies [`tag_modify_allowed`]
pub async fn require_tag_modify(pool: &PgPool, auth: &AuthContext, tag: &Tag) -> Result<(), AuthzError> {
    // Only project tags need the membership lookup
    let project_access = match tag.scope() {
        TagScope::Project(_) if auth.is_admin() => None,
        TagScope::Project(project_id) => match Project::find_by_id(pool, project_id).await? {
            Some(project) => Some(project_access(pool, auth, &project).await?),
            None => None,
        },
        _ => None,
    };

    tag_modify_allowed(auth, tag, project_access)
}
