/// Database models for TaskHub
///
/// Each model wraps parameterized SQL for its table plus the aggregate
/// queries the dashboard, calendar and stats endpoints need.
///
/// # Models
///
/// - `user`: Accounts, application roles and status
/// - `project`: Projects
/// - `project_member`: User ↔ project membership with per-project roles
/// - `task`: Tasks with status/priority enumerations and filters
/// - `tag`: Tags (project-scoped, personal or global) and task links
/// - `time_entry`: Timer and manual time entries plus period aggregates
/// - `comment`: Task comments
/// - `notification`: Per-user notifications
/// - `activity_log`: Best-effort activity trail
/// - `attachment`: Uploaded file metadata

use serde::{Deserialize, Deserializer, Serialize};

pub mod activity_log;
pub mod attachment;
pub mod comment;
pub mod notification;
pub mod project;
pub mod project_member;
pub mod tag;
pub mod task;
pub mod time_entry;
pub mod user;

/// Shared priority scale for projects and tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "priority_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::Low, Priority::Medium, Priority::High, Priority::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Deserializes a present field (including `null`) as `Some(..)`
///
/// Combine with `#[serde(default)]` so a missing field stays `None`:
/// `None` = leave unchanged, `Some(None)` = clear, `Some(Some(v))` = set.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Row shape for `GROUP BY <enum>` count queries
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct LabelCount {
    pub label: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        due_date: Option<Option<String>>,
    }

    #[test]
    fn test_double_option_distinguishes_missing_null_and_value() {
        let missing: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.due_date, None);

        let null: Patch = serde_json::from_str(r#"{"due_date": null}"#).unwrap();
        assert_eq!(null.due_date, Some(None));

        let set: Patch = serde_json::from_str(r#"{"due_date": "2025-01-01"}"#).unwrap();
        assert_eq!(set.due_date, Some(Some("2025-01-01".to_string())));
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!(Priority::parse("urgent"), Some(Priority::Urgent));
        assert_eq!(Priority::parse("critical"), None);
        assert_eq!(Priority::default(), Priority::Medium);
    }
}
