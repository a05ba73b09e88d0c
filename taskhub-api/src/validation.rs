/// Custom `validator` rules shared by the request types
///
/// Enumerated fields arrive as strings and are checked here so a bad value
/// becomes a 422 naming the field rather than a deserialization error.

use std::borrow::Cow;
use taskhub_shared::{
    auth::password::password_problems,
    models::{
        project::ProjectStatus,
        project_member::ProjectRole,
        tag::is_valid_color,
        task::TaskStatus,
        user::{UserRole, UserStatus},
        Priority,
    },
};
use validator::ValidationError;

use crate::error::{ApiError, ApiResult};

fn invalid(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Owned(message))
}

fn choice(ok: bool, allowed: &[&str]) -> Result<(), ValidationError> {
    if ok {
        Ok(())
    } else {
        Err(invalid("invalid_choice", format!("Must be one of: {}", allowed.join(", "))))
    }
}

pub fn task_status(value: &str) -> Result<(), ValidationError> {
    choice(TaskStatus::parse(value).is_some(), &TaskStatus::ALL.map(|s| s.as_str()))
}

pub fn priority(value: &str) -> Result<(), ValidationError> {
    choice(Priority::parse(value).is_some(), &Priority::ALL.map(|p| p.as_str()))
}

pub fn project_status(value: &str) -> Result<(), ValidationError> {
    choice(ProjectStatus::parse(value).is_some(), &ProjectStatus::ALL.map(|s| s.as_str()))
}

pub fn project_role(value: &str) -> Result<(), ValidationError> {
    // Ownership moves only through project creation
    let ok = ProjectRole::parse(value).is_some_and(|r| r != ProjectRole::Owner);
    choice(ok, &["manager", "member", "viewer"])
}

pub fn user_role(value: &str) -> Result<(), ValidationError> {
    choice(UserRole::parse(value).is_some(), &UserRole::ALL.map(|r| r.as_str()))
}

pub fn user_status(value: &str) -> Result<(), ValidationError> {
    choice(UserStatus::parse(value).is_some(), &UserStatus::ALL.map(|s| s.as_str()))
}

pub fn color(value: &str) -> Result<(), ValidationError> {
    if is_valid_color(value) {
        Ok(())
    } else {
        Err(invalid("invalid_color", "Color must be a hex value like #1A2B3C".to_string()))
    }
}

/// Letters, digits, `_`, `-` and `.`
pub fn username(value: &str) -> Result<(), ValidationError> {
    let ok = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if ok {
        Ok(())
    } else {
        Err(invalid(
            "invalid_username",
            "Username may only contain letters, digits, '_', '-' and '.'".to_string(),
        ))
    }
}

pub fn password(value: &str) -> Result<(), ValidationError> {
    match password_problems(value).first() {
        None => Ok(()),
        Some(problem) => Err(invalid("weak_password", problem.to_string())),
    }
}

/// Parses an enumerated query parameter, 422 on an unknown value
pub fn parse_query<T>(
    field: &str,
    value: Option<&str>,
    parse: impl Fn(&str) -> Option<T>,
) -> ApiResult<Option<T>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => parse(raw)
            .map(Some)
            .ok_or_else(|| ApiError::field(field, format!("Invalid value '{raw}'"))),
    }
}

/// Converts a string already checked by one of the rules above
pub fn checked<T>(field: &str, value: &str, parse: impl Fn(&str) -> Option<T>) -> ApiResult<T> {
    parse(value).ok_or_else(|| ApiError::field(field, format!("Invalid value '{value}'")))
}

/// Rejects `due_date` before `start_date`
pub fn date_order(
    start: Option<chrono::NaiveDate>,
    due: Option<chrono::NaiveDate>,
) -> ApiResult<()> {
    match (start, due) {
        (Some(start), Some(due)) if due < start => {
            Err(ApiError::field("due_date", "Due date cannot be before the start date"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_enumerated_rules() {
        assert!(task_status("in_progress").is_ok());
        assert!(task_status("done").is_err());
        assert!(priority("urgent").is_ok());
        assert!(priority("critical").is_err());
        assert!(project_status("on_hold").is_ok());
        assert!(project_role("viewer").is_ok());
        assert!(project_role("owner").is_err());
        assert!(user_role("manager").is_ok());
        assert!(user_status("banned").is_err());
    }

    #[test]
    fn test_invalid_choice_lists_allowed_values() {
        let err = priority("critical").unwrap_err();
        assert_eq!(err.message.unwrap(), "Must be one of: low, medium, high, urgent");
    }

    #[test]
    fn test_username_and_password_rules() {
        assert!(username("j.doe-42_x").is_ok());
        assert!(username("john doe").is_err());
        assert!(password("hunter22a").is_ok());
        assert!(password("short1").is_err());
        assert!(password("nodigitshere").is_err());
    }

    #[test]
    fn test_parse_query() {
        let parsed = parse_query("status", Some("pending"), TaskStatus::parse).unwrap();
        assert_eq!(parsed, Some(TaskStatus::Pending));
        assert_eq!(parse_query("status", Some(" "), TaskStatus::parse).unwrap(), None);

        match parse_query("status", Some("bogus"), TaskStatus::parse) {
            Err(ApiError::Validation(fields)) => assert!(fields.contains_key("status")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_date_order() {
        let jan = NaiveDate::from_ymd_opt(2025, 1, 1);
        let feb = NaiveDate::from_ymd_opt(2025, 2, 1);

        assert!(date_order(jan, feb).is_ok());
        assert!(date_order(None, jan).is_ok());
        assert!(date_order(feb, jan).is_err());
    }
}
