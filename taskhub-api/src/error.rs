/// Error handling for the API server
///
/// All handlers return `ApiResult<T>`. Every error renders as the standard
/// failure envelope (`success: false`) with the matching status code.
///
/// # Example
///
/// ```no_run
/// use taskhub_api::error::{ApiError, ApiResult};
/// use taskhub_api::response::ApiResponse;
///
/// async fn handler() -> ApiResult<ApiResponse<u32>> {
///     let answer = Some(42).ok_or_else(|| ApiError::NotFound("Nothing here".into()))?;
///     Ok(ApiResponse::ok("Found it", answer))
/// }
/// ```

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use taskhub_shared::{
    auth::{
        authorization::AuthzError,
        jwt::JwtError,
        middleware::AuthError,
        password::PasswordError,
    },
    models::time_entry::TrackingError,
    timer::TimerError,
};

use crate::response::{Envelope, FieldErrors};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// The one message every authentication failure gets
pub const UNAUTHORIZED_MESSAGE: &str = "Invalid or missing authentication token";

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request (400)
    BadRequest(String),

    /// Missing or bad credentials (401)
    Unauthorized(String),

    /// Authenticated but not allowed (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Duplicate or state conflict (409)
    Conflict(String),

    /// Request body or upload too large (413)
    PayloadTooLarge(String),

    /// Field-level validation failures (422)
    Validation(FieldErrors),

    /// Internal server error (500); the detail is logged, never returned
    Internal(String),
}

impl ApiError {
    /// 422 for a single field
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(errors)
    }

    pub fn unauthorized() -> Self {
        ApiError::Unauthorized(UNAUTHORIZED_MESSAGE.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            ApiError::Validation(errors) => {
                let fields: Vec<&str> = errors.keys().map(String::as_str).collect();
                write!(f, "Validation failed: {}", fields.join(", "))
            }
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let envelope = match self {
            ApiError::Validation(errors) => Envelope::failure("Validation failed", Some(errors)),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal server error");
                Envelope::failure("Internal server error", None)
            }
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg) => Envelope::failure(msg, None),
        };

        (status, Json(envelope)).into_response()
    }
}

/// Friendly conflict message for the named unique constraints
fn unique_violation_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_username_key") => "Username is already taken",
        Some("users_email_key") => "Email is already registered",
        Some("uq_tags_name_scope") => "A tag with this name already exists",
        Some("project_members_pkey") => "User is already a member of this project",
        Some("uq_time_entries_active_timer") => "A timer is already running",
        _ => "Resource already exists",
    }
}

/// Foreign keys whose violation means the client referenced a missing row
fn foreign_key_field(constraint: Option<&str>) -> Option<&'static str> {
    match constraint {
        Some("tasks_project_id_fkey") | Some("time_entries_project_id_fkey") => Some("project_id"),
        Some("tasks_assignee_id_fkey") => Some("assignee_id"),
        Some("time_entries_task_id_fkey") => Some("task_id"),
        Some("project_members_user_id_fkey") => Some("user_id"),
        Some("tags_project_id_fkey") => Some("project_id"),
        _ => None,
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint();

                match db_err.code().as_deref() {
                    // unique_violation
                    Some("23505") => ApiError::Conflict(unique_violation_message(constraint).to_string()),
                    // foreign_key_violation
                    Some("23503") => match foreign_key_field(constraint) {
                        Some(field) => ApiError::field(field, format!("Referenced {field} does not exist")),
                        None => ApiError::Conflict("Resource is still referenced".to_string()),
                    },
                    // check_violation
                    Some("23514") => ApiError::BadRequest(format!(
                        "Value violates constraint {}",
                        constraint.unwrap_or("unknown")
                    )),
                    _ => ApiError::Internal(format!("Database error: {}", err)),
                }
            }
            _ => ApiError::Internal(format!("Database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields = FieldErrors::new();

        for (field, failures) in errors.field_errors() {
            let messages = failures
                .iter()
                .map(|failure| match &failure.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid ({})", field, failure.code),
                })
                .collect();
            fields.insert(field.to_string(), messages);
        }

        ApiError::Validation(fields)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            // Well-formed JSON with the wrong shape: wrong types, missing fields, unknown enum values
            JsonRejection::JsonDataError(err) => ApiError::field("body", err.body_text()),
            rejection if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ApiError::PayloadTooLarge("Request body is too large".to_string())
            }
            rejection => ApiError::BadRequest(rejection.body_text()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("Upload is too large".to_string())
        } else {
            ApiError::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(format!("I/O error: {}", err))
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        tracing::debug!(error = %err, "Authentication failed");
        ApiError::unauthorized()
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => ApiError::Internal(format!("Token creation failed: {}", msg)),
            other => {
                tracing::debug!(error = %other, "Token rejected");
                ApiError::unauthorized()
            }
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::DatabaseError(db_err) => db_err.into(),
            other => ApiError::Forbidden(other.to_string()),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(format!("Password error: {}", err))
    }
}

impl From<TimerError> for ApiError {
    fn from(err: TimerError) -> Self {
        let message = err.to_string();
        match err {
            TimerError::AlreadyActive
            | TimerError::AlreadyPaused
            | TimerError::NotPaused
            | TimerError::AlreadyStopped
            | TimerError::EntryRunning => ApiError::Conflict(message),
            TimerError::NoActiveTimer | TimerError::EntryNotFound => ApiError::NotFound(message),
            TimerError::NotOwner => ApiError::Forbidden(message),
        }
    }
}

impl From<TrackingError> for ApiError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::Timer(timer) => timer.into(),
            TrackingError::Database(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Signup {
        #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
        username: String,
        #[validate(email)]
        email: String,
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized().status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::PayloadTooLarge("x".into()).status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ApiError::field("title", "required").status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_display() {
        assert_eq!(ApiError::NotFound("Task not found".into()).to_string(), "Not found: Task not found");
        assert_eq!(
            ApiError::field("status", "bad").to_string(),
            "Validation failed: status"
        );
    }

    #[test]
    fn test_validation_errors_become_field_map() {
        let signup = Signup {
            username: "ab".to_string(),
            email: "not-an-email".to_string(),
        };

        let ApiError::Validation(fields) = ApiError::from(signup.validate().unwrap_err()) else {
            panic!("expected validation error");
        };

        assert_eq!(fields["username"], vec!["Username must be at least 3 characters".to_string()]);
        assert_eq!(fields["email"], vec!["email is invalid (email)".to_string()]);
    }

    #[test]
    fn test_timer_errors_map_to_statuses() {
        assert_eq!(ApiError::from(TimerError::AlreadyActive).status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(TimerError::NotPaused).status_code(), StatusCode::CONFLICT);
        assert_eq!(ApiError::from(TimerError::NoActiveTimer).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(TimerError::NotOwner).status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_token_errors_are_uniform() {
        for err in [
            ApiError::from(JwtError::Expired),
            ApiError::from(JwtError::InvalidIssuer),
            ApiError::from(AuthError::MissingCredentials),
            ApiError::from(AuthError::InvalidFormat("expected 'Bearer <token>'")),
        ] {
            match err {
                ApiError::Unauthorized(msg) => assert_eq!(msg, UNAUTHORIZED_MESSAGE),
                other => panic!("expected 401, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_authz_errors_are_forbidden() {
        let err = ApiError::from(AuthzError::GlobalTagAdminOnly);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Forbidden: Only administrators can manage global tags");
    }

    #[test]
    fn test_row_not_found_is_404() {
        assert_eq!(ApiError::from(sqlx::Error::RowNotFound).status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unique_violation_messages() {
        assert_eq!(unique_violation_message(Some("users_email_key")), "Email is already registered");
        assert_eq!(unique_violation_message(None), "Resource already exists");
        assert_eq!(foreign_key_field(Some("tasks_assignee_id_fkey")), Some("assignee_id"));
    }
}
