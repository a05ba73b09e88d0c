/// Uniform response envelope
///
/// Every endpoint, successful or not, answers with:
///
/// ```json
/// {
///   "success": true,
///   "message": "Task created",
///   "data": { ... },
///   "errors": { "field": ["..."] },
///   "pagination": { "page": 1, "per_page": 20, "total": 42, "total_pages": 3 },
///   "timestamp": "2025-01-01T00:00:00Z"
/// }
/// ```
///
/// `data`, `errors` and `pagination` are omitted when absent.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use taskhub_shared::pagination::PageMeta;

/// Field name → messages, as returned with 422
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageMeta>,

    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> Envelope<T> {
    fn new(success: bool, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success,
            message: message.into(),
            data,
            errors: None,
            pagination: None,
            timestamp: Utc::now(),
        }
    }
}

impl Envelope<()> {
    /// Failure envelope, used by `ApiError`
    pub fn failure(message: impl Into<String>, errors: Option<FieldErrors>) -> Self {
        Self {
            errors,
            ..Self::new(false, message, None)
        }
    }
}

/// Successful response: a status code plus an envelope
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    status: StatusCode,
    envelope: Envelope<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 with data
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::OK,
            envelope: Envelope::new(true, message, Some(data)),
        }
    }

    /// 201 with the created resource
    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            envelope: Envelope::new(true, message, Some(data)),
        }
    }

    /// 200 with one page of results
    pub fn paginated(message: impl Into<String>, data: T, meta: PageMeta) -> Self {
        let mut envelope = Envelope::new(true, message, Some(data));
        envelope.pagination = Some(meta);

        Self {
            status: StatusCode::OK,
            envelope,
        }
    }
}

impl ApiResponse<()> {
    /// 200 with a message and no data
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            envelope: Envelope::new(true, message, None),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn to_json<T: Serialize>(envelope: &Envelope<T>) -> Value {
        serde_json::to_value(envelope).unwrap()
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let response = ApiResponse::message("Logged out");
        let json = to_json(&response.envelope);

        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Logged out");
        assert!(json.get("data").is_none());
        assert!(json.get("errors").is_none());
        assert!(json.get("pagination").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_paginated_envelope() {
        let meta = PageMeta {
            page: 2,
            per_page: 20,
            total: 42,
            total_pages: 3,
        };
        let response = ApiResponse::paginated("Tasks", vec![1, 2], meta);

        assert_eq!(response.status, StatusCode::OK);
        let json = to_json(&response.envelope);
        assert_eq!(json["data"], json!([1, 2]));
        assert_eq!(json["pagination"], json!({"page": 2, "per_page": 20, "total": 42, "total_pages": 3}));
    }

    #[test]
    fn test_created_status() {
        let response = ApiResponse::created("Tag created", json!({"id": 1}));
        assert_eq!(response.status, StatusCode::CREATED);
    }

    #[test]
    fn test_failure_envelope() {
        let mut errors = FieldErrors::new();
        errors.insert("status".to_string(), vec!["Invalid status".to_string()]);

        let json = to_json(&Envelope::failure("Validation failed", Some(errors)));
        assert_eq!(json["success"], false);
        assert_eq!(json["errors"]["status"][0], "Invalid status");
        assert!(json.get("data").is_none());
    }
}
