/// Request extractors whose rejections render as the standard envelope
///
/// Handlers use these instead of the plain axum extractors so that bad
/// paths, query strings and bodies produce `ApiError`s.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::StatusCode,
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize};
use taskhub_shared::pagination::{Page, PaginationLimits};
use validator::Validate;

use crate::error::ApiError;

/// `axum::extract::Path` with envelope rejections
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct Path<T>(pub T);

/// `axum::extract::Query` with envelope rejections
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct Query<T>(pub T);

/// JSON body that is also run through `validator`
///
/// Malformed JSON is a 400; well-formed JSON that fails deserialization or
/// validation is a 422 with a field map.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Optional validated JSON body
///
/// An empty (or all-whitespace) body is `None`. Anything else must parse as
/// `T`, whatever the `Content-Type`, and is rejected like [`ValidatedJson`].
#[derive(Debug)]
pub struct OptionalJson<T>(pub Option<T>);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::PayloadTooLarge("Request body is too large".to_string())
            } else {
                ApiError::BadRequest(rejection.body_text())
            }
        })?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJson(None));
        }

        let axum::Json(value) = axum::Json::<T>::from_bytes(&body)?;
        value.validate()?;
        Ok(OptionalJson(Some(value)))
    }
}

/// `?page=&per_page=` (or `limit=`) on list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    #[serde(alias = "limit")]
    pub per_page: Option<i64>,
}

impl PageQuery {
    pub fn resolve(&self, limits: &PaginationLimits) -> Page {
        Page::new(self.page, self.per_page, limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use axum::http::{header, Request as HttpRequest};
    use axum::body::Body;

    #[derive(Debug, Deserialize, Validate)]
    struct NewTag {
        #[validate(length(min = 1, max = 50, message = "Name must be 1-50 characters"))]
        name: String,
    }

    fn json_request(body: &'static str) -> Request {
        HttpRequest::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_body_passes() {
        let ValidatedJson(tag) = ValidatedJson::<NewTag>::from_request(json_request(r#"{"name":"bug"}"#), &())
            .await
            .unwrap();
        assert_eq!(tag.name, "bug");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let err = ValidatedJson::<NewTag>::from_request(json_request("{not json"), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_failed_validation_names_field() {
        let err = ValidatedJson::<NewTag>::from_request(json_request(r#"{"name":""}"#), &())
            .await
            .unwrap_err();

        match err {
            ApiError::Validation(fields) => assert!(fields.contains_key("name")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_wrong_shape_is_unprocessable() {
        let err = ValidatedJson::<NewTag>::from_request(json_request(r#"{"name": 5}"#), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[derive(Debug, Deserialize, Validate)]
    struct Target {
        entry_id: Option<uuid::Uuid>,
    }

    fn raw_request(body: &'static str) -> Request {
        HttpRequest::builder().method("POST").uri("/").body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_optional_body_empty_is_none() {
        for body in ["", "  \n"] {
            let OptionalJson(target) = OptionalJson::<Target>::from_request(raw_request(body), &())
                .await
                .unwrap();
            assert!(target.is_none());
        }
    }

    #[tokio::test]
    async fn test_optional_body_parses_without_content_type() {
        let OptionalJson(target) = OptionalJson::<Target>::from_request(
            raw_request(r#"{"entry_id":"6f1c0c5e-8f43-4a5e-9d55-2f4bb2d0c001"}"#),
            &(),
        )
        .await
        .unwrap();
        assert!(target.unwrap().entry_id.is_some());
    }

    #[tokio::test]
    async fn test_optional_body_rejects_bad_values() {
        let err = OptionalJson::<Target>::from_request(json_request(r#"{"entry_id":"bad"}"#), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = OptionalJson::<Target>::from_request(raw_request("{oops"), &())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_page_query_resolves_with_limits() {
        let limits = PaginationLimits::default();
        let page = PageQuery { page: Some(0), per_page: Some(1000) }.resolve(&limits);
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, limits.max_limit);
    }
}
