/// CORS policy from `CORS_ALLOWED_ORIGINS`
///
/// `*` gives a permissive policy for local development. Otherwise only the
/// listed origins are allowed, with credentials.

use axum::http::{header, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::CorsLayer;

use crate::config::ApiConfig;

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(3600);

pub fn cors_layer(api: &ApiConfig) -> CorsLayer {
    if api.cors_is_permissive() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = api
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(PREFLIGHT_MAX_AGE)
}
