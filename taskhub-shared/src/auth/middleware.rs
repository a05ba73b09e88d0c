/// Request authentication context
///
/// The API's auth layer turns an `Authorization: Bearer <token>` header into
/// an [`AuthContext`] (via [`authenticate`]) and inserts it into the request
/// extensions. Handlers read it with `Extension<AuthContext>`.
///
/// # Example
///
/// ```
/// use axum::Extension;
/// use taskhub_shared::auth::middleware::AuthContext;
///
/// async fn handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("Hello, {}!", auth.username)
/// }
/// ```

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{validate_access_token, Claims, JwtError, TokenSettings};
use crate::models::user::UserRole;

/// The authenticated caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
}

impl AuthContext {
    pub fn from_claims(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Managers and admins read across all users
    pub fn can_view_all(&self) -> bool {
        self.role.can_view_all()
    }

    /// `None` for managers and admins, otherwise the caller's own id
    ///
    /// Used as the `visible_to` scope of list queries.
    pub fn visibility_scope(&self) -> Option<Uuid> {
        if self.can_view_all() {
            None
        } else {
            Some(self.user_id)
        }
    }
}

/// Why a request could not be authenticated
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingCredentials,

    #[error("Invalid authorization header: {0}")]
    InvalidFormat(&'static str),

    #[error(transparent)]
    InvalidToken(#[from] JwtError),
}

/// Extracts the bearer token from the `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("header is not valid ASCII"))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthError::InvalidFormat("expected 'Bearer <token>'"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidFormat("expected 'Bearer <token>'"));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidFormat("empty bearer token"));
    }

    Ok(token)
}

/// Validates the request's access token and builds the caller's context
pub fn authenticate(headers: &HeaderMap, settings: &TokenSettings) -> Result<AuthContext, AuthError> {
    let token = bearer_token(headers)?;
    let claims = validate_access_token(token, settings)?;

    Ok(AuthContext::from_claims(claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{create_token, TokenType};
    use axum::http::HeaderValue;

    fn settings() -> TokenSettings {
        TokenSettings::new("middleware-test-secret-32-bytes-long!", "taskhub")
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def")).unwrap(), "abc.def");
        assert_eq!(bearer_token(&headers_with("bearer abc")).unwrap(), "abc");

        assert!(matches!(
            bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingCredentials)
        ));
        assert!(matches!(
            bearer_token(&headers_with("Basic dXNlcjpwYXNz")),
            Err(AuthError::InvalidFormat(_))
        ));
        assert!(matches!(
            bearer_token(&headers_with("Bearer")),
            Err(AuthError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_authenticate_builds_context() {
        let settings = settings();
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, "mgr", UserRole::Manager, TokenType::Access, &settings);
        let token = create_token(&claims, &settings).unwrap();

        let auth = authenticate(&headers_with(&format!("Bearer {token}")), &settings).unwrap();
        assert_eq!(auth.user_id, user_id);
        assert_eq!(auth.username, "mgr");
        assert!(auth.can_view_all());
        assert_eq!(auth.visibility_scope(), None);
    }

    #[test]
    fn test_authenticate_rejects_refresh_token() {
        let settings = settings();
        let claims = Claims::new(Uuid::new_v4(), "jdoe", UserRole::User, TokenType::Refresh, &settings);
        let token = create_token(&claims, &settings).unwrap();

        assert!(matches!(
            authenticate(&headers_with(&format!("Bearer {token}")), &settings),
            Err(AuthError::InvalidToken(JwtError::WrongTokenType { .. }))
        ));
    }

    #[test]
    fn test_regular_user_scope_is_self() {
        let auth = AuthContext {
            user_id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            role: UserRole::User,
        };
        assert_eq!(auth.visibility_scope(), Some(auth.user_id));
        assert!(!auth.is_admin());
    }
}
