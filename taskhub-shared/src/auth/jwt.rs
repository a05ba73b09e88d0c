/// JWT token generation and validation module
///
/// Tokens are signed with HS256 and carry the user's id, username and
/// application role, so the auth middleware can build an
/// [`AuthContext`](super::middleware::AuthContext) without a database round trip.
///
/// # Token Types
///
/// - **Access Token**: Short-lived (default 24h), sent as `Authorization: Bearer`
/// - **Refresh Token**: Long-lived (default 30d), only accepted by `/api/auth/refresh`
///
/// Validation checks signature, expiry, `nbf`, issuer and the token type.
///
/// # Example
///
/// ```
/// use taskhub_shared::auth::jwt::{issue_token_pair, validate_access_token, TokenSettings};
/// use taskhub_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = TokenSettings::new("a-secret-of-at-least-thirty-two-bytes!!", "taskhub");
/// let user_id = Uuid::new_v4();
///
/// let pair = issue_token_pair(user_id, "jdoe", UserRole::User, &settings)?;
/// let claims = validate_access_token(&pair.access_token, &settings)?;
/// assert_eq!(claims.sub, user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::UserRole;

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Signed by us, but for another issuer
    #[error("Invalid token issuer")]
    InvalidIssuer,

    /// Bad signature, malformed token or unreadable claims
    #[error("Invalid token: {0}")]
    Invalid(String),

    /// A refresh token where an access token was expected, or vice versa
    #[error("Expected {expected} token, got {actual} token")]
    WrongTokenType {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Token type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// Signing secret, issuer and token lifetimes
#[derive(Clone)]
pub struct TokenSettings {
    secret: String,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl TokenSettings {
    /// Settings with the default lifetimes (24h access, 30d refresh)
    pub fn new(secret: impl Into<String>, issuer: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
            access_ttl: Duration::hours(24),
            refresh_ttl: Duration::days(30),
        }
    }

    pub fn with_lifetimes(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn ttl(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        }
    }
}

/// JWT claims
///
/// Standard claims (`sub`, `iss`, `iat`, `exp`, `nbf`) plus `username`,
/// `role` and `token_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    pub username: String,
    pub role: UserRole,
    pub token_type: TokenType,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
}

impl Claims {
    /// Claims expiring after the configured lifetime for `token_type`
    pub fn new(
        user_id: Uuid,
        username: impl Into<String>,
        role: UserRole,
        token_type: TokenType,
        settings: &TokenSettings,
    ) -> Self {
        Self::with_expiration(
            user_id,
            username,
            role,
            token_type,
            &settings.issuer,
            settings.ttl(token_type),
        )
    }

    pub fn with_expiration(
        user_id: Uuid,
        username: impl Into<String>,
        role: UserRole,
        token_type: TokenType,
        issuer: &str,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            username: username.into(),
            role,
            token_type,
            iss: issuer.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Access + refresh tokens returned by login, register and refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Always "Bearer"
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

pub fn create_token(claims: &Claims, settings: &TokenSettings) -> Result<String, JwtError> {
    let key = EncodingKey::from_secret(settings.secret.as_bytes());

    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Verifies signature, expiry, `nbf` and issuer, then returns the claims
pub fn validate_token(token: &str, settings: &TokenSettings) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(settings.secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[settings.issuer.as_str()]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
            _ => JwtError::Invalid(e.to_string()),
        })
}

fn expect_type(claims: Claims, expected: TokenType) -> Result<Claims, JwtError> {
    if claims.token_type == expected {
        Ok(claims)
    } else {
        Err(JwtError::WrongTokenType {
            expected: expected.as_str(),
            actual: claims.token_type.as_str(),
        })
    }
}

pub fn validate_access_token(token: &str, settings: &TokenSettings) -> Result<Claims, JwtError> {
    expect_type(validate_token(token, settings)?, TokenType::Access)
}

pub fn validate_refresh_token(token: &str, settings: &TokenSettings) -> Result<Claims, JwtError> {
    expect_type(validate_token(token, settings)?, TokenType::Refresh)
}

/// Signs a fresh access/refresh pair for the user
pub fn issue_token_pair(
    user_id: Uuid,
    username: &str,
    role: UserRole,
    settings: &TokenSettings,
) -> Result<TokenPair, JwtError> {
    let access = Claims::new(user_id, username, role, TokenType::Access, settings);
    let refresh = Claims::new(user_id, username, role, TokenType::Refresh, settings);

    Ok(TokenPair {
        access_token: create_token(&access, settings)?,
        refresh_token: create_token(&refresh, settings)?,
        token_type: "Bearer",
        expires_in: settings.access_ttl.num_seconds(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn settings() -> TokenSettings {
        TokenSettings::new(SECRET, "taskhub")
    }

    #[test]
    fn test_default_lifetimes() {
        let settings = settings();
        assert_eq!(settings.ttl(TokenType::Access), Duration::hours(24));
        assert_eq!(settings.ttl(TokenType::Refresh), Duration::days(30));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", settings());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(SECRET));
    }

    #[test]
    fn test_create_and_validate_token() {
        let settings = settings();
        let user_id = Uuid::new_v4();

        let claims = Claims::new(user_id, "jdoe", UserRole::Manager, TokenType::Access, &settings);
        let token = create_token(&claims, &settings).expect("Should create token");

        let validated = validate_token(&token, &settings).expect("Should validate token");
        assert_eq!(validated.sub, user_id);
        assert_eq!(validated.username, "jdoe");
        assert_eq!(validated.role, UserRole::Manager);
        assert_eq!(validated.iss, "taskhub");
    }

    #[test]
    fn test_validate_with_wrong_secret() {
        let claims = Claims::new(Uuid::new_v4(), "jdoe", UserRole::User, TokenType::Access, &settings());
        let token = create_token(&claims, &settings()).unwrap();

        let other = TokenSettings::new("another-secret-that-is-also-32-bytes!", "taskhub");
        assert!(matches!(validate_token(&token, &other), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn test_validate_wrong_issuer() {
        let claims = Claims::new(Uuid::new_v4(), "jdoe", UserRole::User, TokenType::Access, &settings());
        let token = create_token(&claims, &settings()).unwrap();

        let other = TokenSettings::new(SECRET, "someone-else");
        assert!(matches!(validate_token(&token, &other), Err(JwtError::InvalidIssuer)));
    }

    #[test]
    fn test_validate_expired_token() {
        let claims = Claims::with_expiration(
            Uuid::new_v4(),
            "jdoe",
            UserRole::User,
            TokenType::Access,
            "taskhub",
            Duration::seconds(-3600),
        );
        assert!(claims.is_expired());

        let token = create_token(&claims, &settings()).unwrap();
        assert!(matches!(validate_token(&token, &settings()), Err(JwtError::Expired)));
    }

    #[test]
    fn test_malformed_token() {
        assert!(matches!(
            validate_access_token("not.a.jwt", &settings()),
            Err(JwtError::Invalid(_))
        ));
    }

    #[test]
    fn test_token_type_is_enforced() {
        let settings = settings();
        let pair = issue_token_pair(Uuid::new_v4(), "jdoe", UserRole::User, &settings).unwrap();

        assert!(validate_access_token(&pair.access_token, &settings).is_ok());
        assert!(validate_refresh_token(&pair.refresh_token, &settings).is_ok());
        assert!(matches!(
            validate_access_token(&pair.refresh_token, &settings),
            Err(JwtError::WrongTokenType { expected: "access", actual: "refresh" })
        ));
        assert!(validate_refresh_token(&pair.access_token, &settings).is_err());
    }

    #[test]
    fn test_token_pair_metadata() {
        let settings = settings().with_lifetimes(Duration::hours(2), Duration::days(7));
        let pair = issue_token_pair(Uuid::new_v4(), "jdoe", UserRole::Admin, &settings).unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 7200);
    }
}
