/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /api/auth/register` - Create an account and get tokens
/// - `POST /api/auth/login` - Log in by username or email
/// - `POST /api/auth/refresh` - Exchange a refresh token for a new pair
/// - `GET  /api/auth/me` - Current user (authenticated)
/// - `PUT  /api/auth/password` - Change password (authenticated)
/// - `POST /api/auth/logout` - Stateless acknowledgement (authenticated)
///
/// Tokens are stateless: logout only tells the client to drop them.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ValidatedJson,
    response::ApiResponse,
    validation,
};
use axum::{extract::State, Extension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use taskhub_shared::{
    auth::{
        jwt::{self, TokenPair},
        middleware::AuthContext,
        password,
    },
    models::{
        activity_log::ActivityLog,
        user::{CreateUser, UpdateUser, User, UserRole},
    },
};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(min = 3, max = 50, message = "Username must be 3-50 characters"),
        custom(function = "validation::username")
    )]
    pub username: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(custom(function = "validation::password"))]
    pub password: String,

    #[validate(length(max = 100, message = "First name must be at most 100 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 100, message = "Last name must be at most 100 characters"))]
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Username or email
    #[serde(alias = "username", alias = "email")]
    #[validate(length(min = 1, message = "Username or email is required"))]
    pub login: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(custom(function = "validation::password"))]
    pub new_password: String,
}

/// User plus a fresh token pair
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Argon2 is CPU-bound; keep it off the async workers
pub(crate) async fn hash_password(plain: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| ApiError::Internal(format!("Password hashing task failed: {e}")))?
        .map_err(ApiError::from)
}

pub(crate) async fn verify_password(plain: String, hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("Password verification task failed: {e}")))?
        .map_err(ApiError::from)
}

fn issue_tokens(state: &AppState, user: &User) -> ApiResult<TokenPair> {
    Ok(jwt::issue_token_pair(user.id, &user.username, user.role, &state.tokens)?)
}

/// Register a new account
///
/// New accounts always get the `user` role.
///
/// # Errors
///
/// - `422`: Validation failed (username format, email, weak password)
/// - `409`: Username or email already registered
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> ApiResult<ApiResponse<AuthResponse>> {
    let password_hash = hash_password(req.password).await?;

    let user = User::create(
        &state.db,
        CreateUser {
            username: req.username.trim().to_string(),
            email: req.email.trim().to_string(),
            password_hash,
            first_name: req.first_name,
            last_name: req.last_name,
            role: UserRole::User,
        },
    )
    .await?;

    let tokens = issue_tokens(&state, &user)?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");
    ActivityLog::record(&state.db, user.id, "register", "user", user.id, None).await;

    Ok(ApiResponse::created("Registration successful", AuthResponse { user, tokens }))
}

/// Log in with username or email
///
/// Unknown logins and wrong passwords get the same 401. Inactive or
/// suspended accounts get 403.
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> ApiResult<ApiResponse<AuthResponse>> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let user = User::find_by_login(&state.db, req.login.trim())
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(req.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = %user.id, "Failed login attempt");
        return Err(invalid());
    }

    if !user.is_active() {
        return Err(ApiError::Forbidden(format!("Account is {}", user.status.as_str())));
    }

    User::update_last_login(&state.db, user.id).await?;
    let tokens = issue_tokens(&state, &user)?;

    tracing::info!(user_id = %user.id, "User logged in");
    ActivityLog::record(&state.db, user.id, "login", "user", user.id, None).await;

    Ok(ApiResponse::ok("Login successful", AuthResponse { user, tokens }))
}

/// Exchange a refresh token for a new token pair
///
/// The user is re-read so role changes and deactivation take effect.
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> ApiResult<ApiResponse<AuthResponse>> {
    let claims = jwt::validate_refresh_token(&req.refresh_token, &state.tokens)?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(ApiError::unauthorized)?;

    if !user.is_active() {
        return Err(ApiError::unauthorized());
    }

    let tokens = issue_tokens(&state, &user)?;
    Ok(ApiResponse::ok("Token refreshed", AuthResponse { user, tokens }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<User>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok("Current user", user))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> ApiResult<ApiResponse<()>> {
    if req.current_password == req.new_password {
        return Err(ApiError::field(
            "new_password",
            "New password must differ from the current password",
        ));
    }

    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !verify_password(req.current_password, user.password_hash.clone()).await? {
        return Err(ApiError::field("current_password", "Current password is incorrect"));
    }

    let password_hash = hash_password(req.new_password).await?;
    User::update(
        &state.db,
        user.id,
        UpdateUser {
            password_hash: Some(password_hash),
            ..Default::default()
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "Password changed");
    ActivityLog::record(&state.db, user.id, "change_password", "user", user.id, None).await;

    Ok(ApiResponse::message("Password changed"))
}

pub async fn logout(Extension(auth): Extension<AuthContext>) -> ApiResponse<serde_json::Value> {
    tracing::debug!(user_id = %auth.user_id, "Logout");
    ApiResponse::ok("Logged out", json!({ "user_id": auth.user_id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_accepts_username_or_email_key() {
        let by_username: LoginRequest =
            serde_json::from_str(r#"{"username": "jdoe", "password": "x"}"#).unwrap();
        let by_email: LoginRequest =
            serde_json::from_str(r#"{"email": "jdoe@example.com", "password": "x"}"#).unwrap();

        assert_eq!(by_username.login, "jdoe");
        assert_eq!(by_email.login, "jdoe@example.com");
    }

    #[test]
    fn test_register_validation() {
        let req = RegisterRequest {
            username: "jd".to_string(),
            email: "jdoe@example.com".to_string(),
            password: "password".to_string(),
            first_name: None,
            last_name: None,
        };

        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("password"));
        assert!(!fields.contains_key("email"));
    }

    #[tokio::test]
    async fn test_hash_then_verify_off_thread() {
        let hash = hash_password("s3cret-pass".to_string()).await.unwrap();

        assert!(verify_password("s3cret-pass".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong-pass1".to_string(), hash).await.unwrap());
    }
}
