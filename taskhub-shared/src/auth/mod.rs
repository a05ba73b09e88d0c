/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength rules
/// - [`jwt`]: Access/refresh token issuing and validation
/// - [`middleware`]: Bearer-token parsing and the request [`middleware::AuthContext`]
/// - [`authorization`]: Role hierarchy and project/task/tag access rules
///
/// # Example
///
/// ```no_run
/// use taskhub_shared::auth::password::{hash_password, verify_password};
/// use taskhub_shared::auth::jwt::{issue_token_pair, TokenSettings};
/// use taskhub_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("s3cret-pass")?;
/// assert!(verify_password("s3cret-pass", &hash)?);
///
/// let settings = TokenSettings::new("at-least-thirty-two-bytes-of-secret!", "taskhub");
/// let tokens = issue_token_pair(Uuid::new_v4(), "jdoe", UserRole::User, &settings)?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
