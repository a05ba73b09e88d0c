/// Bearer-token authentication layer
///
/// Rejects the request with 401 unless it carries a valid access token, then
/// inserts the caller's [`AuthContext`] into the request extensions.
///
/// Every failure (missing header, wrong scheme, bad signature, expired token,
/// refresh token used as access token) gets the same 401 body.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use taskhub_shared::auth::middleware::{authenticate, AuthContext};

use crate::{app::AppState, error::ApiError};

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth: AuthContext = authenticate(req.headers(), &state.tokens)?;

    tracing::debug!(user_id = %auth.user_id, role = auth.role.as_str(), "Authenticated request");
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}
