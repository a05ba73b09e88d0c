/// HTTP middleware for the API server
///
/// - [`auth`]: bearer-token authentication
/// - [`cors`]: CORS policy from configuration
/// - [`security`]: security response headers

pub mod auth;
pub mod cors;
pub mod security;
