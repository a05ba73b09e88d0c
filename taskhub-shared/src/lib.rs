//! # TaskHub Shared Library
//!
//! This crate contains the domain types, persistence and business rules used
//! by the TaskHub API server.
//!
//! ## Module Organization
//!
//! - `auth`: Token issuing, password hashing, request auth context, access rules
//! - `db`: Connection pool and embedded migrations
//! - `models`: Database models and their queries
//! - `timer`: Time-tracking state machine (start/pause/resume/stop)
//! - `pagination`: Page parameters clamped to configured bounds

pub mod auth;
pub mod db;
pub mod models;
pub mod pagination;
pub mod timer;

/// Current version of the TaskHub shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
