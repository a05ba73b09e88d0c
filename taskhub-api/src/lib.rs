//! # TaskHub API Server Library
//!
//! REST backend for multi-user task and project management.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration from the environment
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Request extractors with envelope rejections
//! - `middleware`: Authentication, CORS and security headers
//! - `response`: The uniform JSON envelope
//! - `routes`: API route handlers
//! - `upload`: Attachment validation and storage
//! - `validation`: Shared request validation rules

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod upload;
pub mod validation;
