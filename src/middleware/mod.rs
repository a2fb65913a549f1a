//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests
//! - Enforce platform roles
//! - Short-circuit requests (reject unauthorized)

/// Session authentication and admin guard
pub mod auth;
