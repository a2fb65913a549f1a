//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They handle database transactions, validation, and calls to third-party APIs.

pub mod access;
pub mod activity_log;
pub mod ai_provider;
pub mod content_generator;
pub mod credit_service;
pub mod export_service;
pub mod identity_service;
pub mod link_suggester;
pub mod seo_scoring;
pub mod stripe_service;
