//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Checks the caller's access to the organization that owns the resource
//! 3. Returns the response wrapped in the `{"success": true, "data": ...}` envelope
pub mod admin;
/// Sign-up, sign-in and session endpoints
pub mod auth;
pub mod briefs;
pub mod calendar;
pub mod credits;
pub mod drafts;
pub mod exports;
pub mod health;
pub mod keywords;
pub mod links;
pub mod partners;
pub mod projects;
/// Checkout and payment webhook
pub mod stripe;
