//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables, plus the
//! request and response bodies of the HTTP API.

pub mod activity;
pub mod brief;
pub mod calendar;
pub mod credit;
pub mod draft;
pub mod export;
pub mod keyword;
pub mod link;
/// Organizations and membership roles
pub mod organization;
pub mod partner;
pub mod project;
/// Success envelope and paging helpers
pub mod response;
/// Users, platform roles and sessions
pub mod user;
