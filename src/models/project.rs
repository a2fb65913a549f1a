//! Project data models and API request/response types.
//!
//! A project is one site or niche inside an organization. Keywords, briefs, drafts,
//! calendar items and exports all hang off a project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a project record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Project {
    pub id: Uuid,

    /// Owning organization
    pub org_id: Uuid,

    pub name: String,

    pub niche: Option<String>,

    /// BCP 47 locale, `en-US` unless set
    pub locale: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Per-project writing settings used to steer AI generation.
///
/// # Database Table
///
/// Maps to `project_settings`, keyed by `project_id`. Every project gets a row on creation.
#[derive(Debug, Clone, Default, sqlx::FromRow, Serialize)]
pub struct ProjectSettings {
    pub project_id: Uuid,
    pub site_name: Option<String>,
    pub target_domain: Option<String>,

    /// Writing tone, e.g. "friendly" or "authoritative"
    pub tone: Option<String>,

    pub target_audience: Option<String>,
    pub brand_guidelines: Option<serde_json::Value>,
}

/// A project joined with its settings and child counts.
///
/// Returned by the project listing and detail endpoints.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ProjectOverview {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub niche: Option<String>,
    pub locale: String,
    pub site_name: Option<String>,
    pub target_domain: Option<String>,
    pub tone: Option<String>,
    pub target_audience: Option<String>,
    pub keyword_count: i64,
    pub cluster_count: i64,
    pub draft_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a project in the caller's primary organization.
///
/// # JSON Example
///
/// ```json
/// {
///   "name": "Trail Running Blog",
///   "niche": "outdoor sports",
///   "locale": "en-US",
///   "site_name": "Run Wild",
///   "target_domain": "runwild.example"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub niche: Option<String>,
    pub locale: Option<String>,
    pub site_name: Option<String>,
    pub target_domain: Option<String>,
    pub tone: Option<String>,
    pub target_audience: Option<String>,
}

impl CreateProjectRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().chars().count() < 2 {
            return Err("name must be at least 2 characters".to_string());
        }
        Ok(())
    }
}

/// Partial update of a project. Absent fields are left untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub niche: Option<String>,
    pub locale: Option<String>,
    pub site_name: Option<String>,
    pub target_domain: Option<String>,
    pub tone: Option<String>,
    pub target_audience: Option<String>,
}

impl UpdateProjectRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name
            && name.trim().chars().count() < 2
        {
            return Err("name must be at least 2 characters".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_project_names_are_rejected() {
        let req: CreateProjectRequest = serde_json::from_str(r#"{"name":"a"}"#).unwrap();
        assert!(req.validate().is_err());

        let req: CreateProjectRequest = serde_json::from_str(r#"{"name":"Blog"}"#).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn update_without_name_is_valid() {
        let req: UpdateProjectRequest = serde_json::from_str(r#"{"niche":"cooking"}"#).unwrap();
        assert!(req.validate().is_ok());
    }
}
