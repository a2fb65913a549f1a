//! Organization and membership models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an organization (tenant) record.
///
/// Every project, wallet and partner opt-in belongs to exactly one organization.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Org {
    pub id: Uuid,
    pub name: String,
    pub owner_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Role of a user inside an organization.
///
/// Variants are declared in ascending order of privilege so that `Ord` gives the
/// hierarchy `VIEWER < EDITOR < ADMIN < OWNER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgRole {
    Viewer,
    Editor,
    Admin,
    Owner,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Viewer => "VIEWER",
            OrgRole::Editor => "EDITOR",
            OrgRole::Admin => "ADMIN",
            OrgRole::Owner => "OWNER",
        }
    }
}

impl std::str::FromStr for OrgRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VIEWER" => Ok(OrgRole::Viewer),
            "EDITOR" => Ok(OrgRole::Editor),
            "ADMIN" => Ok(OrgRole::Admin),
            "OWNER" => Ok(OrgRole::Owner),
            other => Err(format!("unknown org role: {other}")),
        }
    }
}

/// Row returned by the admin organization listing.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OrgOverview {
    pub id: Uuid,
    pub name: String,
    pub owner_email: String,
    pub owner_name: Option<String>,
    pub balance: Option<i64>,
    pub lifetime_spent: Option<i64>,
    pub project_count: i64,
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy_is_ordered() {
        assert!(OrgRole::Viewer < OrgRole::Editor);
        assert!(OrgRole::Editor < OrgRole::Admin);
        assert!(OrgRole::Admin < OrgRole::Owner);
    }

    #[test]
    fn roles_parse_from_database_strings() {
        assert_eq!("EDITOR".parse::<OrgRole>().unwrap(), OrgRole::Editor);
        assert!("editor".parse::<OrgRole>().is_err());
    }
}
