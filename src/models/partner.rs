//! Partner network opt-in models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

/// Represents an organization's partner opt-in.
///
/// One row per organization. Admins approve (activate) or reject (delete) pending opt-ins.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PartnerOptin {
    pub id: Uuid,
    pub org_id: Uuid,
    pub domains_allowed: Vec<String>,
    pub rules: Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Opt-in as returned to the organization. `id` is `"new"` until the opt-in is saved.
#[derive(Debug, Clone, Serialize)]
pub struct PartnerOptinView {
    pub id: String,
    pub org_id: Uuid,
    pub domains_allowed: Vec<String>,
    pub rules: Value,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl PartnerOptinView {
    /// Preferences shown to an organization that has never saved any.
    pub fn unsaved_default(org_id: Uuid) -> Self {
        Self {
            id: "new".to_string(),
            org_id,
            domains_allowed: Vec::new(),
            rules: json!({ "max_links_per_article": 3, "topical_match_required": true }),
            active: false,
            created_at: None,
        }
    }
}

impl From<PartnerOptin> for PartnerOptinView {
    fn from(optin: PartnerOptin) -> Self {
        Self {
            id: optin.id.to_string(),
            org_id: optin.org_id,
            domains_allowed: optin.domains_allowed,
            rules: optin.rules,
            active: optin.active,
            created_at: Some(optin.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OptinResponse {
    pub opt_in: PartnerOptinView,
}

#[derive(Debug, Deserialize)]
pub struct OptinQuery {
    pub org_id: Option<Uuid>,
}

/// Request body for saving (`POST`) or partially updating (`PATCH`) an opt-in.
///
/// # JSON Example
///
/// ```json
/// {
///   "domains_allowed": ["partner.example"],
///   "rules": {"max_links_per_article": 2},
///   "active": true
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct OptinRequest {
    pub org_id: Option<Uuid>,
    pub domains_allowed: Option<Vec<String>>,
    pub rules: Option<Value>,
    pub active: Option<bool>,
}

/// Opt-in joined with its organization, for the admin review queue.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PartnerReviewEntry {
    pub id: Uuid,
    pub org_id: Uuid,
    pub org_name: String,
    pub owner_email: String,
    pub domains_allowed: Vec<String>,
    pub rules: Value,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsaved_default_is_inactive_with_standard_rules() {
        let view = PartnerOptinView::unsaved_default(Uuid::nil());
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["id"], "new");
        assert_eq!(json["active"], false);
        assert_eq!(json["rules"]["max_links_per_article"], 3);
        assert_eq!(json["rules"]["topical_match_required"], true);
        assert!(json.get("created_at").is_none());
    }
}
