//! Internal link suggestion and link graph models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::draft::ContentDraft;

/// Represents an internal link suggestion, joined with the target draft's title and status.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LinkSuggestion {
    pub id: Uuid,
    pub from_draft_id: Uuid,
    pub to_draft_id: Uuid,
    pub anchor_text: String,

    /// Similarity score, rounded to three decimals
    pub relevance_score: f64,

    pub accepted: bool,
    pub dismissed: bool,
    pub created_at: DateTime<Utc>,
    pub from_draft_title: Option<String>,
    pub to_draft_title: Option<String>,
    pub to_draft_status: Option<String>,
}

/// Request body for `POST /api/links/suggest`.
#[derive(Debug, Deserialize)]
pub struct SuggestLinksRequest {
    pub draft_id: Option<Uuid>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<LinkSuggestion>,
}

#[derive(Debug, Serialize)]
pub struct AcceptLinkResponse {
    pub message: String,
    pub suggestion: LinkSuggestion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<ContentDraft>,
}

/// Query string for `GET /api/links`.
#[derive(Debug, Deserialize)]
pub struct DraftLinksQuery {
    pub draft_id: Option<Uuid>,
    #[serde(default)]
    pub include_dismissed: bool,
}

/// Which suggestions the project listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionFilter {
    /// Neither accepted nor dismissed
    #[default]
    Pending,
    Accepted,
    All,
}

/// Query string for `GET /api/links/project`.
#[derive(Debug, Deserialize)]
pub struct ProjectLinksQuery {
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub status: SuggestionFilter,
}

#[derive(Debug, Deserialize)]
pub struct RecomputeGraphRequest {
    pub project_id: Option<Uuid>,
}

/// Per-draft link counts from the last graph recompute.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct LinkGraphNode {
    pub id: Uuid,
    pub project_id: Uuid,
    pub draft_id: Uuid,
    pub draft_title: Option<String>,
    pub incoming_count: i32,
    pub outgoing_count: i32,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub total_incoming: i64,
    pub total_outgoing: i64,
}

#[derive(Debug, Serialize)]
pub struct GraphRecomputeResult {
    pub project_id: Uuid,
    pub nodes: usize,
    pub stats: GraphStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_filter_defaults_to_pending() {
        let query: ProjectLinksQuery = serde_json::from_str(
            r#"{"project_id": "550e8400-e29b-41d4-a716-446655440000"}"#,
        )
        .unwrap();
        assert_eq!(query.status, SuggestionFilter::Pending);

        let query: ProjectLinksQuery = serde_json::from_str(r#"{"status": "accepted"}"#).unwrap();
        assert_eq!(query.status, SuggestionFilter::Accepted);
    }
}
