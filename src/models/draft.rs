//! Content draft models and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{export::ExportBundle, response::OffsetPage};

/// Represents a content draft record from the database.
///
/// # Status lifecycle
///
/// `DRAFT` → `READY` → `SCHEDULED` (when placed on the calendar) → `EXPORTED` /
/// `PUBLISHED`. Removing a draft from the calendar moves it back to `READY`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ContentDraft {
    pub id: Uuid,
    pub project_id: Uuid,
    pub brief_id: Option<Uuid>,
    pub title: Option<String>,

    /// Markdown source of the article
    pub md_body: Option<String>,

    /// Rendered HTML, filled in by HTML exports
    pub html_body: Option<String>,

    pub word_count: i32,
    pub status: String,

    /// Last computed SEO score, 0-100
    pub seo_score: Option<i32>,

    /// Last SEO checklist with summary and calculation time
    pub onpage_checklist: Option<Value>,

    pub version: i32,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftStatus {
    Draft,
    Ready,
    Scheduled,
    Exported,
    Published,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Draft => "DRAFT",
            DraftStatus::Ready => "READY",
            DraftStatus::Scheduled => "SCHEDULED",
            DraftStatus::Exported => "EXPORTED",
            DraftStatus::Published => "PUBLISHED",
        }
    }
}

/// Draft plus the exports made from it, returned by `GET /api/drafts/{id}`.
#[derive(Debug, Serialize)]
pub struct DraftDetail {
    #[serde(flatten)]
    pub draft: ContentDraft,
    pub exports: Vec<ExportBundle>,
}

#[derive(Debug, Serialize)]
pub struct DraftListResponse {
    pub drafts: Vec<ContentDraft>,
    pub pagination: OffsetPage,
}

/// Request to create a draft by hand.
///
/// # JSON Example
///
/// ```json
/// {
///   "project_id": "550e8400-e29b-41d4-a716-446655440000",
///   "title": "The Best Trail Running Shoes",
///   "md_body": "# The Best Trail Running Shoes\n\nIntro...",
///   "status": "DRAFT"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateDraftRequest {
    pub project_id: Option<Uuid>,
    pub brief_id: Option<Uuid>,
    pub title: Option<String>,
    pub md_body: Option<String>,
    pub html_body: Option<String>,
    pub status: Option<DraftStatus>,
}

/// Partial update of a draft. Changing `md_body` recomputes the word count.
#[derive(Debug, Deserialize)]
pub struct UpdateDraftRequest {
    pub title: Option<String>,
    pub md_body: Option<String>,
    pub html_body: Option<String>,
    pub status: Option<DraftStatus>,
    pub seo_score: Option<i32>,
    pub onpage_checklist: Option<Value>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Query string for `GET /api/drafts`.
#[derive(Debug, Deserialize)]
pub struct DraftListQuery {
    pub project_id: Option<Uuid>,
    pub brief_id: Option<Uuid>,
    pub status: Option<DraftStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Count whitespace-separated words.
pub fn count_words(text: &str) -> i32 {
    text.split_whitespace().count() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_count_ignores_repeated_whitespace() {
        assert_eq!(count_words("  one two\n\nthree\tfour  "), 4);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn status_parses_from_upper_case() {
        let status: DraftStatus = serde_json::from_str("\"SCHEDULED\"").unwrap();
        assert_eq!(status, DraftStatus::Scheduled);
        assert!(serde_json::from_str::<DraftStatus>("\"ARCHIVED\"").is_err());
    }
}
