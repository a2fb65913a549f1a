//! Calendar models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a calendar item record, joined with the referenced draft's title and status.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CalendarItem {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,

    /// `ARTICLE`, `SOCIAL_SNIPPET`, `TASK` or `NOTE`
    pub item_type: String,

    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,

    /// Free-form status; `scheduled` unless set, `cancelled` releases the draft
    pub status: String,

    /// Draft this entry publishes
    pub ref_id: Option<Uuid>,

    pub assigned_to: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub draft_title: Option<String>,
    pub draft_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalendarItemType {
    #[default]
    Article,
    SocialSnippet,
    Task,
    Note,
}

impl CalendarItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarItemType::Article => "ARTICLE",
            CalendarItemType::SocialSnippet => "SOCIAL_SNIPPET",
            CalendarItemType::Task => "TASK",
            CalendarItemType::Note => "NOTE",
        }
    }
}

pub const STATUS_SCHEDULED: &str = "scheduled";
pub const STATUS_CANCELLED: &str = "cancelled";

/// Query string for `GET /api/calendar`. The window defaults to the next 30 days.
#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub project_id: Option<Uuid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Request to schedule an item.
///
/// # JSON Example
///
/// ```json
/// {
///   "project_id": "550e8400-e29b-41d4-a716-446655440000",
///   "title": "Publish: trail shoe guide",
///   "item_type": "ARTICLE",
///   "start_at": "2025-03-01T09:00:00Z",
///   "ref_id": "6ba7b810-9dad-11d1-80b4-00c04fd430c8"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateCalendarItemRequest {
    pub project_id: Option<Uuid>,
    pub title: Option<String>,
    #[serde(default)]
    pub item_type: CalendarItemType,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub ref_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

/// Partial update of a calendar item.
#[derive(Debug, Deserialize)]
pub struct UpdateCalendarItemRequest {
    pub title: Option<String>,
    pub item_type: Option<CalendarItemType>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_default_to_articles() {
        let req: CreateCalendarItemRequest = serde_json::from_str(
            r#"{"project_id": "550e8400-e29b-41d4-a716-446655440000", "title": "x", "start_at": "2025-03-01T09:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(req.item_type, CalendarItemType::Article);
        assert!(req.end_at.is_none());
    }
}
