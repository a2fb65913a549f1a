//! Content brief models and API request/response types.
//!
//! A brief is the research skeleton of an article: suggested headings, entities to
//! cover, FAQ questions, link targets and a recommended length. The list-like fields
//! are free-form JSON arrays whose items are either strings or small objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{draft::ContentDraft, response::OffsetPage};

/// Brief columns joined with the target keyword term, for `query_as::<_, ContentBrief>`.
pub const BRIEF_SELECT: &str = r#"
    SELECT b.id, b.project_id, b.cluster_id, b.target_keyword_id, k.term AS target_keyword,
           b.headings, b.entities, b.faq, b.internal_links, b.external_refs,
           b.recommended_word_count, b.created_at, b.updated_at
    FROM content_briefs b
    LEFT JOIN keywords k ON k.id = b.target_keyword_id
"#;

/// Word count assumed when a brief does not recommend one.
pub const DEFAULT_BRIEF_WORD_COUNT: i32 = 1500;

/// Represents a content brief joined with its target keyword term.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ContentBrief {
    pub id: Uuid,
    pub project_id: Uuid,
    pub cluster_id: Option<Uuid>,
    pub target_keyword_id: Option<Uuid>,

    /// Term of the target keyword, if any
    pub target_keyword: Option<String>,

    pub headings: Value,
    pub entities: Value,
    pub faq: Value,
    pub internal_links: Value,
    pub external_refs: Value,
    pub recommended_word_count: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentBrief {
    pub fn word_count_or_default(&self) -> i32 {
        self.recommended_word_count
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_BRIEF_WORD_COUNT)
    }
}

/// Draft summary attached to a brief detail response.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BriefDraftSummary {
    pub id: Uuid,
    pub version: i32,
    pub status: String,
    pub seo_score: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct BriefDetail {
    #[serde(flatten)]
    pub brief: ContentBrief,
    pub drafts: Vec<BriefDraftSummary>,
}

#[derive(Debug, Serialize)]
pub struct BriefListResponse {
    pub briefs: Vec<ContentBrief>,
    pub pagination: OffsetPage,
}

/// Request to create a brief.
///
/// # JSON Example
///
/// ```json
/// {
///   "project_id": "550e8400-e29b-41d4-a716-446655440000",
///   "target_keyword_id": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
///   "headings": ["Why cushioning matters", "Top picks for 2025"],
///   "entities": ["drop", "stack height", {"term": "rock plate"}],
///   "faq": [{"question": "How long do trail shoes last?"}],
///   "recommended_word_count": 1800
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateBriefRequest {
    pub project_id: Option<Uuid>,
    pub cluster_id: Option<Uuid>,
    pub target_keyword_id: Option<Uuid>,
    #[serde(default = "empty_array")]
    pub headings: Value,
    #[serde(default = "empty_array")]
    pub entities: Value,
    #[serde(default = "empty_array")]
    pub faq: Value,
    #[serde(default = "empty_array")]
    pub internal_links: Value,
    #[serde(default = "empty_array")]
    pub external_refs: Value,
    pub recommended_word_count: Option<i32>,
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

/// Partial update of a brief. Absent fields are left untouched.
#[derive(Debug, Deserialize)]
pub struct UpdateBriefRequest {
    pub cluster_id: Option<Uuid>,
    pub target_keyword_id: Option<Uuid>,
    pub headings: Option<Value>,
    pub entities: Option<Value>,
    pub faq: Option<Value>,
    pub internal_links: Option<Value>,
    pub external_refs: Option<Value>,
    pub recommended_word_count: Option<i32>,
}

/// Query string for `GET /api/briefs`.
#[derive(Debug, Deserialize)]
pub struct BriefListQuery {
    pub project_id: Option<Uuid>,
    pub cluster_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// One heading of a generated outline, with nested lower-level headings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub heading: String,

    /// 1 = H1, 2 = H2, 3 = H3
    pub level: u8,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subheadings: Vec<OutlineSection>,
}

#[derive(Debug, Serialize)]
pub struct GenerateOutlineResponse {
    pub outline: Vec<OutlineSection>,
    pub cost: i64,
    pub message: String,
}

/// Request body for `POST /api/briefs/{id}/generate-draft`.
#[derive(Debug, Deserialize)]
pub struct GenerateDraftRequest {
    /// Outline to write from; generated first when absent
    pub outline: Option<Vec<OutlineSection>>,

    #[serde(default = "default_auto_score")]
    pub auto_score: bool,
}

fn default_auto_score() -> bool {
    true
}

impl Default for GenerateDraftRequest {
    fn default() -> Self {
        Self {
            outline: None,
            auto_score: default_auto_score(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CostBreakdown {
    pub draft: i64,
    pub seo_score: i64,
}

#[derive(Debug, Serialize)]
pub struct GenerateDraftResponse {
    pub draft: ContentDraft,
    pub cost: i64,
    pub breakdown: CostBreakdown,
    pub message: String,
}

/// Text of an entity entry: the string itself, or an object's `term` or `name`.
fn entity_text(item: &Value) -> Option<&str> {
    match item {
        Value::String(s) => Some(s),
        Value::Object(obj) => obj
            .get("term")
            .or_else(|| obj.get("name"))
            .and_then(Value::as_str),
        _ => None,
    }
}

/// Entity strings of a brief's `entities` array. Entries without text are skipped.
pub fn entity_terms(entities: &Value) -> Vec<String> {
    entities
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(entity_text)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Heading suggestions: strings, or objects' `text` or `title`.
pub fn heading_texts(headings: &Value) -> Vec<String> {
    string_or_field(headings, &["text", "title"])
}

/// FAQ questions: strings, or objects' `question`.
pub fn faq_questions(faq: &Value) -> Vec<String> {
    string_or_field(faq, &["question"])
}

/// Number of entries in a JSON array field, zero for anything else.
pub fn array_len(value: &Value) -> usize {
    value.as_array().map_or(0, Vec::len)
}

fn string_or_field(value: &Value, fields: &[&str]) -> Vec<String> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => fields
                .iter()
                .find_map(|f| obj.get(*f).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entities_accept_strings_and_objects() {
        let entities = json!(["drop", {"term": "stack height"}, {"name": "rock plate"}, {"id": 3}, 7]);
        assert_eq!(
            entity_terms(&entities),
            vec!["drop", "stack height", "rock plate"]
        );
        assert!(entity_terms(&json!({"not": "an array"})).is_empty());
    }

    #[test]
    fn headings_and_faq_read_their_fields() {
        assert_eq!(
            heading_texts(&json!(["Intro", {"title": "Picks"}, {"text": "Care"}])),
            vec!["Intro", "Picks", "Care"]
        );
        assert_eq!(
            faq_questions(&json!([{"question": "How long?"}, "Is it waterproof?"])),
            vec!["How long?", "Is it waterproof?"]
        );
    }

    #[test]
    fn generate_draft_scores_by_default() {
        let req: GenerateDraftRequest = serde_json::from_str("{}").unwrap();
        assert!(req.auto_score);
        assert!(req.outline.is_none());

        let req = GenerateDraftRequest::default();
        assert!(req.auto_score);
        assert!(req.outline.is_none());
    }

    #[test]
    fn create_brief_defaults_lists_to_empty_arrays() {
        let req: CreateBriefRequest = serde_json::from_str(
            r#"{"project_id": "550e8400-e29b-41d4-a716-446655440000"}"#,
        )
        .unwrap();
        assert_eq!(req.headings, Value::Array(vec![]));
        assert_eq!(req.external_refs, Value::Array(vec![]));
    }

    #[test]
    fn outline_sections_omit_empty_children() {
        let section = OutlineSection {
            heading: "Intro".into(),
            level: 2,
            subheadings: vec![],
        };
        let json = serde_json::to_value(&section).unwrap();
        assert!(json.get("subheadings").is_none());
    }
}
