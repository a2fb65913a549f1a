//! Keyword data models and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::response::PageParams;

/// Represents a keyword record from the database.
///
/// `(project_id, term)` is unique: importing the same term twice is skipped.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Keyword {
    pub id: Uuid,
    pub project_id: Uuid,
    pub term: String,

    /// Where the keyword came from (`SEED`, `IMPORT`, `SUGGEST`, `SERP`)
    pub source: String,

    pub search_volume: Option<i32>,

    /// Ranking difficulty, 0-100
    pub difficulty: Option<i32>,

    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeywordSource {
    #[default]
    Seed,
    Import,
    Suggest,
    Serp,
}

impl KeywordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordSource::Seed => "SEED",
            KeywordSource::Import => "IMPORT",
            KeywordSource::Suggest => "SUGGEST",
            KeywordSource::Serp => "SERP",
        }
    }
}

/// Request to create a single keyword.
///
/// # JSON Example
///
/// ```json
/// {
///   "project_id": "550e8400-e29b-41d4-a716-446655440000",
///   "term": "best trail running shoes",
///   "source": "SEED",
///   "search_volume": 12000,
///   "difficulty": 42,
///   "tags": ["gear"]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateKeywordRequest {
    pub project_id: Uuid,
    pub term: String,
    #[serde(default)]
    pub source: KeywordSource,
    pub search_volume: Option<i32>,
    pub difficulty: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One entry of a bulk import. Imported keywords always get source `IMPORT`.
#[derive(Debug, Deserialize)]
pub struct ImportedKeyword {
    pub term: String,
    pub search_volume: Option<i32>,
    pub difficulty: Option<i32>,
    pub tags: Option<Vec<String>>,
}

/// Request to import many keywords at once.
#[derive(Debug, Deserialize)]
pub struct BulkImportRequest {
    pub project_id: Uuid,
    pub keywords: Vec<ImportedKeyword>,
}

/// `POST /api/keywords` accepts either a single keyword or a bulk import.
///
/// A body carrying a `keywords` array is treated as a bulk import.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum KeywordWriteRequest {
    Bulk(BulkImportRequest),
    Single(CreateKeywordRequest),
}

#[derive(Debug, Serialize)]
pub struct BulkImportResponse {
    pub imported: u64,
    pub message: String,
}

/// Partial update of a keyword.
#[derive(Debug, Deserialize)]
pub struct UpdateKeywordRequest {
    pub term: Option<String>,
    pub search_volume: Option<i32>,
    pub difficulty: Option<i32>,
    pub tags: Option<Vec<String>>,
}

/// Reject difficulty values outside 0-100.
pub fn validate_difficulty(difficulty: Option<i32>) -> Result<(), String> {
    match difficulty {
        Some(d) if !(0..=100).contains(&d) => {
            Err("difficulty must be between 0 and 100".to_string())
        }
        _ => Ok(()),
    }
}

/// Query string for `GET /api/keywords`.
#[derive(Debug, Deserialize)]
pub struct KeywordListQuery {
    pub project_id: Option<Uuid>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl KeywordListQuery {
    pub fn paging(&self) -> PageParams {
        PageParams {
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TopKeyword {
    pub id: Uuid,
    pub term: String,
    pub search_volume: Option<i32>,
    pub difficulty: Option<i32>,
}

/// Aggregate keyword statistics for one project.
#[derive(Debug, Serialize)]
pub struct KeywordStats {
    pub total: i64,
    pub by_source: BTreeMap<String, i64>,
    pub avg_difficulty: f64,
    pub top_keywords: Vec<TopKeyword>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_with_keywords_array_is_a_bulk_import() {
        let body = r#"{
            "project_id": "550e8400-e29b-41d4-a716-446655440000",
            "keywords": [{"term": "trail shoes"}, {"term": "running socks", "difficulty": 12}]
        }"#;
        match serde_json::from_str::<KeywordWriteRequest>(body).unwrap() {
            KeywordWriteRequest::Bulk(bulk) => assert_eq!(bulk.keywords.len(), 2),
            KeywordWriteRequest::Single(_) => panic!("expected bulk import"),
        }
    }

    #[test]
    fn single_keyword_defaults_to_seed_source() {
        let body = r#"{"project_id": "550e8400-e29b-41d4-a716-446655440000", "term": "trail shoes"}"#;
        match serde_json::from_str::<KeywordWriteRequest>(body).unwrap() {
            KeywordWriteRequest::Single(kw) => {
                assert_eq!(kw.source, KeywordSource::Seed);
                assert!(kw.tags.is_empty());
            }
            KeywordWriteRequest::Bulk(_) => panic!("expected single keyword"),
        }
    }

    #[test]
    fn difficulty_bounds() {
        assert!(validate_difficulty(None).is_ok());
        assert!(validate_difficulty(Some(0)).is_ok());
        assert!(validate_difficulty(Some(100)).is_ok());
        assert!(validate_difficulty(Some(101)).is_err());
        assert!(validate_difficulty(Some(-1)).is_err());
    }
}
