//! Export bundle models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents an export bundle record from the database.
///
/// `url` is a `data:` URL holding the whole file; `checksum` is the SHA-256 hex digest of
/// the file contents.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ExportBundle {
    pub id: Uuid,
    pub project_id: Uuid,
    pub draft_id: Uuid,
    pub format: String,
    pub url: String,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

/// Export bundle joined with the draft and project names, for the history listing.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ExportHistoryEntry {
    pub id: Uuid,
    pub project_id: Uuid,
    pub project_name: String,
    pub draft_id: Uuid,
    pub draft_title: Option<String>,
    pub format: String,
    pub url: String,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportFormat {
    #[default]
    Md,
    Html,
    Docx,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Md => "MD",
            ExportFormat::Html => "HTML",
            ExportFormat::Docx => "DOCX",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Md => "md",
            ExportFormat::Html => "html",
            ExportFormat::Docx => "docx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Md => "text/markdown",
            ExportFormat::Html => "text/html",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

/// Request body for `POST /api/drafts/{id}/export`.
#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub format: ExportFormat,
}

/// The rendered file, handed back so clients can download it without decoding the URL.
#[derive(Debug, Clone, Serialize)]
pub struct ExportDownload {
    pub filename: String,
    pub mime_type: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ExportResponse {
    pub bundle: ExportBundle,
    pub download: ExportDownload,
}

/// Query string for `GET /api/exports/history`.
#[derive(Debug, Deserialize)]
pub struct ExportHistoryQuery {
    pub project_id: Option<Uuid>,
    pub draft_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_map_to_extension_and_mime() {
        assert_eq!(ExportFormat::Md.extension(), "md");
        assert_eq!(ExportFormat::Html.mime_type(), "text/html");
        assert!(ExportFormat::Docx.mime_type().contains("wordprocessingml"));
    }

    #[test]
    fn export_defaults_to_markdown() {
        let req: ExportRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.format, ExportFormat::Md);
    }
}
