//! Export bundles: render a draft to a downloadable file and record it.
//!
//! Files are stored inline as `data:` URLs next to a SHA-256 checksum. DOCX exports
//! carry the markdown source under the Word mime type.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, SecondsFormat, Utc};
use pulldown_cmark::{Options, Parser, html};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        draft::ContentDraft,
        export::{
            ExportBundle, ExportDownload, ExportFormat, ExportHistoryEntry, ExportResponse,
        },
    },
};

const MAX_SLUG_LEN: usize = 48;
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
const MAX_HISTORY_LIMIT: i64 = 200;
pub const AUTO_EXPORT_JOB: &str = "EXPORT";

/// Lowercase ASCII slug of at most 48 characters, `"draft"` when nothing is left.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug.truncate(MAX_SLUG_LEN);
    if slug.is_empty() {
        "draft".to_string()
    } else {
        slug
    }
}

/// `{slug}-v{version}-{timestamp}.{ext}`, with `:` and `.` in the timestamp replaced by `-`.
pub fn export_filename(draft: &ContentDraft, format: ExportFormat, now: DateTime<Utc>) -> String {
    let base = draft
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| draft.id.to_string());
    let timestamp = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!(
        "{}-v{}-{}.{}",
        slugify(&base),
        draft.version,
        timestamp,
        format.extension()
    )
}

pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let mut out = String::new();
    html::push_html(&mut out, Parser::new_ext(markdown, options));
    out
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Wrap rendered HTML in a standalone document.
pub fn html_document(title: Option<&str>, body_html: &str) -> String {
    let title = escape_html(title.filter(|t| !t.is_empty()).unwrap_or("Draft"));
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n<title>{title}</title>\n<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n</head>\n<body>\n{body_html}\n</body>\n</html>"
    )
}

pub fn checksum(contents: &str) -> String {
    hex::encode(Sha256::digest(contents.as_bytes()))
}

pub fn data_url(mime_type: &str, contents: &str) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(contents))
}

/// File produced for one export, before it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedExport {
    pub filename: String,
    pub contents: String,
    /// Rendered HTML to store back on the draft, HTML exports only
    pub html_body: Option<String>,
}

pub fn render_export(
    draft: &ContentDraft,
    format: ExportFormat,
    now: DateTime<Utc>,
) -> Result<RenderedExport, AppError> {
    let markdown = draft
        .md_body
        .as_deref()
        .filter(|md| !md.is_empty())
        .ok_or_else(|| AppError::invalid("Draft not found or missing markdown body"))?;

    let (contents, html_body) = match format {
        ExportFormat::Html => {
            let rendered = markdown_to_html(markdown);
            (html_document(draft.title.as_deref(), &rendered), Some(rendered))
        }
        ExportFormat::Md | ExportFormat::Docx => (markdown.to_string(), None),
    };

    Ok(RenderedExport {
        filename: export_filename(draft, format, now),
        contents,
        html_body,
    })
}

/// Render a draft, store the bundle and, for HTML, the rendered body.
pub async fn create_export_bundle(
    pool: &DbPool,
    draft_id: Uuid,
    format: ExportFormat,
) -> Result<ExportResponse, AppError> {
    let draft = sqlx::query_as::<_, ContentDraft>("SELECT * FROM content_drafts WHERE id = $1")
        .bind(draft_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Draft"))?;

    let rendered = render_export(&draft, format, Utc::now())?;
    let mime_type = format.mime_type();

    let mut tx = pool.begin().await?;

    let bundle = sqlx::query_as::<_, ExportBundle>(
        r#"
        INSERT INTO export_bundles (project_id, draft_id, format, url, checksum)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(draft.project_id)
    .bind(draft.id)
    .bind(format.as_str())
    .bind(data_url(mime_type, &rendered.contents))
    .bind(checksum(&rendered.contents))
    .fetch_one(&mut *tx)
    .await?;

    if let Some(html_body) = &rendered.html_body {
        sqlx::query("UPDATE content_drafts SET html_body = $2, updated_at = NOW() WHERE id = $1")
            .bind(draft.id)
            .bind(html_body)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(
        draft_id = %draft.id,
        bundle_id = %bundle.id,
        format = format.as_str(),
        "export bundle created"
    );

    Ok(ExportResponse {
        bundle,
        download: ExportDownload {
            filename: rendered.filename,
            mime_type: mime_type.to_string(),
            content: rendered.contents,
        },
    })
}

/// Queue a markdown export of a scheduled draft and run it in the background.
///
/// The job row moves `QUEUED` → `RUNNING` → `DONE` or `FAILED`. Failures are only
/// recorded; nothing is retried.
pub async fn spawn_auto_export(
    pool: &DbPool,
    org_id: Uuid,
    project_id: Uuid,
    draft_id: Uuid,
) -> Result<Uuid, AppError> {
    let format = ExportFormat::Md;
    let (job_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO jobs (org_id, project_id, job_type, status, payload)
        VALUES ($1, $2, $3, 'QUEUED', $4)
        RETURNING id
        "#,
    )
    .bind(org_id)
    .bind(project_id)
    .bind(AUTO_EXPORT_JOB)
    .bind(json!({ "draft_id": draft_id, "format": format.as_str() }))
    .fetch_one(pool)
    .await?;

    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = run_export_job(&pool, job_id, draft_id, format).await {
            tracing::error!(%job_id, %draft_id, error = %e, "auto export failed");
        }
    });

    Ok(job_id)
}

async fn run_export_job(
    pool: &DbPool,
    job_id: Uuid,
    draft_id: Uuid,
    format: ExportFormat,
) -> Result<(), AppError> {
    sqlx::query("UPDATE jobs SET status = 'RUNNING', started_at = NOW() WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;

    match create_export_bundle(pool, draft_id, format).await {
        Ok(export) => {
            sqlx::query(
                "UPDATE jobs SET status = 'DONE', finished_at = NOW(), result = $2 WHERE id = $1",
            )
            .bind(job_id)
            .bind(json!({
                "export_id": export.bundle.id,
                "format": format.as_str(),
                "checksum": export.bundle.checksum,
            }))
            .execute(pool)
            .await?;
            Ok(())
        }
        Err(e) => {
            sqlx::query(
                "UPDATE jobs SET status = 'FAILED', finished_at = NOW(), error = $2 WHERE id = $1",
            )
            .bind(job_id)
            .bind(e.to_string())
            .execute(pool)
            .await?;
            Err(e)
        }
    }
}

/// Export history across the given organizations, newest first.
pub async fn list_history(
    pool: &DbPool,
    org_ids: &[Uuid],
    project_id: Option<Uuid>,
    draft_id: Option<Uuid>,
    limit: Option<i64>,
) -> Result<Vec<ExportHistoryEntry>, AppError> {
    let limit = limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let entries = sqlx::query_as::<_, ExportHistoryEntry>(
        r#"
        SELECT e.id, e.project_id, p.name AS project_name, e.draft_id, d.title AS draft_title,
               e.format, e.url, e.checksum, e.created_at
        FROM export_bundles e
        JOIN projects p ON p.id = e.project_id
        JOIN content_drafts d ON d.id = e.draft_id
        WHERE p.org_id = ANY($1)
          AND ($2::uuid IS NULL OR e.project_id = $2)
          AND ($3::uuid IS NULL OR e.draft_id = $3)
        ORDER BY e.created_at DESC
        LIMIT $4
        "#,
    )
    .bind(org_ids)
    .bind(project_id)
    .bind(draft_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn draft(title: Option<&str>, md: Option<&str>) -> ContentDraft {
        ContentDraft {
            id: Uuid::nil(),
            project_id: Uuid::nil(),
            brief_id: None,
            title: title.map(str::to_string),
            md_body: md.map(str::to_string),
            html_body: None,
            word_count: 0,
            status: "DRAFT".into(),
            seo_score: None,
            onpage_checklist: None,
            version: 2,
            scheduled_for: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 30).unwrap()
    }

    #[test]
    fn slug_collapses_punctuation_and_truncates() {
        assert_eq!(slugify("  The Best: Trail Shoes!! "), "the-best-trail-shoes");
        assert_eq!(slugify("???"), "draft");
        assert_eq!(slugify(&"a".repeat(80)).len(), 48);
    }

    #[test]
    fn filename_includes_version_and_sanitised_timestamp() {
        let name = export_filename(&draft(Some("Trail Shoes"), None), ExportFormat::Html, fixed_now());
        assert_eq!(name, "trail-shoes-v2-2025-03-09T14-05-30-000Z.html");
    }

    #[test]
    fn untitled_drafts_fall_back_to_id() {
        let name = export_filename(&draft(None, None), ExportFormat::Md, fixed_now());
        assert!(name.starts_with("00000000-0000-0000-0000-000000000000-v2-"));
    }

    #[test]
    fn html_export_wraps_rendered_markdown() {
        let rendered = render_export(
            &draft(Some("Shoes & Socks"), Some("# Hello\n\nWorld")),
            ExportFormat::Html,
            fixed_now(),
        )
        .unwrap();

        let body = rendered.html_body.unwrap();
        assert_eq!(body, "<h1>Hello</h1>\n<p>World</p>\n");
        assert!(rendered.contents.starts_with("<!doctype html>\n<html lang=\"en\">"));
        assert!(rendered.contents.contains("<title>Shoes &amp; Socks</title>"));
        assert!(rendered.contents.contains("<body>\n<h1>Hello</h1>"));
    }

    #[test]
    fn markdown_and_docx_exports_keep_the_source() {
        for format in [ExportFormat::Md, ExportFormat::Docx] {
            let rendered = render_export(&draft(None, Some("# Hi")), format, fixed_now()).unwrap();
            assert_eq!(rendered.contents, "# Hi");
            assert!(rendered.html_body.is_none());
        }
    }

    #[test]
    fn missing_markdown_is_rejected() {
        assert!(render_export(&draft(Some("x"), None), ExportFormat::Md, fixed_now()).is_err());
        assert!(render_export(&draft(Some("x"), Some("")), ExportFormat::Md, fixed_now()).is_err());
    }

    #[test]
    fn checksum_and_data_url() {
        assert_eq!(
            checksum("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(data_url("text/markdown", "# Hi"), "data:text/markdown;base64,IyBIaQ==");
    }
}
