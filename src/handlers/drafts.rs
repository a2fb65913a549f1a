//! Draft HTTP handlers: CRUD, manual SEO scoring and export.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        brief::{BRIEF_SELECT, ContentBrief},
        draft::{
            ContentDraft, CreateDraftRequest, DraftDetail, DraftListQuery, DraftListResponse,
            DraftStatus, UpdateDraftRequest, count_words,
        },
        export::{ExportBundle, ExportRequest, ExportResponse},
        organization::OrgRole,
        project::Project,
        response::{ApiResponse, MessageResponse, OffsetPage},
    },
    services::{
        access, export_service,
        seo_scoring::{self, BriefTargets, SeoAnalysis},
    },
};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 100;

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub draft: ContentDraft,
    pub analysis: SeoAnalysis,
}

async fn find_draft(pool: &DbPool, id: Uuid) -> Result<Option<ContentDraft>, AppError> {
    let draft = sqlx::query_as::<_, ContentDraft>("SELECT * FROM content_drafts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(draft)
}

async fn authorized_draft(
    pool: &DbPool,
    auth: &AuthContext,
    id: Uuid,
    required: OrgRole,
) -> Result<(ContentDraft, Project), AppError> {
    let draft = find_draft(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Draft"))?;
    let project = access::authorize_project(pool, auth, draft.project_id, required, "Draft").await?;
    Ok((draft, project))
}

/// List drafts visible to the caller, most recently updated first.
///
/// # Query Parameters
///
/// - `project_id`, `brief_id`, `status`: optional filters
/// - `limit` (default 50, max 100), `offset` (default 0)
pub async fn list_drafts(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DraftListQuery>,
) -> Result<Json<ApiResponse<DraftListResponse>>, AppError> {
    if let Some(project_id) = query.project_id {
        access::check_project_access(&pool, &auth, project_id, OrgRole::Viewer).await?;
    }

    let org_ids = access::accessible_org_ids(&pool, auth.user_id).await?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let status = query.status.map(|s| s.as_str());

    let filter = r#"
        FROM content_drafts d
        JOIN projects p ON p.id = d.project_id
        WHERE (p.org_id = ANY($1) OR $2)
          AND ($3::uuid IS NULL OR d.project_id = $3)
          AND ($4::uuid IS NULL OR d.brief_id = $4)
          AND ($5::text IS NULL OR d.status = $5)
    "#;

    let drafts = sqlx::query_as::<_, ContentDraft>(&format!(
        "SELECT d.* {filter} ORDER BY d.updated_at DESC LIMIT $6 OFFSET $7"
    ))
    .bind(&org_ids)
    .bind(auth.is_super_admin())
    .bind(query.project_id)
    .bind(query.brief_id)
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {filter}"))
        .bind(&org_ids)
        .bind(auth.is_super_admin())
        .bind(query.project_id)
        .bind(query.brief_id)
        .bind(status)
        .fetch_one(&pool)
        .await?;

    Ok(ApiResponse::ok(DraftListResponse {
        drafts,
        pagination: OffsetPage::new(total, limit, offset),
    }))
}

/// Create a draft from caller-supplied content. No credits are charged.
pub async fn create_draft(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateDraftRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ContentDraft>>), AppError> {
    let project_id = request
        .project_id
        .ok_or_else(|| AppError::invalid("project_id is required"))?;
    access::check_project_access(&pool, &auth, project_id, OrgRole::Editor).await?;

    if let Some(brief_id) = request.brief_id {
        let found: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM content_briefs WHERE id = $1 AND project_id = $2",
        )
        .bind(brief_id)
        .bind(project_id)
        .fetch_optional(&pool)
        .await?;
        if found.is_none() {
            return Err(AppError::invalid("brief_id does not belong to this project"));
        }
    }

    let word_count = request.md_body.as_deref().map_or(0, count_words);
    let status = request.status.unwrap_or(DraftStatus::Draft);

    let draft = sqlx::query_as::<_, ContentDraft>(
        r#"
        INSERT INTO content_drafts
            (project_id, brief_id, title, md_body, html_body, word_count, status, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
        RETURNING *
        "#,
    )
    .bind(project_id)
    .bind(request.brief_id)
    .bind(&request.title)
    .bind(&request.md_body)
    .bind(&request.html_body)
    .bind(word_count)
    .bind(status.as_str())
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::created(draft))
}

pub async fn get_draft(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DraftDetail>>, AppError> {
    let (draft, _) = authorized_draft(&pool, &auth, id, OrgRole::Viewer).await?;

    let exports = sqlx::query_as::<_, ExportBundle>(
        "SELECT * FROM export_bundles WHERE draft_id = $1 ORDER BY created_at DESC",
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::ok(DraftDetail { draft, exports }))
}

/// Partially update a draft. A new `md_body` also refreshes `word_count`.
pub async fn update_draft(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateDraftRequest>,
) -> Result<Json<ApiResponse<ContentDraft>>, AppError> {
    if let Some(score) = request.seo_score {
        if !(0..=100).contains(&score) {
            return Err(AppError::invalid("seo_score must be between 0 and 100"));
        }
    }
    authorized_draft(&pool, &auth, id, OrgRole::Editor).await?;

    let word_count = request.md_body.as_deref().map(count_words);

    let draft = sqlx::query_as::<_, ContentDraft>(
        r#"
        UPDATE content_drafts
        SET title = COALESCE($2, title),
            md_body = COALESCE($3, md_body),
            html_body = COALESCE($4, html_body),
            word_count = COALESCE($5, word_count),
            status = COALESCE($6, status),
            seo_score = COALESCE($7, seo_score),
            onpage_checklist = COALESCE($8, onpage_checklist),
            scheduled_for = COALESCE($9, scheduled_for),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&request.title)
    .bind(&request.md_body)
    .bind(&request.html_body)
    .bind(word_count)
    .bind(request.status.map(|s| s.as_str()))
    .bind(request.seo_score)
    .bind(&request.onpage_checklist)
    .bind(request.scheduled_for)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::ok(draft))
}

pub async fn delete_draft(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    authorized_draft(&pool, &auth, id, OrgRole::Editor).await?;

    sqlx::query("DELETE FROM content_drafts WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(ApiResponse::ok(MessageResponse::new("Draft deleted successfully")))
}

/// Re-score a draft against its brief and store the result. Free of charge.
pub async fn score_draft(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ScoreResponse>>, AppError> {
    let (draft, _) = authorized_draft(&pool, &auth, id, OrgRole::Editor).await?;

    let markdown = draft
        .md_body
        .as_deref()
        .filter(|md| !md.trim().is_empty())
        .ok_or_else(|| AppError::invalid("Draft has no content to score"))?;

    let brief = match draft.brief_id {
        Some(brief_id) => {
            sqlx::query_as::<_, ContentBrief>(&format!("{BRIEF_SELECT} WHERE b.id = $1"))
                .bind(brief_id)
                .fetch_optional(&pool)
                .await?
        }
        None => None,
    };
    let targets = brief.as_ref().map(BriefTargets::from);

    let analysis = seo_scoring::calculate_seo_score(markdown, draft.title.as_deref(), targets.as_ref());

    let draft = sqlx::query_as::<_, ContentDraft>(
        r#"
        UPDATE content_drafts
        SET seo_score = $2, onpage_checklist = $3, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(analysis.score)
    .bind(analysis.to_checklist_json())
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::ok(ScoreResponse { draft, analysis }))
}

/// Export a draft as MD, HTML or DOCX.
///
/// # Request Body
///
/// ```json
/// { "format": "HTML" }
/// ```
///
/// `format` defaults to `MD`.
pub async fn export_draft(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    body: Option<Json<ExportRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<ExportResponse>>), AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    authorized_draft(&pool, &auth, id, OrgRole::Editor).await?;

    let export = export_service::create_export_bundle(&pool, id, request.format).await?;
    Ok(ApiResponse::created(export))
}
