//! Content brief HTTP handlers, including AI outline and draft generation.
//!
//! - GET/POST /api/briefs
//! - GET/PATCH/DELETE /api/briefs/{id}
//! - POST /api/briefs/{id}/generate-outline - charges OUTLINE x1
//! - POST /api/briefs/{id}/generate-draft - charges DRAFT per 1000 words, plus SEO_SCORE
//!   when `auto_score` is on

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        brief::{
            BRIEF_SELECT, BriefDetail, BriefDraftSummary, BriefListQuery, BriefListResponse,
            ContentBrief, CostBreakdown, CreateBriefRequest, GenerateDraftRequest,
            GenerateDraftResponse, GenerateOutlineResponse, UpdateBriefRequest,
        },
        credit::ActionType,
        draft::{ContentDraft, DraftStatus, count_words},
        organization::OrgRole,
        project::{Project, ProjectSettings},
        response::{ApiResponse, MessageResponse, OffsetPage},
    },
    services::{
        access, content_generator, credit_service,
        seo_scoring::{self, BriefTargets},
    },
    state::AppState,
};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 100;

async fn find_brief(pool: &DbPool, id: Uuid) -> Result<Option<ContentBrief>, AppError> {
    let brief = sqlx::query_as::<_, ContentBrief>(&format!("{BRIEF_SELECT} WHERE b.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(brief)
}

/// Load a brief and require `required` in its organization. Returns the project too.
async fn authorized_brief(
    pool: &DbPool,
    auth: &AuthContext,
    id: Uuid,
    required: OrgRole,
) -> Result<(ContentBrief, Project), AppError> {
    let brief = find_brief(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Brief"))?;
    let project = access::authorize_project(pool, auth, brief.project_id, required, "Brief").await?;
    Ok((brief, project))
}

async fn project_settings(pool: &DbPool, project_id: Uuid) -> Result<Option<ProjectSettings>, AppError> {
    let settings =
        sqlx::query_as::<_, ProjectSettings>("SELECT * FROM project_settings WHERE project_id = $1")
            .bind(project_id)
            .fetch_optional(pool)
            .await?;
    Ok(settings)
}

/// Reject cluster or keyword references that point into another project.
async fn check_references(
    pool: &DbPool,
    project_id: Uuid,
    cluster_id: Option<Uuid>,
    target_keyword_id: Option<Uuid>,
) -> Result<(), AppError> {
    if let Some(cluster_id) = cluster_id {
        let found: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM topic_clusters WHERE id = $1 AND project_id = $2",
        )
        .bind(cluster_id)
        .bind(project_id)
        .fetch_optional(pool)
        .await?;
        if found.is_none() {
            return Err(AppError::invalid("cluster_id does not belong to this project"));
        }
    }

    if let Some(keyword_id) = target_keyword_id {
        let found: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM keywords WHERE id = $1 AND project_id = $2")
                .bind(keyword_id)
                .bind(project_id)
                .fetch_optional(pool)
                .await?;
        if found.is_none() {
            return Err(AppError::invalid(
                "target_keyword_id does not belong to this project",
            ));
        }
    }

    Ok(())
}

fn validate_word_count(count: Option<i32>) -> Result<(), AppError> {
    match count {
        Some(n) if n <= 0 => Err(AppError::invalid(
            "recommended_word_count must be positive",
        )),
        _ => Ok(()),
    }
}

/// List briefs visible to the caller, newest first.
///
/// # Query Parameters
///
/// - `project_id`, `cluster_id`: optional filters
/// - `limit` (default 50, max 100), `offset` (default 0)
pub async fn list_briefs(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<BriefListQuery>,
) -> Result<Json<ApiResponse<BriefListResponse>>, AppError> {
    if let Some(project_id) = query.project_id {
        access::check_project_access(&pool, &auth, project_id, OrgRole::Viewer).await?;
    }

    let org_ids = access::accessible_org_ids(&pool, auth.user_id).await?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let filter = r#"
        JOIN projects p ON p.id = b.project_id
        WHERE (p.org_id = ANY($1) OR $2)
          AND ($3::uuid IS NULL OR b.project_id = $3)
          AND ($4::uuid IS NULL OR b.cluster_id = $4)
    "#;

    let briefs = sqlx::query_as::<_, ContentBrief>(&format!(
        "{BRIEF_SELECT} {filter} ORDER BY b.created_at DESC LIMIT $5 OFFSET $6"
    ))
    .bind(&org_ids)
    .bind(auth.is_super_admin())
    .bind(query.project_id)
    .bind(query.cluster_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM content_briefs b {filter}"
    ))
    .bind(&org_ids)
    .bind(auth.is_super_admin())
    .bind(query.project_id)
    .bind(query.cluster_id)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::ok(BriefListResponse {
        briefs,
        pagination: OffsetPage::new(total, limit, offset),
    }))
}

/// Create a brief.
///
/// # Request Body
///
/// ```json
/// {
///   "project_id": "550e8400-e29b-41d4-a716-446655440000",
///   "target_keyword_id": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
///   "headings": ["Why cushioning matters"],
///   "entities": ["drop", {"term": "rock plate"}],
///   "faq": [{"question": "How long do trail shoes last?"}],
///   "recommended_word_count": 1800
/// }
/// ```
pub async fn create_brief(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateBriefRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ContentBrief>>), AppError> {
    let project_id = request
        .project_id
        .ok_or_else(|| AppError::invalid("project_id is required"))?;
    validate_word_count(request.recommended_word_count)?;
    access::check_project_access(&pool, &auth, project_id, OrgRole::Editor).await?;
    check_references(&pool, project_id, request.cluster_id, request.target_keyword_id).await?;

    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO content_briefs
            (project_id, cluster_id, target_keyword_id, headings, entities, faq,
             internal_links, external_refs, recommended_word_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(project_id)
    .bind(request.cluster_id)
    .bind(request.target_keyword_id)
    .bind(&request.headings)
    .bind(&request.entities)
    .bind(&request.faq)
    .bind(&request.internal_links)
    .bind(&request.external_refs)
    .bind(request.recommended_word_count)
    .fetch_one(&pool)
    .await?;

    let brief = find_brief(&pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Brief"))?;
    Ok(ApiResponse::created(brief))
}

pub async fn get_brief(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<BriefDetail>>, AppError> {
    let (brief, _) = authorized_brief(&pool, &auth, id, OrgRole::Viewer).await?;

    let drafts = sqlx::query_as::<_, BriefDraftSummary>(
        r#"
        SELECT id, version, status, seo_score, created_at
        FROM content_drafts
        WHERE brief_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(id)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::ok(BriefDetail { brief, drafts }))
}

pub async fn update_brief(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateBriefRequest>,
) -> Result<Json<ApiResponse<ContentBrief>>, AppError> {
    validate_word_count(request.recommended_word_count)?;
    let (brief, _) = authorized_brief(&pool, &auth, id, OrgRole::Editor).await?;
    check_references(&pool, brief.project_id, request.cluster_id, request.target_keyword_id)
        .await?;

    sqlx::query(
        r#"
        UPDATE content_briefs
        SET cluster_id = COALESCE($2, cluster_id),
            target_keyword_id = COALESCE($3, target_keyword_id),
            headings = COALESCE($4, headings),
            entities = COALESCE($5, entities),
            faq = COALESCE($6, faq),
            internal_links = COALESCE($7, internal_links),
            external_refs = COALESCE($8, external_refs),
            recommended_word_count = COALESCE($9, recommended_word_count),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(request.cluster_id)
    .bind(request.target_keyword_id)
    .bind(&request.headings)
    .bind(&request.entities)
    .bind(&request.faq)
    .bind(&request.internal_links)
    .bind(&request.external_refs)
    .bind(request.recommended_word_count)
    .execute(&pool)
    .await?;

    let brief = find_brief(&pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Brief"))?;
    Ok(ApiResponse::ok(brief))
}

pub async fn delete_brief(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    authorized_brief(&pool, &auth, id, OrgRole::Editor).await?;

    sqlx::query("DELETE FROM content_briefs WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(ApiResponse::ok(MessageResponse::new("Brief deleted successfully")))
}

/// Generate an outline for a brief.
///
/// # Process
///
/// 1. Price one OUTLINE action and check the wallet covers it (402 otherwise)
/// 2. Ask the AI provider for a markdown outline and parse it into a heading tree
/// 3. Deduct the credits with the brief as reference
pub async fn generate_outline(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<GenerateOutlineResponse>>, AppError> {
    let pool = &state.pool;
    let (brief, project) = authorized_brief(pool, &auth, id, OrgRole::Editor).await?;

    let cost = credit_service::action_cost(pool, ActionType::Outline, 1).await?;
    credit_service::ensure_credits(pool, project.org_id, cost).await?;

    let settings = project_settings(pool, project.id).await?;
    let outline =
        content_generator::generate_outline(state.ai.as_ref(), &brief, settings.as_ref()).await?;

    credit_service::deduct_credits(
        pool,
        project.org_id,
        cost,
        "Outline generation",
        Some(brief.id.to_string()),
        json!({ "brief_id": brief.id, "keyword": brief.target_keyword }),
    )
    .await?;

    Ok(ApiResponse::ok(GenerateOutlineResponse {
        outline,
        cost,
        message: format!("Outline generated successfully. {cost} credits deducted."),
    }))
}

/// Missing or empty body means "generate the outline and score the result".
fn draft_request(body: Option<Json<GenerateDraftRequest>>) -> GenerateDraftRequest {
    body.map(|Json(r)| r).unwrap_or_default()
}

/// Generate a full draft for a brief.
///
/// # Request Body
///
/// ```json
/// { "outline": [{"heading": "Guide", "level": 1}], "auto_score": true }
/// ```
///
/// Both fields are optional. Without an outline one is generated first (not charged
/// separately). The draft row and the credit deduction are written in one transaction.
pub async fn generate_draft(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    body: Option<Json<GenerateDraftRequest>>,
) -> Result<Json<ApiResponse<GenerateDraftResponse>>, AppError> {
    let request = draft_request(body);
    let pool = &state.pool;
    let (brief, project) = authorized_brief(pool, &auth, id, OrgRole::Editor).await?;

    let target_words = brief.word_count_or_default() as i64;
    let draft_cost = credit_service::action_cost(
        pool,
        ActionType::Draft,
        credit_service::draft_units(target_words),
    )
    .await?;
    let score_cost = if request.auto_score {
        credit_service::action_cost(pool, ActionType::SeoScore, 1).await?
    } else {
        0
    };
    let total_cost = draft_cost + score_cost;
    credit_service::ensure_credits(pool, project.org_id, total_cost).await?;

    let settings = project_settings(pool, project.id).await?;
    let outline = match request.outline {
        Some(outline) if !outline.is_empty() => outline,
        _ => {
            content_generator::generate_outline(state.ai.as_ref(), &brief, settings.as_ref())
                .await?
        }
    };
    let md_body =
        content_generator::generate_draft(state.ai.as_ref(), &brief, &outline, settings.as_ref())
            .await?;

    let word_count = count_words(&md_body);
    let title = content_generator::extract_title(&md_body, brief.target_keyword.as_deref());

    let analysis = request.auto_score.then(|| {
        seo_scoring::calculate_seo_score(&md_body, Some(&title), Some(&BriefTargets::from(&brief)))
    });

    let mut tx = pool.begin().await?;

    let draft = sqlx::query_as::<_, ContentDraft>(
        r#"
        INSERT INTO content_drafts
            (project_id, brief_id, title, md_body, word_count, status, seo_score, onpage_checklist, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1)
        RETURNING *
        "#,
    )
    .bind(project.id)
    .bind(brief.id)
    .bind(&title)
    .bind(&md_body)
    .bind(word_count)
    .bind(DraftStatus::Draft.as_str())
    .bind(analysis.as_ref().map(|a| a.score))
    .bind(analysis.as_ref().map(|a| a.to_checklist_json()))
    .fetch_one(&mut *tx)
    .await?;

    let reason = if request.auto_score {
        "Draft generation with SEO score"
    } else {
        "Draft generation"
    };
    credit_service::deduct_credits_in(
        &mut tx,
        project.org_id,
        total_cost,
        reason,
        Some(draft.id.to_string()),
        json!({
            "brief_id": brief.id,
            "draft_id": draft.id,
            "keyword": brief.target_keyword,
            "word_count": word_count,
            "draft_cost": draft_cost,
            "score_cost": score_cost,
        }),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(draft_id = %draft.id, brief_id = %brief.id, word_count, total_cost, "draft generated");

    Ok(ApiResponse::ok(GenerateDraftResponse {
        draft,
        cost: total_cost,
        breakdown: CostBreakdown {
            draft: draft_cost,
            seo_score: score_cost,
        },
        message: format!("Draft generated successfully. {total_cost} credits deducted."),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::FromRequest,
        http::{Request, header},
    };

    #[tokio::test]
    async fn bodyless_generate_draft_keeps_auto_score() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/briefs/550e8400-e29b-41d4-a716-446655440000/generate-draft")
            .body(Body::empty())
            .unwrap();

        let body = Option::<Json<GenerateDraftRequest>>::from_request(req, &())
            .await
            .unwrap();
        assert!(body.is_none());

        let request = draft_request(body);
        assert!(request.auto_score);
        assert!(request.outline.is_none());
    }

    #[tokio::test]
    async fn explicit_auto_score_false_is_respected() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/briefs/550e8400-e29b-41d4-a716-446655440000/generate-draft")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"auto_score": false}"#))
            .unwrap();

        let body = Option::<Json<GenerateDraftRequest>>::from_request(req, &())
            .await
            .unwrap();
        assert!(!draft_request(body).auto_score);
    }
}
