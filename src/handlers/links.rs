//! Internal-link suggestion HTTP handlers.
//!
//! Reading suggestions needs VIEWER in the draft's organization; generating, accepting,
//! dismissing and recomputing the graph need EDITOR.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        link::{
            AcceptLinkResponse, DraftLinksQuery, GraphRecomputeResult, LinkGraphNode,
            LinkSuggestion, ProjectLinksQuery, RecomputeGraphRequest, SuggestLinksRequest,
            SuggestionsResponse,
        },
        organization::OrgRole,
        project::Project,
        response::ApiResponse,
    },
    services::{access, link_suggester},
};

#[derive(Debug, Deserialize)]
pub struct GraphQuery {
    pub project_id: Option<Uuid>,
}

/// Authorize against the project owning `draft_id`.
async fn draft_project(
    pool: &DbPool,
    auth: &AuthContext,
    draft_id: Uuid,
    required: OrgRole,
) -> Result<Project, AppError> {
    let project_id: Option<Uuid> =
        sqlx::query_scalar("SELECT project_id FROM content_drafts WHERE id = $1")
            .bind(draft_id)
            .fetch_optional(pool)
            .await?;
    let project_id = project_id.ok_or_else(|| AppError::not_found("Draft"))?;
    access::authorize_project(pool, auth, project_id, required, "Draft").await
}

fn require_project_id(project_id: Option<Uuid>) -> Result<Uuid, AppError> {
    project_id.ok_or_else(|| AppError::invalid("project_id is required"))
}

pub async fn list_draft_links(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DraftLinksQuery>,
) -> Result<Json<ApiResponse<SuggestionsResponse>>, AppError> {
    let draft_id = query
        .draft_id
        .ok_or_else(|| AppError::invalid("draft_id is required"))?;
    draft_project(&pool, &auth, draft_id, OrgRole::Viewer).await?;

    let suggestions =
        link_suggester::list_for_draft(&pool, draft_id, query.include_dismissed).await?;
    Ok(ApiResponse::ok(SuggestionsResponse { suggestions }))
}

/// Generate fresh suggestions for a draft.
///
/// # Request Body
///
/// ```json
/// { "draft_id": "550e8400-e29b-41d4-a716-446655440000", "limit": 5 }
/// ```
pub async fn suggest_links(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<SuggestLinksRequest>,
) -> Result<Json<ApiResponse<SuggestionsResponse>>, AppError> {
    let draft_id = request
        .draft_id
        .ok_or_else(|| AppError::invalid("draft_id is required"))?;
    let project = draft_project(&pool, &auth, draft_id, OrgRole::Editor).await?;

    let limit = link_suggester::clamp_limit(request.limit);
    let suggestions = link_suggester::suggest_links(&pool, draft_id, project.id, limit).await?;

    tracing::info!(%draft_id, count = suggestions.len(), "link suggestions generated");

    Ok(ApiResponse::ok(SuggestionsResponse { suggestions }))
}

async fn authorized_suggestion(
    pool: &DbPool,
    auth: &AuthContext,
    id: Uuid,
) -> Result<LinkSuggestion, AppError> {
    let suggestion = link_suggester::find_suggestion(pool, id).await?;
    draft_project(pool, auth, suggestion.from_draft_id, OrgRole::Editor).await?;
    Ok(suggestion)
}

pub async fn accept_link(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<AcceptLinkResponse>>, AppError> {
    authorized_suggestion(&pool, &auth, id).await?;

    let (suggestion, draft) = link_suggester::accept_suggestion(&pool, id).await?;
    let message = if draft.is_some() {
        "Suggestion accepted and link added to draft"
    } else {
        "Suggestion already accepted"
    };

    Ok(ApiResponse::ok(AcceptLinkResponse {
        message: message.to_string(),
        suggestion,
        draft,
    }))
}

pub async fn dismiss_link(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LinkSuggestion>>, AppError> {
    authorized_suggestion(&pool, &auth, id).await?;

    let suggestion = link_suggester::dismiss_suggestion(&pool, id).await?;
    Ok(ApiResponse::ok(suggestion))
}

/// Suggestions across a project. `status` is `pending` (default), `accepted` or `all`.
pub async fn list_project_links(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ProjectLinksQuery>,
) -> Result<Json<ApiResponse<SuggestionsResponse>>, AppError> {
    let project_id = require_project_id(query.project_id)?;
    access::check_project_access(&pool, &auth, project_id, OrgRole::Viewer).await?;

    let suggestions = link_suggester::list_for_project(&pool, project_id, query.status).await?;
    Ok(ApiResponse::ok(SuggestionsResponse { suggestions }))
}

pub async fn recompute_graph(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<RecomputeGraphRequest>,
) -> Result<Json<ApiResponse<GraphRecomputeResult>>, AppError> {
    let project_id = require_project_id(request.project_id)?;
    access::check_project_access(&pool, &auth, project_id, OrgRole::Editor).await?;

    let result = link_suggester::recompute_graph(&pool, project_id).await?;
    Ok(ApiResponse::ok(result))
}

pub async fn list_graph(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<GraphQuery>,
) -> Result<Json<ApiResponse<Vec<LinkGraphNode>>>, AppError> {
    let project_id = require_project_id(query.project_id)?;
    access::check_project_access(&pool, &auth, project_id, OrgRole::Viewer).await?;

    let nodes = link_suggester::list_graph(&pool, project_id).await?;
    Ok(ApiResponse::ok(nodes))
}
