//! Project HTTP handlers.
//!
//! - GET /api/projects - Projects of every organization the caller belongs to
//! - POST /api/projects - Create a project in the caller's primary organization
//! - GET /api/projects/{id} - Project with settings and counts
//! - PATCH /api/projects/{id} - Update project and settings (org ADMIN)
//! - DELETE /api/projects/{id} - Delete project and everything in it (org OWNER)

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        organization::OrgRole,
        project::{CreateProjectRequest, Project, ProjectOverview, UpdateProjectRequest},
        response::{ApiResponse, MessageResponse},
    },
    services::access,
};

const DEFAULT_LOCALE: &str = "en-US";

/// Projects joined with their settings and child counts.
const OVERVIEW_SELECT: &str = r#"
    SELECT p.id, p.org_id, p.name, p.niche, p.locale,
           s.site_name, s.target_domain, s.tone, s.target_audience,
           (SELECT COUNT(*) FROM keywords k WHERE k.project_id = p.id) AS keyword_count,
           (SELECT COUNT(*) FROM topic_clusters c WHERE c.project_id = p.id) AS cluster_count,
           (SELECT COUNT(*) FROM content_drafts d WHERE d.project_id = p.id) AS draft_count,
           p.created_at, p.updated_at
    FROM projects p
    LEFT JOIN project_settings s ON s.project_id = p.id
"#;

async fn load_overview(pool: &DbPool, project_id: Uuid) -> Result<ProjectOverview, AppError> {
    sqlx::query_as::<_, ProjectOverview>(&format!("{OVERVIEW_SELECT} WHERE p.id = $1"))
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))
}

pub async fn list_projects(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<Vec<ProjectOverview>>>, AppError> {
    let org_ids = access::accessible_org_ids(&pool, auth.user_id).await?;

    let projects = sqlx::query_as::<_, ProjectOverview>(&format!(
        "{OVERVIEW_SELECT} WHERE p.org_id = ANY($1) ORDER BY p.created_at DESC"
    ))
    .bind(&org_ids)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::ok(projects))
}

/// Create a project.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "Trail Running Blog",
///   "niche": "outdoor sports",
///   "site_name": "Run Wild",
///   "target_domain": "runwild.example",
///   "tone": "FRIENDLY"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: the project overview
/// - **400**: name shorter than 2 characters
/// - **403**: caller is only a viewer of their organization
pub async fn create_project(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProjectOverview>>), AppError> {
    request.validate().map_err(AppError::InvalidRequest)?;

    let org_id = access::primary_org_id(&pool, auth.user_id).await?;
    access::check_org_access(&pool, &auth, org_id, OrgRole::Editor).await?;

    let mut tx = pool.begin().await?;

    let project = sqlx::query_as::<_, Project>(
        r#"
        INSERT INTO projects (org_id, name, niche, locale)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(org_id)
    .bind(request.name.trim())
    .bind(&request.niche)
    .bind(request.locale.as_deref().unwrap_or(DEFAULT_LOCALE))
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO project_settings (project_id, site_name, target_domain, tone, target_audience)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(project.id)
    .bind(&request.site_name)
    .bind(&request.target_domain)
    .bind(&request.tone)
    .bind(&request.target_audience)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(project_id = %project.id, %org_id, "project created");

    let overview = load_overview(&pool, project.id).await?;
    Ok(ApiResponse::created(overview))
}

pub async fn get_project(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProjectOverview>>, AppError> {
    access::check_project_access(&pool, &auth, id, OrgRole::Viewer).await?;
    Ok(ApiResponse::ok(load_overview(&pool, id).await?))
}

pub async fn update_project(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProjectRequest>,
) -> Result<Json<ApiResponse<ProjectOverview>>, AppError> {
    request.validate().map_err(AppError::InvalidRequest)?;
    access::check_project_access(&pool, &auth, id, OrgRole::Admin).await?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE projects
        SET name = COALESCE($2, name),
            niche = COALESCE($3, niche),
            locale = COALESCE($4, locale),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(request.name.as_deref().map(str::trim))
    .bind(&request.niche)
    .bind(&request.locale)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO project_settings (project_id, site_name, target_domain, tone, target_audience)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (project_id) DO UPDATE SET
            site_name = COALESCE(EXCLUDED.site_name, project_settings.site_name),
            target_domain = COALESCE(EXCLUDED.target_domain, project_settings.target_domain),
            tone = COALESCE(EXCLUDED.tone, project_settings.tone),
            target_audience = COALESCE(EXCLUDED.target_audience, project_settings.target_audience)
        "#,
    )
    .bind(id)
    .bind(&request.site_name)
    .bind(&request.target_domain)
    .bind(&request.tone)
    .bind(&request.target_audience)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ApiResponse::ok(load_overview(&pool, id).await?))
}

pub async fn delete_project(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    access::check_project_access(&pool, &auth, id, OrgRole::Owner).await?;

    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    tracing::info!(project_id = %id, "project deleted");
    Ok(ApiResponse::ok(MessageResponse::new("Project deleted")))
}
