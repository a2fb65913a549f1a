//! Keyword HTTP handlers.
//!
//! - GET /api/keywords - Paginated keywords of a project, optional term search
//! - POST /api/keywords - Create one keyword, or bulk import with a `keywords` array
//! - GET /api/keywords/stats - Per-project keyword statistics
//! - GET/PATCH/DELETE /api/keywords/{id}

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::{AppError, is_unique_violation},
    middleware::auth::AuthContext,
    models::{
        keyword::{
            BulkImportRequest, BulkImportResponse, CreateKeywordRequest, Keyword,
            KeywordListQuery, KeywordSource, KeywordStats, KeywordWriteRequest, ProjectQuery,
            TopKeyword, UpdateKeywordRequest, validate_difficulty,
        },
        organization::OrgRole,
        response::{ApiResponse, MessageResponse, Pagination},
    },
    services::access,
};

const TOP_KEYWORD_LIMIT: i64 = 10;

/// `%term%` pattern for ILIKE with the wildcard characters escaped.
fn contains_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn require_project(project_id: Option<Uuid>) -> Result<Uuid, AppError> {
    project_id.ok_or_else(|| AppError::invalid("project_id is required"))
}

/// List keywords of a project, newest first.
///
/// # Query Parameters
///
/// - `project_id` (required)
/// - `search`: case-insensitive substring of the term
/// - `page`, `page_size`: defaults 1 and 20
pub async fn list_keywords(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<KeywordListQuery>,
) -> Result<Json<ApiResponse<Vec<Keyword>>>, AppError> {
    let project_id = require_project(query.project_id)?;
    access::check_project_access(&pool, &auth, project_id, OrgRole::Viewer).await?;

    let paging = query.paging();
    let pattern = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(contains_pattern);

    let keywords = sqlx::query_as::<_, Keyword>(
        r#"
        SELECT * FROM keywords
        WHERE project_id = $1 AND ($2::text IS NULL OR term ILIKE $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(project_id)
    .bind(&pattern)
    .bind(paging.page_size())
    .bind(paging.offset())
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM keywords WHERE project_id = $1 AND ($2::text IS NULL OR term ILIKE $2)",
    )
    .bind(project_id)
    .bind(&pattern)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::paginated(
        keywords,
        Pagination::new(paging.page(), paging.page_size(), total),
    ))
}

/// Create a keyword or import a batch.
///
/// A body with a `keywords` array is a bulk import: every entry gets source `IMPORT`
/// and terms already in the project are skipped. Otherwise a single keyword is created
/// and a duplicate term is a 409.
pub async fn create_keywords(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<KeywordWriteRequest>,
) -> Result<Response, AppError> {
    match request {
        KeywordWriteRequest::Bulk(bulk) => {
            let imported = import_keywords(&pool, &auth, bulk).await?;
            Ok(ApiResponse::created(imported).into_response())
        }
        KeywordWriteRequest::Single(single) => {
            let keyword = create_keyword(&pool, &auth, single).await?;
            Ok(ApiResponse::created(keyword).into_response())
        }
    }
}

async fn create_keyword(
    pool: &DbPool,
    auth: &AuthContext,
    request: CreateKeywordRequest,
) -> Result<Keyword, AppError> {
    let term = request.term.trim();
    if term.is_empty() {
        return Err(AppError::invalid("term is required"));
    }
    validate_difficulty(request.difficulty).map_err(AppError::InvalidRequest)?;
    access::check_project_access(pool, auth, request.project_id, OrgRole::Editor).await?;

    sqlx::query_as::<_, Keyword>(
        r#"
        INSERT INTO keywords (project_id, term, source, search_volume, difficulty, tags)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(request.project_id)
    .bind(term)
    .bind(request.source.as_str())
    .bind(request.search_volume)
    .bind(request.difficulty)
    .bind(&request.tags)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Keyword already exists in this project".to_string())
        } else {
            AppError::Database(e)
        }
    })
}

async fn import_keywords(
    pool: &DbPool,
    auth: &AuthContext,
    request: BulkImportRequest,
) -> Result<BulkImportResponse, AppError> {
    for entry in &request.keywords {
        validate_difficulty(entry.difficulty).map_err(AppError::InvalidRequest)?;
    }
    access::check_project_access(pool, auth, request.project_id, OrgRole::Editor).await?;

    let mut tx = pool.begin().await?;
    let mut imported = 0u64;

    for entry in &request.keywords {
        let term = entry.term.trim();
        if term.is_empty() {
            continue;
        }
        let result = sqlx::query(
            r#"
            INSERT INTO keywords (project_id, term, source, search_volume, difficulty, tags)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (project_id, term) DO NOTHING
            "#,
        )
        .bind(request.project_id)
        .bind(term)
        .bind(KeywordSource::Import.as_str())
        .bind(entry.search_volume)
        .bind(entry.difficulty)
        .bind(entry.tags.clone().unwrap_or_default())
        .execute(&mut *tx)
        .await?;
        imported += result.rows_affected();
    }

    tx.commit().await?;

    tracing::info!(project_id = %request.project_id, imported, "keywords imported");

    Ok(BulkImportResponse {
        imported,
        message: format!("Successfully imported {imported} keywords"),
    })
}

pub async fn keyword_stats(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<ApiResponse<KeywordStats>>, AppError> {
    let project_id = require_project(query.project_id)?;
    access::check_project_access(&pool, &auth, project_id, OrgRole::Viewer).await?;

    let by_source: Vec<(String, i64)> = sqlx::query_as(
        "SELECT source, COUNT(*) FROM keywords WHERE project_id = $1 GROUP BY source",
    )
    .bind(project_id)
    .fetch_all(&pool)
    .await?;

    let avg_difficulty: Option<f64> = sqlx::query_scalar(
        "SELECT AVG(difficulty)::float8 FROM keywords WHERE project_id = $1 AND difficulty IS NOT NULL",
    )
    .bind(project_id)
    .fetch_one(&pool)
    .await?;

    let top_keywords = sqlx::query_as::<_, TopKeyword>(
        r#"
        SELECT id, term, search_volume, difficulty FROM keywords
        WHERE project_id = $1 AND search_volume IS NOT NULL
        ORDER BY search_volume DESC
        LIMIT $2
        "#,
    )
    .bind(project_id)
    .bind(TOP_KEYWORD_LIMIT)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::ok(KeywordStats {
        total: by_source.iter().map(|(_, n)| n).sum(),
        by_source: by_source.into_iter().collect(),
        avg_difficulty: avg_difficulty.unwrap_or(0.0),
        top_keywords,
    }))
}

/// Load a keyword and require `required` in its project's organization.
async fn authorized_keyword(
    pool: &DbPool,
    auth: &AuthContext,
    id: Uuid,
    required: OrgRole,
) -> Result<Keyword, AppError> {
    let keyword = sqlx::query_as::<_, Keyword>("SELECT * FROM keywords WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Keyword"))?;

    access::authorize_project(pool, auth, keyword.project_id, required, "Keyword").await?;
    Ok(keyword)
}

pub async fn get_keyword(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Keyword>>, AppError> {
    let keyword = authorized_keyword(&pool, &auth, id, OrgRole::Viewer).await?;
    Ok(ApiResponse::ok(keyword))
}

pub async fn update_keyword(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateKeywordRequest>,
) -> Result<Json<ApiResponse<Keyword>>, AppError> {
    validate_difficulty(request.difficulty).map_err(AppError::InvalidRequest)?;
    if request.term.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::invalid("term cannot be empty"));
    }
    authorized_keyword(&pool, &auth, id, OrgRole::Editor).await?;

    let keyword = sqlx::query_as::<_, Keyword>(
        r#"
        UPDATE keywords
        SET term = COALESCE($2, term),
            search_volume = COALESCE($3, search_volume),
            difficulty = COALESCE($4, difficulty),
            tags = COALESCE($5, tags)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(request.term.as_deref().map(str::trim))
    .bind(request.search_volume)
    .bind(request.difficulty)
    .bind(&request.tags)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Keyword already exists in this project".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    Ok(ApiResponse::ok(keyword))
}

pub async fn delete_keyword(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    authorized_keyword(&pool, &auth, id, OrgRole::Editor).await?;

    sqlx::query("DELETE FROM keywords WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    Ok(ApiResponse::ok(MessageResponse::new("Keyword deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("shoes"), "%shoes%");
        assert_eq!(contains_pattern("100%_cotton"), "%100\\%\\_cotton%");
    }
}
