use axum::{
    Extension, Json,
    extract::{Query, State},
};

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        export::{ExportHistoryEntry, ExportHistoryQuery},
        organization::OrgRole,
        response::ApiResponse,
    },
    services::{access, export_service},
};

/// Export history of the caller's organizations, newest first.
///
/// # Query Parameters
///
/// - `project_id`, `draft_id`: optional filters
/// - `limit`: default 50, max 200
pub async fn export_history(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ExportHistoryQuery>,
) -> Result<Json<ApiResponse<Vec<ExportHistoryEntry>>>, AppError> {
    let org_ids = match query.project_id {
        Some(project_id) => {
            let project =
                access::check_project_access(&pool, &auth, project_id, OrgRole::Viewer).await?;
            vec![project.org_id]
        }
        None => access::accessible_org_ids(&pool, auth.user_id).await?,
    };

    let entries =
        export_service::list_history(&pool, &org_ids, query.project_id, query.draft_id, query.limit)
            .await?;
    Ok(ApiResponse::ok(entries))
}
