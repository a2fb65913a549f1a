//! Content calendar HTTP handlers.
//!
//! Calendar items may reference a draft through `ref_id`. Scheduling an item moves the
//! draft to `SCHEDULED`; cancelling or deleting it moves the draft back to `READY`.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        calendar::{
            CalendarItem, CalendarItemType, CalendarQuery, CreateCalendarItemRequest,
            STATUS_CANCELLED, STATUS_SCHEDULED, UpdateCalendarItemRequest,
        },
        draft::DraftStatus,
        organization::OrgRole,
        project::Project,
        response::{ApiResponse, MessageResponse},
    },
    services::{access, export_service},
};

const CALENDAR_SELECT: &str = r#"
    SELECT c.id, c.project_id, c.title, c.item_type, c.start_at, c.end_at, c.status,
           c.ref_id, c.assigned_to, c.metadata, c.created_at,
           d.title AS draft_title, d.status AS draft_status
    FROM calendar_items c
    LEFT JOIN content_drafts d ON d.id = c.ref_id
"#;

/// Default listing window when `end` is absent.
const DEFAULT_WINDOW_DAYS: i64 = 30;

async fn find_item(pool: &DbPool, id: Uuid) -> Result<Option<CalendarItem>, AppError> {
    let item = sqlx::query_as::<_, CalendarItem>(&format!("{CALENDAR_SELECT} WHERE c.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(item)
}

async fn authorized_item(
    pool: &DbPool,
    auth: &AuthContext,
    id: Uuid,
) -> Result<(CalendarItem, Project), AppError> {
    let item = find_item(pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Calendar item"))?;
    let project =
        access::authorize_project(pool, auth, item.project_id, OrgRole::Editor, "Calendar item")
            .await?;
    Ok((item, project))
}

/// Items of a project whose start falls in `[start, end]`, earliest first.
///
/// `start` defaults to now and `end` to 30 days after now.
pub async fn list_items(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<ApiResponse<Vec<CalendarItem>>>, AppError> {
    let project_id = query
        .project_id
        .ok_or_else(|| AppError::invalid("project_id is required"))?;
    access::check_project_access(&pool, &auth, project_id, OrgRole::Viewer).await?;

    let now = Utc::now();
    let start = query.start.unwrap_or(now);
    let end = query.end.unwrap_or(now + Duration::days(DEFAULT_WINDOW_DAYS));

    let items = sqlx::query_as::<_, CalendarItem>(&format!(
        "{CALENDAR_SELECT} WHERE c.project_id = $1 AND c.start_at >= $2 AND c.start_at <= $3 ORDER BY c.start_at ASC"
    ))
    .bind(project_id)
    .bind(start)
    .bind(end)
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::ok(items))
}

/// Schedule an item.
///
/// # Request Body
///
/// ```json
/// {
///   "project_id": "550e8400-e29b-41d4-a716-446655440000",
///   "title": "Publish trail shoe guide",
///   "item_type": "ARTICLE",
///   "start_at": "2025-03-01T09:00:00Z",
///   "ref_id": "6ba7b810-9dad-11d1-80b4-00c04fd430c8"
/// }
/// ```
///
/// An `ARTICLE` with a `ref_id` also queues a background markdown export of the draft.
pub async fn create_item(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateCalendarItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CalendarItem>>), AppError> {
    let (Some(project_id), Some(title), Some(start_at)) =
        (request.project_id, request.title.as_deref(), request.start_at)
    else {
        return Err(AppError::invalid("project_id, title and start_at are required"));
    };
    if title.trim().is_empty() {
        return Err(AppError::invalid("title must not be empty"));
    }
    let end_at = request.end_at.unwrap_or(start_at);
    if end_at < start_at {
        return Err(AppError::invalid("end_at must not be before start_at"));
    }

    let project = access::check_project_access(&pool, &auth, project_id, OrgRole::Editor).await?;

    if let Some(ref_id) = request.ref_id {
        let found: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM content_drafts WHERE id = $1 AND project_id = $2",
        )
        .bind(ref_id)
        .bind(project_id)
        .fetch_optional(&pool)
        .await?;
        if found.is_none() {
            return Err(AppError::invalid("ref_id does not belong to this project"));
        }
    }

    let mut tx = pool.begin().await?;

    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO calendar_items
            (project_id, title, item_type, start_at, end_at, status, ref_id, assigned_to, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id
        "#,
    )
    .bind(project_id)
    .bind(title)
    .bind(request.item_type.as_str())
    .bind(start_at)
    .bind(end_at)
    .bind(request.status.as_deref().unwrap_or(STATUS_SCHEDULED))
    .bind(request.ref_id)
    .bind(request.assigned_to)
    .bind(&request.metadata)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(ref_id) = request.ref_id {
        sqlx::query(
            "UPDATE content_drafts SET status = $2, scheduled_for = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(ref_id)
        .bind(DraftStatus::Scheduled.as_str())
        .bind(start_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    if let (Some(ref_id), CalendarItemType::Article) = (request.ref_id, request.item_type) {
        match export_service::spawn_auto_export(&pool, project.org_id, project_id, ref_id).await {
            Ok(job_id) => tracing::info!(%job_id, draft_id = %ref_id, "auto export queued"),
            Err(e) => tracing::error!(draft_id = %ref_id, error = %e, "failed to queue auto export"),
        }
    }

    let item = find_item(&pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Calendar item"))?;
    Ok(ApiResponse::created(item))
}

pub async fn update_item(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCalendarItemRequest>,
) -> Result<Json<ApiResponse<CalendarItem>>, AppError> {
    let (item, _) = authorized_item(&pool, &auth, id).await?;

    let start_at = request.start_at.unwrap_or(item.start_at);
    let end_at = request.end_at.unwrap_or(item.end_at);
    if end_at < start_at {
        return Err(AppError::invalid("end_at must not be before start_at"));
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE calendar_items
        SET title = COALESCE($2, title),
            item_type = COALESCE($3, item_type),
            start_at = $4,
            end_at = $5,
            status = COALESCE($6, status),
            assigned_to = COALESCE($7, assigned_to),
            metadata = COALESCE($8, metadata)
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&request.title)
    .bind(request.item_type.map(|t| t.as_str()))
    .bind(start_at)
    .bind(end_at)
    .bind(&request.status)
    .bind(request.assigned_to)
    .bind(&request.metadata)
    .execute(&mut *tx)
    .await?;

    let rescheduled = request.start_at.is_some() || request.status.is_some();
    if let (Some(ref_id), true) = (item.ref_id, rescheduled) {
        let draft_status = if request.status.as_deref() == Some(STATUS_CANCELLED) {
            DraftStatus::Ready
        } else {
            DraftStatus::Scheduled
        };
        sqlx::query(
            "UPDATE content_drafts SET status = $2, scheduled_for = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(ref_id)
        .bind(draft_status.as_str())
        .bind(start_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    let item = find_item(&pool, id)
        .await?
        .ok_or_else(|| AppError::not_found("Calendar item"))?;
    Ok(ApiResponse::ok(item))
}

pub async fn delete_item(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    let (item, _) = authorized_item(&pool, &auth, id).await?;

    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM calendar_items WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if let Some(ref_id) = item.ref_id {
        sqlx::query(
            "UPDATE content_drafts SET status = $2, scheduled_for = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(ref_id)
        .bind(DraftStatus::Ready.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(ApiResponse::ok(MessageResponse::new("Calendar item removed")))
}
