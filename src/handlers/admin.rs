//! Platform administration endpoints.
//!
//! Mounted behind [`crate::middleware::auth::require_admin`]. Every state change is written
//! to `activity_logs` in the same transaction as the change itself.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        activity::{ActivityAction, PlatformStats, RecentActivity},
        credit::{CreditReason, GrantCreditsRequest, GrantCreditsResponse},
        organization::OrgOverview,
        partner::{PartnerOptin, PartnerReviewEntry},
        response::{ApiResponse, MessageResponse, PageParams, Pagination},
        user::{PlatformRole, UpdateRoleRequest, User},
    },
    services::{activity_log, credit_service},
};

/// Platform counters plus activity over the last seven days.
pub async fn platform_stats(
    State(pool): State<DbPool>,
) -> Result<Json<ApiResponse<PlatformStats>>, AppError> {
    let since = Utc::now() - Duration::days(7);

    let (total_users, total_orgs, total_projects, failed_jobs): (i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM orgs),
                (SELECT COUNT(*) FROM projects),
                (SELECT COUNT(*) FROM jobs WHERE status = 'FAILED')
            "#,
        )
        .fetch_one(&pool)
        .await?;

    let (issued, spent): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(delta) FILTER (WHERE delta > 0), 0)::BIGINT,
            COALESCE(-SUM(delta) FILTER (WHERE delta < 0), 0)::BIGINT
        FROM credit_txns
        "#,
    )
    .fetch_one(&pool)
    .await?;

    let (new_users, credit_purchases, drafts_created): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users WHERE created_at >= $1),
            (SELECT COUNT(*) FROM credit_txns WHERE reason = 'PURCHASE' AND created_at >= $1),
            (SELECT COUNT(*) FROM content_drafts WHERE created_at >= $1)
        "#,
    )
    .bind(since)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::ok(PlatformStats {
        total_users,
        total_orgs,
        total_credits_issued: issued,
        total_credits_spent: spent,
        total_projects,
        failed_jobs,
        recent_activity: RecentActivity {
            new_users,
            credit_purchases,
            drafts_created,
        },
    }))
}

/// Organizations with owner, wallet and counts, newest first.
pub async fn list_organizations(
    State(pool): State<DbPool>,
    Query(paging): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<OrgOverview>>>, AppError> {
    let orgs = sqlx::query_as::<_, OrgOverview>(
        r#"
        SELECT o.id, o.name, u.email AS owner_email, u.name AS owner_name,
               w.balance, w.lifetime_spent,
               (SELECT COUNT(*) FROM projects p WHERE p.org_id = o.id) AS project_count,
               (SELECT COUNT(*) FROM org_users m WHERE m.org_id = o.id) AS member_count,
               o.created_at
        FROM orgs o
        JOIN users u ON u.id = o.owner_user_id
        LEFT JOIN credit_wallets w ON w.org_id = o.id
        ORDER BY o.created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(paging.page_size())
    .bind(paging.offset())
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orgs")
        .fetch_one(&pool)
        .await?;

    Ok(ApiResponse::paginated(
        orgs,
        Pagination::new(paging.page(), paging.page_size(), total),
    ))
}

pub async fn list_users(
    State(pool): State<DbPool>,
    Query(paging): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<User>>>, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(paging.page_size())
    .bind(paging.offset())
    .fetch_all(&pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await?;

    Ok(ApiResponse::paginated(
        users,
        Pagination::new(paging.page(), paging.page_size(), total),
    ))
}

/// Roles an admin may assign. `SUPER_ADMIN` is only set directly in the database.
fn assignable_role(role: &str) -> Result<PlatformRole, AppError> {
    match role.parse::<PlatformRole>() {
        Ok(role @ (PlatformRole::User | PlatformRole::Admin)) => Ok(role),
        _ => Err(AppError::invalid("Invalid role")),
    }
}

/// Change a user's platform role.
///
/// # Request Body
///
/// ```json
/// { "role": "ADMIN" }
/// ```
pub async fn update_user_role(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let role = assignable_role(&request.role)?;

    let mut tx = pool.begin().await?;

    let current: Option<String> =
        sqlx::query_scalar("SELECT role FROM users WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
    let current = current.ok_or_else(|| AppError::not_found("User"))?;
    if current == PlatformRole::SuperAdmin.as_str() && !auth.is_super_admin() {
        return Err(AppError::forbidden("Cannot change a super admin's role"));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(role.as_str())
    .fetch_one(&mut *tx)
    .await?;

    activity_log::record(
        &mut tx,
        Some(auth.user_id),
        None,
        ActivityAction::UserRoleChanged,
        &format!("user:{id}"),
        json!({ "previous_role": current, "new_role": role.as_str(), "changed_by": auth.email }),
    )
    .await?;

    tx.commit().await?;

    Ok(ApiResponse::ok(user))
}

/// Grant credits to an organization.
///
/// # Request Body
///
/// ```json
/// { "org_id": "550e8400-e29b-41d4-a716-446655440000", "amount": 500, "reason": "Support goodwill" }
/// ```
pub async fn grant_credits(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<GrantCreditsRequest>,
) -> Result<Json<ApiResponse<GrantCreditsResponse>>, AppError> {
    let (Some(org_id), Some(amount)) = (request.org_id, request.amount) else {
        return Err(AppError::invalid("org_id and amount are required"));
    };
    if amount <= 0 {
        return Err(AppError::invalid("amount must be positive"));
    }

    let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM orgs WHERE id = $1")
        .bind(org_id)
        .fetch_optional(&pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::not_found("Organization"));
    }

    let reason = request
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Manual admin grant".to_string());

    let mut tx = pool.begin().await?;

    credit_service::add_credits_in(
        &mut tx,
        org_id,
        amount,
        CreditReason::AdminGrant,
        None,
        Some(json!({ "granted_by": auth.email, "grant_reason": reason })),
    )
    .await?;

    activity_log::record(
        &mut tx,
        Some(auth.user_id),
        Some(org_id),
        ActivityAction::CreditsGranted,
        &format!("org:{org_id}"),
        json!({ "credits": amount, "reason": reason, "granted_by": auth.email }),
    )
    .await?;

    let new_balance: i64 =
        sqlx::query_scalar("SELECT balance FROM credit_wallets WHERE org_id = $1")
            .bind(org_id)
            .fetch_one(&mut *tx)
            .await?;

    tx.commit().await?;

    Ok(ApiResponse::ok(GrantCreditsResponse {
        org_id,
        amount,
        new_balance,
    }))
}

/// Every partner opt-in with its organization, newest first.
pub async fn review_partners(
    State(pool): State<DbPool>,
) -> Result<Json<ApiResponse<Vec<PartnerReviewEntry>>>, AppError> {
    let entries = sqlx::query_as::<_, PartnerReviewEntry>(
        r#"
        SELECT p.id, p.org_id, o.name AS org_name, u.email AS owner_email,
               p.domains_allowed, p.rules, p.active, p.created_at
        FROM partner_optins p
        JOIN orgs o ON o.id = p.org_id
        JOIN users u ON u.id = o.owner_user_id
        ORDER BY p.created_at DESC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    Ok(ApiResponse::ok(entries))
}

pub async fn approve_partner(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PartnerOptin>>, AppError> {
    let mut tx = pool.begin().await?;

    let optin = sqlx::query_as::<_, PartnerOptin>(
        "UPDATE partner_optins SET active = true WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Partner"))?;

    activity_log::record(
        &mut tx,
        Some(auth.user_id),
        Some(optin.org_id),
        ActivityAction::PartnerApproved,
        &format!("partner:{id}"),
        json!({ "approved_by": auth.email, "approved_at": Utc::now() }),
    )
    .await?;

    tx.commit().await?;

    Ok(ApiResponse::ok(optin))
}

/// Reject a partner request. The opt-in row is removed.
pub async fn reject_partner(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    let mut tx = pool.begin().await?;

    let optin = sqlx::query_as::<_, PartnerOptin>(
        "DELETE FROM partner_optins WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Partner"))?;

    activity_log::record(
        &mut tx,
        Some(auth.user_id),
        Some(optin.org_id),
        ActivityAction::PartnerRejected,
        &format!("partner:{id}"),
        json!({
            "rejected_by": auth.email,
            "rejected_at": Utc::now(),
            "domains_requested": optin.domains_allowed,
        }),
    )
    .await?;

    tx.commit().await?;

    Ok(ApiResponse::ok(MessageResponse::new("Partner request rejected")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_user_and_admin_are_assignable() {
        assert_eq!(assignable_role("ADMIN").unwrap(), PlatformRole::Admin);
        assert_eq!(assignable_role("USER").unwrap(), PlatformRole::User);
        assert!(assignable_role("SUPER_ADMIN").is_err());
        assert!(assignable_role("admin").is_err());
    }
}
