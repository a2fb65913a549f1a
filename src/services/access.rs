//! Organization and project access checks.
//!
//! A user reaches an organization either as its owner or through an `org_users`
//! membership. Resources outside the caller's organizations are reported as not found;
//! a membership with too low a role is reported as forbidden. Super admins pass every check.

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{organization::OrgRole, project::Project},
};
use uuid::Uuid;

/// True when `actual` is at least `required` in the `VIEWER < EDITOR < ADMIN < OWNER` order.
pub fn role_satisfies(actual: OrgRole, required: OrgRole) -> bool {
    actual >= required
}

/// The organization a user acts in by default: the first one they own, otherwise
/// their earliest membership.
pub async fn primary_org_id(pool: &DbPool, user_id: Uuid) -> Result<Uuid, AppError> {
    let org_id: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT org_id FROM (
            SELECT id AS org_id, 0 AS rank, created_at FROM orgs WHERE owner_user_id = $1
            UNION ALL
            SELECT org_id, 1 AS rank, created_at FROM org_users WHERE user_id = $1
        ) candidates
        ORDER BY rank, created_at
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    org_id.ok_or_else(|| AppError::not_found("Organization"))
}

/// Every organization the user owns or belongs to.
pub async fn accessible_org_ids(pool: &DbPool, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id FROM orgs WHERE owner_user_id = $1
        UNION
        SELECT org_id FROM org_users WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// The user's effective role in an organization, `None` when they have no access.
///
/// Owning the organization counts as `OWNER` regardless of the membership row.
pub async fn org_role(
    pool: &DbPool,
    user_id: Uuid,
    org_id: Uuid,
) -> Result<Option<OrgRole>, AppError> {
    let row: Option<(Uuid, Option<String>)> = sqlx::query_as(
        r#"
        SELECT o.owner_user_id, m.role
        FROM orgs o
        LEFT JOIN org_users m ON m.org_id = o.id AND m.user_id = $2
        WHERE o.id = $1
        "#,
    )
    .bind(org_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    let Some((owner_id, member_role)) = row else {
        return Ok(None);
    };

    if owner_id == user_id {
        return Ok(Some(OrgRole::Owner));
    }

    Ok(member_role.and_then(|r| r.parse().ok()))
}

/// Require at least `required` in the organization.
pub async fn check_org_access(
    pool: &DbPool,
    auth: &AuthContext,
    org_id: Uuid,
    required: OrgRole,
) -> Result<(), AppError> {
    if auth.is_super_admin() {
        return Ok(());
    }

    match org_role(pool, auth.user_id, org_id).await? {
        None => Err(AppError::forbidden(
            "You do not have access to this organization",
        )),
        Some(role) if !role_satisfies(role, required) => Err(AppError::forbidden(format!(
            "{} role required",
            required.as_str()
        ))),
        Some(_) => Ok(()),
    }
}

/// Load a project and require at least `required` in its organization.
///
/// Projects of other organizations are reported as not found.
pub async fn check_project_access(
    pool: &DbPool,
    auth: &AuthContext,
    project_id: Uuid,
    required: OrgRole,
) -> Result<Project, AppError> {
    authorize_project(pool, auth, project_id, required, "Project").await
}

/// Like [`check_project_access`], but names `what` in the not-found error. Used when the
/// project was reached through a child resource such as a draft.
pub async fn authorize_project(
    pool: &DbPool,
    auth: &AuthContext,
    project_id: Uuid,
    required: OrgRole,
    what: &str,
) -> Result<Project, AppError> {
    let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found(what))?;

    if auth.is_super_admin() {
        return Ok(project);
    }

    match org_role(pool, auth.user_id, project.org_id).await? {
        None => Err(AppError::not_found(what)),
        Some(role) if !role_satisfies(role, required) => Err(AppError::forbidden(format!(
            "{} role required",
            required.as_str()
        ))),
        Some(_) => Ok(project),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_roles_satisfy_lower_requirements() {
        assert!(role_satisfies(OrgRole::Owner, OrgRole::Admin));
        assert!(role_satisfies(OrgRole::Editor, OrgRole::Editor));
        assert!(role_satisfies(OrgRole::Admin, OrgRole::Viewer));
    }

    #[test]
    fn lower_roles_are_refused() {
        assert!(!role_satisfies(OrgRole::Viewer, OrgRole::Editor));
        assert!(!role_satisfies(OrgRole::Admin, OrgRole::Owner));
    }
}
