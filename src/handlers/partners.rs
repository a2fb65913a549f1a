//! Partner network opt-in endpoints.
//!
//! An organization has at most one opt-in row. Saving it never activates it: activation is
//! done by a platform admin through the review endpoints.

use axum::{
    Extension, Json,
    extract::{Query, State},
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        organization::OrgRole,
        partner::{OptinQuery, OptinRequest, OptinResponse, PartnerOptin, PartnerOptinView},
        response::ApiResponse,
    },
    services::access,
};

/// Resolve the organization an opt-in call targets and check the caller's role in it.
async fn target_org(
    pool: &DbPool,
    auth: &AuthContext,
    org_id: Option<Uuid>,
    required: OrgRole,
) -> Result<Uuid, AppError> {
    let org_id = match org_id {
        Some(id) => id,
        None => access::primary_org_id(pool, auth.user_id).await?,
    };
    access::check_org_access(pool, auth, org_id, required).await?;
    Ok(org_id)
}

/// Lowercase, trim and dedupe domains, dropping empty entries and any scheme or path.
pub fn normalize_domains(domains: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in domains {
        let trimmed = raw.trim().to_lowercase();
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(&trimmed);
        let host = without_scheme
            .split('/')
            .next()
            .unwrap_or_default()
            .trim_start_matches("www.");
        if !host.is_empty() && !out.iter().any(|d| d == host) {
            out.push(host.to_string());
        }
    }
    out
}

async fn find_optin(pool: &DbPool, org_id: Uuid) -> Result<Option<PartnerOptin>, AppError> {
    let optin = sqlx::query_as::<_, PartnerOptin>("SELECT * FROM partner_optins WHERE org_id = $1")
        .bind(org_id)
        .fetch_optional(pool)
        .await?;
    Ok(optin)
}

/// The organization's opt-in, or an unsaved default (`id: "new"`) when none exists yet.
pub async fn get_optin(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<OptinQuery>,
) -> Result<Json<ApiResponse<OptinResponse>>, AppError> {
    let org_id = target_org(&pool, &auth, query.org_id, OrgRole::Viewer).await?;

    let opt_in = match find_optin(&pool, org_id).await? {
        Some(optin) => optin.into(),
        None => PartnerOptinView::unsaved_default(org_id),
    };
    Ok(ApiResponse::ok(OptinResponse { opt_in }))
}

/// Create or replace the organization's opt-in.
///
/// # Request Body
///
/// ```json
/// {
///   "org_id": "550e8400-e29b-41d4-a716-446655440000",
///   "domains_allowed": ["example.com"],
///   "rules": {"max_links_per_article": 2}
/// }
/// ```
pub async fn upsert_optin(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<OptinRequest>,
) -> Result<Json<ApiResponse<OptinResponse>>, AppError> {
    let org_id = target_org(&pool, &auth, request.org_id, OrgRole::Admin).await?;

    let defaults = PartnerOptinView::unsaved_default(org_id);
    let domains = normalize_domains(request.domains_allowed.as_deref().unwrap_or_default());
    let rules = request.rules.unwrap_or(defaults.rules);

    let optin = sqlx::query_as::<_, PartnerOptin>(
        r#"
        INSERT INTO partner_optins (org_id, domains_allowed, rules, active)
        VALUES ($1, $2, $3, false)
        ON CONFLICT (org_id)
        DO UPDATE SET domains_allowed = EXCLUDED.domains_allowed, rules = EXCLUDED.rules
        RETURNING *
        "#,
    )
    .bind(org_id)
    .bind(&domains)
    .bind(&rules)
    .fetch_one(&pool)
    .await?;

    tracing::info!(%org_id, domains = domains.len(), "partner opt-in saved");

    Ok(ApiResponse::ok(OptinResponse {
        opt_in: optin.into(),
    }))
}

/// Partially update an existing opt-in. `active` may only be switched off here.
pub async fn update_optin(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<OptinRequest>,
) -> Result<Json<ApiResponse<OptinResponse>>, AppError> {
    let org_id = target_org(&pool, &auth, request.org_id, OrgRole::Admin).await?;

    if request.active == Some(true) && !auth.role.is_admin() {
        return Err(AppError::forbidden(
            "Partner opt-ins are activated by platform review",
        ));
    }
    if find_optin(&pool, org_id).await?.is_none() {
        return Err(AppError::not_found("Partner opt-in"));
    }

    let domains = request.domains_allowed.as_deref().map(normalize_domains);

    let optin = sqlx::query_as::<_, PartnerOptin>(
        r#"
        UPDATE partner_optins
        SET domains_allowed = COALESCE($2, domains_allowed),
            rules = COALESCE($3, rules),
            active = COALESCE($4, active)
        WHERE org_id = $1
        RETURNING *
        "#,
    )
    .bind(org_id)
    .bind(&domains)
    .bind(&request.rules)
    .bind(request.active)
    .fetch_one(&pool)
    .await?;

    Ok(ApiResponse::ok(OptinResponse {
        opt_in: optin.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn domains_are_reduced_to_unique_hosts() {
        let raw = vec![
            " Example.com ".to_string(),
            "https://www.example.com/blog".to_string(),
            "".to_string(),
            "http://partner.io".to_string(),
        ];
        assert_eq!(normalize_domains(&raw), vec!["example.com", "partner.io"]);
    }
}
