//! Credit wallet, ledger and pricing endpoints.

use axum::{
    Extension, Json,
    extract::{Query, State},
};

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        credit::{CreditPackageResponse, CreditTxn, CreditWallet, EstimateQuery, EstimateResponse},
        response::{ApiResponse, PageParams, Pagination},
    },
    services::{access, credit_service},
};

/// Wallet of the caller's primary organization, created with a zero balance if missing.
pub async fn get_wallet(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ApiResponse<CreditWallet>>, AppError> {
    let org_id = access::primary_org_id(&pool, auth.user_id).await?;
    let wallet = credit_service::wallet_or_create(&pool, org_id).await?;
    Ok(ApiResponse::ok(wallet))
}

/// Ledger of the caller's primary organization, newest first.
///
/// # Query Parameters
///
/// - `page` (default 1), `page_size` (default 20, max 100)
pub async fn list_transactions(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(paging): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<CreditTxn>>>, AppError> {
    let org_id = access::primary_org_id(&pool, auth.user_id).await?;
    let (txns, total) = credit_service::list_transactions(&pool, org_id, &paging).await?;

    Ok(ApiResponse::paginated(
        txns,
        Pagination::new(paging.page(), paging.page_size(), total),
    ))
}

/// Active credit packages. Public.
pub async fn list_packages(
    State(pool): State<DbPool>,
) -> Result<Json<ApiResponse<Vec<CreditPackageResponse>>>, AppError> {
    let packages = credit_service::list_packages(&pool)
        .await?
        .into_iter()
        .map(CreditPackageResponse::from)
        .collect();
    Ok(ApiResponse::ok(packages))
}

/// Credits needed to generate one article of `word_count` words (default 1500), and
/// whether the caller's primary organization holds that many.
pub async fn estimate_cost(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<EstimateQuery>,
) -> Result<Json<ApiResponse<EstimateResponse>>, AppError> {
    let word_count = query
        .word_count
        .unwrap_or(credit_service::DEFAULT_ESTIMATE_WORDS);
    if word_count <= 0 {
        return Err(AppError::invalid("word_count must be positive"));
    }

    let estimate = credit_service::estimate_generation_cost(&pool, word_count).await?;
    let org_id = access::primary_org_id(&pool, auth.user_id).await?;
    let sufficient_credits = credit_service::check_credits(&pool, org_id, estimate.total).await?;

    Ok(ApiResponse::ok(EstimateResponse {
        estimate,
        sufficient_credits,
    }))
}
