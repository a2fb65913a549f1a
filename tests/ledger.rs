//! Database-backed tests for the credit ledger, checkout crediting and keyword deletion.
//!
//! Each test gets a fresh database from `#[sqlx::test]` with `./migrations` applied, so
//! `DATABASE_URL` must point at a Postgres server the test user may create databases on.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use pretty_assertions::assert_eq;
use seo_platform_server::{
    build_router,
    config::Config,
    error::AppError,
    models::credit::CreditReason,
    services::{
        access, credit_service,
        identity_service::{self, ProviderUser},
        stripe_service::{self, StripeEvent, WebhookOutcome},
    },
    state::AppState,
};
use serde_json::{Value, json};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

/// Provision a user with an organization and an empty wallet.
async fn org_owner(pool: &PgPool) -> (Uuid, Uuid) {
    let identity = ProviderUser {
        id: Uuid::new_v4(),
        email: Some(format!("{}@example.com", Uuid::new_v4().simple())),
        user_metadata: json!({"name": "Ledger Owner"}),
    };
    let user = identity_service::provision_user(pool, &identity, Some("Ledger Org"), 0)
        .await
        .unwrap();
    let org_id = access::primary_org_id(pool, user.id).await.unwrap();
    (user.id, org_id)
}

async fn txn_count(pool: &PgPool, org_id: Uuid, reason: Option<&str>) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM credit_txns WHERE org_id = $1 AND ($2::text IS NULL OR reason = $2)",
    )
    .bind(org_id)
    .bind(reason)
    .fetch_one(pool)
    .await
    .unwrap()
}

fn app(pool: PgPool) -> Router {
    let config = Config::from_pairs([("DATABASE_URL", "postgres://unused")]).unwrap();
    build_router(AppState::new(pool, config).unwrap())
}

async fn send(app: &Router, method: &str, uri: &str, token: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[sqlx::test]
async fn grant_adds_to_balance_with_one_ledger_row(pool: PgPool) {
    let (_, org_id) = org_owner(&pool).await;
    assert_eq!(credit_service::balance(&pool, org_id).await.unwrap(), 0);

    let txn = credit_service::add_credits(
        &pool,
        org_id,
        250,
        CreditReason::AdminGrant,
        None,
        Some(json!({"note": "welcome"})),
    )
    .await
    .unwrap();

    assert_eq!(txn.delta, 250);
    assert_eq!(txn.reason, "ADMIN_GRANT");
    assert_eq!(credit_service::balance(&pool, org_id).await.unwrap(), 250);
    assert_eq!(txn_count(&pool, org_id, None).await, 1);
    assert_eq!(txn_count(&pool, org_id, Some("ADMIN_GRANT")).await, 1);
}

#[sqlx::test]
async fn overdraft_is_refused_and_leaves_wallet_untouched(pool: PgPool) {
    let (_, org_id) = org_owner(&pool).await;
    credit_service::add_credits(&pool, org_id, 10, CreditReason::AdminGrant, None, None)
        .await
        .unwrap();

    let mut tx = pool.begin().await.unwrap();
    let err = credit_service::deduct_credits_in(
        &mut tx,
        org_id,
        50,
        "DRAFT",
        Some(Uuid::new_v4().to_string()),
        json!({}),
    )
    .await
    .unwrap_err();
    drop(tx);

    assert!(matches!(
        err,
        AppError::InsufficientCredits {
            required: 50,
            available: 10
        }
    ));
    assert_eq!(err.status_and_code().0, StatusCode::PAYMENT_REQUIRED);

    let wallet = credit_service::find_wallet(&pool, org_id).await.unwrap().unwrap();
    assert_eq!(wallet.balance, 10);
    assert_eq!(wallet.lifetime_spent, 0);
    assert_eq!(txn_count(&pool, org_id, None).await, 1);
    assert_eq!(txn_count(&pool, org_id, Some("USAGE")).await, 0);
}

#[sqlx::test]
async fn deduction_within_balance_records_usage(pool: PgPool) {
    let (_, org_id) = org_owner(&pool).await;
    credit_service::add_credits(&pool, org_id, 40, CreditReason::AdminGrant, None, None)
        .await
        .unwrap();

    let mut tx = pool.begin().await.unwrap();
    let txn = credit_service::deduct_credits_in(&mut tx, org_id, 15, "DRAFT", None, json!({}))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(txn.delta, -15);
    assert_eq!(txn.reason, "USAGE");
    let wallet = credit_service::find_wallet(&pool, org_id).await.unwrap().unwrap();
    assert_eq!(wallet.balance, 25);
    assert_eq!(wallet.lifetime_spent, 15);
}

#[sqlx::test]
async fn redelivered_checkout_session_credits_once(pool: PgPool) {
    let (user_id, org_id) = org_owner(&pool).await;
    let package_id: Uuid =
        sqlx::query_scalar("SELECT id FROM credit_packages WHERE name = 'Starter'")
            .fetch_one(&pool)
            .await
            .unwrap();

    let event = || -> StripeEvent {
        serde_json::from_value(json!({
            "id": "evt_test_checkout",
            "type": "checkout.session.completed",
            "data": {
                "object": {
                    "id": "cs_test_redelivery",
                    "client_reference_id": org_id.to_string(),
                    "amount_total": 1500,
                    "currency": "usd",
                    "metadata": {
                        "package_id": package_id.to_string(),
                        "user_id": user_id.to_string()
                    }
                }
            }
        }))
        .unwrap()
    };

    let first = stripe_service::handle_event(&pool, event()).await.unwrap();
    assert_eq!(first, WebhookOutcome::Credited { org_id, credits: 300 });

    let second = stripe_service::handle_event(&pool, event()).await.unwrap();
    assert_eq!(second, WebhookOutcome::AlreadyProcessed);

    assert_eq!(credit_service::balance(&pool, org_id).await.unwrap(), 300);
    assert_eq!(txn_count(&pool, org_id, Some("PURCHASE")).await, 1);
}

#[sqlx::test]
async fn deleted_keyword_disappears_from_listing(pool: PgPool) {
    let (user_id, org_id) = org_owner(&pool).await;
    let (token, _) = identity_service::issue_session(&pool, user_id, 1).await.unwrap();

    let project_id: Uuid =
        sqlx::query_scalar("INSERT INTO projects (org_id, name) VALUES ($1, 'Trail Blog') RETURNING id")
            .bind(org_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    let mut keyword_ids = Vec::new();
    for term in ["trail running shoes", "trail socks"] {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO keywords (project_id, term) VALUES ($1, $2) RETURNING id",
        )
        .bind(project_id)
        .bind(term)
        .fetch_one(&pool)
        .await
        .unwrap();
        keyword_ids.push(id);
    }

    let app = app(pool.clone());
    let list_uri = format!("/api/keywords?project_id={project_id}");

    let (status, body) = send(&app, "GET", &list_uri, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 2);

    let deleted = keyword_ids[0];
    let (status, body) = send(&app, "DELETE", &format!("/api/keywords/{deleted}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = send(&app, "GET", &list_uri, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    let listed: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|k| k["id"].as_str())
        .collect();
    let kept = keyword_ids[1].to_string();
    assert_eq!(listed, vec![kept.as_str()]);

    let (status, _) = send(&app, "GET", &format!("/api/keywords/{deleted}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
