//! Stripe checkout and webhook endpoints.

use axum::{
    Extension, Json,
    extract::State,
    http::HeaderMap,
};
use serde_json::{Value, json};

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{credit::CheckoutRequest, response::ApiResponse},
    services::{
        access, credit_service,
        stripe_service::{self, CheckoutSession, WebhookOutcome},
    },
    state::AppState,
};

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Start a Stripe checkout for a credit package, billed to the caller's primary organization.
///
/// # Request Body
///
/// ```json
/// { "package_id": "550e8400-e29b-41d4-a716-446655440000" }
/// ```
///
/// # Response
///
/// ```json
/// { "success": true, "data": { "session_id": "cs_test_...", "url": "https://checkout.stripe.com/..." } }
/// ```
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<ApiResponse<CheckoutSession>>, AppError> {
    let package_id = request
        .package_id
        .ok_or_else(|| AppError::invalid("package_id is required"))?;

    let package = credit_service::find_package(&state.pool, package_id).await?;
    let org_id = access::primary_org_id(&state.pool, auth.user_id).await?;

    let session = state
        .stripe
        .create_checkout_session(&package, org_id, auth.user_id)
        .await?;
    Ok(ApiResponse::ok(session))
}

/// Receive a Stripe event.
///
/// The raw body is verified against the `Stripe-Signature` header before it is parsed.
/// Redelivered checkout events are acknowledged without crediting twice.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::invalid("Missing stripe-signature header"))?;

    let event = state.stripe.construct_event(&body, signature)?;
    let event_id = event.id.clone();

    match stripe_service::handle_event(&state.pool, event).await? {
        WebhookOutcome::Credited { org_id, credits } => {
            tracing::info!(%event_id, %org_id, credits, "checkout credited");
        }
        WebhookOutcome::AlreadyProcessed => {
            tracing::info!(%event_id, "checkout already credited");
        }
        WebhookOutcome::Ignored => {}
    }

    Ok(Json(json!({ "received": true })))
}
