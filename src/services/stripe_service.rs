//! Stripe checkout sessions and webhook handling.
//!
//! Checkout sessions are created with a form-encoded call to the Stripe REST API.
//! Webhooks are verified against the `Stripe-Signature` header (HMAC-SHA256 over
//! `"{timestamp}.{body}"`) before any event is processed.

use std::{collections::HashMap, time::Duration};

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    config::Config,
    db::DbPool,
    error::AppError,
    models::{
        activity::ActivityAction,
        credit::{CreditPackage, CreditReason},
    },
    services::{activity_log, credit_service},
};

type HmacSha256 = Hmac<Sha256>;

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: Option<String>,
    webhook_secret: Option<String>,
    tolerance_secs: i64,
    public_base_url: String,
}

/// Checkout session as returned to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    #[serde(rename(serialize = "session_id"))]
    pub id: String,
    pub url: Option<String>,
}

impl StripeClient {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            secret_key: config.stripe_secret_key.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            tolerance_secs: config.stripe_webhook_tolerance_secs,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Form fields for a one-off payment buying `package`.
    pub fn checkout_form(
        &self,
        package: &CreditPackage,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Vec<(String, String)> {
        let base = &self.public_base_url;
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            ("line_items[0][quantity]".into(), "1".into()),
            (
                "success_url".into(),
                format!("{base}/dashboard/credits?success=true&session_id={{CHECKOUT_SESSION_ID}}"),
            ),
            (
                "cancel_url".into(),
                format!("{base}/dashboard/credits?canceled=true"),
            ),
            ("client_reference_id".into(), org_id.to_string()),
            ("metadata[org_id]".into(), org_id.to_string()),
            ("metadata[user_id]".into(), user_id.to_string()),
            ("metadata[package_id]".into(), package.id.to_string()),
            (
                "metadata[credits]".into(),
                package.credits_amount.to_string(),
            ),
        ];

        match package.stripe_price_id.as_deref().filter(|p| !p.is_empty()) {
            Some(price_id) => form.push(("line_items[0][price]".into(), price_id.to_string())),
            None => {
                form.push(("line_items[0][price_data][currency]".into(), "usd".into()));
                form.push((
                    "line_items[0][price_data][unit_amount]".into(),
                    package.price_cents.to_string(),
                ));
                form.push((
                    "line_items[0][price_data][product_data][name]".into(),
                    package.name.clone(),
                ));
            }
        }

        form
    }

    pub async fn create_checkout_session(
        &self,
        package: &CreditPackage,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<CheckoutSession, AppError> {
        let secret = self
            .secret_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Upstream("Stripe secret key not configured".into()))?;

        let response = self
            .http
            .post(CHECKOUT_SESSIONS_URL)
            .bearer_auth(secret)
            .form(&self.checkout_form(package, org_id, user_id))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("Stripe error {status}: {text}")));
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Unexpected Stripe response: {e}")))?;

        tracing::info!(%org_id, package_id = %package.id, session_id = %session.id, "checkout session created");
        Ok(session)
    }

    /// Verify the signature header and parse the event.
    pub fn construct_event(&self, payload: &str, signature: &str) -> Result<StripeEvent, AppError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Internal("Stripe webhook secret not configured".into()))?;

        verify_signature(
            payload,
            signature,
            secret,
            self.tolerance_secs,
            chrono::Utc::now().timestamp(),
        )?;

        serde_json::from_str(payload)
            .map_err(|e| AppError::invalid(format!("Invalid webhook payload: {e}")))
    }
}

/// Compute the `v1` signature Stripe would send for `payload` at `timestamp`.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid webhook secret: {e}")))?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against the payload.
///
/// Fails when the header is malformed, the timestamp is further than `tolerance_secs`
/// from `now`, or no `v1` signature matches.
pub fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), AppError> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| AppError::invalid("Invalid Stripe-Signature header"))?;
    if signatures.is_empty() {
        return Err(AppError::invalid("No v1 signature in Stripe-Signature header"));
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(AppError::invalid("Webhook timestamp outside the tolerance zone"));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(format!("Invalid webhook secret: {e}")))?;
    mac.update(format!("{timestamp}.{payload}").as_bytes());

    let matched = signatures
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok());
    if matched {
        Ok(())
    } else {
        Err(AppError::invalid("Webhook signature verification failed"))
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

#[derive(Debug, Deserialize)]
struct CompletedSession {
    id: String,
    client_reference_id: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum WebhookOutcome {
    Credited { org_id: Uuid, credits: i64 },
    AlreadyProcessed,
    Ignored,
}

/// Apply a verified event. Only completed checkout sessions change state.
pub async fn handle_event(pool: &DbPool, event: StripeEvent) -> Result<WebhookOutcome, AppError> {
    if event.event_type != CHECKOUT_COMPLETED {
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "unhandled stripe event");
        return Ok(WebhookOutcome::Ignored);
    }

    let session: CompletedSession = serde_json::from_value(event.data.object)
        .map_err(|e| AppError::invalid(format!("Invalid checkout session: {e}")))?;
    credit_checkout(pool, session).await
}

async fn credit_checkout(pool: &DbPool, session: CompletedSession) -> Result<WebhookOutcome, AppError> {
    let org_id = session
        .client_reference_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok());
    let package_id = session
        .metadata
        .get("package_id")
        .and_then(|id| Uuid::parse_str(id).ok());

    let (Some(org_id), Some(package_id)) = (org_id, package_id) else {
        tracing::warn!(session_id = %session.id, "checkout session without org or package reference");
        return Ok(WebhookOutcome::Ignored);
    };

    let package = match credit_service::find_package(pool, package_id).await {
        Ok(package) => package,
        Err(AppError::NotFound(_)) => {
            tracing::warn!(session_id = %session.id, %package_id, "credit package not found");
            return Ok(WebhookOutcome::Ignored);
        }
        Err(e) => return Err(e),
    };

    let amount_paid = session.amount_total.unwrap_or(0) as f64 / 100.0;
    let currency = session
        .currency
        .as_deref()
        .map(str::to_uppercase)
        .unwrap_or_else(|| "USD".to_string());

    let mut tx = pool.begin().await?;

    let credited = credit_service::add_credits_in(
        &mut tx,
        org_id,
        package.credits_amount,
        CreditReason::Purchase,
        Some(session.id.clone()),
        Some(json!({
            "package_id": package.id,
            "package_name": package.name,
            "amount_paid": amount_paid,
            "currency": currency,
            "stripe_session_id": session.id,
        })),
    )
    .await;

    match credited {
        Ok(_) => {}
        Err(AppError::Conflict(_)) => {
            tracing::info!(session_id = %session.id, "checkout session already credited");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }
        Err(e) => return Err(e),
    }

    let actor_id = session
        .metadata
        .get("user_id")
        .and_then(|id| Uuid::parse_str(id).ok());
    if actor_id.is_some() {
        activity_log::record(
            &mut tx,
            actor_id,
            Some(org_id),
            ActivityAction::CreditsPurchased,
            &format!("package:{package_id}"),
            json!({
                "credits": package.credits_amount,
                "amount": amount_paid,
                "stripe_session_id": session.id,
            }),
        )
        .await?;
    }

    tx.commit().await?;

    Ok(WebhookOutcome::Credited {
        org_id,
        credits: package.credits_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    const SECRET: &str = "whsec_test_secret";
    const BODY: &str = r#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{}}}"#;

    fn header_for(timestamp: i64, secret: &str) -> String {
        format!("t={timestamp},v1={}", sign_payload(secret, timestamp, BODY).unwrap())
    }

    fn client() -> StripeClient {
        let config = Config::from_pairs([
            ("DATABASE_URL", "postgres://localhost/seo"),
            ("PUBLIC_BASE_URL", "https://app.example.com/"),
        ])
        .unwrap();
        StripeClient::from_config(&config).unwrap()
    }

    fn package(price_id: Option<&str>) -> CreditPackage {
        CreditPackage {
            id: Uuid::nil(),
            name: "Starter".into(),
            credits_amount: 500,
            price_cents: 1900,
            stripe_price_id: price_id.map(str::to_string),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn field<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn valid_signature_is_accepted() {
        let now = 1_700_000_000;
        assert!(verify_signature(BODY, &header_for(now, SECRET), SECRET, 300, now + 10).is_ok());
    }

    #[test]
    fn any_matching_v1_signature_is_enough() {
        let now = 1_700_000_000;
        let good = sign_payload(SECRET, now, BODY).unwrap();
        let header = format!("t={now},v1={},v1={good},v0=ignored", "00".repeat(32));
        assert!(verify_signature(BODY, &header, SECRET, 300, now).is_ok());
    }

    #[test]
    fn wrong_secret_or_tampered_body_is_rejected() {
        let now = 1_700_000_000;
        let header = header_for(now, "whsec_other");
        assert!(verify_signature(BODY, &header, SECRET, 300, now).is_err());

        let header = header_for(now, SECRET);
        assert!(verify_signature("{}", &header, SECRET, 300, now).is_err());
    }

    #[test]
    fn stale_signature_is_rejected() {
        let signed_at = 1_700_000_000;
        let err = verify_signature(BODY, &header_for(signed_at, SECRET), SECRET, 300, signed_at + 301)
            .unwrap_err();
        assert_eq!(err.to_string(), "Webhook timestamp outside the tolerance zone");
    }

    #[test]
    fn malformed_headers_are_rejected() {
        assert!(verify_signature(BODY, "", SECRET, 300, 0).is_err());
        assert!(verify_signature(BODY, "t=abc,v1=00", SECRET, 300, 0).is_err());
        assert!(verify_signature(BODY, "t=0", SECRET, 300, 0).is_err());
    }

    #[test]
    fn checkout_form_uses_stripe_price_when_present() {
        let org = Uuid::new_v4();
        let form = client().checkout_form(&package(Some("price_123")), org, Uuid::nil());

        assert_eq!(field(&form, "line_items[0][price]"), Some("price_123"));
        assert_eq!(field(&form, "line_items[0][price_data][unit_amount]"), None);
        assert_eq!(field(&form, "client_reference_id"), Some(org.to_string().as_str()));
        assert_eq!(field(&form, "metadata[credits]"), Some("500"));
        assert_eq!(
            field(&form, "cancel_url"),
            Some("https://app.example.com/dashboard/credits?canceled=true")
        );
    }

    #[test]
    fn checkout_form_falls_back_to_inline_price() {
        let form = client().checkout_form(&package(None), Uuid::nil(), Uuid::nil());
        assert_eq!(field(&form, "line_items[0][price]"), None);
        assert_eq!(field(&form, "line_items[0][price_data][unit_amount]"), Some("1900"));
        assert_eq!(
            field(&form, "line_items[0][price_data][product_data][name]"),
            Some("Starter")
        );
        assert!(
            field(&form, "success_url")
                .unwrap()
                .ends_with("session_id={CHECKOUT_SESSION_ID}")
        );
    }

    #[test]
    fn missing_webhook_secret_is_a_server_error() {
        assert!(matches!(
            client().construct_event(BODY, "t=1,v1=00"),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn events_parse_with_type_field() {
        let event: StripeEvent = serde_json::from_str(BODY).unwrap();
        assert_eq!(event.event_type, CHECKOUT_COMPLETED);
    }
}
