//! Sign-up and sign-in through the hosted auth provider (GoTrue REST API), local user
//! provisioning, and server-issued bearer sessions.
//!
//! The provider owns passwords. Once it confirms an identity, the user is mirrored
//! locally (same id) and given a session token that the auth middleware checks.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    config::Config,
    db::DbPool,
    error::AppError,
    middleware::auth::{AuthContext, generate_session_token, hash_token},
    models::{
        credit::CreditReason,
        organization::{Org, OrgRole},
        user::{CurrentSession, User},
    },
    services::credit_service,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Identity confirmed by the auth provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUser {
    pub id: Uuid,
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl ProviderUser {
    /// Display name: metadata `name` or `full_name`, else the email's local part.
    pub fn display_name(&self) -> String {
        ["name", "full_name"]
            .iter()
            .find_map(|k| self.user_metadata.get(*k).and_then(Value::as_str))
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| self.email.as_deref().map(email_local_part))
            .unwrap_or_else(|| "User".to_string())
    }
}

pub fn email_local_part(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

#[derive(Clone)]
pub struct IdentityClient {
    http: reqwest::Client,
    base_url: Option<String>,
    anon_key: Option<String>,
}

impl IdentityClient {
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        if let Some(url) = &config.auth_provider_url {
            url::Url::parse(url)
                .map_err(|e| AppError::Internal(format!("Invalid AUTH_PROVIDER_URL: {e}")))?;
        }

        Ok(Self {
            http,
            base_url: config
                .auth_provider_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            anon_key: config.auth_provider_anon_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<(String, &str), AppError> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| AppError::Upstream("Auth provider URL not configured".into()))?;
        let key = self
            .anon_key
            .as_deref()
            .ok_or_else(|| AppError::Upstream("Auth provider key not configured".into()))?;
        Ok((format!("{base}/auth/v1/{path}"), key))
    }

    async fn post(&self, path: &str, body: Value) -> Result<(reqwest::StatusCode, Value), AppError> {
        let (url, key) = self.endpoint(path)?;
        let response = self
            .http
            .post(url)
            .header("apikey", key)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Auth provider request failed: {e}")))?;

        let status = response.status();
        let payload = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, payload))
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<ProviderUser, AppError> {
        let (status, payload) = self
            .post(
                "signup",
                json!({ "email": email, "password": password, "data": { "name": name } }),
            )
            .await?;

        if !status.is_success() {
            return Err(AppError::invalid(provider_error_message(&payload)));
        }
        provider_user(payload)
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderUser, AppError> {
        let (status, payload) = self
            .post(
                "token?grant_type=password",
                json!({ "email": email, "password": password }),
            )
            .await?;

        if status.is_client_error() {
            tracing::info!(%status, "password sign-in rejected by auth provider");
            return Err(AppError::Unauthorized);
        }
        if !status.is_success() {
            return Err(AppError::Upstream(provider_error_message(&payload)));
        }
        provider_user(payload)
    }

    /// Exchange an OAuth/PKCE authorization code for the provider's user.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<ProviderUser, AppError> {
        let (status, payload) = self
            .post(
                "token?grant_type=pkce",
                json!({ "auth_code": code, "code_verifier": code_verifier }),
            )
            .await?;

        if status.is_client_error() {
            return Err(AppError::Unauthorized);
        }
        if !status.is_success() {
            return Err(AppError::Upstream(provider_error_message(&payload)));
        }
        provider_user(payload)
    }
}

/// The provider returns either the user itself or a token grant wrapping it.
fn provider_user(payload: Value) -> Result<ProviderUser, AppError> {
    let user = match payload.get("user") {
        Some(user) if user.is_object() => user.clone(),
        _ => payload,
    };
    serde_json::from_value(user)
        .map_err(|e| AppError::Upstream(format!("Unexpected auth provider response: {e}")))
}

fn provider_error_message(payload: &Value) -> String {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .unwrap_or("Authentication failed")
        .to_string()
}

/// Find the local user for a provider identity, creating it on first sight.
///
/// A new user gets their own organization (as `OWNER`), a wallet, and the trial credits.
pub async fn provision_user(
    pool: &DbPool,
    identity: &ProviderUser,
    org_name: Option<&str>,
    trial_credits: i64,
) -> Result<User, AppError> {
    let email = identity
        .email
        .as_deref()
        .ok_or_else(|| AppError::invalid("Auth provider returned no email"))?;

    let existing = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE id = $1 OR email = $2 ORDER BY (id = $1) DESC LIMIT 1",
    )
    .bind(identity.id)
    .bind(email)
    .fetch_optional(pool)
    .await?;

    if let Some(user) = existing {
        if user.id != identity.id {
            tracing::warn!(user_id = %user.id, provider_id = %identity.id, "email already linked to another identity");
        }
        return Ok(user);
    }

    let name = identity.display_name();
    let org_name = org_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{name}'s Organization"));

    let mut tx = pool.begin().await?;
    let user = create_user_with_org(&mut tx, identity.id, email, &name, &org_name, trial_credits).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, "user provisioned");
    Ok(user)
}

async fn create_user_with_org(
    conn: &mut PgConnection,
    user_id: Uuid,
    email: &str,
    name: &str,
    org_name: &str,
    trial_credits: i64,
) -> Result<User, AppError> {
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, email, name) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(user_id)
    .bind(email)
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;

    let org = sqlx::query_as::<_, Org>(
        "INSERT INTO orgs (name, owner_user_id) VALUES ($1, $2) RETURNING *",
    )
    .bind(org_name)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    let org_id = org.id;
    tracing::info!(%org_id, org_name = %org.name, "default organization created");

    sqlx::query(
        "INSERT INTO org_users (org_id, user_id, role, accepted_at) VALUES ($1, $2, $3, NOW())",
    )
    .bind(org_id)
    .bind(user_id)
    .bind(OrgRole::Owner.as_str())
    .execute(&mut *conn)
    .await?;

    if trial_credits > 0 {
        credit_service::add_credits_in(
            conn,
            org_id,
            trial_credits,
            CreditReason::TrialBonus,
            None,
            Some(json!({ "message": format!("Welcome bonus - {trial_credits} free credits") })),
        )
        .await?;
    } else {
        sqlx::query("INSERT INTO credit_wallets (org_id, balance, lifetime_spent) VALUES ($1, 0, 0)")
            .bind(org_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(user)
}

/// Create a session for `user_id` and return the raw token with its expiry.
pub async fn issue_session(
    pool: &DbPool,
    user_id: Uuid,
    ttl_hours: i64,
) -> Result<(String, DateTime<Utc>), AppError> {
    let token = generate_session_token();
    let expires_at = Utc::now() + chrono::Duration::hours(ttl_hours.max(1));

    sqlx::query("INSERT INTO sessions (user_id, token_hash, expires_at) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(hash_token(&token))
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok((token, expires_at))
}

pub async fn revoke_session(pool: &DbPool, session_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE sessions SET is_active = false WHERE id = $1")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn current_session(pool: &DbPool, auth: &AuthContext) -> Result<CurrentSession, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth.user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let (expires_at,): (DateTime<Utc>,) =
        sqlx::query_as("SELECT expires_at FROM sessions WHERE id = $1")
            .bind(auth.session_id)
            .fetch_one(pool)
            .await?;

    Ok(CurrentSession {
        session_id: auth.session_id,
        expires_at,
        user: user.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn token_grant_and_bare_user_both_parse() {
        let id = Uuid::new_v4();
        let grant = json!({ "access_token": "x", "user": { "id": id, "email": "a@b.co" } });
        assert_eq!(provider_user(grant).unwrap().id, id);

        let bare = json!({ "id": id, "email": "a@b.co", "user_metadata": { "name": "Ada" } });
        assert_eq!(provider_user(bare).unwrap().display_name(), "Ada");

        assert!(provider_user(json!({ "user": null })).is_err());
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let user = ProviderUser {
            id: Uuid::nil(),
            email: Some("writer@example.com".into()),
            user_metadata: json!({ "full_name": "" }),
        };
        assert_eq!(user.display_name(), "writer");

        let anonymous = ProviderUser {
            id: Uuid::nil(),
            email: None,
            user_metadata: Value::Null,
        };
        assert_eq!(anonymous.display_name(), "User");
    }

    #[test]
    fn provider_errors_prefer_the_description() {
        assert_eq!(
            provider_error_message(&json!({ "error": "invalid_grant", "error_description": "Bad code" })),
            "Bad code"
        );
        assert_eq!(provider_error_message(&json!({ "msg": "User already registered" })), "User already registered");
        assert_eq!(provider_error_message(&Value::Null), "Authentication failed");
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_without_network() {
        let config = Config::from_pairs([("DATABASE_URL", "postgres://localhost/seo")]).unwrap();
        let client = IdentityClient::from_config(&config).unwrap();
        let err = client.sign_in_with_password("a@b.co", "pw").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
    }
}
