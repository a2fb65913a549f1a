//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `AI_PROVIDER` (optional): `openai`, `anthropic` or `gemini`, defaults to `openai`
/// - `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `GOOGLE_API_KEY`: provider credentials
/// - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`: payment processor credentials
/// - `AUTH_PROVIDER_URL`, `AUTH_PROVIDER_ANON_KEY`: hosted auth provider (GoTrue) endpoint
/// - `PUBLIC_BASE_URL` (optional): used for checkout redirect URLs
/// - `TRIAL_CREDITS` (optional): credits granted to new organizations, defaults to 100
/// - `SESSION_TTL_HOURS` (optional): bearer session lifetime, defaults to 720
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_ai_provider")]
    pub ai_provider: String,

    #[serde(default)]
    pub openai_api_key: Option<String>,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default)]
    pub anthropic_api_key: Option<String>,

    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,

    #[serde(default)]
    pub google_api_key: Option<String>,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,

    #[serde(default = "default_webhook_tolerance")]
    pub stripe_webhook_tolerance_secs: i64,

    #[serde(default)]
    pub auth_provider_url: Option<String>,

    #[serde(default)]
    pub auth_provider_anon_key: Option<String>,

    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_trial_credits")]
    pub trial_credits: i64,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: i64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_ai_provider() -> String {
    "openai".to_string()
}

fn default_openai_model() -> String {
    "gpt-4-turbo-preview".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

/// Stripe's own libraries reject signatures older than five minutes.
fn default_webhook_tolerance() -> i64 {
    300
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_trial_credits() -> i64 {
    100
}

fn default_session_ttl() -> i64 {
    24 * 30
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Build a configuration from explicit key/value pairs instead of the process environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        envy::from_iter(pairs.into_iter().map(|(k, v)| (k.into(), v.into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = Config::from_pairs([("DATABASE_URL", "postgres://localhost/seo")]).unwrap();

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.ai_provider, "openai");
        assert_eq!(config.trial_credits, 100);
        assert_eq!(config.stripe_webhook_tolerance_secs, 300);
        assert!(config.stripe_secret_key.is_none());
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let result = Config::from_pairs([("SERVER_PORT", "8080")]);
        assert!(result.is_err());
    }

    #[test]
    fn numeric_overrides_are_parsed() {
        let config = Config::from_pairs([
            ("DATABASE_URL", "postgres://localhost/seo"),
            ("SERVER_PORT", "8080"),
            ("TRIAL_CREDITS", "250"),
        ])
        .unwrap();

        assert_eq!(config.server_port, 8080);
        assert_eq!(config.trial_credits, 250);
    }
}
