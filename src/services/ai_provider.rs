//! AI text generation providers.
//!
//! One trait, [`AiProvider`], with implementations for OpenAI chat completions,
//! Anthropic messages and Google Gemini `generateContent`. The provider is chosen once at
//! startup from `AI_PROVIDER`; a missing API key surfaces as an error on first use.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{config::Config, error::AppError};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: 1.0,
            stop_sequences: Vec::new(),
        }
    }
}

impl GenerationOptions {
    pub fn with_max_tokens(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            ..Self::default()
        }
    }
}

/// Common interface for text generation backends.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    async fn generate_text(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, AppError>;
}

/// Rough token estimate: about four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Build the provider named by `AI_PROVIDER`.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn AiProvider>, AppError> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

    let provider: Arc<dyn AiProvider> = match config.ai_provider.to_lowercase().as_str() {
        "openai" => Arc::new(OpenAiProvider {
            client,
            api_key: config.openai_api_key.clone(),
            model: config.openai_model.clone(),
        }),
        "anthropic" => Arc::new(AnthropicProvider {
            client,
            api_key: config.anthropic_api_key.clone(),
            model: config.anthropic_model.clone(),
        }),
        "gemini" => Arc::new(GeminiProvider {
            client,
            api_key: config.google_api_key.clone(),
            model: config.gemini_model.clone(),
        }),
        other => {
            return Err(AppError::Internal(format!("Unknown AI provider type: {other}")));
        }
    };

    Ok(provider)
}

fn require_key<'a>(key: &'a Option<String>, provider: &str) -> Result<&'a str, AppError> {
    key.as_deref()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::Upstream(format!("{provider} API key not configured")))
}

/// System messages joined into one block; providers other than OpenAI take them apart.
fn system_text(messages: &[ChatMessage]) -> Option<String> {
    let joined = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    (!joined.is_empty()).then_some(joined)
}

async fn post_json(
    request: reqwest::RequestBuilder,
    body: &Value,
    provider: &str,
) -> Result<Value, AppError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("{provider} request failed: {e}")))?;

    let status = response.status();
    let payload: Value = response
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("{provider} returned invalid JSON: {e}")))?;

    if !status.is_success() {
        let message = payload["error"]["message"]
            .as_str()
            .unwrap_or("Unknown error");
        return Err(AppError::Upstream(format!(
            "{provider} API error ({status}): {message}"
        )));
    }

    Ok(payload)
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

fn openai_body(model: &str, messages: &[ChatMessage], options: &GenerationOptions) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "top_p": options.top_p,
    });
    if !options.stop_sequences.is_empty() {
        body["stop"] = json!(options.stop_sequences);
    }
    body
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

fn openai_text(payload: Value) -> Result<String, AppError> {
    let parsed: OpenAiResponse = serde_json::from_value(payload)
        .map_err(|e| AppError::Upstream(format!("Unexpected OpenAI response: {e}")))?;
    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default())
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate_text(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, AppError> {
        let key = require_key(&self.api_key, "OpenAI")?;
        let body = openai_body(&self.model, messages, options);
        let request = self.client.post(OPENAI_URL).bearer_auth(key);
        openai_text(post_json(request, &body, "OpenAI").await?)
    }
}

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

fn anthropic_body(model: &str, messages: &[ChatMessage], options: &GenerationOptions) -> Value {
    let conversation: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = if m.role == Role::Assistant {
                "assistant"
            } else {
                "user"
            };
            json!({ "role": role, "content": m.content })
        })
        .collect();

    let mut body = json!({
        "model": model,
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "top_p": options.top_p,
        "messages": conversation,
    });
    if let Some(system) = system_text(messages) {
        body["system"] = json!(system);
    }
    if !options.stop_sequences.is_empty() {
        body["stop_sequences"] = json!(options.stop_sequences);
    }
    body
}

fn anthropic_text(payload: &Value) -> String {
    payload["content"]
        .as_array()
        .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn generate_text(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, AppError> {
        let key = require_key(&self.api_key, "Anthropic")?;
        let body = anthropic_body(&self.model, messages, options);
        let request = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let payload = post_json(request, &body, "Anthropic").await?;
        Ok(anthropic_text(&payload))
    }
}

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

fn gemini_body(messages: &[ChatMessage], options: &GenerationOptions) -> Value {
    let contents: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = if m.role == Role::Assistant {
                "model"
            } else {
                "user"
            };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut generation_config = json!({
        "maxOutputTokens": options.max_tokens,
        "temperature": options.temperature,
        "topP": options.top_p,
    });
    if !options.stop_sequences.is_empty() {
        generation_config["stopSequences"] = json!(options.stop_sequences);
    }

    let mut body = json!({
        "contents": contents,
        "generationConfig": generation_config,
    });
    if let Some(system) = system_text(messages) {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

fn gemini_text(payload: &Value) -> String {
    payload["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate_text(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, AppError> {
        let key = require_key(&self.api_key, "Google")?;
        let body = gemini_body(messages, options);
        let url = format!("{GEMINI_BASE}/{}:generateContent", self.model);
        let request = self.client.post(url).header("x-goog-api-key", key);
        let payload = post_json(request, &body, "Gemini").await?;
        Ok(gemini_text(&payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You are an SEO writer."),
            ChatMessage::system("Write in markdown."),
            ChatMessage::user("Outline trail shoes."),
        ]
    }

    fn config(provider: &str) -> Config {
        Config::from_pairs([
            ("DATABASE_URL", "postgres://localhost/seo"),
            ("AI_PROVIDER", provider),
        ])
        .unwrap()
    }

    #[test]
    fn openai_body_keeps_system_messages_inline() {
        let body = openai_body("gpt-test", &conversation(), &GenerationOptions::with_max_tokens(500));
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["max_tokens"], 500);
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn anthropic_body_moves_system_prompt_out_of_messages() {
        let body = anthropic_body("claude-test", &conversation(), &GenerationOptions::default());
        assert_eq!(body["system"], "You are an SEO writer.\n\nWrite in markdown.");
        assert_eq!(
            body["messages"],
            json!([{ "role": "user", "content": "Outline trail shoes." }])
        );
        assert_eq!(body["max_tokens"], 4000);
    }

    #[test]
    fn gemini_body_uses_system_instruction_and_user_parts() {
        let mut options = GenerationOptions::default();
        options.stop_sequences = vec!["END".into()];
        let body = gemini_body(&conversation(), &options);
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are an SEO writer.\n\nWrite in markdown."
        );
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["generationConfig"]["stopSequences"], json!(["END"]));
    }

    #[test]
    fn response_text_extraction() {
        let openai = json!({ "choices": [{ "message": { "content": "# Outline" } }] });
        assert_eq!(openai_text(openai).unwrap(), "# Outline");
        assert_eq!(openai_text(json!({ "choices": [] })).unwrap(), "");

        let anthropic = json!({ "content": [{ "type": "text", "text": "Hello" }] });
        assert_eq!(anthropic_text(&anthropic), "Hello");

        let gemini = json!({ "candidates": [{ "content": { "parts": [{ "text": "Hi " }, { "text": "there" }] } }] });
        assert_eq!(gemini_text(&gemini), "Hi there");
        assert_eq!(gemini_text(&json!({})), "");
    }

    #[test]
    fn provider_is_chosen_from_config() {
        assert_eq!(provider_from_config(&config("openai")).unwrap().name(), "openai");
        assert_eq!(provider_from_config(&config("Anthropic")).unwrap().name(), "anthropic");
        assert_eq!(provider_from_config(&config("gemini")).unwrap().name(), "gemini");
        assert!(provider_from_config(&config("llama")).is_err());
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_request() {
        let provider = provider_from_config(&config("anthropic")).unwrap();
        let err = provider
            .generate_text(&conversation(), &GenerationOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Upstream service error: Anthropic API key not configured");
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(""), 0);
    }
}
