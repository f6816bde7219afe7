//! # LLM API Clients
//!
//! One client per backend behind the [`LlmClient`] trait. Remote providers
//! (OpenAI, Anthropic) authenticate with an API key from the profile; the
//! local Ollama backend needs only a host. All of them send the same system
//! framing and return the trimmed reply text.
//!
//! Failures are classified for the retry policy: transport errors, 429 and
//! 5xx responses are transient, everything else (bad key, bad request,
//! unexpected response shape) is not.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::LlmProfile;
use crate::error::{Result, ScribeError};
use crate::llm::prompt::{
    column_prompt, table_prompt, ColumnContext, TableContext, SYSTEM_PROMPT, TABLE_SYSTEM_PROMPT,
};

/// A backend that can turn column or table metadata into a description.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Backend name used in logs and failure messages.
    fn name(&self) -> &str;

    /// Send one system + user message pair and return the reply text.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    /// Describe one column using the shared framing.
    async fn describe_column(&self, ctx: &ColumnContext) -> Result<String> {
        let reply = self.complete(SYSTEM_PROMPT, &column_prompt(ctx)).await?;
        Ok(reply.trim().to_string())
    }

    /// Describe one table (dbt model) as a whole.
    async fn describe_table(&self, ctx: &TableContext) -> Result<String> {
        let reply = self.complete(TABLE_SYSTEM_PROMPT, &table_prompt(ctx)).await?;
        Ok(reply.trim().to_string())
    }
}

/// Backstop for a hung connection. The retry policy enforces the real per-call limit.
const API_TIMEOUT: Duration = Duration::from_secs(120);

const DEFAULT_MAX_TOKENS: u32 = 150;

fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(API_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Send a prepared request and parse the JSON body, classifying failures.
async fn send_json(provider: &str, request: reqwest::RequestBuilder) -> Result<Value> {
    let response = request.send().await.map_err(|e| {
        ScribeError::llm_transient(format!("Failed to call {} API: {}", provider, e))
    })?;

    let status = response.status();
    let response_text = response.text().await.map_err(|e| {
        ScribeError::llm_transient(format!("Failed to read {} API response: {}", provider, e))
    })?;

    if !status.is_success() {
        let message = format!(
            "{} API returned {}: {}",
            provider,
            status,
            truncate(&response_text, 500)
        );
        return Err(if is_transient_status(status) {
            ScribeError::llm_transient(message)
        } else {
            ScribeError::llm_fatal(message)
        });
    }

    serde_json::from_str(&response_text).map_err(|e| {
        ScribeError::llm_fatal(format!("Failed to parse {} API response JSON: {}", provider, e))
    })
}

fn missing_field(provider: &str, path: &str) -> ScribeError {
    ScribeError::llm_fatal(format!("{} API response missing {}", provider, path))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

// ---------------------------------------------------------------------------
// OpenAI
// ---------------------------------------------------------------------------

/// OpenAI Chat Completions backend (also fits OpenAI-compatible gateways via `base_url`).
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl OpenAiClient {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com";

    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: build_http_client(),
            api_key,
            model,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    pub fn from_profile(profile: &LlmProfile) -> Result<Self> {
        let settings = &profile.settings;
        let api_key = settings.require(&profile.name, "api_key")?;
        if api_key.trim().is_empty() {
            return Err(ScribeError::config(format!(
                "Profile '{}': api_key is empty",
                profile.name
            )));
        }

        let mut client = Self::new(
            api_key.to_string(),
            settings.get_or("model", Self::DEFAULT_MODEL).to_string(),
        );
        client.base_url = trim_base_url(settings.get_or("base_url", Self::DEFAULT_BASE_URL));
        client.max_tokens = settings.parse_or(&profile.name, "max_tokens", DEFAULT_MAX_TOKENS)?;
        if settings.get("temperature").is_some() {
            client.temperature = Some(settings.parse_or(&profile.name, "temperature", 0.0)?);
        }
        Ok(client)
    }

    fn request_body(&self, system: &str, prompt: &str) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt }
            ],
            "max_tokens": self.max_tokens,
        });
        if let Some(temperature) = self.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

fn openai_reply(parsed: &Value) -> Result<String> {
    parsed["choices"]
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|choice| choice["message"]["content"].as_str())
        .map(str::to_string)
        .ok_or_else(|| missing_field("OpenAI", "choices[0].message.content"))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        debug!(model = %self.model, "sending prompt to OpenAI");
        let request = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&self.request_body(system, prompt));

        let parsed = send_json("OpenAI", request).await?;
        openai_reply(&parsed)
    }
}

// ---------------------------------------------------------------------------
// Anthropic
// ---------------------------------------------------------------------------

/// Anthropic Messages API backend.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub const DEFAULT_MODEL: &'static str = "claude-sonnet-4-20250514";
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: build_http_client(),
            api_key,
            model,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn from_profile(profile: &LlmProfile) -> Result<Self> {
        let settings = &profile.settings;
        let api_key = settings.require(&profile.name, "api_key")?;
        if api_key.trim().is_empty() {
            return Err(ScribeError::config(format!(
                "Profile '{}': api_key is empty",
                profile.name
            )));
        }

        let mut client = Self::new(
            api_key.to_string(),
            settings.get_or("model", Self::DEFAULT_MODEL).to_string(),
        );
        client.base_url = trim_base_url(settings.get_or("base_url", Self::DEFAULT_BASE_URL));
        client.max_tokens = settings.parse_or(&profile.name, "max_tokens", DEFAULT_MAX_TOKENS)?;
        Ok(client)
    }

    fn request_body(&self, system: &str, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": system,
            "messages": [
                { "role": "user", "content": prompt }
            ]
        })
    }
}

fn anthropic_reply(parsed: &Value) -> Result<String> {
    parsed["content"]
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|block| block["text"].as_str())
        .map(str::to_string)
        .ok_or_else(|| missing_field("Anthropic", "content[0].text"))
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        debug!(model = %self.model, "sending prompt to Anthropic");
        let request = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", Self::API_VERSION)
            .header("content-type", "application/json")
            .json(&self.request_body(system, prompt));

        let parsed = send_json("Anthropic", request).await?;
        anthropic_reply(&parsed)
    }
}

// ---------------------------------------------------------------------------
// Ollama
// ---------------------------------------------------------------------------

/// Locally hosted models through the Ollama chat API. No credentials.
pub struct OllamaClient {
    http: reqwest::Client,
    model: String,
    host: String,
    max_tokens: u32,
}

impl OllamaClient {
    pub const DEFAULT_MODEL: &'static str = "llama3";
    pub const DEFAULT_HOST: &'static str = "http://localhost:11434";

    pub fn new(model: String, host: String) -> Self {
        Self {
            http: build_http_client(),
            model,
            host: trim_base_url(&host),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn from_profile(profile: &LlmProfile) -> Result<Self> {
        let settings = &profile.settings;
        let mut client = Self::new(
            settings.get_or("model", Self::DEFAULT_MODEL).to_string(),
            settings.get_or("host", Self::DEFAULT_HOST).to_string(),
        );
        client.max_tokens = settings.parse_or(&profile.name, "max_tokens", DEFAULT_MAX_TOKENS)?;
        Ok(client)
    }

    fn request_body(&self, system: &str, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "stream": false,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt }
            ],
            "options": { "num_predict": self.max_tokens }
        })
    }
}

fn ollama_reply(parsed: &Value) -> Result<String> {
    parsed["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| missing_field("Ollama", "message.content"))
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        debug!(model = %self.model, host = %self.host, "sending prompt to Ollama");
        let request = self
            .http
            .post(format!("{}/api/chat", self.host))
            .json(&self.request_body(system, prompt));

        let parsed = send_json("Ollama", request).await?;
        ollama_reply(&parsed)
    }
}
