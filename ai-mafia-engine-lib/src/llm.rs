//! Default [`Decider`] backed by OpenAI-compatible chat-completion APIs.
//!
//! Every supported provider speaks the same wire shape behind a different
//! base URL; credentials fall back to the ambient environment when a game
//! does not carry its own.

use std::sync::Arc;
use std::time::Duration;

use ai_mafia_lib::LlmProvider;
use ai_mafia_lib::LlmSettings;
use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tokio::time::sleep;

use crate::decider::DecideRequest;
use crate::decider::Decider;
use crate::decider::DeciderError;
use crate::decider::DeciderFactory;

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_GOOGLE_API_KEY: &str = "GOOGLE_GENERATIVE_AI_API_KEY";
pub const ENV_XAI_API_KEY: &str = "XAI_API_KEY";
pub const ENV_OLLAMA_BASE_URL: &str = "OLLAMA_BASE_URL";
pub const ENV_OLLAMA_API_KEY: &str = "OLLAMA_API_KEY";
pub const ENV_DEFAULT_PROVIDER: &str = "DEFAULT_PROVIDER";
pub const ENV_DEFAULT_MODEL: &str = "DEFAULT_MODEL";

/// Per-request generation parameters.
const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.7;

/// Hard deadline on one provider round trip; expiry is reported as a decider
/// failure and recovered by the caller's fallback.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounded exponential backoff for transient provider failures.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
        }
    }
}

/// Base URL for the provider's OpenAI-compatible endpoint.
pub fn base_url(provider: LlmProvider) -> String {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com/v1".to_string(),
        LlmProvider::Anthropic => "https://api.anthropic.com/v1".to_string(),
        LlmProvider::Google => {
            "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
        }
        LlmProvider::Ollama => std::env::var(ENV_OLLAMA_BASE_URL)
            .unwrap_or_else(|_| "http://localhost:11434/v1".to_string()),
        LlmProvider::OllamaCloud => "https://ollama.com/v1".to_string(),
        LlmProvider::Grok => "https://api.x.ai/v1".to_string(),
    }
}

/// Model used when neither the game config nor the environment names one.
pub fn default_model(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "gpt-4o-mini",
        LlmProvider::Anthropic => "claude-3-5-haiku-20241022",
        LlmProvider::Google => "gemini-2.0-flash",
        LlmProvider::Ollama | LlmProvider::OllamaCloud => "llama3.2",
        LlmProvider::Grok => "grok-2",
    }
}

/// Ambient credential for the provider, if any. Key values never leave the
/// environment except inside request headers.
pub fn env_api_key(provider: LlmProvider) -> Option<String> {
    let var = match provider {
        LlmProvider::OpenAi => ENV_OPENAI_API_KEY,
        LlmProvider::Anthropic => ENV_ANTHROPIC_API_KEY,
        LlmProvider::Google => ENV_GOOGLE_API_KEY,
        LlmProvider::Ollama => return None,
        LlmProvider::OllamaCloud => ENV_OLLAMA_API_KEY,
        LlmProvider::Grok => ENV_XAI_API_KEY,
    };

    std::env::var(var).ok().filter(|key| !key.is_empty())
}

/// Game-wide default settings drawn from the environment.
pub fn ambient_default_settings() -> LlmSettings {
    let provider = match std::env::var(ENV_DEFAULT_PROVIDER).ok().as_deref() {
        Some("anthropic") => LlmProvider::Anthropic,
        Some("google") => LlmProvider::Google,
        Some("ollama") => LlmProvider::Ollama,
        Some("ollama_cloud") => LlmProvider::OllamaCloud,
        Some("grok") => LlmProvider::Grok,
        _ => LlmProvider::OpenAi,
    };

    LlmSettings {
        provider,
        model: std::env::var(ENV_DEFAULT_MODEL).ok().filter(|m| !m.is_empty()),
        api_key: None,
    }
}

/// Decider speaking the OpenAI chat-completions shape.
#[derive(Clone)]
pub struct LlmDecider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl LlmDecider {
    pub fn new(client: reqwest::Client, settings: &LlmSettings, retry: RetryConfig) -> Self {
        let provider = settings.provider;

        Self {
            client,
            base_url: base_url(provider),
            model: settings
                .model
                .clone()
                .or_else(|| std::env::var(ENV_DEFAULT_MODEL).ok().filter(|m| !m.is_empty()))
                .unwrap_or_else(|| default_model(provider).to_string()),
            api_key: settings.api_key.clone().or_else(|| env_api_key(provider)),
            retry,
        }
    }

    async fn chat_completion(&self, request: &DecideRequest) -> Result<String, DeciderError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response: Value = builder.send().await?.json().await?;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown provider error");
            return Err(DeciderError::Api(message.to_string()));
        }

        response
            .pointer("/choices/0/message/content")
            .and_then(|content| content.as_str())
            .map(str::to_string)
            .ok_or_else(|| DeciderError::Api("no content in response".to_string()))
    }
}

#[async_trait]
impl Decider for LlmDecider {
    async fn complete(&self, request: DecideRequest) -> Result<String, DeciderError> {
        let mut attempt = 1;

        loop {
            match self.chat_completion(&request).await {
                Ok(completion) => return Ok(completion),
                Err(err) if attempt < self.retry.max_attempts => {
                    let delay = self
                        .retry
                        .base_delay
                        .saturating_mul(2u32.saturating_pow(attempt - 1))
                        .min(self.retry.max_delay);

                    tracing::warn!(
                        "attempt {attempt}/{} against {} failed: {err}; retrying in {delay:?}",
                        self.retry.max_attempts,
                        self.base_url,
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Builds [`LlmDecider`]s over one shared HTTP client.
pub struct LlmDeciderFactory {
    client: reqwest::Client,
    retry: RetryConfig,
}

impl LlmDeciderFactory {
    pub fn new() -> Self {
        Self::with_retry(RetryConfig::default())
    }

    pub fn with_retry(retry: RetryConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self { client, retry }
    }
}

impl Default for LlmDeciderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DeciderFactory for LlmDeciderFactory {
    fn decider_for(&self, settings: &LlmSettings) -> Arc<dyn Decider> {
        Arc::new(LlmDecider::new(
            self.client.clone(),
            settings,
            self.retry.clone(),
        ))
    }
}
