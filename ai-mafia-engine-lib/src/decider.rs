//! The decision capability the orchestrator depends on.
//!
//! A decider turns a prompt pair into raw model text; the typed layer parses
//! that text into one of the closed response schemas. Every failure here is
//! recoverable at the call site with a role-appropriate fallback, so the
//! game never aborts on a misbehaving provider.

use std::sync::Arc;

use ai_mafia_lib::LlmSettings;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeciderError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider error: {0}")]
    Api(String),
    #[error("malformed model output: {0}")]
    MalformedOutput(String),
}

/// Prompt pair for one decision.
#[derive(Clone, Debug)]
pub struct DecideRequest {
    pub system: String,
    pub user: String,
}

/// Produces raw model text for a decision request.
#[async_trait]
pub trait Decider: Send + Sync {
    async fn complete(&self, request: DecideRequest) -> Result<String, DeciderError>;
}

/// Resolves per-player settings to a decider. A single game may mix
/// providers.
pub trait DeciderFactory: Send + Sync {
    fn decider_for(&self, settings: &LlmSettings) -> Arc<dyn Decider>;
}

/// A response schema the typed layer can parse, with the format instructions
/// the model is given.
pub trait ResponseSchema: DeserializeOwned {
    const FORMAT: &'static str;
}

/// Structured response for night actions.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct NightActionResponse {
    /// Wire form of the targeted player id.
    pub target_id: String,
    #[serde(default)]
    pub private_reason: Option<String>,
}

impl ResponseSchema for NightActionResponse {
    const FORMAT: &'static str = r#"Respond with a single JSON object: {"target_id": "<player id>", "private_reason": "<optional, mafia only>"}."#;
}

/// Structured response for the day vote.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct VoteResponse {
    /// A player id, or the literal `abstain`.
    #[serde(alias = "player_id")]
    pub target_id: String,
    #[serde(default)]
    pub reason: String,
}

impl ResponseSchema for VoteResponse {
    const FORMAT: &'static str = r#"Respond with a single JSON object: {"target_id": "<player id or 'abstain'>", "reason": "<short public reason>"}."#;
}

/// Structured response for a discussion turn.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct DiscussionResponse {
    pub statement: String,
    /// Granted at most once per invocation, and only under the round cap.
    #[serde(default)]
    pub request_another_turn: bool,
}

impl ResponseSchema for DiscussionResponse {
    const FORMAT: &'static str = r#"Respond with a single JSON object: {"statement": "<1-3 sentences>", "request_another_turn": false}."#;
}

/// Structured response for the round summarizer.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct SummaryResponse {
    pub summary: String,
}

impl ResponseSchema for SummaryResponse {
    const FORMAT: &'static str = r#"Respond with a single JSON object: {"summary": "<2-4 neutral sentences>"}."#;
}

/// Runs one decision and parses the completion into `T`.
///
/// The model is told the rules and the response format in the system prompt;
/// the situation report and role instructions travel in the user prompt.
pub async fn decide<T: ResponseSchema>(
    decider: &dyn Decider,
    rules: &str,
    context: &str,
    instructions: &str,
) -> Result<T, DeciderError> {
    let request = DecideRequest {
        system: format!("{rules}\n\n{}", T::FORMAT),
        user: format!("{context}\n\n{instructions}"),
    };

    let completion = decider.complete(request).await?;
    let json = extract_json(&completion);

    serde_json::from_str(json)
        .map_err(|err| DeciderError::MalformedOutput(format!("{err}: {completion:.200}")))
}

/// Cuts a JSON object out of a completion that may be wrapped in prose or
/// Markdown code fences.
fn extract_json(completion: &str) -> &str {
    let trimmed = completion.trim();

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}
