//! Completion service client.
//!
//! The pipeline treats the AI as a single capability: feed it a prompt,
//! get text back. The [`Completion`] trait is that seam; [`AiClient`] is
//! the Anthropic messages API implementation used in deployment, and tests
//! substitute canned fakes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use leadload::ai::{AiClient, Completion, CompletionOptions};
//!
//! let client = AiClient::from_env()?;
//! let text = client
//!     .complete("Reply with {\"ok\":true}", &CompletionOptions::json(256))
//!     .await?;
//! ```

pub mod prompt;

use serde::Deserialize;
use std::env;
use std::future::Future;

use crate::error::{AiError, AiResult};

/// System instruction used when a call demands machine-readable output.
/// The messages API has no response-format switch, so JSON-only output is
/// enforced through the system prompt plus the fallback parsing downstream.
const JSON_SYSTEM_PROMPT: &str = "You are an AI assistant that strictly outputs a single valid \
JSON value matching the user's instructions. Do not include any explanatory text before or \
after the JSON.";

/// Delay between retry attempts in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

// =============================================================================
// Capability trait
// =============================================================================

/// Per-call completion parameters.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Model override; `None` uses the client's configured model.
    pub model: Option<String>,
    /// Sampling temperature. Mapping and extraction run near zero for
    /// determinism.
    pub temperature: f32,
    /// Output token budget.
    pub max_tokens: u32,
    /// Demand machine-readable JSON output.
    pub json_only: bool,
}

impl CompletionOptions {
    /// Low-temperature JSON-demanding options used by the mapper and the
    /// extractor.
    pub fn json(max_tokens: u32) -> Self {
        Self {
            model: None,
            temperature: 0.05,
            max_tokens,
            json_only: true,
        }
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.0,
            max_tokens: 1024,
            json_only: false,
        }
    }
}

/// Abstraction over the completion backend.
///
/// Implementations must be `Send + Sync`; the pipeline is generic over the
/// provider so tests can run without network access.
pub trait Completion: Send + Sync {
    /// Send one prompt and return the response text.
    fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> impl Future<Output = AiResult<String>> + Send;

    /// Provider name for logging.
    fn name(&self) -> &str {
        "ai"
    }
}

// =============================================================================
// Anthropic client
// =============================================================================

/// Anthropic messages API client.
#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

/// Anthropic API response structure.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// Anthropic API error response.
#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl AiClient {
    /// Create a client with an explicit API key.
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model: "claude-sonnet-4-20250514".to_string(),
        }
    }

    /// Create a client from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> AiResult<Self> {
        // Try loading .env file
        let _ = dotenvy::dotenv();

        let api_key = env::var("ANTHROPIC_API_KEY").map_err(|_| AiError::MissingApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Set the default model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    async fn call_api(&self, prompt: &str, options: &CompletionOptions) -> AiResult<String> {
        let model = options.model.as_deref().unwrap_or(&self.model);

        let mut request_body = serde_json::json!({
            "model": model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });
        if options.json_only {
            request_body["system"] = serde_json::json!(JSON_SYSTEM_PROMPT);
        }

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<AnthropicError>(&body) {
                return Err(AiError::ApiError(error.error.message));
            }
            return Err(AiError::ApiError(format!("HTTP {}: {}", status, body)));
        }

        let response: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::MalformedResponse(e.to_string()))?;

        let text = response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(AiError::MalformedResponse("empty response".to_string()));
        }

        Ok(text)
    }
}

impl Completion for AiClient {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> AiResult<String> {
        self.call_api(prompt, options).await
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Call the completion service up to `attempts` times, sleeping between
/// tries. Used by the text extractor; the mapper stays single-shot.
pub async fn complete_with_attempts<C: Completion>(
    client: &C,
    prompt: &str,
    options: &CompletionOptions,
    attempts: u32,
) -> AiResult<String> {
    let mut last_error = None;

    for attempt in 1..=attempts {
        match client.complete(prompt, options).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                crate::api::logs::log_warning(format!(
                    "Completion attempt {}/{} failed: {}",
                    attempt, attempts, e
                ));
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(tokio::time::Duration::from_millis(RETRY_DELAY_MS)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| AiError::ApiError("unknown error".to_string())))
}

/// Extract a JSON object from a response that may wrap it in markdown code
/// fences or surrounding prose.
pub fn extract_json_object(text: &str) -> String {
    // ```json fenced block
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start..].find("```\n").or_else(|| text[start..].rfind("```")) {
            let json_start = start + 7;
            if json_start < start + end {
                return text[json_start..start + end].trim().to_string();
            }
        }
    }

    // Generic fenced block
    if let Some(start) = text.find("```") {
        let after_start = start + 3;
        let content_start = text[after_start..]
            .find('\n')
            .map(|i| after_start + i + 1)
            .unwrap_or(after_start);

        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim().to_string();
        }
    }

    // Raw object boundaries
    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if start < end {
                return text[start..=end].to_string();
            }
        }
    }

    text.to_string()
}
