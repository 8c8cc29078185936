//! OpenAiCompatibleClient - Chat Completions over REST.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint. Defaults
//! target SiliconFlow; configuration comes from environment variables
//! (`SILICONFLOW_API_KEY`, `SILICONFLOW_API_BASE`, `SILICONFLOW_MODEL`).

use async_trait::async_trait;
use confidant_core::completion::{
    Completion, CompletionRequest, CompletionService, PromptMessage, Usage,
};
use confidant_core::{ConfidantError, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.siliconflow.cn/v1";
pub const DEFAULT_MODEL: &str = "deepseek-ai/DeepSeek-V3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const API_KEY_VAR: &str = "SILICONFLOW_API_KEY";
const API_BASE_VAR: &str = "SILICONFLOW_API_BASE";
const MODEL_VAR: &str = "SILICONFLOW_MODEL";

/// [`CompletionService`] backed by an OpenAI-compatible HTTP API.
///
/// A missing API key is not an error until the first call, so the server
/// can start (and serve logs and personas) without one.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatibleClient {
    pub fn new(api_key: Option<String>, api_base: &str, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConfidantError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: chat_completions_url(api_base),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            model: model.into(),
        })
    }

    /// Reads the environment. Blank values fall back to the defaults.
    pub fn try_from_env() -> Result<Self> {
        let read = |name: &str| {
            env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self::new(
            read(API_KEY_VAR),
            read(API_BASE_VAR).as_deref().unwrap_or(DEFAULT_API_BASE),
            read(MODEL_VAR).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        )
    }

    /// Overrides the model after construction.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn send_request(&self, body: &ChatCompletionRequest<'_>) -> Result<ChatCompletionResponse> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ConfidantError::completion(None, format!("Server misconfigured: {API_KEY_VAR} is not set"))
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                ConfidantError::completion(None, format!("Completion request failed: {err}"))
            })?;

        let status = response.status();
        let body_text = response.text().await.map_err(|err| {
            ConfidantError::completion(
                Some(status.as_u16()),
                format!("Failed to read completion response: {err}"),
            )
        })?;

        if !status.is_success() {
            return Err(map_http_error(status, &body_text));
        }

        serde_json::from_str(&body_text).map_err(|err| {
            ConfidantError::completion(
                Some(status.as_u16()),
                format!("Failed to parse completion response: {err}"),
            )
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            stream: false,
            max_tokens: request.max_tokens,
            enable_thinking: false,
            temperature: request.temperature,
            top_p: request.top_p,
        };

        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            "sending completion request"
        );
        let parsed = self.send_request(&body).await?;
        let completion = extract_completion(parsed)?;
        tracing::debug!(
            model = completion.model.as_deref().unwrap_or(&self.model),
            total_tokens = completion.usage.map(|u| u.total_tokens),
            "completion received"
        );
        Ok(completion)
    }
}

/// Accepts either an API base (`.../v1`) or a full `/chat/completions` URL.
fn chat_completions_url(api_base: &str) -> String {
    let base = api_base.trim();
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    stream: bool,
    max_tokens: u32,
    enable_thinking: bool,
    temperature: f64,
    top_p: f64,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct FlatErrorResponse {
    message: String,
}

fn extract_completion(response: ChatCompletionResponse) -> Result<Completion> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ConfidantError::completion(None, "Completion API returned no content"))?;

    Ok(Completion {
        text,
        usage: response.usage.map(|usage| Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }),
        model: response.model,
    })
}

fn map_http_error(status: StatusCode, body: &str) -> ConfidantError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .or_else(|_| serde_json::from_str::<FlatErrorResponse>(body).map(|flat| flat.message))
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                format!("Completion API error {}", status.as_u16())
            } else {
                body.to_string()
            }
        });

    ConfidantError::completion(Some(status.as_u16()), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_normalization() {
        assert_eq!(
            chat_completions_url("https://api.example.com/v1/"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url(" https://proxy.local/chat/completions "),
            "https://proxy.local/chat/completions"
        );
    }

    #[test]
    fn test_map_http_error_prefers_structured_message() {
        let nested = map_http_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"bad key","type":"auth"}}"#,
        );
        assert_eq!(nested, ConfidantError::completion(Some(401), "bad key"));

        let flat = map_http_error(StatusCode::BAD_REQUEST, r#"{"message":"too long"}"#);
        assert_eq!(flat, ConfidantError::completion(Some(400), "too long"));

        let raw = map_http_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert_eq!(raw, ConfidantError::completion(Some(502), "upstream down"));

        let empty = map_http_error(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(
            empty,
            ConfidantError::completion(Some(503), "Completion API error 503")
        );
    }

    #[test]
    fn test_blank_content_is_an_error() {
        let response: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  "}}]}"#).unwrap();
        assert!(extract_completion(response).unwrap_err().is_completion());
    }
}
