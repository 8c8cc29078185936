//! Completion collaborator contract.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Represents the role of a message in a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One prompt message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: MessageRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// A single, stateless completion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<PromptMessage>,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Reply of the completion collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Non-blank reply text.
    pub text: String,
    pub usage: Option<Usage>,
    pub model: Option<String>,
}

/// The external LLM completion service.
///
/// Called once per turn and never retried: any `Err` (which should be
/// `ConfidantError::Completion`) makes the caller roll the pending turn back.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}
