//! The server contract as seen from the client.

use async_trait::async_trait;
use confidant_core::completion::Usage;
use confidant_core::config::ChatConfig;
use confidant_core::conversation::LogSnapshot;
use confidant_core::{ConfidantError, Result};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

/// Reply to `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub assistant_message: String,
    #[serde(default)]
    pub discarded: bool,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Reply to `POST /chat/cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReply {
    pub cancelled: bool,
    #[serde(default)]
    pub user_message: String,
    #[serde(default)]
    pub log: Option<LogSnapshot>,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_chat(&self, conversation_id: &str, user_message: &str) -> Result<ChatReply>;

    async fn cancel_chat(&self, conversation_id: &str) -> Result<CancelReply>;

    async fn fetch_log(&self, conversation_id: &str) -> Result<LogSnapshot>;

    async fn fetch_config(&self) -> Result<ChatConfig>;
}

/// [`ChatApi`] over HTTP.
///
/// No client-side timeout on `/chat`: the server bounds the completion call,
/// and the pipeline aborts the request itself on cancel.
#[derive(Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConfidantError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConfidantError::io(format!("Request to {url} failed: {e}")))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ConfidantError::io(format!("Failed to read response from {url}: {e}")))?;

        if !status.is_success() {
            return Err(map_error_response(status, &text));
        }
        serde_json::from_str(&text).map_err(ConfidantError::from)
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn send_chat(&self, conversation_id: &str, user_message: &str) -> Result<ChatReply> {
        self.request(
            Method::POST,
            "/chat",
            Some(json!({ "conversationId": conversation_id, "userMessage": user_message })),
        )
        .await
    }

    async fn cancel_chat(&self, conversation_id: &str) -> Result<CancelReply> {
        self.request(
            Method::POST,
            "/chat/cancel",
            Some(json!({ "conversationId": conversation_id })),
        )
        .await
    }

    async fn fetch_log(&self, conversation_id: &str) -> Result<LogSnapshot> {
        self.request(
            Method::GET,
            &format!("/conversation/{conversation_id}/log"),
            None,
        )
        .await
    }

    async fn fetch_config(&self) -> Result<ChatConfig> {
        let config: ChatConfig = self.request(Method::GET, "/config", None).await?;
        Ok(config.normalized())
    }
}

/// Rebuilds a typed error from the server's status and `{"error"}` body.
fn map_error_response(status: StatusCode, body: &str) -> ConfidantError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("error")?.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("Server returned {}", status.as_u16()));

    match status {
        StatusCode::BAD_REQUEST => ConfidantError::Validation(message),
        StatusCode::NOT_FOUND => ConfidantError::NotFound {
            entity_type: "conversation",
            id: message,
        },
        StatusCode::CONFLICT => ConfidantError::Conflict(message),
        StatusCode::BAD_GATEWAY => ConfidantError::completion(Some(status.as_u16()), message),
        _ => ConfidantError::internal(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_is_mapped_by_status() {
        let err = map_error_response(StatusCode::CONFLICT, r#"{"error":"busy"}"#);
        assert_eq!(err, ConfidantError::conflict("busy"));

        let err = map_error_response(StatusCode::BAD_GATEWAY, r#"{"error":"upstream"}"#);
        assert_eq!(err, ConfidantError::completion(Some(502), "upstream"));

        let err = map_error_response(StatusCode::INTERNAL_SERVER_ERROR, "<html>");
        assert_eq!(err, ConfidantError::internal("Server returned 500"));
    }

    #[test]
    fn test_cancel_reply_tolerates_missing_fields() {
        let reply: CancelReply = serde_json::from_str(r#"{"cancelled":false}"#).unwrap();
        assert!(!reply.cancelled);
        assert!(reply.user_message.is_empty());
        assert!(reply.log.is_none());
    }
}
