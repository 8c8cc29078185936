use super::{ConversationQuery, resolve_conversation_id};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
};
use confidant_core::ConfidantError;
use confidant_core::completion::Usage;
use confidant_core::conversation::LogSnapshot;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub user_message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub assistant_message: String,
    pub discarded: bool,
    pub usage: Option<Usage>,
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub cancelled: bool,
    /// Text of the removed turn, empty when nothing was cancelled.
    pub user_message: String,
    pub log: LogSnapshot,
}

pub async fn send_message(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatResponse> {
    let Json(request) = payload.map_err(ApiError::from)?;
    let conversation_id = resolve_conversation_id(
        request.conversation_id.as_deref(),
        query.conversation_id.as_deref(),
    );
    let user_message = request.user_message.unwrap_or_default();

    // The turn runs detached so a dropped connection cannot strand it pending.
    let orchestrator = state.orchestrator.clone();
    let outcome = tokio::spawn(async move {
        orchestrator.chat(&conversation_id, &user_message).await
    })
    .await
    .map_err(|e| ConfidantError::internal(format!("chat task failed: {e}")))??;

    Ok(Json(ChatResponse {
        assistant_message: outcome.assistant_text,
        discarded: outcome.discarded,
        usage: outcome.usage,
        model: outcome.model,
    }))
}

pub async fn cancel(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
    body: Option<Json<CancelRequest>>,
) -> ApiResult<CancelResponse> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let conversation_id = resolve_conversation_id(
        request.conversation_id.as_deref(),
        query.conversation_id.as_deref(),
    );

    let outcome = state.cancel_handler.cancel(&conversation_id).await?;
    Ok(Json(CancelResponse {
        cancelled: outcome.cancelled,
        user_message: outcome.user_text.unwrap_or_default(),
        log: outcome.log,
    }))
}
