//! Per-conversation resources: the turn log and the persona text.

use super::Ack;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use confidant_core::ConfidantError;
use confidant_core::conversation::LogSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize, Serialize)]
pub struct PersonaContent {
    #[serde(default)]
    pub content: Option<String>,
}

pub async fn get_log(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult<LogSnapshot> {
    Ok(Json(state.conversations.log(&conversation_id).await?))
}

pub async fn put_log(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<LogSnapshot> {
    let Json(body) = payload.map_err(ApiError::from)?;
    Ok(Json(
        state
            .conversations
            .replace_log(&conversation_id, &body)
            .await?,
    ))
}

pub async fn get_persona(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult<PersonaContent> {
    let content = state.personas.get_content(&conversation_id).await?;
    Ok(Json(PersonaContent {
        content: Some(content),
    }))
}

pub async fn put_persona(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    payload: Result<Json<PersonaContent>, JsonRejection>,
) -> ApiResult<Ack> {
    let Json(request) = payload.map_err(ApiError::from)?;
    let content = request
        .content
        .ok_or_else(|| ConfidantError::validation("persona content must be a string"))?;
    state
        .personas
        .set_content(&conversation_id, &content)
        .await?;
    Ok(Ack::ok())
}
