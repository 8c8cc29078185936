use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use confidant_core::config::{ChatConfig, ChatConfigPatch};

pub async fn get_config(State(state): State<AppState>) -> ApiResult<ChatConfig> {
    Ok(Json(state.conversations.config().await?))
}

/// Saves the patch and trims every log to the new `memoryTurns`.
pub async fn put_config(
    State(state): State<AppState>,
    payload: Result<Json<ChatConfigPatch>, JsonRejection>,
) -> ApiResult<ChatConfig> {
    let Json(patch) = payload.map_err(ApiError::from)?;
    Ok(Json(state.conversations.update_config(patch).await?))
}
