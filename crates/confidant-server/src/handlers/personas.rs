use super::Ack;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use confidant_core::ConfidantError;
use confidant_core::persona::PersonaSummary;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct PersonaList {
    pub personas: Vec<PersonaSummary>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePersonaRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    #[serde(default)]
    pub order: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Vec<String>,
}

pub async fn list_personas(State(state): State<AppState>) -> ApiResult<PersonaList> {
    let personas = state.personas.list().await?;
    Ok(Json(PersonaList { personas }))
}

pub async fn create_persona(
    State(state): State<AppState>,
    payload: Result<Json<CreatePersonaRequest>, JsonRejection>,
) -> ApiResult<PersonaSummary> {
    let Json(request) = payload.map_err(ApiError::from)?;
    let created = state
        .personas
        .create(request.id.trim(), &request.name)
        .await?;
    Ok(Json(created))
}

/// Non-string entries are skipped; the repository drops the rest of the noise.
pub async fn set_order(
    State(state): State<AppState>,
    payload: Result<Json<OrderRequest>, JsonRejection>,
) -> ApiResult<OrderResponse> {
    let Json(request) = payload.map_err(ApiError::from)?;
    let Some(Value::Array(items)) = request.order else {
        return Err(ConfidantError::validation("order must be an array").into());
    };
    let order: Vec<String> = items
        .iter()
        .filter_map(|item| item.as_str().map(str::to_string))
        .collect();

    let order = state.personas.set_order(&order).await?;
    Ok(Json(OrderResponse { order }))
}

pub async fn delete_persona(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
) -> ApiResult<Ack> {
    state.personas.delete(&persona_id).await?;
    Ok(Ack::ok())
}
