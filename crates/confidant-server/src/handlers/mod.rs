pub mod chat;
pub mod config;
pub mod conversation;
pub mod personas;

use axum::Json;
use chrono::Utc;
use confidant_core::persona::DEFAULT_PERSONA_ID;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// `?conversationId=` on routes that do not carry the id in the path.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationQuery {
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Json<Self> {
        Json(Self { ok: true })
    }
}

/// Body id first, then the query string, then the default conversation.
pub(crate) fn resolve_conversation_id(body: Option<&str>, query: Option<&str>) -> String {
    body.map(str::trim)
        .filter(|id| !id.is_empty())
        .or_else(|| query.map(str::trim).filter(|id| !id.is_empty()))
        .unwrap_or(DEFAULT_PERSONA_ID)
        .to_string()
}

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "ts": Utc::now().to_rfc3339() }))
}
