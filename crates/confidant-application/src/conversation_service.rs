//! Log maintenance that bypasses the chat flow.

use crate::require_conversation;
use confidant_core::Result;
use confidant_core::config::{ChatConfig, ChatConfigPatch, ConfigRepository};
use confidant_core::conversation::{LogSnapshot, TurnLog, normalize_value};
use confidant_core::persona::PersonaRepository;
use serde_json::Value;
use std::sync::Arc;

/// Reading and replacing logs, and configuration changes that reshape them.
pub struct ConversationService {
    turn_log: Arc<dyn TurnLog>,
    personas: Arc<dyn PersonaRepository>,
    config: Arc<dyn ConfigRepository>,
}

impl ConversationService {
    pub fn new(
        turn_log: Arc<dyn TurnLog>,
        personas: Arc<dyn PersonaRepository>,
        config: Arc<dyn ConfigRepository>,
    ) -> Self {
        Self {
            turn_log,
            personas,
            config,
        }
    }

    pub async fn log(&self, conversation_id: &str) -> Result<LogSnapshot> {
        require_conversation(self.personas.as_ref(), conversation_id).await?;
        let log = self.turn_log.read(conversation_id).await?;
        Ok(LogSnapshot::from(&log))
    }

    /// Replaces a log with client-supplied JSON.
    ///
    /// The body goes through the same lenient normalization as stored files.
    /// Clients never hold fencing tokens, so any `pendingId` in the body is
    /// ignored and a pending replacement gets a fresh token. The result is
    /// trimmed to the configured history length like any other log.
    pub async fn replace_log(&self, conversation_id: &str, body: &Value) -> Result<LogSnapshot> {
        require_conversation(self.personas.as_ref(), conversation_id).await?;
        let keep = self.config.get().await?.keep();

        let mut body = body.clone();
        if let Some(object) = body.as_object_mut() {
            object.remove("pendingId");
        }
        let log = normalize_value(&body);

        self.turn_log.write(conversation_id, log).await?;
        let written = self.turn_log.trim(conversation_id, keep).await?;
        tracing::info!(
            conversation_id,
            turns = written.turns().len(),
            "log replaced"
        );
        Ok(LogSnapshot::from(&written))
    }

    pub async fn config(&self) -> Result<ChatConfig> {
        self.config.get().await
    }

    /// Saves a config patch, then trims every log to the new history length.
    ///
    /// Trim failures are logged per conversation; the saved config is
    /// returned regardless.
    pub async fn update_config(&self, patch: ChatConfigPatch) -> Result<ChatConfig> {
        let updated = self.config.update(patch).await?;
        let keep = updated.keep();

        for persona in self.personas.list().await? {
            if let Err(err) = self.turn_log.trim(&persona.id, keep).await {
                tracing::warn!(conversation_id = %persona.id, error = %err, "failed to trim log");
            }
        }
        Ok(updated)
    }
}
