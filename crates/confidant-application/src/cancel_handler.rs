//! Server-side cancellation of a pending turn.

use crate::require_conversation;
use confidant_core::Result;
use confidant_core::config::ConfigRepository;
use confidant_core::conversation::{CancelledTurn, LogSnapshot, TurnLog};
use confidant_core::persona::PersonaRepository;
use std::sync::Arc;

/// Result of [`CancelHandler::cancel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    /// A pending turn was removed.
    pub cancelled: bool,
    /// User text of the removed turn, handed back for re-editing.
    pub user_text: Option<String>,
    /// The log after the cancel.
    pub log: LogSnapshot,
}

/// Decides the fate of whatever turn is pending for a conversation.
///
/// The turn log applies the removal in one locked step, so against a
/// concurrent resolve exactly one side wins: either this returns
/// `cancelled: true` and the resolve reports a lost race, or the resolve
/// lands first and this returns `cancelled: false`.
pub struct CancelHandler {
    turn_log: Arc<dyn TurnLog>,
    personas: Arc<dyn PersonaRepository>,
    config: Arc<dyn ConfigRepository>,
}

impl CancelHandler {
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

    pub async fn cancel(&self, conversation_id: &str) -> Result<CancelOutcome> {
        require_conversation(self.personas.as_ref(), conversation_id).await?;
        let keep = self.config.get().await?.keep();

        let CancelledTurn { removed, log } =
            self.turn_log.cancel_pending(conversation_id, keep).await?;

        match &removed {
            Some(_) => tracing::info!(conversation_id, "pending turn cancelled"),
            None => tracing::debug!(conversation_id, "cancel requested but nothing was pending"),
        }

        Ok(CancelOutcome {
            cancelled: removed.is_some(),
            user_text: removed.map(|turn| turn.user_text),
            log: LogSnapshot::from(&log),
        })
    }
}
