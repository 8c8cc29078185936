//! Application layer for Confidant.
//!
//! Use cases that coordinate the turn log, persona store and completion
//! service to implement one chat turn, its cancellation and log
//! maintenance.

pub mod cancel_handler;
pub mod chat_orchestrator;
pub mod conversation_service;

#[cfg(test)]
mod test_support;

pub use cancel_handler::{CancelHandler, CancelOutcome};
pub use chat_orchestrator::{ChatOrchestrator, ChatOutcome};
pub use conversation_service::ConversationService;

use confidant_core::persona::{PersonaRepository, is_valid_persona_id};
use confidant_core::{ConfidantError, Result};

/// Fails with `Validation` for malformed ids and `NotFound` for unknown ones.
pub(crate) async fn require_conversation(
    personas: &dyn PersonaRepository,
    conversation_id: &str,
) -> Result<()> {
    if !is_valid_persona_id(conversation_id) {
        return Err(ConfidantError::validation("conversation id is invalid"));
    }
    if !personas.exists(conversation_id).await? {
        return Err(ConfidantError::not_found("conversation", conversation_id));
    }
    Ok(())
}
