//! One chat turn, from user text to a resolved (or rolled back) log entry.

use crate::require_conversation;
use confidant_core::completion::{CompletionRequest, CompletionService, Usage};
use confidant_core::config::ConfigRepository;
use confidant_core::conversation::TurnLog;
use confidant_core::persona::{PersonaRepository, PromptRepository};
use confidant_core::prompt::{PromptInputs, build_messages};
use confidant_core::{ConfidantError, Result};
use std::sync::Arc;

/// Result of [`ChatOrchestrator::chat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub assistant_text: String,
    /// The turn was cancelled or superseded while the completion was running;
    /// the reply was not stored.
    pub discarded: bool,
    pub usage: Option<Usage>,
    pub model: Option<String>,
}

/// Server-side handler for one chat request.
///
/// # Responsibilities
///
/// - Building the prompt from the pre-prompt, persona text and completed history
/// - Holding the pending turn for exactly one completion call
/// - Resolving the turn with the fencing token it was issued, or rolling it back
pub struct ChatOrchestrator {
    turn_log: Arc<dyn TurnLog>,
    personas: Arc<dyn PersonaRepository>,
    prompts: Arc<dyn PromptRepository>,
    config: Arc<dyn ConfigRepository>,
    completion: Arc<dyn CompletionService>,
}

impl ChatOrchestrator {
    pub fn new(
        turn_log: Arc<dyn TurnLog>,
        personas: Arc<dyn PersonaRepository>,
        prompts: Arc<dyn PromptRepository>,
        config: Arc<dyn ConfigRepository>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            turn_log,
            personas,
            prompts,
            config,
            completion,
        }
    }

    /// Runs one turn.
    ///
    /// # Errors
    ///
    /// - `Validation`: malformed id or blank message, nothing was written
    /// - `NotFound`: unknown conversation
    /// - `Conflict`: a reply is already pending for this conversation
    /// - `Completion`: the completion call failed; the pending turn was rolled back
    pub async fn chat(&self, conversation_id: &str, user_text: &str) -> Result<ChatOutcome> {
        require_conversation(self.personas.as_ref(), conversation_id).await?;
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(ConfidantError::validation(
                "userMessage must be a non-empty string",
            ));
        }

        let config = self.config.get().await?;
        let keep = config.keep();
        let persona = self.personas.get_content(conversation_id).await?;
        let pre_prompt = self.prompts.get().await?;

        let log = self.turn_log.read(conversation_id).await?;
        if log.is_pending() {
            return Err(ConfidantError::conflict(format!(
                "a reply is already pending for conversation '{}'",
                conversation_id
            )));
        }

        let messages = build_messages(PromptInputs {
            pre_prompt: &pre_prompt,
            persona: &persona,
            history: log.history(keep),
            user_text,
        })?;

        let pending = self
            .turn_log
            .append_pending(conversation_id, user_text, keep)
            .await?;
        tracing::info!(conversation_id, "turn pending, calling completion service");

        let request = CompletionRequest {
            messages,
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        };
        let completion = match self.completion.complete(request).await {
            Ok(completion) => completion,
            Err(err) => {
                tracing::warn!(conversation_id, error = %err, "completion failed, rolling back");
                self.rollback_quietly(conversation_id, keep).await;
                return Err(err);
            }
        };

        let resolved = self
            .turn_log
            .resolve_pending(
                conversation_id,
                &completion.text,
                keep,
                Some(&pending.fencing_token),
            )
            .await;

        let discarded = match resolved {
            Ok(Ok(_)) => {
                tracing::info!(conversation_id, "turn resolved");
                false
            }
            Ok(Err(failure)) if failure.is_race_lost() => {
                tracing::warn!(
                    conversation_id,
                    reason = %failure,
                    "turn was cancelled or superseded, discarding reply"
                );
                true
            }
            Ok(Err(failure)) => {
                tracing::warn!(
                    conversation_id,
                    reason = %failure,
                    "pending turn vanished, appending the exchange instead"
                );
                if let Err(err) = self
                    .turn_log
                    .append_turn(conversation_id, user_text, &completion.text, keep)
                    .await
                {
                    tracing::error!(conversation_id, error = %err, "fallback append failed");
                }
                false
            }
            Err(err) if err.is_not_found() => {
                tracing::warn!(conversation_id, "conversation deleted mid-turn, discarding reply");
                true
            }
            Err(err) => {
                self.rollback_quietly(conversation_id, keep).await;
                return Err(err);
            }
        };

        Ok(ChatOutcome {
            assistant_text: completion.text,
            discarded,
            usage: completion.usage,
            model: completion.model,
        })
    }

    /// Rolls back the pending turn. Failures are logged, never returned.
    async fn rollback_quietly(&self, conversation_id: &str, keep: usize) {
        if let Err(err) = self.turn_log.rollback_pending(conversation_id, keep).await {
            tracing::error!(conversation_id, error = %err, "failed to roll back pending turn");
        }
    }
}
