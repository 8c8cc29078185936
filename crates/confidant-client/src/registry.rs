//! Per-conversation client state.

use confidant_core::conversation::LogSnapshot;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The one outstanding `/chat` request of a conversation.
#[derive(Debug)]
pub(crate) struct InFlight {
    pub(crate) id: u64,
    pub(crate) text: String,
    pub(crate) abort: CancellationToken,
    /// Set by cancel; a response that still arrives must not be rendered.
    pub(crate) ignore_response: bool,
}

/// In-memory state of one conversation. Never persisted.
///
/// Dropping it stops every task it owns.
#[derive(Debug, Default)]
pub struct ConversationClientState {
    pub(crate) batch: Vec<String>,
    pub(crate) batch_created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub(crate) batch_timer: Option<JoinHandle<()>>,
    /// Bumped whenever the batch timer is re-armed or disarmed.
    pub(crate) batch_generation: u64,
    pub(crate) countdown_remaining: u64,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) next_request_id: u64,
    pub(crate) is_generating: bool,
    pub(crate) last_log: Option<LogSnapshot>,
    pub(crate) reveal: Option<CancellationToken>,
    pub(crate) poll_task: Option<JoinHandle<()>>,
    pub(crate) poll_generation: u64,
    pub(crate) poll_in_flight: bool,
}

impl ConversationClientState {
    pub fn batch(&self) -> &[String] {
        &self.batch
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    pub fn countdown_remaining(&self) -> u64 {
        self.countdown_remaining
    }

    pub fn last_log(&self) -> Option<&LogSnapshot> {
        self.last_log.as_ref()
    }

    pub fn has_request_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.is_some()
    }

    /// A reply is outstanding locally or on the server.
    pub(crate) fn is_busy(&self) -> bool {
        self.is_generating || self.last_log.as_ref().is_some_and(LogSnapshot::is_pending)
    }

    pub(crate) fn disarm_batch_timer(&mut self) {
        if let Some(timer) = self.batch_timer.take() {
            timer.abort();
        }
        self.batch_generation += 1;
        self.countdown_remaining = 0;
    }

    pub(crate) fn stop_reveal(&mut self) {
        if let Some(reveal) = self.reveal.take() {
            reveal.cancel();
        }
    }

    pub(crate) fn stop_polling(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        self.poll_generation += 1;
        self.poll_in_flight = false;
    }
}

impl Drop for ConversationClientState {
    fn drop(&mut self) {
        self.disarm_batch_timer();
        self.stop_reveal();
        self.stop_polling();
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.abort.cancel();
        }
    }
}

/// Conversation states keyed by id, created on first access.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    states: Mutex<HashMap<String, ConversationClientState>>,
}

impl ClientRegistry {
    /// Runs `f` on the state of `conversation_id`, creating it if needed.
    ///
    /// `f` must not block; the registry lock is held while it runs.
    pub fn with<R>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut ConversationClientState) -> R,
    ) -> R {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        f(states.entry(conversation_id.to_string()).or_default())
    }

    /// Like [`ClientRegistry::with`], but never creates state.
    pub fn with_existing<R>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut ConversationClientState) -> R,
    ) -> Option<R> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get_mut(conversation_id).map(f)
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(conversation_id)
    }

    /// Removes and drops the state, stopping its tasks.
    pub fn remove(&self, conversation_id: &str) -> bool {
        let removed = self
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(conversation_id);
        removed.is_some()
    }
}
