//! Polling fallback while the server holds a pending turn.

use crate::api::ChatApi;
use crate::registry::ClientRegistry;
use crate::view::{ChatView, ClientStatus};
use confidant_core::Result;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Outcome of one poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    /// The server still holds a pending turn.
    Pending,
    Done,
    /// A local request is in flight or another poll is running.
    Skipped,
    /// The conversation is no longer registered.
    Gone,
}

/// Re-fetches the log of a pending conversation until it is `Done`.
///
/// One polling task per conversation; the task lives in the conversation's
/// [`crate::ConversationClientState`] and dies with it.
#[derive(Clone)]
pub struct ReconciliationPoller {
    api: Arc<dyn ChatApi>,
    view: Arc<dyn ChatView>,
    registry: Arc<ClientRegistry>,
    interval: Duration,
}

impl ReconciliationPoller {
    pub fn new(
        api: Arc<dyn ChatApi>,
        view: Arc<dyn ChatView>,
        registry: Arc<ClientRegistry>,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            view,
            registry,
            interval,
        }
    }

    /// Starts polling. Returns `false` if a poll task is already running.
    pub fn start(&self, conversation_id: &str) -> bool {
        self.registry.with(conversation_id, |state| {
            if state.poll_task.is_some() {
                return false;
            }
            state.poll_generation += 1;
            let generation = state.poll_generation;
            let poller = self.clone();
            let id = conversation_id.to_string();
            state.poll_task = Some(tokio::spawn(async move {
                poller.run(id, generation).await;
            }));
            tracing::debug!(conversation_id, "polling started");
            true
        })
    }

    pub fn stop(&self, conversation_id: &str) {
        self.registry
            .with_existing(conversation_id, |state| state.stop_polling());
    }

    async fn run(self, conversation_id: String, generation: u64) {
        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        loop {
            ticker.tick().await;
            match self.poll_once(&conversation_id).await {
                Ok(PollStatus::Done) | Ok(PollStatus::Gone) => break,
                Ok(PollStatus::Pending) | Ok(PollStatus::Skipped) => {}
                Err(err) => {
                    tracing::debug!(conversation_id, error = %err, "poll failed, retrying");
                }
            }
        }

        self.registry.with_existing(&conversation_id, |state| {
            if state.poll_generation == generation {
                state.poll_task = None;
            }
        });
        tracing::debug!(conversation_id, "polling stopped");
    }

    /// Fetches the log once and re-renders it if it changed.
    pub async fn poll_once(&self, conversation_id: &str) -> Result<PollStatus> {
        let previous = self.registry.with_existing(conversation_id, |state| {
            if state.in_flight.is_some() || state.poll_in_flight {
                return None;
            }
            state.poll_in_flight = true;
            Some(state.last_log.clone())
        });
        let previous = match previous {
            None => return Ok(PollStatus::Gone),
            Some(None) => return Ok(PollStatus::Skipped),
            Some(Some(previous)) => previous,
        };

        let fetched = self.api.fetch_log(conversation_id).await;
        let log = match fetched {
            Ok(log) => log,
            Err(err) => {
                self.registry
                    .with_existing(conversation_id, |state| state.poll_in_flight = false);
                return Err(err);
            }
        };

        let was_pending = previous.as_ref().is_some_and(|log| log.is_pending());
        let registered = self.registry.with_existing(conversation_id, |state| {
            state.poll_in_flight = false;
            state.last_log = Some(log.clone());
            if !log.is_pending() {
                state.is_generating = false;
            }
        });
        if registered.is_none() {
            return Ok(PollStatus::Gone);
        }

        if previous.as_ref() != Some(&log) {
            self.view.render_log(conversation_id, &log);
        }
        if log.is_pending() {
            return Ok(PollStatus::Pending);
        }
        if was_pending {
            tracing::info!(conversation_id, "pending turn settled on the server");
            self.view.show_typing(conversation_id, false);
            self.view.set_status(conversation_id, &ClientStatus::Ready);
        }
        Ok(PollStatus::Done)
    }
}
