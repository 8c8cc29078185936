//! Per-conversation send pipeline: batching, sending, cancelling, recovery.
//!
//! ```text
//! Idle ──submit──▶ Batching ──timer──▶ Sending ──reply/error──▶ Idle
//!                   ▲    │                │
//!                   └────┘ submit/undo    └──cancel──▶ Cancelling ──▶ Idle
//! ```

use crate::api::{ChatApi, ChatReply};
use crate::batch::{BATCH_SEPARATOR, PendingBatch, split_segments};
use crate::poller::{DEFAULT_POLL_INTERVAL, ReconciliationPoller};
use crate::registry::{ClientRegistry, ConversationClientState, InFlight};
use crate::storage::ClientStorage;
use crate::view::{ChatView, ClientStatus};
use chrono::{DateTime, TimeDelta, Utc};
use confidant_core::config::ChatConfig;
use confidant_core::conversation::LogSnapshot;
use confidant_core::{ConfidantError, Result};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Timing parameters of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSettings {
    /// Batch window.
    pub send_delay: Duration,
    /// Pause between revealed reply segments.
    pub segment_delay: Duration,
    pub poll_interval: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

impl ClientSettings {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            send_delay: config.send_delay(),
            segment_delay: config.segment_delay(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued { messages: usize, send_in: Duration },
    /// A reply is still outstanding; the text was not queued.
    Busy,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing queued, or a reply is already outstanding.
    Idle,
    Replied { assistant_text: String, discarded: bool },
    /// The send failed; its text went back to the input.
    Failed(ConfidantError),
    /// Cancelled locally; the response, if any, was dropped.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelResult {
    NothingToCancel,
    Cancelled { restored_text: String },
    /// The reply was stored before the cancel reached the server.
    AlreadyResolved,
    Failed { error: ConfidantError, polling: bool },
}

/// Client side of a conversation turn.
///
/// Cheap to clone; clones share state. Timers run as tokio tasks, so the
/// pipeline must be used from within a runtime.
#[derive(Clone)]
pub struct SendPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    api: Arc<dyn ChatApi>,
    storage: Arc<dyn ClientStorage>,
    view: Arc<dyn ChatView>,
    registry: Arc<ClientRegistry>,
    poller: ReconciliationPoller,
    settings: RwLock<ClientSettings>,
}

impl SendPipeline {
    pub fn new(
        api: Arc<dyn ChatApi>,
        storage: Arc<dyn ClientStorage>,
        view: Arc<dyn ChatView>,
        settings: ClientSettings,
    ) -> Self {
        let registry = Arc::new(ClientRegistry::default());
        let poller = ReconciliationPoller::new(
            api.clone(),
            view.clone(),
            registry.clone(),
            settings.poll_interval,
        );
        Self {
            inner: Arc::new(PipelineInner {
                api,
                storage,
                view,
                registry,
                poller,
                settings: RwLock::new(settings),
            }),
        }
    }

    pub fn poller(&self) -> &ReconciliationPoller {
        &self.inner.poller
    }

    pub fn settings(&self) -> ClientSettings {
        *self
            .inner
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies the server's batch window and reveal pacing.
    pub fn apply_config(&self, config: &ChatConfig) {
        let mut settings = self
            .inner
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        settings.send_delay = config.send_delay();
        settings.segment_delay = config.segment_delay();
    }

    pub async fn refresh_config(&self) -> Result<ChatConfig> {
        let config = self.inner.api.fetch_config().await?;
        self.apply_config(&config);
        Ok(config)
    }

    /// Reads the state of a conversation without creating it.
    pub fn inspect<R>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&ConversationClientState) -> R,
    ) -> Option<R> {
        self.inner
            .registry
            .with_existing(conversation_id, |state| f(state))
    }

    /// Loads the authoritative log and resumes whatever was interrupted.
    ///
    /// A server-side pending turn wins over a stored batch: the batch is
    /// dropped and polling takes over. Otherwise a stored batch is re-armed.
    pub async fn attach(&self, conversation_id: &str) -> Result<LogSnapshot> {
        let log = self.inner.api.fetch_log(conversation_id).await?;
        let pending = log.is_pending();

        self.inner.registry.with(conversation_id, |state| {
            state.last_log = Some(log.clone());
            if pending {
                state.is_generating = true;
                state.disarm_batch_timer();
                state.batch.clear();
                state.batch_created_at = None;
            } else if state.in_flight.is_none() {
                state.is_generating = false;
            }
        });
        self.inner.view.render_log(conversation_id, &log);

        if pending {
            if PendingBatch::load(self.inner.storage.as_ref(), conversation_id).is_some() {
                tracing::info!(
                    conversation_id,
                    "server already holds a pending turn, dropping the stored batch"
                );
            }
            PendingBatch::clear(self.inner.storage.as_ref(), conversation_id);
            self.inner.view.show_batch(conversation_id, &[]);
            self.inner.view.show_typing(conversation_id, true);
            self.inner
                .view
                .set_status(conversation_id, &ClientStatus::Generating);
            self.inner.poller.start(conversation_id);
        } else {
            self.restore_batch(conversation_id);
        }
        Ok(log)
    }

    /// Re-arms a batch persisted by an earlier process.
    ///
    /// An overdue batch is sent at once. Returns `false` when there is
    /// nothing to restore or a reply is outstanding.
    pub fn restore_batch(&self, conversation_id: &str) -> bool {
        let Some(stored) = PendingBatch::load(self.inner.storage.as_ref(), conversation_id) else {
            return false;
        };
        let remaining = stored.remaining(Utc::now());

        let restored = self.inner.registry.with(conversation_id, |state| {
            if state.is_busy() || !state.batch.is_empty() {
                return false;
            }
            state.batch = stored.messages;
            state.batch_created_at = Some(stored.created_at);
            self.inner.view.show_batch(conversation_id, &state.batch);
            self.arm_batch_timer(conversation_id, state, remaining);
            true
        });
        if restored {
            tracing::info!(
                conversation_id,
                remaining_ms = remaining.as_millis() as u64,
                "restored pending batch"
            );
        }
        restored
    }

    /// Adds `text` to the batch and (re)starts the batch window.
    pub fn submit(&self, conversation_id: &str, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SubmitOutcome::Empty;
        }
        let delay = self.settings().send_delay;
        let now = Utc::now();

        let queued = self.inner.registry.with(conversation_id, |state| {
            if state.is_busy() {
                return None;
            }
            state.batch.push(text.to_string());
            let batch = PendingBatch {
                messages: state.batch.clone(),
                created_at: *state.batch_created_at.get_or_insert(now),
                send_at: deadline(now, delay),
            };
            batch.save(self.inner.storage.as_ref(), conversation_id);
            self.inner.view.show_batch(conversation_id, &batch.messages);
            self.arm_batch_timer(conversation_id, state, delay);
            Some(batch.messages.len())
        });

        match queued {
            Some(messages) => {
                tracing::debug!(conversation_id, messages, "message queued");
                SubmitOutcome::Queued {
                    messages,
                    send_in: delay,
                }
            }
            None => {
                self.inner
                    .view
                    .set_status(conversation_id, &ClientStatus::Busy);
                SubmitOutcome::Busy
            }
        }
    }

    /// Pops the last queued message back into the input.
    ///
    /// Only possible while batching; once sending has started there is
    /// nothing to undo.
    pub fn undo(&self, conversation_id: &str) -> Option<String> {
        let delay = self.settings().send_delay;
        let now = Utc::now();

        let popped = self
            .inner
            .registry
            .with_existing(conversation_id, |state| {
                if state.is_busy() {
                    return None;
                }
                let popped = state.batch.pop()?;
                if state.batch.is_empty() {
                    state.disarm_batch_timer();
                    state.batch_created_at = None;
                    PendingBatch::clear(self.inner.storage.as_ref(), conversation_id);
                    self.inner.view.show_batch(conversation_id, &[]);
                    self.inner
                        .view
                        .set_status(conversation_id, &ClientStatus::Undone);
                } else {
                    let batch = PendingBatch {
                        messages: state.batch.clone(),
                        created_at: state.batch_created_at.unwrap_or(now),
                        send_at: deadline(now, delay),
                    };
                    batch.save(self.inner.storage.as_ref(), conversation_id);
                    self.inner.view.show_batch(conversation_id, &state.batch);
                    self.arm_batch_timer(conversation_id, state, delay);
                }
                Some(popped)
            })
            .flatten()?;

        self.inner.view.set_input(conversation_id, &popped);
        Some(popped)
    }

    fn arm_batch_timer(
        &self,
        conversation_id: &str,
        state: &mut ConversationClientState,
        delay: Duration,
    ) {
        state.disarm_batch_timer();
        let generation = state.batch_generation;
        state.countdown_remaining = countdown_seconds(delay);
        if state.countdown_remaining > 0 {
            self.inner.view.set_status(
                conversation_id,
                &ClientStatus::Countdown(state.countdown_remaining),
            );
        }

        let pipeline = self.clone();
        let id = conversation_id.to_string();
        state.batch_timer = Some(tokio::spawn(async move {
            pipeline.run_batch_timer(id, generation, delay).await;
        }));
    }

    /// Counts down once per second, then flushes, unless re-armed meanwhile.
    async fn run_batch_timer(self, conversation_id: String, generation: u64, delay: Duration) {
        let deadline = Instant::now() + delay;
        let second = Duration::from_secs(1);
        let mut ticker = tokio::time::interval_at(Instant::now() + second, second);

        loop {
            tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline) => break,
                _ = ticker.tick() => {
                    let remaining = self
                        .inner
                        .registry
                        .with_existing(&conversation_id, |state| {
                            (state.batch_generation == generation).then(|| {
                                state.countdown_remaining = state.countdown_remaining.saturating_sub(1);
                                state.countdown_remaining
                            })
                        })
                        .flatten();
                    match remaining {
                        None => return,
                        Some(0) => {}
                        Some(seconds) => self
                            .inner
                            .view
                            .set_status(&conversation_id, &ClientStatus::Countdown(seconds)),
                    }
                }
            }
        }

        let still_armed = self
            .inner
            .registry
            .with_existing(&conversation_id, |state| {
                if state.batch_generation != generation {
                    return false;
                }
                state.batch_timer = None;
                state.countdown_remaining = 0;
                true
            })
            .unwrap_or(false);
        if still_armed {
            self.flush(&conversation_id).await;
        }
    }

    /// Sends the queued batch as one request and reconciles with the result.
    pub async fn flush(&self, conversation_id: &str) -> FlushOutcome {
        let started = self.inner.registry.with(conversation_id, |state| {
            if state.is_busy() || state.batch.is_empty() {
                return None;
            }
            state.disarm_batch_timer();
            let text = std::mem::take(&mut state.batch).join(BATCH_SEPARATOR);
            state.batch_created_at = None;
            state.next_request_id += 1;
            let abort = CancellationToken::new();
            state.in_flight = Some(InFlight {
                id: state.next_request_id,
                text: text.clone(),
                abort: abort.clone(),
                ignore_response: false,
            });
            state.is_generating = true;
            PendingBatch::clear(self.inner.storage.as_ref(), conversation_id);
            Some((state.next_request_id, text, abort))
        });
        let Some((request_id, text, abort)) = started else {
            return FlushOutcome::Idle;
        };

        tracing::info!(conversation_id, chars = text.len(), "sending batch");
        self.inner.view.show_typing(conversation_id, true);
        self.inner
            .view
            .set_status(conversation_id, &ClientStatus::Generating);

        let result = tokio::select! {
            biased;
            _ = abort.cancelled() => None,
            result = self.inner.api.send_chat(conversation_id, &text) => Some(result),
        };

        // A superseded or missing in-flight entry means the send was voided.
        let ignored = self
            .inner
            .registry
            .with_existing(conversation_id, |state| match &state.in_flight {
                Some(in_flight) if in_flight.id == request_id => {
                    let ignore = in_flight.ignore_response;
                    state.in_flight = None;
                    ignore
                }
                _ => true,
            })
            .unwrap_or(true);

        if ignored {
            tracing::debug!(conversation_id, "dropping the response of a cancelled send");
            return FlushOutcome::Aborted;
        }
        match result {
            None => FlushOutcome::Aborted,
            Some(Ok(reply)) => self.finish_reply(conversation_id, reply).await,
            Some(Err(err)) => self.finish_failure(conversation_id, &text, err).await,
        }
    }

    async fn finish_reply(&self, conversation_id: &str, reply: ChatReply) -> FlushOutcome {
        // A discarded reply was never stored; only the refreshed log is shown.
        if reply.discarded {
            tracing::info!(conversation_id, "server discarded the reply");
        } else {
            let reveal = CancellationToken::new();
            self.inner.registry.with_existing(conversation_id, |state| {
                state.stop_reveal();
                state.reveal = Some(reveal.clone());
            });
            self.reveal_segments(conversation_id, &reply.assistant_message, &reveal)
                .await;
        }

        let log = self.inner.api.fetch_log(conversation_id).await;
        self.inner.registry.with_existing(conversation_id, |state| {
            state.reveal = None;
            state.is_generating = false;
            if let Ok(log) = &log {
                state.last_log = Some(log.clone());
            }
        });

        self.inner.view.show_typing(conversation_id, false);
        match &log {
            Ok(log) => self.inner.view.render_log(conversation_id, log),
            Err(err) => tracing::warn!(conversation_id, error = %err, "failed to refresh log after reply"),
        }
        self.inner.view.set_status(conversation_id, &ClientStatus::Ready);

        FlushOutcome::Replied {
            assistant_text: reply.assistant_message,
            discarded: reply.discarded,
        }
    }

    async fn finish_failure(
        &self,
        conversation_id: &str,
        text: &str,
        err: ConfidantError,
    ) -> FlushOutcome {
        tracing::warn!(conversation_id, error = %err, "send failed, restoring input");
        self.inner.view.show_typing(conversation_id, false);
        self.inner.view.show_batch(conversation_id, &[]);
        self.restore_input(conversation_id, text);
        self.inner
            .view
            .set_status(conversation_id, &ClientStatus::SendFailed(err.to_string()));

        let log = match self.inner.api.fetch_log(conversation_id).await {
            Ok(log) => Some(log),
            Err(refresh_err) => {
                tracing::warn!(conversation_id, error = %refresh_err, "failed to refresh log after send failure");
                None
            }
        };
        let server_pending = log.as_ref().is_some_and(LogSnapshot::is_pending);
        self.inner.registry.with_existing(conversation_id, |state| {
            state.is_generating = server_pending;
            if let Some(log) = &log {
                state.last_log = Some(log.clone());
            }
        });
        if let Some(log) = &log {
            self.inner.view.render_log(conversation_id, log);
        }
        if server_pending {
            self.inner.poller.start(conversation_id);
        }

        FlushOutcome::Failed(err)
    }

    /// Shows the reply segment by segment, `segment_delay` apart.
    async fn reveal_segments(&self, conversation_id: &str, text: &str, stop: &CancellationToken) {
        let delay = self.settings().segment_delay;
        let segments = split_segments(text);

        if segments.len() <= 1 || delay.is_zero() {
            for segment in segments {
                self.inner.view.reveal_segment(conversation_id, segment);
            }
            return;
        }

        for (index, segment) in segments.into_iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if stop.is_cancelled() {
                return;
            }
            self.inner.view.reveal_segment(conversation_id, segment);
        }
    }

    /// Asks the server to void the pending turn and settles local state.
    pub async fn cancel(&self, conversation_id: &str) -> CancelResult {
        let pending_text = self.inner.registry.with(conversation_id, |state| {
            let local = state.in_flight.as_mut().map(|in_flight| {
                in_flight.ignore_response = true;
                in_flight.abort.cancel();
                in_flight.text.clone()
            });
            let server = state
                .last_log
                .as_ref()
                .and_then(LogSnapshot::pending_user_text)
                .map(str::to_string);
            if local.is_none() && server.is_none() {
                return None;
            }
            state.stop_polling();
            Some(local.or(server).unwrap_or_default())
        });
        let Some(pending_text) = pending_text else {
            return CancelResult::NothingToCancel;
        };
        tracing::info!(conversation_id, "cancelling pending reply");

        let reply = self.inner.api.cancel_chat(conversation_id).await;
        let log = match reply.as_ref().ok().and_then(|reply| reply.log.clone()) {
            Some(log) => Some(log),
            None => self.inner.api.fetch_log(conversation_id).await.ok(),
        };
        if let Some(log) = &log {
            self.inner.registry.with_existing(conversation_id, |state| {
                state.last_log = Some(log.clone());
            });
            self.inner.view.render_log(conversation_id, log);
        }

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(conversation_id, error = %err, "cancel failed");
                self.inner
                    .view
                    .set_status(conversation_id, &ClientStatus::CancelFailed(err.to_string()));
                let polling = log.as_ref().is_some_and(LogSnapshot::is_pending);
                self.inner.registry.with_existing(conversation_id, |state| {
                    state.is_generating = polling;
                });
                if polling {
                    self.inner.poller.start(conversation_id);
                } else {
                    self.inner.view.show_typing(conversation_id, false);
                }
                return CancelResult::Failed {
                    error: err,
                    polling,
                };
            }
        };

        self.inner.registry.with_existing(conversation_id, |state| {
            state.is_generating = false;
        });
        self.inner.view.show_typing(conversation_id, false);

        if reply.cancelled {
            let restored_text = if pending_text.is_empty() {
                reply.user_message
            } else {
                pending_text
            };
            if !restored_text.is_empty() {
                self.restore_input(conversation_id, &restored_text);
            }
            self.inner
                .view
                .set_status(conversation_id, &ClientStatus::Cancelled);
            CancelResult::Cancelled { restored_text }
        } else {
            self.inner
                .view
                .set_status(conversation_id, &ClientStatus::AlreadyResolved);
            CancelResult::AlreadyResolved
        }
    }

    /// Stops the reply reveal, e.g. when switching to another conversation.
    pub fn detach(&self, conversation_id: &str) {
        self.inner
            .registry
            .with_existing(conversation_id, |state| state.stop_reveal());
    }

    /// Drops all client state of a deleted conversation, stored batch included.
    pub fn forget(&self, conversation_id: &str) {
        self.inner.registry.remove(conversation_id);
        PendingBatch::clear(self.inner.storage.as_ref(), conversation_id);
        tracing::debug!(conversation_id, "conversation state dropped");
    }

    /// Puts `text` in front of whatever the user has typed since.
    fn restore_input(&self, conversation_id: &str, text: &str) {
        let existing = self.inner.view.input(conversation_id);
        let next = if existing.trim().is_empty() {
            text.to_string()
        } else {
            format!("{text}\n{existing}")
        };
        self.inner.view.set_input(conversation_id, &next);
    }
}

fn deadline(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now + TimeDelta::from_std(delay).unwrap_or_else(|_| TimeDelta::zero())
}

/// Whole seconds shown in the countdown; at least 1 for any non-zero delay.
fn countdown_seconds(delay: Duration) -> u64 {
    if delay.is_zero() {
        0
    } else {
        delay.as_millis().div_ceil(1000).max(1) as u64
    }
}
