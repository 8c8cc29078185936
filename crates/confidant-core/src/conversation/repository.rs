//! Turn log repository trait.
//!
//! Defines the durable operations on a conversation log.

use super::model::{ConversationLog, FencingToken, ResolveFailure, Turn};
use crate::error::Result;
use async_trait::async_trait;

/// A turn appended by [`TurnLog::append_pending`] together with the token
/// that alone may resolve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    pub turn: Turn,
    pub fencing_token: FencingToken,
}

/// Result of [`TurnLog::cancel_pending`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledTurn {
    /// The removed turn, or `None` when nothing was pending.
    pub removed: Option<Turn>,
    /// The log after the cancel.
    pub log: ConversationLog,
}

/// Durable, per-conversation storage of turns.
///
/// Every mutating operation is a single all-or-nothing read-modify-write:
/// readers never observe a partially written log.
///
/// # Implementation Notes
///
/// Implementations should:
/// - Fail with `NotFound` for unknown conversations
/// - Self-heal malformed content by normalizing it and writing the repair
/// - Persist atomically (temp file + rename or equivalent)
#[async_trait]
pub trait TurnLog: Send + Sync {
    /// Loads the log, repairing malformed content in place.
    async fn read(&self, conversation_id: &str) -> Result<ConversationLog>;

    /// Replaces the whole log. Returns the log as persisted.
    async fn write(&self, conversation_id: &str, log: ConversationLog) -> Result<ConversationLog>;

    /// Appends a pending turn, issues a fresh fencing token and trims to `keep + 1`.
    async fn append_pending(
        &self,
        conversation_id: &str,
        user_text: &str,
        keep: usize,
    ) -> Result<PendingTurn>;

    /// Resolves the pending turn.
    ///
    /// The outer `Result` carries storage failures; the inner one reports a
    /// lost race or an empty log, in which case nothing was written.
    async fn resolve_pending(
        &self,
        conversation_id: &str,
        assistant_text: &str,
        keep: usize,
        expected_token: Option<&FencingToken>,
    ) -> Result<std::result::Result<Turn, ResolveFailure>>;

    /// Removes the pending turn if there is one. Idempotent.
    async fn rollback_pending(&self, conversation_id: &str, keep: usize) -> Result<ConversationLog>;

    /// Same effect as [`TurnLog::rollback_pending`], returning the removed turn.
    async fn cancel_pending(&self, conversation_id: &str, keep: usize) -> Result<CancelledTurn>;

    /// Appends a completed turn directly.
    async fn append_turn(
        &self,
        conversation_id: &str,
        user_text: &str,
        assistant_text: &str,
        keep: usize,
    ) -> Result<ConversationLog>;

    /// Trims the log to `keep` turns (`keep + 1` while pending).
    async fn trim(&self, conversation_id: &str, keep: usize) -> Result<ConversationLog>;
}
