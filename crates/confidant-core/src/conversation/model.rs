//! Conversation log domain model.
//!
//! A conversation log is an append-only sequence of [`Turn`]s plus a
//! [`LogStatus`]. The status is a tagged union: a pending log always carries
//! the [`FencingToken`] issued when its last turn was appended, and a done log
//! never carries one. Every transition below preserves:
//!
//! - `Pending` ⇔ a fencing token is present ⇔ the last turn awaits its reply
//! - `turns.len() <= keep + 1` while pending, `turns.len() <= keep` when done
//!   (for logs produced by these transitions with the same `keep`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// History length used when a caller has no configured value.
pub const DEFAULT_KEEP: usize = 20;

/// One-time credential authorizing resolution of one specific pending turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FencingToken(String);

impl FencingToken {
    /// Issues a fresh, never-reused token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for FencingToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for FencingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One user message and its assistant reply.
///
/// `assistant_text` is empty while the turn is pending. Identity is positional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// When the user message was accepted.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "user")]
    pub user_text: String,
    #[serde(rename = "assistant")]
    pub assistant_text: String,
}

impl Turn {
    /// A turn that has not been answered yet.
    pub fn pending(user_text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_text: user_text.into(),
            assistant_text: String::new(),
        }
    }

    /// A turn with both sides filled in.
    pub fn completed(user_text: impl Into<String>, assistant_text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_text: user_text.into(),
            assistant_text: assistant_text.into(),
        }
    }

    /// True while the assistant side is still blank.
    pub fn is_awaiting_reply(&self) -> bool {
        self.assistant_text.trim().is_empty()
    }
}

/// Status of a conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogStatus {
    #[default]
    Done,
    Pending { fencing_token: FencingToken },
}

impl LogStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn fencing_token(&self) -> Option<&FencingToken> {
        match self {
            Self::Pending { fencing_token } => Some(fencing_token),
            Self::Done => None,
        }
    }

    pub fn label(&self) -> StatusLabel {
        match self {
            Self::Done => StatusLabel::Done,
            Self::Pending { .. } => StatusLabel::Pending,
        }
    }
}

/// Token-free status tag as it appears on the wire and on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusLabel {
    #[default]
    Done,
    Pending,
}

/// Why a resolve attempt did not apply.
///
/// None of these are retryable. `NotPending` and `FencingMismatch` mean a
/// competing cancel or a newer turn already owns the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveFailure {
    /// The log has no turn awaiting a reply.
    NotPending,
    /// A turn is pending, but it was issued a different token.
    FencingMismatch,
    /// The log has no turns at all.
    Empty,
}

impl ResolveFailure {
    /// True when the failure means another writer won the race for this turn.
    pub fn is_race_lost(self) -> bool {
        matches!(self, Self::NotPending | Self::FencingMismatch)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotPending => "not_pending",
            Self::FencingMismatch => "fencing_mismatch",
            Self::Empty => "empty",
        }
    }
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable turn sequence of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationLog {
    turns: Vec<Turn>,
    status: LogStatus,
}

impl ConversationLog {
    /// An empty, done log.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a log from already-normalized turns and an optional explicit status.
    ///
    /// An explicit `Done` is honoured as given. An explicit `Pending` only
    /// holds while the last turn is still awaiting its reply. Without a hint the
    /// status is inferred from the last turn. A pending result keeps
    /// `existing_token` when one is supplied, otherwise a fresh token is issued.
    pub fn from_parts(
        turns: Vec<Turn>,
        status_hint: Option<StatusLabel>,
        existing_token: Option<FencingToken>,
    ) -> Self {
        let last_awaiting = turns.last().is_some_and(Turn::is_awaiting_reply);
        let pending = match status_hint {
            Some(StatusLabel::Done) => false,
            Some(StatusLabel::Pending) | None => last_awaiting,
        };

        let status = if pending {
            LogStatus::Pending {
                fencing_token: existing_token.unwrap_or_else(FencingToken::generate),
            }
        } else {
            LogStatus::Done
        };

        Self { turns, status }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn status(&self) -> &LogStatus {
        &self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Turns that may be shown to the model as history.
    ///
    /// Excludes the in-flight pending turn so the question being asked is not
    /// duplicated, and keeps at most `keep` of the most recent turns.
    pub fn history(&self, keep: usize) -> &[Turn] {
        let completed = if self.is_pending() {
            &self.turns[..self.turns.len().saturating_sub(1)]
        } else {
            &self.turns[..]
        };
        let start = completed.len().saturating_sub(keep);
        &completed[start..]
    }

    /// Appends a pending turn and issues a new fencing token.
    ///
    /// A pending turn that is still present is superseded: it is dropped, and
    /// whoever holds its token will fail to resolve it.
    pub fn append_pending(
        &mut self,
        user_text: impl Into<String>,
        keep: usize,
    ) -> (Turn, FencingToken) {
        if self.is_pending() {
            self.turns.pop();
        }

        let turn = Turn::pending(user_text);
        let token = FencingToken::generate();
        self.turns.push(turn.clone());
        self.status = LogStatus::Pending {
            fencing_token: token.clone(),
        };
        self.trim(keep);
        (turn, token)
    }

    /// Fills in the reply of the pending turn.
    ///
    /// When `expected_token` is `Some`, it must match the stored token. On any
    /// failure the log is left untouched.
    pub fn resolve_pending(
        &mut self,
        assistant_text: impl Into<String>,
        keep: usize,
        expected_token: Option<&FencingToken>,
    ) -> Result<Turn, ResolveFailure> {
        if self.turns.is_empty() {
            return Err(ResolveFailure::Empty);
        }
        let stored = self
            .status
            .fencing_token()
            .ok_or(ResolveFailure::NotPending)?;
        if expected_token.is_some_and(|expected| expected != stored) {
            return Err(ResolveFailure::FencingMismatch);
        }

        let last = self.turns.len() - 1;
        self.turns[last].assistant_text = assistant_text.into();
        let resolved = self.turns[last].clone();
        self.status = LogStatus::Done;
        self.trim(keep);
        Ok(resolved)
    }

    /// Removes the pending turn entirely. A no-op when nothing is pending.
    ///
    /// Returns the removed turn so callers can hand its text back to the user.
    pub fn rollback_pending(&mut self, keep: usize) -> Option<Turn> {
        if !self.is_pending() {
            return None;
        }
        let removed = self.turns.pop();
        self.status = LogStatus::Done;
        self.trim(keep);
        removed
    }

    /// Appends a completed turn without going through the pending state.
    ///
    /// If a turn is pending it stays last, and the new turn goes before it.
    pub fn append_turn(
        &mut self,
        user_text: impl Into<String>,
        assistant_text: impl Into<String>,
        keep: usize,
    ) {
        let turn = Turn::completed(user_text, assistant_text);
        if self.is_pending() {
            let at = self.turns.len() - 1;
            self.turns.insert(at, turn);
        } else {
            self.turns.push(turn);
        }
        self.trim(keep);
    }

    /// Drops the oldest turns beyond `keep` (`keep + 1` while pending).
    pub fn trim(&mut self, keep: usize) {
        let limit = if self.is_pending() { keep + 1 } else { keep };
        if self.turns.len() > limit {
            let excess = self.turns.len() - limit;
            self.turns.drain(..excess);
        }
    }
}

/// Token-free view of a log, as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LogSnapshot {
    pub status: StatusLabel,
    pub turns: Vec<Turn>,
}

impl LogSnapshot {
    pub fn is_pending(&self) -> bool {
        self.status == StatusLabel::Pending
    }

    /// User text of the turn currently awaiting a reply, if any.
    pub fn pending_user_text(&self) -> Option<&str> {
        if !self.is_pending() {
            return None;
        }
        self.turns.last().map(|turn| turn.user_text.as_str())
    }
}

impl From<&ConversationLog> for LogSnapshot {
    fn from(log: &ConversationLog) -> Self {
        Self {
            status: log.status.label(),
            turns: log.turns.clone(),
        }
    }
}
