//! Rendering seam between the pipeline and a concrete front end.

use confidant_core::conversation::LogSnapshot;
use std::fmt;

/// Status line for one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientStatus {
    Ready,
    /// Seconds until the batch is sent; more input extends the batch.
    Countdown(u64),
    Generating,
    /// Input was rejected because a reply is still being generated.
    Busy,
    Undone,
    Cancelled,
    /// Cancel arrived after the reply was stored.
    AlreadyResolved,
    SendFailed(String),
    CancelFailed(String),
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::Countdown(seconds) => {
                write!(f, "sending in {seconds}s, keep typing to add to this message")
            }
            Self::Generating => write!(f, "typing..."),
            Self::Busy => write!(f, "still replying, cannot send yet"),
            Self::Undone => write!(f, "message withdrawn"),
            Self::Cancelled => write!(f, "stopped waiting for the reply"),
            Self::AlreadyResolved => write!(f, "the reply already arrived, nothing to cancel"),
            Self::SendFailed(message) => write!(f, "send failed: {message}"),
            Self::CancelFailed(message) => write!(f, "cancel failed: {message}"),
        }
    }
}

/// What the pipeline needs from a front end.
///
/// Calls arrive from background tasks; implementations must not block.
pub trait ChatView: Send + Sync {
    /// Replaces the transcript with the authoritative log.
    fn render_log(&self, conversation_id: &str, log: &LogSnapshot);

    /// Shows the optimistic echo of the unsent batch. Empty clears it.
    fn show_batch(&self, conversation_id: &str, messages: &[String]);

    /// Shows or hides the reply placeholder.
    fn show_typing(&self, conversation_id: &str, visible: bool);

    /// Appends one segment of the reply being revealed.
    fn reveal_segment(&self, conversation_id: &str, segment: &str);

    fn set_status(&self, conversation_id: &str, status: &ClientStatus);

    /// Current content of the input field.
    fn input(&self, conversation_id: &str) -> String;

    fn set_input(&self, conversation_id: &str, text: &str);
}
