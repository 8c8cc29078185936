//! Conversation turn log.

pub mod document;
pub mod model;
pub mod repository;

pub use document::{LogDocument, normalize_value};
pub use model::{
    ConversationLog, DEFAULT_KEEP, FencingToken, LogSnapshot, LogStatus, ResolveFailure,
    StatusLabel, Turn,
};
pub use repository::{CancelledTurn, PendingTurn, TurnLog};
