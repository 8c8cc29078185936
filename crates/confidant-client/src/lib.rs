//! Client side of Confidant conversations.
//!
//! Messages typed in quick succession are batched and sent as one `$`-joined
//! request after a short window. While the server generates a reply the
//! conversation is busy; a reply that was cancelled is never shown, and a
//! turn left pending by an earlier process is followed by polling until the
//! server settles it.
//!
//! [`SendPipeline`] owns the flow; [`ChatApi`] is the server seam and
//! [`ChatView`] the rendering seam.

pub mod api;
pub mod batch;
pub mod pipeline;
pub mod poller;
pub mod registry;
pub mod storage;
pub mod view;

#[cfg(test)]
mod test_support;

pub use api::{CancelReply, ChatApi, ChatReply, HttpChatApi};
pub use batch::{BATCH_SEPARATOR, PendingBatch, split_segments};
pub use pipeline::{CancelResult, ClientSettings, FlushOutcome, SendPipeline, SubmitOutcome};
pub use poller::{DEFAULT_POLL_INTERVAL, PollStatus, ReconciliationPoller};
pub use registry::{ClientRegistry, ConversationClientState};
pub use storage::{ClientStorage, FileStorage, MemoryStorage};
pub use view::{ChatView, ClientStatus};
