//! The not-yet-sent batch of user messages and its durable form.

use crate::storage::ClientStorage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Joins the messages of one batch, and splits replies into segments.
pub const BATCH_SEPARATOR: &str = "$";

pub const STORAGE_KEY_PREFIX: &str = "confidant:pendingQueue:";

pub fn storage_key(conversation_id: &str) -> String {
    format!("{STORAGE_KEY_PREFIX}{conversation_id}")
}

/// Non-empty pieces of `text` between separators.
pub fn split_segments(text: &str) -> Vec<&str> {
    text.split(BATCH_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Messages typed within one batch window, persisted so they survive a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBatch {
    pub messages: Vec<String>,
    #[serde(rename = "ts")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "sendAt", with = "chrono::serde::ts_milliseconds")]
    pub send_at: DateTime<Utc>,
}

impl PendingBatch {
    pub fn combined_text(&self) -> String {
        self.messages.join(BATCH_SEPARATOR)
    }

    /// Time left until `send_at`; zero once it has passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.send_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Reads the stored batch. Unreadable or empty entries are removed.
    pub fn load(storage: &dyn ClientStorage, conversation_id: &str) -> Option<Self> {
        let key = storage_key(conversation_id);
        let raw = storage.get(&key)?;
        match serde_json::from_str::<PendingBatch>(&raw) {
            Ok(mut batch) => {
                batch.messages.retain(|message| !message.is_empty());
                if batch.messages.is_empty() {
                    storage.remove(&key);
                    return None;
                }
                Some(batch)
            }
            Err(err) => {
                tracing::warn!(conversation_id, error = %err, "dropping unreadable pending batch");
                storage.remove(&key);
                None
            }
        }
    }

    pub fn save(&self, storage: &dyn ClientStorage, conversation_id: &str) {
        match serde_json::to_string(self) {
            Ok(raw) => storage.set(&storage_key(conversation_id), &raw),
            Err(err) => tracing::warn!(conversation_id, error = %err, "failed to encode pending batch"),
        }
    }

    pub fn clear(storage: &dyn ClientStorage, conversation_id: &str) {
        storage.remove(&storage_key(conversation_id));
    }
}
