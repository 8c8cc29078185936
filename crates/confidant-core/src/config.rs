//! Chat configuration.
//!
//! Persisted settings shared by the server (history length, sampling
//! parameters) and the client (batch window, reveal pacing).

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat configuration.
///
/// Values outside their allowed range are replaced by the default on
/// [`ChatConfig::normalized`], never rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatConfig {
    /// Number of completed turns kept in the log and shown to the model.
    pub memory_turns: u32,
    pub temperature: f64,
    pub top_p: f64,
    /// Batch window on the client.
    pub send_delay_ms: u64,
    pub max_tokens: u32,
    /// Pause between revealed reply segments on the client.
    pub assistant_segment_delay_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            memory_turns: 20,
            temperature: 0.7,
            top_p: 0.7,
            send_delay_ms: 3000,
            max_tokens: 2048,
            assistant_segment_delay_ms: 800,
        }
    }
}

impl ChatConfig {
    /// Replaces every out-of-range field with its default.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            memory_turns: in_range(self.memory_turns, 1..=200, defaults.memory_turns),
            temperature: in_range_f64(self.temperature, 0.0, 2.0, defaults.temperature),
            top_p: in_range_f64(self.top_p, 0.0, 1.0, defaults.top_p),
            send_delay_ms: in_range(self.send_delay_ms, 0..=60_000, defaults.send_delay_ms),
            max_tokens: in_range(self.max_tokens, 1..=200_000, defaults.max_tokens),
            assistant_segment_delay_ms: in_range(
                self.assistant_segment_delay_ms,
                0..=10_000,
                defaults.assistant_segment_delay_ms,
            ),
        }
    }

    /// Applies the fields present in `patch` on top of `self`, then normalizes.
    pub fn merged(self, patch: ChatConfigPatch) -> Self {
        Self {
            memory_turns: patch.memory_turns.unwrap_or(self.memory_turns),
            temperature: patch.temperature.unwrap_or(self.temperature),
            top_p: patch.top_p.unwrap_or(self.top_p),
            send_delay_ms: patch.send_delay_ms.unwrap_or(self.send_delay_ms),
            max_tokens: patch.max_tokens.unwrap_or(self.max_tokens),
            assistant_segment_delay_ms: patch
                .assistant_segment_delay_ms
                .unwrap_or(self.assistant_segment_delay_ms),
        }
        .normalized()
    }

    /// History length as a `keep` argument for log operations.
    pub fn keep(&self) -> usize {
        self.memory_turns as usize
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn segment_delay(&self) -> Duration {
        Duration::from_millis(self.assistant_segment_delay_ms)
    }
}

/// Partial update of [`ChatConfig`]; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfigPatch {
    pub memory_turns: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub send_delay_ms: Option<u64>,
    pub max_tokens: Option<u32>,
    pub assistant_segment_delay_ms: Option<u64>,
}

fn in_range<T: PartialOrd + Copy>(value: T, range: std::ops::RangeInclusive<T>, fallback: T) -> T {
    if range.contains(&value) { value } else { fallback }
}

fn in_range_f64(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() && (min..=max).contains(&value) {
        value
    } else {
        fallback
    }
}

/// Storage of the chat configuration.
#[async_trait::async_trait]
pub trait ConfigRepository: Send + Sync {
    /// Loads the configuration, repairing and rewriting invalid content.
    async fn get(&self) -> Result<ChatConfig>;

    /// Applies a patch and persists the normalized result.
    async fn update(&self, patch: ChatConfigPatch) -> Result<ChatConfig>;
}
