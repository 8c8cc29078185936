//! Persisted form of a conversation log.
//!
//! Reading is lenient: any JSON value is accepted and normalized into a valid
//! [`ConversationLog`]. Writing always produces the canonical
//! [`LogDocument`] shape.

use super::model::{ConversationLog, FencingToken, StatusLabel, Turn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical on-disk shape of `memory.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDocument {
    pub status: StatusLabel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<String>,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl From<&ConversationLog> for LogDocument {
    fn from(log: &ConversationLog) -> Self {
        Self {
            status: log.status().label(),
            pending_id: log
                .status()
                .fencing_token()
                .map(|token| token.as_str().to_string()),
            turns: log.turns().to_vec(),
        }
    }
}

/// Normalizes an arbitrary JSON value into a valid log.
///
/// - non-object turns are dropped, missing or mistyped fields become empty
///   strings, unparseable timestamps become "now"
/// - an explicit `"pending"`/`"done"` status wins; otherwise legacy per-turn
///   markers (`status: "pending"`, `pending: true`) or a blank last reply mark
///   the log pending
/// - a stored `pendingId` is kept for a pending log
pub fn normalize_value(value: &Value) -> ConversationLog {
    let raw_turns = value
        .get("turns")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let turns: Vec<Turn> = raw_turns
        .iter()
        .filter(|turn| turn.is_object())
        .map(normalize_turn)
        .collect();
    if turns.len() != raw_turns.len() {
        tracing::debug!(
            dropped = raw_turns.len() - turns.len(),
            "normalize_value: dropped non-object turns"
        );
    }

    let hint = match value.get("status").and_then(Value::as_str) {
        Some("pending") => Some(StatusLabel::Pending),
        Some("done") => Some(StatusLabel::Done),
        _ if raw_turns.iter().any(has_legacy_pending_marker) => Some(StatusLabel::Pending),
        _ => None,
    };

    let token = value
        .get("pendingId")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(|id| FencingToken::from(id.to_string()));

    ConversationLog::from_parts(turns, hint, token)
}

fn normalize_turn(turn: &Value) -> Turn {
    let text = |key: &str| {
        turn.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let timestamp = turn
        .get("ts")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Turn {
        timestamp,
        user_text: text("user"),
        assistant_text: text("assistant"),
    }
}

fn has_legacy_pending_marker(turn: &Value) -> bool {
    turn.get("status").and_then(Value::as_str) == Some("pending")
        || turn.get("pending").and_then(Value::as_bool) == Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_garbage_becomes_empty_done_log() {
        for value in [json!(null), json!(42), json!("text"), json!({"turns": "nope"})] {
            let log = normalize_value(&value);
            assert!(!log.is_pending());
            assert!(log.turns().is_empty());
        }
    }

    #[test]
    fn test_mistyped_fields_are_clamped() {
        let value = json!({
            "turns": [
                {"ts": "not a date", "user": 7, "assistant": "hello"},
                "stray string",
                {"user": "second", "assistant": "reply"}
            ]
        });
        let log = normalize_value(&value);

        assert_eq!(log.turns().len(), 2);
        assert_eq!(log.turns()[0].user_text, "");
        assert_eq!(log.turns()[0].assistant_text, "hello");
        assert!(!log.is_pending());
    }

    #[test]
    fn test_blank_last_reply_infers_pending() {
        let value = json!({"turns": [{"user": "q", "assistant": "  "}]});
        let log = normalize_value(&value);
        assert!(log.is_pending());
        assert!(log.status().fencing_token().is_some());
    }

    #[test]
    fn test_explicit_done_wins() {
        let value = json!({"status": "done", "turns": [{"user": "q", "assistant": ""}]});
        assert!(!normalize_value(&value).is_pending());
    }

    #[test]
    fn test_legacy_turn_marker() {
        let value = json!({"turns": [{"user": "q", "assistant": "", "pending": true}]});
        assert!(normalize_value(&value).is_pending());
    }

    #[test]
    fn test_round_trip_preserves_token() {
        let mut log = ConversationLog::empty();
        let (_, token) = log.append_pending("q", 3);

        let value = serde_json::to_value(LogDocument::from(&log)).unwrap();
        assert_eq!(value["pendingId"], token.as_str());

        let restored = normalize_value(&value);
        assert_eq!(restored, log);
    }

    #[test]
    fn test_done_document_has_no_pending_id() {
        let mut log = ConversationLog::empty();
        log.append_turn("q", "a", 3);
        let value = serde_json::to_value(LogDocument::from(&log)).unwrap();
        assert_eq!(value["status"], "done");
        assert!(value.get("pendingId").is_none());
    }
}
