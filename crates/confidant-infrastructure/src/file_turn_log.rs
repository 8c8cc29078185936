//! File-backed turn log.
//!
//! Each conversation is stored as `personas/<id>/memory.json`. Every
//! operation runs as one locked read-modify-write on the blocking pool, so a
//! reader never sees a torn file and two writers never interleave.

use crate::paths::ConfidantPaths;
use crate::storage::{AtomicFile, run_blocking};
use async_trait::async_trait;
use confidant_core::conversation::{
    CancelledTurn, ConversationLog, FencingToken, LogDocument, PendingTurn, ResolveFailure, Turn,
    TurnLog, normalize_value,
};
use confidant_core::persona::is_valid_persona_id;
use confidant_core::{ConfidantError, Result};
use serde_json::Value;

/// [`TurnLog`] over the persona directories of a data directory.
#[derive(Debug, Clone)]
pub struct FileTurnLog {
    paths: ConfidantPaths,
}

impl FileTurnLog {
    pub fn new(paths: ConfidantPaths) -> Self {
        Self { paths }
    }

    fn memory_file(&self, conversation_id: &str) -> Result<AtomicFile<LogDocument>> {
        if !is_valid_persona_id(conversation_id) {
            return Err(ConfidantError::validation(format!(
                "invalid conversation id '{}'",
                conversation_id
            )));
        }
        if !self.paths.persona_dir(conversation_id).is_dir() {
            return Err(ConfidantError::not_found("conversation", conversation_id));
        }
        Ok(AtomicFile::json(self.paths.memory_file(conversation_id)))
    }

    /// Applies `f` to the stored log under the file lock.
    ///
    /// The log is written back when `f` changed it or when the stored content
    /// was not in canonical form.
    async fn transact<R, F>(&self, conversation_id: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut ConversationLog) -> R + Send + 'static,
        R: Send + 'static,
    {
        let file = self.memory_file(conversation_id)?;
        let id = conversation_id.to_string();

        run_blocking(move || {
            let _lock = file.lock()?;
            let (mut log, needs_repair) = load_normalized(&file, &id)?;
            let before = log.clone();

            let out = f(&mut log);

            if needs_repair || log != before {
                file.save(&LogDocument::from(&log))?;
            }
            Ok(out)
        })
        .await
    }
}

/// Reads and normalizes the stored log. The flag reports whether the file
/// must be rewritten to match the normalized form.
fn load_normalized(
    file: &AtomicFile<LogDocument>,
    conversation_id: &str,
) -> Result<(ConversationLog, bool)> {
    let Some(raw) = file.load_raw()? else {
        return Ok((ConversationLog::empty(), true));
    };

    let value = match serde_json::from_str::<Value>(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                conversation_id,
                error = %e,
                "memory.json is not valid JSON, resetting to an empty log"
            );
            Value::Null
        }
    };

    let log = normalize_value(&value);
    let canonical = serde_json::to_value(LogDocument::from(&log))?;
    let needs_repair = canonical != value;
    if needs_repair {
        tracing::debug!(conversation_id, "repairing non-canonical memory.json");
    }
    Ok((log, needs_repair))
}

#[async_trait]
impl TurnLog for FileTurnLog {
    async fn read(&self, conversation_id: &str) -> Result<ConversationLog> {
        self.transact(conversation_id, |log| log.clone()).await
    }

    async fn write(&self, conversation_id: &str, log: ConversationLog) -> Result<ConversationLog> {
        self.transact(conversation_id, move |stored| {
            *stored = log;
            stored.clone()
        })
        .await
    }

    async fn append_pending(
        &self,
        conversation_id: &str,
        user_text: &str,
        keep: usize,
    ) -> Result<PendingTurn> {
        let user_text = user_text.to_string();
        let (turn, fencing_token) = self
            .transact(conversation_id, move |log| log.append_pending(user_text, keep))
            .await?;
        tracing::debug!(conversation_id, "appended pending turn");
        Ok(PendingTurn {
            turn,
            fencing_token,
        })
    }

    async fn resolve_pending(
        &self,
        conversation_id: &str,
        assistant_text: &str,
        keep: usize,
        expected_token: Option<&FencingToken>,
    ) -> Result<std::result::Result<Turn, ResolveFailure>> {
        let assistant_text = assistant_text.to_string();
        let expected_token = expected_token.cloned();
        self.transact(conversation_id, move |log| {
            log.resolve_pending(assistant_text, keep, expected_token.as_ref())
        })
        .await
    }

    async fn rollback_pending(&self, conversation_id: &str, keep: usize) -> Result<ConversationLog> {
        self.transact(conversation_id, move |log| {
            log.rollback_pending(keep);
            log.clone()
        })
        .await
    }

    async fn cancel_pending(&self, conversation_id: &str, keep: usize) -> Result<CancelledTurn> {
        self.transact(conversation_id, move |log| {
            let removed = log.rollback_pending(keep);
            CancelledTurn {
                removed,
                log: log.clone(),
            }
        })
        .await
    }

    async fn append_turn(
        &self,
        conversation_id: &str,
        user_text: &str,
        assistant_text: &str,
        keep: usize,
    ) -> Result<ConversationLog> {
        let user_text = user_text.to_string();
        let assistant_text = assistant_text.to_string();
        self.transact(conversation_id, move |log| {
            log.append_turn(user_text, assistant_text, keep);
            log.clone()
        })
        .await
    }

    async fn trim(&self, conversation_id: &str, keep: usize) -> Result<ConversationLog> {
        self.transact(conversation_id, move |log| {
            log.trim(keep);
            log.clone()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confidant_core::conversation::StatusLabel;
    use std::fs;
    use tempfile::TempDir;

    fn setup(ids: &[&str]) -> (TempDir, FileTurnLog, ConfidantPaths) {
        let temp_dir = TempDir::new().unwrap();
        let paths = ConfidantPaths::new(temp_dir.path());
        for id in ids {
            fs::create_dir_all(paths.persona_dir(id)).unwrap();
        }
        let log = FileTurnLog::new(paths.clone());
        (temp_dir, log, paths)
    }

    fn stored(paths: &ConfidantPaths, id: &str) -> Value {
        serde_json::from_str(&fs::read_to_string(paths.memory_file(id)).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_ids() {
        let (_tmp, log, _) = setup(&[]);
        assert!(log.read("ghost").await.unwrap_err().is_not_found());
        assert!(log.read("../etc").await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_empty_and_is_created() {
        let (_tmp, log, paths) = setup(&["alice"]);
        let read = log.read("alice").await.unwrap();
        assert!(read.turns().is_empty());
        assert_eq!(stored(&paths, "alice")["status"], "done");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_repaired() {
        let (_tmp, log, paths) = setup(&["alice"]);
        fs::write(paths.memory_file("alice"), "{{{ definitely not json").unwrap();

        let read = log.read("alice").await.unwrap();
        assert!(!read.is_pending());
        assert!(read.turns().is_empty());
        assert_eq!(
            stored(&paths, "alice"),
            serde_json::json!({"status": "done", "turns": []})
        );
    }

    #[tokio::test]
    async fn test_pending_token_persists_across_reads() {
        let (_tmp, log, paths) = setup(&["alice"]);
        let pending = log.append_pending("alice", "hi", 5).await.unwrap();

        let on_disk = stored(&paths, "alice");
        assert_eq!(on_disk["status"], "pending");
        assert_eq!(on_disk["pendingId"], pending.fencing_token.as_str());

        let read = log.read("alice").await.unwrap();
        assert_eq!(read.status().fencing_token(), Some(&pending.fencing_token));
    }

    #[tokio::test]
    async fn test_legacy_pending_file_gets_a_stable_token() {
        let (_tmp, log, paths) = setup(&["alice"]);
        fs::write(
            paths.memory_file("alice"),
            r#"{"turns":[{"ts":"2024-01-01T00:00:00Z","user":"q","assistant":""}]}"#,
        )
        .unwrap();

        let first = log.read("alice").await.unwrap();
        let second = log.read("alice").await.unwrap();
        assert!(first.is_pending());
        assert_eq!(first.status().fencing_token(), second.status().fencing_token());
    }

    #[tokio::test]
    async fn test_resolve_lifecycle_and_stale_token() {
        let (_tmp, log, paths) = setup(&["alice"]);
        let first = log.append_pending("alice", "one", 2).await.unwrap();
        let cancelled = log.cancel_pending("alice", 2).await.unwrap();
        assert_eq!(cancelled.removed.unwrap().user_text, "one");

        let second = log.append_pending("alice", "two", 2).await.unwrap();
        let before = stored(&paths, "alice");
        let stale = log
            .resolve_pending("alice", "late", 2, Some(&first.fencing_token))
            .await
            .unwrap();
        assert_eq!(stale, Err(ResolveFailure::FencingMismatch));
        assert_eq!(stored(&paths, "alice"), before);

        let turn = log
            .resolve_pending("alice", "reply", 2, Some(&second.fencing_token))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(turn.assistant_text, "reply");
        let on_disk = stored(&paths, "alice");
        assert_eq!(on_disk["status"], "done");
        assert!(on_disk.get("pendingId").is_none());
    }

    #[tokio::test]
    async fn test_cancel_when_nothing_pending() {
        let (_tmp, log, _) = setup(&["alice"]);
        log.append_turn("alice", "u", "a", 5).await.unwrap();
        let cancelled = log.cancel_pending("alice", 5).await.unwrap();
        assert!(cancelled.removed.is_none());
        assert_eq!(cancelled.log.turns().len(), 1);
    }

    #[tokio::test]
    async fn test_trim_and_write() {
        let (_tmp, log, _) = setup(&["alice"]);
        for i in 0..4 {
            log.append_turn("alice", &format!("u{i}"), "a", 10).await.unwrap();
        }
        let trimmed = log.trim("alice", 2).await.unwrap();
        assert_eq!(trimmed.turns().len(), 2);
        assert_eq!(trimmed.turns()[0].user_text, "u2");

        let replacement =
            ConversationLog::from_parts(vec![Turn::completed("x", "y")], Some(StatusLabel::Done), None);
        let written = log.write("alice", replacement.clone()).await.unwrap();
        assert_eq!(written, replacement);
        assert_eq!(log.read("alice").await.unwrap(), replacement);
    }
}
