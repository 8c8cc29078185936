//! In-memory collaborators for use case tests.

use crate::{CancelHandler, ChatOrchestrator, ConversationService};
use async_trait::async_trait;
use confidant_core::completion::{Completion, CompletionRequest, CompletionService};
use confidant_core::config::{ChatConfig, ChatConfigPatch, ConfigRepository};
use confidant_core::conversation::{
    CancelledTurn, ConversationLog, FencingToken, PendingTurn, ResolveFailure, StatusLabel, Turn,
    TurnLog,
};
use confidant_core::persona::{PersonaRepository, PersonaSummary, PromptRepository};
use confidant_core::{ConfidantError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn completion(text: &str) -> Completion {
    Completion {
        text: text.to_string(),
        usage: None,
        model: Some("mock-model".to_string()),
    }
}

#[derive(Default)]
pub struct InMemoryTurnLog {
    logs: Mutex<HashMap<String, ConversationLog>>,
    fail_rollbacks: AtomicBool,
}

impl InMemoryTurnLog {
    pub fn seed(&self, id: &str, pairs: &[(&str, &str)]) {
        let turns = pairs
            .iter()
            .map(|(user, assistant)| Turn::completed(*user, *assistant))
            .collect();
        let log = ConversationLog::from_parts(turns, Some(StatusLabel::Done), None);
        self.logs.lock().unwrap().insert(id.to_string(), log);
    }

    pub fn clear(&self, id: &str) {
        self.logs
            .lock()
            .unwrap()
            .insert(id.to_string(), ConversationLog::empty());
    }

    pub fn fail_rollbacks(&self) {
        self.fail_rollbacks.store(true, Ordering::SeqCst);
    }

    fn with_log<R>(&self, id: &str, f: impl FnOnce(&mut ConversationLog) -> R) -> Result<R> {
        let mut logs = self.logs.lock().unwrap();
        let log = logs
            .get_mut(id)
            .ok_or_else(|| ConfidantError::not_found("conversation", id))?;
        Ok(f(log))
    }
}

#[async_trait]
impl TurnLog for InMemoryTurnLog {
    async fn read(&self, id: &str) -> Result<ConversationLog> {
        self.with_log(id, |log| log.clone())
    }

    async fn write(&self, id: &str, log: ConversationLog) -> Result<ConversationLog> {
        self.with_log(id, |stored| {
            *stored = log;
            stored.clone()
        })
    }

    async fn append_pending(&self, id: &str, user_text: &str, keep: usize) -> Result<PendingTurn> {
        let (turn, fencing_token) = self.with_log(id, |log| log.append_pending(user_text, keep))?;
        Ok(PendingTurn {
            turn,
            fencing_token,
        })
    }

    async fn resolve_pending(
        &self,
        id: &str,
        assistant_text: &str,
        keep: usize,
        expected_token: Option<&FencingToken>,
    ) -> Result<std::result::Result<Turn, ResolveFailure>> {
        self.with_log(id, |log| {
            log.resolve_pending(assistant_text, keep, expected_token)
        })
    }

    async fn rollback_pending(&self, id: &str, keep: usize) -> Result<ConversationLog> {
        if self.fail_rollbacks.load(Ordering::SeqCst) {
            return Err(ConfidantError::io("disk full"));
        }
        self.with_log(id, |log| {
            log.rollback_pending(keep);
            log.clone()
        })
    }

    async fn cancel_pending(&self, id: &str, keep: usize) -> Result<CancelledTurn> {
        self.with_log(id, |log| CancelledTurn {
            removed: log.rollback_pending(keep),
            log: log.clone(),
        })
    }

    async fn append_turn(
        &self,
        id: &str,
        user_text: &str,
        assistant_text: &str,
        keep: usize,
    ) -> Result<ConversationLog> {
        self.with_log(id, |log| {
            log.append_turn(user_text, assistant_text, keep);
            log.clone()
        })
    }

    async fn trim(&self, id: &str, keep: usize) -> Result<ConversationLog> {
        self.with_log(id, |log| {
            log.trim(keep);
            log.clone()
        })
    }
}

#[derive(Default)]
pub struct InMemoryPersonas {
    personas: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl PersonaRepository for InMemoryPersonas {
    async fn list(&self) -> Result<Vec<PersonaSummary>> {
        let mut ids: Vec<String> = self.personas.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .map(|id| PersonaSummary {
                name: id.clone(),
                id,
            })
            .collect())
    }

    async fn create(&self, id: &str, display_name: &str) -> Result<PersonaSummary> {
        self.personas
            .lock()
            .unwrap()
            .insert(id.to_string(), String::new());
        Ok(PersonaSummary {
            id: id.to_string(),
            name: display_name.to_string(),
        })
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.personas.lock().unwrap().remove(id);
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.personas.lock().unwrap().contains_key(id))
    }

    async fn get_content(&self, id: &str) -> Result<String> {
        self.personas
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ConfidantError::not_found("persona", id))
    }

    async fn set_content(&self, id: &str, content: &str) -> Result<()> {
        self.personas
            .lock()
            .unwrap()
            .insert(id.to_string(), content.to_string());
        Ok(())
    }

    async fn set_order(&self, order: &[String]) -> Result<Vec<String>> {
        Ok(order.to_vec())
    }

    async fn ensure_default(&self) -> Result<()> {
        Ok(())
    }
}

pub struct StaticPrompt;

#[async_trait]
impl PromptRepository for StaticPrompt {
    async fn get(&self) -> Result<String> {
        Ok("Stay in character.".to_string())
    }

    async fn set(&self, _content: &str) -> Result<()> {
        Ok(())
    }
}

pub struct InMemoryConfig(Mutex<ChatConfig>);

#[async_trait]
impl ConfigRepository for InMemoryConfig {
    async fn get(&self) -> Result<ChatConfig> {
        Ok(self.0.lock().unwrap().clone())
    }

    async fn update(&self, patch: ChatConfigPatch) -> Result<ChatConfig> {
        let mut config = self.0.lock().unwrap();
        *config = config.clone().merged(patch);
        Ok(config.clone())
    }
}

/// Lets a test hold a completion call open.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<Completion>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl ScriptedCompletion {
    pub fn push(&self, reply: Result<Completion>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn gate(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> CompletionRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.requests.lock().unwrap().push(request);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ConfidantError::completion(None, "no scripted reply")))
    }
}

/// A conversation `alice` with an empty log, wired to in-memory collaborators.
pub struct Fixture {
    pub turn_log: Arc<InMemoryTurnLog>,
    pub personas: Arc<InMemoryPersonas>,
    pub config: Arc<InMemoryConfig>,
    pub completion: Arc<ScriptedCompletion>,
}

impl Fixture {
    pub fn new(memory_turns: u32) -> Self {
        let fx = Self {
            turn_log: Arc::new(InMemoryTurnLog::default()),
            personas: Arc::new(InMemoryPersonas::default()),
            config: Arc::new(InMemoryConfig(Mutex::new(ChatConfig {
                memory_turns,
                ..ChatConfig::default()
            }))),
            completion: Arc::new(ScriptedCompletion::default()),
        };
        fx.add_persona("alice", "You are Alice.");
        fx
    }

    pub fn add_persona(&self, id: &str, content: &str) {
        self.personas
            .personas
            .lock()
            .unwrap()
            .insert(id.to_string(), content.to_string());
        self.turn_log.clear(id);
    }

    pub fn orchestrator(&self) -> ChatOrchestrator {
        ChatOrchestrator::new(
            self.turn_log.clone(),
            self.personas.clone(),
            Arc::new(StaticPrompt),
            self.config.clone(),
            self.completion.clone(),
        )
    }

    pub fn cancel_handler(&self) -> CancelHandler {
        CancelHandler::new(
            self.turn_log.clone(),
            self.personas.clone(),
            self.config.clone(),
        )
    }

    pub fn conversation_service(&self) -> ConversationService {
        ConversationService::new(
            self.turn_log.clone(),
            self.personas.clone(),
            self.config.clone(),
        )
    }
}
