//! Scripted [`ChatApi`] and recording [`ChatView`] for pipeline tests.

use crate::api::{CancelReply, ChatApi, ChatReply};
use crate::view::{ChatView, ClientStatus};
use async_trait::async_trait;
use chrono::DateTime;
use confidant_core::config::ChatConfig;
use confidant_core::conversation::{LogSnapshot, StatusLabel, Turn};
use confidant_core::{ConfidantError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

fn turn(user: &str, assistant: &str) -> Turn {
    Turn {
        timestamp: DateTime::UNIX_EPOCH,
        user_text: user.to_string(),
        assistant_text: assistant.to_string(),
    }
}

pub fn done_log(pairs: &[(&str, &str)]) -> LogSnapshot {
    LogSnapshot {
        status: StatusLabel::Done,
        turns: pairs.iter().map(|(u, a)| turn(u, a)).collect(),
    }
}

pub fn pending_log(pairs: &[(&str, &str)], user: &str) -> LogSnapshot {
    let mut log = done_log(pairs);
    log.status = StatusLabel::Pending;
    log.turns.push(turn(user, ""));
    log
}

pub fn reply(text: &str) -> ChatReply {
    ChatReply {
        assistant_message: text.to_string(),
        discarded: false,
        usage: None,
        model: None,
    }
}

#[derive(Default)]
pub struct MockChatApi {
    sent: Mutex<Vec<(String, String)>>,
    replies: Mutex<VecDeque<Result<ChatReply>>>,
    cancels: Mutex<VecDeque<Result<CancelReply>>>,
    cancel_calls: Mutex<usize>,
    logs: Mutex<HashMap<String, LogSnapshot>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockChatApi {
    pub fn push_reply(&self, reply: Result<ChatReply>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_cancel(&self, reply: Result<CancelReply>) {
        self.cancels.lock().unwrap().push_back(reply);
    }

    pub fn set_log(&self, conversation_id: &str, log: LogSnapshot) {
        self.logs
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), log);
    }

    /// Makes every send wait for a notification on the returned gate.
    pub fn hold_sends(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn cancel_calls(&self) -> usize {
        *self.cancel_calls.lock().unwrap()
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn send_chat(&self, conversation_id: &str, user_message: &str) -> Result<ChatReply> {
        self.sent
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), user_message.to_string()));
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ConfidantError::internal("no scripted reply")))
    }

    async fn cancel_chat(&self, _conversation_id: &str) -> Result<CancelReply> {
        *self.cancel_calls.lock().unwrap() += 1;
        self.cancels
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ConfidantError::internal("no scripted cancel")))
    }

    async fn fetch_log(&self, conversation_id: &str) -> Result<LogSnapshot> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_config(&self) -> Result<ChatConfig> {
        Ok(ChatConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Log(String, LogSnapshot),
    Batch(String, Vec<String>),
    Typing(String, bool),
    Segment(String, String),
    Status(String, ClientStatus),
}

#[derive(Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
    inputs: Mutex<HashMap<String, String>>,
}

impl RecordingView {
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses(&self, conversation_id: &str) -> Vec<ClientStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ViewEvent::Status(id, status) if id == conversation_id => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn segments(&self, conversation_id: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ViewEvent::Segment(id, segment) if id == conversation_id => Some(segment),
                _ => None,
            })
            .collect()
    }

    pub fn last_log(&self, conversation_id: &str) -> Option<LogSnapshot> {
        self.events().into_iter().rev().find_map(|event| match event {
            ViewEvent::Log(id, log) if id == conversation_id => Some(log),
            _ => None,
        })
    }

    pub fn last_batch(&self, conversation_id: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .rev()
            .find_map(|event| match event {
                ViewEvent::Batch(id, batch) if id == conversation_id => Some(batch),
                _ => None,
            })
            .unwrap_or_default()
    }

    fn record(&self, event: ViewEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl ChatView for RecordingView {
    fn render_log(&self, conversation_id: &str, log: &LogSnapshot) {
        self.record(ViewEvent::Log(conversation_id.to_string(), log.clone()));
    }

    fn show_batch(&self, conversation_id: &str, messages: &[String]) {
        self.record(ViewEvent::Batch(conversation_id.to_string(), messages.to_vec()));
    }

    fn show_typing(&self, conversation_id: &str, visible: bool) {
        self.record(ViewEvent::Typing(conversation_id.to_string(), visible));
    }

    fn reveal_segment(&self, conversation_id: &str, segment: &str) {
        self.record(ViewEvent::Segment(
            conversation_id.to_string(),
            segment.to_string(),
        ));
    }

    fn set_status(&self, conversation_id: &str, status: &ClientStatus) {
        self.record(ViewEvent::Status(conversation_id.to_string(), status.clone()));
    }

    fn input(&self, conversation_id: &str) -> String {
        self.inputs
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    fn set_input(&self, conversation_id: &str, text: &str) {
        self.inputs
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), text.to_string());
    }
}
