use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use colored::Colorize;
use confidant_client::{ChatView, ClientStatus};
use confidant_core::conversation::LogSnapshot;

/// Prints pipeline events to stdout.
///
/// The input field is a per-conversation draft that pre-fills the next prompt.
#[derive(Default)]
pub struct TerminalView {
    logs: Mutex<HashMap<String, LogSnapshot>>,
    drafts: Mutex<HashMap<String, String>>,
    /// Conversations whose latest reply was already printed segment by segment.
    revealed: Mutex<HashSet<String>>,
    last_status: Mutex<HashMap<String, ClientStatus>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TerminalView {
    pub fn take_draft(&self, conversation_id: &str) -> String {
        lock(&self.drafts)
            .remove(conversation_id)
            .unwrap_or_default()
    }

    /// Puts rejected input back without announcing it.
    pub fn set_input_silently(&self, conversation_id: &str, text: &str) {
        lock(&self.drafts).insert(conversation_id.to_string(), text.to_string());
    }

    pub fn print_transcript(&self, conversation_id: &str) {
        let logs = lock(&self.logs);
        let Some(log) = logs.get(conversation_id) else {
            println!("{}", "(no log loaded)".bright_black());
            return;
        };
        if log.turns.is_empty() {
            println!("{}", "(no messages yet)".bright_black());
        }
        for turn in &log.turns {
            println!("{}", format!("> {}", turn.user_text).green());
            if turn.is_awaiting_reply() {
                println!("{}", "  ...".bright_black());
            } else {
                print_reply(conversation_id, &turn.assistant_text);
            }
        }
    }
}

fn print_reply(conversation_id: &str, text: &str) {
    for segment in confidant_client::split_segments(text) {
        println!("{}", format!("[{conversation_id}]").bright_magenta());
        for line in segment.lines() {
            println!("{}", line.bright_blue());
        }
    }
}

impl ChatView for TerminalView {
    fn render_log(&self, conversation_id: &str, log: &LogSnapshot) {
        let previous = lock(&self.logs).insert(conversation_id.to_string(), log.clone());
        let already_shown = lock(&self.revealed).remove(conversation_id);

        // A reply that settled while we were only polling has not been shown yet.
        let settled = previous.as_ref().is_some_and(LogSnapshot::is_pending) && !log.is_pending();
        if settled && !already_shown {
            if let Some(turn) = log.turns.last().filter(|turn| !turn.is_awaiting_reply()) {
                print_reply(conversation_id, &turn.assistant_text);
            }
        }
    }

    fn show_batch(&self, conversation_id: &str, messages: &[String]) {
        if messages.len() > 1 {
            let queued = messages.join(" / ");
            println!(
                "{}",
                format!("[{conversation_id}] queued: {queued}").bright_black()
            );
        }
    }

    fn show_typing(&self, conversation_id: &str, visible: bool) {
        if visible {
            println!("{}", format!("[{conversation_id}] is typing...").bright_black());
        }
    }

    fn reveal_segment(&self, conversation_id: &str, segment: &str) {
        lock(&self.revealed).insert(conversation_id.to_string());
        print_reply(conversation_id, segment);
    }

    fn set_status(&self, conversation_id: &str, status: &ClientStatus) {
        let previous = lock(&self.last_status).insert(conversation_id.to_string(), status.clone());
        let line = match status {
            // Only the first tick of a countdown, not every second.
            ClientStatus::Countdown(seconds) => match previous {
                Some(ClientStatus::Countdown(last)) if last > *seconds => return,
                _ => status.to_string().bright_black(),
            },
            ClientStatus::Ready | ClientStatus::Generating => return,
            ClientStatus::SendFailed(_) | ClientStatus::CancelFailed(_) => status.to_string().red(),
            ClientStatus::Busy | ClientStatus::AlreadyResolved => status.to_string().yellow(),
            ClientStatus::Undone | ClientStatus::Cancelled => status.to_string().bright_green(),
        };
        println!("{line}");
    }

    fn input(&self, conversation_id: &str) -> String {
        lock(&self.drafts)
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    fn set_input(&self, conversation_id: &str, text: &str) {
        lock(&self.drafts).insert(conversation_id.to_string(), text.to_string());
        if !text.is_empty() {
            println!(
                "{}",
                "Your message is back in the input; press Enter to continue.".bright_black()
            );
        }
    }
}
