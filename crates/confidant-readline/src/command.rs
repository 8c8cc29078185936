//! REPL input parsing.

/// Slash commands offered for completion.
pub const COMMANDS: &[&str] = &[
    "/cancel", "/config", "/help", "/log", "/persona", "/quit", "/send", "/undo",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text, queued into the current batch.
    Say(String),
    Undo,
    /// Sends the batch now instead of waiting for the window to close.
    Send,
    Cancel,
    Log,
    Persona(String),
    Config,
    Help,
    Quit,
    Unknown(String),
}

impl Command {
    /// Returns `None` for blank lines.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed == "quit" || trimmed == "exit" {
            return Some(Self::Quit);
        }
        if !trimmed.starts_with('/') {
            return Some(Self::Say(trimmed.to_string()));
        }

        let (name, rest) = trimmed
            .split_once(char::is_whitespace)
            .map(|(name, rest)| (name, rest.trim()))
            .unwrap_or((trimmed, ""));
        let command = match name {
            "/undo" => Self::Undo,
            "/send" => Self::Send,
            "/cancel" => Self::Cancel,
            "/log" => Self::Log,
            "/config" => Self::Config,
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            "/persona" if !rest.is_empty() => Self::Persona(rest.to_string()),
            _ => Self::Unknown(name.to_string()),
        };
        Some(command)
    }
}

pub const HELP: &str = "\
Type to talk. Lines sent within a few seconds of each other go out as one message.
  /undo          take back the last queued line
  /send          send the queued lines now
  /cancel        stop waiting for the reply and get your message back
  /log           show the conversation so far
  /persona <id>  switch to another persona
  /config        reload timing settings from the server
  /quit          leave (queued lines are sent next time)";
