//! Prompt assembly.
//!
//! Message order is fixed: optional pre-prompt, persona, memory, then the
//! latest user message.

use crate::completion::PromptMessage;
use crate::conversation::Turn;
use crate::error::Result;
use minijinja::{Environment, context};
use serde::Serialize;

const MEMORY_TEMPLATE: &str = "Below are the most recent {{ rounds|length }} rounds \
(1 round = 1 user message + 1 assistant reply) of your conversation with the user. \
Use them as context:
{% for round in rounds %}
[Round {{ loop.index }} | {{ round.ts }}]
User: {{ round.user }}
Assistant: {{ round.assistant }}
{% endfor %}";

const EMPTY_MEMORY: &str = "(There is no saved conversation memory yet.)";

const PERSONA_PREAMBLE: &str = "You must talk with the user strictly according to the persona below.";

/// Everything a prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    /// Global pre-prompt; skipped when blank.
    pub pre_prompt: &'a str,
    pub persona: &'a str,
    /// Completed turns only, oldest first, already limited to the history length.
    pub history: &'a [Turn],
    pub user_text: &'a str,
}

#[derive(Serialize)]
struct Round<'a> {
    ts: String,
    user: &'a str,
    assistant: &'a str,
}

/// Builds the message list for one completion call.
pub fn build_messages(inputs: PromptInputs<'_>) -> Result<Vec<PromptMessage>> {
    let mut messages = Vec::with_capacity(4);

    let pre_prompt = inputs.pre_prompt.trim();
    if !pre_prompt.is_empty() {
        messages.push(PromptMessage::system(pre_prompt));
    }
    messages.push(PromptMessage::system(format!(
        "{PERSONA_PREAMBLE}\n\n{}",
        inputs.persona
    )));
    messages.push(PromptMessage::system(render_memory(inputs.history)?));
    messages.push(PromptMessage::user(inputs.user_text));

    Ok(messages)
}

/// Renders the memory block for the given completed turns.
pub fn render_memory(history: &[Turn]) -> Result<String> {
    if history.is_empty() {
        return Ok(EMPTY_MEMORY.to_string());
    }

    let rounds: Vec<Round<'_>> = history
        .iter()
        .map(|turn| Round {
            ts: turn.timestamp.to_rfc3339(),
            user: &turn.user_text,
            assistant: &turn.assistant_text,
        })
        .collect();

    let mut env = Environment::new();
    env.add_template("memory.txt", MEMORY_TEMPLATE)?;
    let rendered = env
        .get_template("memory.txt")?
        .render(context! { rounds => rounds })?;

    Ok(rendered.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::MessageRole;

    #[test]
    fn test_message_order_with_pre_prompt() {
        let history = vec![Turn::completed("hi", "hello")];
        let messages = build_messages(PromptInputs {
            pre_prompt: "  rules  ",
            persona: "be kind",
            history: &history,
            user_text: "how are you",
        })
        .unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], PromptMessage::system("rules"));
        assert!(messages[1].content.ends_with("be kind"));
        assert!(messages[2].content.contains("User: hi\nAssistant: hello"));
        assert_eq!(messages[3].role, MessageRole::User);
        assert_eq!(messages[3].content, "how are you");
    }

    #[test]
    fn test_blank_pre_prompt_is_skipped() {
        let messages = build_messages(PromptInputs {
            pre_prompt: " \n",
            persona: "p",
            history: &[],
            user_text: "q",
        })
        .unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, EMPTY_MEMORY);
    }

    #[test]
    fn test_memory_numbers_rounds() {
        let history = vec![Turn::completed("a", "b"), Turn::completed("c", "<d>")];
        let memory = render_memory(&history).unwrap();

        assert!(memory.starts_with("Below are the most recent 2 rounds"));
        assert!(memory.contains("[Round 1 | "));
        assert!(memory.contains("[Round 2 | "));
        assert!(memory.ends_with("User: c\nAssistant: <d>"));
    }
}
