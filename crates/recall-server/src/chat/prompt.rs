//! Prompt assembly: context rendering and the message list sent upstream.

use chrono::{TimeZone, Utc};

use recall::SearchResult;

use super::model::ChatMessage;

/// History turns included verbatim in the prompt.
pub const HISTORY_TURNS: usize = 16;

/// History turns shown to the reformulator.
pub const REFORMULATION_TURNS: usize = 6;

/// One upstream prompt message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
        }
    }
}

/// Renders the context block from search results.
///
/// Results are deduplicated by `(chat_id, message_id)` keeping the first
/// (highest-ranked) snippet per message; each kept snippet gets a numbered
/// header. Returns the block and the indices of the kept results, which
/// drive the citations chunk.
pub fn assemble_context(results: &[SearchResult]) -> (String, Vec<usize>) {
    if results.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut seen = std::collections::HashSet::new();
    let mut parts = Vec::new();
    let mut selected = Vec::new();

    for (idx, result) in results.iter().enumerate() {
        if !seen.insert((result.chat_id.clone(), result.message_id)) {
            continue;
        }
        let header = chunk_header(result, selected.len() + 1);
        parts.push(format!("{}\n{}\n", header, result.text));
        selected.push(idx);
    }

    (parts.join("\n"), selected)
}

/// `[i] {title} — {yyyy-mm-dd HH:MM} — message {id}:`
fn chunk_header(result: &SearchResult, citation_num: usize) -> String {
    let title = result
        .source_title
        .clone()
        .unwrap_or_else(|| format!("Chat {}", result.chat_id));

    let date_str = result
        .message_date
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "Unknown date".to_string());

    format!(
        "[{}] {} — {} — message {}:",
        citation_num, title, date_str, result.message_id
    )
}

/// Builds the full upstream message list: system prompt, recent history,
/// then the context-bearing question.
pub fn build_messages(
    system_prompt: &str,
    history: &[ChatMessage],
    context: &str,
    question: &str,
) -> Vec<PromptMessage> {
    let mut messages = vec![PromptMessage::system(render_system_prompt(system_prompt))];

    let start = history.len().saturating_sub(HISTORY_TURNS);
    for turn in &history[start..] {
        let message = match turn.role.as_str() {
            "assistant" => PromptMessage::assistant(turn.content.clone()),
            _ => PromptMessage::user(turn.content.clone()),
        };
        messages.push(message);
    }

    messages.push(PromptMessage::user(format!(
        "CONTEXT:\n{}\n\nQUESTION: {}",
        context, question
    )));
    messages
}

/// Substitutes `{current_datetime}` into the system prompt template.
pub fn render_system_prompt(template: &str) -> String {
    let now = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    template.replace("{current_datetime}", &now)
}

/// Renders the reformulation prompt from its template.
pub fn render_reformulation_prompt(
    template: &str,
    history: &[ChatMessage],
    question: &str,
) -> String {
    let start = history.len().saturating_sub(REFORMULATION_TURNS);
    let history_text = history[start..]
        .iter()
        .map(|turn| {
            let role = if turn.role == "user" { "User" } else { "Assistant" };
            format!("{}: {}", role, turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    template
        .replace("{history}", &history_text)
        .replace("{question}", question)
}
