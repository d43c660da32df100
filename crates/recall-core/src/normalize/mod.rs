//! Message text normalisation: whitespace cleanup, link detection, headers,
//! and reply-context splicing.

use chrono::{TimeZone, Utc};

/// Separator line between a reply excerpt and the main message body.
const REPLY_SEPARATOR: &str = "\n\n——\n\n";

/// Approximate characters per token used for the reply budget.
const CHARS_PER_TOKEN: usize = 4;

/// Normalised message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    /// Display text with collapsed whitespace, URLs kept verbatim.
    pub text: String,
    /// Lexical text fed to the BM25 field. Currently identical to `text`;
    /// kept separate so the index schema can diverge without a reindex of
    /// the relational side.
    pub bm25_text: String,
    /// Whether the message contains an HTTP/HTTPS link.
    pub has_link: bool,
}

/// Cleans up message text for indexing.
///
/// Collapses whitespace runs to single spaces and flags HTTP(S) links.
pub fn normalize_text(text: &str) -> NormalizedText {
    if text.is_empty() {
        return NormalizedText {
            text: String::new(),
            bm25_text: String::new(),
            has_link: false,
        };
    }

    let has_link = contains_link(text);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    NormalizedText {
        bm25_text: collapsed.clone(),
        text: collapsed,
        has_link,
    }
}

/// Case-insensitive scan for `http://` or `https://`.
fn contains_link(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("http://") || lower.contains("https://")
}

/// Builds the per-message header: `[YYYY-MM-DD HH:MM • sender]`.
///
/// The sender slot prefers `@username`, then the full name, then `Unknown`.
pub fn create_header(
    sender: Option<&str>,
    sender_username: Option<&str>,
    message_date: i64,
) -> String {
    let date_str = match Utc.timestamp_opt(message_date, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => "Unknown date".to_string(),
    };

    let sender_str = match (sender_username, sender) {
        (Some(username), _) if !username.is_empty() => format!("@{}", username),
        (_, Some(name)) if !name.is_empty() => name.to_string(),
        _ => "Unknown".to_string(),
    };

    format!("[{} • {}]", date_str, sender_str)
}

/// Splices reply context in front of the main text.
///
/// The reply excerpt is hard-truncated to `max_reply_tokens` (approximated at
/// four characters per token) at a word boundary, with a `...` marker when
/// anything was cut.
pub fn compose_with_reply(
    main_text: &str,
    reply_text: Option<&str>,
    max_reply_tokens: usize,
) -> String {
    let Some(reply) = reply_text.filter(|r| !r.trim().is_empty()) else {
        return main_text.to_string();
    };

    let max_chars = max_reply_tokens * CHARS_PER_TOKEN;
    let reply = if reply.chars().count() > max_chars {
        let cut: String = reply.chars().take(max_chars).collect();
        let trimmed = match cut.rfind(' ') {
            Some(pos) => &cut[..pos],
            None => cut.as_str(),
        };
        format!("{}...", trimmed)
    } else {
        reply.to_string()
    };

    format!("{}{}{}", reply, REPLY_SEPARATOR, main_text)
}
