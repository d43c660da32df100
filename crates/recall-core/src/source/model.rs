use serde::{Deserialize, Serialize};

/// Kind of chat a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Private,
    Group,
    Channel,
    Saved,
    Unknown,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Private => "private",
            ChatType::Group => "group",
            ChatType::Channel => "channel",
            ChatType::Saved => "saved",
            ChatType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ChatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of one message as fetched from the chat platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub chat_id: String,
    /// Monotonic per chat.
    pub message_id: i64,
    /// Epoch seconds.
    pub message_date: i64,
    pub edit_date: Option<i64>,
    pub sender: Option<String>,
    pub sender_username: Option<String>,
    pub chat_username: Option<String>,
    pub chat_type: ChatType,
    pub thread_id: Option<i64>,
    pub reply_to_msg_id: Option<i64>,
    pub text: String,
    pub source_title: Option<String>,
}

/// A chat selection entry resolved to a concrete chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChat {
    pub chat_id: String,
    pub title: String,
    pub chat_type: ChatType,
    pub username: Option<String>,
}

/// Live event from the platform's update stream.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    NewMessage(SourceMessage),
    MessageEdited(SourceMessage),
}

impl SourceEvent {
    pub fn message(&self) -> &SourceMessage {
        match self {
            SourceEvent::NewMessage(m) | SourceEvent::MessageEdited(m) => m,
        }
    }

    pub fn is_edit(&self) -> bool {
        matches!(self, SourceEvent::MessageEdited(_))
    }
}

/// History iteration options.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Only messages newer than this epoch-seconds instant.
    pub since: Option<i64>,
    /// Only messages with an id strictly greater than this.
    pub min_id: Option<i64>,
    /// Iterate oldest to newest when set.
    pub reverse: bool,
    /// Hard cap on yielded messages.
    pub limit: Option<usize>,
}
