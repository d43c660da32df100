//! Chat request and stream-chunk wire types.

use serde::{Deserialize, Serialize};

use recall::SearchResult;

fn default_k() -> usize {
    12
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"user"` or `"assistant"`.
    pub role: String,
    pub content: String,
}

/// Retrieval filters attached to a chat request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatFilters {
    #[serde(default)]
    pub chat_ids: Option<Vec<String>>,
    #[serde(default)]
    pub thread_id: Option<i64>,
}

/// Body of `POST /chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub q: String,

    /// Number of snippets to retrieve.
    #[serde(default = "default_k")]
    pub k: usize,

    #[serde(default)]
    pub model_id: Option<String>,

    #[serde(default)]
    pub filters: Option<ChatFilters>,

    #[serde(default)]
    pub history: Option<Vec<ChatMessage>>,

    /// UI broadening level, forwarded to retrieval.
    #[serde(default)]
    pub expansion_level: u32,
}

/// Citation entry pointing back to a retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCitation {
    pub id: String,
    pub chat_id: String,
    pub message_id: i64,
    pub chunk_idx: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_date: Option<i64>,
}

impl ChatCitation {
    pub fn from_result(result: &SearchResult) -> Self {
        Self {
            id: result.id.clone(),
            chat_id: result.chat_id.clone(),
            message_id: result.message_id,
            chunk_idx: result.chunk_idx,
            source_title: result.source_title.clone(),
            message_date: result.message_date,
        }
    }
}

/// Token usage and estimated cost of one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

impl ChatUsage {
    pub fn zero() -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            cost_usd: Some(0.0),
        }
    }
}

/// One server-sent chunk of the `/chat` stream.
///
/// The wire form is the flattened `{"type": ..., ...}` shape; each arm
/// carries only its own fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamChunk {
    Reformulate {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        reformulated_query: String,
    },
    Search {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        search_results_count: usize,
    },
    Start {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
    Content {
        content: String,
    },
    Citations {
        citations: Vec<ChatCitation>,
    },
    Usage {
        usage: ChatUsage,
    },
    End {
        usage: ChatUsage,
        timing_seconds: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        citations: Option<Vec<ChatCitation>>,
    },
    Error {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_seconds: Option<u64>,
    },
}

impl StreamChunk {
    /// The wire tag of this chunk.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamChunk::Reformulate { .. } => "reformulate",
            StreamChunk::Search { .. } => "search",
            StreamChunk::Start { .. } => "start",
            StreamChunk::Content { .. } => "content",
            StreamChunk::Citations { .. } => "citations",
            StreamChunk::Usage { .. } => "usage",
            StreamChunk::End { .. } => "end",
            StreamChunk::Error { .. } => "error",
        }
    }

    /// Renders the SSE frame (`data: {json}\n\n`) payload.
    pub fn to_sse_data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","content":"serialization failed"}"#.to_string()
        })
    }
}
