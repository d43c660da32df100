use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_limit() -> usize {
    10
}

fn default_hybrid() -> bool {
    true
}

/// A retrieval request, as posted to `/search` and issued internally by the
/// chat answerer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub q: String,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default)]
    pub chat_id: Option<String>,

    #[serde(default)]
    pub thread_id: Option<i64>,

    /// Dense + lexical when true; lexical only when false.
    #[serde(default = "default_hybrid")]
    pub hybrid: bool,

    /// UI-controlled broadening level; grows seed/result/rerank budgets.
    #[serde(default)]
    pub expansion_level: u32,
}

impl SearchRequest {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            limit: default_limit(),
            chat_id: None,
            thread_id: None,
            hybrid: true,
            expansion_level: 0,
        }
    }
}

/// A first-pass hit, before context expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    /// Document id of the hit chunk.
    pub id: String,
    pub chat_id: String,
    pub message_id: i64,
    pub chunk_idx: i32,
    /// Milliseconds; derived from the indexed epoch-seconds field.
    pub message_date_ms: Option<i64>,
    pub text: String,
    pub score: f64,
    pub sender: Option<String>,
    pub sender_username: Option<String>,
    pub source_title: Option<String>,
    pub chat_type: Option<String>,
    pub edit_date: Option<i64>,
    pub thread_id: Option<i64>,
    pub has_link: Option<bool>,
}

impl Seed {
    /// Parses one search hit; `None` when chat_id or message_id is missing.
    pub fn from_hit(hit: &Value) -> Option<Self> {
        let fields = hit.get("fields")?;
        let chat_id = fields.get("chat_id")?.as_str()?.to_string();
        if chat_id.is_empty() {
            return None;
        }
        let message_id = fields.get("message_id")?.as_i64()?;
        let score = hit.get("relevance").and_then(Value::as_f64).unwrap_or(0.0);

        Some(Self {
            id: field_str(fields, "id").unwrap_or_default(),
            chat_id,
            message_id,
            chunk_idx: fields
                .get("chunk_idx")
                .and_then(Value::as_i64)
                .unwrap_or(0) as i32,
            message_date_ms: fields
                .get("message_date")
                .and_then(Value::as_i64)
                .map(|secs| secs * 1000),
            text: field_str(fields, "text").unwrap_or_default(),
            score,
            sender: field_str(fields, "sender"),
            sender_username: field_str(fields, "sender_username"),
            source_title: field_str(fields, "source_title"),
            chat_type: field_str(fields, "chat_type"),
            edit_date: fields.get("edit_date").and_then(Value::as_i64),
            thread_id: fields.get("thread_id").and_then(Value::as_i64),
            has_link: fields.get("has_link").and_then(Value::as_bool),
        })
    }
}

fn field_str(fields: &Value, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Message-id / timestamp extent of an assembled snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start_id: i64,
    pub end_id: i64,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
}

/// A seed grown into a conversational window.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSnippet {
    pub seed: Seed,
    pub span: Span,
    pub text: String,
    pub message_count: usize,
    pub seed_score: f64,
    pub retrieval_score: f64,
    pub rerank_score: Option<f64>,
}

/// One `/search` result / citation source on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub text: String,
    pub chat_id: String,
    pub message_id: i64,
    pub chunk_idx: i32,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_link: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
}

impl From<CandidateSnippet> for SearchResult {
    fn from(candidate: CandidateSnippet) -> Self {
        let seed = candidate.seed;
        Self {
            id: seed.id,
            text: candidate.text,
            chat_id: seed.chat_id,
            message_id: seed.message_id,
            chunk_idx: seed.chunk_idx,
            score: candidate.rerank_score.unwrap_or(candidate.seed_score),
            retrieval_score: Some(candidate.retrieval_score),
            rerank_score: candidate.rerank_score,
            sender: seed.sender,
            sender_username: seed.sender_username,
            message_date: seed.message_date_ms.map(|ms| ms / 1000),
            source_title: seed.source_title,
            chat_type: seed.chat_type,
            edit_date: seed.edit_date,
            thread_id: seed.thread_id,
            has_link: seed.has_link,
            message_count: Some(candidate.message_count),
            span: Some(candidate.span),
        }
    }
}

/// One `/chats` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInfo {
    pub chat_id: String,
    pub source_title: Option<String>,
    pub chat_type: Option<String>,
    pub message_count: i64,
}
