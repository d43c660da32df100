use serde::{Deserialize, Serialize};

/// One row of the `chunks` table: the durable record of an indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// `"{chat_id}:{message_id}:{chunk_idx}:v{chunking_version}"`.
    pub chunk_id: String,
    pub chat_id: String,
    pub message_id: i64,
    pub chunk_idx: i32,
    pub text_hash: String,
    /// Epoch seconds.
    pub message_date: i64,
    pub edit_date: Option<i64>,
    /// Tombstone instant; set when the source message was deleted.
    pub deleted_at: Option<i64>,
    pub sender: Option<String>,
    pub sender_username: Option<String>,
    pub chat_username: Option<String>,
    pub chat_type: Option<String>,
    pub thread_id: Option<i64>,
    pub has_link: bool,
}

impl ChunkRecord {
    /// Formats the canonical chunk id.
    pub fn format_id(chat_id: &str, message_id: i64, chunk_idx: i32, chunking_version: u32) -> String {
        format!("{}:{}:{}:v{}", chat_id, message_id, chunk_idx, chunking_version)
    }
}

/// One row of the `embedding_cache` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEmbedding {
    pub text_hash: String,
    pub model: String,
    pub dim: i32,
    /// Little-endian f32 bytes.
    pub vector: Vec<u8>,
    pub lang: Option<String>,
    pub chunking_version: i32,
    pub preprocess_version: i32,
}
