use serde_json::{Value, json};

/// A chunk as fed to the search engine.
///
/// Exactly one of `vector_small` / `vector_large` is set, selected by the
/// embedding model; an index never mixes dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub id: String,
    pub chat_id: String,
    pub message_id: i64,
    pub chunk_idx: i32,
    pub source_title: Option<String>,
    pub sender: Option<String>,
    pub sender_username: Option<String>,
    pub chat_username: Option<String>,
    pub chat_type: Option<String>,
    pub message_date: i64,
    pub edit_date: Option<i64>,
    pub deleted_at: Option<i64>,
    pub thread_id: Option<i64>,
    pub has_link: bool,
    pub text: String,
    pub bm25_text: String,
    pub vector_small: Option<Vec<f32>>,
    pub vector_large: Option<Vec<f32>>,
}

impl IndexedDocument {
    /// Renders the document-API payload (`{"fields": {...}}`).
    pub fn to_feed_json(&self) -> Value {
        let mut fields = json!({
            "id": self.id,
            "text": self.text,
            "bm25_text": self.bm25_text,
            "chat_id": self.chat_id,
            "message_id": self.message_id,
            "chunk_idx": self.chunk_idx,
            "source_title": self.source_title.clone().unwrap_or_default(),
            "sender": self.sender.clone().unwrap_or_default(),
            "sender_username": self.sender_username.clone().unwrap_or_default(),
            "chat_username": self.chat_username.clone().unwrap_or_default(),
            "chat_type": self.chat_type.clone().unwrap_or_default(),
            "message_date": self.message_date,
            "has_link": self.has_link,
        });

        let obj = fields.as_object_mut().expect("fields is an object");
        if let Some(edit_date) = self.edit_date {
            obj.insert("edit_date".to_string(), json!(edit_date));
        }
        if let Some(deleted_at) = self.deleted_at {
            obj.insert("deleted_at".to_string(), json!(deleted_at));
        }
        if let Some(thread_id) = self.thread_id {
            obj.insert("thread_id".to_string(), json!(thread_id));
        }
        if let Some(v) = &self.vector_small {
            obj.insert("vector_small".to_string(), json!({ "values": v }));
        }
        if let Some(v) = &self.vector_large {
            obj.insert("vector_large".to_string(), json!({ "values": v }));
        }

        json!({ "fields": fields })
    }
}
