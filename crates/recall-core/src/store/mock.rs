//! In-memory [`Store`] used by tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::StoreError;
use super::model::{CachedEmbedding, ChunkRecord};
use super::Store;

/// In-memory store with call counters for cache-behaviour assertions.
#[derive(Clone, Default)]
pub struct MockStore {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    embeddings: Mutex<HashMap<String, CachedEmbedding>>,
    chunks: Mutex<HashMap<String, ChunkRecord>>,
    embedding_lookups: AtomicU64,
    embedding_writes: AtomicU64,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cache probe calls so far.
    pub fn embedding_lookups(&self) -> u64 {
        self.inner.embedding_lookups.load(Ordering::SeqCst)
    }

    /// Number of cache write calls so far (including conflict no-ops).
    pub fn embedding_writes(&self) -> u64 {
        self.inner.embedding_writes.load(Ordering::SeqCst)
    }

    /// Number of distinct cached embeddings.
    pub fn embedding_count(&self) -> usize {
        self.inner.embeddings.lock().len()
    }

    /// Number of stored chunks.
    pub fn chunk_count(&self) -> usize {
        self.inner.chunks.lock().len()
    }

    /// Returns every stored chunk, sorted by chunk id.
    pub fn all_chunks(&self) -> Vec<ChunkRecord> {
        let mut chunks: Vec<ChunkRecord> = self.inner.chunks.lock().values().cloned().collect();
        chunks.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        chunks
    }
}

#[async_trait]
impl Store for MockStore {
    async fn get_cached_embedding(
        &self,
        text_hash: &str,
    ) -> Result<Option<CachedEmbedding>, StoreError> {
        self.inner.embedding_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.embeddings.lock().get(text_hash).cloned())
    }

    async fn cache_embedding(&self, entry: &CachedEmbedding) -> Result<(), StoreError> {
        self.inner.embedding_writes.fetch_add(1, Ordering::SeqCst);
        self.inner
            .embeddings
            .lock()
            .entry(entry.text_hash.clone())
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn get_existing_chunks(
        &self,
        chat_id: &str,
        message_id: i64,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let mut found: Vec<ChunkRecord> = self
            .inner
            .chunks
            .lock()
            .values()
            .filter(|c| c.chat_id == chat_id && c.message_id == message_id)
            .cloned()
            .collect();
        found.sort_by_key(|c| c.chunk_idx);
        Ok(found)
    }

    async fn upsert_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        self.inner
            .chunks
            .lock()
            .insert(chunk.chunk_id.clone(), chunk.clone());
        Ok(())
    }

    async fn mark_chunks_deleted(
        &self,
        chat_id: &str,
        message_id: i64,
        deleted_at: i64,
    ) -> Result<(), StoreError> {
        for chunk in self.inner.chunks.lock().values_mut() {
            if chunk.chat_id == chat_id && chunk.message_id == message_id {
                chunk.deleted_at = Some(deleted_at);
            }
        }
        Ok(())
    }
}
