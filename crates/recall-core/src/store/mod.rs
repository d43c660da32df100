//! Durable relational storage for chunks and cached embeddings.

pub mod error;
pub mod model;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use error::StoreError;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockStore;
pub use model::{CachedEmbedding, ChunkRecord};

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Storage operations needed by the indexing and retrieval pipelines.
#[async_trait]
pub trait Store: Send + Sync {
    /// Looks up a cached embedding by content hash.
    async fn get_cached_embedding(
        &self,
        text_hash: &str,
    ) -> Result<Option<CachedEmbedding>, StoreError>;

    /// Inserts an embedding; a concurrent duplicate insert is a no-op.
    async fn cache_embedding(&self, entry: &CachedEmbedding) -> Result<(), StoreError>;

    /// Returns every chunk recorded for a message.
    async fn get_existing_chunks(
        &self,
        chat_id: &str,
        message_id: i64,
    ) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Inserts or updates one chunk, keyed by `chunk_id`.
    async fn upsert_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError>;

    /// Tombstones every chunk of a message.
    async fn mark_chunks_deleted(
        &self,
        chat_id: &str,
        message_id: i64,
        deleted_at: i64,
    ) -> Result<(), StoreError>;
}

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS embedding_cache (
  text_hash TEXT PRIMARY KEY,
  model TEXT NOT NULL,
  dim INT NOT NULL,
  vector BYTEA NOT NULL,
  lang TEXT,
  chunking_version INT NOT NULL,
  preprocess_version INT NOT NULL,
  created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS chunks (
  chunk_id TEXT PRIMARY KEY,
  chat_id TEXT NOT NULL,
  message_id BIGINT NOT NULL,
  chunk_idx INT NOT NULL,
  text_hash TEXT NOT NULL,
  message_date BIGINT NOT NULL,
  edit_date BIGINT,
  deleted_at BIGINT,
  sender TEXT,
  sender_username TEXT,
  chat_username TEXT,
  chat_type TEXT,
  thread_id BIGINT,
  has_link BOOL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_chunks_chat_msg ON chunks(chat_id, message_id);
CREATE INDEX IF NOT EXISTS idx_chunks_texthash ON chunks(text_hash);
"#;

/// Postgres-backed [`Store`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects a pool and ensures the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(2)
            .max_connections(10)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    /// Returns the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        for statement in CREATE_TABLES_SQL.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("database tables created/verified");
        Ok(())
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for PgStore {
    async fn get_cached_embedding(
        &self,
        text_hash: &str,
    ) -> Result<Option<CachedEmbedding>, StoreError> {
        let row = sqlx::query(
            "SELECT text_hash, model, dim, vector, lang, chunking_version, preprocess_version \
             FROM embedding_cache WHERE text_hash = $1",
        )
        .bind(text_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(CachedEmbedding {
                text_hash: row.try_get("text_hash")?,
                model: row.try_get("model")?,
                dim: row.try_get("dim")?,
                vector: row.try_get("vector")?,
                lang: row.try_get("lang")?,
                chunking_version: row.try_get("chunking_version")?,
                preprocess_version: row.try_get("preprocess_version")?,
            })
        })
        .transpose()
    }

    async fn cache_embedding(&self, entry: &CachedEmbedding) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO embedding_cache \
             (text_hash, model, dim, vector, lang, chunking_version, preprocess_version, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, now()) \
             ON CONFLICT (text_hash) DO NOTHING",
        )
        .bind(&entry.text_hash)
        .bind(&entry.model)
        .bind(entry.dim)
        .bind(&entry.vector)
        .bind(&entry.lang)
        .bind(entry.chunking_version)
        .bind(entry.preprocess_version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_existing_chunks(
        &self,
        chat_id: &str,
        message_id: i64,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT chunk_id, chat_id, message_id, chunk_idx, text_hash, message_date, \
             edit_date, deleted_at, sender, sender_username, chat_username, chat_type, \
             thread_id, COALESCE(has_link, FALSE) AS has_link \
             FROM chunks WHERE chat_id = $1 AND message_id = $2 \
             ORDER BY chunk_idx",
        )
        .bind(chat_id)
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ChunkRecord {
                    chunk_id: row.try_get("chunk_id")?,
                    chat_id: row.try_get("chat_id")?,
                    message_id: row.try_get("message_id")?,
                    chunk_idx: row.try_get("chunk_idx")?,
                    text_hash: row.try_get("text_hash")?,
                    message_date: row.try_get("message_date")?,
                    edit_date: row.try_get("edit_date")?,
                    deleted_at: row.try_get("deleted_at")?,
                    sender: row.try_get("sender")?,
                    sender_username: row.try_get("sender_username")?,
                    chat_username: row.try_get("chat_username")?,
                    chat_type: row.try_get("chat_type")?,
                    thread_id: row.try_get("thread_id")?,
                    has_link: row.try_get("has_link")?,
                })
            })
            .collect()
    }

    async fn upsert_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO chunks (\
               chunk_id, chat_id, message_id, chunk_idx, text_hash, message_date, \
               edit_date, deleted_at, sender, sender_username, chat_username, chat_type, \
               thread_id, has_link\
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (chunk_id) DO UPDATE SET \
               text_hash = EXCLUDED.text_hash, \
               edit_date = EXCLUDED.edit_date, \
               deleted_at = EXCLUDED.deleted_at, \
               sender = EXCLUDED.sender, \
               sender_username = EXCLUDED.sender_username, \
               chat_username = EXCLUDED.chat_username, \
               chat_type = EXCLUDED.chat_type, \
               thread_id = EXCLUDED.thread_id, \
               has_link = EXCLUDED.has_link",
        )
        .bind(&chunk.chunk_id)
        .bind(&chunk.chat_id)
        .bind(chunk.message_id)
        .bind(chunk.chunk_idx)
        .bind(&chunk.text_hash)
        .bind(chunk.message_date)
        .bind(chunk.edit_date)
        .bind(chunk.deleted_at)
        .bind(&chunk.sender)
        .bind(&chunk.sender_username)
        .bind(&chunk.chat_username)
        .bind(&chunk.chat_type)
        .bind(chunk.thread_id)
        .bind(chunk.has_link)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_chunks_deleted(
        &self,
        chat_id: &str,
        message_id: i64,
        deleted_at: i64,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE chunks SET deleted_at = $3 WHERE chat_id = $1 AND message_id = $2")
            .bind(chat_id)
            .bind(message_id)
            .bind(deleted_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
