//! Per-message processing: normalise, chunk, embed, persist, feed.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use recall::chunk::{ChunkError, Chunker};
use recall::embed::{EmbedError, Embedder, model_dimension};
use recall::normalize::{compose_with_reply, create_header, normalize_text};
use recall::source::{MessageSource, ResolvedChat, SourceMessage};
use recall::store::{ChunkRecord, Store, StoreError};
use recall::vespa::{IndexClient, IndexedDocument, delete_message_chunks, feed_documents};
use recall::{Config, EmbedConfig};

use crate::metrics::IndexerMetrics;

/// Bounded depth of the shared work queue.
pub const QUEUE_CAPACITY: usize = 1000;

/// One unit of work for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub message: SourceMessage,
    pub is_edit: bool,
}

impl WorkItem {
    pub fn new(message: SourceMessage) -> Self {
        Self {
            message,
            is_edit: false,
        }
    }
}

/// Outcome of processing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Existing chunks are current; nothing to do.
    Skipped,
    /// Message had no indexable text.
    Empty,
    /// Dry run stopped after cost estimation.
    DryRun,
    /// Chunks written and fed.
    Indexed { chunks: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Stateless worker turning one source message into indexed chunks.
pub struct MessageProcessor {
    store: Arc<dyn Store>,
    index: Arc<dyn IndexClient>,
    source: Arc<dyn MessageSource>,
    embedder: Arc<Embedder>,
    chunker: Chunker,
    config: Config,
    embed_model_dim: usize,
    dry_run: bool,
    pub metrics: Arc<IndexerMetrics>,
}

impl MessageProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        index: Arc<dyn IndexClient>,
        source: Arc<dyn MessageSource>,
        embedder: Arc<Embedder>,
        config: Config,
        embed_config: &EmbedConfig,
        dry_run: bool,
    ) -> Self {
        let chunker = Chunker::new(config.target_chunk_tokens, config.chunk_overlap_tokens);
        // Unsupported models are rejected at config load; default to the
        // large field if this is ever bypassed.
        let embed_model_dim = model_dimension(&embed_config.model).unwrap_or(3072);

        Self {
            store,
            index,
            source,
            embedder,
            chunker,
            config,
            embed_model_dim,
            dry_run,
            metrics: Arc::new(IndexerMetrics::default()),
        }
    }

    /// Processes one message end to end. Idempotent on chunk ids.
    pub async fn process(&self, message: &SourceMessage) -> Result<ProcessOutcome, ProcessError> {
        self.metrics.messages_scanned.fetch_add(1, Ordering::Relaxed);

        if message.text.trim().is_empty() {
            return Ok(ProcessOutcome::Empty);
        }

        let existing = self
            .store
            .get_existing_chunks(&message.chat_id, message.message_id)
            .await?;
        if !existing.is_empty() && !needs_update(message, &existing) {
            debug!(
                chat_id = %message.chat_id,
                message_id = message.message_id,
                "skipping unchanged message"
            );
            self.metrics.messages_skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(ProcessOutcome::Skipped);
        }

        let reply_text = self.fetch_reply_context(message).await;

        let normalized = normalize_text(&message.text);
        let header = create_header(
            message.sender.as_deref(),
            message.sender_username.as_deref(),
            message.message_date,
        );
        let composed = compose_with_reply(
            &normalized.text,
            reply_text.as_deref(),
            self.config.reply_context_tokens,
        );

        let chunks = match self.chunker.chunk_text(&composed, &header) {
            Ok(chunks) => chunks,
            Err(ChunkError::EmptyInput) => return Ok(ProcessOutcome::Empty),
            Err(e) => {
                warn!(
                    chat_id = %message.chat_id,
                    message_id = message.message_id,
                    error = %e,
                    "chunking failed"
                );
                return Ok(ProcessOutcome::Empty);
            }
        };

        let texts: Vec<String> = chunks.iter().map(|c| c.full_text.clone()).collect();
        let embeddings = self.embedder.embed_texts(&texts, self.dry_run).await?;

        if self.dry_run {
            info!(
                chat_id = %message.chat_id,
                message_id = message.message_id,
                chunks = chunks.len(),
                "dry run, would index message"
            );
            return Ok(ProcessOutcome::DryRun);
        }

        let mut records = Vec::with_capacity(chunks.len());
        let mut documents = Vec::with_capacity(chunks.len());

        for (chunk_idx, (chunk, (text_hash, vector))) in
            chunks.iter().zip(embeddings.iter()).enumerate()
        {
            let chunk_idx = chunk_idx as i32;
            let chunk_id = ChunkRecord::format_id(
                &message.chat_id,
                message.message_id,
                chunk_idx,
                self.config.chunking_version,
            );

            records.push(ChunkRecord {
                chunk_id: chunk_id.clone(),
                chat_id: message.chat_id.clone(),
                message_id: message.message_id,
                chunk_idx,
                text_hash: text_hash.clone(),
                message_date: message.message_date,
                edit_date: message.edit_date,
                deleted_at: None,
                sender: message.sender.clone(),
                sender_username: message.sender_username.clone(),
                chat_username: message.chat_username.clone(),
                chat_type: Some(message.chat_type.as_str().to_string()),
                thread_id: message.thread_id,
                has_link: normalized.has_link,
            });

            // Dense-field routing follows the configured model, not the
            // vector's actual length.
            let (vector_small, vector_large) = if self.embed_model_dim == 1536 {
                (Some(vector.clone()), None)
            } else {
                (None, Some(vector.clone()))
            };

            documents.push(IndexedDocument {
                id: chunk_id,
                chat_id: message.chat_id.clone(),
                message_id: message.message_id,
                chunk_idx,
                source_title: message.source_title.clone(),
                sender: message.sender.clone(),
                sender_username: message.sender_username.clone(),
                chat_username: message.chat_username.clone(),
                chat_type: Some(message.chat_type.as_str().to_string()),
                message_date: message.message_date,
                edit_date: message.edit_date,
                deleted_at: None,
                thread_id: message.thread_id,
                has_link: normalized.has_link,
                text: chunk.full_text.clone(),
                bm25_text: chunk.lexical_text.clone(),
                vector_small,
                vector_large,
            });
        }

        for record in &records {
            self.store.upsert_chunk(record).await?;
        }

        let fed = feed_documents(&self.index, &documents).await;

        self.metrics.messages_indexed.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .chunks_written
            .fetch_add(records.len() as u64, Ordering::Relaxed);

        debug!(
            chat_id = %message.chat_id,
            message_id = message.message_id,
            chunks = records.len(),
            fed,
            "message processed"
        );

        Ok(ProcessOutcome::Indexed {
            chunks: records.len(),
        })
    }

    async fn fetch_reply_context(&self, message: &SourceMessage) -> Option<String> {
        let reply_to = message.reply_to_msg_id?;
        let chat = resolved_from_message(message);

        match self.source.get_message_by_id(&chat, reply_to).await {
            Ok(Some(reply)) => Some(reply.text),
            Ok(None) => None,
            Err(e) => {
                warn!(
                    chat_id = %message.chat_id,
                    reply_to,
                    error = %e,
                    "reply context fetch failed"
                );
                None
            }
        }
    }
}

/// Rebuilds a minimal resolved chat from a message's denormalised fields.
fn resolved_from_message(message: &SourceMessage) -> ResolvedChat {
    ResolvedChat {
        chat_id: message.chat_id.clone(),
        title: message
            .source_title
            .clone()
            .unwrap_or_else(|| message.chat_id.clone()),
        chat_type: message.chat_type,
        username: message.chat_username.clone(),
    }
}

/// Tombstones a deleted message: sets `deleted_at` on its chunk records and
/// removes its documents from the index.
///
/// Returns the number of index deletes that succeeded (missing documents
/// included). Tombstoned chunks are excluded from retrieval by the
/// `deleted_at` query filter.
pub async fn delete_message(
    store: &Arc<dyn Store>,
    index: &Arc<dyn IndexClient>,
    chat_id: &str,
    message_id: i64,
    chunking_version: u32,
) -> Result<usize, ProcessError> {
    let deleted_at = Utc::now().timestamp();
    store
        .mark_chunks_deleted(chat_id, message_id, deleted_at)
        .await?;

    let deleted = delete_message_chunks(index, chat_id, message_id, chunking_version).await;
    info!(chat_id, message_id, deleted_at, "message tombstoned");
    Ok(deleted)
}

/// Running worker pool draining a shared work queue.
///
/// Workers exit on a `None` sentinel (or when the queue closes); processing
/// failures are logged and counted, and the first one is kept for callers
/// that want to surface it.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    first_error: Arc<Mutex<Option<ProcessError>>>,
}

impl WorkerPool {
    /// Waits for every worker to drain; returns the first failure, if any.
    pub async fn join(self) -> Option<ProcessError> {
        for handle in self.handles {
            let _ = handle.await;
        }
        self.first_error.lock().await.take()
    }
}

/// Spawns `count` workers over one shared receiver.
pub fn spawn_workers(
    processor: Arc<MessageProcessor>,
    rx: mpsc::Receiver<Option<WorkItem>>,
    count: usize,
) -> WorkerPool {
    let rx = Arc::new(Mutex::new(rx));
    let first_error: Arc<Mutex<Option<ProcessError>>> = Arc::new(Mutex::new(None));

    let handles = (0..count.max(1))
        .map(|worker_id| {
            let processor = Arc::clone(&processor);
            let rx = Arc::clone(&rx);
            let first_error = Arc::clone(&first_error);
            tokio::spawn(async move {
                loop {
                    let item = { rx.lock().await.recv().await };
                    match item {
                        Some(Some(work)) => {
                            if let Err(e) = processor.process(&work.message).await {
                                processor
                                    .metrics
                                    .process_failures
                                    .fetch_add(1, Ordering::Relaxed);
                                error!(
                                    worker_id,
                                    chat_id = %work.message.chat_id,
                                    message_id = work.message.message_id,
                                    is_edit = work.is_edit,
                                    error = %e,
                                    "message processing failed"
                                );
                                let mut slot = first_error.lock().await;
                                if slot.is_none() {
                                    *slot = Some(e);
                                }
                            }
                        }
                        Some(None) | None => {
                            debug!(worker_id, "worker exiting");
                            break;
                        }
                    }
                }
            })
        })
        .collect();

    WorkerPool {
        handles,
        first_error,
    }
}

/// A message needs reprocessing when its edit date advanced past what the
/// stored chunks carry.
fn needs_update(message: &SourceMessage, existing: &[ChunkRecord]) -> bool {
    match message.edit_date {
        Some(edit_date) => existing
            .iter()
            .any(|chunk| chunk.edit_date.is_none_or(|stored| edit_date > stored)),
        None => false,
    }
}
