//! Search engine (Vespa) HTTP client: document feeding and raw queries.

pub mod error;
pub mod model;

#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use error::VespaError;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockIndexClient;
pub use model::IndexedDocument;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Socket timeout for search engine HTTP calls.
const HTTP_TIMEOUT_SECS: u64 = 20;

/// Concurrent feeds per `feed_documents` call.
const FEED_CONCURRENCY: usize = 5;

/// Feed/delete retry attempts.
const MAX_ATTEMPTS: u32 = 3;

/// Upper bound of chunk indices probed when deleting a message's chunks.
pub const MAX_CHUNKS_PER_MESSAGE: i32 = 10;

/// Minimal search engine interface used by the feeder and the retrieval
/// engine.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Posts a query body to the search API and returns the raw response.
    async fn search(&self, body: Value) -> Result<Value, VespaError>;

    /// Upserts one document (idempotent on document id).
    async fn feed_document(&self, doc: &IndexedDocument) -> Result<(), VespaError>;

    /// Deletes one document; a missing document counts as success.
    async fn delete_document(&self, doc_id: &str) -> Result<(), VespaError>;
}

/// Feed counters.
#[derive(Debug, Default)]
pub struct FeedMetrics {
    pub success: AtomicU64,
    pub retries: AtomicU64,
    pub failures: AtomicU64,
}

/// Vespa-backed [`IndexClient`].
#[derive(Clone)]
pub struct VespaClient {
    endpoint: String,
    client: reqwest::Client,
    backoff_base_ms: u64,
    metrics: Arc<FeedMetrics>,
}

impl VespaClient {
    pub fn new(endpoint: &str, backoff_base_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
            backoff_base_ms,
            metrics: Arc::new(FeedMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<FeedMetrics> {
        Arc::clone(&self.metrics)
    }

    fn doc_url(&self, doc_id: &str) -> String {
        format!(
            "{}/document/v1/default/message/docid/{}",
            self.endpoint, doc_id
        )
    }

    /// Probes the engine's config server for application status.
    pub async fn health_check(&self) -> bool {
        let status_endpoint = self.endpoint.replace(":8080", ":19071");
        let url = format!("{}/ApplicationStatus", status_endpoint);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn post_document(&self, doc: &IndexedDocument) -> Result<(), VespaError> {
        let response = self
            .client
            .post(self.doc_url(&doc.id))
            .json(&doc.to_feed_json())
            .send()
            .await
            .map_err(|e| VespaError::Transport(e.to_string()))?;

        let status = response.status();
        // The document API answers 200 for updates and 201 for creates.
        if status.as_u16() == 200 || status.as_u16() == 201 {
            return Ok(());
        }
        Err(VespaError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl IndexClient for VespaClient {
    async fn search(&self, body: Value) -> Result<Value, VespaError> {
        let response = self
            .client
            .post(format!("{}/search/", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| VespaError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VespaError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| VespaError::Malformed(e.to_string()))
    }

    async fn feed_document(&self, doc: &IndexedDocument) -> Result<(), VespaError> {
        let mut last_error = String::new();

        for attempt in 0..MAX_ATTEMPTS {
            match self.post_document(doc).await {
                Ok(()) => {
                    self.metrics.success.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(doc_id = %doc.id, attempt = attempt + 1, error = %e, "feed failed");
                    if attempt + 1 < MAX_ATTEMPTS {
                        self.metrics.retries.fetch_add(1, Ordering::Relaxed);
                        let wait = Duration::from_millis(self.backoff_base_ms << attempt);
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        self.metrics.failures.fetch_add(1, Ordering::Relaxed);
        Err(VespaError::FeedExhausted {
            attempts: MAX_ATTEMPTS,
            last_error,
        })
    }

    async fn delete_document(&self, doc_id: &str) -> Result<(), VespaError> {
        let response = self
            .client
            .delete(self.doc_url(doc_id))
            .send()
            .await
            .map_err(|e| VespaError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        // 404 means the document is already gone.
        if status == 200 || status == 404 {
            return Ok(());
        }
        Err(VespaError::Status {
            status,
            body: response.text().await.unwrap_or_default(),
        })
    }
}

/// Feeds documents with bounded concurrency; returns the success count.
pub async fn feed_documents(index: &Arc<dyn IndexClient>, docs: &[IndexedDocument]) -> usize {
    if docs.is_empty() {
        return 0;
    }

    let semaphore = Arc::new(Semaphore::new(FEED_CONCURRENCY));
    let futures = docs.iter().map(|doc| {
        let semaphore = Arc::clone(&semaphore);
        let index = Arc::clone(index);
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore closed");
            index.feed_document(doc).await.is_ok()
        }
    });

    let success_count = join_all(futures).await.into_iter().filter(|ok| *ok).count();
    info!(fed = success_count, total = docs.len(), "documents fed to index");
    success_count
}

/// Deletes every chunk of a message, probing the fixed chunk-index range.
///
/// Returns the number of delete calls that succeeded (404s included).
pub async fn delete_message_chunks(
    index: &Arc<dyn IndexClient>,
    chat_id: &str,
    message_id: i64,
    chunking_version: u32,
) -> usize {
    let mut deleted = 0;
    for chunk_idx in 0..MAX_CHUNKS_PER_MESSAGE {
        let doc_id = format!("{}:{}:{}:v{}", chat_id, message_id, chunk_idx, chunking_version);
        if index.delete_document(&doc_id).await.is_ok() {
            deleted += 1;
        }
    }
    info!(chat_id, message_id, deleted, "deleted message chunks from index");
    deleted
}
