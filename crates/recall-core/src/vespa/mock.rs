//! In-memory [`IndexClient`] used by tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::error::VespaError;
use super::model::IndexedDocument;
use super::IndexClient;

/// Records feeds/deletes and replays canned search responses in order.
#[derive(Clone, Default)]
pub struct MockIndexClient {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    fed: Mutex<Vec<IndexedDocument>>,
    deleted: Mutex<Vec<String>>,
    search_bodies: Mutex<Vec<Value>>,
    search_responses: Mutex<VecDeque<Result<Value, String>>>,
    fail_feeds: Mutex<usize>,
}

impl MockIndexClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a canned response for the next search call.
    pub fn push_search_response(&self, response: Value) {
        self.inner
            .search_responses
            .lock()
            .push_back(Ok(response));
    }

    /// Queues a failure for the next search call.
    pub fn push_search_error(&self, message: &str) {
        self.inner
            .search_responses
            .lock()
            .push_back(Err(message.to_string()));
    }

    /// Makes the next `n` feed calls fail.
    pub fn fail_next_feeds(&self, n: usize) {
        *self.inner.fail_feeds.lock() = n;
    }

    pub fn fed_documents(&self) -> Vec<IndexedDocument> {
        self.inner.fed.lock().clone()
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.inner.deleted.lock().clone()
    }

    /// Query bodies seen so far, in call order.
    pub fn search_bodies(&self) -> Vec<Value> {
        self.inner.search_bodies.lock().clone()
    }
}

#[async_trait]
impl IndexClient for MockIndexClient {
    async fn search(&self, body: Value) -> Result<Value, VespaError> {
        self.inner.search_bodies.lock().push(body);
        match self.inner.search_responses.lock().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(VespaError::Transport(message)),
            // Default: an empty result set.
            None => Ok(json!({ "root": { "children": [] } })),
        }
    }

    async fn feed_document(&self, doc: &IndexedDocument) -> Result<(), VespaError> {
        {
            let mut fail = self.inner.fail_feeds.lock();
            if *fail > 0 {
                *fail -= 1;
                return Err(VespaError::Transport("injected feed failure".to_string()));
            }
        }
        self.inner.fed.lock().push(doc.clone());
        Ok(())
    }

    async fn delete_document(&self, doc_id: &str) -> Result<(), VespaError> {
        self.inner.deleted.lock().push(doc_id.to_string());
        Ok(())
    }
}
