//! Deterministic in-memory message source.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::error::SourceError;
use super::model::{ChatType, FetchOptions, ResolvedChat, SourceEvent, SourceMessage};
use super::{ChatResolution, MessageSource, SAVED_MESSAGES};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// In-memory [`MessageSource`] with a seeded corpus and injectable events.
#[derive(Clone)]
pub struct StubSource {
    inner: Arc<StubInner>,
}

struct StubInner {
    chats: Mutex<Vec<ResolvedChat>>,
    messages: Mutex<HashMap<String, Vec<SourceMessage>>>,
    events: broadcast::Sender<SourceEvent>,
    connected: AtomicBool,
}

impl Default for StubSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StubSource {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(StubInner {
                chats: Mutex::new(Vec::new()),
                messages: Mutex::new(HashMap::new()),
                events,
                connected: AtomicBool::new(true),
            }),
        }
    }

    /// Seeds a chat and its message history (kept sorted by id).
    pub fn push_chat(&self, chat: ResolvedChat, mut messages: Vec<SourceMessage>) {
        messages.sort_by_key(|m| m.message_id);
        self.inner
            .messages
            .lock()
            .insert(chat.chat_id.clone(), messages);
        self.inner.chats.lock().push(chat);
    }

    /// Appends one message to an already-seeded chat.
    pub fn push_message(&self, message: SourceMessage) {
        let mut messages = self.inner.messages.lock();
        let list = messages.entry(message.chat_id.clone()).or_default();
        list.push(message);
        list.sort_by_key(|m| m.message_id);
    }

    /// Emits a live event to every subscriber.
    pub fn emit(&self, event: SourceEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Flips the connectivity flag sampled by [`MessageSource::is_connected`].
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    fn find_chat(&self, name: &str) -> Option<ResolvedChat> {
        let chats = self.inner.chats.lock();
        chats
            .iter()
            .find(|c| {
                c.title == name
                    || c.chat_id == name
                    || c.username.as_deref() == Some(name)
                    || (name == SAVED_MESSAGES && c.chat_type == ChatType::Saved)
            })
            .cloned()
    }
}

#[async_trait]
impl MessageSource for StubSource {
    async fn start(&self) -> Result<(), SourceError> {
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SourceError> {
        self.inner.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn resolve_chats(&self, names: &[String]) -> Vec<ChatResolution> {
        names
            .iter()
            .map(|name| {
                let resolved = self.find_chat(name).ok_or_else(|| SourceError::ResolveFailed {
                    name: name.clone(),
                    message: "unknown chat".to_string(),
                });
                (name.clone(), resolved)
            })
            .collect()
    }

    async fn get_all_chats(&self) -> Result<Vec<String>, SourceError> {
        let chats = self.inner.chats.lock();
        Ok(chats
            .iter()
            .map(|c| {
                if c.chat_type == ChatType::Saved {
                    SAVED_MESSAGES.to_string()
                } else {
                    c.title.clone()
                }
            })
            .collect())
    }

    async fn iter_messages(
        &self,
        chat: &ResolvedChat,
        opts: FetchOptions,
    ) -> Result<BoxStream<'static, Result<SourceMessage, SourceError>>, SourceError> {
        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(SourceError::NotConnected);
        }

        let mut selected: Vec<SourceMessage> = {
            let messages = self.inner.messages.lock();
            messages.get(&chat.chat_id).cloned().unwrap_or_default()
        };

        if let Some(since) = opts.since {
            selected.retain(|m| m.message_date >= since);
        }
        if let Some(min_id) = opts.min_id {
            selected.retain(|m| m.message_id > min_id);
        }
        if opts.reverse {
            selected.sort_by_key(|m| m.message_id);
        } else {
            selected.sort_by_key(|m| std::cmp::Reverse(m.message_id));
        }
        if let Some(limit) = opts.limit {
            selected.truncate(limit);
        }

        Ok(stream::iter(selected.into_iter().map(Ok)).boxed())
    }

    async fn get_message_by_id(
        &self,
        chat: &ResolvedChat,
        message_id: i64,
    ) -> Result<Option<SourceMessage>, SourceError> {
        let messages = self.inner.messages.lock();
        Ok(messages
            .get(&chat.chat_id)
            .and_then(|list| list.iter().find(|m| m.message_id == message_id).cloned()))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<SourceEvent> {
        self.inner.events.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}
