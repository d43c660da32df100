//! Chat-platform abstraction.
//!
//! The ingest coordinator only ever talks to a [`MessageSource`]; the
//! concrete platform connector (MTProto session, export reader, …) is an
//! adapter implementing this trait. [`StubSource`] is the deterministic
//! in-memory implementation used by tests and `--source-stub` runs.

pub mod error;
pub mod model;
pub mod stub;


pub use error::SourceError;
pub use model::{ChatType, FetchOptions, ResolvedChat, SourceEvent, SourceMessage};
pub use stub::StubSource;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::broadcast;

/// Chat-selection entry naming the user's own saved-messages chat.
pub const SAVED_MESSAGES: &str = "<Saved Messages>";

/// Outcome of resolving one chat-selection entry.
pub type ChatResolution = (String, Result<ResolvedChat, SourceError>);

/// Connection to the external chat platform.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Connects and authenticates.
    async fn start(&self) -> Result<(), SourceError>;

    /// Disconnects.
    async fn stop(&self) -> Result<(), SourceError>;

    /// Resolves chat names/usernames/ids to concrete chats. Failures are
    /// reported per entry so one bad name does not abort a run.
    async fn resolve_chats(&self, names: &[String]) -> Vec<ChatResolution>;

    /// Lists every chat the account can see, as names usable with
    /// [`MessageSource::resolve_chats`].
    async fn get_all_chats(&self) -> Result<Vec<String>, SourceError>;

    /// Iterates a chat's history. Ordering follows `opts.reverse`.
    async fn iter_messages(
        &self,
        chat: &ResolvedChat,
        opts: FetchOptions,
    ) -> Result<BoxStream<'static, Result<SourceMessage, SourceError>>, SourceError>;

    /// Fetches a single message (used for reply context).
    async fn get_message_by_id(
        &self,
        chat: &ResolvedChat,
        message_id: i64,
    ) -> Result<Option<SourceMessage>, SourceError>;

    /// Subscribes to live new-message / message-edited events.
    fn subscribe_events(&self) -> broadcast::Receiver<SourceEvent>;

    /// Samples current connectivity (used by the connection watchdog).
    async fn is_connected(&self) -> bool;
}
