//! # Recall
//!
//! Retrieval and indexing engine for a personal chat-message corpus.
//!
//! Recall ingests chat messages, slices them into token-aware chunks,
//! embeds them through a content-addressed cache, and feeds a hybrid
//! (lexical + dense) search index. At query time it retrieves seeds,
//! deduplicates them, grows each one into a conversational window, and
//! optionally reranks the snippets before they reach the answering LLM.
//!
//! ```text
//! message → normalize → chunk → embed (cache) → index
//! query   → seeds → dedupe → expand → rerank? → snippets
//! ```
//!
//! ## Modules
//!
//! - [`chunk`] - Token-aware sliding-window splitter
//! - [`config`] - Environment-backed configuration
//! - [`embed`] - Batched, budget-guarded embedding with caching
//! - [`normalize`] - Text cleanup, headers, reply splicing
//! - [`rerank`] - Optional cross-encoder rerank
//! - [`search`] - Hybrid retrieval engine
//! - [`source`] - Chat-platform abstraction
//! - [`state`] - Resumable-backfill checkpoints
//! - [`store`] - Durable chunk + embedding-cache tables
//! - [`vespa`] - Search engine client
//!
//! The `mock` feature exposes in-memory index/store doubles for downstream
//! test suites.

pub mod chunk;
pub mod config;
pub mod embed;
pub mod hashing;
pub mod normalize;
pub mod pricing;
pub mod rerank;
pub mod search;
pub mod source;
pub mod state;
pub mod store;
pub mod vespa;

pub use chunk::{ChunkError, ChunkText, Chunker, count_tokens};
pub use config::{Config, ConfigError};
pub use embed::{
    EmbedConfig, EmbedError, EmbedItem, Embedder, EmbeddingProvider, OpenAiEmbeddings,
    StubEmbeddings, model_dimension,
};
pub use hashing::{bytes_to_vector, text_hash, vector_to_bytes};
pub use normalize::{NormalizedText, compose_with_reply, create_header, normalize_text};
pub use rerank::{RerankConfig, Reranker};
pub use search::{
    CandidateSnippet, ChatInfo, ExpansionBudgets, SearchConfig, SearchEngine, SearchError,
    SearchRequest, SearchResult, Seed, Span,
};
pub use source::{
    ChatType, FetchOptions, MessageSource, ResolvedChat, SAVED_MESSAGES, SourceError, SourceEvent,
    SourceMessage, StubSource,
};
pub use state::{BackfillRecord, BackfillStateStore};
pub use store::{CachedEmbedding, ChunkRecord, PgStore, Store, StoreError};
#[cfg(any(test, feature = "mock"))]
pub use store::MockStore;
pub use vespa::{FeedMetrics, IndexClient, IndexedDocument, VespaClient, VespaError};
#[cfg(any(test, feature = "mock"))]
pub use vespa::MockIndexClient;
