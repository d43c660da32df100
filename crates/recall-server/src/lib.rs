//! HTTP API and streaming chat answerer for the Recall engine.
//!
//! This crate is primarily used by the `recall-api` server binary.

pub mod api;
pub mod chat;
pub mod models;

pub use api::{ApiError, AppState, create_router};
pub use chat::{ChatConfig, ChatService, LlmClient, StreamChunk};
