//! Upstream LLM access: genai-backed client plus a deterministic stub.

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use genai::Client;
use genai::chat::{ChatMessage as GenaiMessage, ChatRequest, ChatStreamEvent};
use thiserror::Error;
use tracing::error;

use super::prompt::{PromptMessage, PromptRole};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// Upstream chat-completion client.
///
/// The stub variant answers deterministically from the last user turn and is
/// selected at startup for tests and offline runs.
pub enum LlmClient {
    Genai(Client),
    Stub,
}

impl LlmClient {
    pub fn genai() -> Self {
        Self::Genai(Client::default())
    }

    fn to_genai_request(messages: Vec<PromptMessage>) -> ChatRequest {
        let converted: Vec<GenaiMessage> = messages
            .into_iter()
            .map(|m| match m.role {
                PromptRole::System => GenaiMessage::system(m.content),
                PromptRole::User => GenaiMessage::user(m.content),
                PromptRole::Assistant => GenaiMessage::assistant(m.content),
            })
            .collect();
        ChatRequest::new(converted)
    }

    /// Non-streaming completion; returns the first text block.
    pub async fn complete(
        &self,
        model: &str,
        messages: Vec<PromptMessage>,
    ) -> Result<String, LlmError> {
        match self {
            LlmClient::Genai(client) => {
                let request = Self::to_genai_request(messages);
                let response = client
                    .exec_chat(model, request, None)
                    .await
                    .map_err(|e| LlmError::Provider(e.to_string()))?;
                Ok(response.first_text().unwrap_or_default().to_string())
            }
            LlmClient::Stub => Ok(stub_completion(&last_user_content(&messages))),
        }
    }

    /// Streaming completion; yields content deltas.
    pub async fn stream(
        &self,
        model: &str,
        messages: Vec<PromptMessage>,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        match self {
            LlmClient::Genai(client) => {
                let request = Self::to_genai_request(messages);
                let response = client
                    .exec_chat_stream(model, request, None)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "provider stream init failed");
                        LlmError::Provider(e.to_string())
                    })?;

                let deltas = response.stream.filter_map(|event| async move {
                    match event {
                        Ok(ChatStreamEvent::Chunk(chunk)) => {
                            if chunk.content.is_empty() {
                                None
                            } else {
                                Some(Ok(chunk.content))
                            }
                        }
                        Ok(ChatStreamEvent::Start) => None,
                        Ok(ChatStreamEvent::End(_)) => None,
                        Ok(_) => None,
                        Err(e) => Some(Err(LlmError::Stream(e.to_string()))),
                    }
                });
                Ok(deltas.boxed())
            }
            LlmClient::Stub => {
                let content = stub_completion(&last_user_content(&messages));
                let words: Vec<Result<String, LlmError>> = content
                    .split_inclusive(' ')
                    .map(|w| Ok(w.to_string()))
                    .collect();
                Ok(futures_util::stream::iter(words).boxed())
            }
        }
    }
}

fn last_user_content(messages: &[PromptMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == PromptRole::User)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// Deterministic canned answer derived from the prompt.
fn stub_completion(last_user: &str) -> String {
    let preview: String = last_user.chars().take(120).collect();
    format!("Stub answer based on: {}", preview.trim())
}
