//! The answerer: rate limit, reformulate, retrieve, prompt, stream.

pub mod llm;
pub mod model;
pub mod prompt;
pub mod rate_limit;
pub mod usage;

#[cfg(test)]
mod tests;

pub use llm::{LlmClient, LlmError};
pub use model::{ChatCitation, ChatFilters, ChatMessage, ChatRequest, ChatUsage, StreamChunk};
pub use rate_limit::ChatRateLimiter;

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use recall::config::{bool_from_env, optional_string_from_env, u64_from_env, usize_from_env};
use recall::{SearchEngine, SearchRequest};

use crate::models::resolve_model_id;

/// Fixed reply when retrieval finds nothing.
const NO_DATA_MESSAGE: &str = "I don't see this information in your Telegram data.";

/// System prompt template; `{current_datetime}` is substituted per request.
const SYSTEM_PROMPT: &str = include_str!("../../prompts/system_chat.txt");

/// Reformulation prompt template with `{history}` / `{question}` slots.
const REFORMULATION_PROMPT: &str = include_str!("../../prompts/reformulation_prompt.txt");

/// Buffered chunks between the producer task and the SSE writer.
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Answerer configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub rate_limit_rpm: usize,
    pub max_context_tokens: usize,
    pub reformulation_model: Option<String>,
    /// Accepted for config-surface compatibility; the answer pipeline always
    /// retrieves.
    pub search_decision_model: Option<String>,
    /// Use the deterministic stub LLM.
    pub llm_stub: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            rate_limit_rpm: 30,
            max_context_tokens: 50_000,
            reformulation_model: None,
            search_decision_model: None,
            llm_stub: false,
        }
    }
}

impl ChatConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rate_limit_rpm: usize_from_env("CHAT_RATE_LIMIT_RPM", defaults.rate_limit_rpm),
            max_context_tokens: u64_from_env(
                "CHAT_MAX_CONTEXT_TOKENS",
                defaults.max_context_tokens as u64,
            ) as usize,
            reformulation_model: optional_string_from_env("CHAT_REFORMULATION_MODEL"),
            search_decision_model: optional_string_from_env("CHAT_SEARCH_DECISION_MODEL"),
            llm_stub: bool_from_env("LLM_STUB", defaults.llm_stub),
        }
    }
}

/// Streaming RAG answerer.
pub struct ChatService {
    engine: Arc<SearchEngine>,
    llm: LlmClient,
    config: ChatConfig,
    rate_limiter: ChatRateLimiter,
}

impl ChatService {
    pub fn new(engine: Arc<SearchEngine>, llm: LlmClient, config: ChatConfig) -> Self {
        let rate_limiter = ChatRateLimiter::new(config.rate_limit_rpm, 60);
        Self {
            engine,
            llm,
            config,
            rate_limiter,
        }
    }

    /// Runs one chat request, streaming chunks to the returned receiver.
    ///
    /// The stream always terminates with exactly one `end` or `error` chunk;
    /// a dropped receiver (client disconnect) aborts the producer.
    pub fn chat_stream(
        self: &Arc<Self>,
        request: ChatRequest,
        user_id: String,
    ) -> ReceiverStream<StreamChunk> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let service = Arc::clone(self);

        tokio::spawn(async move {
            service.run(request, user_id, tx).await;
        });

        ReceiverStream::new(rx)
    }

    async fn run(&self, request: ChatRequest, user_id: String, tx: mpsc::Sender<StreamChunk>) {
        let started = Instant::now();

        if let Err(retry_after) = self.rate_limiter.check(&user_id) {
            let secs = retry_after.as_secs();
            let _ = tx
                .send(StreamChunk::Error {
                    content: format!("Rate limit exceeded. Retry after {} seconds.", secs),
                    retry_after_seconds: Some(secs),
                })
                .await;
            return;
        }

        let model_id = resolve_model_id(request.model_id.as_deref());
        let history = request.history.clone().unwrap_or_default();

        // Reformulation happens only with history; failures keep the query.
        let mut query = request.q.clone();
        if !history.is_empty() {
            let reformulated = self.reformulate(&request.q, &history, model_id).await;
            if reformulated != request.q {
                info!(original = %request.q, reformulated = %reformulated, "query reformulated");
                if tx
                    .send(StreamChunk::Reformulate {
                        content: Some("Enhanced query based on conversation".to_string()),
                        reformulated_query: reformulated.clone(),
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                query = reformulated;
            }
        }

        let search_request = build_search_request(&request, &query);
        let results = self.engine.search(&search_request).await;

        if tx
            .send(StreamChunk::Search {
                content: Some(format!("Found {} relevant messages", results.len())),
                search_results_count: results.len(),
            })
            .await
            .is_err()
        {
            return;
        }

        if results.is_empty() {
            let _ = tx
                .send(StreamChunk::Content {
                    content: NO_DATA_MESSAGE.to_string(),
                })
                .await;
            let _ = tx
                .send(StreamChunk::End {
                    usage: ChatUsage::zero(),
                    timing_seconds: elapsed_seconds(started),
                    citations: Some(Vec::new()),
                })
                .await;
            return;
        }

        let (context, selected) = prompt::assemble_context(&results);
        let messages = prompt::build_messages(SYSTEM_PROMPT, &history, &context, &query);

        if tx
            .send(StreamChunk::Start {
                content: Some("Generating response...".to_string()),
            })
            .await
            .is_err()
        {
            return;
        }

        let mut stream = match self.llm.stream(model_id, messages.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "completion stream init failed");
                let _ = tx
                    .send(StreamChunk::Error {
                        content: format!("Error: {}", e),
                        retry_after_seconds: None,
                    })
                    .await;
                return;
            }
        };

        let mut completion = String::new();
        while let Some(delta) = stream.next().await {
            match delta {
                Ok(content) => {
                    completion.push_str(&content);
                    if tx.send(StreamChunk::Content { content }).await.is_err() {
                        // Client went away; stop pulling from the provider.
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "completion stream failed");
                    let _ = tx
                        .send(StreamChunk::Error {
                            content: format!("Error: {}", e),
                            retry_after_seconds: None,
                        })
                        .await;
                    return;
                }
            }
        }

        let citations: Vec<ChatCitation> = selected
            .iter()
            .filter_map(|&idx| results.get(idx))
            .map(ChatCitation::from_result)
            .collect();

        if tx
            .send(StreamChunk::Citations {
                citations: citations.clone(),
            })
            .await
            .is_err()
        {
            return;
        }

        let usage = usage::estimate_usage(model_id, &messages, &completion);
        let _ = tx
            .send(StreamChunk::End {
                usage,
                timing_seconds: elapsed_seconds(started),
                citations: None,
            })
            .await;
    }

    /// History-aware query rewriting; any failure returns the original.
    async fn reformulate(&self, question: &str, history: &[ChatMessage], model_id: &str) -> String {
        if history.is_empty() {
            return question.to_string();
        }

        let model = self
            .config
            .reformulation_model
            .as_deref()
            .unwrap_or(model_id);
        let rendered = prompt::render_reformulation_prompt(REFORMULATION_PROMPT, history, question);

        match self
            .llm
            .complete(model, vec![prompt::PromptMessage::user(rendered)])
            .await
        {
            Ok(reformulated) => {
                let trimmed = reformulated.trim();
                if trimmed.is_empty() {
                    question.to_string()
                } else {
                    trimmed.to_string()
                }
            }
            Err(e) => {
                warn!(error = %e, "query reformulation failed");
                question.to_string()
            }
        }
    }
}

/// Maps a chat request onto the retrieval request it implies.
fn build_search_request(request: &ChatRequest, query: &str) -> SearchRequest {
    let mut search_request = SearchRequest::new(query);
    search_request.limit = request.k.clamp(1, 30);
    search_request.hybrid = true;
    search_request.expansion_level = request.expansion_level;

    if let Some(filters) = &request.filters {
        if let Some(chat_ids) = &filters.chat_ids {
            search_request.chat_id = chat_ids.first().cloned();
        }
        search_request.thread_id = filters.thread_id;
    }

    search_request
}

fn elapsed_seconds(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 100.0).round() / 100.0
}
