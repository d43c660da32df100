//! Hybrid retrieval engine: seed search, dedupe, context expansion, and
//! optional rerank.

pub mod dedupe;
pub mod error;
pub mod expand;
pub mod model;
pub mod query;


pub use error::SearchError;
pub use expand::{ExpandConfig, NeighborMessage};
pub use model::{CandidateSnippet, ChatInfo, SearchRequest, SearchResult, Seed, Span};

use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::{optional_string_from_env, usize_from_env, u32_from_env, u64_from_env};
use crate::embed::{EmbedItem, EmbeddingProvider};
use crate::hashing::text_hash;
use crate::rerank::{RerankConfig, Reranker};
use crate::vespa::IndexClient;

/// Retrieval knobs.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub seed_limit: usize,
    pub seeds_per_chat: Option<usize>,
    pub dedupe_message_gap: i64,
    pub dedupe_time_gap_seconds: i64,
    pub neighbor_message_window: i64,
    pub neighbor_time_window_minutes: i64,
    pub neighbor_min_messages: usize,
    pub candidate_max_messages: usize,
    pub candidate_token_limit: usize,
    pub context_max_return: usize,
    pub expansion_max_level: u32,
    pub expansion_seed_step: usize,
    pub expansion_result_step: usize,
    pub expansion_rerank_step: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            seed_limit: 30,
            seeds_per_chat: None,
            dedupe_message_gap: 10,
            dedupe_time_gap_seconds: 120,
            neighbor_message_window: 15,
            neighbor_time_window_minutes: 45,
            neighbor_min_messages: 5,
            candidate_max_messages: 80,
            candidate_token_limit: 1800,
            context_max_return: 25,
            expansion_max_level: 3,
            expansion_seed_step: 30,
            expansion_result_step: 5,
            expansion_rerank_step: 40,
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_limit: usize_from_env("SEARCH_DEFAULT_LIMIT", defaults.default_limit),
            seed_limit: usize_from_env("SEARCH_SEED_LIMIT", defaults.seed_limit),
            seeds_per_chat: optional_string_from_env("SEARCH_SEEDS_PER_CHAT")
                .and_then(|v| v.parse().ok()),
            dedupe_message_gap: u64_from_env(
                "SEARCH_SEED_DEDUPE_MESSAGE_GAP",
                defaults.dedupe_message_gap as u64,
            ) as i64,
            dedupe_time_gap_seconds: u64_from_env(
                "SEARCH_SEED_DEDUPE_TIME_GAP_SECONDS",
                defaults.dedupe_time_gap_seconds as u64,
            ) as i64,
            neighbor_message_window: u64_from_env(
                "SEARCH_NEIGHBOR_MESSAGE_WINDOW",
                defaults.neighbor_message_window as u64,
            ) as i64,
            neighbor_time_window_minutes: u64_from_env(
                "SEARCH_NEIGHBOR_TIME_WINDOW_MINUTES",
                defaults.neighbor_time_window_minutes as u64,
            ) as i64,
            neighbor_min_messages: usize_from_env(
                "SEARCH_NEIGHBOR_MIN_MESSAGES",
                defaults.neighbor_min_messages,
            ),
            candidate_max_messages: usize_from_env(
                "SEARCH_CANDIDATE_MAX_MESSAGES",
                defaults.candidate_max_messages,
            )
            .max(1),
            candidate_token_limit: usize_from_env(
                "SEARCH_CANDIDATE_TOKEN_LIMIT",
                defaults.candidate_token_limit,
            ),
            context_max_return: usize_from_env(
                "SEARCH_CONTEXT_MAX_RETURN",
                defaults.context_max_return,
            )
            .max(1),
            expansion_max_level: u32_from_env(
                "SEARCH_EXPANSION_MAX_LEVEL",
                defaults.expansion_max_level,
            ),
            expansion_seed_step: usize_from_env(
                "SEARCH_EXPANSION_SEED_STEP",
                defaults.expansion_seed_step,
            ),
            expansion_result_step: usize_from_env(
                "SEARCH_EXPANSION_RESULT_STEP",
                defaults.expansion_result_step,
            ),
            expansion_rerank_step: usize_from_env(
                "SEARCH_EXPANSION_RERANK_STEP",
                defaults.expansion_rerank_step,
            ),
        }
    }

    fn expand_config(&self) -> ExpandConfig {
        ExpandConfig {
            message_window: self.neighbor_message_window,
            time_window_minutes: self.neighbor_time_window_minutes,
            min_messages: self.neighbor_min_messages,
            max_messages: self.candidate_max_messages,
            token_limit: self.candidate_token_limit,
        }
    }
}

/// Budgets at a given expansion level; all three grow monotonically with the
/// level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionBudgets {
    pub result_limit: usize,
    pub seed_limit: usize,
    pub rerank_limit: usize,
}

impl ExpansionBudgets {
    pub fn for_level(
        config: &SearchConfig,
        rerank_candidate_limit: usize,
        request_limit: usize,
        level: u32,
    ) -> Self {
        let level = level.min(config.expansion_max_level) as usize;
        Self {
            result_limit: (request_limit + level * config.expansion_result_step)
                .min(config.context_max_return),
            seed_limit: config.seed_limit + level * config.expansion_seed_step,
            rerank_limit: rerank_candidate_limit + level * config.expansion_rerank_step,
        }
    }
}

/// The multi-stage retrieval pipeline.
pub struct SearchEngine {
    index: Arc<dyn IndexClient>,
    query_embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Reranker>,
    config: SearchConfig,
    rerank_candidate_limit: usize,
}

impl SearchEngine {
    pub fn new(
        index: Arc<dyn IndexClient>,
        query_embedder: Arc<dyn EmbeddingProvider>,
        config: SearchConfig,
        rerank_config: &RerankConfig,
    ) -> Self {
        Self {
            index,
            query_embedder,
            reranker: Reranker::from_config(rerank_config),
            config,
            rerank_candidate_limit: rerank_config.candidate_limit,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Runs the full pipeline. Downstream failures degrade to an empty
    /// result list; they never surface to the HTTP caller.
    pub async fn search(&self, request: &SearchRequest) -> Vec<SearchResult> {
        if request.q.trim().is_empty() {
            return Vec::new();
        }

        let budgets = ExpansionBudgets::for_level(
            &self.config,
            self.rerank_candidate_limit,
            request.limit.max(1),
            request.expansion_level,
        );

        // Query embedding; failure degrades to lexical-only.
        let query_vector = if request.hybrid {
            match self.embed_query(&request.q).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    warn!(error = %e, "query embedding failed, falling back to BM25 only");
                    None
                }
            }
        } else {
            None
        };

        let body = query::build_seed_query(
            &request.q,
            budgets.seed_limit,
            request.chat_id.as_deref(),
            request.thread_id,
            query_vector.as_deref(),
            self.query_embedder.model(),
        );

        let response = match self.index.search(body).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "seed search failed");
                return Vec::new();
            }
        };

        let seeds = parse_seeds(&response);
        debug!(seeds = seeds.len(), "seed search parsed");
        if seeds.is_empty() {
            return Vec::new();
        }

        let mut seeds = dedupe::dedupe_seeds(
            seeds,
            self.config.dedupe_message_gap,
            self.config.dedupe_time_gap_seconds * 1000,
        );
        if let Some(per_chat) = self.config.seeds_per_chat {
            seeds = dedupe::cap_seeds_per_chat(seeds, per_chat);
        }

        let candidates = self.expand_all(&seeds).await;
        let mut candidates = sort_candidates(candidates);

        if let Some(reranker) = &self.reranker {
            candidates.truncate(budgets.rerank_limit);
            candidates = reranker
                .rerank(&request.q, candidates, budgets.result_limit)
                .await;
        }

        candidates.truncate(budgets.result_limit);
        candidates.into_iter().map(SearchResult::from).collect()
    }

    /// Lists chats via index aggregation, sampling one document per chat for
    /// the title.
    pub async fn get_available_chats(&self) -> Result<Vec<ChatInfo>, SearchError> {
        let response = self
            .index
            .search(query::build_chat_aggregation_query())
            .await?;

        let mut chats = Vec::new();
        for (chat_id, count) in parse_chat_counts(&response) {
            let (source_title, chat_type) = match self
                .index
                .search(query::build_chat_title_query(&chat_id))
                .await
            {
                Ok(title_response) => parse_chat_title(&title_response),
                Err(e) => {
                    warn!(chat_id = %chat_id, error = %e, "chat title lookup failed");
                    (None, None)
                }
            };

            chats.push(ChatInfo {
                source_title: Some(
                    source_title.unwrap_or_else(|| format!("Chat {}", chat_id)),
                ),
                chat_id,
                chat_type,
                message_count: count,
            });
        }

        Ok(chats)
    }

    async fn embed_query(&self, q: &str) -> Result<Vec<f32>, SearchError> {
        let item = EmbedItem {
            text: q.to_string(),
            text_hash: text_hash(q, self.query_embedder.model(), 0, 0, None),
        };
        let mut vectors = self.query_embedder.embed_batch(&[item]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| SearchError::Malformed("empty embedding response".to_string()))?;

        let expected = self.query_embedder.dimension();
        if vector.len() != expected {
            warn!(
                got = vector.len(),
                expected,
                "query vector dimension mismatch"
            );
        }
        Ok(vector)
    }

    /// One neighbour query per seed, fanned out concurrently. A failed
    /// expansion drops that seed's candidate only.
    async fn expand_all(&self, seeds: &[Seed]) -> Vec<CandidateSnippet> {
        let expand_config = self.config.expand_config();
        let futures = seeds.iter().map(|seed| {
            let index = Arc::clone(&self.index);
            async move {
                match expand::expand_seed(&index, seed, &expand_config).await {
                    Ok(candidate) => candidate,
                    Err(e) => {
                        warn!(seed_id = seed.message_id, chat_id = %seed.chat_id, error = %e, "context expansion failed");
                        None
                    }
                }
            }
        });

        join_all(futures).await.into_iter().flatten().collect()
    }
}

/// Parses seed-search hits, dropping malformed entries.
pub fn parse_seeds(response: &Value) -> Vec<Seed> {
    response
        .pointer("/root/children")
        .and_then(Value::as_array)
        .map(|hits| hits.iter().filter_map(Seed::from_hit).collect())
        .unwrap_or_default()
}

/// Stable pre-rerank ordering: `(message_date desc, seed_score desc)`.
fn sort_candidates(mut candidates: Vec<CandidateSnippet>) -> Vec<CandidateSnippet> {
    candidates.sort_by(|a, b| {
        b.seed
            .message_date_ms
            .cmp(&a.seed.message_date_ms)
            .then_with(|| {
                b.seed_score
                    .partial_cmp(&a.seed_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    });
    candidates
}

fn parse_chat_counts(response: &Value) -> Vec<(String, i64)> {
    let mut counts = Vec::new();

    let Some(groups) = response.pointer("/root/children").and_then(Value::as_array) else {
        return counts;
    };
    for group_list in groups {
        if group_list.get("id").and_then(Value::as_str) != Some("group:root:0") {
            continue;
        }
        let Some(chat_lists) = group_list.get("children").and_then(Value::as_array) else {
            continue;
        };
        for chat_list in chat_lists {
            if chat_list.get("label").and_then(Value::as_str) != Some("chat_id") {
                continue;
            }
            let Some(chat_groups) = chat_list.get("children").and_then(Value::as_array) else {
                continue;
            };
            for chat_group in chat_groups {
                let Some(chat_id) = chat_group.get("value").and_then(Value::as_str) else {
                    continue;
                };
                let count = chat_group
                    .pointer("/fields/count()")
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                counts.push((chat_id.to_string(), count));
            }
        }
    }

    counts
}

fn parse_chat_title(response: &Value) -> (Option<String>, Option<String>) {
    let Some(first_hit) = response
        .pointer("/root/children/0/fields")
    else {
        return (None, None);
    };

    let title = first_hit
        .get("source_title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let chat_type = first_hit
        .get("chat_type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    (title, chat_type)
}
