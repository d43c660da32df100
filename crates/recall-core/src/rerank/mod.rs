//! Optional cross-encoder reranking of candidate snippets.
//!
//! Enabled only when a provider key is configured (or stub mode is on).
//! Provider failures never fail a query: the original retrieval order is
//! returned, truncated to the requested size.

pub mod error;


pub use error::RerankError;

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::{bool_from_env, optional_string_from_env, string_from_env, usize_from_env};
use crate::search::CandidateSnippet;

const RERANK_ENDPOINT: &str = "https://api.voyageai.com/v1/rerank";
const CLIENT_TIMEOUT_SECS: u64 = 20;

/// Rerank configuration.
#[derive(Debug, Clone)]
pub struct RerankConfig {
    pub enabled: bool,
    pub model: String,
    pub candidate_limit: usize,
    pub api_key: Option<String>,
    pub stub: bool,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "rerank-2".to_string(),
            candidate_limit: 40,
            api_key: None,
            stub: false,
        }
    }
}

impl RerankConfig {
    const ENV_ENABLED: &'static str = "RERANK_ENABLED";
    const ENV_MODEL: &'static str = "RERANK_MODEL";
    const ENV_CANDIDATE_LIMIT: &'static str = "RERANK_CANDIDATE_LIMIT";
    const ENV_API_KEY: &'static str = "VOYAGE_API_KEY";
    const ENV_STUB: &'static str = "RERANK_STUB";

    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: bool_from_env(Self::ENV_ENABLED, defaults.enabled),
            model: string_from_env(Self::ENV_MODEL, defaults.model),
            candidate_limit: usize_from_env(Self::ENV_CANDIDATE_LIMIT, defaults.candidate_limit)
                .max(1),
            api_key: optional_string_from_env(Self::ENV_API_KEY),
            stub: bool_from_env(Self::ENV_STUB, defaults.stub),
        }
    }
}

enum RerankBackend {
    Remote {
        client: reqwest::Client,
        api_key: String,
        model: String,
    },
    Stub,
}

/// Second-stage scorer over `(query, snippet)` pairs.
pub struct Reranker {
    backend: RerankBackend,
}

impl Reranker {
    /// Builds a reranker from config; `None` when reranking stays disabled.
    ///
    /// Enabling the flag without a provider key logs a warning and keeps
    /// first-stage ranking.
    pub fn from_config(config: &RerankConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        if config.stub {
            return Some(Self {
                backend: RerankBackend::Stub,
            });
        }
        match &config.api_key {
            Some(api_key) => {
                let client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(CLIENT_TIMEOUT_SECS))
                    .build()
                    .unwrap_or_default();
                Some(Self {
                    backend: RerankBackend::Remote {
                        client,
                        api_key: api_key.clone(),
                        model: config.model.clone(),
                    },
                })
            }
            None => {
                warn!("rerank enabled but no provider key configured, keeping retrieval ranking");
                None
            }
        }
    }

    /// Creates a stub reranker directly (tests).
    pub fn stub() -> Self {
        Self {
            backend: RerankBackend::Stub,
        }
    }

    /// Reranks candidates and returns the top `top_n`.
    ///
    /// On provider failure the original order is returned, truncated.
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<CandidateSnippet>,
        top_n: usize,
    ) -> Vec<CandidateSnippet> {
        if candidates.is_empty() || query.trim().is_empty() {
            candidates.truncate(top_n);
            return candidates;
        }

        match &self.backend {
            RerankBackend::Stub => stub_rerank(query, candidates, top_n),
            RerankBackend::Remote {
                client,
                api_key,
                model,
            } => {
                match remote_rerank(client, api_key, model, query, &candidates, top_n).await {
                    Ok(scored) => apply_remote_scores(candidates, scored, top_n),
                    Err(e) => {
                        warn!(error = %e, "rerank failed, keeping retrieval order");
                        candidates.truncate(top_n);
                        candidates
                    }
                }
            }
        }
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankHit {
    index: usize,
    relevance_score: f64,
}

async fn remote_rerank(
    client: &reqwest::Client,
    api_key: &str,
    model: &str,
    query: &str,
    candidates: &[CandidateSnippet],
    top_n: usize,
) -> Result<Vec<RerankHit>, RerankError> {
    let request = RerankRequest {
        model,
        query,
        documents: candidates.iter().map(|c| c.text.as_str()).collect(),
        top_n: top_n.min(candidates.len()),
    };

    let response = client
        .post(RERANK_ENDPOINT)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await
        .map_err(|e| RerankError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RerankError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        });
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| RerankError::Malformed(e.to_string()))?;
    let hits = body
        .get("data")
        .or_else(|| body.get("results"))
        .cloned()
        .ok_or_else(|| RerankError::Malformed("missing data array".to_string()))?;

    serde_json::from_value(hits).map_err(|e| RerankError::Malformed(e.to_string()))
}

/// Applies provider `(index, score)` pairs, backfilling unseen candidates in
/// original order.
fn apply_remote_scores(
    candidates: Vec<CandidateSnippet>,
    scored: Vec<RerankHit>,
    top_n: usize,
) -> Vec<CandidateSnippet> {
    let mut candidates: Vec<Option<CandidateSnippet>> = candidates.into_iter().map(Some).collect();
    let mut reranked = Vec::with_capacity(top_n);
    let mut seen: HashSet<usize> = HashSet::new();

    for hit in scored {
        if hit.index >= candidates.len() || seen.contains(&hit.index) {
            continue;
        }
        seen.insert(hit.index);
        if let Some(mut candidate) = candidates[hit.index].take() {
            candidate.rerank_score = Some(hit.relevance_score);
            reranked.push(candidate);
        }
        if reranked.len() >= top_n {
            break;
        }
    }

    if reranked.len() < top_n {
        for candidate in candidates.into_iter().flatten() {
            reranked.push(candidate);
            if reranked.len() >= top_n {
                break;
            }
        }
    }

    reranked.truncate(top_n);
    reranked
}

/// Stub: ranks by query-token overlap ratio, ties by retrieval score.
fn stub_rerank(
    query: &str,
    candidates: Vec<CandidateSnippet>,
    top_n: usize,
) -> Vec<CandidateSnippet> {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        let mut candidates = candidates;
        candidates.truncate(top_n);
        return candidates;
    }

    let mut scored: Vec<(f64, f64, CandidateSnippet)> = candidates
        .into_iter()
        .map(|candidate| {
            let doc_tokens = tokenize(&candidate.text);
            let overlap = query_tokens.intersection(&doc_tokens).count();
            let ratio = overlap as f64 / query_tokens.len().max(1) as f64;
            (ratio, candidate.retrieval_score, candidate)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
    });

    scored
        .into_iter()
        .take(top_n)
        .map(|(ratio, _, mut candidate)| {
            candidate.rerank_score = (ratio > 0.0).then_some(ratio);
            candidate
        })
        .collect()
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
