//! Batched, budget-guarded embedding with a content-addressed cache.
//!
//! Flow per call: probe the cache for every text, cost the misses, enforce
//! the daily budget *before* any network traffic, then embed misses in
//! bounded-concurrency batches with exponential backoff and write the
//! results back to the cache.

pub mod error;
pub mod provider;


pub use error::EmbedError;
pub use provider::{EmbedItem, EmbeddingProvider, OpenAiEmbeddings, StubEmbeddings};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::{
    ConfigError, bool_from_env, f64_from_env, optional_string_from_env, require_string_from_env,
    string_from_env, u64_from_env, usize_from_env,
};
use crate::hashing::{bytes_to_vector, text_hash, vector_to_bytes};
use crate::pricing::estimate_embed_cost;
use crate::store::{CachedEmbedding, Store};

/// Retry attempts per batch.
const MAX_ATTEMPTS: u32 = 3;

/// Supported embedding models and their dimensions.
pub const EMBED_MODEL_SMALL: &str = "text-embedding-3-small";
pub const EMBED_MODEL_LARGE: &str = "text-embedding-3-large";
pub const EMBED_DIM_SMALL: usize = 1536;
pub const EMBED_DIM_LARGE: usize = 3072;

/// Returns the expected dimension for a supported model.
pub fn model_dimension(model: &str) -> Result<usize, ConfigError> {
    match model {
        EMBED_MODEL_SMALL => Ok(EMBED_DIM_SMALL),
        EMBED_MODEL_LARGE => Ok(EMBED_DIM_LARGE),
        other => Err(ConfigError::UnsupportedEmbedModel {
            model: other.to_string(),
        }),
    }
}

/// Embedding configuration.
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    pub model: String,
    pub batch_size: usize,
    pub concurrency: usize,
    /// 0 disables the budget gate.
    pub daily_budget_usd: f64,
    pub backoff_base_ms: u64,
    /// Use the deterministic stub provider instead of the remote API.
    pub stub: bool,
    pub openai_api_key: Option<String>,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model: EMBED_MODEL_LARGE.to_string(),
            batch_size: 64,
            concurrency: 4,
            daily_budget_usd: 0.0,
            backoff_base_ms: 500,
            stub: false,
            openai_api_key: None,
        }
    }
}

impl EmbedConfig {
    const ENV_MODEL: &'static str = "EMBED_MODEL";
    const ENV_BATCH_SIZE: &'static str = "EMBED_BATCH_SIZE";
    const ENV_CONCURRENCY: &'static str = "EMBED_CONCURRENCY";
    const ENV_BUDGET: &'static str = "DAILY_EMBED_BUDGET_USD";
    const ENV_BACKOFF_BASE_MS: &'static str = "BACKOFF_BASE_MS";
    const ENV_STUB: &'static str = "OPENAI_STUB";
    const ENV_API_KEY: &'static str = "OPENAI_API_KEY";

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let stub = bool_from_env(Self::ENV_STUB, defaults.stub);

        let openai_api_key = if stub {
            optional_string_from_env(Self::ENV_API_KEY)
        } else {
            Some(require_string_from_env(Self::ENV_API_KEY)?)
        };

        let config = Self {
            model: string_from_env(Self::ENV_MODEL, defaults.model),
            batch_size: usize_from_env(Self::ENV_BATCH_SIZE, defaults.batch_size).max(1),
            concurrency: usize_from_env(Self::ENV_CONCURRENCY, defaults.concurrency).max(1),
            daily_budget_usd: f64_from_env(Self::ENV_BUDGET, defaults.daily_budget_usd),
            backoff_base_ms: u64_from_env(Self::ENV_BACKOFF_BASE_MS, defaults.backoff_base_ms),
            stub,
            openai_api_key,
        };

        model_dimension(&config.model)?;
        Ok(config)
    }

    /// Builds the configured provider.
    pub fn build_provider(&self) -> Result<Arc<dyn EmbeddingProvider>, ConfigError> {
        let dimension = model_dimension(&self.model)?;
        if self.stub {
            return Ok(Arc::new(StubEmbeddings::new(self.model.clone(), dimension)));
        }
        let api_key = self
            .openai_api_key
            .clone()
            .ok_or(ConfigError::MissingVar {
                name: Self::ENV_API_KEY,
            })?;
        Ok(Arc::new(OpenAiEmbeddings::new(
            api_key,
            self.model.clone(),
            dimension,
        )))
    }
}

/// Counters exposed by the embedder; shared across the daemon's lifetime.
#[derive(Debug, Default)]
pub struct EmbedMetrics {
    pub calls: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub total_tokens: AtomicU64,
    /// Accumulated cost estimate in micro-dollars.
    pub cost_micro_usd: AtomicU64,
}

impl EmbedMetrics {
    pub fn cost_usd(&self) -> f64 {
        self.cost_micro_usd.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        }
    }
}

/// Batched embedder with cache probing and a budget ceiling.
pub struct Embedder {
    store: Arc<dyn Store>,
    provider: Arc<dyn EmbeddingProvider>,
    config: EmbedConfig,
    chunking_version: u32,
    preprocess_version: u32,
    metrics: Arc<EmbedMetrics>,
}

impl Embedder {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn EmbeddingProvider>,
        config: EmbedConfig,
        chunking_version: u32,
        preprocess_version: u32,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            chunking_version,
            preprocess_version,
            metrics: Arc::new(EmbedMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<EmbedMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Computes the cache key for `text` under the current versioning knobs.
    pub fn text_hash(&self, text: &str) -> String {
        text_hash(
            text,
            self.provider.model(),
            self.chunking_version,
            self.preprocess_version,
            None,
        )
    }

    /// Embeds `texts`, serving cache hits without provider traffic.
    ///
    /// Returns `(text_hash, vector)` pairs in input order. In dry-run mode
    /// only the cache hits are returned and the misses are merely costed.
    /// Fails with [`EmbedError::BudgetExceeded`] before any network call
    /// when the estimated miss cost reaches the configured daily budget.
    pub async fn embed_texts(
        &self,
        texts: &[String],
        dry_run: bool,
    ) -> Result<Vec<(String, Vec<f32>)>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<(String, Vec<f32>)>> = vec![None; texts.len()];
        let mut misses: Vec<(usize, EmbedItem)> = Vec::new();

        for (idx, text) in texts.iter().enumerate() {
            let hash = self.text_hash(text);
            match self.store.get_cached_embedding(&hash).await? {
                Some(cached) if cached.model == self.provider.model() => {
                    self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                    results[idx] = Some((hash, bytes_to_vector(&cached.vector)));
                }
                _ => {
                    self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
                    misses.push((
                        idx,
                        EmbedItem {
                            text: text.clone(),
                            text_hash: hash,
                        },
                    ));
                }
            }
        }

        if misses.is_empty() {
            info!(count = texts.len(), "all embeddings served from cache");
            return Ok(results.into_iter().flatten().collect());
        }

        let miss_texts: Vec<&str> = misses.iter().map(|(_, item)| item.text.as_str()).collect();
        let (tokens, estimated_cost) = estimate_embed_cost(&miss_texts, self.provider.model());
        self.metrics
            .total_tokens
            .fetch_add(tokens as u64, Ordering::Relaxed);
        self.metrics
            .cost_micro_usd
            .fetch_add((estimated_cost * 1_000_000.0) as u64, Ordering::Relaxed);

        info!(
            misses = misses.len(),
            hits = texts.len() - misses.len(),
            tokens = tokens as u64,
            cost_usd = estimated_cost,
            "embedding cache misses costed"
        );

        if dry_run {
            info!("dry run, skipping embedding calls");
            return Ok(results.into_iter().flatten().collect());
        }

        let budget = self.config.daily_budget_usd;
        if budget > 0.0 && estimated_cost >= budget {
            warn!(
                estimated_usd = estimated_cost,
                budget_usd = budget,
                texts = misses.len(),
                "embedding budget exceeded"
            );
            return Err(EmbedError::BudgetExceeded {
                estimated_usd: estimated_cost,
                budget_usd: budget,
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let batches: Vec<Vec<(usize, EmbedItem)>> = misses
            .chunks(self.config.batch_size)
            .map(|c| c.to_vec())
            .collect();
        let batch_count = batches.len();

        let futures = batches.into_iter().map(|batch| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                // Semaphore is never closed while we hold it.
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let items: Vec<EmbedItem> = batch.iter().map(|(_, item)| item.clone()).collect();
                let vectors = self.embed_batch_with_retry(&items).await?;
                Ok::<_, EmbedError>(
                    batch
                        .into_iter()
                        .zip(vectors)
                        .map(|((idx, item), vector)| (idx, item, vector))
                        .collect::<Vec<_>>(),
                )
            }
        });

        for batch_result in join_all(futures).await {
            for (idx, item, vector) in batch_result? {
                if vector.len() != self.provider.dimension() {
                    warn!(
                        got = vector.len(),
                        expected = self.provider.dimension(),
                        model = self.provider.model(),
                        "vector dimension mismatch"
                    );
                }

                self.store
                    .cache_embedding(&CachedEmbedding {
                        text_hash: item.text_hash.clone(),
                        model: self.provider.model().to_string(),
                        dim: vector.len() as i32,
                        vector: vector_to_bytes(&vector),
                        lang: None,
                        chunking_version: self.chunking_version as i32,
                        preprocess_version: self.preprocess_version as i32,
                    })
                    .await?;

                results[idx] = Some((item.text_hash, vector));
            }
        }

        self.metrics
            .calls
            .fetch_add(batch_count as u64, Ordering::Relaxed);

        Ok(results.into_iter().flatten().collect())
    }

    async fn embed_batch_with_retry(
        &self,
        batch: &[EmbedItem],
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut attempt = 0;
        loop {
            match self.provider.embed_batch(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_transient() && attempt + 1 < MAX_ATTEMPTS => {
                    let wait = Duration::from_millis(self.config.backoff_base_ms << attempt);
                    warn!(attempt = attempt + 1, error = %e, wait_ms = wait.as_millis() as u64, "embedding batch failed, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
