//! Environment configuration.
//!
//! Every option is overridable by environment variable. Module-specific
//! configs ([`crate::embed::EmbedConfig`], [`crate::rerank::RerankConfig`],
//! [`crate::search::SearchConfig`]) follow the same pattern and reuse the
//! helpers here.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::env;

/// Shared service configuration: endpoints and versioning knobs used by both
/// the indexer and the API server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Search engine HTTP endpoint.
    pub vespa_endpoint: String,

    /// Postgres connection string for the durable chunk/embedding tables.
    /// Only the indexer requires it.
    pub database_url: Option<String>,

    /// Global chunking version; part of every chunk id and text hash.
    pub chunking_version: u32,

    /// Global preprocess version; part of every text hash.
    pub preprocess_version: u32,

    /// Token budget for spliced reply context.
    pub reply_context_tokens: usize,

    /// Target chunk window in tokens.
    pub target_chunk_tokens: usize,

    /// Overlap between consecutive chunk windows in tokens.
    pub chunk_overlap_tokens: usize,
}

pub const DEFAULT_VESPA_ENDPOINT: &str = "http://vespa:8080";

impl Default for Config {
    fn default() -> Self {
        Self {
            vespa_endpoint: DEFAULT_VESPA_ENDPOINT.to_string(),
            database_url: None,
            chunking_version: 1,
            preprocess_version: 1,
            reply_context_tokens: 120,
            target_chunk_tokens: 1000,
            chunk_overlap_tokens: 150,
        }
    }
}

impl Config {
    const ENV_VESPA_ENDPOINT: &'static str = "VESPA_ENDPOINT";
    const ENV_DATABASE_URL: &'static str = "DATABASE_URL";
    const ENV_CHUNKING_VERSION: &'static str = "CHUNKING_VERSION";
    const ENV_PREPROCESS_VERSION: &'static str = "PREPROCESS_VERSION";
    const ENV_REPLY_CONTEXT_TOKENS: &'static str = "REPLY_CONTEXT_TOKENS";
    const ENV_TARGET_CHUNK_TOKENS: &'static str = "TARGET_CHUNK_TOKENS";
    const ENV_CHUNK_OVERLAP_TOKENS: &'static str = "CHUNK_OVERLAP_TOKENS";

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            vespa_endpoint: string_from_env(Self::ENV_VESPA_ENDPOINT, defaults.vespa_endpoint)
                .trim_end_matches('/')
                .to_string(),
            database_url: optional_string_from_env(Self::ENV_DATABASE_URL),
            chunking_version: u32_from_env(Self::ENV_CHUNKING_VERSION, defaults.chunking_version),
            preprocess_version: u32_from_env(
                Self::ENV_PREPROCESS_VERSION,
                defaults.preprocess_version,
            ),
            reply_context_tokens: usize_from_env(
                Self::ENV_REPLY_CONTEXT_TOKENS,
                defaults.reply_context_tokens,
            ),
            target_chunk_tokens: usize_from_env(
                Self::ENV_TARGET_CHUNK_TOKENS,
                defaults.target_chunk_tokens,
            ),
            chunk_overlap_tokens: usize_from_env(
                Self::ENV_CHUNK_OVERLAP_TOKENS,
                defaults.chunk_overlap_tokens,
            ),
        })
    }

    /// The database URL, required for indexer runs.
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingVar {
                name: Self::ENV_DATABASE_URL,
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_chunk_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                name: Self::ENV_TARGET_CHUNK_TOKENS,
                value: "0".to_string(),
            });
        }
        if self.chunk_overlap_tokens >= self.target_chunk_tokens {
            return Err(ConfigError::InvalidValue {
                name: Self::ENV_CHUNK_OVERLAP_TOKENS,
                value: self.chunk_overlap_tokens.to_string(),
            });
        }
        Ok(())
    }
}

// Shared env parse helpers; module configs use these too.

pub fn string_from_env(var_name: &'static str, default: String) -> String {
    env::var(var_name).unwrap_or(default)
}

pub fn require_string_from_env(var_name: &'static str) -> Result<String, ConfigError> {
    env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar { name: var_name })
}

pub fn optional_string_from_env(var_name: &'static str) -> Option<String> {
    env::var(var_name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn u32_from_env(var_name: &'static str, default: u32) -> u32 {
    env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn u64_from_env(var_name: &'static str, default: u64) -> u64 {
    env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn usize_from_env(var_name: &'static str, default: usize) -> usize {
    env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn i64_from_env(var_name: &'static str, default: i64) -> i64 {
    env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn f64_from_env(var_name: &'static str, default: f64) -> f64 {
    env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn bool_from_env(var_name: &'static str, default: bool) -> bool {
    match env::var(var_name) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}
