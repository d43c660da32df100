use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {name} is not set")]
    MissingVar { name: &'static str },

    #[error("invalid value {value:?} for {name}")]
    InvalidValue { name: &'static str, value: String },

    #[error("unsupported embedding model {model:?} (expected text-embedding-3-small or text-embedding-3-large)")]
    UnsupportedEmbedModel { model: String },
}
