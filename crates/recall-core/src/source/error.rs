use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source is not connected")]
    NotConnected,

    #[error("failed to resolve chat {name:?}: {message}")]
    ResolveFailed { name: String, message: String },

    #[error("source transport error: {0}")]
    Transport(String),
}
