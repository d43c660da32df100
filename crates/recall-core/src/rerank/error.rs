use thiserror::Error;

#[derive(Debug, Error)]
pub enum RerankError {
    #[error("rerank request failed: {0}")]
    Transport(String),

    #[error("rerank provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed rerank response: {0}")]
    Malformed(String),
}
