use thiserror::Error;

#[derive(Debug, Error)]
pub enum VespaError {
    #[error("search engine request failed: {0}")]
    Transport(String),

    #[error("search engine returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("feed failed after {attempts} attempts: {last_error}")]
    FeedExhausted { attempts: u32, last_error: String },

    #[error("malformed search engine response: {0}")]
    Malformed(String),
}
