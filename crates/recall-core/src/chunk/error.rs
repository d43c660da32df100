use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("cannot chunk empty or whitespace-only text")]
    EmptyInput,

    #[error("tokenizer failed to decode a chunk window: {0}")]
    Decode(String),
}
