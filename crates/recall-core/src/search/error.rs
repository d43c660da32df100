use thiserror::Error;

use crate::embed::EmbedError;
use crate::vespa::VespaError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Index(#[from] VespaError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("malformed search response: {0}")]
    Malformed(String),
}
