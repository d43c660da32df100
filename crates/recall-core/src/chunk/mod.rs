//! Token-aware sliding-window chunker.
//!
//! Long messages are split into overlapping windows sized in tokens, each
//! prefixed with the message header. Non-final windows are snapped back to a
//! sentence or word boundary so chunks do not end mid-thought.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ChunkError;

use std::sync::OnceLock;

use tiktoken_rs::{CoreBPE, cl100k_base};

/// Default window size in tokens.
pub const DEFAULT_TARGET_TOKENS: usize = 1000;

/// Default overlap between consecutive windows in tokens.
pub const DEFAULT_OVERLAP_TOKENS: usize = 150;

/// One chunk of a message: the indexed text (with header) and the lexical
/// text (without header) for the BM25 field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkText {
    pub full_text: String,
    pub lexical_text: String,
}

fn tokenizer() -> &'static CoreBPE {
    static TOKENIZER: OnceLock<CoreBPE> = OnceLock::new();
    TOKENIZER.get_or_init(|| cl100k_base().expect("failed to initialize cl100k tokenizer"))
}

/// Counts tokens in `text` with the shared cl100k tokenizer.
pub fn count_tokens(text: &str) -> usize {
    tokenizer().encode_ordinary(text).len()
}

/// Token-aware splitter with overlap and boundary snapping.
#[derive(Debug, Clone)]
pub struct Chunker {
    target_tokens: usize,
    overlap_tokens: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_TOKENS, DEFAULT_OVERLAP_TOKENS)
    }
}

impl Chunker {
    /// Creates a chunker with explicit window and overlap sizes.
    pub fn new(target_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            target_tokens: target_tokens.max(1),
            overlap_tokens,
        }
    }

    /// Splits `text` into chunks, prepending `header` to each.
    ///
    /// Returns a single chunk when the whole message fits in one window.
    /// Fails with [`ChunkError::EmptyInput`] only for whitespace-only input.
    pub fn chunk_text(&self, text: &str, header: &str) -> Result<Vec<ChunkText>, ChunkError> {
        if text.trim().is_empty() {
            return Err(ChunkError::EmptyInput);
        }

        let bpe = tokenizer();
        let header_prefix = if header.is_empty() {
            String::new()
        } else {
            format!("{}\n\n", header)
        };

        let total_tokens = count_tokens(&format!("{}{}", header_prefix, text));
        if total_tokens <= self.target_tokens {
            return Ok(vec![ChunkText {
                full_text: format!("{}{}", header_prefix, text),
                lexical_text: text.to_string(),
            }]);
        }

        let text_tokens = bpe.encode_ordinary(text);
        let header_len = if header_prefix.is_empty() {
            0
        } else {
            bpe.encode_ordinary(&header_prefix).len()
        };
        // Always leave room for at least one content token per window.
        let available = self.target_tokens.saturating_sub(header_len).max(1);

        // BPE token boundaries are byte boundaries, so a window sliced out
        // of the middle of a message can start or end inside a multi-byte
        // character. Trim the offending edge token and retry: trailing
        // first (the common case), then leading.
        let decode_window = |start: usize, end: usize| -> Result<String, ChunkError> {
            let mut last_err = String::new();
            for (drop_front, drop_back) in [(0usize, 0usize), (0, 1), (1, 0), (1, 1)] {
                let lo = start + drop_front;
                let hi = end.saturating_sub(drop_back);
                if lo >= hi {
                    break;
                }
                match bpe.decode(text_tokens[lo..hi].to_vec()) {
                    Ok(s) => return Ok(s),
                    Err(e) => last_err = e.to_string(),
                }
            }
            Err(ChunkError::Decode(last_err))
        };

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < text_tokens.len() {
            let end = (start + available).min(text_tokens.len());
            let is_final = end >= text_tokens.len();

            let mut window = decode_window(start, end)?;
            if !is_final {
                window = snap_boundary(&window);
            }

            chunks.push(ChunkText {
                full_text: format!("{}{}", header_prefix, window),
                lexical_text: window,
            });

            if is_final {
                break;
            }
            start = (start + available.saturating_sub(self.overlap_tokens)).max(start + 1);
        }

        Ok(chunks)
    }
}

/// Trims a non-final chunk back to the last natural boundary.
///
/// Sentence ends are accepted within the final 20% of the text, a plain
/// space within the final 10%, and an unclosed code fence is cut when it
/// opens after 70%.
fn snap_boundary(text: &str) -> String {
    for delimiter in [". ", "! ", "? ", "\n\n"] {
        if let Some(pos) = text.rfind(delimiter) {
            if pos as f64 > text.len() as f64 * 0.8 {
                return text[..pos + delimiter.len()].to_string();
            }
        }
    }

    if let Some(pos) = text.rfind(' ') {
        if pos as f64 > text.len() as f64 * 0.9 {
            return text[..pos].to_string();
        }
    }

    if let Some(pos) = text.rfind("```") {
        if pos as f64 > text.len() as f64 * 0.7 {
            return text[..pos].to_string();
        }
    }

    text.to_string()
}
