//! Price tables for the external model providers.
//!
//! Prices are USD per million tokens and need a manual bump when the
//! providers change them.

/// Returns the embedding price per million tokens for `model`.
///
/// Unknown models fall back to a conservative middle-ground price so the
/// budget gate still engages.
pub fn embed_price_per_million(model: &str) -> f64 {
    match model {
        "text-embedding-3-large" => 0.13,
        "text-embedding-3-small" => 0.02,
        "text-embedding-ada-002" => 0.10,
        _ => 0.10,
    }
}

/// Input/output completion prices per million tokens for a chat model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatPrice {
    pub input: f64,
    pub output: f64,
}

/// Returns the completion price table entry for `model`.
///
/// Unknown models are priced as the flagship tier.
pub fn chat_price(model: &str) -> ChatPrice {
    match model {
        "gpt-5" => ChatPrice {
            input: 1.25,
            output: 10.00,
        },
        "gpt-5-mini" => ChatPrice {
            input: 0.25,
            output: 2.00,
        },
        "gpt-5-nano" => ChatPrice {
            input: 0.05,
            output: 0.40,
        },
        _ => ChatPrice {
            input: 1.25,
            output: 10.00,
        },
    }
}

/// Estimates completion cost in USD.
pub fn estimate_chat_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    let price = chat_price(model);
    (prompt_tokens as f64 / 1_000_000.0) * price.input
        + (completion_tokens as f64 / 1_000_000.0) * price.output
}

/// Rough token estimate for embedding inputs (≈ 1.3 tokens per word).
pub fn estimate_embed_tokens(text: &str) -> f64 {
    text.split_whitespace().count() as f64 * 1.3
}

/// Estimates embedding cost in USD for a batch of texts.
pub fn estimate_embed_cost(texts: &[&str], model: &str) -> (f64, f64) {
    let tokens: f64 = texts.iter().map(|t| estimate_embed_tokens(t)).sum();
    let cost = (tokens / 1_000_000.0) * embed_price_per_million(model);
    (tokens, cost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_prices() {
        assert_eq!(embed_price_per_million("text-embedding-3-small"), 0.02);
        assert_eq!(embed_price_per_million("text-embedding-3-large"), 0.13);
        assert_eq!(embed_price_per_million("unknown-model"), 0.10);
    }

    #[test]
    fn test_chat_cost_estimate() {
        // 1M prompt + 1M completion on gpt-5-mini = 0.25 + 2.00
        let cost = estimate_chat_cost("gpt-5-mini", 1_000_000, 1_000_000);
        assert!((cost - 2.25).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_chat_model_uses_flagship_pricing() {
        assert_eq!(chat_price("gpt-42"), chat_price("gpt-5"));
    }

    #[test]
    fn test_embed_token_estimate() {
        let (tokens, cost) = estimate_embed_cost(&["one two three four"], "text-embedding-3-small");
        assert!((tokens - 5.2).abs() < 1e-9);
        assert!(cost > 0.0);
    }

    #[test]
    fn test_empty_batch_costs_nothing() {
        let (tokens, cost) = estimate_embed_cost(&[], "text-embedding-3-large");
        assert_eq!(tokens, 0.0);
        assert_eq!(cost, 0.0);
    }
}
