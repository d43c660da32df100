//! Local token/cost estimation for answers whose stream carried no usage.

use recall::count_tokens;
use recall::pricing::estimate_chat_cost;

use super::model::ChatUsage;
use super::prompt::PromptMessage;

/// Per-message prompt overhead applied by the provider (ChatML framing).
/// An approximation, stated as such.
pub const TOKENS_PER_MESSAGE_OVERHEAD: u64 = 4;

/// Final assistant-priming overhead.
pub const TOKENS_FINAL_OVERHEAD: u64 = 2;

/// Estimates usage from the prompt messages and the accumulated completion.
pub fn estimate_usage(model: &str, messages: &[PromptMessage], completion: &str) -> ChatUsage {
    let prompt_tokens: u64 = messages
        .iter()
        .map(|m| count_tokens(&m.content) as u64 + TOKENS_PER_MESSAGE_OVERHEAD)
        .sum::<u64>()
        + TOKENS_FINAL_OVERHEAD;

    let completion_tokens = if completion.is_empty() {
        0
    } else {
        count_tokens(completion) as u64
    };

    let cost = estimate_chat_cost(model, prompt_tokens, completion_tokens);

    ChatUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
        cost_usd: Some((cost * 1e6).round() / 1e6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overheads_applied() {
        let messages = vec![PromptMessage::system("a"), PromptMessage::user("b")];
        let usage = estimate_usage("gpt-5", &messages, "");

        // One token per single-letter message, plus 4 each, plus 2 final.
        assert_eq!(usage.prompt_tokens, 1 + 4 + 1 + 4 + 2);
        assert_eq!(usage.completion_tokens, 0);
        assert_eq!(usage.total_tokens, usage.prompt_tokens);
    }

    #[test]
    fn test_completion_counted() {
        let usage = estimate_usage("gpt-5-mini", &[PromptMessage::user("hi")], "hello world");
        assert!(usage.completion_tokens >= 2);
        assert_eq!(
            usage.total_tokens,
            usage.prompt_tokens + usage.completion_tokens
        );
        assert!(usage.cost_usd.unwrap() > 0.0);
    }
}
