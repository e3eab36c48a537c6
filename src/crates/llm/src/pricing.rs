//! Per-token pricing tables and cost computation.
//!
//! Prices are per-token USD figures kept in one place so provider additions
//! or price changes are a data edit. Unknown (provider, model) pairs cost
//! zero rather than failing the workflow.

use crate::config::Provider;

/// (prompt price, completion price) per token in USD.
type TokenPrice = (f64, f64);

const OPENAI_PRICES: &[(&str, TokenPrice)] = &[
    ("gpt-4o", (0.000005, 0.000015)),
    ("gpt-4o-mini", (0.00000015, 0.0000006)),
    ("gpt-4-turbo", (0.000010, 0.000030)),
    ("gpt-4", (0.000030, 0.000060)),
    ("gpt-3.5-turbo", (0.0000005, 0.0000015)),
];

const ANTHROPIC_PRICES: &[(&str, TokenPrice)] = &[
    ("claude-3-5-sonnet", (0.000003, 0.000015)),
    ("claude-3-5-haiku", (0.0000008, 0.000004)),
    ("claude-3-opus", (0.000015, 0.000075)),
];

const DEEPSEEK_PRICES: &[(&str, TokenPrice)] = &[
    ("deepseek-chat", (0.00000027, 0.0000011)),
    ("deepseek-reasoner", (0.00000055, 0.00000219)),
];

/// Look up `(prompt_price, completion_price)` per token for a model.
///
/// Returns `(0.0, 0.0)` for unknown models so cost accounting degrades to
/// zero instead of erroring downstream.
pub fn price_per_token(provider: Provider, model: &str) -> TokenPrice {
    let table: &[(&str, TokenPrice)] = match provider {
        Provider::OpenAi => OPENAI_PRICES,
        Provider::Anthropic => ANTHROPIC_PRICES,
        Provider::Deepseek => DEEPSEEK_PRICES,
        // Local and unlisted providers are free by definition
        Provider::Google | Provider::Local => &[],
    };

    table
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, price)| *price)
        .unwrap_or((0.0, 0.0))
}

/// Compute the USD cost for the given token counts.
pub fn calculate_cost(
    provider: Provider,
    model: &str,
    prompt_tokens: u64,
    completion_tokens: u64,
) -> f64 {
    let (prompt_price, completion_price) = price_per_token(provider, model);
    prompt_price * prompt_tokens as f64 + completion_price * completion_tokens as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_cost() {
        // gpt-4: 30e-6 prompt, 60e-6 completion
        let cost = calculate_cost(Provider::OpenAi, "gpt-4", 1000, 500);
        assert!((cost - (0.03 + 0.03)).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_model_is_free() {
        assert_eq!(
            calculate_cost(Provider::OpenAi, "some-future-model", 1_000_000, 1_000_000),
            0.0
        );
        assert_eq!(price_per_token(Provider::Local, "llama3"), (0.0, 0.0));
    }

    #[test]
    fn test_zero_tokens_zero_cost() {
        assert_eq!(calculate_cost(Provider::Anthropic, "claude-3-opus", 0, 0), 0.0);
    }
}
