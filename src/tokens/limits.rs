//! Model limit tables.
//!
//! Published context-window sizes and default tokens-per-minute quotas for
//! common models. Lookups strip an optional `provider/` prefix and match the
//! longest known prefix, so `openai/gpt-4o-2024-08-06` resolves to `gpt-4o`.

use std::collections::HashMap;

/// Context window used when a model is not in the table.
pub const DEFAULT_CONTEXT_WINDOW: usize = 128_000;

/// Tokens-per-minute quota used when a model is not in the table.
pub const DEFAULT_TPM: u64 = 30_000;

/// Known context window sizes in tokens.
pub const KNOWN_CONTEXT_WINDOWS: &[(&str, usize)] = &[
    // OpenAI
    ("gpt-4o", 128_000),
    ("gpt-4o-mini", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4.1-mini", 1_047_576),
    ("gpt-4-turbo", 128_000),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo", 16_385),
    ("o1", 200_000),
    ("o3", 200_000),
    // Anthropic
    ("claude-3", 200_000),
    ("claude-3.5-sonnet", 200_000),
    // Google
    ("gemini-2.0-flash", 1_048_576),
    ("gemini-2.5-flash", 1_048_576),
    // Open weights
    ("deepseek-r1", 64_000),
    ("deepseek-chat", 64_000),
    ("qwen-2.5-72b-instruct", 32_768),
];

/// Default tokens-per-minute quotas.
pub const KNOWN_TPM: &[(&str, u64)] = &[
    ("gpt-4o", 30_000),
    ("gpt-4o-mini", 200_000),
    ("gpt-4.1", 30_000),
    ("gpt-4.1-mini", 200_000),
    ("o1", 30_000),
    ("deepseek-r1", 100_000),
    ("deepseek-chat", 40_000),
    ("gemini-2.0-flash", 2_000_000),
    ("gemini-2.5-flash", 1_000_000),
    ("qwen-2.5-72b-instruct", 100_000),
    ("claude-3.5-sonnet", 80_000),
];

/// Strips a `provider/` prefix and lowercases the model identifier.
#[must_use]
pub fn normalize_model(model: &str) -> String {
    let base = model.rsplit('/').next().unwrap_or(model);
    base.trim().to_lowercase()
}

/// Finds the entry whose key is the longest prefix of `model`.
fn lookup<V: Copy>(table: &[(&str, V)], model: &str) -> Option<V> {
    let normalized = normalize_model(model);
    table
        .iter()
        .filter(|(key, _)| normalized.starts_with(key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, value)| *value)
}

/// Returns the published context window for `model`, if known.
#[must_use]
pub fn known_context_window(model: &str) -> Option<usize> {
    lookup(KNOWN_CONTEXT_WINDOWS, model)
}

/// Returns the default tokens-per-minute quota for `model`, if known.
#[must_use]
pub fn known_tpm(model: &str) -> Option<u64> {
    lookup(KNOWN_TPM, model)
}

/// Per-model overrides layered over the built-in tables.
///
/// Override keys are matched exactly (after normalization) before falling
/// back to the built-in prefix table and then the default.
#[derive(Debug, Clone)]
pub struct LimitTable<V> {
    overrides: HashMap<String, V>,
    builtin: fn(&str) -> Option<V>,
    default: V,
}

impl<V: Copy> LimitTable<V> {
    /// Resolves the limit for `model`.
    pub fn resolve(&self, model: &str) -> V {
        self.overrides
            .get(&normalize_model(model))
            .copied()
            .or_else(|| (self.builtin)(model))
            .unwrap_or(self.default)
    }
}

impl LimitTable<usize> {
    /// Context-window table with the given overrides.
    #[must_use]
    pub fn context_windows(overrides: &HashMap<String, usize>, default: usize) -> Self {
        Self {
            overrides: normalize_keys(overrides),
            builtin: known_context_window,
            default,
        }
    }
}

impl LimitTable<u64> {
    /// Tokens-per-minute table with the given overrides.
    #[must_use]
    pub fn tpm(overrides: &HashMap<String, u64>, default: u64) -> Self {
        Self {
            overrides: normalize_keys(overrides),
            builtin: known_tpm,
            default,
        }
    }
}

fn normalize_keys<V: Copy>(map: &HashMap<String, V>) -> HashMap<String, V> {
    map.iter()
        .map(|(key, value)| (normalize_model(key), *value))
        .collect()
}
