use serde::{Deserialize, Serialize};

use crate::cost::PricingTable;

/// Chat-completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint base URL.
    #[serde(default = "d_base_url")]
    pub base_url: String,
    /// Env var holding the API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    /// Default model id, e.g. `"anthropic/claude-sonnet-4"`.
    #[serde(default = "d_model")]
    pub model: String,
    /// Cheaper model used for context folding and summaries. Falls back
    /// to `model` when empty.
    #[serde(default)]
    pub summarizer_model: String,
    /// Sampling temperature for agent turns.
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    /// Per-model pricing with fallback.
    #[serde(default)]
    pub pricing: PricingTable,
}

impl LlmConfig {
    pub fn summarizer(&self) -> &str {
        if self.summarizer_model.is_empty() {
            &self.model
        } else {
            &self.summarizer_model
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            model: d_model(),
            summarizer_model: String::new(),
            temperature: d_temperature(),
            pricing: PricingTable::default(),
        }
    }
}

/// Web-search provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "d_search_url")]
    pub base_url: String,
    /// Env var holding the API key.
    #[serde(default = "d_search_key_env")]
    pub api_key_env: String,
    /// Results requested per query.
    #[serde(default = "d_count")]
    pub results_per_query: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: d_search_url(),
            api_key_env: d_search_key_env(),
            results_per_query: d_count(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn d_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn d_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn d_temperature() -> f32 {
    0.3
}
fn d_search_url() -> String {
    "https://api.search.brave.com/res/v1/web/search".into()
}
fn d_search_key_env() -> String {
    "BRAVE_API_KEY".into()
}
fn d_count() -> usize {
    5
}
