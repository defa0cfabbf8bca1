use serde::{Deserialize, Serialize};

/// Context manager budgets (per agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token budget before the context must be folded.
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    /// Working-memory turn capacity (FIFO eviction past this).
    #[serde(default = "d_working_mem")]
    pub working_mem_size: usize,
    /// Fold when `current_tokens / max_tokens` reaches this ratio.
    #[serde(default = "d_threshold")]
    pub fold_threshold: f64,
    /// Number of hierarchical summary levels.
    #[serde(default = "d_levels")]
    pub summary_levels: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: d_max_tokens(),
            working_mem_size: d_working_mem(),
            fold_threshold: d_threshold(),
            summary_levels: d_levels(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_max_tokens() -> u32 {
    24_000
}
fn d_working_mem() -> usize {
    20
}
fn d_threshold() -> f64 {
    0.75
}
fn d_levels() -> usize {
    3
}
