use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Orchestration limits, timeouts, and storage paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrent search workers per session.
    #[serde(default = "d_3")]
    pub max_workers: usize,
    /// Concurrent supervisor-triggered sub-researchers.
    #[serde(default = "d_3")]
    pub max_parallel_sub_researchers: usize,
    /// Supervisor diffusion-loop iteration cap.
    #[serde(default = "d_15")]
    pub supervisor_max_iterations: u32,
    /// Sub-researcher ReAct-loop iteration cap.
    #[serde(default = "d_8")]
    pub researcher_max_iterations: u32,
    /// Per-request (LLM/search/fetch) timeout.
    #[serde(default = "d_300")]
    pub request_timeout_secs: u64,
    /// Per-worker timeout.
    #[serde(default = "d_1800")]
    pub worker_timeout_secs: u64,
    /// Overall session timeout. Zero disables it.
    #[serde(default)]
    pub session_timeout_secs: u64,
    /// Event store root directory.
    #[serde(default = "d_store_path")]
    pub store_path: PathBuf,
    /// Report output directory (`RESEARCH_VAULT` overrides).
    #[serde(default = "d_vault_path")]
    pub vault_path: PathBuf,
    /// Debug logging (`RESEARCH_VERBOSE=true` overrides).
    #[serde(default)]
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: d_3(),
            max_parallel_sub_researchers: d_3(),
            supervisor_max_iterations: d_15(),
            researcher_max_iterations: d_8(),
            request_timeout_secs: d_300(),
            worker_timeout_secs: d_1800(),
            session_timeout_secs: 0,
            store_path: d_store_path(),
            vault_path: d_vault_path(),
            verbose: false,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_3() -> usize {
    3
}
fn d_15() -> u32 {
    15
}
fn d_8() -> u32 {
    8
}
fn d_300() -> u64 {
    300
}
fn d_1800() -> u64 {
    1800
}
fn d_store_path() -> PathBuf {
    PathBuf::from("./research-data")
}
fn d_vault_path() -> PathBuf {
    PathBuf::from("./research-vault")
}
