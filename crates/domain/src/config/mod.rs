mod context;
mod engine;
mod llm;

pub use context::*;
pub use engine::*;
pub use llm::*;

use std::fmt;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

impl Config {
    /// Overlay environment variables onto the loaded config.
    ///
    /// `RESEARCH_VAULT` overrides the report output directory and
    /// `RESEARCH_VERBOSE=true` enables debug logging. API keys are
    /// resolved from the configured env var names at capability-adapter
    /// construction time, not here.
    pub fn apply_env(&mut self) {
        if let Ok(vault) = std::env::var("RESEARCH_VAULT") {
            if !vault.trim().is_empty() {
                self.engine.vault_path = vault.into();
            }
        }
        if let Ok(verbose) = std::env::var("RESEARCH_VERBOSE") {
            if verbose.trim().eq_ignore_ascii_case("true") {
                self.engine.verbose = true;
            }
        }
    }

    /// Validate the configuration, returning all issues found.
    ///
    /// Errors are fatal at startup (missing API keys); warnings are
    /// logged and ignored.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if std::env::var(&self.llm.api_key_env)
            .map(|v| v.trim().is_empty())
            .unwrap_or(true)
        {
            issues.push(ConfigIssue::error(
                "llm.api_key_env",
                format!("environment variable {} is not set", self.llm.api_key_env),
            ));
        }
        if std::env::var(&self.search.api_key_env)
            .map(|v| v.trim().is_empty())
            .unwrap_or(true)
        {
            issues.push(ConfigIssue::error(
                "search.api_key_env",
                format!("environment variable {} is not set", self.search.api_key_env),
            ));
        }

        if self.engine.max_workers == 0 {
            issues.push(ConfigIssue::error(
                "engine.max_workers",
                "must be at least 1".to_string(),
            ));
        }
        if self.engine.max_parallel_sub_researchers == 0 {
            issues.push(ConfigIssue::error(
                "engine.max_parallel_sub_researchers",
                "must be at least 1".to_string(),
            ));
        }
        if !(self.context.fold_threshold > 0.0 && self.context.fold_threshold <= 1.0) {
            issues.push(ConfigIssue::error(
                "context.fold_threshold",
                format!("{} is outside (0, 1]", self.context.fold_threshold),
            ));
        }
        if self.context.summary_levels < 2 {
            issues.push(ConfigIssue::warning(
                "context.summary_levels",
                "fewer than 2 levels disables deep folding".to_string(),
            ));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn error(field: &str, message: String) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.to_owned(),
            message,
        }
    }

    fn warning(field: &str, message: String) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.to_owned(),
            message,
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}
