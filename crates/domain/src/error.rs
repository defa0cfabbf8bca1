/// Shared error type used across all Fathom crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("config: {0}")]
    Config(String),

    /// Transient LLM/search/fetch failure. Propagated to the owning agent;
    /// retries, if any, live at orchestration level.
    #[error("capability {capability}: {message}")]
    Capability { capability: String, message: String },

    /// A command was rejected by the aggregate. Surfaces synchronously to
    /// the orchestrator and never becomes an event.
    #[error("validation: {0}")]
    Validation(String),

    /// Optimistic concurrency check failed in the event store. The caller
    /// must reload events and retry the command.
    #[error("version conflict on {aggregate_id}: expected {expected}, found {actual}")]
    VersionConflict {
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("tool {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    /// Fold target outside `[0, levels-2]`. Callers downgrade to a
    /// granular fold.
    #[error("invalid fold target {target} (levels: {levels})")]
    InvalidFoldTarget { target: usize, levels: usize },

    #[error("worker {worker_id}: {message}")]
    Worker { worker_id: String, message: String },

    #[error("phase {phase} failed: {message}")]
    Phase { phase: String, message: String },

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn capability(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Capability {
            capability: capability.into(),
            message: message.into(),
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
