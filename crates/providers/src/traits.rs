use std::path::Path;

use fathom_domain::error::Result;
use fathom_domain::message::Message;
use fathom_domain::stream::{BoxStream, StreamEvent, Usage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Model identifier override. `None` uses the adapter default.
    pub model: Option<String>,
}

impl ChatRequest {
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }
}

/// A provider-agnostic chat completion response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Textual content of the response.
    pub content: String,
    /// Token usage reported by the provider.
    pub usage: Option<Usage>,
    /// The model that actually produced the response.
    pub model: String,
    /// Why the model stopped (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// One ranked web-search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capability traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// LLM chat capability.
///
/// Both paths fail with `Error::Capability` on transport or non-success
/// responses; callers propagate without retrying (retries, if any, live
/// at orchestration level). Streamed usage is not trustworthy — callers
/// estimate tokens from accumulated character counts.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// Send a chat completion request and return a stream of events.
    async fn chat_stream(&self, req: ChatRequest)
        -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// The model id used when a request carries none.
    fn default_model(&self) -> &str;
}

/// Web-search capability. Implementations MUST deduplicate results by
/// URL across the query batch; ordering is provider-defined but stable
/// within one call.
#[async_trait::async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, queries: &[String]) -> Result<Vec<SearchResult>>;
}

/// URL-to-text capability. Fails on unreachable URLs; never follows
/// JavaScript.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Local document reading capability.
#[async_trait::async_trait]
pub trait DocReader: Send + Sync {
    async fn read(&self, path: &Path) -> Result<String>;
}
