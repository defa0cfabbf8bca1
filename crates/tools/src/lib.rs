//! Named tools with a JSON-argument contract, plus the inline markup
//! the model uses to invoke them.

pub mod files;
pub mod markup;
pub mod registry;
pub mod think;
pub mod web;

pub use files::{AnalyzeCsvTool, ReadDocumentTool};
pub use markup::{
    extract_answer, extract_first_json, extract_thought, parse_tool_calls, render_tool_call,
    ParsedCall,
};
pub use registry::{Tool, ToolRegistry};
pub use think::ThinkTool;
pub use web::{FetchTool, SearchTool, UrlHarvester};

/// Supervisor-only tool names. These are dispatched by the supervisor
/// loop itself and are never registered as executables.
pub const CONDUCT_RESEARCH: &str = "conduct_research";
pub const REFINE_DRAFT: &str = "refine_draft";
pub const RESEARCH_COMPLETE: &str = "research_complete";
pub const THINK: &str = "think";
