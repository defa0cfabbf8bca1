//! Scripted capability fakes for scenario tests.
//!
//! The chat fake dispatches on the system prompt of each request, so
//! one instance can play planner, researcher, supervisor, analyst, and
//! writer in a single session.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use fathom_domain::error::{Error, Result};
use fathom_domain::stream::{BoxStream, StreamEvent, Usage};
use fathom_providers::{
    ChatClient, ChatRequest, ChatResponse, DocReader, Fetcher, SearchResult, Searcher,
};

pub const PLAN_JSON: &str = r#"{"topic": "Foo Café", "perspectives": [
    {"name": "Historian", "focus": "origins", "seed_questions": ["when did it open?"]},
    {"name": "Economist", "focus": "finances", "seed_questions": ["how was it funded?"]}
]}"#;

pub const ANALYSIS_JSON: &str = r#"{"validated_facts": [
    {"content": "Foo Café opened in 1906", "confidence": 0.9,
     "corroborated_by": ["https://one.example/a", "https://two.example/b"]}
], "contradictions": [], "knowledge_gaps": ["interior design history"]}"#;

pub const SYNTHESIS_JSON: &str = r#"{"title": "The History of Foo Café",
    "summary": "A century of coffee.",
    "content": "Foo Café opened in 1906 [1] and moved in 1950 [2].",
    "citations": [
        {"number": 1, "url": "https://one.example/a", "title": "City archive"},
        {"number": 2, "url": "https://two.example/b", "title": "Local paper"}
    ]}"#;

const RESEARCH_ANSWER: &str = "<answer>Findings on the café.\n\
FACT (0.9): Foo Café opened in 1906 | SOURCE: https://one.example/a\n\
FACT (0.8): Foo Café moved premises in 1950 | SOURCE: https://two.example/b</answer>";

pub struct FakeChat {
    /// Scripted supervisor turns, consumed front to back.
    pub supervisor_replies: Mutex<VecDeque<String>>,
    /// Supervisor turn used when the script runs dry.
    pub supervisor_default: String,
    /// Researcher objectives containing any of these markers fail
    /// their stream call.
    pub fail_markers: Vec<String>,
    /// chat_stream calls seen per researcher objective.
    stream_calls: Mutex<HashMap<String, u32>>,
}

impl FakeChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            supervisor_replies: Mutex::new(VecDeque::new()),
            supervisor_default: r#"<tool name="research_complete">{}</tool>"#.into(),
            fail_markers: vec![],
            stream_calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_supervisor_script(replies: &[&str], default: &str) -> Arc<Self> {
        Arc::new(Self {
            supervisor_replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            supervisor_default: default.to_string(),
            fail_markers: vec![],
            stream_calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_failing_workers(markers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            supervisor_replies: Mutex::new(VecDeque::new()),
            supervisor_default: r#"<tool name="research_complete">{}</tool>"#.into(),
            fail_markers: markers.iter().map(|s| s.to_string()).collect(),
            stream_calls: Mutex::new(HashMap::new()),
        })
    }
}

fn usage() -> Option<Usage> {
    Some(Usage::new(100, 50))
}

fn respond(content: impl Into<String>) -> Result<ChatResponse> {
    Ok(ChatResponse {
        content: content.into(),
        usage: usage(),
        model: "fake".into(),
        finish_reason: Some("stop".into()),
    })
}

#[async_trait::async_trait]
impl ChatClient for FakeChat {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let head = req
            .messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or("");

        if head.starts_with("You are a research planner") {
            return respond(PLAN_JSON);
        }
        if head.starts_with("You supervise a team") {
            let scripted = self.supervisor_replies.lock().pop_front();
            return respond(scripted.unwrap_or_else(|| self.supervisor_default.clone()));
        }
        if head.starts_with("You are a research analyst") {
            return respond(ANALYSIS_JSON);
        }
        if head.starts_with("You are a research writer") {
            return respond(SYNTHESIS_JSON);
        }
        if head.starts_with("You manage the memory") {
            return respond(r#"{"mode": "NONE"}"#);
        }
        if head.starts_with("Rewrite the research draft") {
            return respond("Refined draft with the new findings folded in.");
        }
        if head.starts_with("Condense") || head.starts_with("Consolidate") {
            return respond("condensed summary");
        }
        respond("ok")
    }

    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let head = req
            .messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or("");
        let objective = head.lines().nth(1).unwrap_or("").to_string();

        if self.fail_markers.iter().any(|m| objective.contains(m)) {
            return Err(Error::capability("chat", "scripted researcher failure"));
        }

        let call = {
            let mut calls = self.stream_calls.lock();
            let entry = calls.entry(objective).or_insert(0);
            *entry += 1;
            *entry
        };

        // First turn searches; the second answers with cited facts.
        let text = if call == 1 {
            r#"<thought>Start with a broad search.</thought><tool name="search">{"query": "foo café history"}</tool>"#
                .to_string()
        } else {
            RESEARCH_ANSWER.to_string()
        };

        let events = vec![
            Ok(StreamEvent::Token { text }),
            Ok(StreamEvent::Done {
                usage: None,
                finish_reason: Some("stop".into()),
            }),
        ];
        Ok(Box::pin(futures_util::stream::iter(events)))
    }

    fn default_model(&self) -> &str {
        "fake"
    }
}

pub struct FakeSearcher;

#[async_trait::async_trait]
impl Searcher for FakeSearcher {
    async fn search(&self, _queries: &[String]) -> Result<Vec<SearchResult>> {
        Ok(vec![
            SearchResult {
                url: "https://one.example/a".into(),
                title: "City archive".into(),
                snippet: "Opened in 1906.".into(),
            },
            SearchResult {
                url: "https://two.example/b".into(),
                title: "Local paper".into(),
                snippet: "Moved premises in 1950.".into(),
            },
        ])
    }
}

pub struct FakeFetcher;

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        Ok(format!("Plain text of {url}"))
    }
}

pub struct FakeDocs;

#[async_trait::async_trait]
impl DocReader for FakeDocs {
    async fn read(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }
}
