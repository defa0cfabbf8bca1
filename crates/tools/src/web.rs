//! Web-facing tools: `search` and `fetch`, plus URL harvesting from
//! tool output.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use fathom_domain::error::{Error, Result};
use fathom_providers::{Fetcher, Searcher};

use crate::registry::Tool;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// search
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
}

pub struct SearchTool {
    searcher: Arc<dyn Searcher>,
}

impl SearchTool {
    pub fn new(searcher: Arc<dyn Searcher>) -> Self {
        Self { searcher }
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web. Args: {\"query\": \"...\"}"
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: SearchArgs =
            serde_json::from_value(args).map_err(|e| Error::tool("search", e.to_string()))?;
        let results = self.searcher.search(&[args.query.clone()]).await?;

        if results.is_empty() {
            return Ok(format!("No results for \"{}\"", args.query));
        }

        // URLs are embedded in the text so they can be harvested later.
        let mut out = format!("Results for \"{}\":\n", args.query);
        for (i, r) in results.iter().enumerate() {
            out.push_str(&format!("{}. {}\n   URL: {}\n   {}\n", i + 1, r.title, r.url, r.snippet));
        }
        Ok(out)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// fetch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Deserialize)]
struct FetchArgs {
    url: String,
}

pub struct FetchTool {
    fetcher: Arc<dyn Fetcher>,
}

impl FetchTool {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait::async_trait]
impl Tool for FetchTool {
    fn name(&self) -> &str {
        "fetch"
    }

    fn description(&self) -> &str {
        "Fetch a web page as text. Args: {\"url\": \"https://...\"}"
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: FetchArgs =
            serde_json::from_value(args).map_err(|e| Error::tool("fetch", e.to_string()))?;
        self.fetcher.fetch(&args.url).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// URL harvesting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Scans tool output for http(s) URLs, preserving first-seen order and
/// dropping duplicates. Compiled once per agent.
pub struct UrlHarvester {
    re: regex::Regex,
}

impl UrlHarvester {
    pub fn new() -> Result<Self> {
        let re = regex::Regex::new(r#"https?://[^\s<>"')\]]+"#)
            .map_err(|e| Error::Config(format!("url pattern: {e}")))?;
        Ok(Self { re })
    }

    pub fn harvest(&self, text: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.re
            .find_iter(text)
            .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string())
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }
}
