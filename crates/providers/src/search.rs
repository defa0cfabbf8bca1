//! Brave-style web search adapter.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;

use fathom_domain::config::SearchConfig;
use fathom_domain::error::{Error, Result};

use crate::traits::{SearchResult, Searcher};
use crate::util::{from_reqwest, key_from_env};

pub struct BraveSearch {
    base_url: String,
    api_key: String,
    results_per_query: usize,
    client: reqwest::Client,
}

impl BraveSearch {
    pub fn from_config(cfg: &SearchConfig, request_timeout: Duration) -> Result<Self> {
        let api_key = key_from_env("search", &cfg.api_key_env)?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| from_reqwest("search", e))?;

        Ok(Self {
            base_url: cfg.base_url.clone(),
            api_key,
            results_per_query: cfg.results_per_query,
            client,
        })
    }

    async fn search_one(&self, query: &str) -> Result<Vec<SearchResult>> {
        let response = self
            .client
            .get(&self.base_url)
            .header("X-Subscription-Token", &self.api_key)
            .header("Accept", "application/json")
            .query(&[
                ("q", query),
                ("count", &self.results_per_query.to_string()),
            ])
            .send()
            .await
            .map_err(|e| from_reqwest("search", e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::capability(
                "search",
                format!("HTTP {status}: {}", text.chars().take(200).collect::<String>()),
            ));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| from_reqwest("search", e))?;
        Ok(parse_results(&value))
    }
}

#[async_trait::async_trait]
impl Searcher for BraveSearch {
    async fn search(&self, queries: &[String]) -> Result<Vec<SearchResult>> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for query in queries {
            for result in self.search_one(query).await? {
                // Deduplicate by URL across the whole batch.
                if seen.insert(result.url.clone()) {
                    results.push(result);
                }
            }
        }

        tracing::debug!(queries = queries.len(), results = results.len(), "search done");
        Ok(results)
    }
}

fn parse_results(value: &Value) -> Vec<SearchResult> {
    value
        .pointer("/web/results")
        .and_then(|r| r.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(SearchResult {
                        url: item.get("url")?.as_str()?.to_string(),
                        title: item
                            .get("title")
                            .and_then(|t| t.as_str())
                            .unwrap_or("")
                            .to_string(),
                        snippet: item
                            .get("description")
                            .and_then(|d| d.as_str())
                            .unwrap_or("")
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_brave_shape() {
        let body = serde_json::json!({
            "web": {"results": [
                {"url": "https://a.example", "title": "A", "description": "first"},
                {"url": "https://b.example", "title": "B", "description": "second"},
                {"title": "no url, skipped"}
            ]}
        });
        let results = parse_results(&body);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://a.example");
        assert_eq!(results[1].snippet, "second");
    }

    #[test]
    fn empty_body_yields_no_results() {
        assert!(parse_results(&serde_json::json!({})).is_empty());
    }
}
