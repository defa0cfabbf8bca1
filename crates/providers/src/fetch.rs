//! Plain HTTP page fetcher.
//!
//! GETs a URL and returns its text with markup crudely stripped. No
//! JavaScript execution, no redirect chasing beyond reqwest defaults.

use std::time::Duration;

use fathom_domain::error::{Error, Result};

use crate::traits::Fetcher;
use crate::util::from_reqwest;

/// Cap on returned page text, in characters.
const MAX_PAGE_CHARS: usize = 40_000;

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent("fathom-research/0.1")
            .build()
            .map_err(|e| from_reqwest("fetch", e))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| from_reqwest("fetch", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::capability("fetch", format!("{url}: HTTP {status}")));
        }

        let body = response.text().await.map_err(|e| from_reqwest("fetch", e))?;
        let mut text = strip_markup(&body);
        if text.chars().count() > MAX_PAGE_CHARS {
            text = text.chars().take(MAX_PAGE_CHARS).collect();
            text.push_str("\n[truncated]");
        }
        Ok(text)
    }
}

/// Drop `<script>`/`<style>` blocks and tags, collapse whitespace runs.
fn strip_markup(html: &str) -> String {
    let without_scripts = remove_container(html, "script");
    let without_styles = remove_container(&without_scripts, "style");

    let mut out = String::with_capacity(without_styles.len() / 2);
    let mut in_tag = false;
    let mut last_space = false;
    for c in without_styles.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                if !last_space {
                    out.push(' ');
                    last_space = true;
                }
            }
            c if in_tag => {
                let _ = c;
            }
            c if c.is_whitespace() => {
                if !last_space {
                    out.push(' ');
                    last_space = true;
                }
            }
            c => {
                out.push(c);
                last_space = false;
            }
        }
    }

    out.trim().to_string()
}

/// Remove `<container …>…</container>` blocks, case-insensitively. An
/// unclosed opening tag drops everything after it.
fn remove_container(html: &str, container: &str) -> String {
    let open = format!("<{container}");
    let close = format!("</{container}>");
    let lower = html.to_ascii_lowercase();

    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    while let Some(start) = lower[pos..].find(&open) {
        let start = pos + start;
        out.push_str(&html[pos..start]);
        match lower[start..].find(&close) {
            Some(end) => pos = start + end + close.len(),
            None => return out,
        }
    }
    out.push_str(&html[pos..]);
    out
}
