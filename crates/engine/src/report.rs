//! Report assembly and vault output.

use std::path::{Path, PathBuf};

use fathom_domain::error::{Error, Result};
use fathom_domain::research::{Citation, Report};
use fathom_tools::extract_first_json;

/// Parse the synthesis response into a [`Report`].
///
/// An unparseable response degrades to a report wrapping the raw text,
/// cited against the supplied source URLs.
pub fn report_from_response(response: &str, topic: &str, fallback_sources: &[String]) -> Report {
    if let Some(value) = extract_first_json(response) {
        let citations = value
            .get("citations")
            .and_then(|c| c.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| {
                        Some(Citation {
                            number: c.get("number")?.as_u64()? as u32,
                            url: c.get("url")?.as_str()?.to_string(),
                            title: c
                                .get("title")
                                .and_then(|t| t.as_str())
                                .unwrap_or("")
                                .to_string(),
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        if let (Some(title), Some(content)) = (
            value.get("title").and_then(|t| t.as_str()),
            value.get("content").and_then(|c| c.as_str()),
        ) {
            let citations = if citations.is_empty() {
                citations_from_sources(fallback_sources)
            } else {
                citations
            };
            return Report {
                title: title.to_string(),
                summary: value
                    .get("summary")
                    .and_then(|s| s.as_str())
                    .unwrap_or("")
                    .to_string(),
                content: content.to_string(),
                citations,
            };
        }
    }

    tracing::warn!("synthesis response was not parseable, wrapping raw text");
    Report {
        title: topic.to_string(),
        summary: String::new(),
        content: response.to_string(),
        citations: citations_from_sources(fallback_sources),
    }
}

fn citations_from_sources(sources: &[String]) -> Vec<Citation> {
    sources
        .iter()
        .enumerate()
        .map(|(i, url)| Citation {
            number: i as u32 + 1,
            url: url.clone(),
            title: String::new(),
        })
        .collect()
}

/// Render the report as markdown: title, summary, body, numbered
/// citations.
pub fn render_markdown(report: &Report) -> String {
    let mut out = format!("# {}\n\n", report.title);
    if !report.summary.is_empty() {
        out.push_str(&format!("> {}\n\n", report.summary));
    }
    out.push_str(&report.content);
    if !report.citations.is_empty() {
        out.push_str("\n\n## Sources\n\n");
        for citation in &report.citations {
            if citation.title.is_empty() {
                out.push_str(&format!("{}. {}\n", citation.number, citation.url));
            } else {
                out.push_str(&format!(
                    "{}. {} — {}\n",
                    citation.number, citation.title, citation.url
                ));
            }
        }
    }
    out
}

/// Write the report into the vault as `<session-id>.md`.
pub fn write_to_vault(vault: &Path, session_id: &str, report: &Report) -> Result<PathBuf> {
    std::fs::create_dir_all(vault).map_err(Error::Io)?;
    let path = vault.join(format!("{session_id}.md"));
    std::fs::write(&path, render_markdown(report)).map_err(Error::Io)?;
    tracing::info!(path = %path.display(), "report written");
    Ok(path)
}
