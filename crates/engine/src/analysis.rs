//! Cross-worker analysis: one LLM call that validates facts across
//! researcher outputs, surfaces contradictions, and names the gaps.

use std::sync::Arc;

use fathom_domain::cost::{CostBreakdown, PricingTable};
use fathom_domain::error::Result;
use fathom_domain::message::Message;
use fathom_domain::research::{Analysis, ValidatedFact, WorkerState};
use fathom_domain::stream::Usage;
use fathom_providers::{ChatClient, ChatRequest};
use fathom_tools::extract_first_json;

use crate::prompts;

/// Run the analysis call over all completed workers.
///
/// Transport failures propagate (the phase fails); an unparseable
/// response degrades to an empty analysis that records the problem as a
/// knowledge gap, so the session can still synthesize from raw notes.
pub async fn analyze_workers(
    chat: &Arc<dyn ChatClient>,
    model: &str,
    pricing: &PricingTable,
    query: &str,
    workers: &[&WorkerState],
) -> Result<(Analysis, CostBreakdown)> {
    let mut body = format!("RESEARCH QUERY: {query}\n");
    for worker in workers {
        body.push_str(&format!(
            "\n=== Researcher {} ({}) ===\n{}\nSources:\n{}\n",
            worker.ordinal,
            worker.perspective.name,
            worker.output,
            worker.sources.join("\n"),
        ));
    }

    let response = chat
        .chat(ChatRequest {
            messages: vec![
                Message::system(prompts::ANALYSIS_SYSTEM_PROMPT),
                Message::user(body),
            ],
            model: Some(model.to_string()),
            ..Default::default()
        })
        .await?;

    let cost = pricing.cost_for(
        model,
        response
            .usage
            .unwrap_or_else(|| Usage::new(0, Usage::estimate_tokens(&response.content))),
    );

    let analysis = match extract_first_json(&response.content).map(parse_analysis) {
        Some(a) => a,
        None => {
            tracing::warn!("analysis response was not parseable JSON, degrading");
            Analysis {
                validated_facts: Vec::new(),
                contradictions: Vec::new(),
                knowledge_gaps: vec!["analysis response could not be parsed".to_string()],
            }
        }
    };

    Ok((analysis, cost))
}

/// Corroboration requires at least two distinct source URLs.
const MIN_CORROBORATION: usize = 2;

fn parse_analysis(value: serde_json::Value) -> Analysis {
    let validated_facts = value
        .get("validated_facts")
        .and_then(|f| f.as_array())
        .map(|facts| {
            facts
                .iter()
                .filter_map(|f| {
                    let corroborated_by: Vec<String> = f
                        .get("corroborated_by")?
                        .as_array()?
                        .iter()
                        .filter_map(|s| s.as_str().map(String::from))
                        .collect();
                    Some(ValidatedFact {
                        content: f.get("content")?.as_str()?.to_string(),
                        confidence: f
                            .get("confidence")
                            .and_then(|c| c.as_f64())
                            .unwrap_or(0.5)
                            .clamp(0.0, 1.0),
                        corroborated_by,
                    })
                })
                .filter(|fact| {
                    let distinct: std::collections::HashSet<&str> =
                        fact.corroborated_by.iter().map(|s| s.as_str()).collect();
                    distinct.len() >= MIN_CORROBORATION
                })
                .collect()
        })
        .unwrap_or_default();

    Analysis {
        validated_facts,
        contradictions: string_array(&value, "contradictions"),
        knowledge_gaps: string_array(&value, "knowledge_gaps"),
    }
}

fn string_array(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
