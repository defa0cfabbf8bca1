//! Sub-researcher: a bounded ReAct loop over the research tools.
//!
//! A sub-researcher is a function, not an object — the supervisor (or
//! the orchestrator in fast mode) creates one per objective, drives it
//! to an answer, and keeps only the returned [`WorkerContext`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;

use fathom_context::ContextManager;
use fathom_domain::config::ContextConfig;
use fathom_domain::cost::{CostBreakdown, PricingTable};
use fathom_domain::error::{Error, Result};
use fathom_domain::message::Role;
use fathom_domain::research::Fact;
use fathom_domain::stream::{StreamEvent, Usage};
use fathom_providers::{ChatClient, ChatRequest};
use fathom_tools::{extract_answer, parse_tool_calls, ToolRegistry, UrlHarvester};

use crate::bus::{BusEvent, EventBus};
use crate::cancel::CancelToken;
use crate::prompts;

/// Shared budget for one researcher run.
#[derive(Debug, Clone, Copy)]
pub struct ResearchBudget {
    pub max_iterations: u32,
    pub max_tokens: u32,
}

/// Everything a researcher needs, threaded in from its creator.
#[derive(Clone)]
pub struct ResearcherDeps {
    pub chat: Arc<dyn ChatClient>,
    pub registry: Arc<ToolRegistry>,
    pub context_config: ContextConfig,
    pub pricing: PricingTable,
    pub model: String,
    pub summarizer_model: String,
}

/// One executed tool call, for the worker record.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub tool: String,
    pub args: serde_json::Value,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// The value a finished researcher returns to its creator.
#[derive(Debug, Clone, Default)]
pub struct WorkerContext {
    pub output: String,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Harvested source URLs, each at most once, in first-seen order.
    pub sources: Vec<String>,
    /// Total execution time per tool, in milliseconds.
    pub tool_durations: HashMap<String, u64>,
    pub facts: Vec<Fact>,
    pub cost: CostBreakdown,
    pub iterations: u32,
}

/// Drive one research objective to an `<answer>`.
///
/// Tool failures become result strings fed back to the model and never
/// abort the loop; hitting the iteration cap concludes the run with a
/// fixed notice. Cancellation is honored at each loop boundary.
pub async fn run_sub_researcher(
    agent: &str,
    objective: &str,
    budget: ResearchBudget,
    deps: &ResearcherDeps,
    visited: &[String],
    bus: &EventBus,
    cancel: &CancelToken,
) -> Result<WorkerContext> {
    let harvester = UrlHarvester::new()?;
    let context = ContextManager::new(
        deps.context_config.clone(),
        deps.chat.clone(),
        deps.summarizer_model.clone(),
        deps.pricing.clone(),
    );

    let system_prompt =
        prompts::researcher_system_prompt(objective, &deps.registry.describe(), visited);
    let user_query = format!("Research objective: {objective}. Proceed.");

    let mut worker = WorkerContext::default();
    let mut seen_sources: std::collections::HashSet<String> =
        visited.iter().cloned().collect();
    let mut spent_tokens: u32 = 0;
    let mut finalize_ordered = false;

    for iteration in 0..budget.max_iterations {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(
                cancel.reason().unwrap_or_else(|| "cancelled".into()),
            ));
        }
        worker.iterations = iteration + 1;

        // ── 1. Stream the model turn ───────────────────────────────
        let messages = context.build_messages(&system_prompt, &user_query).await;
        let input_estimate: u32 = messages
            .iter()
            .map(|m| Usage::estimate_tokens(&m.content))
            .sum();

        let mut stream = deps
            .chat
            .chat_stream(ChatRequest {
                messages,
                model: Some(deps.model.clone()),
                ..Default::default()
            })
            .await?;

        let mut response = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Token { text } => {
                    bus.publish(BusEvent::AgentDelta {
                        agent: agent.to_string(),
                        text: text.clone(),
                    });
                    response.push_str(&text);
                }
                StreamEvent::Done { .. } => break,
                StreamEvent::Error { message } => {
                    return Err(Error::capability("chat", message));
                }
            }
        }

        // Streamed usage is untrusted; estimate from characters.
        let output_estimate = Usage::estimate_tokens(&response);
        let usage = Usage::new(input_estimate, output_estimate);
        worker.cost += deps.pricing.cost_for(&deps.model, usage);
        spent_tokens += usage.total_tokens;

        // ── 2. Answer short-circuits the loop ──────────────────────
        if let Some(answer) = extract_answer(&response) {
            worker.facts = parse_facts(&answer);
            worker.output = answer;
            break;
        }

        // ── 3. Execute tool calls in parsed order ──────────────────
        let calls = parse_tool_calls(&response);
        context.add_interaction(Role::Assistant, response.clone()).await;

        if calls.is_empty() {
            // Pure reasoning turn; the next iteration continues from it.
            continue;
        }

        for call in calls {
            bus.publish(BusEvent::ToolCall {
                agent: agent.to_string(),
                tool: call.name.clone(),
                args: call.args.clone(),
            });

            let started = Instant::now();
            let timestamp = Utc::now();
            let (result, is_error) = match deps.registry.execute(&call.name, call.args.clone()).await
            {
                Ok(result) => (result, false),
                Err(e) => (format!("Error: {e}"), true),
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            bus.publish(BusEvent::ToolResult {
                agent: agent.to_string(),
                tool: call.name.clone(),
                preview: result.chars().take(200).collect(),
                is_error,
            });

            // ── Source harvesting ──────────────────────────────────
            if call.name == "search" {
                for url in harvester.harvest(&result) {
                    if seen_sources.insert(url.clone()) {
                        worker.sources.push(url);
                    }
                }
            } else if call.name == "fetch" {
                if let Some(url) = call.args.get("url").and_then(|u| u.as_str()) {
                    if seen_sources.insert(url.to_string()) {
                        worker.sources.push(url.to_string());
                    }
                }
            }

            context
                .add_interaction(
                    Role::User,
                    format!("Tool result for {}:\n{}", call.name, result),
                )
                .await;
            context.record_tool_use(&call.name, &result).await;

            *worker.tool_durations.entry(call.name.clone()).or_default() += duration_ms;
            worker.tool_calls.push(ToolCallRecord {
                tool: call.name,
                args: call.args,
                duration_ms,
                timestamp,
            });
        }

        // ── 4. Budget pressure ─────────────────────────────────────
        if !finalize_ordered && spent_tokens as f64 >= budget.max_tokens as f64 * 0.9 {
            context
                .add_interaction(Role::System, prompts::FINALIZE_ORDER)
                .await;
            finalize_ordered = true;
        }

        context.fold_if_needed().await?;
    }

    if worker.output.is_empty() {
        worker.output = "Research concluded after maximum iterations.".to_string();
    }

    worker.cost += context.folding_cost().await;
    tracing::debug!(
        agent,
        iterations = worker.iterations,
        sources = worker.sources.len(),
        facts = worker.facts.len(),
        "researcher finished"
    );
    Ok(worker)
}

/// Parse `FACT (0.8): content | SOURCE: url` lines from an answer.
fn parse_facts(answer: &str) -> Vec<Fact> {
    answer
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = line.strip_prefix("FACT")?;
            let (confidence, rest) = parse_confidence(rest)?;
            let rest = rest.trim_start_matches(':').trim();
            let (content, source) = rest.split_once("| SOURCE:")?;
            Some(Fact {
                content: content.trim().to_string(),
                confidence,
                source_url: source.trim().to_string(),
            })
        })
        .collect()
}

fn parse_confidence(rest: &str) -> Option<(f64, &str)> {
    let rest = rest.trim_start();
    let inner_start = rest.strip_prefix('(')?;
    let close = inner_start.find(')')?;
    let confidence: f64 = inner_start[..close].trim().parse().ok()?;
    Some((confidence.clamp(0.0, 1.0), &inner_start[close + 1..]))
}
