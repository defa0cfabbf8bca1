//! Supervisor: the diffusion loop.
//!
//! Each iteration reflects, delegates to sub-researchers, refines the
//! draft, or declares completion. Every pass is meant to lower
//! speculation and raise evidence density in the draft.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;

use fathom_context::ContextManager;
use fathom_domain::config::ContextConfig;
use fathom_domain::cost::{CostBreakdown, PricingTable};
use fathom_domain::error::{Error, Result};
use fathom_domain::message::{Message, Role};
use fathom_domain::research::{Fact, SubInsight};
use fathom_domain::stream::Usage;
use fathom_providers::{ChatClient, ChatRequest};
use fathom_tools::{parse_tool_calls, CONDUCT_RESEARCH, REFINE_DRAFT, RESEARCH_COMPLETE, THINK};

use crate::cancel::CancelToken;
use crate::prompts;

/// How the loop ended, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// The model called `research_complete`.
    Explicit,
    /// `max_iterations` reached; rationale "iteration cap".
    IterationCap,
    /// The last delegation batch surfaced nothing new.
    NoNewFindings,
}

/// Result of one delegated sub-research run.
#[derive(Debug, Clone)]
pub struct DelegationResult {
    pub worker_id: String,
    pub researcher: u32,
    pub summary: String,
    pub new_sources: Vec<String>,
    pub facts: Vec<Fact>,
}

/// The supervisor's window onto worker execution.
///
/// The orchestrator implements this: it consumes the next pending plan
/// worker, records the start/complete/fail events, and enforces the
/// parallel-delegation semaphore. `Ok(None)` means every planned worker
/// slot is already consumed.
#[async_trait::async_trait]
pub trait Delegate: Send + Sync {
    async fn conduct(
        &self,
        topic: String,
        visited: Vec<String>,
    ) -> Result<Option<DelegationResult>>;
}

/// What the supervisor hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct SupervisorOutcome {
    pub notes: Vec<String>,
    pub draft: String,
    pub visited: Vec<String>,
    pub insights: Vec<SubInsight>,
    pub iterations: u32,
    pub cost: CostBreakdown,
    pub reason: CompletionReason,
    pub rationale: String,
}

pub struct SupervisorConfig {
    pub max_iterations: u32,
    pub max_parallel: usize,
    pub model: String,
    pub summarizer_model: String,
    pub context: ContextConfig,
    pub pricing: PricingTable,
}

/// Run the diffusion loop to termination.
pub async fn run_supervisor(
    brief: &str,
    config: &SupervisorConfig,
    chat: Arc<dyn ChatClient>,
    delegate: Arc<dyn Delegate>,
    cancel: &CancelToken,
) -> Result<SupervisorOutcome> {
    let context = ContextManager::new(
        config.context.clone(),
        chat.clone(),
        config.summarizer_model.clone(),
        config.pricing.clone(),
    );
    let system_prompt = prompts::supervisor_system_prompt(config.max_parallel);

    let mut notes: Vec<String> = Vec::new();
    let mut draft = String::new();
    let mut visited: Vec<String> = Vec::new();
    let mut visited_set: HashSet<String> = HashSet::new();
    let mut insights: Vec<SubInsight> = Vec::new();
    let mut cost = CostBreakdown::default();
    let mut last_batch_was_dry = false;

    let mut iteration: u32 = 0;
    let (reason, rationale) = loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled(
                cancel.reason().unwrap_or_else(|| "cancelled".into()),
            ));
        }
        if iteration >= config.max_iterations {
            break (CompletionReason::IterationCap, "iteration cap".to_string());
        }
        iteration += 1;

        // ── 1-2. Build messages, call the model ────────────────────
        let status = format!(
            "BRIEF:\n{brief}\n\nCURRENT DRAFT:\n{}\n\nIteration {iteration} of {}. \
             {} note(s) accumulated, {} source(s) visited. Decide your next action.",
            if draft.is_empty() { "(none yet)" } else { draft.as_str() },
            config.max_iterations,
            notes.len(),
            visited.len(),
        );
        let messages = context.build_messages(&system_prompt, &status).await;
        let response = chat
            .chat(ChatRequest {
                messages,
                model: Some(config.model.clone()),
                ..Default::default()
            })
            .await?;
        cost += config.pricing.cost_for(
            &config.model,
            response.usage.unwrap_or_else(|| {
                Usage::new(0, Usage::estimate_tokens(&response.content))
            }),
        );
        context
            .add_interaction(Role::Assistant, response.content.clone())
            .await;

        // ── 3. Dispatch tool calls ─────────────────────────────────
        let calls = parse_tool_calls(&response.content);
        let mut topics: Vec<String> = Vec::new();
        let mut refine_requested = false;
        let mut complete_requested = false;

        for call in &calls {
            match call.name.as_str() {
                THINK => {
                    let reflection = call
                        .args
                        .get("reflection")
                        .and_then(|r| r.as_str())
                        .unwrap_or("");
                    let prefix: String = reflection.chars().take(100).collect();
                    context
                        .add_interaction(
                            Role::User,
                            format!("Tool result for think:\nReflection recorded: {prefix}"),
                        )
                        .await;
                }
                CONDUCT_RESEARCH => {
                    if let Some(topic) = call.args.get("research_topic").and_then(|t| t.as_str()) {
                        topics.push(topic.to_string());
                    }
                }
                REFINE_DRAFT => refine_requested = true,
                RESEARCH_COMPLETE => complete_requested = true,
                other => {
                    context
                        .add_interaction(
                            Role::User,
                            format!("Tool result for {other}:\nError: tool not available to the supervisor"),
                        )
                        .await;
                }
            }
        }

        // ── Delegations run concurrently (semaphore in the delegate) ──
        if !topics.is_empty() {
            let futures = topics.into_iter().map(|topic| {
                let delegate = delegate.clone();
                let visited = visited.clone();
                async move { delegate.conduct(topic.clone(), visited).await.map(|r| (topic, r)) }
            });

            let mut batch_new_sources = 0usize;
            let mut batch_new_facts = 0usize;

            for outcome in join_all(futures).await {
                match outcome {
                    Ok((topic, Some(result))) => {
                        batch_new_facts += result.facts.len();
                        for url in &result.new_sources {
                            if visited_set.insert(url.clone()) {
                                visited.push(url.clone());
                                batch_new_sources += 1;
                            }
                        }
                        for fact in &result.facts {
                            insights.push(SubInsight {
                                id: uuid::Uuid::new_v4().to_string(),
                                topic: topic.clone(),
                                finding: fact.content.clone(),
                                implication: String::new(),
                                source_url: fact.source_url.clone(),
                                confidence: fact.confidence,
                                iteration,
                                researcher: result.researcher,
                                timestamp: Utc::now(),
                            });
                        }
                        let note = format!("[{topic}] {}", result.summary);
                        context
                            .add_interaction(
                                Role::User,
                                format!(
                                    "Tool result for conduct_research:\n{}",
                                    truncate(&note, 1500)
                                ),
                            )
                            .await;
                        notes.push(note);
                    }
                    Ok((topic, None)) => {
                        context
                            .add_interaction(
                                Role::User,
                                format!(
                                    "Tool result for conduct_research:\nAll planned research \
                                     slots are exhausted; \"{topic}\" was not delegated. \
                                     Refine the draft or complete."
                                ),
                            )
                            .await;
                    }
                    Err(e) => {
                        // A failed worker is recorded by the delegate; the
                        // session continues with the survivors.
                        context
                            .add_interaction(
                                Role::User,
                                format!("Tool result for conduct_research:\nError: {e}"),
                            )
                            .await;
                    }
                }
            }

            last_batch_was_dry = batch_new_sources == 0 && batch_new_facts == 0;
        }

        // ── refine_draft ───────────────────────────────────────────
        if refine_requested {
            if notes.is_empty() {
                context
                    .add_interaction(
                        Role::User,
                        "Tool result for refine_draft:\nNo notes to fold in yet.",
                    )
                    .await;
            } else {
                let findings = notes.join("\n---\n");
                let refined = chat
                    .chat(ChatRequest {
                        messages: vec![Message::user(prompts::refine_prompt(
                            brief, &draft, &findings,
                        ))],
                        model: Some(config.model.clone()),
                        ..Default::default()
                    })
                    .await?;
                cost += config.pricing.cost_for(
                    &config.model,
                    refined.usage.unwrap_or_else(|| {
                        Usage::new(0, Usage::estimate_tokens(&refined.content))
                    }),
                );
                draft = refined.content;
                context
                    .add_interaction(
                        Role::User,
                        "Tool result for refine_draft:\nDraft updated from accumulated notes.",
                    )
                    .await;
            }
        }

        // ── Termination, in tie-break order ────────────────────────
        if complete_requested {
            break (CompletionReason::Explicit, "research_complete".to_string());
        }
        if last_batch_was_dry && !notes.is_empty() {
            break (
                CompletionReason::NoNewFindings,
                "no new findings".to_string(),
            );
        }

        context.fold_if_needed().await?;
    };

    cost += context.folding_cost().await;
    tracing::info!(
        iterations = iteration,
        notes = notes.len(),
        visited = visited.len(),
        reason = ?reason,
        "supervisor finished"
    );

    Ok(SupervisorOutcome {
        notes,
        draft,
        visited,
        insights,
        iterations: iteration,
        cost,
        reason,
        rationale,
    })
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_domain::config::ContextConfig;
    use fathom_domain::stream::{BoxStream, StreamEvent};
    use fathom_providers::{ChatClient, ChatResponse};
    use parking_lot::Mutex;

    /// Chat fake that replays a fixed script of responses.
    struct ScriptedChat {
        script: Mutex<Vec<String>>,
    }

    impl ScriptedChat {
        fn new(lines: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(lines.iter().rev().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ChatClient for ScriptedChat {
        async fn chat(&self, _req: ChatRequest) -> fathom_domain::Result<ChatResponse> {
            let content = self.script.lock().pop().unwrap_or_default();
            Ok(ChatResponse {
                content,
                usage: Some(Usage::new(100, 50)),
                model: "scripted".into(),
                finish_reason: Some("stop".into()),
            })
        }

        async fn chat_stream(
            &self,
            _req: ChatRequest,
        ) -> fathom_domain::Result<BoxStream<'static, fathom_domain::Result<StreamEvent>>>
        {
            Err(Error::capability("chat", "not scripted"))
        }

        fn default_model(&self) -> &str {
            "scripted"
        }
    }

    struct StubDelegate {
        results: Mutex<Vec<Option<DelegationResult>>>,
    }

    #[async_trait::async_trait]
    impl Delegate for StubDelegate {
        async fn conduct(
            &self,
            topic: String,
            _visited: Vec<String>,
        ) -> Result<Option<DelegationResult>> {
            Ok(self.results.lock().pop().flatten().map(|mut r| {
                r.summary = format!("findings on {topic}");
                r
            }))
        }
    }

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            max_iterations: 15,
            max_parallel: 3,
            model: "scripted".into(),
            summarizer_model: "scripted".into(),
            context: ContextConfig::default(),
            pricing: PricingTable::default(),
        }
    }

    fn delegation(worker_id: &str, sources: &[&str]) -> Option<DelegationResult> {
        Some(DelegationResult {
            worker_id: worker_id.into(),
            researcher: 1,
            summary: String::new(),
            new_sources: sources.iter().map(|s| s.to_string()).collect(),
            facts: vec![Fact {
                content: "a finding".into(),
                confidence: 0.8,
                source_url: sources.first().unwrap_or(&"").to_string(),
            }],
        })
    }

    #[tokio::test]
    async fn explicit_completion_wins() {
        let chat = ScriptedChat::new(&[
            r#"<tool name="conduct_research">{"research_topic": "origins"}</tool>"#,
            r#"<tool name="refine_draft">{}</tool><tool name="research_complete">{}</tool>"#,
        ]);
        let delegate = Arc::new(StubDelegate {
            results: Mutex::new(vec![delegation("search-1", &["https://a.example"])]),
        });

        let outcome = run_supervisor(
            "brief",
            &config(),
            chat,
            delegate,
            &CancelToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.reason, CompletionReason::Explicit);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.visited, vec!["https://a.example"]);
        assert_eq!(outcome.notes.len(), 1);
        assert_eq!(outcome.insights.len(), 1);
        assert!(outcome.cost.total_tokens > 0);
    }

    #[tokio::test]
    async fn iteration_cap_forces_completion() {
        // The model never terminates; every turn is a bare reflection.
        let script: Vec<&str> =
            vec![r#"<tool name="think">{"reflection": "still pondering"}</tool>"#; 20];
        let chat = ScriptedChat::new(&script);
        let delegate = Arc::new(StubDelegate {
            results: Mutex::new(vec![]),
        });

        let mut cfg = config();
        cfg.max_iterations = 5;
        let outcome = run_supervisor("brief", &cfg, chat, delegate, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.reason, CompletionReason::IterationCap);
        assert_eq!(outcome.rationale, "iteration cap");
        assert_eq!(outcome.iterations, 5);
    }

    #[tokio::test]
    async fn dry_batch_completes_with_no_new_findings() {
        let chat = ScriptedChat::new(&[
            r#"<tool name="conduct_research">{"research_topic": "origins"}</tool>"#,
            r#"<tool name="conduct_research">{"research_topic": "origins again"}</tool>"#,
            r#"<tool name="think">{"reflection": "should not reach here"}</tool>"#,
        ]);
        // First delegation yields a source+fact; second yields nothing new.
        let delegate = Arc::new(StubDelegate {
            results: Mutex::new(vec![
                Some(DelegationResult {
                    worker_id: "search-2".into(),
                    researcher: 2,
                    summary: String::new(),
                    new_sources: vec![],
                    facts: vec![],
                }),
                delegation("search-1", &["https://a.example"]),
            ]),
        });

        let outcome = run_supervisor("brief", &config(), chat, delegate, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.reason, CompletionReason::NoNewFindings);
        assert_eq!(outcome.iterations, 2);
    }

    #[tokio::test]
    async fn exhausted_slots_do_not_spawn() {
        let chat = ScriptedChat::new(&[
            r#"<tool name="conduct_research">{"research_topic": "extra"}</tool>"#,
            r#"<tool name="research_complete">{}</tool>"#,
        ]);
        let delegate = Arc::new(StubDelegate {
            results: Mutex::new(vec![None]),
        });

        let outcome = run_supervisor("brief", &config(), chat, delegate, &CancelToken::new())
            .await
            .unwrap();
        assert!(outcome.notes.is_empty());
        assert_eq!(outcome.reason, CompletionReason::Explicit);
    }

    #[tokio::test]
    async fn cancellation_exits_at_loop_boundary() {
        let chat = ScriptedChat::new(&[]);
        let delegate = Arc::new(StubDelegate {
            results: Mutex::new(vec![]),
        });
        let cancel = CancelToken::new();
        cancel.cancel("user");

        let err = run_supervisor("brief", &config(), chat, delegate, &cancel).await;
        assert!(matches!(err, Err(Error::Cancelled(_))));
    }
}
