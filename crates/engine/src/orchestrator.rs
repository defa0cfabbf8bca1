//! Orchestrator: drives a research session end-to-end.
//!
//! Every state change goes command → aggregate → event store → bus, in
//! that order. A store-level version conflict reloads the aggregate
//! from disk and retries the command once. Failed workers never abort
//! the session; phase-level failures and cancellations are recorded as
//! durable events before the driver returns, so resume is always
//! possible.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use fathom_domain::config::Config;
use fathom_domain::cost::CostBreakdown;
use fathom_domain::error::{Error, Result};
use fathom_domain::event::EventEnvelope;
use fathom_domain::message::Message;
use fathom_domain::research::{
    DagNode, NodeKind, NodeStatus, Perspective, Plan, ResearchMode, ResearchStatus, WorkerStatus,
};
use fathom_domain::stream::Usage;
use fathom_eventstore::{FileEventStore, Snapshot};
use fathom_providers::{ChatClient, ChatRequest, DocReader, Fetcher, Searcher};
use fathom_tools::{
    extract_first_json, AnalyzeCsvTool, FetchTool, ReadDocumentTool, SearchTool, ThinkTool,
    ToolRegistry,
};

use crate::aggregate::{Command, ResearchAggregate, ResearchState};
use crate::analysis::analyze_workers;
use crate::bus::EventBus;
use crate::cancel::CancelToken;
use crate::prompts;
use crate::report::{report_from_response, write_to_vault};
use crate::researcher::{run_sub_researcher, ResearchBudget, ResearcherDeps};
use crate::supervisor::{
    run_supervisor, Delegate, DelegationResult, SupervisorConfig, SupervisorOutcome,
};

/// The four capability interfaces the engine runs on.
#[derive(Clone)]
pub struct Capabilities {
    pub chat: Arc<dyn ChatClient>,
    pub searcher: Arc<dyn Searcher>,
    pub fetcher: Arc<dyn Fetcher>,
    pub docs: Arc<dyn DocReader>,
}

pub struct Orchestrator {
    config: Arc<Config>,
    caps: Capabilities,
    store: Arc<FileEventStore>,
    bus: EventBus,
    registry: Arc<ToolRegistry>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        caps: Capabilities,
        store: Arc<FileEventStore>,
        bus: EventBus,
    ) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SearchTool::new(caps.searcher.clone())));
        registry.register(Arc::new(FetchTool::new(caps.fetcher.clone())));
        registry.register(Arc::new(ReadDocumentTool::new(caps.docs.clone())));
        registry.register(Arc::new(AnalyzeCsvTool));
        registry.register(Arc::new(ThinkTool));

        Self {
            config,
            caps,
            store,
            bus,
            registry: Arc::new(registry),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<FileEventStore> {
        &self.store
    }

    // ── Session lifecycle ──────────────────────────────────────────

    /// Open a new session: issue `StartResearch` and persist it.
    pub fn new_session(
        &self,
        query: &str,
        mode: ResearchMode,
    ) -> Result<Arc<ResearchAggregate>> {
        let id = uuid::Uuid::new_v4().to_string();
        let aggregate = Arc::new(ResearchAggregate::new(id));
        exec_command(
            &self.store,
            &self.bus,
            &aggregate,
            Command::StartResearch {
                query: query.to_string(),
                mode,
            },
        )?;
        Ok(aggregate)
    }

    /// Drive a session to a terminal status.
    ///
    /// Returns the final state once a terminal event is durably
    /// recorded; errors only when even the failure event could not be
    /// persisted.
    pub async fn drive(
        &self,
        aggregate: Arc<ResearchAggregate>,
        cancel: &CancelToken,
    ) -> Result<ResearchState> {
        let timeout_secs = self.config.engine.session_timeout_secs;
        let result = if timeout_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                self.drive_phases(&aggregate, cancel),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => {
                    cancel.cancel("timeout");
                    Err(Error::Cancelled("timeout".into()))
                }
            }
        } else {
            self.drive_phases(&aggregate, cancel).await
        };

        match result {
            Ok(()) => Ok(aggregate.state()),
            Err(Error::Cancelled(reason)) => {
                exec_command(
                    &self.store,
                    &self.bus,
                    &aggregate,
                    Command::CancelResearch { reason },
                )?;
                Ok(aggregate.state())
            }
            Err(e) => {
                let failed_phase = aggregate.state().status.as_str().to_string();
                tracing::error!(phase = %failed_phase, error = %e, "phase failed");
                exec_command(
                    &self.store,
                    &self.bus,
                    &aggregate,
                    Command::FailResearch {
                        failed_phase,
                        error: e.to_string(),
                    },
                )?;
                Ok(aggregate.state())
            }
        }
    }

    /// Rehydrate a session from its event stream and continue from the
    /// phase its status implies.
    pub async fn resume(&self, id: &str, cancel: &CancelToken) -> Result<ResearchState> {
        let events = self.store.load_events(id)?;
        if events.is_empty() {
            return Err(Error::Validation(format!("unknown session {id}")));
        }

        let aggregate = Arc::new(ResearchAggregate::load_from_events(id, &events)?);
        aggregate.reset_running_workers();

        let state = aggregate.state();
        if state.status.is_terminal() {
            return Ok(state);
        }
        tracing::info!(
            session = id,
            status = state.status.as_str(),
            "resuming session"
        );
        self.drive(aggregate, cancel).await
    }

    /// On-demand snapshot: records `snapshot.taken` and writes the
    /// serialized state next to the event log.
    pub fn save_snapshot(&self, aggregate: &Arc<ResearchAggregate>) -> Result<()> {
        exec_command(&self.store, &self.bus, aggregate, Command::TakeSnapshot)?;
        let state = aggregate.state();
        self.store.save_snapshot(&Snapshot {
            aggregate_id: state.id.clone(),
            version: state.version,
            state: serde_json::to_value(&state)?,
            timestamp: Utc::now(),
        })
    }

    // ── Phases ─────────────────────────────────────────────────────

    async fn drive_phases(
        &self,
        aggregate: &Arc<ResearchAggregate>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut supervisor_outcome: Option<SupervisorOutcome> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(
                    cancel.reason().unwrap_or_else(|| "cancelled".into()),
                ));
            }

            let state = aggregate.state();
            match state.status {
                ResearchStatus::Planning => self.plan_phase(aggregate, &state).await?,
                ResearchStatus::Searching => {
                    if state.all_workers_done() {
                        exec_command(&self.store, &self.bus, aggregate, Command::StartAnalysis)?;
                    } else if state.mode == ResearchMode::Deep && supervisor_outcome.is_none() {
                        supervisor_outcome =
                            Some(self.supervised_search_phase(aggregate, cancel).await?);
                    } else {
                        self.search_phase(aggregate, cancel).await?;
                    }
                }
                ResearchStatus::Analyzing => {
                    let extra_cost = supervisor_outcome
                        .as_ref()
                        .map(|s| s.cost)
                        .unwrap_or_default();
                    self.analysis_phase(aggregate, extra_cost).await?;
                }
                ResearchStatus::Synthesizing => {
                    self.synthesis_phase(aggregate, supervisor_outcome.as_ref())
                        .await?;
                }
                ResearchStatus::Complete
                | ResearchStatus::Failed
                | ResearchStatus::Cancelled => return Ok(()),
                ResearchStatus::Pending => {
                    return Err(Error::Phase {
                        phase: "pending".into(),
                        message: "session was never started".into(),
                    });
                }
            }
        }
    }

    /// One LLM call producing topic, perspectives, and the session DAG.
    async fn plan_phase(
        &self,
        aggregate: &Arc<ResearchAggregate>,
        state: &ResearchState,
    ) -> Result<()> {
        let response = self
            .caps
            .chat
            .chat(ChatRequest {
                messages: vec![
                    Message::system(prompts::PLANNER_SYSTEM_PROMPT),
                    Message::user(state.query.clone()),
                ],
                model: Some(self.config.llm.model.clone()),
                ..Default::default()
            })
            .await?;

        let cost = self.config.llm.pricing.cost_for(
            &self.config.llm.model,
            response
                .usage
                .unwrap_or_else(|| Usage::new(0, Usage::estimate_tokens(&response.content))),
        );

        let plan = parse_plan(&response.content).unwrap_or_else(|| {
            tracing::warn!("plan response was not parseable, using a single perspective");
            Plan {
                topic: state.query.clone(),
                perspectives: vec![Perspective {
                    name: "Generalist".into(),
                    focus: state.query.clone(),
                    seed_questions: vec![],
                }],
            }
        });
        let dag = build_dag(&plan);

        exec_command(
            &self.store,
            &self.bus,
            aggregate,
            Command::SetPlan { plan, dag, cost },
        )?;
        Ok(())
    }

    /// Fast-path searching: run every ready worker concurrently under
    /// the `max_workers` semaphore until none remain.
    async fn search_phase(
        &self,
        aggregate: &Arc<ResearchAggregate>,
        cancel: &CancelToken,
    ) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(
                    cancel.reason().unwrap_or_else(|| "cancelled".into()),
                ));
            }

            let ready = aggregate.state().ready_worker_ids();
            if ready.is_empty() {
                break;
            }

            stream::iter(ready)
                .map(|worker_id| self.run_one_worker(aggregate, worker_id, Vec::new(), cancel))
                .buffer_unordered(self.config.engine.max_workers)
                .collect::<Vec<()>>()
                .await;

            if cancel.is_cancelled() {
                return Err(Error::Cancelled(
                    cancel.reason().unwrap_or_else(|| "cancelled".into()),
                ));
            }
        }

        // Workers left pending here have failed dependencies.
        let stuck: Vec<String> = aggregate
            .state()
            .workers
            .values()
            .filter(|w| w.status == WorkerStatus::Pending)
            .map(|w| w.id.clone())
            .collect();
        for worker_id in stuck {
            exec_command(
                &self.store,
                &self.bus,
                aggregate,
                Command::FailWorker {
                    worker_id,
                    error: "dependency failed".into(),
                    cost: CostBreakdown::default(),
                },
            )?;
        }
        Ok(())
    }

    /// Deep-path searching: the supervisor delegates into the planned
    /// worker slots; whatever it leaves pending is redriven directly.
    async fn supervised_search_phase(
        &self,
        aggregate: &Arc<ResearchAggregate>,
        cancel: &CancelToken,
    ) -> Result<SupervisorOutcome> {
        let state = aggregate.state();
        let brief = match &state.plan {
            Some(plan) => format!(
                "{}\n\nQuery: {}\nPerspectives to cover:\n{}",
                plan.topic,
                state.query,
                plan.perspectives
                    .iter()
                    .map(|p| format!("- {}: {}", p.name, p.focus))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            None => state.query.clone(),
        };

        // Pending slots are consumed FIFO by worker ordinal.
        let mut slots: Vec<(u32, String)> = state
            .workers
            .values()
            .filter(|w| w.status == WorkerStatus::Pending)
            .map(|w| (w.ordinal, w.id.clone()))
            .collect();
        slots.sort();

        let delegate = Arc::new(PlannedDelegate {
            aggregate: aggregate.clone(),
            store: self.store.clone(),
            bus: self.bus.clone(),
            deps: self.researcher_deps(),
            budget: self.researcher_budget(),
            worker_timeout_secs: self.config.engine.worker_timeout_secs,
            semaphore: Semaphore::new(self.config.engine.max_parallel_sub_researchers),
            slots: Mutex::new(slots.into_iter().map(|(_, id)| id).collect()),
            cancel: cancel.clone(),
        });

        let supervisor_config = SupervisorConfig {
            max_iterations: self.config.engine.supervisor_max_iterations,
            max_parallel: self.config.engine.max_parallel_sub_researchers,
            model: self.config.llm.model.clone(),
            summarizer_model: self.config.llm.summarizer().to_string(),
            context: self.config.context.clone(),
            pricing: self.config.llm.pricing.clone(),
        };

        let outcome = run_supervisor(
            &brief,
            &supervisor_config,
            self.caps.chat.clone(),
            delegate,
            cancel,
        )
        .await?;

        // Slots the supervisor never delegated still owe the plan a
        // worker run each.
        self.search_phase(aggregate, cancel).await?;
        Ok(outcome)
    }

    async fn analysis_phase(
        &self,
        aggregate: &Arc<ResearchAggregate>,
        extra_cost: CostBreakdown,
    ) -> Result<()> {
        let state = aggregate.state();
        let completed: Vec<_> = state.completed_workers().collect();

        let (analysis, cost) = if completed.is_empty() {
            (
                fathom_domain::research::Analysis {
                    validated_facts: vec![],
                    contradictions: vec![],
                    knowledge_gaps: vec!["no research workers completed".to_string()],
                },
                CostBreakdown::default(),
            )
        } else {
            analyze_workers(
                &self.caps.chat,
                &self.config.llm.model,
                &self.config.llm.pricing,
                &state.query,
                &completed,
            )
            .await?
        };

        exec_command(
            &self.store,
            &self.bus,
            aggregate,
            Command::SetAnalysis {
                analysis,
                cost: cost + extra_cost,
            },
        )?;
        exec_command(&self.store, &self.bus, aggregate, Command::StartSynthesis)?;
        Ok(())
    }

    async fn synthesis_phase(
        &self,
        aggregate: &Arc<ResearchAggregate>,
        supervisor: Option<&SupervisorOutcome>,
    ) -> Result<()> {
        let state = aggregate.state();
        let topic = state
            .plan
            .as_ref()
            .map(|p| p.topic.clone())
            .unwrap_or_else(|| state.query.clone());

        let mut body = format!("RESEARCH QUERY: {}\n", state.query);
        if let Some(analysis) = &state.analysis {
            body.push_str(&format!(
                "\nVALIDATED ANALYSIS:\n{}\n",
                serde_json::to_string_pretty(analysis)?
            ));
        }
        if let Some(outcome) = supervisor {
            if !outcome.draft.is_empty() {
                body.push_str(&format!("\nWORKING DRAFT:\n{}\n", outcome.draft));
            }
            if !outcome.notes.is_empty() {
                body.push_str(&format!(
                    "\nSUPERVISOR NOTES:\n{}\n",
                    outcome.notes.join("\n---\n")
                ));
            }
        }
        let mut sources: Vec<String> = Vec::new();
        for worker in state.workers.values() {
            body.push_str(&format!(
                "\nRESEARCHER {} NOTES:\n{}\n",
                worker.ordinal, worker.output
            ));
            for url in &worker.sources {
                if !sources.contains(url) {
                    sources.push(url.clone());
                }
            }
        }

        let response = self
            .caps
            .chat
            .chat(ChatRequest {
                messages: vec![
                    Message::system(prompts::SYNTHESIS_SYSTEM_PROMPT),
                    Message::user(body),
                ],
                model: Some(self.config.llm.model.clone()),
                ..Default::default()
            })
            .await?;

        let cost = self.config.llm.pricing.cost_for(
            &self.config.llm.model,
            response
                .usage
                .unwrap_or_else(|| Usage::new(0, Usage::estimate_tokens(&response.content))),
        );

        let report = report_from_response(&response.content, &topic, &sources);
        write_to_vault(&self.config.engine.vault_path, &state.id, &report)?;

        exec_command(
            &self.store,
            &self.bus,
            aggregate,
            Command::SetReport { report, cost },
        )?;
        exec_command(&self.store, &self.bus, aggregate, Command::CompleteResearch)?;
        Ok(())
    }

    // ── Worker execution ───────────────────────────────────────────

    fn researcher_deps(&self) -> ResearcherDeps {
        ResearcherDeps {
            chat: self.caps.chat.clone(),
            registry: self.registry.clone(),
            context_config: self.config.context.clone(),
            pricing: self.config.llm.pricing.clone(),
            model: self.config.llm.model.clone(),
            summarizer_model: self.config.llm.summarizer().to_string(),
        }
    }

    fn researcher_budget(&self) -> ResearchBudget {
        ResearchBudget {
            max_iterations: self.config.engine.researcher_max_iterations,
            max_tokens: self.config.context.max_tokens,
        }
    }

    /// Start, run, and settle one worker. Failures are recorded and
    /// tolerated; cancellation leaves the worker running in state for
    /// resume to reset.
    async fn run_one_worker(
        &self,
        aggregate: &Arc<ResearchAggregate>,
        worker_id: String,
        visited: Vec<String>,
        cancel: &CancelToken,
    ) {
        let objective = match aggregate.state().workers.get(&worker_id) {
            Some(worker) => worker.objective.clone(),
            None => return,
        };

        if let Err(e) = exec_command(
            &self.store,
            &self.bus,
            aggregate,
            Command::StartWorker {
                worker_id: worker_id.clone(),
                objective: objective.clone(),
            },
        ) {
            tracing::error!(worker_id, error = %e, "could not start worker");
            return;
        }

        let settle = settle_worker(
            &self.store,
            &self.bus,
            aggregate,
            &worker_id,
            run_worker_bounded(
                &worker_id,
                &objective,
                self.researcher_budget(),
                &self.researcher_deps(),
                &visited,
                &self.bus,
                cancel,
                self.config.engine.worker_timeout_secs,
            )
            .await,
        );
        if let Err(e) = settle {
            tracing::error!(worker_id, error = %e, "could not settle worker");
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supervisor delegation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Delegate backing `conduct_research`: consumes pending plan workers
/// FIFO and enforces the sub-researcher semaphore (overflow waits in
/// FIFO order).
struct PlannedDelegate {
    aggregate: Arc<ResearchAggregate>,
    store: Arc<FileEventStore>,
    bus: EventBus,
    deps: ResearcherDeps,
    budget: ResearchBudget,
    worker_timeout_secs: u64,
    semaphore: Semaphore,
    slots: Mutex<VecDeque<String>>,
    cancel: CancelToken,
}

#[async_trait::async_trait]
impl Delegate for PlannedDelegate {
    async fn conduct(
        &self,
        topic: String,
        visited: Vec<String>,
    ) -> Result<Option<DelegationResult>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::Cancelled("delegation semaphore closed".into()))?;

        let Some(worker_id) = self.slots.lock().pop_front() else {
            return Ok(None);
        };

        let (perspective, ordinal) = match self.aggregate.state().workers.get(&worker_id) {
            Some(w) => (w.perspective.clone(), w.ordinal),
            None => return Ok(None),
        };
        let objective = format!("{topic} (perspective: {} — {})", perspective.name, perspective.focus);

        exec_command(
            &self.store,
            &self.bus,
            &self.aggregate,
            Command::StartWorker {
                worker_id: worker_id.clone(),
                objective: objective.clone(),
            },
        )?;

        let outcome = run_worker_bounded(
            &worker_id,
            &objective,
            self.budget,
            &self.deps,
            &visited,
            &self.bus,
            &self.cancel,
            self.worker_timeout_secs,
        )
        .await;

        let summary = match &outcome {
            Ok(ctx) => summarize_worker_output(&ctx.output),
            Err(_) => String::new(),
        };
        let (sources, facts) = match &outcome {
            Ok(ctx) => (ctx.sources.clone(), ctx.facts.clone()),
            Err(_) => (vec![], vec![]),
        };

        settle_worker(&self.store, &self.bus, &self.aggregate, &worker_id, outcome)?;

        Ok(Some(DelegationResult {
            worker_id,
            researcher: ordinal,
            summary,
            new_sources: sources,
            facts,
        }))
    }
}

/// Compress a worker's answer into a supervisor note.
fn summarize_worker_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.chars().count() <= 800 {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(800).collect();
        format!("{head}…")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Execute a command, persist its event with the optimistic version
/// check, and publish it. A version conflict reloads the aggregate
/// from the store and retries once.
pub(crate) fn exec_command(
    store: &Arc<FileEventStore>,
    bus: &EventBus,
    aggregate: &Arc<ResearchAggregate>,
    command: Command,
) -> Result<EventEnvelope> {
    for attempt in 0..2 {
        let event = aggregate.execute(command.clone())?;
        match store.append_events(
            &event.aggregate_id,
            std::slice::from_ref(&event),
            event.version.saturating_sub(1),
        ) {
            Ok(()) => {
                aggregate.take_uncommitted();
                bus.publish_domain(&event);
                return Ok(event);
            }
            Err(Error::VersionConflict { .. }) if attempt == 0 => {
                tracing::warn!(
                    aggregate_id = %event.aggregate_id,
                    version = event.version,
                    "version conflict, reloading aggregate"
                );
                let events = store.load_events(&event.aggregate_id)?;
                aggregate.reset_from_events(&events)?;
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::Other("command retry exhausted".into()))
}

/// Run one researcher under the per-worker timeout.
#[allow(clippy::too_many_arguments)]
async fn run_worker_bounded(
    worker_id: &str,
    objective: &str,
    budget: ResearchBudget,
    deps: &ResearcherDeps,
    visited: &[String],
    bus: &EventBus,
    cancel: &CancelToken,
    timeout_secs: u64,
) -> Result<crate::researcher::WorkerContext> {
    let fut = run_sub_researcher(worker_id, objective, budget, deps, visited, bus, cancel);
    if timeout_secs == 0 {
        return fut.await;
    }
    match tokio::time::timeout(Duration::from_secs(timeout_secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Cancelled("timeout".into())),
    }
}

/// Record a finished worker run as a completion or failure event.
/// Cancellation records nothing — resume resets the worker to pending.
fn settle_worker(
    store: &Arc<FileEventStore>,
    bus: &EventBus,
    aggregate: &Arc<ResearchAggregate>,
    worker_id: &str,
    outcome: Result<crate::researcher::WorkerContext>,
) -> Result<()> {
    match outcome {
        Ok(ctx) => {
            exec_command(
                store,
                bus,
                aggregate,
                Command::CompleteWorker {
                    worker_id: worker_id.to_string(),
                    output: ctx.output,
                    facts: ctx.facts,
                    sources: ctx.sources,
                    cost: ctx.cost,
                },
            )?;
        }
        Err(Error::Cancelled(reason)) if reason != "timeout" => {
            tracing::info!(worker_id, reason, "worker cancelled mid-run");
        }
        Err(e) => {
            tracing::warn!(worker_id, error = %e, "worker failed, session continues");
            exec_command(
                store,
                bus,
                aggregate,
                Command::FailWorker {
                    worker_id: worker_id.to_string(),
                    error: e.to_string(),
                    cost: CostBreakdown::default(),
                },
            )?;
        }
    }
    Ok(())
}

fn parse_plan(response: &str) -> Option<Plan> {
    let value = extract_first_json(response)?;
    let topic = value.get("topic")?.as_str()?.to_string();
    let perspectives: Vec<Perspective> = value
        .get("perspectives")?
        .as_array()?
        .iter()
        .filter_map(|p| {
            Some(Perspective {
                name: p.get("name")?.as_str()?.to_string(),
                focus: p.get("focus")?.as_str()?.to_string(),
                seed_questions: p
                    .get("seed_questions")
                    .and_then(|q| q.as_array())
                    .map(|qs| {
                        qs.iter()
                            .filter_map(|q| q.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
        })
        .collect();

    if perspectives.is_empty() {
        return None;
    }
    Some(Plan { topic, perspectives })
}

/// One search node per perspective, an analysis node depending on all
/// of them, and a synthesis node depending on the analysis.
fn build_dag(plan: &Plan) -> Vec<DagNode> {
    let mut dag: Vec<DagNode> = plan
        .perspectives
        .iter()
        .enumerate()
        .map(|(i, _)| DagNode {
            id: format!("search-{}", i + 1),
            kind: NodeKind::Search,
            depends_on: vec![],
            status: NodeStatus::Pending,
        })
        .collect();

    dag.push(DagNode {
        id: "analysis".into(),
        kind: NodeKind::Analysis,
        depends_on: dag.iter().map(|n| n.id.clone()).collect(),
        status: NodeStatus::Pending,
    });
    dag.push(DagNode {
        id: "synthesis".into(),
        kind: NodeKind::Synthesis,
        depends_on: vec!["analysis".into()],
        status: NodeStatus::Pending,
    });
    dag
}
