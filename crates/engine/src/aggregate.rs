//! The research aggregate: command validation, event generation, and
//! state replay.
//!
//! `execute` is the only write path: it validates the command against
//! current state, builds the event at `version + 1`, applies it, and
//! parks it on the uncommitted list for the orchestrator to persist.
//! `apply` is pure — replaying the same events always produces the same
//! state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use fathom_domain::cost::CostBreakdown;
use fathom_domain::error::{Error, Result};
use fathom_domain::event::{EventEnvelope, EventPayload};
use fathom_domain::research::{
    Analysis, DagNode, Fact, NodeKind, NodeStatus, Plan, Report, ResearchMode, ResearchStatus,
    WorkerState, WorkerStatus,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Replayable state of one research session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchState {
    pub id: String,
    pub query: String,
    pub mode: ResearchMode,
    pub status: ResearchStatus,
    pub plan: Option<Plan>,
    pub dag: Vec<DagNode>,
    /// Worker keys equal DAG search-node ids.
    pub workers: BTreeMap<String, WorkerState>,
    pub analysis: Option<Analysis>,
    pub report: Option<Report>,
    pub total_cost: CostBreakdown,
    /// Completed DAG nodes over total DAG nodes, in [0, 1].
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl ResearchState {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: String::new(),
            mode: ResearchMode::Fast,
            status: ResearchStatus::Pending,
            plan: None,
            dag: Vec::new(),
            workers: BTreeMap::new(),
            analysis: None,
            report: None,
            total_cost: CostBreakdown::default(),
            progress: 0.0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            version: 0,
        }
    }

    /// Ids of pending search workers whose DAG dependencies are all
    /// complete, in DAG order.
    pub fn ready_worker_ids(&self) -> Vec<String> {
        self.dag
            .iter()
            .filter(|node| node.kind == NodeKind::Search && node.status == NodeStatus::Pending)
            .filter(|node| {
                node.depends_on.iter().all(|dep| {
                    self.dag
                        .iter()
                        .any(|d| &d.id == dep && d.status == NodeStatus::Complete)
                })
            })
            .map(|node| node.id.clone())
            .collect()
    }

    /// True when every search worker reached a terminal status.
    pub fn all_workers_done(&self) -> bool {
        !self.workers.is_empty()
            && self
                .workers
                .values()
                .all(|w| matches!(w.status, WorkerStatus::Complete | WorkerStatus::Failed))
    }

    pub fn completed_workers(&self) -> impl Iterator<Item = &WorkerState> {
        self.workers
            .values()
            .filter(|w| w.status == WorkerStatus::Complete)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub enum Command {
    StartResearch {
        query: String,
        mode: ResearchMode,
    },
    SetPlan {
        plan: Plan,
        dag: Vec<DagNode>,
        cost: CostBreakdown,
    },
    StartWorker {
        worker_id: String,
        objective: String,
    },
    CompleteWorker {
        worker_id: String,
        output: String,
        facts: Vec<Fact>,
        sources: Vec<String>,
        cost: CostBreakdown,
    },
    FailWorker {
        worker_id: String,
        error: String,
        cost: CostBreakdown,
    },
    StartAnalysis,
    SetAnalysis {
        analysis: Analysis,
        cost: CostBreakdown,
    },
    StartSynthesis,
    SetReport {
        report: Report,
        cost: CostBreakdown,
    },
    CompleteResearch,
    FailResearch {
        failed_phase: String,
        error: String,
    },
    CancelResearch {
        reason: String,
    },
    TakeSnapshot,
}

impl Command {
    fn validate(&self, state: &ResearchState) -> Result<()> {
        use ResearchStatus as S;

        let reject = |msg: String| Err(Error::Validation(msg));

        match self {
            Command::StartResearch { query, .. } => {
                if state.status != S::Pending {
                    return reject(format!("cannot start research in status {}", state.status.as_str()));
                }
                if query.trim().is_empty() {
                    return reject("query must not be empty".into());
                }
            }
            Command::SetPlan { dag, .. } => {
                if !matches!(state.status, S::Pending | S::Planning) {
                    return reject(format!("cannot set plan in status {}", state.status.as_str()));
                }
                if !dag.iter().any(|n| n.kind == NodeKind::Search) {
                    return reject("plan has no search nodes".into());
                }
            }
            Command::StartWorker { worker_id, .. } => {
                if state.status != S::Searching {
                    return reject(format!("cannot start worker in status {}", state.status.as_str()));
                }
                match state.workers.get(worker_id) {
                    None => return reject(format!("unknown worker {worker_id}")),
                    Some(w) if w.status != WorkerStatus::Pending => {
                        return reject(format!("worker {worker_id} is not pending"));
                    }
                    Some(_) => {}
                }
            }
            Command::CompleteWorker { worker_id, .. } => match state.workers.get(worker_id) {
                None => return reject(format!("unknown worker {worker_id}")),
                Some(w) if w.status != WorkerStatus::Running => {
                    return reject(format!("worker {worker_id} is not running"));
                }
                Some(_) => {}
            },
            // A worker can fail from `pending` too (unsatisfiable
            // dependency), not only mid-run.
            Command::FailWorker { worker_id, .. } => match state.workers.get(worker_id) {
                None => return reject(format!("unknown worker {worker_id}")),
                Some(w) if !matches!(w.status, WorkerStatus::Pending | WorkerStatus::Running) => {
                    return reject(format!("worker {worker_id} already finished"));
                }
                Some(_) => {}
            },
            Command::StartAnalysis => {
                if state.status != S::Searching {
                    return reject(format!("cannot start analysis in status {}", state.status.as_str()));
                }
            }
            Command::SetAnalysis { .. } => {
                if state.status != S::Analyzing {
                    return reject(format!("cannot set analysis in status {}", state.status.as_str()));
                }
            }
            Command::StartSynthesis => {
                if state.status != S::Analyzing {
                    return reject(format!("cannot start synthesis in status {}", state.status.as_str()));
                }
            }
            Command::SetReport { .. } => {
                if state.status != S::Synthesizing {
                    return reject(format!("cannot set report in status {}", state.status.as_str()));
                }
            }
            Command::CompleteResearch => {
                if state.status.is_terminal() {
                    return reject(format!("research already {}", state.status.as_str()));
                }
                if state.report.is_none() {
                    return reject("cannot complete research without a report".into());
                }
            }
            Command::FailResearch { .. } | Command::CancelResearch { .. } => {
                if state.status.is_terminal() {
                    return reject(format!("research already {}", state.status.as_str()));
                }
            }
            Command::TakeSnapshot => {}
        }
        Ok(())
    }

    fn into_payload(self, state: &ResearchState) -> EventPayload {
        match self {
            Command::StartResearch { query, mode } => EventPayload::ResearchStarted { query, mode },
            Command::SetPlan { plan, dag, cost } => EventPayload::PlanCreated { plan, dag, cost },
            Command::StartWorker { worker_id, objective } => {
                EventPayload::WorkerStarted { worker_id, objective }
            }
            Command::CompleteWorker {
                worker_id,
                output,
                facts,
                sources,
                cost,
            } => EventPayload::WorkerCompleted {
                worker_id,
                output,
                facts,
                sources,
                cost,
            },
            Command::FailWorker {
                worker_id,
                error,
                cost,
            } => EventPayload::WorkerFailed {
                worker_id,
                error,
                cost,
            },
            Command::StartAnalysis => EventPayload::AnalysisStarted {},
            Command::SetAnalysis { analysis, cost } => {
                EventPayload::AnalysisCompleted { analysis, cost }
            }
            Command::StartSynthesis => EventPayload::SynthesisStarted {},
            Command::SetReport { report, cost } => EventPayload::ReportGenerated { report, cost },
            Command::CompleteResearch => EventPayload::ResearchCompleted {},
            Command::FailResearch { failed_phase, error } => {
                EventPayload::ResearchFailed { failed_phase, error }
            }
            Command::CancelResearch { reason } => EventPayload::ResearchCancelled { reason },
            Command::TakeSnapshot => EventPayload::SnapshotTaken {
                snapshot_version: state.version,
            },
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Aggregate
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Inner {
    state: ResearchState,
    uncommitted: Vec<EventEnvelope>,
}

/// Consistency boundary for one research session.
///
/// Exactly one writer per aggregate id; the mutex spans validation,
/// apply, and the uncommitted-list append, so observers never see a
/// half-applied command.
pub struct ResearchAggregate {
    inner: Mutex<Inner>,
}

impl ResearchAggregate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: ResearchState::new(id),
                uncommitted: Vec::new(),
            }),
        }
    }

    /// Rebuild an aggregate by replaying its event stream.
    ///
    /// Versions must ascend without gaps from `1`; the final state
    /// version equals the last event's version.
    pub fn load_from_events(id: impl Into<String>, events: &[EventEnvelope]) -> Result<Self> {
        let mut state = ResearchState::new(id);
        for event in events {
            if event.version != state.version + 1 {
                return Err(Error::Validation(format!(
                    "event stream gap: version {} after {}",
                    event.version, state.version
                )));
            }
            apply(&mut state, event);
        }
        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                uncommitted: Vec::new(),
            }),
        })
    }

    /// Validate a command, turn it into the next event, apply it, and
    /// stage it for persistence.
    pub fn execute(&self, command: Command) -> Result<EventEnvelope> {
        let mut inner = self.inner.lock();

        command.validate(&inner.state)?;
        let payload = command.into_payload(&inner.state);
        let event = EventEnvelope::new(inner.state.id.clone(), inner.state.version + 1, payload);

        apply(&mut inner.state, &event);
        inner.uncommitted.push(event.clone());
        Ok(event)
    }

    /// Drain the staged events for persistence.
    pub fn take_uncommitted(&self) -> Vec<EventEnvelope> {
        std::mem::take(&mut self.inner.lock().uncommitted)
    }

    /// Replace in-memory state with a replay of the given stream.
    /// Used after a store-level version conflict: reload, then retry
    /// the command. Staged events are discarded.
    pub fn reset_from_events(&self, events: &[EventEnvelope]) -> Result<()> {
        let id = self.inner.lock().state.id.clone();
        let fresh = Self::load_from_events(id, events)?;
        let mut inner = self.inner.lock();
        inner.state = fresh.inner.into_inner().state;
        inner.uncommitted.clear();
        Ok(())
    }

    /// Resume rehydration: workers that were `running` at crash time
    /// had no completion event persisted, so they restart from
    /// `pending`. This is a load-time adjustment, not an event.
    pub fn reset_running_workers(&self) {
        let mut inner = self.inner.lock();
        let mut reset_ids = Vec::new();
        for worker in inner.state.workers.values_mut() {
            if worker.status == WorkerStatus::Running {
                worker.status = WorkerStatus::Pending;
                reset_ids.push(worker.id.clone());
            }
        }
        for id in reset_ids {
            if let Some(node) = inner.state.dag.iter_mut().find(|n| n.id == id) {
                node.status = NodeStatus::Pending;
            }
        }
    }

    /// Clone of the current state.
    pub fn state(&self) -> ResearchState {
        self.inner.lock().state.clone()
    }

    pub fn version(&self) -> u64 {
        self.inner.lock().state.version
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Apply (pure)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn apply(state: &mut ResearchState, event: &EventEnvelope) {
    state.version = event.version;
    if let Some(cost) = event.cost() {
        state.total_cost += cost;
    }

    match &event.payload {
        EventPayload::ResearchStarted { query, mode } => {
            state.query = query.clone();
            state.mode = *mode;
            state.status = ResearchStatus::Planning;
            state.created_at = event.timestamp;
            state.started_at = Some(event.timestamp);
        }
        EventPayload::PlanCreated { plan, dag, .. } => {
            state.status = ResearchStatus::Searching;
            state.dag = dag.clone();
            state.workers = workers_from_plan(plan, dag);
            state.plan = Some(plan.clone());
        }
        EventPayload::WorkerStarted { worker_id, objective } => {
            if let Some(worker) = state.workers.get_mut(worker_id) {
                worker.status = WorkerStatus::Running;
                worker.objective = objective.clone();
            }
            set_node_status(state, worker_id, NodeStatus::Running);
        }
        EventPayload::WorkerCompleted {
            worker_id,
            output,
            facts,
            sources,
            cost,
        } => {
            if let Some(worker) = state.workers.get_mut(worker_id) {
                worker.status = WorkerStatus::Complete;
                worker.output = output.clone();
                worker.facts = facts.clone();
                worker.sources = sources.clone();
                worker.cost += *cost;
            }
            set_node_status(state, worker_id, NodeStatus::Complete);
        }
        EventPayload::WorkerFailed {
            worker_id,
            error,
            cost,
        } => {
            if let Some(worker) = state.workers.get_mut(worker_id) {
                worker.status = WorkerStatus::Failed;
                worker.error = Some(error.clone());
                worker.cost += *cost;
            }
            set_node_status(state, worker_id, NodeStatus::Failed);
        }
        EventPayload::AnalysisStarted {} => {
            state.status = ResearchStatus::Analyzing;
            set_kind_status(state, NodeKind::Analysis, NodeStatus::Running);
        }
        EventPayload::AnalysisCompleted { analysis, .. } => {
            state.analysis = Some(analysis.clone());
            set_kind_status(state, NodeKind::Analysis, NodeStatus::Complete);
        }
        EventPayload::SynthesisStarted {} => {
            state.status = ResearchStatus::Synthesizing;
            set_kind_status(state, NodeKind::Synthesis, NodeStatus::Running);
        }
        EventPayload::ReportGenerated { report, .. } => {
            state.report = Some(report.clone());
            set_kind_status(state, NodeKind::Synthesis, NodeStatus::Complete);
        }
        EventPayload::ResearchCompleted {} => {
            state.status = ResearchStatus::Complete;
            state.completed_at = Some(event.timestamp);
        }
        EventPayload::ResearchFailed { .. } => {
            state.status = ResearchStatus::Failed;
            state.completed_at = Some(event.timestamp);
        }
        EventPayload::ResearchCancelled { .. } => {
            state.status = ResearchStatus::Cancelled;
            state.completed_at = Some(event.timestamp);
        }
        EventPayload::SnapshotTaken { .. } => {}
    }

    state.progress = derive_progress(&state.dag);
}

/// Workers are derived deterministically from the plan: one per search
/// node, perspectives assigned in order (cycling if the DAG has more
/// search nodes than perspectives).
fn workers_from_plan(plan: &Plan, dag: &[DagNode]) -> BTreeMap<String, WorkerState> {
    let mut workers = BTreeMap::new();
    let search_nodes = dag.iter().filter(|n| n.kind == NodeKind::Search);

    for (i, node) in search_nodes.enumerate() {
        let perspective = plan.perspectives[i % plan.perspectives.len().max(1)].clone();
        let objective = format!("{} — {}", plan.topic, perspective.focus);
        workers.insert(
            node.id.clone(),
            WorkerState {
                id: node.id.clone(),
                ordinal: i as u32 + 1,
                objective,
                perspective,
                status: WorkerStatus::Pending,
                output: String::new(),
                facts: Vec::new(),
                sources: Vec::new(),
                cost: CostBreakdown::default(),
                error: None,
            },
        );
    }
    workers
}

fn set_node_status(state: &mut ResearchState, node_id: &str, status: NodeStatus) {
    if let Some(node) = state.dag.iter_mut().find(|n| n.id == node_id) {
        node.status = status;
    }
}

fn set_kind_status(state: &mut ResearchState, kind: NodeKind, status: NodeStatus) {
    for node in state.dag.iter_mut().filter(|n| n.kind == kind) {
        node.status = status;
    }
}

fn derive_progress(dag: &[DagNode]) -> f64 {
    if dag.is_empty() {
        return 0.0;
    }
    let completed = dag.iter().filter(|n| n.status == NodeStatus::Complete).count();
    completed as f64 / dag.len() as f64
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_domain::research::Perspective;
    use fathom_domain::stream::Usage;

    fn plan_with(workers: usize) -> (Plan, Vec<DagNode>) {
        let plan = Plan {
            topic: "foo café".into(),
            perspectives: (0..workers)
                .map(|i| Perspective {
                    name: format!("P{i}"),
                    focus: format!("angle {i}"),
                    seed_questions: vec![],
                })
                .collect(),
        };
        let mut dag: Vec<DagNode> = (0..workers)
            .map(|i| DagNode {
                id: format!("search-{}", i + 1),
                kind: NodeKind::Search,
                depends_on: vec![],
                status: NodeStatus::Pending,
            })
            .collect();
        dag.push(DagNode {
            id: "analysis".into(),
            kind: NodeKind::Analysis,
            depends_on: (0..workers).map(|i| format!("search-{}", i + 1)).collect(),
            status: NodeStatus::Pending,
        });
        dag.push(DagNode {
            id: "synthesis".into(),
            kind: NodeKind::Synthesis,
            depends_on: vec!["analysis".into()],
            status: NodeStatus::Pending,
        });
        (plan, dag)
    }

    fn some_cost() -> CostBreakdown {
        fathom_domain::cost::PricingTable::default().cost_for("m", Usage::new(1000, 500))
    }

    fn started_aggregate(workers: usize) -> ResearchAggregate {
        let aggregate = ResearchAggregate::new("agg-1");
        aggregate
            .execute(Command::StartResearch {
                query: "history of Foo Café".into(),
                mode: ResearchMode::Deep,
            })
            .unwrap();
        let (plan, dag) = plan_with(workers);
        aggregate
            .execute(Command::SetPlan {
                plan,
                dag,
                cost: some_cost(),
            })
            .unwrap();
        aggregate
    }

    fn run_worker(aggregate: &ResearchAggregate, id: &str) {
        aggregate
            .execute(Command::StartWorker {
                worker_id: id.into(),
                objective: "dig".into(),
            })
            .unwrap();
        aggregate
            .execute(Command::CompleteWorker {
                worker_id: id.into(),
                output: "notes".into(),
                facts: vec![],
                sources: vec!["https://a.example".into()],
                cost: some_cost(),
            })
            .unwrap();
    }

    #[test]
    fn start_requires_pending_and_query() {
        let aggregate = ResearchAggregate::new("agg");
        let err = aggregate.execute(Command::StartResearch {
            query: "  ".into(),
            mode: ResearchMode::Fast,
        });
        assert!(matches!(err, Err(Error::Validation(_))));

        aggregate
            .execute(Command::StartResearch {
                query: "q".into(),
                mode: ResearchMode::Fast,
            })
            .unwrap();
        // Starting twice is rejected.
        let err = aggregate.execute(Command::StartResearch {
            query: "q".into(),
            mode: ResearchMode::Fast,
        });
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn plan_creates_workers_keyed_by_search_nodes() {
        let aggregate = started_aggregate(3);
        let state = aggregate.state();

        assert_eq!(state.status, ResearchStatus::Searching);
        assert_eq!(state.workers.len(), 3);
        for node in state.dag.iter().filter(|n| n.kind == NodeKind::Search) {
            assert!(state.workers.contains_key(&node.id));
        }
        assert_eq!(state.workers["search-1"].ordinal, 1);
        assert_eq!(state.workers["search-1"].status, WorkerStatus::Pending);
    }

    #[test]
    fn version_increases_by_one_per_event() {
        let aggregate = started_aggregate(2);
        assert_eq!(aggregate.version(), 2);
        run_worker(&aggregate, "search-1");
        assert_eq!(aggregate.version(), 4);
    }

    #[test]
    fn worker_lifecycle_validation() {
        let aggregate = started_aggregate(1);

        // Completing before starting is rejected.
        let err = aggregate.execute(Command::CompleteWorker {
            worker_id: "search-1".into(),
            output: String::new(),
            facts: vec![],
            sources: vec![],
            cost: CostBreakdown::default(),
        });
        assert!(matches!(err, Err(Error::Validation(_))));

        // Unknown worker is rejected.
        let err = aggregate.execute(Command::StartWorker {
            worker_id: "ghost".into(),
            objective: "x".into(),
        });
        assert!(matches!(err, Err(Error::Validation(_))));

        run_worker(&aggregate, "search-1");
        assert_eq!(aggregate.state().workers["search-1"].status, WorkerStatus::Complete);
    }

    #[test]
    fn progress_tracks_dag_completion() {
        let aggregate = started_aggregate(2);
        // 4 nodes total: 2 search + analysis + synthesis.
        assert!((aggregate.state().progress - 0.0).abs() < 1e-9);

        run_worker(&aggregate, "search-1");
        assert!((aggregate.state().progress - 0.25).abs() < 1e-9);

        run_worker(&aggregate, "search-2");
        assert!((aggregate.state().progress - 0.5).abs() < 1e-9);

        aggregate.execute(Command::StartAnalysis).unwrap();
        aggregate
            .execute(Command::SetAnalysis {
                analysis: Analysis::default(),
                cost: some_cost(),
            })
            .unwrap();
        assert!((aggregate.state().progress - 0.75).abs() < 1e-9);

        aggregate.execute(Command::StartSynthesis).unwrap();
        aggregate
            .execute(Command::SetReport {
                report: Report {
                    title: "t".into(),
                    summary: "s".into(),
                    content: "c".into(),
                    citations: vec![],
                },
                cost: some_cost(),
            })
            .unwrap();
        assert!((aggregate.state().progress - 1.0).abs() < 1e-9);

        aggregate.execute(Command::CompleteResearch).unwrap();
        let state = aggregate.state();
        assert_eq!(state.status, ResearchStatus::Complete);
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn failed_worker_does_not_count_as_progress() {
        let aggregate = started_aggregate(2);
        aggregate
            .execute(Command::StartWorker {
                worker_id: "search-1".into(),
                objective: "dig".into(),
            })
            .unwrap();
        aggregate
            .execute(Command::FailWorker {
                worker_id: "search-1".into(),
                error: "timeout".into(),
                cost: CostBreakdown::default(),
            })
            .unwrap();

        let state = aggregate.state();
        assert!((state.progress - 0.0).abs() < 1e-9);
        assert_eq!(state.workers["search-1"].status, WorkerStatus::Failed);
        assert_eq!(state.workers["search-1"].error.as_deref(), Some("timeout"));
    }

    #[test]
    fn cost_accumulates_from_event_payloads() {
        let aggregate = started_aggregate(1); // plan carries one cost
        run_worker(&aggregate, "search-1"); // completion carries another

        let expected = some_cost() + some_cost();
        let total = aggregate.state().total_cost;
        assert_eq!(total.total_tokens, expected.total_tokens);
        assert!((total.total_cost_usd - expected.total_cost_usd).abs() < 1e-12);
    }

    #[test]
    fn complete_requires_report() {
        let aggregate = started_aggregate(1);
        let err = aggregate.execute(Command::CompleteResearch);
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let aggregate = started_aggregate(1);
        aggregate
            .execute(Command::CancelResearch {
                reason: "user".into(),
            })
            .unwrap();
        assert_eq!(aggregate.state().status, ResearchStatus::Cancelled);

        let err = aggregate.execute(Command::FailResearch {
            failed_phase: "searching".into(),
            error: "x".into(),
        });
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn replay_reproduces_state() {
        let aggregate = started_aggregate(2);
        run_worker(&aggregate, "search-1");
        aggregate
            .execute(Command::StartWorker {
                worker_id: "search-2".into(),
                objective: "dig".into(),
            })
            .unwrap();
        aggregate
            .execute(Command::FailWorker {
                worker_id: "search-2".into(),
                error: "boom".into(),
                cost: some_cost(),
            })
            .unwrap();

        let events = aggregate.take_uncommitted();
        let replayed = ResearchAggregate::load_from_events("agg-1", &events).unwrap();
        assert_eq!(replayed.state(), aggregate.state());
    }

    #[test]
    fn replay_rejects_version_gaps() {
        let aggregate = started_aggregate(1);
        let mut events = aggregate.take_uncommitted();
        events.remove(0); // stream now starts at version 2

        let err = ResearchAggregate::load_from_events("agg-1", &events);
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn ready_workers_respect_dependencies() {
        let aggregate = ResearchAggregate::new("agg");
        aggregate
            .execute(Command::StartResearch {
                query: "q".into(),
                mode: ResearchMode::Fast,
            })
            .unwrap();

        let plan = Plan {
            topic: "t".into(),
            perspectives: vec![Perspective {
                name: "P".into(),
                focus: "f".into(),
                seed_questions: vec![],
            }],
        };
        let dag = vec![
            DagNode {
                id: "search-1".into(),
                kind: NodeKind::Search,
                depends_on: vec![],
                status: NodeStatus::Pending,
            },
            DagNode {
                id: "search-2".into(),
                kind: NodeKind::Search,
                depends_on: vec!["search-1".into()],
                status: NodeStatus::Pending,
            },
        ];
        aggregate
            .execute(Command::SetPlan {
                plan,
                dag,
                cost: CostBreakdown::default(),
            })
            .unwrap();

        assert_eq!(aggregate.state().ready_worker_ids(), vec!["search-1"]);
        run_worker(&aggregate, "search-1");
        assert_eq!(aggregate.state().ready_worker_ids(), vec!["search-2"]);
    }

    #[test]
    fn running_workers_reset_to_pending_on_resume() {
        let aggregate = started_aggregate(2);
        aggregate
            .execute(Command::StartWorker {
                worker_id: "search-1".into(),
                objective: "dig".into(),
            })
            .unwrap();

        // Crash here: rebuild from the persisted stream, then rehydrate.
        let events = aggregate.take_uncommitted();
        let resumed = ResearchAggregate::load_from_events("agg-1", &events).unwrap();
        assert_eq!(resumed.state().workers["search-1"].status, WorkerStatus::Running);

        resumed.reset_running_workers();
        let state = resumed.state();
        assert_eq!(state.workers["search-1"].status, WorkerStatus::Pending);
        assert_eq!(state.ready_worker_ids(), vec!["search-1", "search-2"]);
    }

    #[test]
    fn failed_from_pending_is_allowed() {
        let aggregate = started_aggregate(1);
        aggregate
            .execute(Command::FailWorker {
                worker_id: "search-1".into(),
                error: "dependency failed".into(),
                cost: CostBreakdown::default(),
            })
            .unwrap();
        assert_eq!(aggregate.state().workers["search-1"].status, WorkerStatus::Failed);
    }

    #[test]
    fn snapshot_event_does_not_change_domain_state() {
        let aggregate = started_aggregate(1);
        let before = aggregate.state();
        aggregate.execute(Command::TakeSnapshot).unwrap();
        let after = aggregate.state();
        assert_eq!(after.status, before.status);
        assert_eq!(after.version, before.version + 1);
    }
}
