//! Domain events for the research aggregate.
//!
//! Events are an internally-tagged union: the `type` discriminator string
//! picks the payload shape on deserialization, and the aggregate's apply
//! is a match over the variants. Per aggregate, versions form a gap-free
//! ascending sequence starting at 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::CostBreakdown;
use crate::research::{Analysis, DagNode, Fact, Plan, Report, ResearchMode};

/// An immutable, persisted domain event.
///
/// Serialized JSON shape: `{id, aggregate_id, version, timestamp, type,
/// …payload}` with an RFC3339 timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    pub aggregate_id: String,
    /// Target aggregate version after this event is applied.
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventEnvelope {
    pub fn new(aggregate_id: impl Into<String>, version: u64, payload: EventPayload) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            aggregate_id: aggregate_id.into(),
            version,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// The fixed discriminator string, e.g. `"worker.completed"`.
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    /// Discriminator with non-alphanumeric characters replaced, safe for
    /// use inside a filename (`worker.completed` → `worker_completed`).
    pub fn sanitized_type(&self) -> String {
        self.event_type()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    /// The cost carried by this event's payload, if any.
    pub fn cost(&self) -> Option<CostBreakdown> {
        match &self.payload {
            EventPayload::PlanCreated { cost, .. }
            | EventPayload::WorkerCompleted { cost, .. }
            | EventPayload::WorkerFailed { cost, .. }
            | EventPayload::AnalysisCompleted { cost, .. }
            | EventPayload::ReportGenerated { cost, .. } => Some(*cost),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "research.started")]
    ResearchStarted { query: String, mode: ResearchMode },

    #[serde(rename = "plan.created")]
    PlanCreated {
        plan: Plan,
        dag: Vec<DagNode>,
        cost: CostBreakdown,
    },

    #[serde(rename = "worker.started")]
    WorkerStarted { worker_id: String, objective: String },

    #[serde(rename = "worker.completed")]
    WorkerCompleted {
        worker_id: String,
        output: String,
        facts: Vec<Fact>,
        sources: Vec<String>,
        cost: CostBreakdown,
    },

    #[serde(rename = "worker.failed")]
    WorkerFailed {
        worker_id: String,
        error: String,
        cost: CostBreakdown,
    },

    #[serde(rename = "analysis.started")]
    AnalysisStarted {},

    #[serde(rename = "analysis.completed")]
    AnalysisCompleted { analysis: Analysis, cost: CostBreakdown },

    #[serde(rename = "synthesis.started")]
    SynthesisStarted {},

    #[serde(rename = "report.generated")]
    ReportGenerated { report: Report, cost: CostBreakdown },

    #[serde(rename = "research.completed")]
    ResearchCompleted {},

    #[serde(rename = "research.failed")]
    ResearchFailed { failed_phase: String, error: String },

    #[serde(rename = "research.cancelled")]
    ResearchCancelled { reason: String },

    #[serde(rename = "snapshot.taken")]
    SnapshotTaken { snapshot_version: u64 },
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ResearchStarted { .. } => "research.started",
            Self::PlanCreated { .. } => "plan.created",
            Self::WorkerStarted { .. } => "worker.started",
            Self::WorkerCompleted { .. } => "worker.completed",
            Self::WorkerFailed { .. } => "worker.failed",
            Self::AnalysisStarted {} => "analysis.started",
            Self::AnalysisCompleted { .. } => "analysis.completed",
            Self::SynthesisStarted {} => "synthesis.started",
            Self::ReportGenerated { .. } => "report.generated",
            Self::ResearchCompleted {} => "research.completed",
            Self::ResearchFailed { .. } => "research.failed",
            Self::ResearchCancelled { .. } => "research.cancelled",
            Self::SnapshotTaken { .. } => "snapshot.taken",
        }
    }
}
