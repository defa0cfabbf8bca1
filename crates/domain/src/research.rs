//! Research session state types: plan, DAG, workers, analysis, report.
//!
//! These are the value types carried inside events and replayed into the
//! aggregate. They hold no behavior beyond small derivations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::CostBreakdown;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session mode / status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchMode {
    /// Plan once, run all search workers concurrently, analyze, report.
    Fast,
    /// Adds the supervisor diffusion loop on top of the planned workers.
    Deep,
}

impl ResearchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fast" => Some(Self::Fast),
            "deep" => Some(Self::Deep),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchStatus {
    Pending,
    Planning,
    Searching,
    Analyzing,
    Synthesizing,
    Complete,
    Failed,
    Cancelled,
}

impl ResearchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planning => "planning",
            Self::Searching => "searching",
            Self::Analyzing => "analyzing",
            Self::Synthesizing => "synthesizing",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plan and DAG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A named viewpoint used to diversify sub-researcher objectives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perspective {
    pub name: String,
    pub focus: String,
    #[serde(default)]
    pub seed_questions: Vec<String>,
}

/// Output of the planning phase: a topic plus ordered perspectives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub topic: String,
    pub perspectives: Vec<Perspective>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Search,
    Analysis,
    Synthesis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

/// A node in the session's task DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub status: NodeStatus,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

/// State of a single sub-researcher slot.
///
/// Created on plan application (one per DAG search node, same id) and
/// mutated only through worker start/complete/fail events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerState {
    pub id: String,
    pub ordinal: u32,
    pub objective: String,
    pub perspective: Perspective,
    pub status: WorkerStatus,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub facts: Vec<Fact>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub cost: CostBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Facts, analysis, report
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A claim extracted by a sub-researcher, with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub content: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub source_url: String,
}

/// A fact that survived cross-worker validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedFact {
    pub content: String,
    pub confidence: f64,
    /// Source ids (URLs) that corroborate the claim. Validation requires
    /// at least two distinct entries.
    pub corroborated_by: Vec<String>,
}

/// Output of the analysis phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub validated_facts: Vec<ValidatedFact>,
    #[serde(default)]
    pub contradictions: Vec<String>,
    #[serde(default)]
    pub knowledge_gaps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub number: u32,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// The final research report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub summary: String,
    pub content: String,
    pub citations: Vec<Citation>,
}

/// A single insight recorded by the supervisor from a sub-research run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubInsight {
    pub id: String,
    pub topic: String,
    pub finding: String,
    pub implication: String,
    pub source_url: String,
    pub confidence: f64,
    pub iteration: u32,
    pub researcher: u32,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(ResearchStatus::Complete.is_terminal());
        assert!(ResearchStatus::Failed.is_terminal());
        assert!(ResearchStatus::Cancelled.is_terminal());
        assert!(!ResearchStatus::Searching.is_terminal());
    }

    #[test]
    fn mode_parses() {
        assert_eq!(ResearchMode::parse("fast"), Some(ResearchMode::Fast));
        assert_eq!(ResearchMode::parse("deep"), Some(ResearchMode::Deep));
        assert_eq!(ResearchMode::parse("slow"), None);
    }

    #[test]
    fn worker_state_roundtrips() {
        let worker = WorkerState {
            id: "search-1".into(),
            ordinal: 1,
            objective: "history".into(),
            perspective: Perspective {
                name: "Historian".into(),
                focus: "origins".into(),
                seed_questions: vec!["when?".into()],
            },
            status: WorkerStatus::Pending,
            output: String::new(),
            facts: vec![],
            sources: vec![],
            cost: CostBreakdown::default(),
            error: None,
        };
        let json = serde_json::to_string(&worker).unwrap();
        let back: WorkerState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, worker);
    }
}
