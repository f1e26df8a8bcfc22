use super::pipeline::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reviewer's verdict at a HITL gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HitlVerdict {
    /// Let the pipeline advance.
    Approve,
    /// Stop the pipeline.
    Reject,
    /// No decision arrived before the deadline.
    Timeout,
}

/// The decision recorded when a gate resolves. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitlDecision {
    /// Approve, reject or timeout.
    pub verdict: HitlVerdict,
    /// Optional reviewer comment.
    #[serde(default)]
    pub comment: Option<String>,
    /// Who decided; `system` for decisions the gate made itself.
    pub reviewer: String,
    /// When the decision was recorded.
    pub decided_at: DateTime<Utc>,
}

impl HitlDecision {
    /// An approval by `reviewer`.
    pub fn approve(reviewer: impl Into<String>) -> Self {
        Self {
            verdict: HitlVerdict::Approve,
            comment: None,
            reviewer: reviewer.into(),
            decided_at: Utc::now(),
        }
    }

    /// A rejection by `reviewer`.
    pub fn reject(reviewer: impl Into<String>, comment: Option<String>) -> Self {
        Self {
            verdict: HitlVerdict::Reject,
            comment,
            reviewer: reviewer.into(),
            decided_at: Utc::now(),
        }
    }

    /// The decision the gate records itself when its deadline elapses.
    pub fn timeout(comment: impl Into<String>) -> Self {
        Self {
            verdict: HitlVerdict::Timeout,
            comment: Some(comment.into()),
            reviewer: "system".to_string(),
            decided_at: Utc::now(),
        }
    }

    /// Attaches a comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Lifecycle of a single-use HITL gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateState {
    /// Waiting for a decision.
    Open,
    /// A reviewer approved.
    Approved,
    /// A reviewer rejected, or the channel failed.
    Rejected,
    /// The deadline elapsed first.
    TimedOut,
}

impl GateState {
    /// Whether the gate has left `Open`.
    pub fn is_resolved(self) -> bool {
        self != GateState::Open
    }

    /// Whether the pipeline may advance past the gate.
    pub fn is_approved(self) -> bool {
        self == GateState::Approved
    }
}

/// What the reviewer channel is shown when a gate opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPayload {
    /// Unique id of the gate instance.
    pub gate_id: Uuid,
    /// The run being gated.
    pub run_id: Uuid,
    /// The stage whose output is being reviewed.
    pub checkpoint: Stage,
    /// The run topic.
    pub topic: String,
    /// One-paragraph summary of the artifact under review.
    pub summary: String,
    /// The artifact itself, or the part of it worth showing.
    #[serde(default)]
    pub details: serde_json::Value,
    /// When the gate stops waiting.
    pub deadline: DateTime<Utc>,
}

/// A resolved gate as recorded on the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRecord {
    /// Unique id of the gate instance.
    pub gate_id: Uuid,
    /// The stage whose output was reviewed.
    pub checkpoint: Stage,
    /// Final state of the gate.
    pub state: GateState,
    /// The decision that resolved it.
    pub decision: HitlDecision,
}
