//! Pipeline data model.
//!
//! Every entity here round-trips losslessly through `serde_json`, which is
//! what the run store relies on to recover a run after a restart.

/// Consensus verdicts, findings and reports.
pub mod consensus;
/// HITL decisions, gate states and decision payloads.
pub mod hitl;
/// The pipeline run, its stages and per-stage status.
pub mod pipeline;
/// Research evidence bundles.
pub mod research;
/// Specification documents and their validation status.
pub mod spec;
/// Atomic task nodes and the validated task graph.
pub mod task;

pub use consensus::{
    ConsensusReport, Finding, FindingRef, FindingSource, Ruling, RulingDecision, Severity,
    SynthesisDecision, UnresolvedFinding, ValidatorRole, ValidatorVerdict, Verdict,
    SYNTHESIS_UNAVAILABLE, VALIDATOR_UNAVAILABLE,
};
pub use hitl::{DecisionPayload, GateRecord, GateState, HitlDecision, HitlVerdict};
pub use pipeline::{AbortReport, PipelineRun, Stage, StageStatus};
pub use research::{Citation, ResearchOutput, ResearchRequest};
pub use spec::{SpecDocument, SpecValidation};
pub use task::{Effort, TaskGraph, TaskNode};
