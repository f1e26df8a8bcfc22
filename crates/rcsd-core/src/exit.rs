use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit status of a terminated pipeline run.
///
/// `Success` is reported for `DONE`; every `ABORTED` run maps to exactly one
/// of the failure codes. The numeric values are a process-boundary contract
/// and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitCode {
    /// The run reached `DONE`.
    Success,
    /// The research collaborator failed.
    ResearchFailed,
    /// The consensus engine failed or the revision cap was exceeded.
    ConsensusFailed,
    /// The consensus round adjudicated `REJECTED`.
    ConsensusRejected,
    /// Spec generation failed.
    SpecFailed,
    /// The generated spec failed schema validation.
    SpecValidationFailed,
    /// Decompose generation or task graph validation failed.
    DecomposeFailed,
    /// A HITL gate deadline elapsed without a decision.
    HitlTimeout,
    /// A reviewer rejected a HITL gate.
    HitlRejected,
    /// The run was cancelled by an external abort signal.
    PipelineAborted,
    /// An unrecognized stage or verdict, or an illegal transition.
    InvalidStage,
}

impl ExitCode {
    /// Every exit code, in numeric order.
    pub const ALL: [ExitCode; 11] = [
        ExitCode::Success,
        ExitCode::ResearchFailed,
        ExitCode::ConsensusFailed,
        ExitCode::ConsensusRejected,
        ExitCode::SpecFailed,
        ExitCode::SpecValidationFailed,
        ExitCode::DecomposeFailed,
        ExitCode::HitlTimeout,
        ExitCode::HitlRejected,
        ExitCode::PipelineAborted,
        ExitCode::InvalidStage,
    ];

    /// Numeric process exit status.
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::ResearchFailed => 30,
            ExitCode::ConsensusFailed => 31,
            ExitCode::ConsensusRejected => 32,
            ExitCode::SpecFailed => 33,
            ExitCode::SpecValidationFailed => 34,
            ExitCode::DecomposeFailed => 35,
            ExitCode::HitlTimeout => 36,
            ExitCode::HitlRejected => 37,
            ExitCode::PipelineAborted => 38,
            ExitCode::InvalidStage => 39,
        }
    }

    /// Stable symbolic name, e.g. `CONSENSUS_REJECTED`.
    pub fn name(self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::ResearchFailed => "RESEARCH_FAILED",
            ExitCode::ConsensusFailed => "CONSENSUS_FAILED",
            ExitCode::ConsensusRejected => "CONSENSUS_REJECTED",
            ExitCode::SpecFailed => "SPEC_FAILED",
            ExitCode::SpecValidationFailed => "SPEC_VALIDATION_FAILED",
            ExitCode::DecomposeFailed => "DECOMPOSE_FAILED",
            ExitCode::HitlTimeout => "HITL_TIMEOUT",
            ExitCode::HitlRejected => "HITL_REJECTED",
            ExitCode::PipelineAborted => "PIPELINE_ABORTED",
            ExitCode::InvalidStage => "INVALID_STAGE",
        }
    }

    /// Look up an exit code by its numeric value.
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Look up an exit code by its symbolic name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_uppercase();
        Self::ALL.into_iter().find(|c| c.name() == upper)
    }

    /// Whether this code reports a successful run.
    pub fn is_success(self) -> bool {
        self == ExitCode::Success
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}
