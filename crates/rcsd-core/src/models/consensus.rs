use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message carried by the stand-in verdict of a validator that did not answer.
pub const VALIDATOR_UNAVAILABLE: &str = "validator unavailable";

/// Message carried by the unresolved finding added when synthesis fails.
pub const SYNTHESIS_UNAVAILABLE: &str = "synthesis unavailable";

/// The five independent validators of a consensus round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorRole {
    /// Checks technical accuracy of the evidence.
    Technical,
    /// Evaluates the design principles behind the proposal.
    DesignPhilosophy,
    /// Checks documentation quality and sourcing.
    Documentation,
    /// Assesses whether the proposal can be implemented.
    Implementation,
    /// Argues against the proposal on purpose.
    Challenge,
}

impl ValidatorRole {
    /// All roles, in the canonical order verdicts are reported in.
    pub const ALL: [ValidatorRole; 5] = [
        ValidatorRole::Technical,
        ValidatorRole::DesignPhilosophy,
        ValidatorRole::Documentation,
        ValidatorRole::Implementation,
        ValidatorRole::Challenge,
    ];

    /// Name of the agent that plays this role.
    pub fn agent_name(self) -> &'static str {
        match self {
            ValidatorRole::Technical => "technical_validator",
            ValidatorRole::DesignPhilosophy => "design_philosophy_validator",
            ValidatorRole::Documentation => "documentation_validator",
            ValidatorRole::Implementation => "implementation_validator",
            ValidatorRole::Challenge => "challenge_validator",
        }
    }
}

impl fmt::Display for ValidatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorRole::Technical => write!(f, "technical"),
            ValidatorRole::DesignPhilosophy => write!(f, "design_philosophy"),
            ValidatorRole::Documentation => write!(f, "documentation"),
            ValidatorRole::Implementation => write!(f, "implementation"),
            ValidatorRole::Challenge => write!(f, "challenge"),
        }
    }
}

/// Severity of a validator finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Must be resolved (or explicitly overridden) before approval.
    Blocking,
    /// Significant, but does not block on its own.
    Major,
    /// Cosmetic or low-impact.
    Minor,
    /// Informational only.
    Info,
}

/// A single observation reported by a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// How serious the observation is.
    pub severity: Severity,
    /// What the validator observed.
    pub message: String,
}

impl Finding {
    /// Creates a finding.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    /// Creates a blocking finding.
    pub fn blocking(message: impl Into<String>) -> Self {
        Self::new(Severity::Blocking, message)
    }
}

/// Stable reference to one finding of one validator's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FindingRef {
    /// The validator that reported the finding.
    pub role: ValidatorRole,
    /// Position of the finding in that validator's list.
    pub index: usize,
}

impl FindingRef {
    /// Creates a reference.
    pub fn new(role: ValidatorRole, index: usize) -> Self {
        Self { role, index }
    }
}

impl fmt::Display for FindingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.role, self.index)
    }
}

/// One validator's output for one consensus round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorVerdict {
    /// The validator that produced this verdict.
    pub role: ValidatorRole,
    /// Score in `[0.0, 1.0]`.
    pub score: f64,
    /// Findings, in the order the validator reported them.
    #[serde(default)]
    pub findings: Vec<Finding>,
    /// Whether the validator considers the artifact acceptable.
    pub pass: bool,
}

impl ValidatorVerdict {
    /// Lowest admissible score.
    pub const MIN_SCORE: f64 = 0.0;
    /// Highest admissible score.
    pub const MAX_SCORE: f64 = 1.0;

    /// A passing verdict with the given score and no findings.
    pub fn passing(role: ValidatorRole, score: f64) -> Self {
        Self {
            role,
            score,
            findings: Vec::new(),
            pass: true,
        }
    }

    /// The stand-in recorded for a validator that timed out or failed.
    pub fn unavailable(role: ValidatorRole) -> Self {
        Self {
            role,
            score: Self::MIN_SCORE,
            findings: vec![Finding::blocking(VALIDATOR_UNAVAILABLE)],
            pass: false,
        }
    }

    /// Appends a finding.
    pub fn with_finding(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }

    /// Checks the score bounds.
    pub fn check_bounds(&self) -> Result<(), String> {
        if !(Self::MIN_SCORE..=Self::MAX_SCORE).contains(&self.score) {
            return Err(format!(
                "score {} for {} is outside [{}, {}]",
                self.score,
                self.role,
                Self::MIN_SCORE,
                Self::MAX_SCORE
            ));
        }
        Ok(())
    }

    /// References to every blocking finding in this verdict.
    pub fn blocking_refs(&self) -> impl Iterator<Item = (FindingRef, &Finding)> + '_ {
        self.findings
            .iter()
            .enumerate()
            .filter(|(_, f)| f.severity == Severity::Blocking)
            .map(|(i, f)| (FindingRef::new(self.role, i), f))
    }
}

/// Overall verdict of a consensus round, also used as the synthesis recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// The artifact may advance to the spec stage.
    Approved,
    /// The artifact is rejected outright.
    Rejected,
    /// Research must be revised and re-validated.
    NeedsRevision,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Approved => write!(f, "APPROVED"),
            Verdict::Rejected => write!(f, "REJECTED"),
            Verdict::NeedsRevision => write!(f, "NEEDS_REVISION"),
        }
    }
}

/// How synthesis ruled on a blocking finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulingDecision {
    /// The finding stands and keeps blocking.
    Upheld,
    /// The finding is set aside; requires a justification.
    Overridden,
}

/// Synthesis ruling on one blocking finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruling {
    /// The finding being ruled on.
    pub finding: FindingRef,
    /// Upheld or overridden.
    pub decision: RulingDecision,
    /// Why the finding was overridden.
    #[serde(default)]
    pub justification: Option<String>,
}

impl Ruling {
    /// Upholds a finding.
    pub fn upheld(finding: FindingRef) -> Self {
        Self {
            finding,
            decision: RulingDecision::Upheld,
            justification: None,
        }
    }

    /// Overrides a finding with a justification.
    pub fn overridden(finding: FindingRef, justification: impl Into<String>) -> Self {
        Self {
            finding,
            decision: RulingDecision::Overridden,
            justification: Some(justification.into()),
        }
    }

    /// An override only counts when it carries a non-empty justification.
    pub fn is_justified_override(&self) -> bool {
        self.decision == RulingDecision::Overridden
            && self
                .justification
                .as_deref()
                .is_some_and(|j| !j.trim().is_empty())
    }
}

/// What the synthesis agent returned for a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisDecision {
    /// Recommended overall verdict.
    pub recommendation: Verdict,
    /// One ruling per blocking finding.
    #[serde(default)]
    pub rulings: Vec<Ruling>,
    /// Free-form adjudication summary, reused as revision guidance.
    #[serde(default)]
    pub summary: String,
}

/// Where an unresolved blocking finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingSource {
    /// A validator's finding.
    Validator {
        /// The finding reference.
        finding: FindingRef,
    },
    /// The synthesis step itself.
    Synthesis,
}

impl fmt::Display for FindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingSource::Validator { finding } => write!(f, "{finding}"),
            FindingSource::Synthesis => write!(f, "synthesis"),
        }
    }
}

/// A blocking finding that synthesis did not override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedFinding {
    /// Origin of the finding.
    pub source: FindingSource,
    /// The finding's message.
    pub message: String,
}

/// Aggregated outcome of one consensus round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    /// One verdict per validator role, in [`ValidatorRole::ALL`] order.
    pub verdicts: Vec<ValidatorVerdict>,
    /// The synthesis decision, absent when synthesis failed.
    pub synthesis: Option<SynthesisDecision>,
    /// Adjudicated overall verdict.
    pub overall: Verdict,
    /// Blocking findings that remain unresolved.
    #[serde(default)]
    pub unresolved: Vec<UnresolvedFinding>,
    /// Guidance attached to the next research pass on `NEEDS_REVISION`.
    #[serde(default)]
    pub guidance: Option<String>,
    /// When the round finished.
    #[serde(default = "Utc::now")]
    pub completed_at: DateTime<Utc>,
}

impl ConsensusReport {
    /// Whether the round approved the artifact.
    pub fn is_approved(&self) -> bool {
        self.overall == Verdict::Approved
    }

    /// Looks up the verdict of one role.
    pub fn verdict(&self, role: ValidatorRole) -> Option<&ValidatorVerdict> {
        self.verdicts.iter().find(|v| v.role == role)
    }

    /// Mean validator score, or zero without verdicts.
    pub fn mean_score(&self) -> f64 {
        if self.verdicts.is_empty() {
            return 0.0;
        }
        self.verdicts.iter().map(|v| v.score).sum::<f64>() / self.verdicts.len() as f64
    }
}
