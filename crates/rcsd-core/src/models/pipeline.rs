use super::consensus::ConsensusReport;
use super::hitl::GateRecord;
use super::research::ResearchOutput;
use super::spec::SpecDocument;
use super::task::TaskGraph;
use crate::exit::ExitCode;
use crate::{RcsdError, RcsdResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Pipeline stage. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Evidence gathering.
    Research,
    /// Five-validator adversarial review of the evidence.
    Consensus,
    /// Specification generation and validation.
    Spec,
    /// Task decomposition into a DAG.
    Decompose,
    /// The run finished successfully.
    Done,
    /// The run terminated with a failure exit code.
    Aborted,
}

impl Stage {
    /// The four working stages, in execution order.
    pub const WORK_STAGES: [Stage; 4] = [
        Stage::Research,
        Stage::Consensus,
        Stage::Spec,
        Stage::Decompose,
    ];

    /// Whether this stage ends the run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Aborted)
    }

    /// Lowercase name used in config files and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Consensus => "consensus",
            Stage::Spec => "spec",
            Stage::Decompose => "decompose",
            Stage::Done => "done",
            Stage::Aborted => "aborted",
        }
    }

    /// Whether the transition table allows `self -> to`.
    ///
    /// Every non-terminal stage may abort. `Consensus -> Research` is the
    /// bounded revision loop.
    pub fn can_transition_to(self, to: Stage) -> bool {
        match (self, to) {
            (from, Stage::Aborted) => !from.is_terminal(),
            (Stage::Research, Stage::Consensus)
            | (Stage::Consensus, Stage::Spec)
            | (Stage::Consensus, Stage::Research)
            | (Stage::Spec, Stage::Decompose)
            | (Stage::Decompose, Stage::Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = RcsdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "research" => Ok(Stage::Research),
            "consensus" => Ok(Stage::Consensus),
            "spec" => Ok(Stage::Spec),
            "decompose" => Ok(Stage::Decompose),
            "done" => Ok(Stage::Done),
            "aborted" => Ok(Stage::Aborted),
            other => Err(RcsdError::InvalidStage(format!("unknown stage '{other}'"))),
        }
    }
}

/// Status of one working stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not started yet (or reset by a revision).
    Pending,
    /// Currently executing.
    Running,
    /// Finished and the run moved on.
    Completed,
    /// The run aborted while in this stage.
    Failed,
}

/// Why and where a run was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortReport {
    /// The stage the run was in.
    pub stage: Stage,
    /// The component that caused the abort (collaborator, engine, gate, ...).
    pub component: String,
    /// The exit code the abort maps to.
    pub exit_code: ExitCode,
    /// Human-readable cause.
    pub reason: String,
}

impl fmt::Display for AbortReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "aborted in {} by {}: {} [{}]",
            self.stage, self.component, self.reason, self.exit_code
        )
    }
}

/// One end-to-end execution of the pipeline.
///
/// Owned by the stage machine and mutated only through [`PipelineRun::transition`],
/// [`PipelineRun::complete`] and [`PipelineRun::abort`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run identifier, also the storage key.
    pub id: Uuid,
    /// The natural-language topic.
    pub topic: String,
    /// Current stage.
    pub stage: Stage,
    /// Status of each working stage.
    pub stage_status: BTreeMap<Stage, StageStatus>,
    /// Number of `NEEDS_REVISION` rounds so far.
    #[serde(default)]
    pub revisions: u32,
    /// Guidance for the next research pass after `NEEDS_REVISION`.
    #[serde(default)]
    pub revision_guidance: Option<String>,
    /// Latest research output.
    #[serde(default)]
    pub research: Option<ResearchOutput>,
    /// Latest consensus report.
    #[serde(default)]
    pub consensus: Option<ConsensusReport>,
    /// Generated specification.
    #[serde(default)]
    pub spec: Option<SpecDocument>,
    /// Validated task graph.
    #[serde(default)]
    pub tasks: Option<TaskGraph>,
    /// Resolved HITL gates, in the order they were opened.
    #[serde(default)]
    pub gates: Vec<GateRecord>,
    /// Exit code, set once the run is terminal.
    #[serde(default)]
    pub exit_code: Option<ExitCode>,
    /// Abort report, set when the run is `Aborted`.
    #[serde(default)]
    pub abort: Option<AbortReport>,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// When the run was last mutated.
    pub updated_at: DateTime<Utc>,
    /// When the run reached a terminal stage.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Creates a run in `Research` with every working stage pending.
    pub fn new(topic: impl Into<String>) -> Self {
        let now = Utc::now();
        let stage_status = Stage::WORK_STAGES
            .into_iter()
            .map(|s| (s, StageStatus::Pending))
            .collect();
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            stage: Stage::Research,
            stage_status,
            revisions: 0,
            revision_guidance: None,
            research: None,
            consensus: None,
            spec: None,
            tasks: None,
            gates: Vec::new(),
            exit_code: None,
            abort: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Whether the run reached `Done` or `Aborted`.
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Status of a working stage.
    pub fn status_of(&self, stage: Stage) -> Option<StageStatus> {
        self.stage_status.get(&stage).copied()
    }

    /// Marks the current working stage as running.
    pub fn mark_running(&mut self) {
        if !self.stage.is_terminal() {
            self.stage_status.insert(self.stage, StageStatus::Running);
            self.updated_at = Utc::now();
        }
    }

    /// Moves to a non-terminal stage along the transition table.
    ///
    /// Going back from `Consensus` to `Research` resets the consensus status
    /// to pending. Use [`PipelineRun::complete`] and [`PipelineRun::abort`] for
    /// terminal stages.
    pub fn transition(&mut self, to: Stage) -> RcsdResult<()> {
        if to.is_terminal() || !self.stage.can_transition_to(to) {
            return Err(RcsdError::InvalidStage(format!(
                "illegal transition {} -> {}",
                self.stage, to
            )));
        }
        if self.stage == Stage::Consensus && to == Stage::Research {
            self.stage_status.insert(Stage::Consensus, StageStatus::Pending);
        } else {
            self.stage_status.insert(self.stage, StageStatus::Completed);
        }
        self.stage_status.insert(to, StageStatus::Pending);
        self.stage = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Moves `Decompose -> Done` and records [`ExitCode::Success`].
    pub fn complete(&mut self) -> RcsdResult<()> {
        if !self.stage.can_transition_to(Stage::Done) {
            return Err(RcsdError::InvalidStage(format!(
                "cannot complete a run in {}",
                self.stage
            )));
        }
        self.stage_status.insert(self.stage, StageStatus::Completed);
        self.stage = Stage::Done;
        self.exit_code = Some(ExitCode::Success);
        self.finish();
        Ok(())
    }

    /// Moves to `Aborted`, recording the report and its exit code.
    pub fn abort(&mut self, report: AbortReport) -> RcsdResult<()> {
        if self.stage.is_terminal() {
            return Err(RcsdError::InvalidStage(format!(
                "cannot abort a run that is already {}",
                self.stage
            )));
        }
        self.stage_status.insert(self.stage, StageStatus::Failed);
        self.stage = Stage::Aborted;
        self.exit_code = Some(report.exit_code);
        self.abort = Some(report);
        self.finish();
        Ok(())
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.updated_at = now;
        self.completed_at = Some(now);
    }
}
