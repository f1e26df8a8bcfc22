use rcsd_core::{AbortReport, ExitCode, GateState, PipelineRun, Stage, StageStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Final outcome of `run` and `resume`, printed as JSON on stdout.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub run_id: Uuid,
    pub topic: &'a str,
    pub stage: Stage,
    pub exit_code: i32,
    pub exit_name: &'static str,
    pub revisions: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<&'a AbortReport>,
    pub gates: Vec<GateSummary<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_title: Option<&'a str>,
    pub tasks: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct GateSummary<'a> {
    pub checkpoint: Stage,
    pub state: GateState,
    pub reviewer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<&'a str>,
}

/// What `status` prints.
#[derive(Debug, Serialize)]
pub struct RunStatus<'a> {
    pub run_id: Uuid,
    pub topic: &'a str,
    pub stage: Stage,
    pub stage_status: &'a BTreeMap<Stage, StageStatus>,
    pub revisions: u32,
    pub exit_code: Option<i32>,
    pub exit_name: Option<&'static str>,
    pub abort: Option<&'a AbortReport>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Exit code of a run that was driven to the end. A run left non-terminal
/// means the stage machine broke its own contract.
pub fn exit_code_of(run: &PipelineRun) -> ExitCode {
    run.exit_code.unwrap_or(ExitCode::InvalidStage)
}

pub fn run_summary(run: &PipelineRun) -> RunSummary<'_> {
    let exit = exit_code_of(run);
    RunSummary {
        run_id: run.id,
        topic: &run.topic,
        stage: run.stage,
        exit_code: exit.code(),
        exit_name: exit.name(),
        revisions: run.revisions,
        abort: run.abort.as_ref(),
        gates: run
            .gates
            .iter()
            .map(|g| GateSummary {
                checkpoint: g.checkpoint,
                state: g.state,
                reviewer: &g.decision.reviewer,
                comment: g.decision.comment.as_deref(),
            })
            .collect(),
        spec_title: run.spec.as_ref().map(|s| s.title.as_str()),
        tasks: run.tasks.as_ref().map(|t| t.order()).unwrap_or_default(),
    }
}

pub fn run_status(run: &PipelineRun) -> RunStatus<'_> {
    RunStatus {
        run_id: run.id,
        topic: &run.topic,
        stage: run.stage,
        stage_status: &run.stage_status,
        revisions: run.revisions,
        exit_code: run.exit_code.map(ExitCode::code),
        exit_name: run.exit_code.map(ExitCode::name),
        abort: run.abort.as_ref(),
        updated_at: run.updated_at,
    }
}

/// The `exit-codes` table, one `code  NAME` line per entry.
pub fn exit_code_table() -> String {
    ExitCode::ALL
        .into_iter()
        .map(|c| format!("{:>3}  {}", c.code(), c.name()))
        .collect::<Vec<_>>()
        .join("\n")
}
