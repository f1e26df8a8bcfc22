use crate::cancel::CancelSignal;
use crate::collaborators::{
    AgentDecomposer, AgentResearcher, AgentSpecGenerator, Decomposer, Researcher, SpecGenerator,
    SpecValidator,
};
use crate::config::PipelineConfig;
use crate::consensus::{AgentSynthesizer, ConsensusEngine};
use crate::hitl::HitlGate;
use crate::spec_validation::Rfc2119Validator;
use crate::task_graph::TaskGraphBuilder;
use crate::validators::agent_validators;
use chrono::Utc;
use rcsd_agent::AgentInvoker;
use rcsd_core::{
    AbortReport, ConsensusReport, DecisionPayload, ExitCode, GateState, PipelineRun, RcsdError,
    RcsdResult, ResearchOutput, ResearchRequest, ReviewerChannel, SpecDocument, Stage, TaskGraph,
    Verdict,
};
use rcsd_session::{JournalEvent, RunJournal, RunStore};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The content-producing collaborators the stage machine drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Produces the research artifact.
    pub researcher: Arc<dyn Researcher>,
    /// Writes the spec from approved research.
    pub spec_generator: Arc<dyn SpecGenerator>,
    /// Schema check applied to every generated spec.
    pub spec_validator: Arc<dyn SpecValidator>,
    /// Breaks the spec into raw tasks.
    pub decomposer: Arc<dyn Decomposer>,
}

impl Collaborators {
    /// Agent-backed collaborators with the default spec validator.
    pub fn from_agents(invoker: &AgentInvoker, config: &PipelineConfig) -> Self {
        Self {
            researcher: Arc::new(AgentResearcher::new(invoker.clone(), config.agent_timeout)),
            spec_generator: Arc::new(AgentSpecGenerator::new(
                invoker.clone(),
                config.agent_timeout,
            )),
            spec_validator: Arc::new(Rfc2119Validator::new(config.min_rfc2119_coverage)),
            decomposer: Arc::new(AgentDecomposer::new(invoker.clone(), config.agent_timeout)),
        }
    }
}

/// What one stage produced.
enum StageOutput {
    Research(ResearchOutput),
    Consensus(ConsensusReport),
    Spec(SpecDocument),
    Decompose(TaskGraph),
}

/// Where the run goes after a stage.
enum Next {
    Advance(Stage),
    Complete,
    Abort(AbortReport),
}

/// The pipeline stage machine.
///
/// Owns every mutation of a [`PipelineRun`]: stages produce artifacts, the
/// machine decides the transition, persists the run and records it in the
/// journal. Each terminal run carries exactly one exit code and is archived.
pub struct Pipeline {
    config: PipelineConfig,
    collaborators: Collaborators,
    consensus: ConsensusEngine,
    reviewer: Arc<dyn ReviewerChannel>,
    store: Arc<dyn RunStore>,
    journal: Option<Arc<dyn RunJournal>>,
}

impl Pipeline {
    /// Fails if `config` does not validate.
    pub fn new(
        config: PipelineConfig,
        collaborators: Collaborators,
        consensus: ConsensusEngine,
        reviewer: Arc<dyn ReviewerChannel>,
        store: Arc<dyn RunStore>,
    ) -> RcsdResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            collaborators,
            consensus,
            reviewer,
            store,
            journal: None,
        })
    }

    /// A pipeline whose every stage is played by agents behind `invoker`.
    pub fn from_agents(
        config: PipelineConfig,
        invoker: AgentInvoker,
        reviewer: Arc<dyn ReviewerChannel>,
        store: Arc<dyn RunStore>,
    ) -> RcsdResult<Self> {
        let consensus = ConsensusEngine::new(
            agent_validators(&invoker, config.agent_timeout),
            Arc::new(AgentSynthesizer::new(invoker.clone(), config.agent_timeout)),
            config.consensus_timeout,
        )?;
        let collaborators = Collaborators::from_agents(&invoker, &config);
        Self::new(config, collaborators, consensus, reviewer, store)
    }

    /// Records run events to `journal`.
    pub fn with_journal(mut self, journal: Arc<dyn RunJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// The validated configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Starts a new run for `topic` and drives it to a terminal stage.
    pub async fn run(&self, topic: &str, cancel: CancelSignal) -> RcsdResult<PipelineRun> {
        let run = PipelineRun::new(topic);
        info!(run_id = %run.id, topic = %topic, "Pipeline run started");
        self.store.save(&run).await?;
        self.note(
            run.id,
            JournalEvent::RunStarted {
                topic: topic.to_string(),
            },
        )
        .await;
        self.drive(run, cancel).await
    }

    /// Continues a persisted run from its current stage.
    ///
    /// A run that is already terminal is returned unchanged.
    pub async fn resume(&self, run_id: Uuid, cancel: CancelSignal) -> RcsdResult<PipelineRun> {
        let run = self
            .store
            .load(run_id)
            .await?
            .ok_or_else(|| RcsdError::Store(format!("run {run_id} not found")))?;

        if run.is_terminal() {
            info!(run_id = %run_id, stage = %run.stage, "Run already terminal; nothing to resume");
            if self.store.list().await?.contains(&run_id) {
                self.store.archive(run_id).await?;
            }
            return Ok(run);
        }

        info!(run_id = %run_id, stage = %run.stage, revisions = run.revisions, "Resuming run");
        self.note(run_id, JournalEvent::RunResumed { stage: run.stage })
            .await;
        self.drive(run, cancel).await
    }

    async fn drive(
        &self,
        mut run: PipelineRun,
        mut cancel: CancelSignal,
    ) -> RcsdResult<PipelineRun> {
        while !run.is_terminal() {
            let stage = run.stage;

            if cancel.is_cancelled() {
                self.abort(&mut run, cancelled_report(stage)).await?;
                break;
            }

            run.mark_running();
            self.store.save(&run).await?;
            self.note(run.id, JournalEvent::StageEntered { stage }).await;
            info!(run_id = %run.id, stage = %stage, "Stage started");

            let output = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                output = self.execute_stage(&run) => Some(output),
            };
            let next = match output {
                None => Next::Abort(cancelled_report(stage)),
                Some(Err(report)) => Next::Abort(report),
                Some(Ok(output)) => {
                    if let StageOutput::Consensus(report) = &output {
                        self.note(
                            run.id,
                            JournalEvent::ConsensusRound {
                                revision: run.revisions,
                                overall: report.overall,
                                unresolved: report.unresolved.len(),
                            },
                        )
                        .await;
                    }
                    self.apply(&mut run, output)
                }
            };

            let next = match next {
                Next::Abort(report) => Next::Abort(report),
                forward if self.config.gates_after(stage) && !is_revision(&forward) => {
                    match self.gate(&mut run, stage, &mut cancel).await? {
                        Some(report) => Next::Abort(report),
                        None => forward,
                    }
                }
                forward => forward,
            };

            match next {
                Next::Advance(to) => {
                    if let Err(e) = run.transition(to) {
                        self.abort(&mut run, invalid_stage_report(stage, "stage_machine", &e))
                            .await?;
                        break;
                    }
                    self.store.save(&run).await?;
                    self.note(run.id, JournalEvent::StageCompleted { stage }).await;
                    info!(run_id = %run.id, from = %stage, to = %to, "Stage transition");
                }
                Next::Complete => {
                    if let Err(e) = run.complete() {
                        self.abort(&mut run, invalid_stage_report(stage, "stage_machine", &e))
                            .await?;
                        break;
                    }
                    self.store.save(&run).await?;
                    self.note(run.id, JournalEvent::StageCompleted { stage }).await;
                    self.note(run.id, JournalEvent::RunCompleted).await;
                    info!(
                        run_id = %run.id,
                        exit_code = ExitCode::Success.code(),
                        "Pipeline run complete"
                    );
                }
                Next::Abort(report) => {
                    self.abort(&mut run, report).await?;
                }
            }
        }

        self.store.archive(run.id).await?;
        Ok(run)
    }

    /// Runs the current stage. Never mutates the run.
    async fn execute_stage(&self, run: &PipelineRun) -> Result<StageOutput, AbortReport> {
        match run.stage {
            Stage::Research => {
                let request = ResearchRequest {
                    topic: run.topic.clone(),
                    revision: run.revisions,
                    guidance: run.revision_guidance.clone(),
                };
                self.collaborators
                    .researcher
                    .research(&request)
                    .await
                    .map(StageOutput::Research)
                    .map_err(|e| failure(Stage::Research, "research", ExitCode::ResearchFailed, e))
            }
            Stage::Consensus => {
                let research = run
                    .research
                    .clone()
                    .ok_or_else(|| missing_artifact(Stage::Consensus, "research output"))?;
                self.consensus
                    .run_consensus(Arc::new(research))
                    .await
                    .map(StageOutput::Consensus)
                    .map_err(|e| {
                        failure(Stage::Consensus, "consensus", ExitCode::ConsensusFailed, e)
                    })
            }
            Stage::Spec => {
                let research = run
                    .research
                    .as_ref()
                    .ok_or_else(|| missing_artifact(Stage::Spec, "research output"))?;
                let consensus = run
                    .consensus
                    .as_ref()
                    .filter(|c| c.is_approved())
                    .ok_or_else(|| missing_artifact(Stage::Spec, "approved consensus report"))?;
                let mut spec = self
                    .collaborators
                    .spec_generator
                    .generate_spec(research, consensus)
                    .await
                    .map_err(|e| failure(Stage::Spec, "spec", ExitCode::SpecFailed, e))?;
                spec.validation = Some(self.collaborators.spec_validator.validate(&spec));
                Ok(StageOutput::Spec(spec))
            }
            Stage::Decompose => {
                let spec = run
                    .spec
                    .as_ref()
                    .filter(|s| s.is_valid())
                    .ok_or_else(|| missing_artifact(Stage::Decompose, "validated spec"))?;
                let raw = self
                    .collaborators
                    .decomposer
                    .decompose(spec)
                    .await
                    .map_err(|e| {
                        failure(Stage::Decompose, "decompose", ExitCode::DecomposeFailed, e)
                    })?;
                let graph = TaskGraphBuilder::build(raw).map_err(|e| AbortReport {
                    stage: Stage::Decompose,
                    component: "task_graph_builder".into(),
                    exit_code: ExitCode::DecomposeFailed,
                    reason: e.to_string(),
                })?;
                Ok(StageOutput::Decompose(graph))
            }
            Stage::Done | Stage::Aborted => Err(AbortReport {
                stage: run.stage,
                component: "stage_machine".into(),
                exit_code: ExitCode::InvalidStage,
                reason: format!("no work defined for terminal stage {}", run.stage),
            }),
        }
    }

    /// Stores the stage's artifact on the run and decides the next step.
    fn apply(&self, run: &mut PipelineRun, output: StageOutput) -> Next {
        match output {
            StageOutput::Research(research) => {
                info!(
                    run_id = %run.id,
                    citations = research.citations.len(),
                    findings = research.findings.len(),
                    "Research complete"
                );
                run.research = Some(research);
                Next::Advance(Stage::Consensus)
            }
            StageOutput::Consensus(report) => {
                let overall = report.overall;
                let unresolved = report.unresolved.len();
                let guidance = report.guidance.clone();
                let reason = rejection_reason(&report);
                run.consensus = Some(report);
                match overall {
                    Verdict::Approved => Next::Advance(Stage::Spec),
                    Verdict::Rejected => Next::Abort(AbortReport {
                        stage: Stage::Consensus,
                        component: "consensus".into(),
                        exit_code: ExitCode::ConsensusRejected,
                        reason,
                    }),
                    Verdict::NeedsRevision => {
                        run.revisions += 1;
                        if run.revisions > self.config.max_revisions {
                            warn!(
                                run_id = %run.id,
                                revisions = run.revisions,
                                max_revisions = self.config.max_revisions,
                                "Revision cap exceeded"
                            );
                            return Next::Abort(AbortReport {
                                stage: Stage::Consensus,
                                component: "consensus".into(),
                                exit_code: ExitCode::ConsensusFailed,
                                reason: format!(
                                    "consensus still needs revision after {} revision(s); cap is {}",
                                    run.revisions - 1,
                                    self.config.max_revisions
                                ),
                            });
                        }
                        info!(
                            run_id = %run.id,
                            revision = run.revisions,
                            unresolved,
                            "Consensus requests revision"
                        );
                        run.revision_guidance = guidance;
                        Next::Advance(Stage::Research)
                    }
                }
            }
            StageOutput::Spec(spec) => {
                let validation = spec.validation.clone();
                run.spec = Some(spec);
                match validation {
                    Some(v) if v.valid => Next::Advance(Stage::Decompose),
                    Some(v) => Next::Abort(AbortReport {
                        stage: Stage::Spec,
                        component: "spec_validator".into(),
                        exit_code: ExitCode::SpecValidationFailed,
                        reason: v.errors.join("; "),
                    }),
                    None => Next::Abort(AbortReport {
                        stage: Stage::Spec,
                        component: "spec_validator".into(),
                        exit_code: ExitCode::SpecValidationFailed,
                        reason: "spec was not validated".into(),
                    }),
                }
            }
            StageOutput::Decompose(graph) => {
                info!(run_id = %run.id, tasks = graph.len(), "Task graph built");
                run.tasks = Some(graph);
                Next::Complete
            }
        }
    }

    /// Opens a fresh gate after `stage`. Returns an abort report unless approved.
    async fn gate(
        &self,
        run: &mut PipelineRun,
        stage: Stage,
        cancel: &mut CancelSignal,
    ) -> RcsdResult<Option<AbortReport>> {
        let deadline = chrono::Duration::from_std(self.config.gate_deadline)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
            .ok_or_else(|| {
                RcsdError::Config(format!(
                    "gate deadline of {}s is out of range",
                    self.config.gate_deadline.as_secs()
                ))
            })?;
        let mut gate = HitlGate::new(stage);
        let payload = DecisionPayload {
            gate_id: gate.id(),
            run_id: run.id,
            checkpoint: stage,
            topic: run.topic.clone(),
            summary: gate_summary(run, stage),
            details: gate_details(run, stage),
            deadline,
        };
        self.note(
            run.id,
            JournalEvent::GateOpened {
                gate_id: gate.id(),
                checkpoint: gate.checkpoint(),
            },
        )
        .await;

        let state = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            state = gate.open(self.reviewer.as_ref(), payload, self.config.gate_deadline) => {
                Some(state)
            }
        };
        let state = match state {
            None => return Ok(Some(cancelled_report(stage))),
            Some(Err(e)) => {
                return Ok(Some(AbortReport {
                    stage,
                    component: "hitl_gate".into(),
                    exit_code: ExitCode::HitlRejected,
                    reason: e.to_string(),
                }))
            }
            Some(Ok(state)) => state,
        };

        if let Some(record) = gate.record() {
            run.gates.push(record);
        }
        self.store.save(run).await?;
        self.note(
            run.id,
            JournalEvent::GateResolved {
                gate_id: gate.id(),
                state,
            },
        )
        .await;

        let comment = gate
            .decision()
            .and_then(|d| d.comment.clone())
            .unwrap_or_default();
        Ok(match state {
            GateState::Approved => None,
            GateState::TimedOut => Some(AbortReport {
                stage,
                component: "hitl_gate".into(),
                exit_code: ExitCode::HitlTimeout,
                reason: format!("no reviewer decision after {stage}: {comment}"),
            }),
            GateState::Rejected | GateState::Open => Some(AbortReport {
                stage,
                component: "hitl_gate".into(),
                exit_code: ExitCode::HitlRejected,
                reason: format!("reviewer rejected {stage}: {comment}"),
            }),
        })
    }

    async fn abort(&self, run: &mut PipelineRun, report: AbortReport) -> RcsdResult<()> {
        error!(
            run_id = %run.id,
            stage = %report.stage,
            component = %report.component,
            exit_code = report.exit_code.code(),
            reason = %report.reason,
            "Pipeline run aborted"
        );
        let event = JournalEvent::RunAborted {
            stage: report.stage,
            exit_code: report.exit_code,
            reason: report.reason.clone(),
        };
        run.abort(report)?;
        self.store.save(run).await?;
        self.note(run.id, event).await;
        Ok(())
    }

    /// Journal writes never fail the run.
    async fn note(&self, run_id: Uuid, event: JournalEvent) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(run_id, event).await {
                warn!(run_id = %run_id, error = %e, "Failed to append to run journal");
            }
        }
    }
}

fn is_revision(next: &Next) -> bool {
    matches!(next, Next::Advance(Stage::Research))
}

fn failure(stage: Stage, component: &str, exit_code: ExitCode, e: RcsdError) -> AbortReport {
    AbortReport {
        stage,
        component: component.to_string(),
        exit_code,
        reason: e.to_string(),
    }
}

fn missing_artifact(stage: Stage, what: &str) -> AbortReport {
    AbortReport {
        stage,
        component: "stage_machine".into(),
        exit_code: ExitCode::InvalidStage,
        reason: format!("run is in {stage} without a {what}"),
    }
}

fn invalid_stage_report(stage: Stage, component: &str, e: &RcsdError) -> AbortReport {
    AbortReport {
        stage,
        component: component.to_string(),
        exit_code: ExitCode::InvalidStage,
        reason: e.to_string(),
    }
}

fn cancelled_report(stage: Stage) -> AbortReport {
    AbortReport {
        stage,
        component: "pipeline".into(),
        exit_code: ExitCode::PipelineAborted,
        reason: RcsdError::Cancelled.to_string(),
    }
}

fn rejection_reason(report: &ConsensusReport) -> String {
    if report.unresolved.is_empty() {
        return "synthesis recommended rejection".to_string();
    }
    let findings: Vec<String> = report
        .unresolved
        .iter()
        .map(|u| format!("[{}] {}", u.source, u.message))
        .collect();
    format!(
        "{} unresolved blocking finding(s): {}",
        findings.len(),
        findings.join("; ")
    )
}

fn gate_summary(run: &PipelineRun, stage: Stage) -> String {
    match stage {
        Stage::Research => format!(
            "Research on '{}' gathered {} citation(s).",
            run.topic,
            run.research.as_ref().map_or(0, |r| r.citations.len())
        ),
        Stage::Consensus => format!(
            "Consensus on '{}' approved with mean score {:.2}.",
            run.topic,
            run.consensus.as_ref().map_or(0.0, ConsensusReport::mean_score)
        ),
        Stage::Spec => format!(
            "Spec '{}' passed validation.",
            run.spec.as_ref().map_or("", |s| s.title.as_str())
        ),
        Stage::Decompose => format!(
            "Decomposition produced {} task(s).",
            run.tasks.as_ref().map_or(0, TaskGraph::len)
        ),
        Stage::Done | Stage::Aborted => String::new(),
    }
}

fn gate_details(run: &PipelineRun, stage: Stage) -> serde_json::Value {
    let details = match stage {
        Stage::Research => serde_json::to_value(&run.research),
        Stage::Consensus => serde_json::to_value(&run.consensus),
        Stage::Spec => serde_json::to_value(&run.spec),
        Stage::Decompose => serde_json::to_value(&run.tasks),
        Stage::Done | Stage::Aborted => Ok(serde_json::Value::Null),
    };
    details.unwrap_or(serde_json::Value::Null)
}
