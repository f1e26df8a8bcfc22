#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use rcsd_agent::AgentFailure;
use rcsd_core::{
    Citation, ConsensusReport, DecisionPayload, ExitCode, GateState, HitlDecision, HitlVerdict,
    PipelineRun, RcsdError, RcsdResult, ResearchOutput, ResearchRequest, ReviewerChannel,
    SpecDocument, Stage, StageStatus, SynthesisDecision, TaskNode, ValidatorRole,
    ValidatorVerdict, Verdict, SYNTHESIS_UNAVAILABLE, VALIDATOR_UNAVAILABLE,
};
use rcsd_orchestrator::{
    cancel_pair, CancelSignal, Collaborators, ConsensusEngine, Decomposer, PendingReviewChannel,
    Pipeline, PipelineConfig, Researcher, Rfc2119Validator, SpecGenerator, Synthesizer, Validator,
};
use rcsd_session::{FileRunJournal, FileRunStore, JournalEvent, RunJournal, RunStore};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;
use uuid::Uuid;

const SPEC_BODY: &str = "\
# Rate limiter

## Requirements
- The limiter MUST reject requests above the configured rate.
- Limits SHOULD be configurable per tenant.
";

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

struct FakeResearcher {
    requests: Mutex<Vec<ResearchRequest>>,
    fail: bool,
    hang: Option<Arc<Notify>>,
}

impl FakeResearcher {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
            hang: None,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
            hang: None,
        })
    }

    /// Signals `entered` and never returns.
    fn hanging(entered: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
            hang: Some(entered),
        })
    }

    fn requests(&self) -> Vec<ResearchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Researcher for FakeResearcher {
    async fn research(&self, request: &ResearchRequest) -> RcsdResult<ResearchOutput> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(entered) = &self.hang {
            entered.notify_one();
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(RcsdError::Collaborator("search backend unreachable".into()));
        }
        Ok(ResearchOutput::new(request.topic.clone())
            .with_citation(Citation::new("RFC 6585"))
            .with_finding("HTTP 429 signals rate limiting"))
    }
}

/// Passes, or fails the way a timed-out agent does.
struct FakeValidator {
    role: ValidatorRole,
    unavailable: bool,
}

#[async_trait]
impl Validator for FakeValidator {
    fn role(&self) -> ValidatorRole {
        self.role
    }

    async fn evaluate(&self, _artifact: &ResearchOutput) -> Result<ValidatorVerdict, AgentFailure> {
        if self.unavailable {
            return Err(AgentFailure::Timeout {
                agent: self.role.agent_name().to_string(),
                timeout_ms: 300_000,
            });
        }
        Ok(ValidatorVerdict::passing(self.role, 0.9))
    }
}

/// Plays back recommendations; the last one repeats.
struct ScriptedSynthesizer {
    script: Mutex<VecDeque<Verdict>>,
    fail: bool,
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(
        &self,
        _artifact: &ResearchOutput,
        _verdicts: &[ValidatorVerdict],
    ) -> Result<SynthesisDecision, AgentFailure> {
        if self.fail {
            return Err(AgentFailure::Error {
                agent: "synthesis".into(),
                message: "model overloaded".into(),
            });
        }
        let mut script = self.script.lock().unwrap();
        let recommendation = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().copied()
        }
        .unwrap_or(Verdict::Approved);
        Ok(SynthesisDecision {
            recommendation,
            rulings: vec![],
            summary: "Cover burst handling.".into(),
        })
    }
}

struct FakeSpecGenerator {
    body: &'static str,
    fail: bool,
}

#[async_trait]
impl SpecGenerator for FakeSpecGenerator {
    async fn generate_spec(
        &self,
        _research: &ResearchOutput,
        consensus: &ConsensusReport,
    ) -> RcsdResult<SpecDocument> {
        assert!(consensus.is_approved());
        if self.fail {
            return Err(RcsdError::Collaborator("spec agent returned no document".into()));
        }
        Ok(SpecDocument::new("Rate limiter", self.body))
    }
}

struct FakeDecomposer {
    tasks: Vec<TaskNode>,
    fail: bool,
}

#[async_trait]
impl Decomposer for FakeDecomposer {
    async fn decompose(&self, _spec: &SpecDocument) -> RcsdResult<Vec<TaskNode>> {
        if self.fail {
            return Err(RcsdError::Collaborator("decompose agent crashed".into()));
        }
        Ok(self.tasks.clone())
    }
}

struct FixedReviewer {
    decision: HitlDecision,
    seen: Mutex<Vec<DecisionPayload>>,
}

impl FixedReviewer {
    fn new(decision: HitlDecision) -> Arc<Self> {
        Arc::new(Self {
            decision,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ReviewerChannel for FixedReviewer {
    async fn review(&self, payload: DecisionPayload) -> RcsdResult<Option<HitlDecision>> {
        self.seen.lock().unwrap().push(payload);
        Ok(Some(self.decision.clone()))
    }
}

/// In-memory store for paused-clock tests.
#[derive(Default)]
struct MemoryStore {
    runs: Mutex<HashMap<Uuid, (PipelineRun, bool)>>,
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn save(&self, run: &PipelineRun) -> RcsdResult<()> {
        let mut runs = self.runs.lock().unwrap();
        let archived = runs.get(&run.id).is_some_and(|(_, a)| *a);
        runs.insert(run.id, (run.clone(), archived));
        Ok(())
    }

    async fn load(&self, id: Uuid) -> RcsdResult<Option<PipelineRun>> {
        Ok(self.runs.lock().unwrap().get(&id).map(|(r, _)| r.clone()))
    }

    async fn list(&self) -> RcsdResult<Vec<Uuid>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs.iter().filter(|(_, (_, a))| !a).map(|(id, _)| *id).collect())
    }

    async fn archive(&self, id: Uuid) -> RcsdResult<()> {
        match self.runs.lock().unwrap().get_mut(&id) {
            Some((_, archived)) => {
                *archived = true;
                Ok(())
            }
            None => Err(RcsdError::Store(format!("run {id} not found"))),
        }
    }

    async fn delete(&self, id: Uuid) -> RcsdResult<()> {
        self.runs.lock().unwrap().remove(&id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn default_tasks() -> Vec<TaskNode> {
    vec![
        TaskNode::new("api", "expose the limiter").with_dependencies(["schema"]),
        TaskNode::new("schema", "define limit storage"),
        TaskNode::new("docs", "document tenant limits").with_dependencies(["api"]),
    ]
}

struct Setup {
    config: PipelineConfig,
    researcher: Arc<FakeResearcher>,
    unavailable: Option<ValidatorRole>,
    synthesis: Vec<Verdict>,
    synthesis_fails: bool,
    spec_body: &'static str,
    spec_fails: bool,
    tasks: Vec<TaskNode>,
    decompose_fails: bool,
    reviewer: Arc<dyn ReviewerChannel>,
    store: Arc<dyn RunStore>,
}

impl Setup {
    fn new(store: Arc<dyn RunStore>) -> Self {
        Self {
            config: PipelineConfig {
                gate_after: BTreeSet::new(),
                ..PipelineConfig::default()
            },
            researcher: FakeResearcher::ok(),
            unavailable: None,
            synthesis: vec![Verdict::Approved],
            synthesis_fails: false,
            spec_body: SPEC_BODY,
            spec_fails: false,
            tasks: default_tasks(),
            decompose_fails: false,
            reviewer: FixedReviewer::new(HitlDecision::approve("alice")),
            store,
        }
    }

    fn build(self) -> Pipeline {
        let validators: Vec<Arc<dyn Validator>> = ValidatorRole::ALL
            .into_iter()
            .map(|role| {
                Arc::new(FakeValidator {
                    role,
                    unavailable: self.unavailable == Some(role),
                }) as Arc<dyn Validator>
            })
            .collect();
        let synthesizer = Arc::new(ScriptedSynthesizer {
            script: Mutex::new(self.synthesis.into()),
            fail: self.synthesis_fails,
        });
        let consensus =
            ConsensusEngine::new(validators, synthesizer, self.config.consensus_timeout).unwrap();
        let collaborators = Collaborators {
            researcher: self.researcher,
            spec_generator: Arc::new(FakeSpecGenerator {
                body: self.spec_body,
                fail: self.spec_fails,
            }),
            spec_validator: Arc::new(Rfc2119Validator::new(self.config.min_rfc2119_coverage)),
            decomposer: Arc::new(FakeDecomposer {
                tasks: self.tasks,
                fail: self.decompose_fails,
            }),
        };
        Pipeline::new(
            self.config,
            collaborators,
            consensus,
            self.reviewer,
            self.store,
        )
        .unwrap()
    }
}

async fn file_store(dir: &TempDir) -> Arc<FileRunStore> {
    Arc::new(FileRunStore::new(dir.path().join("runs")).await.unwrap())
}

fn gates(stages: &[Stage]) -> BTreeSet<Stage> {
    stages.iter().copied().collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_happy_path_reaches_done() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir).await;
    let pipeline = Setup::new(store.clone()).build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.stage, Stage::Done);
    assert_eq!(run.exit_code, Some(ExitCode::Success));
    assert!(run.abort.is_none());
    let consensus = run.consensus.as_ref().unwrap();
    assert_eq!(consensus.overall, Verdict::Approved);
    assert_eq!(consensus.verdicts.len(), 5);
    assert!(consensus.unresolved.is_empty());
    assert!(run.spec.as_ref().unwrap().is_valid());
    assert_eq!(run.tasks.as_ref().unwrap().order(), vec!["schema", "api", "docs"]);
    for stage in Stage::WORK_STAGES {
        assert_eq!(run.status_of(stage), Some(StageStatus::Completed), "{stage}");
    }

    assert!(store.list().await.unwrap().is_empty(), "terminal runs are archived");
    let stored = store.load(run.id).await.unwrap().unwrap();
    assert_eq!(stored.exit_code, Some(ExitCode::Success));
    assert_eq!(stored.tasks, run.tasks);
}

#[tokio::test]
async fn test_unavailable_validator_rejects_consensus() {
    let dir = tempfile::tempdir().unwrap();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.unavailable = Some(ValidatorRole::Implementation);
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.stage, Stage::Aborted);
    assert_eq!(run.exit_code, Some(ExitCode::ConsensusRejected));
    assert_eq!(run.exit_code.unwrap().code(), 32);
    let abort = run.abort.as_ref().unwrap();
    assert_eq!(abort.stage, Stage::Consensus);
    assert_eq!(abort.component, "consensus");
    assert!(abort.reason.contains(VALIDATOR_UNAVAILABLE));

    let consensus = run.consensus.as_ref().unwrap();
    assert_eq!(consensus.overall, Verdict::Rejected);
    assert_eq!(consensus.unresolved.len(), 1);
    assert_eq!(consensus.unresolved[0].message, VALIDATOR_UNAVAILABLE);
    assert_eq!(run.status_of(Stage::Consensus), Some(StageStatus::Failed));
    assert!(run.spec.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_gate_without_decision_times_out() {
    let store = Arc::new(MemoryStore::default());
    let channel = PendingReviewChannel::new();
    let mut setup = Setup::new(store.clone());
    setup.config.gate_after = gates(&[Stage::Spec]);
    setup.config.gate_deadline = Duration::from_secs(60);
    setup.reviewer = Arc::new(channel.clone());
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::HitlTimeout));
    assert_eq!(run.exit_code.unwrap().code(), 36);
    let abort = run.abort.as_ref().unwrap();
    assert_eq!(abort.stage, Stage::Spec);
    assert_eq!(abort.component, "hitl_gate");
    assert_eq!(run.gates.len(), 1);
    assert_eq!(run.gates[0].state, GateState::TimedOut);
    assert_eq!(run.gates[0].decision.verdict, HitlVerdict::Timeout);
    assert!(run.spec.is_some(), "the gated artifact is kept");
    assert!(run.tasks.is_none());
    assert_eq!(channel.pending_count().await, 0);
}

#[tokio::test]
async fn test_approved_gates_are_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let reviewer = FixedReviewer::new(HitlDecision::approve("alice").with_comment("looks right"));
    let mut setup = Setup::new(file_store(&dir).await);
    setup.config.gate_after = gates(&[Stage::Research, Stage::Spec]);
    setup.reviewer = reviewer.clone();
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::Success));
    let checkpoints: Vec<Stage> = run.gates.iter().map(|g| g.checkpoint).collect();
    assert_eq!(checkpoints, vec![Stage::Research, Stage::Spec]);
    assert!(run.gates.iter().all(|g| g.state == GateState::Approved));

    let seen = reviewer.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].run_id, run.id);
    assert_eq!(seen[0].checkpoint, Stage::Research);
    assert_eq!(seen[0].details["citations"][0]["source"], "RFC 6585");
    assert_eq!(seen[1].details["title"], "Rate limiter");
    assert_ne!(seen[0].gate_id, seen[1].gate_id, "each checkpoint gets a fresh gate");
}

#[tokio::test]
async fn test_rejected_gate_aborts_with_reviewer_comment() {
    let dir = tempfile::tempdir().unwrap();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.config.gate_after = gates(&[Stage::Spec]);
    setup.reviewer = FixedReviewer::new(HitlDecision::reject(
        "bob",
        Some("missing burst semantics".into()),
    ));
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::HitlRejected));
    assert_eq!(run.exit_code.unwrap().code(), 37);
    let abort = run.abort.as_ref().unwrap();
    assert_eq!(abort.stage, Stage::Spec);
    assert!(abort.reason.contains("missing burst semantics"));
    assert_eq!(run.gates[0].decision.reviewer, "bob");
}

#[tokio::test]
async fn test_cyclic_tasks_fail_decomposition() {
    let dir = tempfile::tempdir().unwrap();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.tasks = vec![
        TaskNode::new("A", "first").with_dependencies(["B"]),
        TaskNode::new("B", "second").with_dependencies(["A"]),
    ];
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::DecomposeFailed));
    assert_eq!(run.exit_code.unwrap().code(), 35);
    let abort = run.abort.as_ref().unwrap();
    assert_eq!(abort.stage, Stage::Decompose);
    assert_eq!(abort.component, "task_graph_builder");
    assert!(abort.reason.starts_with("CYCLE_DETECTED"));
    assert!(abort.reason.contains("A -> B -> A"));
    assert!(run.tasks.is_none());
}

#[tokio::test]
async fn test_dangling_dependency_fails_decomposition() {
    let dir = tempfile::tempdir().unwrap();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.tasks = vec![TaskNode::new("api", "expose the limiter").with_dependencies(["cache"])];
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.stage, Stage::Aborted);
    assert_eq!(run.exit_code, Some(ExitCode::DecomposeFailed));
    let abort = run.abort.as_ref().unwrap();
    assert_eq!(abort.stage, Stage::Decompose);
    assert_eq!(abort.component, "task_graph_builder");
    assert!(abort.reason.starts_with("DANGLING_DEPENDENCY"));
    assert!(abort.reason.contains("cache"));
    assert_eq!(run.status_of(Stage::Decompose), Some(StageStatus::Failed));
    assert!(run.tasks.is_none());
}

#[tokio::test]
async fn test_decomposer_error_fails_decomposition() {
    let dir = tempfile::tempdir().unwrap();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.decompose_fails = true;
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::DecomposeFailed));
    assert_eq!(run.exit_code.unwrap().code(), 35);
    let abort = run.abort.as_ref().unwrap();
    assert_eq!(abort.stage, Stage::Decompose);
    assert_eq!(abort.component, "decompose");
    assert!(abort.reason.contains("decompose agent crashed"));
    assert!(run.spec.as_ref().unwrap().is_valid());
    assert!(run.tasks.is_none());
}

#[tokio::test]
async fn test_spec_generation_error_fails_spec() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir).await;
    let mut setup = Setup::new(store.clone());
    setup.spec_fails = true;
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.stage, Stage::Aborted);
    assert_eq!(run.exit_code, Some(ExitCode::SpecFailed));
    assert_eq!(run.exit_code.unwrap().code(), 33);
    let abort = run.abort.as_ref().unwrap();
    assert_eq!(abort.stage, Stage::Spec);
    assert_eq!(abort.component, "spec");
    assert!(abort.reason.contains("spec agent returned no document"));
    assert_eq!(run.status_of(Stage::Consensus), Some(StageStatus::Completed));
    assert_eq!(run.status_of(Stage::Spec), Some(StageStatus::Failed));
    assert!(run.spec.is_none());

    let stored = store.load(run.id).await.unwrap().unwrap();
    assert_eq!(stored.exit_code, Some(ExitCode::SpecFailed));
}

#[tokio::test]
async fn test_synthesis_failure_rejects_consensus() {
    let dir = tempfile::tempdir().unwrap();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.synthesis_fails = true;
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::ConsensusRejected));
    assert_eq!(run.exit_code.unwrap().code(), 32);
    let abort = run.abort.as_ref().unwrap();
    assert_eq!(abort.stage, Stage::Consensus);
    assert_eq!(abort.component, "consensus");
    assert!(abort.reason.contains(SYNTHESIS_UNAVAILABLE));

    let consensus = run.consensus.as_ref().unwrap();
    assert_eq!(consensus.overall, Verdict::Rejected);
    assert!(consensus.synthesis.is_none());
    assert!(run.spec.is_none());
}

#[tokio::test]
async fn test_synthesis_rejection_without_findings_rejects_consensus() {
    let dir = tempfile::tempdir().unwrap();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.synthesis = vec![Verdict::Rejected];
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::ConsensusRejected));
    let abort = run.abort.as_ref().unwrap();
    assert_eq!(abort.stage, Stage::Consensus);
    assert_eq!(abort.component, "consensus");
    assert_eq!(abort.reason, "synthesis recommended rejection");
    let consensus = run.consensus.as_ref().unwrap();
    assert!(consensus.unresolved.is_empty());
    assert_eq!(consensus.overall, Verdict::Rejected);
    assert_eq!(run.revisions, 0);
}

#[tokio::test]
async fn test_revision_cap_fails_consensus() {
    let dir = tempfile::tempdir().unwrap();
    let researcher = FakeResearcher::ok();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.researcher = researcher.clone();
    setup.synthesis = vec![Verdict::NeedsRevision];
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::ConsensusFailed));
    assert_eq!(run.exit_code.unwrap().code(), 31);
    assert_eq!(run.abort.as_ref().unwrap().stage, Stage::Consensus);
    assert_eq!(run.revisions, 3);

    let requests = researcher.requests();
    assert_eq!(requests.len(), 3, "initial pass plus two revisions");
    assert_eq!(requests[0].revision, 0);
    assert!(requests[0].guidance.is_none());
    assert_eq!(requests[2].revision, 2);
    assert!(requests[1]
        .guidance
        .as_deref()
        .unwrap()
        .starts_with("Cover burst handling."));
}

#[tokio::test]
async fn test_revision_then_approval_completes() {
    let dir = tempfile::tempdir().unwrap();
    let researcher = FakeResearcher::ok();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.researcher = researcher.clone();
    setup.synthesis = vec![Verdict::NeedsRevision, Verdict::Approved];
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::Success));
    assert_eq!(run.revisions, 1);
    assert_eq!(researcher.requests().len(), 2);
}

#[tokio::test]
async fn test_research_failure_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.researcher = FakeResearcher::failing();
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::ResearchFailed));
    let abort = run.abort.as_ref().unwrap();
    assert_eq!(abort.stage, Stage::Research);
    assert_eq!(abort.component, "research");
    assert!(abort.reason.contains("search backend unreachable"));
    assert!(run.consensus.is_none());
}

#[tokio::test]
async fn test_invalid_spec_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.spec_body = "The limiter limits things.";
    let pipeline = setup.build();

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::SpecValidationFailed));
    assert_eq!(run.abort.as_ref().unwrap().component, "spec_validator");
    let validation = run.spec.as_ref().unwrap().validation.as_ref().unwrap();
    assert!(!validation.valid);
    assert!(!validation.errors.is_empty());
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cancel_before_start_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let researcher = FakeResearcher::ok();
    let mut setup = Setup::new(file_store(&dir).await);
    setup.researcher = researcher.clone();
    let pipeline = setup.build();
    let (handle, signal) = cancel_pair();
    handle.cancel();

    let run = pipeline.run("rate limiting", signal).await.unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::PipelineAborted));
    assert_eq!(run.abort.as_ref().unwrap().component, "pipeline");
    assert!(researcher.requests().is_empty());
}

#[tokio::test]
async fn test_cancel_mid_stage_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir).await;
    let entered = Arc::new(Notify::new());
    let mut setup = Setup::new(store.clone());
    setup.researcher = FakeResearcher::hanging(entered.clone());
    let pipeline = Arc::new(setup.build());
    let (handle, signal) = cancel_pair();

    let task = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.run("rate limiting", signal).await })
    };
    entered.notified().await;
    handle.cancel();
    let run = task.await.unwrap().unwrap();

    assert_eq!(run.exit_code, Some(ExitCode::PipelineAborted));
    assert_eq!(run.exit_code.unwrap().code(), 38);
    assert_eq!(run.abort.as_ref().unwrap().stage, Stage::Research);

    let stored = store.load(run.id).await.unwrap().unwrap();
    assert_eq!(stored.stage, Stage::Aborted);
    assert_eq!(stored.exit_code, Some(ExitCode::PipelineAborted));
}

// ---------------------------------------------------------------------------
// Resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_resume_continues_from_persisted_stage() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir).await;
    let researcher = FakeResearcher::ok();
    let mut setup = Setup::new(store.clone());
    setup.researcher = researcher.clone();
    let pipeline = setup.build();

    let mut run = PipelineRun::new("rate limiting");
    run.research =
        Some(ResearchOutput::new("rate limiting").with_citation(Citation::new("RFC 6585")));
    run.transition(Stage::Consensus).unwrap();
    store.save(&run).await.unwrap();

    let resumed = pipeline.resume(run.id, CancelSignal::never()).await.unwrap();

    assert_eq!(resumed.id, run.id);
    assert_eq!(resumed.exit_code, Some(ExitCode::Success));
    assert!(researcher.requests().is_empty(), "research is not repeated");
}

#[tokio::test]
async fn test_resume_without_prerequisite_is_invalid_stage() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir).await;
    let pipeline = Setup::new(store.clone()).build();

    let mut run = PipelineRun::new("rate limiting");
    run.transition(Stage::Consensus).unwrap();
    store.save(&run).await.unwrap();

    let resumed = pipeline.resume(run.id, CancelSignal::never()).await.unwrap();

    assert_eq!(resumed.exit_code, Some(ExitCode::InvalidStage));
    assert_eq!(resumed.exit_code.unwrap().code(), 39);
    assert_eq!(resumed.abort.as_ref().unwrap().component, "stage_machine");
}

#[tokio::test]
async fn test_resume_terminal_run_reports_stored_code() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir).await;
    let researcher = FakeResearcher::ok();
    let mut setup = Setup::new(store.clone());
    setup.researcher = researcher.clone();
    let pipeline = setup.build();

    let done = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();
    let again = pipeline.resume(done.id, CancelSignal::never()).await.unwrap();

    assert_eq!(again.exit_code, Some(ExitCode::Success));
    assert_eq!(again.completed_at, done.completed_at);
    assert_eq!(researcher.requests().len(), 1);
}

#[tokio::test]
async fn test_resume_unknown_run_is_store_error() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Setup::new(file_store(&dir).await).build();
    let err = pipeline
        .resume(Uuid::new_v4(), CancelSignal::never())
        .await
        .unwrap_err();
    assert!(matches!(err, RcsdError::Store(_)));
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_journal_records_run_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let journal = Arc::new(FileRunJournal::new(dir.path().join("journal")).await.unwrap());
    let mut setup = Setup::new(file_store(&dir).await);
    setup.config.gate_after = gates(&[Stage::Spec]);
    let pipeline = setup.build().with_journal(journal.clone());

    let run = pipeline.run("rate limiting", CancelSignal::never()).await.unwrap();
    let entries = journal.read(run.id).await.unwrap();

    let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..entries.len() as u64).collect::<Vec<_>>());
    assert_eq!(
        entries.first().unwrap().event,
        JournalEvent::RunStarted {
            topic: "rate limiting".into()
        }
    );
    assert_eq!(entries.last().unwrap().event, JournalEvent::RunCompleted);
    assert!(entries.iter().any(|e| e.event
        == JournalEvent::ConsensusRound {
            revision: 0,
            overall: Verdict::Approved,
            unresolved: 0,
        }));
    assert!(entries.iter().any(|e| matches!(
        e.event,
        JournalEvent::GateResolved {
            state: GateState::Approved,
            ..
        }
    )));
}
