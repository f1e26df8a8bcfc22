//! Narrow interfaces to the content-producing stages, and their agent-backed
//! implementations.

use crate::profiles::{
    DECOMPOSE_AGENT, DECOMPOSE_PROMPT, RESEARCH_AGENT, RESEARCH_PROMPT, SPEC_AGENT, SPEC_PROMPT,
};
use async_trait::async_trait;
use rcsd_agent::{AgentInvoker, AgentPayload};
use rcsd_core::{
    Citation, ConsensusReport, RcsdError, RcsdResult, ResearchOutput, ResearchRequest,
    SpecDocument, SpecValidation, TaskNode,
};
use serde::Deserialize;
use std::time::Duration;

/// Gathers evidence for a topic.
#[async_trait]
pub trait Researcher: Send + Sync {
    /// Researches `request.topic`, following revision guidance when present.
    async fn research(&self, request: &ResearchRequest) -> RcsdResult<ResearchOutput>;
}

/// Writes a specification from approved research.
#[async_trait]
pub trait SpecGenerator: Send + Sync {
    /// Only called with a consensus report whose overall verdict is approved.
    async fn generate_spec(
        &self,
        research: &ResearchOutput,
        consensus: &ConsensusReport,
    ) -> RcsdResult<SpecDocument>;
}

/// Schema check of a generated specification.
pub trait SpecValidator: Send + Sync {
    /// Checks structure and keyword coverage. Never fails; problems land in the result.
    fn validate(&self, spec: &SpecDocument) -> SpecValidation;
}

/// Breaks a specification into raw, unvalidated tasks.
#[async_trait]
pub trait Decomposer: Send + Sync {
    /// Proposes tasks. Ids, dependencies and acyclicity are checked afterwards.
    async fn decompose(&self, spec: &SpecDocument) -> RcsdResult<Vec<TaskNode>>;
}

// ---------------------------------------------------------------------------
// Agent-backed implementations
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ResearchAgentOutput {
    #[serde(default)]
    citations: Vec<Citation>,
    #[serde(default)]
    findings: Vec<String>,
}

/// [`Researcher`] backed by the research agent.
pub struct AgentResearcher {
    invoker: AgentInvoker,
    timeout: Duration,
}

impl AgentResearcher {
    /// Each call gets `timeout` as its budget.
    pub fn new(invoker: AgentInvoker, timeout: Duration) -> Self {
        Self { invoker, timeout }
    }
}

#[async_trait]
impl Researcher for AgentResearcher {
    async fn research(&self, request: &ResearchRequest) -> RcsdResult<ResearchOutput> {
        let mut instructions = format!("Research the topic: {}", request.topic);
        if request.revision > 0 {
            instructions.push_str(&format!(
                "\nThis is revision {} of the research; address the guidance in the context.",
                request.revision
            ));
        }
        let payload = AgentPayload::new(RESEARCH_PROMPT, instructions).with_context(
            serde_json::json!({ "topic": request.topic, "guidance": request.guidance }),
        );

        let output: ResearchAgentOutput = self
            .invoker
            .invoke_as(RESEARCH_AGENT, &payload, self.timeout)
            .await?;

        let mut research = ResearchOutput::new(request.topic.clone());
        research.citations = output.citations;
        research.findings = output.findings;
        if research.is_empty() {
            return Err(RcsdError::Collaborator(
                "research produced no citations or findings".into(),
            ));
        }
        Ok(research)
    }
}

#[derive(Debug, Deserialize)]
struct SpecAgentOutput {
    title: String,
    body: String,
}

/// [`SpecGenerator`] backed by the spec agent.
pub struct AgentSpecGenerator {
    invoker: AgentInvoker,
    timeout: Duration,
}

impl AgentSpecGenerator {
    /// Each call gets `timeout` as its budget.
    pub fn new(invoker: AgentInvoker, timeout: Duration) -> Self {
        Self { invoker, timeout }
    }
}

#[async_trait]
impl SpecGenerator for AgentSpecGenerator {
    async fn generate_spec(
        &self,
        research: &ResearchOutput,
        consensus: &ConsensusReport,
    ) -> RcsdResult<SpecDocument> {
        let payload = AgentPayload::new(
            SPEC_PROMPT,
            format!("Write the specification for '{}'.", research.topic),
        )
        .with_context(serde_json::json!({
            "research": research,
            "consensus": {
                "overall": consensus.overall,
                "synthesis": consensus.synthesis.as_ref().map(|s| &s.summary),
                "verdicts": consensus.verdicts,
            },
        }));

        let output: SpecAgentOutput = self
            .invoker
            .invoke_as(SPEC_AGENT, &payload, self.timeout)
            .await?;
        Ok(SpecDocument::new(output.title, output.body))
    }
}

#[derive(Debug, Deserialize)]
struct DecomposeAgentOutput {
    tasks: Vec<TaskNode>,
}

/// [`Decomposer`] backed by the decompose agent.
pub struct AgentDecomposer {
    invoker: AgentInvoker,
    timeout: Duration,
}

impl AgentDecomposer {
    /// Each call gets `timeout` as its budget.
    pub fn new(invoker: AgentInvoker, timeout: Duration) -> Self {
        Self { invoker, timeout }
    }
}

#[async_trait]
impl Decomposer for AgentDecomposer {
    async fn decompose(&self, spec: &SpecDocument) -> RcsdResult<Vec<TaskNode>> {
        let payload = AgentPayload::new(
            DECOMPOSE_PROMPT,
            format!("Decompose the specification '{}' into tasks.", spec.title),
        )
        .with_context(serde_json::json!({ "spec": { "title": spec.title, "body": spec.body } }));

        let output: DecomposeAgentOutput = self
            .invoker
            .invoke_as(DECOMPOSE_AGENT, &payload, self.timeout)
            .await?;
        Ok(output.tasks)
    }
}
