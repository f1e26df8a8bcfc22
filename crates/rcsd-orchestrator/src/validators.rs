use crate::profiles::validator_prompt;
use async_trait::async_trait;
use rcsd_agent::{AgentFailure, AgentInvoker, AgentPayload};
use rcsd_core::{Finding, ResearchOutput, ValidatorRole, ValidatorVerdict};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// One independent evaluator of a consensus round.
///
/// Implementations only read the artifact; the engine owns the resulting
/// verdict.
#[async_trait]
pub trait Validator: Send + Sync {
    /// The role this validator fills in a consensus round.
    fn role(&self) -> ValidatorRole;

    /// Scores the research artifact. Errors count as an unavailable verdict.
    async fn evaluate(&self, artifact: &ResearchOutput) -> Result<ValidatorVerdict, AgentFailure>;
}

/// What a validator agent returns; the role is implied by the agent.
#[derive(Debug, Deserialize)]
struct VerdictOutput {
    score: f64,
    #[serde(default)]
    findings: Vec<Finding>,
    pass: bool,
}

/// Validator played by an agent through the invoker.
pub struct AgentValidator {
    role: ValidatorRole,
    invoker: AgentInvoker,
    timeout: Duration,
}

impl AgentValidator {
    pub fn new(role: ValidatorRole, invoker: AgentInvoker, timeout: Duration) -> Self {
        Self {
            role,
            invoker,
            timeout,
        }
    }
}

#[async_trait]
impl Validator for AgentValidator {
    fn role(&self) -> ValidatorRole {
        self.role
    }

    async fn evaluate(&self, artifact: &ResearchOutput) -> Result<ValidatorVerdict, AgentFailure> {
        let agent = self.role.agent_name();
        let context = serde_json::json!({ "research": artifact });
        let payload = AgentPayload::new(
            validator_prompt(self.role),
            format!("Evaluate the research on '{}'.", artifact.topic),
        )
        .with_context(context);

        let output: VerdictOutput = self.invoker.invoke_as(agent, &payload, self.timeout).await?;
        let verdict = ValidatorVerdict {
            role: self.role,
            score: output.score,
            findings: output.findings,
            pass: output.pass,
        };
        verdict
            .check_bounds()
            .map_err(|e| AgentFailure::malformed(agent, e))?;
        Ok(verdict)
    }
}

/// One agent-backed validator per role, in canonical role order.
pub fn agent_validators(invoker: &AgentInvoker, timeout: Duration) -> Vec<Arc<dyn Validator>> {
    ValidatorRole::ALL
        .into_iter()
        .map(|role| {
            Arc::new(AgentValidator::new(role, invoker.clone(), timeout)) as Arc<dyn Validator>
        })
        .collect()
}
