use crate::profiles::{SYNTHESIS_AGENT, SYNTHESIS_PROMPT};
use crate::validators::Validator;
use async_trait::async_trait;
use chrono::Utc;
use rcsd_agent::{AgentFailure, AgentInvoker, AgentPayload};
use rcsd_core::{
    ConsensusReport, FindingSource, RcsdError, RcsdResult, ResearchOutput, RulingDecision,
    Severity, SynthesisDecision, UnresolvedFinding, ValidatorRole, ValidatorVerdict, Verdict,
    SYNTHESIS_UNAVAILABLE,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// The discretionary step of a consensus round.
///
/// Sees the complete verdict set and must rule on every blocking finding.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Returns a recommendation plus one ruling per blocking finding it addresses.
    async fn synthesize(
        &self,
        artifact: &ResearchOutput,
        verdicts: &[ValidatorVerdict],
    ) -> Result<SynthesisDecision, AgentFailure>;
}

/// Synthesis played by the synthesis agent.
pub struct AgentSynthesizer {
    invoker: AgentInvoker,
    timeout: Duration,
}

impl AgentSynthesizer {
    /// Synthesis calls get `timeout` as their budget.
    pub fn new(invoker: AgentInvoker, timeout: Duration) -> Self {
        Self { invoker, timeout }
    }
}

#[async_trait]
impl Synthesizer for AgentSynthesizer {
    async fn synthesize(
        &self,
        artifact: &ResearchOutput,
        verdicts: &[ValidatorVerdict],
    ) -> Result<SynthesisDecision, AgentFailure> {
        let blocking: Vec<_> = verdicts
            .iter()
            .flat_map(|v| v.blocking_refs())
            .map(|(finding, f)| serde_json::json!({ "finding": finding, "message": f.message }))
            .collect();
        let payload = AgentPayload::new(
            SYNTHESIS_PROMPT,
            format!(
                "Adjudicate the consensus round on '{}'. Rule on all {} blocking finding(s).",
                artifact.topic,
                blocking.len()
            ),
        )
        .with_context(serde_json::json!({
            "research": artifact,
            "verdicts": verdicts,
            "blocking_findings": blocking,
        }));
        self.invoker
            .invoke_as(SYNTHESIS_AGENT, &payload, self.timeout)
            .await
    }
}

/// Runs the five validators concurrently and adjudicates their verdicts.
pub struct ConsensusEngine {
    validators: Vec<Arc<dyn Validator>>,
    synthesizer: Arc<dyn Synthesizer>,
    round_timeout: Duration,
}

impl ConsensusEngine {
    /// Builds an engine with exactly one validator per [`ValidatorRole`].
    pub fn new(
        validators: Vec<Arc<dyn Validator>>,
        synthesizer: Arc<dyn Synthesizer>,
        round_timeout: Duration,
    ) -> RcsdResult<Self> {
        if round_timeout.is_zero() {
            return Err(RcsdError::Config("consensus round timeout must be > 0".into()));
        }
        let mut seen = BTreeSet::new();
        for v in &validators {
            if !seen.insert(v.role()) {
                return Err(RcsdError::Config(format!(
                    "more than one validator for role {}",
                    v.role()
                )));
            }
        }
        let missing: Vec<String> = ValidatorRole::ALL
            .into_iter()
            .filter(|r| !seen.contains(r))
            .map(|r| r.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RcsdError::Config(format!(
                "no validator for role(s): {}",
                missing.join(", ")
            )));
        }
        Ok(Self {
            validators,
            synthesizer,
            round_timeout,
        })
    }

    /// Runs one round over an immutable snapshot of `artifact`.
    ///
    /// Validators that fail, panic or miss the round deadline are replaced by
    /// [`ValidatorVerdict::unavailable`]. Synthesis only runs once every role
    /// has a verdict.
    pub async fn run_consensus(
        &self,
        artifact: Arc<ResearchOutput>,
    ) -> RcsdResult<ConsensusReport> {
        let deadline = tokio::time::Instant::now()
            .checked_add(self.round_timeout)
            .ok_or_else(|| {
                RcsdError::Config(format!(
                    "consensus round timeout of {}s is out of range",
                    self.round_timeout.as_secs()
                ))
            })?;
        let mut set = JoinSet::new();

        for validator in &self.validators {
            let validator = Arc::clone(validator);
            let artifact = Arc::clone(&artifact);
            set.spawn(async move {
                let role = validator.role();
                (role, validator.evaluate(&artifact).await)
            });
        }

        let mut collected: BTreeMap<ValidatorRole, ValidatorVerdict> = BTreeMap::new();
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((role, Ok(mut verdict))))) => {
                    verdict.role = role;
                    info!(
                        role = %role,
                        score = verdict.score,
                        pass = verdict.pass,
                        "Validator verdict received"
                    );
                    collected.insert(role, verdict);
                }
                Ok(Some(Ok((role, Err(failure))))) => {
                    warn!(
                        role = %role,
                        kind = failure.kind(),
                        error = %failure,
                        "Validator unavailable"
                    );
                    collected.insert(role, ValidatorVerdict::unavailable(role));
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "Validator task did not complete");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = set.len(),
                        timeout_secs = self.round_timeout.as_secs(),
                        "Consensus round deadline reached; discarding pending validators"
                    );
                    set.abort_all();
                    break;
                }
            }
        }

        let verdicts: Vec<ValidatorVerdict> = ValidatorRole::ALL
            .into_iter()
            .map(|role| {
                collected
                    .remove(&role)
                    .unwrap_or_else(|| ValidatorVerdict::unavailable(role))
            })
            .collect();

        let synthesis = match self.synthesizer.synthesize(&artifact, &verdicts).await {
            Ok(decision) => Some(decision),
            Err(failure) => {
                warn!(
                    kind = failure.kind(),
                    error = %failure,
                    "Synthesis failed; round fails closed"
                );
                None
            }
        };

        let report = aggregate(verdicts, synthesis);
        info!(
            overall = %report.overall,
            unresolved = report.unresolved.len(),
            mean_score = report.mean_score(),
            "Consensus round complete"
        );
        Ok(report)
    }
}

/// Reduces a verdict set and a synthesis decision to a report.
///
/// A blocking finding is resolved only by an `overridden` ruling with a
/// non-empty justification and no conflicting `upheld` ruling. Any unresolved
/// finding forces `REJECTED`; otherwise the synthesis recommendation stands.
/// Without a synthesis decision the round is `REJECTED`. The result does not
/// depend on the order of `verdicts` or of the rulings.
pub fn aggregate(
    mut verdicts: Vec<ValidatorVerdict>,
    synthesis: Option<SynthesisDecision>,
) -> ConsensusReport {
    verdicts.sort_by_key(|v| v.role);

    let mut unresolved: Vec<UnresolvedFinding> = Vec::new();
    for verdict in &verdicts {
        for (finding_ref, finding) in verdict.blocking_refs() {
            let resolved = synthesis.as_ref().is_some_and(|s| {
                let rulings = || s.rulings.iter().filter(|r| r.finding == finding_ref);
                rulings().any(|r| r.is_justified_override())
                    && !rulings().any(|r| r.decision == RulingDecision::Upheld)
            });
            if !resolved {
                unresolved.push(UnresolvedFinding {
                    source: FindingSource::Validator {
                        finding: finding_ref,
                    },
                    message: finding.message.clone(),
                });
            }
        }
    }

    let overall = match &synthesis {
        None => {
            unresolved.push(UnresolvedFinding {
                source: FindingSource::Synthesis,
                message: SYNTHESIS_UNAVAILABLE.to_string(),
            });
            Verdict::Rejected
        }
        Some(_) if !unresolved.is_empty() => Verdict::Rejected,
        Some(decision) => decision.recommendation,
    };
    unresolved.sort_by_key(|u| u.source);

    let guidance = revision_guidance(&verdicts, synthesis.as_ref(), &unresolved);

    ConsensusReport {
        verdicts,
        synthesis,
        overall,
        unresolved,
        guidance,
        completed_at: Utc::now(),
    }
}

/// Synthesis summary followed by the findings research should address.
fn revision_guidance(
    verdicts: &[ValidatorVerdict],
    synthesis: Option<&SynthesisDecision>,
    unresolved: &[UnresolvedFinding],
) -> Option<String> {
    let mut lines = Vec::new();
    if let Some(summary) = synthesis.map(|s| s.summary.trim()).filter(|s| !s.is_empty()) {
        lines.push(summary.to_string());
    }
    for u in unresolved {
        lines.push(format!("- [{}] {}", u.source, u.message));
    }
    for v in verdicts {
        for f in v.findings.iter().filter(|f| f.severity == Severity::Major) {
            lines.push(format!("- [{}] {}", v.role, f.message));
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}
