use rcsd_core::{RcsdError, RcsdResult, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Upper bound on every configured timeout and deadline (30 days).
pub const MAX_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Runtime configuration of the stage machine.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// How many NEEDS_REVISION rounds may send the run back to research.
    pub max_revisions: u32,
    /// Budget of each individual agent call.
    pub agent_timeout: Duration,
    /// Global join deadline of a consensus round.
    pub consensus_timeout: Duration,
    /// How long a HITL gate waits for a reviewer.
    pub gate_deadline: Duration,
    /// Stages followed by a HITL gate.
    pub gate_after: BTreeSet<Stage>,
    /// Minimum share of requirement lines carrying an RFC 2119 keyword.
    pub min_rfc2119_coverage: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_revisions: 2,
            agent_timeout: Duration::from_secs(300),
            consensus_timeout: Duration::from_secs(900),
            gate_deadline: Duration::from_secs(3600),
            gate_after: BTreeSet::from([Stage::Spec]),
            min_rfc2119_coverage: 0.5,
        }
    }
}

impl PipelineConfig {
    /// Rejects zero or oversized timeouts, out-of-range coverage and gates on
    /// terminal stages.
    pub fn validate(&self) -> RcsdResult<()> {
        for (name, value) in [
            ("agent timeout", self.agent_timeout),
            ("consensus timeout", self.consensus_timeout),
            ("gate deadline", self.gate_deadline),
        ] {
            if value.is_zero() {
                return Err(RcsdError::Config(format!("{name} must be > 0")));
            }
            if value > MAX_TIMEOUT {
                return Err(RcsdError::Config(format!(
                    "{name} must be at most {}s, got {}s",
                    MAX_TIMEOUT.as_secs(),
                    value.as_secs()
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.min_rfc2119_coverage) {
            return Err(RcsdError::Config(format!(
                "min_rfc2119_coverage must be within [0, 1], got {}",
                self.min_rfc2119_coverage
            )));
        }
        if let Some(stage) = self.gate_after.iter().find(|s| s.is_terminal()) {
            return Err(RcsdError::Config(format!(
                "gates can only follow a working stage, not {stage}"
            )));
        }
        Ok(())
    }

    /// Whether a gate follows `stage`.
    pub fn gates_after(&self, stage: Stage) -> bool {
        self.gate_after.contains(&stage)
    }
}

/// The `[pipeline]` section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// See [`PipelineConfig::max_revisions`].
    #[serde(default = "default_max_revisions")]
    pub max_revisions: u32,
    /// Per-call agent budget, in seconds.
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,
    /// Consensus round deadline, in seconds.
    #[serde(default = "default_consensus_timeout_secs")]
    pub consensus_timeout_secs: u64,
    /// HITL gate deadline, in seconds.
    #[serde(default = "default_gate_deadline_secs")]
    pub gate_deadline_secs: u64,
    /// Stage names followed by a gate, case-insensitive.
    #[serde(default = "default_gate_after")]
    pub gate_after: Vec<String>,
    /// See [`PipelineConfig::min_rfc2119_coverage`].
    #[serde(default = "default_min_rfc2119_coverage")]
    pub min_rfc2119_coverage: f64,
}

fn default_max_revisions() -> u32 {
    2
}

fn default_agent_timeout_secs() -> u64 {
    300
}

fn default_consensus_timeout_secs() -> u64 {
    900
}

fn default_gate_deadline_secs() -> u64 {
    3600
}

fn default_gate_after() -> Vec<String> {
    vec!["spec".to_string()]
}

fn default_min_rfc2119_coverage() -> f64 {
    0.5
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_revisions: default_max_revisions(),
            agent_timeout_secs: default_agent_timeout_secs(),
            consensus_timeout_secs: default_consensus_timeout_secs(),
            gate_deadline_secs: default_gate_deadline_secs(),
            gate_after: default_gate_after(),
            min_rfc2119_coverage: default_min_rfc2119_coverage(),
        }
    }
}

impl PipelineSettings {
    /// Resolves stage names and durations into a validated [`PipelineConfig`].
    pub fn to_config(&self) -> RcsdResult<PipelineConfig> {
        let gate_after = self
            .gate_after
            .iter()
            .map(|name| {
                name.parse::<Stage>()
                    .map_err(|e| RcsdError::Config(format!("pipeline.gate_after: {e}")))
            })
            .collect::<RcsdResult<BTreeSet<Stage>>>()?;

        let config = PipelineConfig {
            max_revisions: self.max_revisions,
            agent_timeout: Duration::from_secs(self.agent_timeout_secs),
            consensus_timeout: Duration::from_secs(self.consensus_timeout_secs),
            gate_deadline: Duration::from_secs(self.gate_deadline_secs),
            gate_after,
            min_rfc2119_coverage: self.min_rfc2119_coverage,
        };
        config.validate()?;
        Ok(config)
    }
}
